//! Key material: per-transfer keys and IVs drawn from the OS CSPRNG

use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroize;

use crate::error::{CryptoError, CryptoResult};
use crate::{IV_SIZE, KEY_SIZE};

/// A per-transfer 256-bit AES key. Zeroized on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct TransferKey {
    bytes: [u8; KEY_SIZE],
}

impl TransferKey {
    /// Generate a fresh random key.
    pub fn generate() -> Self {
        Self::from_bytes(random_bytes())
    }

    pub fn from_bytes(bytes: [u8; KEY_SIZE]) -> Self {
        Self { bytes }
    }

    /// Parse a key from exactly 64 hex characters (either case).
    pub fn from_hex(key_hex: &str) -> CryptoResult<Self> {
        let mut bytes = decode_fixed::<KEY_SIZE>(key_hex).map_err(|reason| {
            CryptoError::InvalidKey {
                expected: KEY_SIZE * 2,
                reason,
            }
        })?;
        let key = Self::from_bytes(bytes);
        bytes.zeroize();
        Ok(key)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.bytes
    }

    /// Lowercase hex form, as embedded in share links.
    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

impl Drop for TransferKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

impl std::fmt::Debug for TransferKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferKey")
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// A 128-bit CBC initialization vector. Public, stored with the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Iv {
    bytes: [u8; IV_SIZE],
}

impl Iv {
    /// Generate a fresh random IV from the same source as keys.
    pub fn generate() -> Self {
        Self::from_bytes(random_bytes())
    }

    pub fn from_bytes(bytes: [u8; IV_SIZE]) -> Self {
        Self { bytes }
    }

    /// Parse an IV from exactly 32 hex characters (either case).
    pub fn from_hex(iv_hex: &str) -> CryptoResult<Self> {
        decode_fixed::<IV_SIZE>(iv_hex)
            .map(Self::from_bytes)
            .map_err(|reason| CryptoError::InvalidIv {
                expected: IV_SIZE * 2,
                reason,
            })
    }

    pub fn as_bytes(&self) -> &[u8; IV_SIZE] {
        &self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.bytes)
    }
}

/// Generate a random 256-bit key as 64 lowercase hex characters.
///
/// Panics only if the operating system random source is unavailable.
pub fn generate_key() -> String {
    TransferKey::generate().to_hex()
}

/// Generate a random 128-bit IV as 32 lowercase hex characters.
pub fn generate_iv() -> String {
    Iv::generate().to_hex()
}

fn random_bytes<const N: usize>() -> [u8; N] {
    let mut bytes = [0u8; N];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

fn decode_fixed<const N: usize>(input: &str) -> Result<[u8; N], String> {
    if input.len() != N * 2 {
        return Err(format!("got {}", input.len()));
    }
    let mut out = [0u8; N];
    hex::decode_to_slice(input, &mut out).map_err(|e| format!("not hex ({e})"))?;
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn is_lower_hex(s: &str) -> bool {
        s.bytes().all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
    }

    #[test]
    fn test_generate_key_format() {
        let key = generate_key();
        assert_eq!(key.len(), 64);
        assert!(is_lower_hex(&key), "key must be lowercase hex: {key}");
    }

    #[test]
    fn test_generate_iv_format() {
        let iv = generate_iv();
        assert_eq!(iv.len(), 32);
        assert!(is_lower_hex(&iv), "iv must be lowercase hex: {iv}");
    }

    #[test]
    fn test_generate_key_no_duplicates() {
        let mut seen = HashSet::with_capacity(10_000);
        for _ in 0..10_000 {
            let key = generate_key();
            assert_eq!(key.len(), 64);
            assert!(is_lower_hex(&key));
            assert!(seen.insert(key), "duplicate key generated");
        }
    }

    #[test]
    fn test_generate_iv_unique() {
        let a = generate_iv();
        let b = generate_iv();
        assert_ne!(a, b, "random IVs must differ");
    }

    #[test]
    fn test_key_hex_roundtrip_accepts_uppercase() {
        let key = TransferKey::generate();
        let upper = key.to_hex().to_uppercase();
        let parsed = TransferKey::from_hex(&upper).unwrap();
        assert_eq!(parsed, key);
        assert_eq!(parsed.to_hex(), key.to_hex());
    }

    #[test]
    fn test_key_from_hex_wrong_length() {
        let err = TransferKey::from_hex("abcd").unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey { expected: 64, .. }));
    }

    #[test]
    fn test_key_from_hex_not_hex() {
        let bad = "zz".repeat(32);
        let err = TransferKey::from_hex(&bad).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKey { .. }));
    }

    #[test]
    fn test_iv_from_hex_wrong_length() {
        let err = Iv::from_hex(&"00".repeat(17)).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidIv { expected: 32, .. }));
    }

    #[test]
    fn test_key_debug_is_redacted() {
        let key = TransferKey::from_bytes([0xAB; KEY_SIZE]);
        let rendered = format!("{key:?}");
        assert!(rendered.contains("REDACTED"));
        assert!(!rendered.contains("ab"));
    }
}
