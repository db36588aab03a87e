//! AES-256-CBC with PKCS#7 padding
//!
//! Wire form of a sealed payload:
//! ```text
//! ciphertext: base64(standard alphabet, padded, no line breaks) of N*16 bytes
//! iv:         32 lowercase hex characters, stored in the transfer record
//! ```
//!
//! CBC carries no authentication tag. A wrong key or IV is detected only by
//! the padding check, so callers that know the expected plaintext length
//! should verify it as well.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use tracing::debug;

use crate::error::CryptoResult;
use crate::keys::{Iv, TransferKey};
use crate::BLOCK_SIZE;

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Output of [`encrypt`]: base64 ciphertext plus the hex IV it was sealed with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    pub ciphertext: String,
    pub iv: String,
}

/// Encrypt `plaintext` under a 64-hex-char key.
///
/// A fresh IV is generated for every call; there is no way to pass one in.
pub fn encrypt(plaintext: &[u8], key_hex: &str) -> CryptoResult<Sealed> {
    let key = TransferKey::from_hex(key_hex)?;
    Ok(encrypt_with_key(plaintext, &key))
}

/// Typed variant of [`encrypt`] for callers already holding a parsed key.
pub fn encrypt_with_key(plaintext: &[u8], key: &TransferKey) -> Sealed {
    let iv = Iv::generate();
    let ciphertext = seal(plaintext, key, &iv);
    Sealed {
        ciphertext: STANDARD.encode(ciphertext),
        iv: iv.to_hex(),
    }
}

/// Decrypt a base64 ciphertext with a hex key and hex IV.
///
/// Returns `None` on any failure: malformed key or IV, invalid base64, a
/// length that is not a whole number of blocks, or bad padding.
pub fn decrypt(ciphertext_b64: &str, key_hex: &str, iv_hex: &str) -> Option<Vec<u8>> {
    let key = match TransferKey::from_hex(key_hex) {
        Ok(key) => key,
        Err(e) => {
            debug!(error = %e, "decrypt: rejecting malformed key");
            return None;
        }
    };
    let iv = match Iv::from_hex(iv_hex) {
        Ok(iv) => iv,
        Err(e) => {
            debug!(error = %e, "decrypt: rejecting malformed IV");
            return None;
        }
    };
    decrypt_with_key(ciphertext_b64, &key, &iv)
}

/// Typed variant of [`decrypt`].
pub fn decrypt_with_key(ciphertext_b64: &str, key: &TransferKey, iv: &Iv) -> Option<Vec<u8>> {
    let ciphertext = match STANDARD.decode(ciphertext_b64) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "decrypt: ciphertext is not valid base64");
            return None;
        }
    };
    open(&ciphertext, key, iv)
}

pub(crate) fn seal(plaintext: &[u8], key: &TransferKey, iv: &Iv) -> Vec<u8> {
    Aes256CbcEnc::new(key.as_bytes().into(), iv.as_bytes().into())
        .encrypt_padded_vec_mut::<Pkcs7>(plaintext)
}

pub(crate) fn open(ciphertext: &[u8], key: &TransferKey, iv: &Iv) -> Option<Vec<u8>> {
    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        debug!(len = ciphertext.len(), "decrypt: ciphertext is not whole blocks");
        return None;
    }
    match Aes256CbcDec::new(key.as_bytes().into(), iv.as_bytes().into())
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
    {
        Ok(plaintext) => Some(plaintext),
        Err(_) => {
            debug!("decrypt: padding check failed (wrong key, wrong IV, or corrupted data)");
            None
        }
    }
}
