//! nullshare-crypto: client-side encryption for NullShare transfers
//!
//! Every transfer gets a fresh 256-bit key and a fresh 128-bit IV, both drawn
//! from the operating system CSPRNG. The key only ever travels inside the
//! share link; the IV is published next to the ciphertext pointer.
//!
//! ```text
//! plaintext ──AES-256-CBC/PKCS#7(key, iv)──▶ ciphertext ──base64──▶ upload
//! ```

pub mod cipher;
pub mod error;
pub mod keys;

pub use cipher::{decrypt, encrypt, Sealed};
pub use error::{CryptoError, CryptoResult};
pub use keys::{generate_iv, generate_key, Iv, TransferKey};

/// Size of a transfer key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an AES-CBC initialization vector in bytes (one AES block)
pub const IV_SIZE: usize = 16;

/// AES block size in bytes
pub const BLOCK_SIZE: usize = 16;
