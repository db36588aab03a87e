//! Error types for cryptographic operations.

use thiserror::Error;

/// Cryptographic operation errors.
///
/// Decryption mismatches are deliberately absent: `decrypt` reports them as
/// `None` so they stay distinguishable from malformed input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// Key is not exactly 64 hex digits.
    #[error("invalid key: expected {expected} hex characters, {reason}")]
    InvalidKey { expected: usize, reason: String },

    /// IV is not exactly 32 hex digits.
    #[error("invalid IV: expected {expected} hex characters, {reason}")]
    InvalidIv { expected: usize, reason: String },
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
