use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::TransferId;

pub type TransferResult<T> = Result<T, TransferError>;

#[derive(Debug, Error)]
pub enum TransferError {
    /// Malformed key/IV, or a failure on the encrypt path.
    #[error("crypto error: {0}")]
    Crypto(String),

    /// Wrong key or corrupted ciphertext. The user may retry with another key.
    #[error("decryption failed: wrong key or corrupted data")]
    DecryptFailure,

    #[error("transfer {0} not found")]
    NotFound(TransferId),

    #[error("transfer {id} expired at {expired_at}")]
    Expired {
        id: TransferId,
        expired_at: DateTime<Utc>,
    },

    #[error("transfer {id} reached its download limit ({max_downloads})")]
    QuotaExceeded { id: TransferId, max_downloads: u32 },

    /// Blob upload/download backend failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Metadata backend failure.
    #[error("metadata persistence error: {0}")]
    Persistence(String),

    #[error("invalid link: {0}")]
    InvalidLink(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification callers use to pick a user-facing message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Crypto,
    DecryptFailure,
    NotFound,
    Expired,
    QuotaExceeded,
    Storage,
    Persistence,
    InvalidLink,
    InvalidInput,
    Config,
    Io,
}

impl TransferError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TransferError::Crypto(_) => ErrorKind::Crypto,
            TransferError::DecryptFailure => ErrorKind::DecryptFailure,
            TransferError::NotFound(_) => ErrorKind::NotFound,
            TransferError::Expired { .. } => ErrorKind::Expired,
            TransferError::QuotaExceeded { .. } => ErrorKind::QuotaExceeded,
            TransferError::Storage(_) => ErrorKind::Storage,
            TransferError::Persistence(_) => ErrorKind::Persistence,
            TransferError::InvalidLink(_) => ErrorKind::InvalidLink,
            TransferError::InvalidInput(_) => ErrorKind::InvalidInput,
            TransferError::Config(_) => ErrorKind::Config,
            TransferError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether repeating the same operation may succeed.
    ///
    /// `NotFound`, `Expired` and `QuotaExceeded` are terminal: only a new
    /// transfer helps.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::DecryptFailure | ErrorKind::Storage | ErrorKind::Persistence | ErrorKind::Io
        )
    }
}
