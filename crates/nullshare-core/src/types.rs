use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Default number of successful downloads a transfer allows
pub const DEFAULT_MAX_DOWNLOADS: u32 = 5;

/// Default lifetime of a transfer
pub const DEFAULT_TTL_HOURS: i64 = 24;

/// Globally unique transfer identifier (UUID v4)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransferId(Uuid);

impl TransferId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransferId {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Uuid> for TransferId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // hyphenated lowercase
        self.0.fmt(f)
    }
}

impl FromStr for TransferId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Fields supplied by the sender when publishing a transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTransfer {
    pub storage_pointer: String,
    pub iv: String,
    pub file_name: String,
    pub file_type: String,
    pub size: u64,
}

/// Metadata document describing one transfer.
///
/// Immutable after creation except for `download_count`. Never carries the
/// decryption key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    /// Locator (public URL or storage key) of the ciphertext blob
    pub storage_pointer: String,
    /// Hex-encoded 16-byte IV
    pub iv: String,
    pub file_name: String,
    pub file_type: String,
    pub size: u64,
    pub download_count: u32,
    pub max_downloads: u32,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Usability of a record at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    /// Readable for decryption
    Active,
    /// `now >= expires_at`
    Expired,
    /// `download_count >= max_downloads`
    Exhausted,
}

impl TransferRecord {
    /// Expiry wins over quota when both apply.
    pub fn state_at(&self, now: DateTime<Utc>) -> RecordState {
        if now >= self.expires_at {
            RecordState::Expired
        } else if self.download_count >= self.max_downloads {
            RecordState::Exhausted
        } else {
            RecordState::Active
        }
    }

    pub fn remaining_downloads(&self) -> u32 {
        self.max_downloads.saturating_sub(self.download_count)
    }
}

/// Access limits applied when a record is created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferPolicy {
    pub max_downloads: u32,
    pub ttl: Duration,
}

impl Default for TransferPolicy {
    fn default() -> Self {
        Self {
            max_downloads: DEFAULT_MAX_DOWNLOADS,
            ttl: Duration::hours(DEFAULT_TTL_HOURS),
        }
    }
}

impl TransferPolicy {
    /// Build the initial record for a new transfer created at `now`.
    pub fn new_record(&self, new: NewTransfer, now: DateTime<Utc>) -> TransferRecord {
        TransferRecord {
            storage_pointer: new.storage_pointer,
            iv: new.iv,
            file_name: new.file_name,
            file_type: new.file_type,
            size: new.size,
            download_count: 0,
            max_downloads: self.max_downloads,
            created_at: now,
            expires_at: now + self.ttl,
        }
    }
}
