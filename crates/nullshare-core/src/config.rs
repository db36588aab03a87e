use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{TransferError, TransferResult};
use crate::types::{TransferPolicy, DEFAULT_MAX_DOWNLOADS, DEFAULT_TTL_HOURS};

/// Top-level configuration (loaded from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NullshareConfig {
    /// Log level (default: info)
    pub log_level: String,
    /// Log format: "json" or "text"
    pub log_format: String,
    pub storage: StorageConfig,
    pub metadata: MetadataConfig,
    pub transfer: TransferConfig,
    pub receive: ReceiveConfig,
}

/// Which OpenDAL service backs both stores
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// S3-compatible object storage
    S3,
    /// Local directory (single machine or shared mount)
    Fs,
    /// Process memory; nothing survives exit
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// S3 endpoint
    pub endpoint: String,
    /// S3 region (default: us-east-1)
    pub region: String,
    /// Bucket holding blobs and records
    pub bucket: String,
    /// Root directory for the fs backend
    pub root: PathBuf,
    /// Enforce HTTPS for S3 connections (warn/error on HTTP endpoints)
    pub enforce_tls: bool,
    /// Public base URL for blob pointers (empty: pointers are storage keys)
    pub public_url: String,
    /// Object prefix for ciphertext blobs
    pub blob_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataConfig {
    /// Object prefix for transfer records
    pub prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferConfig {
    /// Successful downloads allowed per transfer (default: 5)
    pub max_downloads: u32,
    /// Transfer lifetime in hours (default: 24)
    pub ttl_hours: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReceiveConfig {
    /// Directory decrypted files are written to
    pub output_dir: PathBuf,
}

impl NullshareConfig {
    /// Reject settings that would create unusable transfers.
    pub fn validate(&self) -> TransferResult<()> {
        if self.transfer.max_downloads == 0 {
            return Err(TransferError::Config(
                "transfer.max_downloads must be at least 1".into(),
            ));
        }
        if self.transfer.ttl_hours <= 0 {
            return Err(TransferError::Config(
                "transfer.ttl_hours must be positive".into(),
            ));
        }
        if self.storage.backend == StorageBackend::S3 && self.storage.bucket.is_empty() {
            return Err(TransferError::Config(
                "storage.bucket is required for the s3 backend".into(),
            ));
        }
        Ok(())
    }

    pub fn policy(&self) -> TransferPolicy {
        TransferPolicy {
            max_downloads: self.transfer.max_downloads,
            ttl: Duration::hours(self.transfer.ttl_hours),
        }
    }
}

impl Default for NullshareConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            log_format: "text".into(),
            storage: StorageConfig::default(),
            metadata: MetadataConfig::default(),
            transfer: TransferConfig::default(),
            receive: ReceiveConfig::default(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Fs,
            endpoint: "http://localhost:8333".into(),
            region: "us-east-1".into(),
            bucket: "nullshare".into(),
            root: PathBuf::from("~/.local/share/nullshare"),
            enforce_tls: false,
            public_url: String::new(),
            blob_prefix: "uploads".into(),
        }
    }
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            prefix: "transfers".into(),
        }
    }
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            max_downloads: DEFAULT_MAX_DOWNLOADS,
            ttl_hours: DEFAULT_TTL_HOURS,
        }
    }
}

impl Default for ReceiveConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
        }
    }
}
