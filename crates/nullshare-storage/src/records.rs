//! `RecordBackend` implementations
//!
//!   - **Memory**: a map behind a mutex. Increments are atomic.
//!   - **Operator**: one JSON document per transfer at
//!     `{prefix}/{transfer_id}.json` on any OpenDAL service. Increments use
//!     ETag-conditional writes where the service supports them and fall back to
//!     a process-local lock otherwise.
//!
//! A conditional write whose response is lost is replayed by the S3
//! operator's `RetryLayer`; the replay sees `ConditionNotMatch` and the loop
//! counts again. That can over-count a download, which only tightens the
//! quota.

use async_trait::async_trait;
use opendal::Operator;
use std::collections::HashMap;
use std::sync::Mutex;
use tracing::debug;

use nullshare_core::{TransferError, TransferId, TransferRecord, TransferResult};

use crate::metadata::RecordBackend;

/// Attempts at a conditional increment before giving up under contention
const MAX_CAS_ATTEMPTS: usize = 8;

// ── Memory backend ────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct MemoryRecordBackend {
    records: Mutex<HashMap<TransferId, TransferRecord>>,
}

impl MemoryRecordBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<TransferId, TransferRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[async_trait]
impl RecordBackend for MemoryRecordBackend {
    async fn insert(&self, id: &TransferId, record: &TransferRecord) -> TransferResult<()> {
        let mut records = self.lock();
        if records.contains_key(id) {
            return Err(TransferError::Persistence(format!(
                "record {id} already exists"
            )));
        }
        records.insert(*id, record.clone());
        Ok(())
    }

    async fn get(&self, id: &TransferId) -> TransferResult<Option<TransferRecord>> {
        Ok(self.lock().get(id).cloned())
    }

    async fn increment_download_count(&self, id: &TransferId) -> TransferResult<u32> {
        let mut records = self.lock();
        let record = records.get_mut(id).ok_or(TransferError::NotFound(*id))?;
        record.download_count = record.download_count.saturating_add(1);
        Ok(record.download_count)
    }
}

// ── OpenDAL backend ───────────────────────────────────────────────────────────

pub struct OperatorRecordBackend {
    op: Operator,
    prefix: String,
    /// Serializes check-then-write sequences when the service has no
    /// conditional writes. Only covers this process.
    write_lock: tokio::sync::Mutex<()>,
}

impl OperatorRecordBackend {
    pub fn new(op: Operator, prefix: &str) -> Self {
        Self {
            op,
            prefix: prefix.trim_matches('/').to_string(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    fn path(&self, id: &TransferId) -> String {
        if self.prefix.is_empty() {
            format!("{id}.json")
        } else {
            format!("{}/{id}.json", self.prefix)
        }
    }

    async fn load(&self, path: &str) -> TransferResult<Option<TransferRecord>> {
        let bytes = match self.op.read(path).await {
            Ok(buf) => buf.to_vec(),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(TransferError::Persistence(format!(
                    "reading record {path}: {e}"
                )))
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| TransferError::Persistence(format!("parsing record {path}: {e}")))
    }

    fn encode(record: &TransferRecord) -> TransferResult<Vec<u8>> {
        serde_json::to_vec_pretty(record)
            .map_err(|e| TransferError::Persistence(format!("serializing record: {e}")))
    }

    async fn increment_conditional(&self, id: &TransferId, path: &str) -> TransferResult<Option<u32>> {
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let meta = match self.op.stat(path).await {
                Ok(meta) => meta,
                Err(e) if e.kind() == opendal::ErrorKind::NotFound => {
                    return Err(TransferError::NotFound(*id))
                }
                Err(e) => {
                    return Err(TransferError::Persistence(format!(
                        "stat record {path}: {e}"
                    )))
                }
            };
            let Some(etag) = meta.etag().map(str::to_string) else {
                // no ETag from this service; let the caller take the lock path
                return Ok(None);
            };

            let mut record = self.load(path).await?.ok_or(TransferError::NotFound(*id))?;
            record.download_count = record.download_count.saturating_add(1);
            let bytes = Self::encode(&record)?;

            match self.op.write_with(path, bytes).if_match(&etag).await {
                Ok(_) => return Ok(Some(record.download_count)),
                Err(e) if e.kind() == opendal::ErrorKind::ConditionNotMatch => {
                    debug!(transfer_id = %id, attempt, "record changed concurrently; retrying increment");
                }
                Err(e) => {
                    return Err(TransferError::Persistence(format!(
                        "updating record {path}: {e}"
                    )))
                }
            }
        }
        Err(TransferError::Persistence(format!(
            "record {id} is under contention; increment gave up after {MAX_CAS_ATTEMPTS} attempts"
        )))
    }

    async fn increment_locked(&self, id: &TransferId, path: &str) -> TransferResult<u32> {
        let _guard = self.write_lock.lock().await;
        let mut record = self.load(path).await?.ok_or(TransferError::NotFound(*id))?;
        record.download_count = record.download_count.saturating_add(1);
        self.op
            .write(path, Self::encode(&record)?)
            .await
            .map_err(|e| TransferError::Persistence(format!("updating record {path}: {e}")))?;
        Ok(record.download_count)
    }
}

#[async_trait]
impl RecordBackend for OperatorRecordBackend {
    async fn insert(&self, id: &TransferId, record: &TransferRecord) -> TransferResult<()> {
        let path = self.path(id);
        let bytes = Self::encode(record)?;

        if self.op.info().full_capability().write_with_if_not_exists {
            return match self.op.write_with(&path, bytes).if_not_exists(true).await {
                Ok(_) => Ok(()),
                Err(e) if e.kind() == opendal::ErrorKind::ConditionNotMatch => Err(
                    TransferError::Persistence(format!("record {id} already exists")),
                ),
                Err(e) => Err(TransferError::Persistence(format!(
                    "writing record {path}: {e}"
                ))),
            };
        }

        let _guard = self.write_lock.lock().await;
        let exists = self
            .op
            .exists(&path)
            .await
            .map_err(|e| TransferError::Persistence(format!("checking record {path}: {e}")))?;
        if exists {
            return Err(TransferError::Persistence(format!(
                "record {id} already exists"
            )));
        }
        self.op
            .write(&path, bytes)
            .await
            .map_err(|e| TransferError::Persistence(format!("writing record {path}: {e}")))?;
        Ok(())
    }

    async fn get(&self, id: &TransferId) -> TransferResult<Option<TransferRecord>> {
        self.load(&self.path(id)).await
    }

    async fn increment_download_count(&self, id: &TransferId) -> TransferResult<u32> {
        let path = self.path(id);
        if self.op.info().full_capability().write_with_if_match {
            if let Some(count) = self.increment_conditional(id, &path).await? {
                return Ok(count);
            }
        }
        self.increment_locked(id, &path).await
    }
}
