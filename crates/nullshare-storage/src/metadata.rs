//! Transfer record store with expiry and quota gatekeeping
//!
//! `RecordBackend` is the raw document store (insert, get, atomic increment).
//! `MetadataStore` layers the access policy on top: creation timestamps and
//! limits come from here, and every `read` checks expiry, then quota, before a
//! record is handed out.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::{info, warn};

use nullshare_core::{
    Clock, NewTransfer, RecordState, SystemClock, TransferError, TransferId, TransferPolicy,
    TransferRecord, TransferResult,
};

/// Document store holding one record per transfer.
///
/// Backend failures are reported as `TransferError::Persistence`.
#[async_trait]
pub trait RecordBackend: Send + Sync {
    /// Store a new record. Fails if a record already exists under `id`.
    async fn insert(&self, id: &TransferId, record: &TransferRecord) -> TransferResult<()>;

    /// Fetch a record without any policy checks.
    async fn get(&self, id: &TransferId) -> TransferResult<Option<TransferRecord>>;

    /// Add one to `download_count` without a client-side read-modify-write
    /// race, returning the new count. `NotFound` if the record is missing.
    async fn increment_download_count(&self, id: &TransferId) -> TransferResult<u32>;
}

/// A record together with its state at inspection time
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferStatus {
    pub id: TransferId,
    pub record: TransferRecord,
    pub state: RecordState,
    pub checked_at: DateTime<Utc>,
}

impl TransferStatus {
    pub fn remaining_downloads(&self) -> u32 {
        match self.state {
            RecordState::Active => self.record.remaining_downloads(),
            RecordState::Expired | RecordState::Exhausted => 0,
        }
    }
}

/// Policy-enforcing adapter over a `RecordBackend`.
#[derive(Clone)]
pub struct MetadataStore {
    backend: Arc<dyn RecordBackend>,
    policy: TransferPolicy,
    clock: Arc<dyn Clock>,
}

impl MetadataStore {
    pub fn new(backend: Arc<dyn RecordBackend>, policy: TransferPolicy) -> Self {
        Self::with_clock(backend, policy, Arc::new(SystemClock))
    }

    pub fn with_clock(
        backend: Arc<dyn RecordBackend>,
        policy: TransferPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            backend,
            policy,
            clock,
        }
    }

    /// Publish a new record with `download_count = 0` and the configured
    /// quota and lifetime.
    pub async fn create(
        &self,
        id: &TransferId,
        new: NewTransfer,
    ) -> TransferResult<TransferRecord> {
        let record = self.policy.new_record(new, self.clock.now());
        self.backend.insert(id, &record).await?;
        info!(
            transfer_id = %id,
            max_downloads = record.max_downloads,
            expires_at = %record.expires_at,
            "transfer record created"
        );
        Ok(record)
    }

    /// Fetch a record that is still usable.
    ///
    /// `NotFound`, then `Expired` (`now >= expires_at`), then `QuotaExceeded`
    /// (`download_count >= max_downloads`). A failing record is never returned.
    pub async fn read(&self, id: &TransferId) -> TransferResult<TransferRecord> {
        let record = self
            .backend
            .get(id)
            .await?
            .ok_or(TransferError::NotFound(*id))?;

        match record.state_at(self.clock.now()) {
            RecordState::Active => Ok(record),
            RecordState::Expired => Err(TransferError::Expired {
                id: *id,
                expired_at: record.expires_at,
            }),
            RecordState::Exhausted => Err(TransferError::QuotaExceeded {
                id: *id,
                max_downloads: record.max_downloads,
            }),
        }
    }

    /// Count one successful download.
    ///
    /// Best-effort: a failure is logged and swallowed so that an otherwise
    /// successful receive is not reported as failed. Returns the new count
    /// when the backend confirmed it.
    pub async fn increment_download_count(&self, id: &TransferId) -> Option<u32> {
        match self.backend.increment_download_count(id).await {
            Ok(count) => {
                info!(transfer_id = %id, download_count = count, "download counted");
                Some(count)
            }
            Err(e) => {
                warn!(transfer_id = %id, error = %e, "failed to increment download count");
                None
            }
        }
    }

    /// Look at a record without the usability gate. Never used on the
    /// receive path.
    pub async fn inspect(&self, id: &TransferId) -> TransferResult<TransferStatus> {
        let record = self
            .backend
            .get(id)
            .await?
            .ok_or(TransferError::NotFound(*id))?;
        let checked_at = self.clock.now();
        Ok(TransferStatus {
            id: *id,
            state: record.state_at(checked_at),
            record,
            checked_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::MemoryRecordBackend;
    use chrono::{Duration, TimeZone};
    use nullshare_core::ManualClock;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
    }

    fn new_transfer() -> NewTransfer {
        NewTransfer {
            storage_pointer: "uploads/t.enc".into(),
            iv: "0f".repeat(16),
            file_name: "report.pdf".into(),
            file_type: "application/pdf".into(),
            size: 10,
        }
    }

    fn store() -> (MetadataStore, Arc<MemoryRecordBackend>, Arc<ManualClock>) {
        let backend = Arc::new(MemoryRecordBackend::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let store = MetadataStore::with_clock(
            backend.clone(),
            TransferPolicy::default(),
            clock.clone(),
        );
        (store, backend, clock)
    }

    #[tokio::test]
    async fn test_create_sets_defaults() {
        let (store, _, _) = store();
        let id = TransferId::new();

        let record = store.create(&id, new_transfer()).await.unwrap();

        assert_eq!(record.download_count, 0);
        assert_eq!(record.max_downloads, 5);
        assert_eq!(record.created_at, t0());
        assert_eq!(record.expires_at, t0() + Duration::hours(24));
        assert_eq!(store.read(&id).await.unwrap(), record);
    }

    #[tokio::test]
    async fn test_create_twice_is_persistence_error() {
        let (store, _, _) = store();
        let id = TransferId::new();
        store.create(&id, new_transfer()).await.unwrap();

        let err = store.create(&id, new_transfer()).await.unwrap_err();
        assert!(matches!(err, TransferError::Persistence(_)), "got {err:?}");
    }

    #[tokio::test]
    async fn test_read_missing_is_not_found() {
        let (store, _, _) = store();
        let id = TransferId::new();
        assert!(matches!(
            store.read(&id).await,
            Err(TransferError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_read_quota_exhausted() {
        let (store, backend, _) = store();
        let id = TransferId::new();
        let mut record = TransferPolicy::default().new_record(new_transfer(), t0());
        record.download_count = 5;
        backend.insert(&id, &record).await.unwrap();

        let err = store.read(&id).await.unwrap_err();
        assert!(
            matches!(err, TransferError::QuotaExceeded { max_downloads: 5, .. }),
            "got {err:?}"
        );
    }

    #[tokio::test]
    async fn test_read_expired_regardless_of_count() {
        let (store, backend, _) = store();
        let id = TransferId::new();
        let created = t0() - Duration::hours(30);
        let record = TransferPolicy::default().new_record(new_transfer(), created);
        backend.insert(&id, &record).await.unwrap();

        let err = store.read(&id).await.unwrap_err();
        assert!(matches!(err, TransferError::Expired { .. }), "got {err:?}");
    }

    #[tokio::test]
    async fn test_read_expires_exactly_at_deadline() {
        let (store, _, clock) = store();
        let id = TransferId::new();
        store.create(&id, new_transfer()).await.unwrap();

        clock.advance(Duration::hours(24) - Duration::seconds(1));
        assert!(store.read(&id).await.is_ok());

        clock.advance(Duration::seconds(1));
        assert!(matches!(
            store.read(&id).await,
            Err(TransferError::Expired { .. })
        ));
    }

    #[tokio::test]
    async fn test_increment_until_quota() {
        let (store, _, _) = store();
        let id = TransferId::new();
        store.create(&id, new_transfer()).await.unwrap();

        for expected in 1..=5 {
            assert!(store.read(&id).await.is_ok());
            assert_eq!(store.increment_download_count(&id).await, Some(expected));
        }
        assert!(matches!(
            store.read(&id).await,
            Err(TransferError::QuotaExceeded { .. })
        ));
    }

    #[tokio::test]
    async fn test_increment_missing_is_swallowed() {
        let (store, _, _) = store();
        assert_eq!(store.increment_download_count(&TransferId::new()).await, None);
    }

    #[tokio::test]
    async fn test_inspect_reports_state_without_gating() {
        let (store, _, clock) = store();
        let id = TransferId::new();
        store.create(&id, new_transfer()).await.unwrap();
        store.increment_download_count(&id).await;

        let status = store.inspect(&id).await.unwrap();
        assert_eq!(status.state, RecordState::Active);
        assert_eq!(status.remaining_downloads(), 4);

        clock.advance(Duration::hours(25));
        let status = store.inspect(&id).await.unwrap();
        assert_eq!(status.state, RecordState::Expired);
        assert_eq!(status.remaining_downloads(), 0);
        assert_eq!(status.record.download_count, 1);
    }
}
