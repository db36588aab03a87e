//! nullshare-storage: OpenDAL-backed ciphertext blobs and transfer records

pub mod blob;
pub mod health;
pub mod metadata;
pub mod operator;
pub mod records;

pub use blob::{BlobLocation, BlobStore, OperatorBlobStore};
pub use health::check_health;
pub use metadata::{MetadataStore, RecordBackend, TransferStatus};
pub use operator::{build_from_core_config, S3Credentials};
pub use records::{MemoryRecordBackend, OperatorRecordBackend};
