//! nullshare-transfer: send/receive orchestration and share links

pub mod engine;
pub mod link;

pub use engine::{
    detect_file_type, ReceivedFile, SentTransfer, StageFn, TransferEngine,
    TransferStage, DEFAULT_FILE_TYPE,
};
pub use link::TransferLink;
