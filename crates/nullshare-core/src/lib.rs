pub mod clock;
pub mod config;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{ErrorKind, TransferError, TransferResult};
pub use types::{NewTransfer, RecordState, TransferId, TransferPolicy, TransferRecord};
