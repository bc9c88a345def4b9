#![forbid(unsafe_code)]

mod quarantine_record;
mod target;
mod task;
mod verdict;

pub use quarantine_record::{DirectoryState, IsolationOutcome, QuarantineRecord};
pub use target::WatchTarget;
pub use task::{ScanEvent, ScanTask};
pub use verdict::{ScanFailure, ScanVerdict, UNKNOWN_SIGNATURE};
