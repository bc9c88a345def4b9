#![forbid(unsafe_code)]

use std::fmt;
use std::path::PathBuf;

/// What caused a file to be scanned.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScanEvent {
    Created,
    Modified,
    InitialScan,
}

impl ScanEvent {
    /// Live events come from the notification source and may still be
    /// mid-write when they arrive.
    pub fn is_live(self) -> bool {
        matches!(self, Self::Created | Self::Modified)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Modified => "MODIFIED",
            Self::InitialScan => "INITIAL_SCAN",
        }
    }
}

impl fmt::Display for ScanEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One unit of work handed from the dispatcher to a worker. `seq` is only
/// for diagnostics; tasks carry no ordering guarantee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTask {
    pub path: PathBuf,
    pub event: ScanEvent,
    pub seq: u64,
}

impl ScanTask {
    pub fn new(path: impl Into<PathBuf>, event: ScanEvent, seq: u64) -> Self {
        Self {
            path: path.into(),
            event,
            seq,
        }
    }
}
