#![forbid(unsafe_code)]

use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IsolationOutcome {
    Isolated,
    FailedAfterRetries,
}

/// State of the isolation directory as observed by one isolation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectoryState {
    /// Already present; its permissions were left alone.
    Existing,
    /// Freshly created and restricted to the owner.
    Secured,
    /// Freshly created, but restricting it failed.
    Unsecured(String),
    /// Could not be created at all.
    Unavailable(String),
}

/// Result of isolating one file. Lives only as long as the log line that
/// reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuarantineRecord {
    pub original: PathBuf,
    pub destination: PathBuf,
    pub signature: String,
    pub outcome: IsolationOutcome,
    pub attempts: u32,
    pub directory: DirectoryState,
    /// Incident note left next to the original location, if one was written.
    pub note: Option<PathBuf>,
}

impl QuarantineRecord {
    pub fn is_isolated(&self) -> bool {
        self.outcome == IsolationOutcome::Isolated
    }
}
