#![forbid(unsafe_code)]

use std::path::PathBuf;

/// A directory or single file registered for monitoring. Fixed for the
/// lifetime of a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WatchTarget {
    pub path: PathBuf,
    pub recursive: bool,
}

impl WatchTarget {
    pub fn new(path: impl Into<PathBuf>, recursive: bool) -> Self {
        Self {
            path: path.into(),
            recursive,
        }
    }
}
