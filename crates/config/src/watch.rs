use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Watch {
    /// Newline-delimited list of watched paths. See [`crate::WatchList`].
    pub paths_file: PathBuf,

    /// Whether watched directories include their subdirectories.
    pub recursive: bool,

    /// Scan every existing file under the watched paths once at startup.
    pub initial_scan: bool,
}

impl Default for Watch {
    fn default() -> Self {
        Self {
            paths_file: PathBuf::from("/etc/cqr/paths.txt"),
            recursive: true,
            initial_scan: true,
        }
    }
}
