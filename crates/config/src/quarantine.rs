use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::path::PathBuf;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Quarantine {
    /// Isolation directory. Created on first use and locked down to the
    /// owner only.
    pub dir: PathBuf,

    /// How many more times a move is attempted after the first one failed
    /// because the file was locked or access was denied.
    pub retries: u32,

    /// Pause between two move attempts. **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds")]
    pub retry_delay: Duration,

    /// Whether to leave an incident note next to the removed file.
    pub write_note: bool,
}

impl Default for Quarantine {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("/var/lib/cqr/quarantine"),
            retries: 5,
            retry_delay: Duration::from_secs(1),
            write_note: true,
        }
    }
}
