use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Workers {
    /// Number of concurrent scan workers. Zero is treated as one.
    pub size: usize,

    /// Pause before scanning a file reported as created or modified, so a
    /// file still being written is not scanned half-way. Startup scans skip
    /// it. **Measured in milliseconds**.
    #[serde_as(as = "serde_with::DurationMilliSeconds")]
    pub settle_delay: Duration,
}

impl Default for Workers {
    fn default() -> Self {
        Self {
            size: 4,
            settle_delay: Duration::from_secs(1),
        }
    }
}
