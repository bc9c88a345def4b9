use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct System {
    /// Nice increment applied to the agent at startup, so scanning yields
    /// CPU to interactive work. Clamped to `0..=19`; zero leaves the
    /// priority untouched.
    pub nice: i32,

    /// Move the agent's disk I/O to the idle scheduling class.
    ///
    /// # Note
    ///
    /// The daemon reads the files itself, so this mostly affects the
    /// startup walk and quarantine moves.
    pub idle_io: bool,
}

impl Default for System {
    fn default() -> Self {
        Self {
            nice: 10,
            idle_io: true,
        }
    }
}

impl System {
    pub fn clamp(&mut self) {
        self.nice = self.nice.clamp(0, 19);
    }
}
