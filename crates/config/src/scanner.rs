use serde::{Deserialize, Serialize};
use serde_with::serde_as;
use std::time::Duration;

/// Where and how to reach the clamd scanning daemon.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Scanner {
    /// Host the daemon listens on. clamd is normally bound to loopback
    /// (`TCPAddr 127.0.0.1` in `clamd.conf`).
    pub host: String,

    /// TCP port of the daemon (`TCPSocket` in `clamd.conf`).
    pub port: u16,

    /// Upper bound for establishing the connection. **Measured in seconds**.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub connect_timeout: Duration,

    /// Upper bound for a whole scan request, from sending the command until
    /// the daemon closes the connection. **Measured in seconds**.
    ///
    /// ## Note
    ///
    /// Large archives can take a while to unpack and scan. Setting this too
    /// low turns slow scans into errors.
    #[serde_as(as = "serde_with::DurationSeconds")]
    pub io_timeout: Duration,
}

impl Default for Scanner {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".into(),
            port: 3310,
            connect_timeout: Duration::from_secs(5),
            io_timeout: Duration::from_secs(60),
        }
    }
}

impl Scanner {
    /// `host:port` form suitable for `TcpStream::connect`.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
