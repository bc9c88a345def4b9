#![forbid(unsafe_code)]

/// Signature reported when the daemon says `FOUND` without naming a threat.
pub const UNKNOWN_SIGNATURE: &str = "UNKNOWN";

/// Normalized outcome of one scan. Anything that prevents a definite answer
/// is an `Error`, never `Clean`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanVerdict {
    Clean,
    Infected(String),
    Error(ScanFailure),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanFailure {
    #[error("not found")]
    NotFound,

    #[error("permission denied")]
    PermissionDenied,

    #[error("scan daemon unavailable at {addr}: {reason}")]
    DaemonUnavailable { addr: String, reason: String },

    #[error("scan timed out")]
    Timeout,

    #[error("{0}")]
    Daemon(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("i/o error: {0}")]
    Io(String),
}

impl ScanFailure {
    pub fn from_io(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied,
            _ => Self::Io(err.to_string()),
        }
    }
}
