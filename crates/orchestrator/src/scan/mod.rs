#![forbid(unsafe_code)]

mod clamd;

pub use clamd::ClamdClient;

use crate::domain::{ScanFailure, ScanVerdict};
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait ScanClient: Send + Sync {
    /// Scan one file and normalize the daemon's answer. Never fails: every
    /// problem is folded into [`ScanVerdict::Error`].
    async fn scan(&self, path: &Path) -> ScanVerdict;

    /// Check that the daemon answers at all.
    async fn ping(&self) -> Result<(), ScanFailure>;
}
