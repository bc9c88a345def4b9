#![forbid(unsafe_code)]

mod manager;
mod mover;

pub use manager::QuarantineManager;
pub use mover::{FileMover, FsMover, is_transient};

use crate::domain::QuarantineRecord;
use async_trait::async_trait;
use std::path::Path;

#[async_trait]
pub trait Quarantine: Send + Sync {
    /// Isolate a file believed to be infected. Never fails: every problem is
    /// reported through the returned record.
    async fn isolate(&self, path: &Path, signature: &str) -> QuarantineRecord;
}
