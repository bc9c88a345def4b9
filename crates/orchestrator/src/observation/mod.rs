#![forbid(unsafe_code)]

mod event;
mod notify_watcher;

pub use event::FsEvent;
pub use notify_watcher::NotifyWatcher;

use crate::error::Error;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Receiver of filesystem notifications.
pub trait EventSink: Send + Sync {
    fn on_created(&self, path: PathBuf);
    fn on_modified(&self, path: PathBuf);
}

/// Something that watches paths and calls an [`EventSink`] on changes.
pub trait NotificationSource: Send {
    /// Add a path to watch. Only valid before [`NotificationSource::start`].
    fn register(&mut self, path: &Path, recursive: bool) -> Result<(), Error>;
    /// Begin delivering events for every registered path.
    fn start(&mut self, sink: Arc<dyn EventSink>) -> Result<(), Error>;
    /// Stop accepting new events.
    fn stop(&mut self);
    /// Wait until the last event has been delivered.
    fn join(&mut self);
}
