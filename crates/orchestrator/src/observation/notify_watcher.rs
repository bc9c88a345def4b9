#![forbid(unsafe_code)]

use crate::domain::WatchTarget;
use crate::error::Error;
use crate::observation::{EventSink, FsEvent, NotificationSource};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use std::path::Path;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, channel};
use std::thread::JoinHandle;
use tracing::{info, trace, warn};

/// Notification source backed by the platform watcher (`inotify` on Linux).
/// Events are delivered to the sink from a single thread.
#[derive(Default)]
pub struct NotifyWatcher {
    targets: Vec<WatchTarget>,
    watcher: Option<RecommendedWatcher>,
    handle: Option<JoinHandle<()>>,
}

impl NotifyWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    fn delivery_loop(events: Receiver<notify::Result<Event>>, sink: Arc<dyn EventSink>) {
        for event in events {
            let event = match event {
                Ok(event) => event,
                Err(err) => {
                    warn!(%err, "filesystem watch error");
                    continue;
                }
            };
            for change in FsEvent::classify(event) {
                trace!(?change, "filesystem change");
                match change {
                    FsEvent::Created(path) => sink.on_created(path),
                    FsEvent::Modified(path) => sink.on_modified(path),
                }
            }
        }
        trace!("notification delivery loop exited");
    }
}

impl NotificationSource for NotifyWatcher {
    fn register(&mut self, path: &Path, recursive: bool) -> Result<(), Error> {
        if self.watcher.is_some() {
            return Err(Error::AlreadyStarted);
        }
        self.targets.push(WatchTarget::new(path, recursive));
        Ok(())
    }

    fn start(&mut self, sink: Arc<dyn EventSink>) -> Result<(), Error> {
        if self.watcher.is_some() {
            return Err(Error::AlreadyStarted);
        }

        let (tx, rx) = channel();
        let mut watcher = notify::recommended_watcher(tx)?;
        let mut watching = 0;
        for target in &self.targets {
            let mode = if target.recursive {
                RecursiveMode::Recursive
            } else {
                RecursiveMode::NonRecursive
            };
            match watcher.watch(&target.path, mode) {
                Ok(()) => {
                    watching += 1;
                    info!(path = ?target.path, recursive = target.recursive, "monitoring");
                }
                Err(err) => warn!(path = ?target.path, %err, "cannot watch target, skipping"),
            }
        }
        if watching == 0 {
            return Err(Error::NoWatchTargets);
        }

        let handle = std::thread::Builder::new()
            .name("cqr-notify".into())
            .spawn(move || Self::delivery_loop(rx, sink))?;

        self.watcher = Some(watcher);
        self.handle = Some(handle);
        info!(
            targets = watching,
            skipped = self.targets.len() - watching,
            "filesystem watcher started"
        );
        Ok(())
    }

    fn stop(&mut self) {
        // Dropping the watcher drops its event sender, which ends the
        // delivery loop once pending events are flushed.
        if self.watcher.take().is_some() {
            info!("filesystem watcher stopped");
        }
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take()
            && handle.join().is_err()
        {
            warn!("notification delivery thread panicked");
        }
    }
}

impl std::fmt::Debug for NotifyWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifyWatcher")
            .field("targets", &self.targets)
            .field("active", &self.watcher.is_some())
            .finish()
    }
}

impl Drop for NotifyWatcher {
    fn drop(&mut self) {
        self.stop();
        self.join();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use std::time::{Duration, Instant};
    use tempfile::tempdir;

    #[derive(Debug, Default)]
    struct Recorder {
        created: Mutex<Vec<PathBuf>>,
    }

    impl EventSink for Recorder {
        fn on_created(&self, path: PathBuf) {
            self.created.lock().unwrap().push(path);
        }

        fn on_modified(&self, _path: PathBuf) {}
    }

    #[test]
    fn unwatchable_target_is_skipped() {
        let dir = tempdir().unwrap();
        let watched = dir.path().join("watched");
        std::fs::create_dir(&watched).unwrap();
        let recorder = Arc::new(Recorder::default());

        let mut source = NotifyWatcher::new();
        source.register(&watched, false).unwrap();
        source.register(&dir.path().join("vanished"), false).unwrap();
        source.start(recorder.clone()).unwrap();

        let file = watched.join("dropped.exe");
        std::fs::write(&file, b"payload").unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while !recorder.created.lock().unwrap().contains(&file) {
            assert!(Instant::now() < deadline, "no event for the watched target");
            std::thread::sleep(Duration::from_millis(20));
        }

        source.stop();
        source.join();
    }

    #[test]
    fn fails_when_no_target_can_be_watched() {
        let dir = tempdir().unwrap();
        let mut source = NotifyWatcher::new();
        source.register(&dir.path().join("gone"), true).unwrap();

        let result = source.start(Arc::new(Recorder::default()));
        assert!(matches!(result, Err(Error::NoWatchTargets)));
    }
}
