#![forbid(unsafe_code)]

use crate::clock::Clock;
use crate::domain::{DirectoryState, IsolationOutcome, QuarantineRecord};
use crate::quarantine::mover::{FileMover, FsMover, is_transient};
use crate::quarantine::Quarantine;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Longest file name most Linux filesystems accept, in bytes.
const NAME_MAX: usize = 255;
const INFECTED_SUFFIX: &str = ".infected";

/// Moves infected files into the isolation directory and leaves an
/// incident note where they used to be.
pub struct QuarantineManager {
    dir: PathBuf,
    retries: u32,
    retry_delay: Duration,
    write_note: bool,
    clock: Arc<dyn Clock>,
    mover: Box<dyn FileMover>,
    /// Destinations handed out to isolations still in progress.
    reserved: Mutex<HashSet<PathBuf>>,
}

impl QuarantineManager {
    pub fn new(config: &config::Quarantine, clock: Arc<dyn Clock>) -> Self {
        Self::with_mover(config, clock, Box::new(FsMover))
    }

    pub fn with_mover(
        config: &config::Quarantine,
        clock: Arc<dyn Clock>,
        mover: Box<dyn FileMover>,
    ) -> Self {
        Self {
            dir: config.dir.clone(),
            retries: config.retries,
            retry_delay: config.retry_delay,
            write_note: config.write_note,
            clock,
            mover,
            reserved: Mutex::new(HashSet::new()),
        }
    }

    /// Create the isolation directory if needed and restrict a freshly
    /// created one to its owner. Failing to restrict it is reported, not
    /// fatal.
    pub async fn ensure_directory(&self) -> DirectoryState {
        if tokio::fs::metadata(&self.dir).await.is_ok_and(|m| m.is_dir()) {
            return DirectoryState::Existing;
        }

        if let Err(err) = tokio::fs::create_dir_all(&self.dir).await {
            error!(dir = ?self.dir, %err, "failed to create quarantine directory");
            return DirectoryState::Unavailable(err.to_string());
        }

        match self.mover.restrict_dir(&self.dir).await {
            Ok(()) => {
                info!(dir = ?self.dir, "quarantine directory created and secured");
                DirectoryState::Secured
            }
            Err(err) => {
                warn!(
                    dir = ?self.dir,
                    %err,
                    "quarantine directory created but could not be secured"
                );
                DirectoryState::Unsecured(err.to_string())
            }
        }
    }

    /// Pick `{YYYYMMDD-HHMMSS}_{name}.infected`, adding a counter to the
    /// timestamp when that name is taken on disk or by a concurrent isolation.
    /// `name` is shortened so the result fits in `NAME_MAX`.
    fn reserve_destination(&self, file_name: &str) -> PathBuf {
        let stamp = self.clock.now().format("%Y%m%d-%H%M%S").to_string();
        let mut reserved = match self.reserved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        let mut counter = 0u64;
        loop {
            let prefix = if counter == 0 {
                format!("{stamp}_")
            } else {
                format!("{stamp}-{counter}_")
            };
            let room = NAME_MAX.saturating_sub(prefix.len() + INFECTED_SUFFIX.len());
            let name = format!("{prefix}{}{INFECTED_SUFFIX}", truncate_name(file_name, room));
            let candidate = self.dir.join(name);
            if !reserved.contains(&candidate) && !candidate.exists() {
                reserved.insert(candidate.clone());
                return candidate;
            }
            counter += 1;
        }
    }

    fn release_destination(&self, destination: &Path) {
        let mut reserved = match self.reserved.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        reserved.remove(destination);
    }

    /// Try the move once, then up to `retries` more times while the failure
    /// looks like a lock. Returns the outcome and the number of attempts.
    async fn move_with_retries(&self, path: &Path, destination: &Path) -> (IsolationOutcome, u32) {
        let max_attempts = self.retries.saturating_add(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.mover.move_file(path, destination).await {
                Ok(()) => {
                    info!(?path, attempt, "file isolated");
                    return (IsolationOutcome::Isolated, attempt);
                }
                Err(err) if is_transient(&err) && attempt < max_attempts => {
                    warn!(
                        ?path,
                        attempt,
                        max_attempts,
                        %err,
                        "file is in use or access denied, retrying"
                    );
                    self.clock.sleep(self.retry_delay).await;
                }
                Err(err) if is_transient(&err) => {
                    error!(
                        ?path,
                        attempts = attempt,
                        %err,
                        "could not isolate file after retries, administrator privileges may be required"
                    );
                    return (IsolationOutcome::FailedAfterRetries, attempt);
                }
                Err(err) => {
                    error!(?path, %err, "critical error moving file, giving up");
                    return (IsolationOutcome::FailedAfterRetries, attempt);
                }
            }
        }
    }

    async fn leave_note(&self, original: &Path, file_name: &str, signature: &str) -> Option<PathBuf> {
        let folder = original.parent()?;
        let room = NAME_MAX.saturating_sub("Note_about_().txt".len());
        let note = folder.join(format!("Note_about_({}).txt", truncate_name(file_name, room)));
        let contents = format!(
            "The file '{file_name}' was removed by the CQr Server Protection.\n\
             Reason: Malware Detected ({signature})\n\
             Contact the Administrator if you believe this is an error."
        );
        match tokio::fs::write(&note, contents).await {
            Ok(()) => Some(note),
            Err(err) => {
                warn!(?note, %err, "could not write incident note");
                None
            }
        }
    }
}

#[async_trait]
impl Quarantine for QuarantineManager {
    async fn isolate(&self, path: &Path, signature: &str) -> QuarantineRecord {
        let directory = self.ensure_directory().await;

        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "unnamed".to_string());
        let destination = self.reserve_destination(&file_name);

        info!(?path, ?destination, signature, "attempting isolation");
        let (outcome, attempts) = self.move_with_retries(path, &destination).await;
        self.release_destination(&destination);

        let note = if outcome == IsolationOutcome::Isolated && self.write_note {
            self.leave_note(path, &file_name, signature).await
        } else {
            None
        };

        QuarantineRecord {
            original: path.to_path_buf(),
            destination,
            signature: signature.to_string(),
            outcome,
            attempts,
            directory,
            note,
        }
    }
}

/// Longest prefix of `name` that fits in `max` bytes without splitting a
/// character.
fn truncate_name(name: &str, max: usize) -> &str {
    if name.len() <= max {
        return name;
    }
    let mut end = max;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    &name[..end]
}

impl std::fmt::Debug for QuarantineManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QuarantineManager")
            .field("dir", &self.dir)
            .field("retries", &self.retries)
            .field("retry_delay", &self.retry_delay)
            .field("write_note", &self.write_note)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use chrono::{DateTime, Local, TimeZone};
    use std::io;
    use std::os::unix::fs::PermissionsExt;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::tempdir;

    /// Wall clock frozen at one instant; sleeps are skipped.
    #[derive(Debug)]
    struct FrozenClock(DateTime<Local>);

    #[async_trait]
    impl Clock for FrozenClock {
        fn now(&self) -> DateTime<Local> {
            self.0
        }

        async fn sleep(&self, _duration: Duration) {}
    }

    fn frozen() -> Arc<dyn Clock> {
        Arc::new(FrozenClock(
            Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap(),
        ))
    }

    /// Fails with `error` for the first `failures` calls, then renames.
    struct FlakyMover {
        failures: u32,
        error: fn() -> io::Error,
        calls: Arc<AtomicU32>,
    }

    #[async_trait]
    impl FileMover for FlakyMover {
        async fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                return Err((self.error)());
            }
            FsMover.move_file(from, to).await
        }

        async fn restrict_dir(&self, dir: &Path) -> io::Result<()> {
            FsMover.restrict_dir(dir).await
        }
    }

    /// Moves normally but can never restrict the directory.
    struct UnsecurableMover;

    #[async_trait]
    impl FileMover for UnsecurableMover {
        async fn move_file(&self, from: &Path, to: &Path) -> io::Result<()> {
            FsMover.move_file(from, to).await
        }

        async fn restrict_dir(&self, _dir: &Path) -> io::Result<()> {
            Err(io::Error::from(io::ErrorKind::PermissionDenied))
        }
    }

    fn settings(dir: &Path) -> config::Quarantine {
        config::Quarantine {
            dir: dir.to_path_buf(),
            retries: 5,
            retry_delay: Duration::from_millis(5),
            write_note: true,
        }
    }

    fn infected_file(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, b"X5O!P%@AP").unwrap();
        path
    }

    #[tokio::test]
    async fn isolates_and_leaves_note() {
        let root = tempdir().unwrap();
        let share = root.path().join("share");
        std::fs::create_dir(&share).unwrap();
        let file = infected_file(&share, "invoice.pdf.exe");

        let manager = QuarantineManager::new(&settings(&root.path().join("q")), frozen());
        let record = manager.isolate(&file, "Win.Trojan.Agent").await;

        assert_eq!(record.outcome, IsolationOutcome::Isolated);
        assert_eq!(record.attempts, 1);
        assert_eq!(record.directory, DirectoryState::Secured);
        assert_eq!(
            record.destination,
            root.path()
                .join("q")
                .join("20240309-140507_invoice.pdf.exe.infected")
        );
        assert!(!file.exists());
        assert!(record.destination.exists());

        let mode = std::fs::metadata(root.path().join("q"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o700);

        let note = share.join("Note_about_(invoice.pdf.exe).txt");
        assert_eq!(record.note.as_deref(), Some(note.as_path()));
        let text = std::fs::read_to_string(note).unwrap();
        assert!(text.contains("'invoice.pdf.exe'"));
        assert!(text.contains("Malware Detected (Win.Trojan.Agent)"));
        assert!(text.contains("Contact the Administrator"));
    }

    #[tokio::test]
    async fn existing_directory_is_left_alone() {
        let root = tempdir().unwrap();
        let qdir = root.path().join("q");
        std::fs::create_dir(&qdir).unwrap();
        let file = infected_file(root.path(), "a.bin");

        let manager = QuarantineManager::new(&settings(&qdir), Arc::new(SystemClock));
        let record = manager.isolate(&file, "Eicar-Test-Signature").await;

        assert_eq!(record.directory, DirectoryState::Existing);
        assert!(record.is_isolated());
    }

    #[tokio::test]
    async fn lock_released_within_window_is_isolated() {
        let root = tempdir().unwrap();
        let file = infected_file(root.path(), "locked.doc");
        let calls = Arc::new(AtomicU32::new(0));

        let manager = QuarantineManager::with_mover(
            &settings(&root.path().join("q")),
            frozen(),
            Box::new(FlakyMover {
                failures: 5,
                error: || io::Error::from(io::ErrorKind::PermissionDenied),
                calls: calls.clone(),
            }),
        );
        let record = manager.isolate(&file, "Eicar-Test-Signature").await;

        assert_eq!(record.outcome, IsolationOutcome::Isolated);
        assert_eq!(record.attempts, 6);
        assert_eq!(calls.load(Ordering::SeqCst), 6);
        assert!(!file.exists());
    }

    #[tokio::test]
    async fn lock_held_for_whole_window_fails_without_note() {
        let root = tempdir().unwrap();
        let file = infected_file(root.path(), "locked.doc");
        let calls = Arc::new(AtomicU32::new(0));

        let manager = QuarantineManager::with_mover(
            &settings(&root.path().join("q")),
            frozen(),
            Box::new(FlakyMover {
                failures: u32::MAX,
                error: || io::Error::from_raw_os_error(libc::EBUSY),
                calls: calls.clone(),
            }),
        );
        let record = manager.isolate(&file, "Eicar-Test-Signature").await;

        assert_eq!(record.outcome, IsolationOutcome::FailedAfterRetries);
        assert_eq!(record.attempts, 6);
        assert_eq!(record.note, None);
        assert!(file.exists());
        assert!(!root.path().join("Note_about_(locked.doc).txt").exists());
    }

    #[tokio::test]
    async fn other_errors_abort_immediately() {
        let root = tempdir().unwrap();
        let file = infected_file(root.path(), "a.bin");
        let calls = Arc::new(AtomicU32::new(0));

        let manager = QuarantineManager::with_mover(
            &settings(&root.path().join("q")),
            frozen(),
            Box::new(FlakyMover {
                failures: u32::MAX,
                error: || io::Error::from_raw_os_error(libc::ENOSPC),
                calls: calls.clone(),
            }),
        );
        let record = manager.isolate(&file, "Eicar-Test-Signature").await;

        assert_eq!(record.outcome, IsolationOutcome::FailedAfterRetries);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn vanished_file_fails_without_retry() {
        let root = tempdir().unwrap();
        let manager = QuarantineManager::new(&settings(&root.path().join("q")), frozen());

        let record = manager
            .isolate(&root.path().join("already-gone.exe"), "Eicar-Test-Signature")
            .await;

        assert_eq!(record.outcome, IsolationOutcome::FailedAfterRetries);
        assert_eq!(record.attempts, 1);
    }

    #[tokio::test]
    async fn same_name_same_second_does_not_collide() {
        let root = tempdir().unwrap();
        let first_dir = root.path().join("one");
        let second_dir = root.path().join("two");
        std::fs::create_dir(&first_dir).unwrap();
        std::fs::create_dir(&second_dir).unwrap();
        let first = infected_file(&first_dir, "setup.exe");
        let second = infected_file(&second_dir, "setup.exe");
        std::fs::write(&second, b"second payload").unwrap();

        let manager = Arc::new(QuarantineManager::new(
            &settings(&root.path().join("q")),
            frozen(),
        ));
        let (a, b) = tokio::join!(
            manager.isolate(&first, "Sig.A"),
            manager.isolate(&second, "Sig.B")
        );

        assert!(a.is_isolated() && b.is_isolated());
        assert_ne!(a.destination, b.destination);
        let mut contents = vec![
            std::fs::read(&a.destination).unwrap(),
            std::fs::read(&b.destination).unwrap(),
        ];
        contents.sort();
        assert_eq!(contents, vec![b"X5O!P%@AP".to_vec(), b"second payload".to_vec()]);
    }

    #[test]
    fn counter_is_appended_to_timestamp() {
        let root = tempdir().unwrap();
        let manager = QuarantineManager::new(&settings(root.path()), frozen());

        let first = manager.reserve_destination("a.exe");
        let second = manager.reserve_destination("a.exe");
        assert_eq!(first, root.path().join("20240309-140507_a.exe.infected"));
        assert_eq!(second, root.path().join("20240309-140507-1_a.exe.infected"));

        manager.release_destination(&first);
        assert_eq!(manager.reserve_destination("a.exe"), first);
    }

    #[tokio::test]
    async fn unsecured_directory_does_not_block_isolation() {
        let root = tempdir().unwrap();
        let file = infected_file(root.path(), "dropper.js");

        let manager = QuarantineManager::with_mover(
            &settings(&root.path().join("q")),
            frozen(),
            Box::new(UnsecurableMover),
        );
        let record = manager.isolate(&file, "JS.Downloader").await;

        assert!(matches!(record.directory, DirectoryState::Unsecured(_)));
        assert_eq!(record.outcome, IsolationOutcome::Isolated);
        assert!(!file.exists());
        assert!(record.destination.exists());
    }

    #[tokio::test]
    async fn unwritable_note_keeps_file_isolated() {
        let root = tempdir().unwrap();
        let file = infected_file(root.path(), "macro.docm");
        // A directory where the note should go makes the write fail.
        std::fs::create_dir(root.path().join("Note_about_(macro.docm).txt")).unwrap();

        let manager = QuarantineManager::new(&settings(&root.path().join("q")), frozen());
        let record = manager.isolate(&file, "Doc.Macro.Agent").await;

        assert_eq!(record.outcome, IsolationOutcome::Isolated);
        assert_eq!(record.note, None);
        assert!(!file.exists());
        assert!(record.destination.exists());
    }

    #[tokio::test]
    async fn long_file_name_is_shortened_to_fit() {
        let root = tempdir().unwrap();
        let name = "a".repeat(248);
        let file = infected_file(root.path(), &name);

        let manager = QuarantineManager::new(&settings(&root.path().join("q")), frozen());
        let record = manager.isolate(&file, "Eicar-Test-Signature").await;

        assert_eq!(record.outcome, IsolationOutcome::Isolated);
        assert!(!file.exists());
        let stored = record.destination.file_name().unwrap().to_str().unwrap();
        assert_eq!(stored.len(), NAME_MAX);
        assert!(stored.starts_with("20240309-140507_aaa"));
        assert!(stored.ends_with("a.infected"));
        assert!(record.note.is_some_and(|note| note.exists()));
    }

    #[test]
    fn shortened_names_keep_whole_characters() {
        let name = "ж".repeat(130);
        let cut = truncate_name(&name, 229);
        assert_eq!(cut.len(), 228);
        assert!(cut.chars().all(|c| c == 'ж'));
        assert_eq!(truncate_name("short.exe", 229), "short.exe");
    }

    #[test]
    fn counter_does_not_push_long_names_past_the_limit() {
        let root = tempdir().unwrap();
        let manager = QuarantineManager::new(&settings(root.path()), frozen());
        let name = "b".repeat(300);

        let first = manager.reserve_destination(&name);
        let second = manager.reserve_destination(&name);
        assert_ne!(first, second);
        for path in [first, second] {
            assert!(path.file_name().unwrap().len() <= NAME_MAX);
        }
    }
}
