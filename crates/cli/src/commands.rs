//! Implementations of the `cqr` subcommands.

use crate::priority;
use crate::signals::{SignalEvent, wait_for_signal};
use anyhow::Context;
use config::{AddOutcome, Config, WatchList};
use orchestrator::{ControlEvent, NotifyWatcher, ScanEngine, Services};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub const BANNER: &str = r"
   █████████     ██████
  ███░░░░░███  ███░░░░███
 ███     ░░░  ███    ░░███ ████████
░███         ░███     ░███░░███░░███
░███         ░███   ██░███ ░███ ░░░
░░███     ███░░███ ░░████  ░███
 ░░█████████  ░░░██████░██ █████
  ░░░░░░░░░     ░░░░░░ ░░ ░░░░░

CQr [Secure] Protection System - Real-Time File Protection
";

pub fn banner(out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "{BANNER}")?;
    writeln!(out, "Use 'cqr help' to see available commands.")?;
    out.flush()
}

pub fn add(list: &Path, target: &str, out: &mut impl Write) -> anyhow::Result<()> {
    let (path, outcome) = WatchList::add(list, target)
        .with_context(|| format!("failed to add {target:?} to {}", list.display()))?;
    match outcome {
        AddOutcome::Added => writeln!(out, "[OK] Added to configuration: {}", path.display())?,
        AddOutcome::AlreadyPresent => {
            writeln!(out, "[!] Path is already monitored: {}", path.display())?
        }
    }
    Ok(())
}

pub fn list(list: &Path, out: &mut impl Write) -> anyhow::Result<()> {
    let targets = WatchList::load(list)
        .with_context(|| format!("failed to read watch list {}", list.display()))?;

    writeln!(out, "--- Active Monitor Configuration ---")?;
    if targets.is_empty() {
        writeln!(out, "(No paths configured. Use 'cqr add <path>'.)")?;
    }
    for (idx, path) in targets.entries().iter().enumerate() {
        writeln!(out, "[{}] {}", idx + 1, path.display())?;
    }
    writeln!(out, "{}", "-".repeat(40))?;
    Ok(())
}

pub fn configure_info(scanner: &config::Scanner, out: &mut impl Write) -> io::Result<()> {
    writeln!(out, "=== ClamAV Configuration Guide ===")?;
    writeln!(out, "cqr talks to clamd over TCP at {}.", scanner.address())?;
    writeln!(out)?;
    writeln!(out, "--- Step 1: clamd.conf ---")?;
    writeln!(out, "Make sure clamd.conf (usually /etc/clamav/clamd.conf) contains:")?;
    writeln!(out)?;
    writeln!(out, "TCPSocket {}", scanner.port)?;
    writeln!(out, "TCPAddr {}", scanner.host)?;
    writeln!(out)?;
    writeln!(out, "--- Step 2: freshclam.conf ---")?;
    writeln!(out, "Keep the signature database current with:")?;
    writeln!(out)?;
    writeln!(out, "DatabaseMirror database.clamav.net")?;
    writeln!(out)?;
    writeln!(out, "--- Step 3: start the service ---")?;
    writeln!(out, "systemctl enable --now clamav-daemon clamav-freshclam")?;
    writeln!(out, "=== End of Guide ===")?;
    Ok(())
}

/// Run the engine until SIGINT or SIGTERM, then wait for the drain.
pub async fn start(config: Config, list: &Path) -> anyhow::Result<()> {
    let targets = WatchList::load(list)
        .with_context(|| format!("failed to read watch list {}", list.display()))?;
    if targets.is_empty() {
        warn!(?list, "configuration is empty, no folders to monitor");
    }
    info!(count = targets.len(), ?list, "loading watch targets");

    priority::lower_process_priority(&config.system);

    let services = Services::from_config(&config);
    let engine = Arc::new(ScanEngine::new(config, services));
    let cancel = CancellationToken::new();
    let (control_tx, control_rx) = mpsc::unbounded_channel();

    // install signal handlers
    let (signals_tx, signals_rx) = flume::bounded(8);
    let mut signal_handle = tokio::spawn(wait_for_signal(signals_tx));

    let mut engine_handle = tokio::spawn({
        let engine = engine.clone();
        let cancel = cancel.clone();
        let paths = targets.into_iter().collect();
        async move {
            engine
                .run_until(paths, Box::new(NotifyWatcher::new()), cancel, control_rx)
                .await
        }
    });

    loop {
        tokio::select! {
            res = &mut engine_handle => {
                let stats = res??;
                info!(
                    scanned = stats.completed,
                    infected = stats.infected,
                    isolated = stats.isolated,
                    "protection stopped"
                );
                return Ok(());
            }

            // bubble up any errors from the signal handlers
            res = &mut signal_handle => {
                let res = res?;
                if let Err(err) = &res {
                    error!("error happened during handling signals: {}", err);
                }
                res?;
                anyhow::bail!("signal handler exited");
            }

            event_res = signals_rx.recv_async() => {
                let event = event_res?;
                debug!(?event, "received signal event");

                match event {
                    SignalEvent::DumpStatus => {
                        if control_tx.send(ControlEvent::DumpStatus).is_err() {
                            warn!("engine is not accepting control events");
                        }
                    }
                    SignalEvent::Shutdown => cancel.cancel(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_then_list_numbers_entries() {
        let dir = tempdir().unwrap();
        let list_path = dir.path().join("paths.txt");
        let share = dir.path().join("share");
        std::fs::create_dir(&share).unwrap();

        let mut out = Vec::new();
        add(&list_path, share.to_str().unwrap(), &mut out).unwrap();
        add(&list_path, share.to_str().unwrap(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("[OK] Added to configuration"));
        assert!(text.contains("[!] Path is already monitored"));

        let mut out = Vec::new();
        list(&list_path, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains(&format!("[1] {}", share.display())));
        assert!(!text.contains("[2]"));
    }

    #[test]
    fn add_rejects_missing_target() {
        let dir = tempdir().unwrap();
        let mut out = Vec::new();
        let missing = dir.path().join("missing");
        let err = add(&dir.path().join("paths.txt"), missing.to_str().unwrap(), &mut out);
        assert!(err.is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn empty_list_prints_hint() {
        let dir = tempdir().unwrap();
        let mut out = Vec::new();
        list(&dir.path().join("absent.txt"), &mut out).unwrap();
        assert!(String::from_utf8(out).unwrap().contains("No paths configured"));
    }

    #[test]
    fn configure_info_uses_scanner_address() {
        let scanner = config::Scanner {
            host: "10.1.2.3".into(),
            port: 3399,
            ..config::Scanner::default()
        };
        let mut out = Vec::new();
        configure_info(&scanner, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("TCPSocket 3399"));
        assert!(text.contains("TCPAddr 10.1.2.3"));
    }
}
