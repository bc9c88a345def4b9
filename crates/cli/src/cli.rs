use clap::{Parser, Subcommand};
use clap_verbosity_flag::{InfoLevel, Verbosity};
use std::path::{Path, PathBuf};

/// cqr: real-time malware scanning and quarantine
///
/// cqr watches the configured directories, hands every new or modified file
/// to a clamd daemon and moves infected files into a restricted isolation
/// directory.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// If not provided, the default locations are checked. They are
    /// `/etc/cqr/config.toml` and `/etc/cqr/config.d/*.toml`, where the
    /// latter being a glob pattern. If they don't exist, the default
    /// configuration is used.
    #[arg(short, long, global = true, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    /// Watch list to use instead of `watch.paths_file`.
    #[arg(short, long, global = true)]
    pub paths: Option<PathBuf>,

    /// Path to log file.
    ///
    /// Log lines are appended to it in addition to stderr.
    #[arg(short, long, global = true)]
    pub logfile: Option<PathBuf>,

    #[command(flatten)]
    pub verbosity: Verbosity<InfoLevel>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone, PartialEq, Eq)]
pub enum Command {
    /// Watch the configured targets until interrupted.
    Start {
        /// Skip scanning files that already exist at startup.
        #[arg(long)]
        no_initial_scan: bool,
    },
    /// Add a directory or file to the watch list.
    Add { path: String },
    /// Show the configured watch targets.
    List,
    /// Show how to configure clamd for this agent.
    ConfigureInfo,
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}
