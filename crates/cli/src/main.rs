use anyhow::Context;
use clap::Parser;
use config::Config;
use cqr::{
    cli::{Cli, Command},
    commands,
};
use std::fs::OpenOptions;
use std::io;
use std::sync::Arc;
use tracing::{debug, trace};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[cfg(feature = "jemalloc")]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let Some(command) = cli.command.clone() else {
        commands::banner(&mut io::stdout().lock())?;
        std::process::exit(1);
    };

    init_tracing(&cli)?;

    // load config
    let mut config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        _ => {
            let mut candidates = glob::glob("/etc/cqr/config.d/*.toml")?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();
            candidates.insert(0, "/etc/cqr/config.toml".into());
            trace!(?candidates, "config file candidates");
            Config::load_multiple(candidates)?
        }
    };
    debug!(?config, ?cli);

    let paths_file = cli
        .paths
        .clone()
        .unwrap_or_else(|| config.watch.paths_file.clone());

    match command {
        Command::Start { no_initial_scan } => {
            if no_initial_scan {
                config.watch.initial_scan = false;
            }
            commands::start(config, &paths_file).await
        }
        Command::Add { path } => commands::add(&paths_file, &path, &mut io::stdout().lock()),
        Command::List => commands::list(&paths_file, &mut io::stdout().lock()),
        Command::ConfigureInfo => {
            commands::configure_info(&config.scanner, &mut io::stdout().lock())?;
            Ok(())
        }
    }
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    // NOTE: The verbosity flag takes precedence over the environment variable
    // for log control. `CQR_LOG` can only narrow individual targets, e.g.
    // `CQR_LOG=notify=warn cqr -v start` keeps debug logs for everything
    // except the watcher backend.
    let env_filter = EnvFilter::builder()
        .with_env_var("CQR_LOG")
        .from_env()?
        .add_directive(cli.verbosity.log_level_filter().as_str().parse()?);

    let layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stderr)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    let file_layer = match &cli.logfile {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(Arc::new(file))
                    .with_ansi(false),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(layer)
        .with(file_layer)
        .with(env_filter)
        .init();
    Ok(())
}
