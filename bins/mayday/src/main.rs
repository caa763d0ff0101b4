use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info, warn};

use mayday_core::{cfg, creds, job, logx};

mod notify;
mod runner;
mod runtime;
mod scheduler;

use notify::SlackNotifier;
use runtime::Runtime;
use scheduler::Scheduler;

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), version, about = "Declarative recurring-job scheduler")]
struct Cli {
    /// Job configuration file.
    #[arg(long, default_value = "mayday.toml")]
    config: PathBuf,
    /// Log level if RUST_LOG is not set (info, debug, trace).
    #[arg(long, default_value = "info")]
    log: String,
    /// Write logs to this file instead of stderr.
    #[arg(long)]
    log_file: Option<PathBuf>,
    /// Tick period of the scheduling loop (ms).
    #[arg(long, default_value_t = 250)]
    tick_ms: u64,
    /// Seconds to wait for in-flight jobs on shutdown.
    #[arg(long, default_value_t = 10)]
    grace_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match &cli.log_file {
        Some(path) => logx::init_to_file(&cli.log, path)?,
        None => logx::init(&cli.log),
    }

    info!("mayday boot");
    if let Some(env) = creds::environment() {
        info!("environment {env}");
    }

    info!("reading configuration {}", cli.config.display());
    let sections = match cfg::load(&cli.config) {
        Ok(sections) => sections,
        Err(e) => {
            // No configuration means nothing to schedule; refuse to start.
            error!("fatal: {e:#}");
            std::process::exit(1);
        }
    };

    let jobs = job::load_all(&sections);
    info!("creating workforce: {} of {} rule(s) valid", jobs.len(), sections.len());
    if jobs.is_empty() {
        warn!("no valid rules, scheduler will idle");
    }

    let http = reqwest::Client::new();
    let notifier = Arc::new(SlackNotifier::new(http.clone()));
    let runtime = Arc::new(Runtime::new(http, notifier));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = Scheduler::new(jobs, Arc::clone(&runtime), Duration::from_millis(cli.tick_ms))
        .spawn(shutdown_rx);

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    let _ = shutdown_tx.send(true);

    let grace = Duration::from_secs(cli.grace_secs);
    match tokio::time::timeout(grace, handle).await {
        Ok(joined) => joined??,
        Err(_) => warn!("scheduler loop did not stop within grace period"),
    }
    if !runtime.drain(grace).await {
        warn!("abandoning in-flight jobs after grace period");
    }

    info!("closing program, final steps done");
    Ok(())
}
