use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::Result;
use clap::Parser;
use tracing::{debug, warn};

use crate::ProcessExit;
use crate::app::{command_dispatcher, terminal};
use crate::app_config;
use crate::cli::Cli;

/// Exit status of a process stopped by a second Ctrl-C.
const FORCED_EXIT_CODE: i32 = 130;

pub(crate) async fn run_harvester() -> Result<ProcessExit> {
    // Parse before tracing so --help and usage errors print without logs
    let cli = Cli::parse();
    let config = app_config::load_config(cli.config.as_deref())?;

    let default_level =
        terminal::resolve_default_log_level(cli.quiet, cli.verbose, config.log_level.as_deref());
    terminal::init_tracing(&default_level);
    debug!(?cli, "CLI arguments parsed");

    command_dispatcher::dispatch(&cli.command, &config).await
}

/// Installs the Ctrl-C handler for a harvest run.
///
/// The first signal sets the returned flag so chunks stop between pages and
/// finished artifacts stay intact. A second signal exits immediately.
/// Subcommands that never read the flag must not call this, so they keep
/// the default SIGINT behaviour.
pub(crate) fn watch_interrupt() -> Arc<AtomicBool> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_signal = Arc::clone(&interrupted);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_err() {
            return;
        }
        interrupted_signal.store(true, Ordering::SeqCst);
        warn!("Interrupt received, finishing in-flight pages (Ctrl-C again to abort)");
        if tokio::signal::ctrl_c().await.is_ok() {
            std::process::exit(FORCED_EXIT_CODE);
        }
    });
    interrupted
}
