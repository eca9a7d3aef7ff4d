//! CLI entry point for the harvester tool.

use std::process::ExitCode;

use anyhow::Result;

mod app;
mod app_config;
mod cli;

/// Process outcome of one command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    Success,
    /// Stopped by Ctrl-C; completed artifacts stay on disk.
    Interrupted,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Interrupted => ExitCode::from(130),
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let exit = app::runtime::run_harvester().await?;
    Ok(exit.into())
}
