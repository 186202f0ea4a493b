//! CLI entry point for bulkfetch.

use std::process::ExitCode;

mod app;
mod cli;

/// Process exit status for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ProcessExit {
    /// Every task completed or was already present.
    Success,
    /// Some tasks failed, others succeeded.
    Partial,
    /// Nothing succeeded, or the run could not start.
    Failure,
}

impl From<ProcessExit> for ExitCode {
    fn from(exit: ProcessExit) -> Self {
        match exit {
            ProcessExit::Success => ExitCode::SUCCESS,
            ProcessExit::Partial => ExitCode::from(1),
            ProcessExit::Failure => ExitCode::from(2),
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    match app::runtime::run_bulkfetch().await {
        Ok(exit) => exit.into(),
        Err(error) => {
            eprintln!("Error: {error:#}");
            ProcessExit::Failure.into()
        }
    }
}
