//! Run summary and exit code logic.

use std::fmt::Write as _;

use bulkfetch_core::{BatchReport, TransferOutcome};
use indicatif::{HumanBytes, HumanDuration};

use crate::ProcessExit;

/// Determines the process exit outcome from completed and failed task counts.
pub(crate) fn determine_exit_outcome(succeeded: usize, failed: usize) -> ProcessExit {
    if failed == 0 {
        ProcessExit::Success
    } else if succeeded > 0 {
        ProcessExit::Partial
    } else {
        ProcessExit::Failure
    }
}

/// Renders the end-of-run summary: totals, finished files, failures.
pub(crate) fn render_summary(report: &BatchReport) -> String {
    let total = report.reports.len();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} completed, {} skipped, {} failed of {total} ({} in {})",
        report.completed(),
        report.skipped(),
        report.failed(),
        HumanBytes(report.bytes_transferred()),
        HumanDuration(report.elapsed),
    );

    let finished: Vec<_> = report
        .reports
        .iter()
        .filter_map(|task| match task.outcome {
            TransferOutcome::Completed {
                verified_checksum, ..
            } => Some((task, if verified_checksum { "verified" } else { "unverified" })),
            TransferOutcome::Skipped {
                already_complete: true,
            } => Some((task, "already present")),
            _ => None,
        })
        .collect();
    if !finished.is_empty() {
        let _ = writeln!(out, "Files:");
        for (task, note) in finished {
            let _ = writeln!(out, "  {} ({note})", task.destination.display());
        }
    }

    let failures: Vec<_> = report.failures().collect();
    if !failures.is_empty() {
        let _ = writeln!(out, "Failed ({}):", failures.len());
        for (task, error) in failures {
            let _ = writeln!(out, "  {}: {error}", task.url);
        }
    }

    if let Some(error) = &report.auth_error {
        let _ = writeln!(out, "Login: {error}");
    }
    out
}
