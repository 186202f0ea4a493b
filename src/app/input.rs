//! Assembly of the task-list text from positional URLs, a file, or stdin.

use std::fs;
use std::io::{self, IsTerminal, Read};
use std::path::Path;

use anyhow::{Context, Result};

use crate::cli::Args;

/// Returns the raw task-list text, or `None` when nothing was supplied.
///
/// Positional URLs and `--input` are concatenated. Without either, piped
/// stdin is read; an interactive stdin is never waited on.
pub(crate) fn read_task_input(args: &Args) -> Result<Option<String>> {
    let mut segments = Vec::new();
    if !args.urls.is_empty() {
        segments.push(args.urls.join("\n"));
    }

    match args.input.as_deref() {
        Some(path) if path == Path::new("-") => segments.push(read_stdin()?),
        Some(path) => segments.push(
            fs::read_to_string(path)
                .with_context(|| format!("Failed to read task list '{}'", path.display()))?,
        ),
        None if segments.is_empty() && !io::stdin().is_terminal() => segments.push(read_stdin()?),
        None => {}
    }

    segments.retain(|segment| !segment.trim().is_empty());
    if segments.is_empty() {
        return Ok(None);
    }
    Ok(Some(segments.join("\n")))
}

fn read_stdin() -> Result<String> {
    let mut buffer = String::new();
    io::stdin()
        .read_to_string(&mut buffer)
        .context("Failed to read task list from stdin")?;
    Ok(buffer)
}
