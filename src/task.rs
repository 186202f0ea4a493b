//! Download tasks and the task-list input format.
//!
//! A task list is either plain text, one `URL [CHECKSUM]` per line with `#`
//! comments, or a JSON array of `{"url": ..., "md5" | "checksum": ...}`
//! objects. Malformed entries are skipped with a warning; the rest of the
//! list still loads.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use url::Url;

use crate::checksum::ExpectedChecksum;
use crate::download::filename::filename_from_url;

/// One file to fetch. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DownloadTask {
    url: Url,
    destination: PathBuf,
    expected_checksum: Option<ExpectedChecksum>,
}

impl DownloadTask {
    /// Creates a task with an explicit destination path.
    #[must_use]
    pub fn new(
        url: Url,
        destination: impl Into<PathBuf>,
        expected_checksum: Option<ExpectedChecksum>,
    ) -> Self {
        Self {
            url,
            destination: destination.into(),
            expected_checksum,
        }
    }

    /// Creates a task whose destination is the URL's filename inside `dir`.
    #[must_use]
    pub fn in_directory(url: Url, dir: &Path, expected_checksum: Option<ExpectedChecksum>) -> Self {
        let destination = dir.join(filename_from_url(&url));
        Self::new(url, destination, expected_checksum)
    }

    /// Resource to fetch.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Local file; its size on disk is the resume checkpoint.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Digest the finished file must match, if known.
    #[must_use]
    pub fn expected_checksum(&self) -> Option<&ExpectedChecksum> {
        self.expected_checksum.as_ref()
    }
}

/// A parsed task-list entry, before a destination is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskEntry {
    /// Resource to fetch.
    pub url: Url,
    /// Expected digest, if listed.
    pub checksum: Option<ExpectedChecksum>,
}

/// Result of parsing a task list.
#[derive(Debug, Default)]
pub struct TaskList {
    /// Valid entries in input order.
    pub entries: Vec<TaskEntry>,
    /// Skipped entries as (1-based entry number, reason).
    pub warnings: Vec<(usize, String)>,
}

impl TaskList {
    /// Turns the entries into tasks writing into `output_dir`.
    #[must_use]
    pub fn into_tasks(self, output_dir: &Path) -> Vec<DownloadTask> {
        self.entries
            .into_iter()
            .map(|entry| DownloadTask::in_directory(entry.url, output_dir, entry.checksum))
            .collect()
    }
}

/// Errors raised while reading a task list.
#[derive(Debug, Error)]
pub enum TaskListError {
    /// Input looked like JSON but did not parse.
    #[error("invalid JSON task list: {0}")]
    Json(#[from] serde_json::Error),

    /// Every entry was malformed.
    #[error("no valid tasks found ({malformed_count} malformed entries)")]
    NoValidTasks {
        /// Number of entries skipped.
        malformed_count: usize,
    },
}

#[derive(Debug, Deserialize)]
struct JsonEntry {
    url: String,
    #[serde(default, alias = "md5")]
    checksum: Option<String>,
}

/// Parses a task list in text or JSON form.
///
/// # Errors
///
/// Returns [`TaskListError::Json`] for unparseable JSON and
/// [`TaskListError::NoValidTasks`] when entries exist but none is valid.
pub fn parse_task_list(input: &str) -> Result<TaskList, TaskListError> {
    let list = if input.trim_start().starts_with('[') {
        parse_json(input)?
    } else {
        parse_lines(input)
    };

    if list.entries.is_empty() && !list.warnings.is_empty() {
        return Err(TaskListError::NoValidTasks {
            malformed_count: list.warnings.len(),
        });
    }
    Ok(list)
}

fn parse_lines(input: &str) -> TaskList {
    let mut list = TaskList::default();
    for (index, line) in input.lines().enumerate() {
        let line_number = index + 1;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }

        let mut fields = trimmed.split_whitespace();
        let url = fields.next().unwrap_or_default();
        let checksum = fields.next();
        if fields.next().is_some() {
            list.warnings
                .push((line_number, "expected 'URL [CHECKSUM]'".to_string()));
            continue;
        }
        match parse_entry(url, checksum) {
            Ok(entry) => list.entries.push(entry),
            Err(reason) => list.warnings.push((line_number, reason)),
        }
    }
    list
}

fn parse_json(input: &str) -> Result<TaskList, TaskListError> {
    let raw: Vec<JsonEntry> = serde_json::from_str(input)?;
    let mut list = TaskList::default();
    for (index, entry) in raw.iter().enumerate() {
        match parse_entry(&entry.url, entry.checksum.as_deref()) {
            Ok(entry) => list.entries.push(entry),
            Err(reason) => list.warnings.push((index + 1, reason)),
        }
    }
    Ok(list)
}

fn parse_entry(url: &str, checksum: Option<&str>) -> Result<TaskEntry, String> {
    let url = Url::parse(url).map_err(|e| format!("invalid URL '{url}': {e}"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(format!("unsupported scheme '{}'", url.scheme()));
    }
    let checksum = checksum
        .filter(|c| !c.trim().is_empty())
        .map(ExpectedChecksum::parse)
        .transpose()
        .map_err(|e| e.to_string())?;
    Ok(TaskEntry { url, checksum })
}
