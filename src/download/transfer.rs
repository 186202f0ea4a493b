//! Resumable, verified transfer of a single file.
//!
//! Each call derives a fresh [`TransferState`] from the destination on disk
//! and a metadata probe, turns it into a plan, executes it, then checks size
//! and digest. The partial file's length is the only resume checkpoint.

use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::CONTENT_RANGE;
use reqwest::{Response, StatusCode};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::client::{HttpClient, content_length, content_range};
use super::constants::WRITE_BUFFER_SIZE;
use super::error::TransferError;
use crate::checksum::ChecksumVerifier;
use crate::progress::{DEFAULT_PROGRESS_INTERVAL, NullProgress, ProgressReporter, ProgressSink};
use crate::task::DownloadTask;

/// Result of one transfer attempt.
#[derive(Debug)]
pub enum TransferOutcome {
    /// The destination holds the complete file.
    Completed {
        /// Whether a checksum was compared and matched.
        verified_checksum: bool,
        /// Bytes received in this attempt.
        bytes_transferred: u64,
        /// Whether the attempt appended to an existing partial file.
        resumed: bool,
    },
    /// Nothing was transferred.
    Skipped {
        /// True when the file was already complete on disk; false when the
        /// task was not attempted (duplicate destination).
        already_complete: bool,
    },
    /// The attempt failed; see the error for what is left on disk.
    Failed(TransferError),
}

impl TransferOutcome {
    /// True for `Failed(AuthExpired)`.
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Failed(error) if error.is_auth_expired())
    }

    /// True for `Failed(_)`.
    #[must_use]
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}

/// Fetches one task. The seam the orchestrator drives.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Produces a complete, verified destination file for `task`, or says why not.
    async fn fetch(&self, task: &DownloadTask) -> TransferOutcome;
}

/// Snapshot taken at the start of each attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct TransferState {
    pub(crate) present: bool,
    pub(crate) on_disk: u64,
    pub(crate) expected_total: Option<u64>,
    pub(crate) resumable: bool,
}

/// What to do with the destination before streaming.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum TransferPlan {
    /// Size already matches; go straight to verification.
    AlreadyComplete,
    /// Zero-byte resource and no local file.
    CreateEmpty,
    /// Append from `offset` with a range request.
    Resume { offset: u64 },
    /// Download from byte 0, deleting a stale local file first when `discard`.
    Fresh { discard: bool },
}

impl TransferState {
    /// Without a confirmed size and range support, a partial file is never
    /// trusted.
    pub(crate) fn plan(&self) -> TransferPlan {
        let Some(total) = self.expected_total else {
            return TransferPlan::Fresh {
                discard: self.on_disk > 0,
            };
        };
        if total == 0 && !self.present {
            return TransferPlan::CreateEmpty;
        }
        if self.present && self.on_disk == total {
            return TransferPlan::AlreadyComplete;
        }
        if self.on_disk > total {
            return TransferPlan::Fresh { discard: true };
        }
        if self.on_disk > 0 && self.resumable {
            return TransferPlan::Resume {
                offset: self.on_disk,
            };
        }
        TransferPlan::Fresh {
            discard: self.on_disk > 0,
        }
    }
}

#[derive(Debug)]
struct Streamed {
    bytes_written: u64,
    resumed: bool,
    total: Option<u64>,
}

/// The download engine: probe, plan, stream, verify.
pub struct ResumableTransfer {
    client: HttpClient,
    verifier: ChecksumVerifier,
    progress: Arc<dyn ProgressSink>,
    progress_interval: Duration,
}

impl std::fmt::Debug for ResumableTransfer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResumableTransfer")
            .field("client", &self.client)
            .field("progress_interval", &self.progress_interval)
            .finish_non_exhaustive()
    }
}

impl ResumableTransfer {
    /// Creates an engine that reports no progress.
    #[must_use]
    pub fn new(client: HttpClient) -> Self {
        Self {
            client,
            verifier: ChecksumVerifier,
            progress: Arc::new(NullProgress),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    /// Sends progress to `sink`, at most once per `interval`.
    #[must_use]
    pub fn with_progress(mut self, sink: Arc<dyn ProgressSink>, interval: Duration) -> Self {
        self.progress = sink;
        self.progress_interval = interval;
        self
    }

    async fn try_fetch(&self, task: &DownloadTask) -> Result<TransferOutcome, TransferError> {
        let url = task.url();
        let path = task.destination();

        let probe = self.client.probe(url).await?;
        let local = local_size(path).await?;
        let state = TransferState {
            present: local.is_some(),
            on_disk: local.unwrap_or(0),
            expected_total: probe.total,
            resumable: probe.accepts_ranges && probe.total.is_some(),
        };
        let plan = state.plan();
        debug!(?state, ?plan, "transfer plan");

        let mut already_complete = false;
        let streamed = match plan {
            TransferPlan::AlreadyComplete => {
                info!(bytes = state.on_disk, "already complete on disk");
                already_complete = true;
                Streamed {
                    bytes_written: 0,
                    resumed: false,
                    total: probe.total,
                }
            }
            TransferPlan::CreateEmpty => {
                create_parent(path).await?;
                File::create(path)
                    .await
                    .map_err(|e| TransferError::io(path, e))?;
                info!("created empty file");
                Streamed {
                    bytes_written: 0,
                    resumed: false,
                    total: Some(0),
                }
            }
            TransferPlan::Resume { offset } => {
                info!(offset, total = ?probe.total, "resuming partial download");
                self.stream(url, path, offset, probe.total).await?
            }
            TransferPlan::Fresh { discard } => {
                if discard {
                    info!(bytes = state.on_disk, "discarding partial file that cannot be resumed");
                    remove_if_exists(path).await?;
                }
                self.stream(url, path, 0, probe.total).await?
            }
        };

        let actual = fs::metadata(path)
            .await
            .map_err(|e| TransferError::io(path, e))?
            .len();
        if let Some(expected) = streamed.total {
            if actual < expected {
                warn!(expected, actual, "body ended early; keeping partial file");
                return Err(TransferError::incomplete(path, expected, actual));
            }
            if actual > expected {
                warn!(expected, actual, "received more than expected; deleting file");
                remove_if_exists(path).await?;
                return Err(TransferError::size_mismatch(path, expected, actual));
            }
        }

        let verified_checksum = match task.expected_checksum() {
            Some(expected) => {
                let digest = self
                    .verifier
                    .digest(path, expected.algorithm())
                    .await
                    .map_err(|e| TransferError::io(path, e))?;
                if !expected.matches_hex(&digest) {
                    warn!(expected = %expected, actual = %digest, "checksum mismatch; deleting file");
                    remove_if_exists(path).await?;
                    return Err(TransferError::checksum_mismatch(path, expected.value(), digest));
                }
                debug!(algorithm = %expected.algorithm(), "checksum verified");
                true
            }
            None => false,
        };

        if already_complete && !verified_checksum {
            return Ok(TransferOutcome::Skipped {
                already_complete: true,
            });
        }
        info!(
            bytes = streamed.bytes_written,
            resumed = streamed.resumed,
            verified = verified_checksum,
            "download complete"
        );
        Ok(TransferOutcome::Completed {
            verified_checksum,
            bytes_transferred: streamed.bytes_written,
            resumed: streamed.resumed,
        })
    }

    /// Requests the body from `offset` and writes it to `path`.
    async fn stream(
        &self,
        url: &Url,
        path: &Path,
        offset: u64,
        probed_total: Option<u64>,
    ) -> Result<Streamed, TransferError> {
        let mut offset = offset;
        let range = (offset > 0).then(|| format!("bytes={offset}-"));
        let mut response = self.client.get(url, range.as_deref()).await?;

        if offset > 0 && response.status() == StatusCode::RANGE_NOT_SATISFIABLE {
            warn!(offset, "server refused resume range; restarting from zero");
            remove_if_exists(path).await?;
            offset = 0;
            response = self.client.get(url, None).await?;
        }

        let status = response.status();
        let (start, total) = match status {
            StatusCode::PARTIAL_CONTENT if offset > 0 => {
                let parsed = content_range(&response);
                match parsed.and_then(|r| r.range) {
                    Some((first, _)) if first == offset => {
                        (offset, parsed.and_then(|r| r.total).or(probed_total))
                    }
                    _ => {
                        let header = response
                            .headers()
                            .get(CONTENT_RANGE)
                            .and_then(|v| v.to_str().ok())
                            .unwrap_or_default()
                            .to_string();
                        return Err(TransferError::unexpected_range(url.as_str(), offset, header));
                    }
                }
            }
            StatusCode::OK => {
                if offset > 0 {
                    info!(offset, "server ignored range request; restarting from zero");
                }
                (0, content_length(&response).or(probed_total))
            }
            other => return Err(TransferError::server_error(url.as_str(), other.as_u16())),
        };

        let file = if start > 0 {
            OpenOptions::new()
                .append(true)
                .open(path)
                .await
                .map_err(|e| TransferError::io(path, e))?
        } else {
            create_parent(path).await?;
            File::create(path)
                .await
                .map_err(|e| TransferError::io(path, e))?
        };

        let reporter = ProgressReporter::spawn(
            Arc::clone(&self.progress),
            url.clone(),
            start,
            total,
            self.progress_interval,
        );
        let mut writer = BufWriter::with_capacity(WRITE_BUFFER_SIZE, file);
        let written = write_body(&mut writer, response, url, path, start, &reporter).await;
        // Whatever arrived stays on disk for the next attempt.
        let flushed = flush_to_disk(&mut writer).await;
        reporter.finish().await;

        let bytes_written = written?;
        flushed.map_err(|e| TransferError::io(path, e))?;
        Ok(Streamed {
            bytes_written,
            resumed: start > 0,
            total,
        })
    }
}

#[async_trait]
impl Transfer for ResumableTransfer {
    #[instrument(skip(self, task), fields(url = %task.url(), path = %task.destination().display()))]
    async fn fetch(&self, task: &DownloadTask) -> TransferOutcome {
        match self.try_fetch(task).await {
            Ok(outcome) => outcome,
            Err(error) => {
                warn!(error = %error, "transfer failed");
                TransferOutcome::Failed(error)
            }
        }
    }
}

async fn write_body(
    writer: &mut BufWriter<File>,
    response: Response,
    url: &Url,
    path: &Path,
    start: u64,
    reporter: &ProgressReporter,
) -> Result<u64, TransferError> {
    let mut stream = response.bytes_stream();
    let mut bytes_written: u64 = 0;

    while let Some(chunk_result) = stream.next().await {
        let chunk = chunk_result.map_err(|e| TransferError::network(url.as_str(), e))?;
        writer
            .write_all(&chunk)
            .await
            .map_err(|e| TransferError::io(path, e))?;
        bytes_written += chunk.len() as u64;
        reporter.report(start + bytes_written);
    }
    Ok(bytes_written)
}

async fn flush_to_disk(writer: &mut BufWriter<File>) -> io::Result<()> {
    writer.flush().await?;
    writer.get_mut().sync_data().await
}

async fn local_size(path: &Path) -> Result<Option<u64>, TransferError> {
    match fs::metadata(path).await {
        Ok(meta) => Ok(Some(meta.len())),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(TransferError::io(path, e)),
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), TransferError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(TransferError::io(path, e)),
    }
}

async fn create_parent(path: &Path) -> Result<(), TransferError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => fs::create_dir_all(parent)
            .await
            .map_err(|e| TransferError::io(parent, e)),
        None => Ok(()),
    }
}
