//! Bulkfetch Core Library
//!
//! Resumable, checksum-verified bulk downloads from data hosts that
//! authenticate with session cookies.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//! - [`auth`] - Session cookies, credential store, login handshake
//! - [`checksum`] - Streaming MD5/SHA-256 verification
//! - [`download`] - Probe, range negotiation and streaming to disk
//! - [`orchestrator`] - Sequential batch driver with one re-auth retry
//! - [`progress`] - Throttled progress reporting
//! - [`task`] - Download tasks and task-list parsing

// Clippy lints - strict for library code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod auth;
pub mod checksum;
pub mod download;
pub mod orchestrator;
pub mod progress;
pub mod task;
mod user_agent;

// Re-export commonly used types
pub use auth::{
    AuthClient, AuthError, Authenticator, CredentialStore, CredentialSupplier, Credentials,
    Session, StaticCredentials,
};
pub use checksum::{ChecksumAlgorithm, ChecksumVerifier, ExpectedChecksum};
pub use download::{HttpClient, ResumableTransfer, Transfer, TransferError, TransferOutcome};
pub use orchestrator::{BatchReport, DownloadOrchestrator, TaskReport};
pub use progress::{NullProgress, ProgressReporter, ProgressSink, ProgressUpdate};
pub use task::{DownloadTask, TaskEntry, TaskList, parse_task_list};
