//! Resumable download engine.
//!
//! [`ResumableTransfer`] turns a [`DownloadTask`](crate::task::DownloadTask)
//! into a complete, verified local file:
//!
//! - a one-byte ranged probe learns the size and range support
//! - a partial file of size `S < total` is resumed with `Range: bytes=S-`
//! - a file of exactly `total` bytes is not fetched again
//! - anything ambiguous restarts from byte 0
//! - size and checksum are checked before reporting success
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! use bulkfetch_core::auth::CredentialStore;
//! use bulkfetch_core::download::{HttpClient, ResumableTransfer, Transfer};
//! use bulkfetch_core::task::DownloadTask;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(CredentialStore::new());
//! let engine = ResumableTransfer::new(HttpClient::new(store)?);
//! let url = url::Url::parse("https://data.example.org/granule.h5")?;
//! let task = DownloadTask::in_directory(url, Path::new("./downloads"), None);
//! let outcome = engine.fetch(&task).await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

mod client;
mod constants;
mod error;
pub(crate) mod filename;
mod transfer;

pub use client::{HttpClient, ProbeResult};
pub use constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS, WRITE_BUFFER_SIZE};
pub use error::TransferError;
pub use transfer::{ResumableTransfer, Transfer, TransferOutcome};

// Note: we do NOT define module-local Result aliases.
// Use `Result<T, TransferError>` explicitly in function signatures.
