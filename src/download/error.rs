//! Error types for a single transfer.
//!
//! Every variant carries the URL or path it concerns so the run summary can
//! be read without the log.

use std::path::PathBuf;

use thiserror::Error;

/// Reasons a transfer ends in `Failed`.
#[derive(Debug, Error)]
pub enum TransferError {
    /// The server no longer accepts the session (401/403 or a login page).
    #[error("[AUTH] session rejected (HTTP {status}) downloading {url}")]
    AuthExpired {
        /// URL that was refused.
        url: String,
        /// Status seen; 200 when a login page was served instead of the file.
        status: u16,
    },

    /// The finished file's digest differs from the expected one. The file has
    /// been deleted.
    #[error("checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        /// Deleted destination.
        path: PathBuf,
        /// Expected digest.
        expected: String,
        /// Computed digest.
        actual: String,
    },

    /// Network-level error (DNS, connection reset, TLS, timeout).
    #[error("network error downloading {url}: {source}")]
    Network {
        /// The URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// Unexpected HTTP status.
    #[error("HTTP {status} downloading {url}")]
    ServerError {
        /// The URL that returned the status.
        url: String,
        /// The HTTP status code.
        status: u16,
    },

    /// File system error on the destination.
    #[error("IO error on {path}: {source}")]
    Io {
        /// The file path where the error occurred.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The body ended before the expected size was reached. The partial file
    /// is kept for the next run.
    #[error("incomplete download {path}: expected {expected_bytes} bytes, have {actual_bytes}")]
    Incomplete {
        /// Partial destination.
        path: PathBuf,
        /// Server-reported size.
        expected_bytes: u64,
        /// Size on disk.
        actual_bytes: u64,
    },

    /// More bytes than the server-reported size arrived. The file has been
    /// deleted.
    #[error("size mismatch for {path}: expected {expected_bytes} bytes, got {actual_bytes}")]
    SizeMismatch {
        /// Deleted destination.
        path: PathBuf,
        /// Server-reported size.
        expected_bytes: u64,
        /// Size that was written.
        actual_bytes: u64,
    },

    /// A resume request was answered with a different range. Nothing was written.
    #[error("server answered range request at offset {offset} for {url} with '{content_range}'")]
    UnexpectedRange {
        /// The URL requested.
        url: String,
        /// Offset asked for.
        offset: u64,
        /// `Content-Range` received (empty when absent).
        content_range: String,
    },
}

impl TransferError {
    /// Creates an auth-expired error.
    pub fn auth_expired(url: impl Into<String>, status: u16) -> Self {
        Self::AuthExpired {
            url: url.into(),
            status,
        }
    }

    /// Creates a checksum mismatch error.
    pub fn checksum_mismatch(
        path: impl Into<PathBuf>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::ChecksumMismatch {
            path: path.into(),
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn server_error(url: impl Into<String>, status: u16) -> Self {
        Self::ServerError {
            url: url.into(),
            status,
        }
    }

    /// Creates an IO error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Creates an incomplete-download error.
    pub fn incomplete(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::Incomplete {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates a size mismatch error.
    pub fn size_mismatch(path: impl Into<PathBuf>, expected_bytes: u64, actual_bytes: u64) -> Self {
        Self::SizeMismatch {
            path: path.into(),
            expected_bytes,
            actual_bytes,
        }
    }

    /// Creates an unexpected-range error.
    pub fn unexpected_range(
        url: impl Into<String>,
        offset: u64,
        content_range: impl Into<String>,
    ) -> Self {
        Self::UnexpectedRange {
            url: url.into(),
            offset,
            content_range: content_range.into(),
        }
    }

    /// True when re-authenticating may make a retry succeed.
    #[must_use]
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::AuthExpired { .. })
    }
}

// No From<reqwest::Error>/From<std::io::Error>: every variant needs the URL or
// path, which the source errors do not carry. Use the constructors above.

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_expired_display() {
        let error = TransferError::auth_expired("https://data.example.org/a.zip", 401);
        let msg = error.to_string();
        assert!(msg.starts_with("[AUTH]"), "Expected [AUTH] prefix in: {msg}");
        assert!(msg.contains("401"), "Expected status in: {msg}");
        assert!(error.is_auth_expired());
    }

    #[test]
    fn test_server_error_display() {
        let error = TransferError::server_error("https://data.example.org/a.zip", 503);
        let msg = error.to_string();
        assert!(msg.contains("503"), "Expected '503' in: {msg}");
        assert!(msg.contains("https://data.example.org/a.zip"), "Expected URL in: {msg}");
        assert!(!error.is_auth_expired());
    }

    #[test]
    fn test_checksum_mismatch_display() {
        let error = TransferError::checksum_mismatch("/tmp/a.zip", "abc", "def");
        let msg = error.to_string();
        assert!(msg.contains("/tmp/a.zip"), "Expected path in: {msg}");
        assert!(msg.contains("expected abc, got def"), "Expected digests in: {msg}");
    }

    #[test]
    fn test_io_display() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let error = TransferError::io("/tmp/b.zip", io_error);
        assert!(error.to_string().contains("/tmp/b.zip"));
    }

    #[test]
    fn test_incomplete_and_size_mismatch_display() {
        let short = TransferError::incomplete("/tmp/c.zip", 5000, 4000);
        assert!(short.to_string().contains("expected 5000 bytes, have 4000"));
        let long = TransferError::size_mismatch("/tmp/c.zip", 5000, 6000);
        assert!(long.to_string().contains("expected 5000 bytes, got 6000"));
    }

    #[test]
    fn test_unexpected_range_display() {
        let error =
            TransferError::unexpected_range("https://data.example.org/d.zip", 1000, "bytes 0-99/100");
        let msg = error.to_string();
        assert!(msg.contains("offset 1000"), "Expected offset in: {msg}");
        assert!(msg.contains("bytes 0-99/100"), "Expected header in: {msg}");
    }
}
