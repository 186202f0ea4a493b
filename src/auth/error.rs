//! Error types for the login handshake.

use thiserror::Error;

use super::credentials::CredentialError;

/// Errors that can occur while establishing a session.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The identity provider rejected the username/password.
    #[error("login rejected at {url} (HTTP {status}): check username and password")]
    InvalidCredentials {
        /// URL that rejected the credentials.
        url: String,
        /// Status of the rejecting response (200 when a login form was re-served).
        status: u16,
    },

    /// The redirect/form shape of the login flow was not what we expect.
    #[error("login flow at {url} changed: {detail}")]
    ProtocolChanged {
        /// URL where the flow diverged.
        url: String,
        /// What was expected and what was seen instead.
        detail: String,
    },

    /// Transport failure during the handshake.
    #[error("network error during login at {url}: {source}")]
    Network {
        /// URL that failed.
        url: String,
        /// The underlying network error.
        #[source]
        source: reqwest::Error,
    },

    /// No credentials could be obtained from the supplier.
    #[error(transparent)]
    CredentialsUnavailable(#[from] CredentialError),
}

impl AuthError {
    /// Creates an invalid-credentials error.
    pub fn invalid_credentials(url: impl Into<String>, status: u16) -> Self {
        Self::InvalidCredentials {
            url: url.into(),
            status,
        }
    }

    /// Creates a protocol-changed error.
    pub fn protocol_changed(url: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::ProtocolChanged {
            url: url.into(),
            detail: detail.into(),
        }
    }

    /// Creates a network error from a reqwest error.
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Network {
            url: url.into(),
            source,
        }
    }

    /// Returns true when retrying with the same credentials cannot succeed.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            Self::InvalidCredentials { .. } | Self::CredentialsUnavailable(_)
        )
    }
}
