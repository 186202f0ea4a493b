//! Username/password pairs and the supplier seam used to obtain them.

use std::fmt;

/// Login credentials for the data host's identity provider.
///
/// The password is redacted in Debug output.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// Account name.
    pub username: String,
    password: String,
}

impl Credentials {
    /// Creates a credential pair.
    #[must_use]
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Returns the password. Never log the return value.
    #[must_use]
    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Errors raised by a [`CredentialSupplier`].
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// No credentials could be obtained (no terminal, missing variables, ...).
    #[error("credentials unavailable: {0}")]
    Unavailable(String),

    /// Reading credentials failed.
    #[error("failed to read credentials: {0}")]
    Io(#[from] std::io::Error),
}

/// Source of login credentials.
///
/// Consulted only when the credential store has no valid session, and at most
/// once per batch.
pub trait CredentialSupplier: Send + Sync {
    /// Returns the credentials to log in with.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError`] when no credentials can be produced.
    fn credentials(&self) -> Result<Credentials, CredentialError>;
}

/// Supplier returning a fixed credential pair (config file, environment).
#[derive(Debug, Clone)]
pub struct StaticCredentials(Credentials);

impl StaticCredentials {
    /// Wraps an already-known credential pair.
    #[must_use]
    pub fn new(credentials: Credentials) -> Self {
        Self(credentials)
    }
}

impl CredentialSupplier for StaticCredentials {
    fn credentials(&self) -> Result<Credentials, CredentialError> {
        Ok(self.0.clone())
    }
}
