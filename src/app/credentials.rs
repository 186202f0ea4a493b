//! Credential supplier backed by flags, environment and terminal prompts.

use std::io::{self, IsTerminal};

use bulkfetch_core::auth::{CredentialError, CredentialSupplier, Credentials};
use dialoguer::{Input, Password};

pub(crate) const USERNAME_ENV: &str = "BULKFETCH_USERNAME";
pub(crate) const PASSWORD_ENV: &str = "BULKFETCH_PASSWORD";

/// Resolves the username from flag/config/env and the password from env,
/// prompting on the terminal for whatever is missing.
#[derive(Clone)]
pub(crate) struct PromptCredentials {
    username: Option<String>,
    password: Option<String>,
    interactive: bool,
}

impl std::fmt::Debug for PromptCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptCredentials")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .field("interactive", &self.interactive)
            .finish()
    }
}

impl PromptCredentials {
    /// `username` comes from `--username` or the config file; the
    /// environment fills in what is left.
    pub(crate) fn new(username: Option<String>) -> Self {
        Self {
            username: username.or_else(|| env_non_empty(USERNAME_ENV)),
            password: env_non_empty(PASSWORD_ENV),
            interactive: io::stdin().is_terminal() && io::stderr().is_terminal(),
        }
    }
}

impl CredentialSupplier for PromptCredentials {
    fn credentials(&self) -> Result<Credentials, CredentialError> {
        let username = match &self.username {
            Some(username) => username.clone(),
            None if self.interactive => Input::<String>::new()
                .with_prompt("Username")
                .interact_text()
                .map_err(prompt_failed)?,
            None => {
                return Err(CredentialError::Unavailable(format!(
                    "no username; pass --username or set {USERNAME_ENV}"
                )));
            }
        };

        let password = match &self.password {
            Some(password) => password.clone(),
            None if self.interactive => Password::new()
                .with_prompt(format!("Password for {username}"))
                .interact()
                .map_err(prompt_failed)?,
            None => {
                return Err(CredentialError::Unavailable(format!(
                    "no password; set {PASSWORD_ENV} or run from a terminal"
                )));
            }
        };

        Ok(Credentials::new(username, password))
    }
}

fn prompt_failed(error: dialoguer::Error) -> CredentialError {
    CredentialError::Unavailable(format!("prompt failed: {error}"))
}

fn env_non_empty(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|value| !value.is_empty())
}
