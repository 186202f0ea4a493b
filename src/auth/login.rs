//! Redirect-based login handshake against the data host's identity provider.
//!
//! The data host answers an unauthenticated request with a redirect to its
//! identity provider. The provider accepts HTTP Basic credentials on that
//! authorize URL and redirects back to the data host, which then issues the
//! download cookies. Every hop is followed by hand so cookies set anywhere on
//! the chain end up in the returned [`Session`].

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::StreamExt;
use regex::Regex;
use reqwest::header::{CONTENT_TYPE, LOCATION, SET_COOKIE};
use reqwest::redirect::Policy;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::credentials::Credentials;
use super::error::AuthError;
use super::session::Session;
use super::store::CredentialStore;
use crate::user_agent::default_user_agent;

/// Default endpoint probed to validate a stored session.
pub const DEFAULT_PROBE_URL: &str = "https://urs.earthdata.nasa.gov/profile";

/// Default whole-request timeout for probe and login requests.
pub const DEFAULT_AUTH_TIMEOUT_SECS: u64 = 10;

/// Hops followed after the first redirect before giving up.
const MAX_LOGIN_REDIRECTS: usize = 10;

/// Bytes of an HTML answer inspected for a login form.
const FORM_SNIFF_LIMIT: usize = 64 * 1024;

#[allow(clippy::expect_used)]
static PASSWORD_FIELD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)<input[^>]*type\s*=\s*["']?password"#).expect("password field regex is valid") // Static pattern, safe to panic
});

/// Session validation and login, as seen by the orchestrator.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Returns true when the cookies held by `store` are accepted by the server.
    async fn has_valid_session(&self, store: &CredentialStore) -> bool;

    /// Exchanges `credentials` for a new session, starting from `target`.
    ///
    /// Nothing is committed to any store; the caller does that.
    async fn login(&self, target: &Url, credentials: &Credentials) -> Result<Session, AuthError>;
}

/// Performs session probes and the login handshake.
///
/// Uses its own client with redirects disabled so each hop of the login chain
/// is observed.
#[derive(Debug, Clone)]
pub struct AuthClient {
    client: Client,
    probe_url: Url,
}

impl AuthClient {
    /// Creates a client probing `probe_url`, with `timeout` applied to every request.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (TLS backend failure).
    pub fn new(probe_url: Url, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .redirect(Policy::none())
            .timeout(timeout)
            .user_agent(default_user_agent())
            .build()?;
        Ok(Self { client, probe_url })
    }

    /// Endpoint used to validate sessions.
    #[must_use]
    pub fn probe_url(&self) -> &Url {
        &self.probe_url
    }

    /// Runs the login handshake for `target` and returns the captured session.
    ///
    /// # Errors
    ///
    /// - [`AuthError::InvalidCredentials`] when the provider answers 401/403 or
    ///   serves its login form again.
    /// - [`AuthError::ProtocolChanged`] when the target does not redirect, a
    ///   redirect has no `Location`, the chain is too long, or no cookies are
    ///   issued.
    /// - [`AuthError::Network`] on transport failure.
    #[instrument(skip(self, credentials), fields(target = %target, username = %credentials.username))]
    pub async fn login(&self, target: &Url, credentials: &Credentials) -> Result<Session, AuthError> {
        let mut session = Session::default();

        let response = self.send(self.client.get(target.clone()), target).await?;
        session.absorb(response.headers().get_all(SET_COOKIE), target);
        let status = response.status();
        if !status.is_redirection() {
            return Err(AuthError::protocol_changed(
                target.as_str(),
                format!("expected a redirect to the login provider, got HTTP {}", status.as_u16()),
            ));
        }
        let login_url = redirect_target(&response, target)?;
        let login_host = login_url.host_str().map(str::to_owned);
        debug!(login_url = %login_url, "target redirected to login provider");

        let mut current = login_url;
        for _ in 0..MAX_LOGIN_REDIRECTS {
            let mut request = session.attach(self.client.get(current.clone()), &current);
            // Only the provider ever sees the password.
            if current.host_str() == login_host.as_deref() {
                request = request.basic_auth(&credentials.username, Some(credentials.password()));
            }

            let response = self.send(request, &current).await?;
            session.absorb(response.headers().get_all(SET_COOKIE), &current);
            let status = response.status();
            debug!(url = %current, status = status.as_u16(), "login hop");

            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                warn!(url = %current, status = status.as_u16(), "login rejected");
                return Err(AuthError::invalid_credentials(current.as_str(), status.as_u16()));
            }
            if status.is_redirection() {
                current = redirect_target(&response, &current)?;
                continue;
            }
            if !status.is_success() {
                return Err(AuthError::protocol_changed(
                    current.as_str(),
                    format!("unexpected HTTP {} during login", status.as_u16()),
                ));
            }

            if current.host_str() == login_host.as_deref() && is_html(&response) {
                let body = read_capped(response).await;
                if PASSWORD_FIELD.is_match(&body) {
                    warn!(url = %current, "login form served again");
                    return Err(AuthError::invalid_credentials(current.as_str(), status.as_u16()));
                }
                return Err(AuthError::protocol_changed(
                    current.as_str(),
                    "login provider answered with a page instead of redirecting back",
                ));
            }
            if session.is_empty() {
                return Err(AuthError::protocol_changed(
                    current.as_str(),
                    "login completed without issuing session cookies",
                ));
            }

            info!(cookies = session.cookies().len(), "login succeeded");
            return Ok(session);
        }

        Err(AuthError::protocol_changed(
            current.as_str(),
            format!("more than {MAX_LOGIN_REDIRECTS} redirects during login"),
        ))
    }

    async fn send(&self, request: RequestBuilder, url: &Url) -> Result<Response, AuthError> {
        request
            .send()
            .await
            .map_err(|e| AuthError::network(url.as_str(), e))
    }
}

#[async_trait]
impl Authenticator for AuthClient {
    async fn has_valid_session(&self, store: &CredentialStore) -> bool {
        store.has_valid_session(&self.client, &self.probe_url).await
    }

    async fn login(&self, target: &Url, credentials: &Credentials) -> Result<Session, AuthError> {
        AuthClient::login(self, target, credentials).await
    }
}

fn redirect_target(response: &Response, base: &Url) -> Result<Url, AuthError> {
    let location = response
        .headers()
        .get(LOCATION)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AuthError::protocol_changed(base.as_str(), "redirect without Location"))?;
    base.join(location).map_err(|e| {
        AuthError::protocol_changed(base.as_str(), format!("invalid redirect '{location}': {e}"))
    })
}

fn is_html(response: &Response) -> bool {
    response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"))
}

/// Reads at most [`FORM_SNIFF_LIMIT`] bytes; transport errors end the read.
async fn read_capped(response: Response) -> String {
    let mut buf = Vec::new();
    let mut stream = response.bytes_stream();
    while let Some(Ok(chunk)) = stream.next().await {
        let room = FORM_SNIFF_LIMIT.saturating_sub(buf.len());
        buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
        if buf.len() >= FORM_SNIFF_LIMIT {
            break;
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
