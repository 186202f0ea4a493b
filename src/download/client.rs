//! HTTP client wrapper for authenticated, range-aware downloads.
//!
//! The client follows redirects and uses the shared [`CredentialStore`] as
//! its cookie provider: the session rides along every hop of a redirect
//! chain, and cookies the data host sets on the way are kept.

use std::sync::Arc;
use std::time::Duration;

use reqwest::header::{ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, RANGE};
use reqwest::{Client, Response, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, LOGIN_PATTERNS, PROBE_RANGE, READ_TIMEOUT_SECS};
use super::error::TransferError;
use crate::auth::CredentialStore;
use crate::user_agent::default_user_agent;

/// What the metadata probe learned about a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeResult {
    /// Size of the resource, when the server reported one.
    pub total: Option<u64>,
    /// Whether the server honours byte ranges.
    pub accepts_ranges: bool,
}

/// HTTP client for downloading files with streaming support.
///
/// Create once per run and reuse; connections are pooled.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Creates a client with default timeouts (30 s connect, 5 min read).
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (TLS backend failure).
    pub fn new(store: Arc<CredentialStore>) -> Result<Self, reqwest::Error> {
        Self::with_timeouts(store, CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a client with explicit timeout values.
    ///
    /// The read timeout bounds the gap between two body reads, not the whole
    /// transfer, so large files are never cut off by it.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    #[instrument(level = "debug", skip(store))]
    pub fn with_timeouts(
        store: Arc<CredentialStore>,
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .cookie_provider(store)
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .user_agent(default_user_agent())
            .build()?;
        Ok(Self { client })
    }

    /// Sends a GET, optionally with a `Range` header.
    ///
    /// 401/403 and login pages become [`TransferError::AuthExpired`]; every
    /// other status is returned to the caller.
    pub(crate) async fn get(
        &self,
        url: &Url,
        range: Option<&str>,
    ) -> Result<Response, TransferError> {
        let mut request = self.client.get(url.clone());
        if let Some(range) = range {
            request = request.header(RANGE, range);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransferError::network(url.as_str(), e))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TransferError::auth_expired(url.as_str(), status.as_u16()));
        }
        if is_login_page(url, &response) {
            debug!(
                url = %url,
                response_url = %response.url(),
                "redirected to a login page instead of the file"
            );
            return Err(TransferError::auth_expired(url.as_str(), status.as_u16()));
        }
        Ok(response)
    }

    /// Learns the size of `url` and whether it can be resumed.
    ///
    /// Asks for the first byte with a ranged GET rather than a HEAD: the
    /// presigned object-store URLs data hosts redirect to are signed for GET
    /// only and refuse HEAD.
    ///
    /// # Errors
    ///
    /// [`TransferError::AuthExpired`] for 401/403 or a login page,
    /// [`TransferError::ServerError`] for other unexpected statuses and
    /// [`TransferError::Network`] on transport failure.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn probe(&self, url: &Url) -> Result<ProbeResult, TransferError> {
        let response = self.get(url, Some(PROBE_RANGE)).await?;
        let status = response.status();

        let result = match status {
            StatusCode::PARTIAL_CONTENT => ProbeResult {
                total: content_range(&response).and_then(|range| range.total),
                accepts_ranges: true,
            },
            StatusCode::OK => ProbeResult {
                total: content_length(&response),
                accepts_ranges: response
                    .headers()
                    .get(ACCEPT_RANGES)
                    .and_then(|v| v.to_str().ok())
                    .is_some_and(|v| v.eq_ignore_ascii_case("bytes")),
            },
            // An empty resource cannot satisfy `bytes=0-0`.
            StatusCode::RANGE_NOT_SATISFIABLE => ProbeResult {
                total: content_range(&response).and_then(|range| range.total),
                accepts_ranges: true,
            },
            other => return Err(TransferError::server_error(url.as_str(), other.as_u16())),
        };
        debug!(status = status.as_u16(), total = ?result.total, accepts_ranges = result.accepts_ranges, "probe complete");
        Ok(result)
    }
}

/// Parsed `Content-Range` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct ContentRange {
    /// Inclusive first and last byte, absent for `bytes */N`.
    pub(crate) range: Option<(u64, u64)>,
    /// Complete length, absent for `bytes a-b/*`.
    pub(crate) total: Option<u64>,
}

/// Parses `bytes a-b/N`, `bytes a-b/*` and `bytes */N`.
pub(crate) fn parse_content_range(value: &str) -> Option<ContentRange> {
    let spec = value.trim().strip_prefix("bytes")?.trim_start();
    let (range, total) = spec.split_once('/')?;

    let total = match total.trim() {
        "*" => None,
        n => Some(n.parse::<u64>().ok()?),
    };
    let range = match range.trim() {
        "*" => None,
        r => {
            let (first, last) = r.split_once('-')?;
            let first = first.trim().parse::<u64>().ok()?;
            let last = last.trim().parse::<u64>().ok()?;
            if last < first {
                return None;
            }
            Some((first, last))
        }
    };
    if range.is_none() && total.is_none() {
        return None;
    }
    Some(ContentRange { range, total })
}

pub(crate) fn content_range(response: &Response) -> Option<ContentRange> {
    response
        .headers()
        .get(CONTENT_RANGE)
        .and_then(|v| v.to_str().ok())
        .and_then(parse_content_range)
}

pub(crate) fn content_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}

/// An HTML answer, reached through a redirect, from a URL that looks like an
/// identity provider's login endpoint.
fn is_login_page(requested: &Url, response: &Response) -> bool {
    let is_html = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.to_ascii_lowercase().contains("text/html"));
    if !is_html || response.url() == requested {
        return false;
    }
    looks_like_login_url(response.url())
}

fn looks_like_login_url(url: &Url) -> bool {
    let path = url.path().to_ascii_lowercase();
    LOGIN_PATTERNS.iter().any(|pattern| path.contains(pattern))
}
