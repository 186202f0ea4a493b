//! Session cookie set issued by the identity provider.

use std::fmt;
use std::sync::Arc;

use reqwest::RequestBuilder;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{COOKIE, HeaderValue};
use tracing::debug;
use url::Url;

use super::cookies::{CookieLine, load_cookies_into_jar, parse_set_cookie, unix_now};

/// Authentication state carried as cookies.
///
/// The cookie list is the source of truth (it is what gets persisted); the
/// jar is rebuilt from it on every change and only answers "which cookies go
/// to this URL".
#[derive(Clone)]
pub struct Session {
    cookies: Vec<CookieLine>,
    jar: Arc<Jar>,
}

impl Default for Session {
    fn default() -> Self {
        Self::from_cookies(Vec::new())
    }
}

impl Session {
    /// Builds a session from previously captured cookies, dropping expired ones.
    #[must_use]
    pub fn from_cookies(cookies: Vec<CookieLine>) -> Self {
        let now = unix_now();
        let cookies: Vec<CookieLine> = cookies.into_iter().filter(|c| !c.is_expired(now)).collect();
        let jar = load_cookies_into_jar(&cookies);
        Self { cookies, jar }
    }

    /// Cookies currently held by the session.
    #[must_use]
    pub fn cookies(&self) -> &[CookieLine] {
        &self.cookies
    }

    /// Returns true when the session holds no cookies.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    /// Records `Set-Cookie` headers received from `url`.
    ///
    /// New cookies replace any cookie in the same slot; expired ones delete it.
    /// Returns the number of headers that changed the session.
    pub fn absorb<'a>(
        &mut self,
        set_cookie_headers: impl IntoIterator<Item = &'a HeaderValue>,
        url: &Url,
    ) -> usize {
        let now = unix_now();
        let mut changed = 0;
        for header in set_cookie_headers {
            let Some(cookie) = header
                .to_str()
                .ok()
                .and_then(|raw| parse_set_cookie(raw, url, now))
            else {
                continue;
            };
            self.cookies.retain(|existing| !existing.same_slot(&cookie));
            if cookie.is_expired(now) {
                debug!(domain = %cookie.domain, name = %cookie.name, "server expired cookie");
            } else {
                debug!(domain = %cookie.domain, name = %cookie.name, "captured cookie");
                self.cookies.push(cookie);
            }
            changed += 1;
        }
        if changed > 0 {
            self.jar = load_cookies_into_jar(&self.cookies);
        }
        changed
    }

    /// `Cookie` header value for a request to `url`, if any cookie matches.
    #[must_use]
    pub fn cookie_header(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }

    /// Decorates `request` (addressed to `url`) with the matching cookies.
    #[must_use]
    pub fn attach(&self, request: RequestBuilder, url: &Url) -> RequestBuilder {
        match self.cookie_header(url) {
            Some(value) => request.header(COOKIE, value),
            None => request,
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("cookies", &self.cookies)
            .finish_non_exhaustive()
    }
}
