//! Process-wide holder of the current session.
//!
//! The store is shared (`Arc<CredentialStore>`) between the download client,
//! where it acts as the `reqwest` cookie provider, and the orchestrator, which
//! replaces the session after a login. When a cookie-file path is configured
//! the session is loaded from it at construction and written back on
//! [`CredentialStore::set`] and [`CredentialStore::persist_if_changed`]. A
//! jar that failed to load is left alone until the session actually changes.

use std::fs;
use std::io::{self, BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{PoisonError, RwLock};

use reqwest::Client;
use reqwest::cookie::CookieStore;
use reqwest::header::{HeaderValue, SET_COOKIE};
use tracing::{debug, info, instrument, warn};
use url::Url;

use super::cookies::{CookieError, CookieLine, parse_netscape_cookies, write_netscape_cookies};
use super::session::Session;

/// Holds the session for the lifetime of the process.
#[derive(Debug, Default)]
pub struct CredentialStore {
    session: RwLock<Option<Session>>,
    cookie_file: Option<PathBuf>,
    changed: AtomicBool,
}

impl CredentialStore {
    /// Creates an empty, memory-only store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store backed by a Netscape cookie file.
    ///
    /// An existing file seeds the session. A missing file is normal (first
    /// run); an unreadable or malformed one is logged and ignored so the run
    /// continues unauthenticated.
    #[must_use]
    #[instrument(level = "debug")]
    pub fn with_cookie_file(path: PathBuf) -> Self {
        let session = match load_cookie_file(&path) {
            Ok(Some(cookies)) => {
                info!(path = %path.display(), cookies = cookies.len(), "loaded saved session cookies");
                Some(Session::from_cookies(cookies))
            }
            Ok(None) => {
                debug!(path = %path.display(), "no saved cookie jar");
                None
            }
            Err(error) => {
                warn!(path = %path.display(), error = %error, "ignoring unreadable cookie jar");
                None
            }
        };
        Self {
            session: RwLock::new(session),
            cookie_file: Some(path),
            changed: AtomicBool::new(false),
        }
    }

    /// Path of the backing cookie file, if any.
    #[must_use]
    pub fn cookie_file(&self) -> Option<&Path> {
        self.cookie_file.as_deref()
    }

    /// Returns true when a non-empty session is held (no network check).
    #[must_use]
    pub fn has_session(&self) -> bool {
        self.read(|session| session.is_some_and(|s| !s.is_empty()))
    }

    /// Snapshot of the current cookies.
    #[must_use]
    pub fn cookies(&self) -> Vec<CookieLine> {
        self.read(|session| session.map(|s| s.cookies().to_vec()).unwrap_or_default())
    }

    /// Atomically replaces the session, then persists it when file-backed.
    ///
    /// A failed write is logged; the in-memory session is still replaced.
    pub fn set(&self, session: Session) {
        let count = session.cookies().len();
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = Some(session);
        self.changed.store(true, Ordering::Release);
        debug!(cookies = count, "session replaced");
        if let Err(error) = self.persist() {
            warn!(error = %error, "failed to save session cookies");
        }
    }

    /// Drops the current session.
    pub fn clear(&self) {
        *self.session.write().unwrap_or_else(PoisonError::into_inner) = None;
        self.changed.store(true, Ordering::Release);
    }

    /// True when the session changed since it was loaded or last saved.
    #[must_use]
    pub fn is_changed(&self) -> bool {
        self.changed.load(Ordering::Acquire)
    }

    /// Writes the current cookies to the backing file.
    ///
    /// Returns the path written, or `None` for memory-only stores.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::Io`] when the file cannot be written.
    pub fn persist(&self) -> Result<Option<PathBuf>, CookieError> {
        let Some(path) = self.cookie_file.as_deref() else {
            return Ok(None);
        };
        let cookies = self.cookies();
        save_cookie_file(path, &cookies)?;
        self.changed.store(false, Ordering::Release);
        debug!(path = %path.display(), cookies = cookies.len(), "saved session cookies");
        Ok(Some(path.to_path_buf()))
    }

    /// Like [`persist`](Self::persist), but leaves the file untouched when the
    /// session has not changed. An existing jar that could not be parsed is
    /// therefore never overwritten by an empty one.
    ///
    /// # Errors
    ///
    /// Returns [`CookieError::Io`] when the file cannot be written.
    pub fn persist_if_changed(&self) -> Result<Option<PathBuf>, CookieError> {
        if !self.is_changed() {
            debug!("session unchanged; cookie jar not rewritten");
            return Ok(None);
        }
        self.persist()
    }

    /// Decorates `request` (addressed to `url`) with the current cookies.
    #[must_use]
    pub fn attach(&self, request: reqwest::RequestBuilder, url: &Url) -> reqwest::RequestBuilder {
        match CookieStore::cookies(self, url) {
            Some(value) => request.header(reqwest::header::COOKIE, value),
            None => request,
        }
    }

    /// Probes `probe_url` with the current cookies.
    ///
    /// `client` must not follow redirects: identity providers answer an
    /// unauthenticated probe with a redirect to their login page, which would
    /// otherwise end in a misleading `200`. Returns true only for a 2xx answer.
    /// Without a session no request is made.
    #[instrument(level = "debug", skip(self, client), fields(probe = %probe_url))]
    pub async fn has_valid_session(&self, client: &Client, probe_url: &Url) -> bool {
        if !self.has_session() {
            debug!("no session to validate");
            return false;
        }

        let request = self.attach(client.get(probe_url.clone()), probe_url);
        match request.send().await {
            Ok(response) => {
                let status = response.status();
                self.set_cookies(&mut response.headers().get_all(SET_COOKIE).iter(), probe_url);
                if status.is_success() {
                    info!("session cookies validated");
                    true
                } else {
                    info!(status = status.as_u16(), "session cookies rejected by probe");
                    false
                }
            }
            Err(error) => {
                warn!(error = %error, "session probe failed");
                false
            }
        }
    }

    fn read<T>(&self, f: impl FnOnce(Option<&Session>) -> T) -> T {
        let guard = self.session.read().unwrap_or_else(PoisonError::into_inner);
        f(guard.as_ref())
    }
}

/// Lets the download client carry the session on every hop of a redirect
/// chain and pick up cookies the data host sets along the way.
impl CookieStore for CredentialStore {
    fn set_cookies(&self, cookie_headers: &mut dyn Iterator<Item = &HeaderValue>, url: &Url) {
        let headers: Vec<&HeaderValue> = cookie_headers.collect();
        if headers.is_empty() {
            return;
        }
        let mut guard = self.session.write().unwrap_or_else(PoisonError::into_inner);
        guard.get_or_insert_with(Session::default).absorb(headers, url);
        self.changed.store(true, Ordering::Release);
    }

    fn cookies(&self, url: &Url) -> Option<HeaderValue> {
        self.read(|session| session.and_then(|s| s.cookie_header(url)))
    }
}

fn load_cookie_file(path: &Path) -> Result<Option<Vec<CookieLine>>, CookieError> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(error) => return Err(error.into()),
    };
    let parsed = parse_netscape_cookies(BufReader::new(file))?;
    for (line, reason) in &parsed.warnings {
        warn!(line, reason = %reason, "skipping malformed cookie line");
    }
    Ok(Some(parsed.cookies))
}

/// Writes via a sibling temp file and rename so a crash never leaves a
/// truncated jar behind.
fn save_cookie_file(path: &Path, cookies: &[CookieLine]) -> Result<(), CookieError> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let mut tmp_name = path.as_os_str().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = PathBuf::from(tmp_name);

    let file = open_private(&tmp_path)?;
    write_netscape_cookies(BufWriter::new(file), cookies)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(unix)]
fn open_private(path: &Path) -> io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_private(path: &Path) -> io::Result<fs::File> {
    fs::File::create(path)
}
