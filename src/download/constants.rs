//! Constants for the download module (timeouts, buffering).

/// Default HTTP connect timeout (30 seconds).
pub const CONNECT_TIMEOUT_SECS: u64 = 30;

/// Default HTTP read timeout (5 minutes between body reads).
pub const READ_TIMEOUT_SECS: u64 = 300;

/// Write buffer in front of the destination file. A crash loses at most this
/// many bytes of already-received data.
pub const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Range asked for by the metadata probe.
pub(crate) const PROBE_RANGE: &str = "bytes=0-0";

/// URL fragments that identify an identity provider's login page.
pub(crate) const LOGIN_PATTERNS: &[&str] = &[
    "/login",
    "/signin",
    "/sign-in",
    "/auth/",
    "/sso",
    "/cas/login",
    "/saml",
    "/oauth",
    "/openid",
    "/idp/",
];
