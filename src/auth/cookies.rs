//! Cookie representation shared by the session, the login handshake, and the
//! on-disk cookie jar.
//!
//! Two wire formats are handled here:
//! - the Netscape HTTP cookie file (7 TAB-separated fields per line), used to
//!   persist a session between runs
//! - `Set-Cookie` response headers, used to capture cookies issued during login

use std::fmt;
use std::io::{BufRead, Write};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use reqwest::cookie::Jar;
use tracing::{debug, instrument, warn};
use url::Url;

/// Prefix curl and browsers put in front of `HttpOnly` cookie lines.
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Expiry sentinel for cookies the server asked us to delete.
const EXPIRED_SENTINEL: u64 = 1;

/// A single cookie, in the shape of one Netscape cookie-file line.
///
/// The value field is intentionally redacted in Debug output to prevent
/// accidental logging of session tokens.
#[derive(Clone, PartialEq, Eq)]
pub struct CookieLine {
    /// The domain the cookie belongs to (e.g., `.earthdata.nasa.gov`).
    pub domain: String,
    /// Whether subdomains should match.
    pub tailmatch: bool,
    /// The URL path scope for the cookie.
    pub path: String,
    /// Whether the cookie should only be sent over HTTPS.
    pub secure: bool,
    /// Unix timestamp for expiry (0 = session cookie).
    pub expires: u64,
    /// Cookie name.
    pub name: String,
    /// Cookie value (sensitive, never log).
    value: String,
}

impl CookieLine {
    /// Creates a new cookie entry.
    #[must_use]
    pub fn new(
        domain: String,
        tailmatch: bool,
        path: String,
        secure: bool,
        expires: u64,
        name: String,
        value: String,
    ) -> Self {
        Self {
            domain,
            tailmatch,
            path,
            secure,
            expires,
            name,
            value,
        }
    }

    /// Returns the cookie value.
    ///
    /// Cookie values are sensitive; avoid logging the return value.
    #[must_use]
    pub fn value(&self) -> &str {
        &self.value
    }

    /// Returns true when the cookie carries an expiry at or before `now`.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires != 0 && self.expires <= now
    }

    /// Returns true when `other` names the same cookie slot (domain, path, name).
    #[must_use]
    pub fn same_slot(&self, other: &CookieLine) -> bool {
        self.name == other.name
            && self.path == other.path
            && self
                .domain
                .trim_start_matches('.')
                .eq_ignore_ascii_case(other.domain.trim_start_matches('.'))
    }
}

impl fmt::Debug for CookieLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CookieLine")
            .field("domain", &self.domain)
            .field("tailmatch", &self.tailmatch)
            .field("path", &self.path)
            .field("secure", &self.secure)
            .field("expires", &self.expires)
            .field("name", &self.name)
            .field("value", &"[REDACTED]")
            .finish()
    }
}

/// Errors that can occur while reading or writing a cookie file.
#[derive(Debug, thiserror::Error)]
pub enum CookieError {
    /// A line in the cookie file has an invalid format.
    #[error("line {line_number}: {reason} (got: {content})")]
    InvalidLine {
        /// 1-based line number in the cookie file.
        line_number: usize,
        /// The offending line content (value redacted).
        content: String,
        /// Description of what was wrong.
        reason: String,
    },

    /// I/O error reading or writing the cookie file.
    #[error("cookie file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// No valid cookies found in a non-empty file.
    #[error("no valid cookies found in file ({malformed_count} lines failed to parse)")]
    NoCookiesFound {
        /// Number of malformed lines encountered.
        malformed_count: usize,
    },
}

/// Result of parsing a cookie file: cookies plus per-line warnings.
#[derive(Debug)]
pub struct ParseResult {
    /// Successfully parsed cookies.
    pub cookies: Vec<CookieLine>,
    /// Warnings for malformed lines (line number and reason).
    pub warnings: Vec<(usize, String)>,
}

/// Parses a Netscape-format cookie file from a buffered reader.
///
/// Each non-comment, non-blank line must contain exactly 7 TAB-separated fields:
/// `domain`, `tailmatch`, `path`, `secure`, `expires`, `name`, `value`.
/// Lines prefixed with `#HttpOnly_` are cookie lines, not comments.
///
/// # Errors
///
/// Returns [`CookieError::Io`] on read failure, or
/// [`CookieError::NoCookiesFound`] when a non-empty file yields zero valid cookies.
/// Individual malformed lines are collected as warnings.
#[instrument(level = "debug", skip(reader))]
pub fn parse_netscape_cookies(reader: impl BufRead) -> Result<ParseResult, CookieError> {
    let mut cookies = Vec::new();
    let mut warnings = Vec::new();
    let mut non_blank_lines = 0;

    for (idx, line_result) in reader.lines().enumerate() {
        let line_number = idx + 1;
        let line = line_result?;
        let line = line.trim_end();

        if line.is_empty() {
            continue;
        }

        let line = match line.strip_prefix(HTTP_ONLY_PREFIX) {
            Some(rest) => rest,
            None if line.starts_with('#') => continue,
            None => line,
        };

        non_blank_lines += 1;

        match parse_cookie_line(line, line_number) {
            Ok(cookie) => {
                debug!(line = line_number, domain = %cookie.domain, name = %cookie.name, "parsed cookie");
                cookies.push(cookie);
            }
            Err(e) => {
                warn!(line = line_number, reason = %e, "skipping malformed cookie line");
                warnings.push((line_number, e.to_string()));
            }
        }
    }

    if cookies.is_empty() && non_blank_lines > 0 {
        return Err(CookieError::NoCookiesFound {
            malformed_count: warnings.len(),
        });
    }

    Ok(ParseResult { cookies, warnings })
}

fn parse_cookie_line(line: &str, line_number: usize) -> Result<CookieLine, CookieError> {
    let invalid = |reason: String| CookieError::InvalidLine {
        line_number,
        content: redact_line_for_error(line),
        reason,
    };

    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() != 7 {
        return Err(invalid(format!(
            "expected 7 TAB-separated fields, found {}",
            fields.len()
        )));
    }

    let tailmatch = parse_bool_field(fields[1]).ok_or_else(|| {
        invalid(format!(
            "tailmatch field must be TRUE or FALSE, got '{}'",
            fields[1]
        ))
    })?;
    let secure = parse_bool_field(fields[3]).ok_or_else(|| {
        invalid(format!(
            "secure field must be TRUE or FALSE, got '{}'",
            fields[3]
        ))
    })?;
    let expires = fields[4].parse::<u64>().map_err(|_| {
        invalid(format!(
            "expires field must be a non-negative integer, got '{}'",
            fields[4]
        ))
    })?;

    if fields[0].is_empty() {
        return Err(invalid("domain field is empty".to_string()));
    }
    if fields[5].is_empty() {
        return Err(invalid("cookie name field is empty".to_string()));
    }

    Ok(CookieLine::new(
        fields[0].to_string(),
        tailmatch,
        fields[2].to_string(),
        secure,
        expires,
        fields[5].to_string(),
        fields[6].to_string(),
    ))
}

fn parse_bool_field(value: &str) -> Option<bool> {
    match value {
        "TRUE" => Some(true),
        "FALSE" => Some(false),
        _ => None,
    }
}

/// Redacts cookie value (7th field) from a line for safe error messages.
fn redact_line_for_error(line: &str) -> String {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() >= 7 {
        let mut redacted = fields[..6].join("\t");
        redacted.push_str("\t[REDACTED]");
        redacted
    } else {
        line.to_string()
    }
}

/// Writes cookies in Netscape cookie-file format.
///
/// Session cookies (expiry 0) are written too, so a saved jar restores the
/// whole session on the next run.
///
/// # Errors
///
/// Returns [`CookieError::Io`] when the writer fails.
pub fn write_netscape_cookies(
    mut writer: impl Write,
    cookies: &[CookieLine],
) -> Result<(), CookieError> {
    writeln!(writer, "# Netscape HTTP Cookie File")?;
    writeln!(writer, "# Written by bulkfetch. Edit at your own risk.")?;
    writeln!(writer)?;
    for cookie in cookies {
        writeln!(
            writer,
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            cookie.domain,
            bool_field(cookie.tailmatch),
            cookie.path,
            bool_field(cookie.secure),
            cookie.expires,
            cookie.name,
            cookie.value(),
        )?;
    }
    writer.flush()?;
    Ok(())
}

fn bool_field(value: bool) -> &'static str {
    if value { "TRUE" } else { "FALSE" }
}

/// Parses one `Set-Cookie` header received from `request_url`.
///
/// Returns `None` for headers without a `name=value` pair or whose `Domain`
/// attribute does not cover the responding host. A `Max-Age` of zero or less
/// yields a cookie that [`CookieLine::is_expired`] reports as expired, which
/// callers treat as a deletion.
#[must_use]
pub fn parse_set_cookie(header: &str, request_url: &Url, now: u64) -> Option<CookieLine> {
    let host = request_url.host_str()?.to_ascii_lowercase();
    let mut parts = header.split(';');
    let (name, value) = parts.next()?.split_once('=')?;
    let name = name.trim();
    if name.is_empty() {
        return None;
    }

    let mut domain_attr = None;
    let mut path_attr = None;
    let mut secure = false;
    let mut max_age: Option<i64> = None;
    let mut expires_at: Option<u64> = None;

    for attribute in parts {
        let (key, val) = match attribute.split_once('=') {
            Some((key, val)) => (key.trim(), val.trim()),
            None => (attribute.trim(), ""),
        };
        match key.to_ascii_lowercase().as_str() {
            "domain" if !val.is_empty() => {
                domain_attr = Some(val.trim_start_matches('.').to_ascii_lowercase());
            }
            "path" if val.starts_with('/') => path_attr = Some(val.to_string()),
            "secure" => secure = true,
            "max-age" => max_age = val.parse::<i64>().ok(),
            "expires" => {
                expires_at = httpdate::parse_http_date(val)
                    .ok()
                    .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                    .map(|d| d.as_secs().max(EXPIRED_SENTINEL));
            }
            _ => {}
        }
    }

    let (domain, tailmatch) = match domain_attr {
        Some(domain) => {
            if host != domain && !host.ends_with(&format!(".{domain}")) {
                debug!(host = %host, domain = %domain, "rejecting cookie for foreign domain");
                return None;
            }
            (format!(".{domain}"), true)
        }
        None => (host, false),
    };

    let expires = match max_age {
        Some(age) if age <= 0 => EXPIRED_SENTINEL,
        Some(age) => now.saturating_add(age.unsigned_abs()),
        None => expires_at.unwrap_or(0),
    };

    Some(CookieLine::new(
        domain,
        tailmatch,
        path_attr.unwrap_or_else(|| default_cookie_path(request_url)),
        secure,
        expires,
        name.to_string(),
        value.trim().to_string(),
    ))
}

/// RFC 6265 default-path: the request path up to (not including) its last `/`.
fn default_cookie_path(url: &Url) -> String {
    let path = url.path();
    match path.rfind('/') {
        Some(0) | None => "/".to_string(),
        Some(idx) => path[..idx].to_string(),
    }
}

/// Loads cookies into a `reqwest::cookie::Jar`.
///
/// Each `CookieLine` is converted back into a `Set-Cookie` string and added
/// with an origin URL built from its domain, so the jar's own matching rules
/// decide which requests carry it.
#[instrument(level = "debug", skip(cookies))]
pub fn load_cookies_into_jar(cookies: &[CookieLine]) -> Arc<Jar> {
    let jar = Arc::new(Jar::default());

    for cookie in cookies {
        let set_cookie = build_set_cookie_string(cookie);
        match build_origin_url(cookie).parse::<Url>() {
            Ok(url) => jar.add_cookie_str(&set_cookie, &url),
            Err(_) => warn!(
                domain = %cookie.domain,
                name = %cookie.name,
                "skipping cookie with unparseable domain"
            ),
        }
    }

    jar
}

/// Builds a `Set-Cookie` header string from a `CookieLine`.
///
/// Host-only cookies (`tailmatch == false`) omit the `Domain` attribute.
fn build_set_cookie_string(cookie: &CookieLine) -> String {
    let mut parts = vec![format!("{}={}", cookie.name, cookie.value())];

    if cookie.tailmatch {
        parts.push(format!("Domain={}", cookie.domain));
    }
    parts.push(format!("Path={}", cookie.path));
    if cookie.secure {
        parts.push("Secure".to_string());
    }
    if cookie.expires > 0 {
        if let Some(expires_str) = unix_to_http_date(cookie.expires) {
            parts.push(format!("Expires={expires_str}"));
        } else {
            warn!(
                domain = %cookie.domain,
                name = %cookie.name,
                expires = cookie.expires,
                "cookie expiry timestamp overflows SystemTime; treating as session cookie"
            );
        }
    }

    parts.join("; ")
}

/// Origin URL for `Jar::add_cookie_str`: scheme from the secure flag, leading
/// dot stripped from the domain.
fn build_origin_url(cookie: &CookieLine) -> String {
    let scheme = if cookie.secure { "https" } else { "http" };
    let domain = cookie.domain.strip_prefix('.').unwrap_or(&cookie.domain);
    format!("{scheme}://{domain}{}", cookie.path)
}

fn unix_to_http_date(timestamp: u64) -> Option<String> {
    let time = UNIX_EPOCH.checked_add(Duration::from_secs(timestamp))?;
    Some(httpdate::fmt_http_date(time))
}

/// Current Unix time in seconds.
pub(crate) fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use reqwest::cookie::CookieStore;
    use std::io::Cursor;

    const NOW: u64 = 1_700_000_000;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn cookie(domain: &str, tailmatch: bool, secure: bool, name: &str, value: &str) -> CookieLine {
        CookieLine::new(
            domain.to_string(),
            tailmatch,
            "/".to_string(),
            secure,
            0,
            name.to_string(),
            value.to_string(),
        )
    }

    #[test]
    fn test_parse_netscape_cookies_reads_python_style_jar() {
        let input = "\
# Netscape HTTP Cookie File
# http://curl.haxx.se/rfc/cookie_spec.html
# This is a generated file!  Do not edit.

.earthdata.nasa.gov\tTRUE\t/\tTRUE\t0\turs_user_already_logged\tyes
urs.earthdata.nasa.gov\tFALSE\t/\tTRUE\t1800000000\t_urs-gui_session\tabc123
";
        let result = parse_netscape_cookies(Cursor::new(input)).unwrap();
        assert_eq!(result.cookies.len(), 2);
        assert!(result.warnings.is_empty());
        assert_eq!(result.cookies[0].domain, ".earthdata.nasa.gov");
        assert!(result.cookies[0].tailmatch);
        assert_eq!(result.cookies[1].expires, 1_800_000_000);
        assert_eq!(result.cookies[1].value(), "abc123");
    }

    #[test]
    fn test_parse_netscape_cookies_accepts_http_only_prefix() {
        let input = "#HttpOnly_.asf.alaska.edu\tTRUE\t/\tTRUE\t0\tasf-urs\ttoken\n";
        let result = parse_netscape_cookies(Cursor::new(input)).unwrap();
        assert_eq!(result.cookies.len(), 1);
        assert_eq!(result.cookies[0].domain, ".asf.alaska.edu");
        assert_eq!(result.cookies[0].name, "asf-urs");
    }

    #[test]
    fn test_parse_netscape_cookies_collects_warnings_with_line_numbers() {
        let input = "\
.good.com\tTRUE\t/\tFALSE\t0\tname\tvalue
bad line without tabs
.good.com\tMAYBE\t/\tFALSE\t0\tname\tvalue
";
        let result = parse_netscape_cookies(Cursor::new(input)).unwrap();
        assert_eq!(result.cookies.len(), 1);
        assert_eq!(result.warnings.len(), 2);
        assert_eq!(result.warnings[0].0, 2);
        assert!(result.warnings[1].1.contains("tailmatch"));
    }

    #[test]
    fn test_parse_netscape_cookies_all_malformed_is_error() {
        let input = "nope\n.x.com\tTRUE\t/\tFALSE\tsoon\tn\tv\n";
        let err = parse_netscape_cookies(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, CookieError::NoCookiesFound { malformed_count: 2 }));
    }

    #[test]
    fn test_parse_netscape_cookies_empty_file_is_empty_result() {
        let result = parse_netscape_cookies(Cursor::new("")).unwrap();
        assert!(result.cookies.is_empty());
    }

    #[test]
    fn test_malformed_line_error_redacts_value() {
        let input = ".x.com\tTRUE\t/\tFALSE\tsoon\tname\tsecret_value\n";
        let err = parse_netscape_cookies(Cursor::new(input)).unwrap_err();
        assert!(matches!(err, CookieError::NoCookiesFound { .. }));
        let redacted = redact_line_for_error(input.trim_end());
        assert!(!redacted.contains("secret_value"));
        assert!(redacted.ends_with("[REDACTED]"));
    }

    #[test]
    fn test_cookie_line_debug_redacts_value() {
        let c = cookie(".example.com", true, false, "session", "super_secret_token");
        let debug_str = format!("{c:?}");
        assert!(debug_str.contains("[REDACTED]"));
        assert!(!debug_str.contains("super_secret_token"));
    }

    #[test]
    fn test_write_then_parse_preserves_session_cookies() {
        let cookies = vec![
            cookie(".earthdata.nasa.gov", true, true, "urs_guid", "g1"),
            CookieLine::new(
                "datapool.asf.alaska.edu".to_string(),
                false,
                "/SLC".to_string(),
                false,
                NOW,
                "asf-urs".to_string(),
                "jwt".to_string(),
            ),
        ];
        let mut buffer = Vec::new();
        write_netscape_cookies(&mut buffer, &cookies).unwrap();
        let text = String::from_utf8(buffer.clone()).unwrap();
        assert!(text.starts_with("# Netscape HTTP Cookie File"));

        let parsed = parse_netscape_cookies(Cursor::new(buffer)).unwrap();
        assert_eq!(parsed.cookies, cookies);
    }

    #[test]
    fn test_parse_set_cookie_host_only_defaults() {
        let c = parse_set_cookie(
            "session=abc; HttpOnly",
            &url("https://urs.example.org/oauth/authorize"),
            NOW,
        )
        .unwrap();
        assert_eq!(c.domain, "urs.example.org");
        assert!(!c.tailmatch);
        assert_eq!(c.path, "/oauth");
        assert_eq!(c.expires, 0);
        assert_eq!(c.value(), "abc");
    }

    #[test]
    fn test_parse_set_cookie_domain_path_secure_max_age() {
        let c = parse_set_cookie(
            "token=xyz; Domain=.example.org; Path=/; Secure; Max-Age=3600",
            &url("https://urs.example.org/login"),
            NOW,
        )
        .unwrap();
        assert_eq!(c.domain, ".example.org");
        assert!(c.tailmatch);
        assert!(c.secure);
        assert_eq!(c.path, "/");
        assert_eq!(c.expires, NOW + 3600);
        assert!(!c.is_expired(NOW));
    }

    #[test]
    fn test_parse_set_cookie_rejects_foreign_domain() {
        let c = parse_set_cookie(
            "token=xyz; Domain=evil.com",
            &url("https://urs.example.org/"),
            NOW,
        );
        assert!(c.is_none());
    }

    #[test]
    fn test_parse_set_cookie_zero_max_age_is_deletion() {
        let c = parse_set_cookie("token=; Max-Age=0", &url("https://a.example.org/"), NOW).unwrap();
        assert!(c.is_expired(NOW));
    }

    #[test]
    fn test_parse_set_cookie_expires_attribute() {
        let c = parse_set_cookie(
            "token=1; Expires=Wed, 21 Oct 2015 07:28:00 GMT",
            &url("https://a.example.org/"),
            NOW,
        )
        .unwrap();
        assert_eq!(c.expires, 1_445_412_480);
        assert!(c.is_expired(NOW));
    }

    #[test]
    fn test_parse_set_cookie_without_pair_is_none() {
        assert!(parse_set_cookie("garbage", &url("https://a.example.org/"), NOW).is_none());
        assert!(parse_set_cookie("=v", &url("https://a.example.org/"), NOW).is_none());
    }

    #[test]
    fn test_same_slot_ignores_leading_dot_and_value() {
        let a = cookie(".example.org", true, false, "n", "1");
        let b = cookie("example.org", false, false, "n", "2");
        let c = cookie("example.org", false, false, "other", "2");
        assert!(a.same_slot(&b));
        assert!(!a.same_slot(&c));
    }

    #[test]
    fn test_load_cookies_into_jar_domain_cookie_matches_subdomain() {
        let jar = load_cookies_into_jar(&[cookie(".example.com", true, false, "s", "abc")]);
        let header = jar.cookies(&url("http://sub.example.com/page")).unwrap();
        assert!(header.to_str().unwrap().contains("s=abc"));
        assert!(jar.cookies(&url("http://other.com/")).is_none());
    }

    #[test]
    fn test_load_cookies_into_jar_host_only_cookie_stays_on_host() {
        let jar = load_cookies_into_jar(&[cookie("exact.com", false, false, "s", "abc")]);
        assert!(jar.cookies(&url("http://exact.com/")).is_some());
        assert!(jar.cookies(&url("http://sub.exact.com/")).is_none());
    }

    #[test]
    fn test_build_set_cookie_string_attributes() {
        let mut c = cookie(".example.com", true, true, "token", "xyz");
        c.expires = NOW;
        let s = build_set_cookie_string(&c);
        assert!(s.starts_with("token=xyz"));
        assert!(s.contains("Domain=.example.com"));
        assert!(s.contains("Secure"));
        assert!(s.contains("Expires="));

        let host_only = build_set_cookie_string(&cookie("exact.com", false, false, "n", "v"));
        assert!(!host_only.contains("Domain="));
        assert!(!host_only.contains("Expires"));
    }

    #[test]
    fn test_build_origin_url_uses_scheme_from_secure_flag() {
        assert_eq!(
            build_origin_url(&cookie(".secure.com", true, true, "n", "v")),
            "https://secure.com/"
        );
        assert_eq!(
            build_origin_url(&cookie("plain.com", false, false, "n", "v")),
            "http://plain.com/"
        );
    }
}
