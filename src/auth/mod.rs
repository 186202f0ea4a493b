//! Session authentication.
//!
//! Cookies are kept in Netscape format on disk and as a [`Session`] in memory.
//! The [`CredentialStore`] holds the current session for the process and
//! doubles as the download client's cookie provider; the [`AuthClient`]
//! validates it against a probe endpoint and performs the login handshake
//! when it is missing or rejected.

mod cookies;
mod credentials;
mod error;
mod login;
mod session;
mod store;

pub use cookies::{
    CookieError, CookieLine, ParseResult, load_cookies_into_jar, parse_netscape_cookies,
    parse_set_cookie, write_netscape_cookies,
};
pub use credentials::{CredentialError, CredentialSupplier, Credentials, StaticCredentials};
pub use error::AuthError;
pub use login::{AuthClient, Authenticator, DEFAULT_AUTH_TIMEOUT_SECS, DEFAULT_PROBE_URL};
pub use session::Session;
pub use store::CredentialStore;
