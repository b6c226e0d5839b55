//! Session cookie construction.
//!
//! One place builds every session cookie so the attribute set cannot drift:
//! HTTP-only, Secure, SameSite=Strict, path `/`, configurable name and
//! domain, `Expires` equal to the token expiry.

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::OffsetDateTime;

use caretaker_core::session::IssuedToken;

use crate::config::ServerConfig;

/// Build the session cookie carrying a freshly issued token.
#[must_use]
pub fn session_cookie(config: &ServerConfig, issued: &IssuedToken) -> Cookie<'static> {
    let mut cookie = base_cookie(config, issued.token.clone());
    if let Ok(expires) = OffsetDateTime::from_unix_timestamp(issued.expires_at.timestamp()) {
        cookie.set_expires(expires);
    }
    cookie
}

/// Build the cookie that clears the session on the client.
#[must_use]
pub fn removal_cookie(config: &ServerConfig) -> Cookie<'static> {
    let mut cookie = base_cookie(config, String::new());
    cookie.make_removal();
    cookie
}

fn base_cookie(config: &ServerConfig, value: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(config.cookie_name.clone(), value);
    cookie.set_http_only(true);
    cookie.set_secure(true);
    cookie.set_same_site(SameSite::Strict);
    cookie.set_path("/");
    if let Some(ref domain) = config.cookie_domain {
        cookie.set_domain(domain.clone());
    }
    cookie
}
