//! Refresh token cookie

use axum::http::{header, HeaderMap};
use chrono::Duration;

pub const REFRESH_COOKIE: &str = "refreshToken";
/// The cookie is only ever sent to the refresh endpoint
pub const REFRESH_COOKIE_PATH: &str = "/api/auth/refresh-token";

/// `Set-Cookie` value carrying a refresh token
pub fn refresh_cookie(token: &str, max_age: Duration, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; HttpOnly; SameSite=Strict; Path={}; Max-Age={}",
        REFRESH_COOKIE,
        token,
        REFRESH_COOKIE_PATH,
        max_age.num_seconds()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that deletes the refresh cookie
pub fn clear_refresh_cookie() -> String {
    format!(
        "{}=; HttpOnly; SameSite=Strict; Path={}; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        REFRESH_COOKIE, REFRESH_COOKIE_PATH
    )
}

/// Value of cookie `name` across all `Cookie` headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
        .filter(|value| !value.is_empty())
}
