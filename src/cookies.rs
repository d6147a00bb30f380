//! Session cookie transport

use crate::error::AuthError;

use axum::http::{header, HeaderMap, HeaderValue};
use cookie::{time, Cookie, SameSite};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Read a cookie value from the request headers
pub fn get_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| Cookie::split_parse(h.to_string()))
        .filter_map(Result::ok)
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
}

/// httpOnly, `SameSite=Lax` cookie living as long as the token it carries
pub fn session_cookie(
    name: &'static str,
    value: String,
    lifetime: chrono::Duration,
    secure: bool,
) -> Cookie<'static> {
    Cookie::build((name, value))
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax)
        .path("/")
        .max_age(time::Duration::seconds(lifetime.num_seconds()))
        .build()
}

/// Expired, empty cookie that makes the browser drop `name`
pub fn removal_cookie(name: &'static str, secure: bool) -> Cookie<'static> {
    session_cookie(name, String::new(), chrono::Duration::zero(), secure)
}

pub fn set_cookie_header(cookie: &Cookie<'_>) -> Result<HeaderValue, AuthError> {
    HeaderValue::from_str(&cookie.to_string()).map_err(|e| {
        tracing::error!("Unrepresentable cookie header: {:?}", e);
        AuthError::Internal
    })
}

/// Append a `Set-Cookie` header
pub fn append_cookie(headers: &mut HeaderMap, cookie: &Cookie<'_>) -> Result<(), AuthError> {
    headers.append(header::SET_COOKIE, set_cookie_header(cookie)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_cookie_finds_named_value() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; accessToken=abc.def.ghi; refreshToken=xyz"),
        );

        assert_eq!(get_cookie(&headers, ACCESS_COOKIE).as_deref(), Some("abc.def.ghi"));
        assert_eq!(get_cookie(&headers, REFRESH_COOKIE).as_deref(), Some("xyz"));
        assert_eq!(get_cookie(&headers, "missing"), None);
    }

    #[test]
    fn test_get_cookie_across_multiple_headers() {
        let mut headers = HeaderMap::new();
        headers.append(header::COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::COOKIE, HeaderValue::from_static("refreshToken=r"));

        assert_eq!(get_cookie(&headers, REFRESH_COOKIE).as_deref(), Some("r"));
    }

    #[test]
    fn test_session_cookie_attributes() {
        let cookie = session_cookie(
            ACCESS_COOKIE,
            "token".into(),
            chrono::Duration::minutes(15),
            true,
        );
        let rendered = cookie.to_string();

        assert!(rendered.starts_with("accessToken=token"));
        assert!(rendered.contains("HttpOnly"));
        assert!(rendered.contains("Secure"));
        assert!(rendered.contains("SameSite=Lax"));
        assert!(rendered.contains("Max-Age=900"));
    }

    #[test]
    fn test_removal_cookie_expires_immediately() {
        let rendered = removal_cookie(REFRESH_COOKIE, false).to_string();
        assert!(rendered.contains("Max-Age=0"));
        assert!(!rendered.contains("Secure"));
    }
}
