use std::time::Duration;

use axum::http::{header::COOKIE, HeaderMap, HeaderValue};

pub const ACCESS_COOKIE: &str = "accessToken";
pub const REFRESH_COOKIE: &str = "refreshToken";

/// Returns the value of cookie `name` from any `Cookie` header.
pub fn read(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Builds an HttpOnly `Set-Cookie` value scoped to the whole API.
pub fn build(name: &str, value: &str, max_age: Duration, secure: bool) -> Option<HeaderValue> {
    let mut cookie = format!(
        "{name}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        max_age.as_secs()
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_finds_named_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            COOKIE,
            HeaderValue::from_static("theme=dark; accessToken=abc.def.ghi; other=1"),
        );
        assert_eq!(read(&headers, ACCESS_COOKIE).as_deref(), Some("abc.def.ghi"));
        assert_eq!(read(&headers, REFRESH_COOKIE), None);
    }

    #[test]
    fn empty_cookie_is_absent() {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_static("accessToken="));
        assert_eq!(read(&headers, ACCESS_COOKIE), None);
    }

    #[test]
    fn build_sets_flags() {
        let value = build(REFRESH_COOKIE, "tok", Duration::from_secs(60), true).unwrap();
        let s = value.to_str().unwrap();
        assert!(s.starts_with("refreshToken=tok;"));
        assert!(s.contains("HttpOnly"));
        assert!(s.contains("Max-Age=60"));
        assert!(s.ends_with("; Secure"));

        let plain = build(ACCESS_COOKIE, "tok", Duration::from_secs(1), false).unwrap();
        assert!(!plain.to_str().unwrap().contains("Secure"));
    }
}
