pub mod admin_keys;
pub mod admin_logs;
pub mod admin_security;
pub mod auth;
pub mod consultas;
pub mod health;

use axum::http::HeaderMap;

/// Best-effort client IP: first hop of `x-forwarded-for`, then
/// `x-real-ip`, then "unknown".
pub fn client_ip(headers: &HeaderMap) -> String {
    if let Some(forwarded) = header_str(headers, "x-forwarded-for") {
        if let Some(first) = forwarded.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_string();
            }
        }
    }

    header_str(headers, "x-real-ip").unwrap_or_else(|| "unknown".to_string())
}

/// Header value as an owned string, when present and valid UTF-8.
pub fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|h| h.to_str().ok())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_takes_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));

        assert_eq!(client_ip(&headers), "203.0.113.7");
    }

    #[test]
    fn real_ip_is_the_fallback() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));

        assert_eq!(client_ip(&headers), "198.51.100.4");
        assert_eq!(client_ip(&HeaderMap::new()), "unknown");
    }
}
