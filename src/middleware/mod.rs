pub mod admin;

use axum::http::HeaderMap;

/// Read one cookie value from the `Cookie` header, if present.
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    let raw = headers.get("cookie")?.to_str().ok()?;

    raw.split(';').find_map(|pair| {
        let (key, value) = pair.trim().split_once('=')?;
        if key == name {
            Some(value.to_string())
        } else {
            None
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn finds_cookie_among_several() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "cookie",
            HeaderValue::from_static("theme=dark; apiKey=abc123; lang=pt"),
        );

        assert_eq!(cookie_value(&headers, "apiKey").as_deref(), Some("abc123"));
        assert_eq!(cookie_value(&headers, "missing"), None);
    }

    #[test]
    fn no_cookie_header_yields_none() {
        assert_eq!(cookie_value(&HeaderMap::new(), "apiKey"), None);
    }
}
