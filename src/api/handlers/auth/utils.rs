//! Small helpers shared by the auth handlers.

use crate::device::RequestMetadata;
use axum::http::HeaderMap;
use regex::Regex;

/// Basic email format check on already-normalized input.
#[must_use]
pub(crate) fn valid_email(email_normalized: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email_normalized))
}

/// Extract a client IP for rate limiting from common proxy headers.
pub(crate) fn extract_client_ip(headers: &HeaderMap) -> Option<String> {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if forwarded.is_some() {
        return forwarded.map(str::to_string);
    }
    headers
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Best-effort geo hint from CDN headers; absent locally.
pub(crate) fn extract_geo_location(headers: &HeaderMap) -> Option<String> {
    for header in ["x-geo-city", "cf-ipcountry", "x-geo-country"] {
        if let Some(value) = headers
            .get(header)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            return Some(value.to_string());
        }
    }
    None
}

/// Assemble the request metadata the recorder consumes.
pub(crate) fn request_metadata(headers: &HeaderMap) -> RequestMetadata {
    RequestMetadata {
        ip: extract_client_ip(headers).unwrap_or_else(|| crate::device::UNKNOWN.to_string()),
        user_agent: headers
            .get(axum::http::header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
            .unwrap_or(crate::device::UNKNOWN)
            .to_string(),
        location: extract_geo_location(headers),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(valid_email("name.surname@example.co"));
    }

    #[test]
    fn valid_email_rejects_missing_parts() {
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-at.example.com"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn extract_client_ip_prefers_forwarded() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("1.2.3.4, 5.6.7.8"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("1.2.3.4".to_string()));
    }

    #[test]
    fn extract_client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("9.9.9.9"));
        assert_eq!(extract_client_ip(&headers), Some("9.9.9.9".to_string()));
    }

    #[test]
    fn request_metadata_defaults_to_unknown() {
        let metadata = request_metadata(&HeaderMap::new());
        assert_eq!(metadata.ip, "unknown");
        assert_eq!(metadata.user_agent, "unknown");
        assert_eq!(metadata.location, None);
    }

    #[test]
    fn geo_location_reads_cdn_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("cf-ipcountry", HeaderValue::from_static("ES"));
        assert_eq!(extract_geo_location(&headers), Some("ES".to_string()));
    }
}
