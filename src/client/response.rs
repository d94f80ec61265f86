//! Response inspection shared by the blocking and async clients.

use crate::{Error, Result};
use reqwest::header::{HeaderMap, CONTENT_TYPE, RETRY_AFTER};
use std::time::Duration;

const BODY_SNIPPET_LEN: usize = 512;

/// Extract the first non-empty header value.
pub(crate) fn header_first(headers: &HeaderMap, names: &[&str]) -> Option<String> {
    for name in names {
        if let Some(v) = headers.get(*name) {
            if let Ok(s) = v.to_str() {
                let s = s.trim();
                if !s.is_empty() {
                    return Some(s.to_string());
                }
            }
        }
    }
    None
}

pub(crate) fn content_type(headers: &HeaderMap) -> String {
    headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

pub(crate) fn is_json_content_type(content_type: &str) -> bool {
    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();
    mime == "application/json" || mime.ends_with("+json")
}

/// `Retry-After: <seconds>` (fractional allowed), clamped to `cap`.
///
/// HTTP-date values are ignored.
pub(crate) fn retry_after(headers: &HeaderMap, cap: Duration) -> Option<Duration> {
    let raw = header_first(headers, &[RETRY_AFTER.as_str()])?;
    let secs: f64 = raw.parse().ok()?;
    if !secs.is_finite() || secs < 0.0 {
        return None;
    }
    Duration::try_from_secs_f64(secs.min(cap.as_secs_f64())).ok()
}

pub(crate) fn snippet(body: &str) -> String {
    body.chars().take(BODY_SNIPPET_LEN).collect()
}

/// Classify a final response for the JSON helpers.
///
/// Retryable statuses and non-JSON bodies become retryable errors so the outer retry
/// loop re-attempts; other non-success statuses fail without retry.
pub(crate) fn classify_json(
    status: u16,
    headers: &HeaderMap,
    retryable: bool,
    body: &str,
) -> Result<()> {
    if retryable {
        return Err(Error::Status {
            status,
            retryable: true,
            body: snippet(body),
        });
    }
    let ct = content_type(headers);
    if !is_json_content_type(&ct) {
        return Err(Error::UnexpectedContentType {
            status,
            content_type: ct,
        });
    }
    if !(200..300).contains(&status) {
        return Err(Error::Status {
            status,
            retryable: false,
            body: snippet(body),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(*k, HeaderValue::from_static(v));
        }
        h
    }

    #[test]
    fn test_json_content_type_detection() {
        assert!(is_json_content_type("application/json"));
        assert!(is_json_content_type("application/json; charset=utf-8"));
        assert!(is_json_content_type("Application/JSON"));
        assert!(is_json_content_type("application/problem+json"));
        assert!(!is_json_content_type("text/html; charset=utf-8"));
        assert!(!is_json_content_type(""));
    }

    #[test]
    fn test_retry_after_parsing_and_cap() {
        let cap = Duration::from_secs(5);
        assert_eq!(
            retry_after(&headers(&[("retry-after", "2")]), cap),
            Some(Duration::from_secs(2))
        );
        assert_eq!(
            retry_after(&headers(&[("retry-after", "0.5")]), cap),
            Some(Duration::from_millis(500))
        );
        assert_eq!(retry_after(&headers(&[("retry-after", "120")]), cap), Some(cap));
        assert_eq!(retry_after(&headers(&[("retry-after", "-1")]), cap), None);
        assert_eq!(retry_after(&headers(&[("retry-after", "1e30")]), cap), Some(cap));
        assert_eq!(retry_after(&headers(&[("retry-after", "inf")]), cap), None);
        assert_eq!(
            retry_after(
                &headers(&[("retry-after", "Wed, 21 Oct 2015 07:28:00 GMT")]),
                cap
            ),
            None
        );
        assert_eq!(retry_after(&HeaderMap::new(), cap), None);
    }

    #[test]
    fn test_classify_json() {
        let json = headers(&[("content-type", "application/json")]);
        let html = headers(&[("content-type", "text/html")]);

        assert!(classify_json(200, &json, false, "{}").is_ok());

        let err = classify_json(200, &html, false, "<html>").unwrap_err();
        assert!(matches!(err, Error::UnexpectedContentType { status: 200, .. }));
        assert!(err.is_retryable());

        let err = classify_json(503, &json, true, "{}").unwrap_err();
        assert!(err.is_retryable());

        let err = classify_json(404, &json, false, "{}").unwrap_err();
        assert!(matches!(err, Error::Status { status: 404, retryable: false, .. }));
    }

    #[test]
    fn test_snippet_truncates() {
        let long = "x".repeat(2000);
        assert_eq!(snippet(&long).len(), BODY_SNIPPET_LEN);
        assert_eq!(snippet("short"), "short");
    }
}
