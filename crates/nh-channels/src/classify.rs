//! Shared HTTP response classification (§4.1 "mandatory classification rules").
//!
//! Adapters call a provider once per invocation and report the outcome; retrying
//! is the dispatcher's job (§4.4), so this module only classifies, it never loops.

use nh_common::AdapterError;

/// Classify an HTTP status code the way every HTTP-backed adapter agrees to:
/// 2xx is handled by the caller before reaching here, 400/401/403/404/501 are
/// configuration problems, 429 and 5xx are transient, other 4xx are permanent.
pub fn classify_http_status(status: u16, body_snippet: &str) -> AdapterError {
    match status {
        400 => AdapterError::misconfigured(format!("HTTP 400: bad request: {body_snippet}")),
        401 | 403 => AdapterError::misconfigured(format!("HTTP {status}: authentication/authorization error")),
        404 => AdapterError::misconfigured(format!("HTTP 404: endpoint not found")),
        501 => AdapterError::misconfigured("HTTP 501: not implemented".to_string()),
        429 => AdapterError::transient(format!("HTTP 429: rate limited: {body_snippet}")),
        s if (500..600).contains(&s) => AdapterError::transient(format!("HTTP {s}: server error: {body_snippet}")),
        s if (400..500).contains(&s) => AdapterError::permanent(format!("HTTP {s}: client error: {body_snippet}")),
        s => AdapterError::transient(format!("HTTP {s}: unexpected status")),
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> AdapterError {
    if err.is_timeout() {
        AdapterError::transient(format!("request timeout: {err}"))
    } else if err.is_connect() {
        AdapterError::transient(format!("connection error: {err}"))
    } else {
        AdapterError::transient(format!("request failed: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nh_common::AdapterErrorKind;

    #[test]
    fn rate_limit_is_transient() {
        assert_eq!(classify_http_status(429, "").kind, AdapterErrorKind::Transient);
    }

    #[test]
    fn bad_request_is_misconfigured() {
        assert_eq!(classify_http_status(400, "bad payload").kind, AdapterErrorKind::Misconfigured);
    }

    #[test]
    fn server_error_is_transient() {
        assert_eq!(classify_http_status(503, "").kind, AdapterErrorKind::Transient);
    }

    #[test]
    fn other_client_error_is_permanent() {
        assert_eq!(classify_http_status(422, "invalid phone").kind, AdapterErrorKind::Permanent);
    }
}
