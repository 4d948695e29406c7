//! Response classification
//!
//! Decides what the executor does with a received HTTP response: hand the
//! payload back, back off and retry (rate limited), give up immediately
//! (any other API error), or treat it like a transport failure (unreadable
//! body). The rate-limit predicate is kept separate so it can be swapped
//! without touching the retry loop.

use serde_json::Value;

use crate::envelope::ApiError;

/// Error code the API uses for "application request limit reached".
pub const RATE_LIMIT_CODE: i64 = 4;

/// Message fragment that marks a rate-limit error regardless of code.
const RATE_LIMIT_PATTERN: &str = "rate limit";

/// What a single HTTP response means for the retry loop.
#[derive(Debug, Clone, PartialEq)]
pub enum Classification {
    /// HTTP 200 with a JSON body.
    Success(Value),
    /// Retryable with the rate-limit backoff.
    RateLimited(ApiError),
    /// Not retried.
    Terminal(ApiError),
    /// Body could not be parsed as JSON; retried like a transport failure.
    Malformed(String),
}

/// Whether an API error means "slow down" rather than "this call is wrong".
///
/// True when the code equals [`RATE_LIMIT_CODE`] or the message contains
/// "rate limit" in any case.
pub fn is_rate_limited(error: &ApiError) -> bool {
    error.code == Some(RATE_LIMIT_CODE)
        || error.message.to_lowercase().contains(RATE_LIMIT_PATTERN)
}

/// Classify a response by HTTP status and raw body.
pub fn classify_response(status: u16, body: &str) -> Classification {
    let parsed: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(e) => {
            return Classification::Malformed(format!(
                "invalid JSON in HTTP {status} response: {e}"
            ));
        }
    };

    if status == 200 {
        return Classification::Success(parsed);
    }

    match ApiError::from_body(status, &parsed) {
        Some(error) if is_rate_limited(&error) => Classification::RateLimited(error),
        Some(error) => Classification::Terminal(error),
        None => Classification::Terminal(ApiError::new(format!("HTTP {status}")).with_status(status)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api_error(code: Option<i64>, message: &str) -> ApiError {
        ApiError {
            message: message.into(),
            code,
            http_status: Some(400),
            kind: None,
        }
    }

    #[test]
    fn rate_limit_by_code() {
        assert!(is_rate_limited(&api_error(Some(4), "Application request limit reached")));
    }

    #[test]
    fn rate_limit_by_message_case_insensitive() {
        assert!(is_rate_limited(&api_error(Some(17), "User request RATE LIMIT reached")));
        assert!(is_rate_limited(&api_error(None, "rate limit exceeded")));
    }

    #[test]
    fn other_errors_are_not_rate_limited() {
        assert!(!is_rate_limited(&api_error(Some(10), "permission denied")));
        assert!(!is_rate_limited(&api_error(None, "")));
        assert!(!is_rate_limited(&api_error(Some(190), "rate-limited token")));
    }

    #[test]
    fn classify_200_json_is_success() {
        let c = classify_response(200, r#"{"data":[1,2,3]}"#);
        assert_eq!(c, Classification::Success(serde_json::json!({"data": [1, 2, 3]})));
    }

    #[test]
    fn classify_200_invalid_json_is_malformed() {
        assert!(matches!(
            classify_response(200, "<html>ok</html>"),
            Classification::Malformed(_)
        ));
    }

    #[test]
    fn classify_rate_limited_body() {
        let c = classify_response(400, r#"{"error":{"code":4,"message":"rate limit exceeded"}}"#);
        match c {
            Classification::RateLimited(e) => {
                assert_eq!(e.code, Some(4));
                assert_eq!(e.http_status, Some(400));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn classify_permission_error_is_terminal() {
        let c = classify_response(403, r#"{"error":{"code":10,"message":"permission denied"}}"#);
        match c {
            Classification::Terminal(e) => {
                assert_eq!(e.message, "permission denied");
                assert_eq!(e.code, Some(10));
                assert_eq!(e.http_status, Some(403));
            }
            other => panic!("expected Terminal, got {other:?}"),
        }
    }

    #[test]
    fn classify_error_status_without_error_object() {
        match classify_response(404, r#"{"detail":"missing"}"#) {
            Classification::Terminal(e) => {
                assert_eq!(e.message, "HTTP 404");
                assert_eq!(e.http_status, Some(404));
            }
            other => panic!("expected Terminal, got {other:?}"),
        }
    }

    #[test]
    fn classify_error_status_with_html_body_is_malformed() {
        assert!(matches!(
            classify_response(502, "<html>Bad Gateway</html>"),
            Classification::Malformed(_)
        ));
    }

    #[test]
    fn classify_non_200_success_status_is_not_success() {
        // Only 200 counts as success; a 201 with an error-free body is terminal.
        assert!(matches!(
            classify_response(201, r#"{"id":"1"}"#),
            Classification::Terminal(_)
        ));
    }
}
