//! Uniform result wrapper returned by every request operation

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

/// Message of the failure returned when the retry budget runs out on
/// rate-limit responses.
pub const ALL_RETRIES_EXHAUSTED: &str = "all retries exhausted";

/// Error descriptor carried by a failed envelope.
///
/// Built from the API's `{"error": {...}}` body when one is present, or
/// from a transport failure message otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    /// The API's error type string (e.g. `OAuthException`).
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl ApiError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            http_status: None,
            kind: None,
        }
    }

    pub fn with_status(mut self, http_status: u16) -> Self {
        self.http_status = Some(http_status);
        self
    }

    /// Extract the `error` object from a response body.
    ///
    /// Returns `None` when the body has no `error` object. Missing or
    /// mistyped fields inside the object degrade to defaults.
    pub fn from_body(http_status: u16, body: &Value) -> Option<Self> {
        let error = body.get("error")?.as_object()?;
        let message = error
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        // Codes arrive as numbers, occasionally as numeric strings.
        let code = error.get("code").and_then(|c| match c {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });
        let kind = error
            .get("type")
            .and_then(Value::as_str)
            .map(str::to_string);
        Some(Self {
            message,
            code,
            http_status: Some(http_status),
            kind,
        })
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.code, self.http_status) {
            (Some(code), Some(status)) => write!(f, "{} (code {code}, HTTP {status})", self.message),
            (None, Some(status)) => write!(f, "{} (HTTP {status})", self.message),
            (Some(code), None) => write!(f, "{} (code {code})", self.message),
            (None, None) => f.write_str(&self.message),
        }
    }
}

/// Outcome of one logical call: a parsed payload or an error descriptor,
/// never both.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseEnvelope {
    Success(Value),
    Failure(ApiError),
}

impl ResponseEnvelope {
    pub fn is_success(&self) -> bool {
        matches!(self, ResponseEnvelope::Success(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            ResponseEnvelope::Success(payload) => Some(payload),
            ResponseEnvelope::Failure(_) => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            ResponseEnvelope::Success(_) => None,
            ResponseEnvelope::Failure(error) => Some(error),
        }
    }

    pub fn into_result(self) -> Result<Value, ApiError> {
        match self {
            ResponseEnvelope::Success(payload) => Ok(payload),
            ResponseEnvelope::Failure(error) => Err(error),
        }
    }

    /// The `data` array of a list response, if the payload has one.
    pub fn records(&self) -> Option<&Vec<Value>> {
        self.payload()?.get("data")?.as_array()
    }

    /// The `paging.next` continuation URL, if present and non-empty.
    pub fn next_cursor(&self) -> Option<&str> {
        self.payload()?
            .get("paging")?
            .get("next")?
            .as_str()
            .filter(|s| !s.is_empty())
    }
}

/// Serializes as `{"success": true, "data": ...}` or
/// `{"success": false, "error": {...}}`.
impl Serialize for ResponseEnvelope {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("ResponseEnvelope", 2)?;
        match self {
            ResponseEnvelope::Success(payload) => {
                state.serialize_field("success", &true)?;
                state.serialize_field("data", payload)?;
            }
            ResponseEnvelope::Failure(error) => {
                state.serialize_field("success", &false)?;
                state.serialize_field("error", error)?;
            }
        }
        state.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn from_body_reads_graph_error_object() {
        let body = json!({"error": {"message": "Invalid OAuth access token.", "type": "OAuthException", "code": 190}});
        let err = ApiError::from_body(400, &body).unwrap();
        assert_eq!(err.message, "Invalid OAuth access token.");
        assert_eq!(err.code, Some(190));
        assert_eq!(err.http_status, Some(400));
        assert_eq!(err.kind.as_deref(), Some("OAuthException"));
    }

    #[test]
    fn from_body_accepts_string_code() {
        let body = json!({"error": {"message": "slow down", "code": "4"}});
        assert_eq!(ApiError::from_body(400, &body).unwrap().code, Some(4));
    }

    #[test]
    fn from_body_without_error_object_is_none() {
        assert!(ApiError::from_body(500, &json!({"detail": "oops"})).is_none());
        assert!(ApiError::from_body(500, &json!({"error": "flat string"})).is_none());
    }

    #[test]
    fn display_includes_code_and_status() {
        let err = ApiError {
            message: "permission denied".into(),
            code: Some(10),
            http_status: Some(403),
            kind: None,
        };
        assert_eq!(err.to_string(), "permission denied (code 10, HTTP 403)");
        assert_eq!(ApiError::new("boom").to_string(), "boom");
    }

    #[test]
    fn success_exposes_payload_only() {
        let env = ResponseEnvelope::Success(json!({"data": [1, 2, 3]}));
        assert!(env.is_success());
        assert!(env.error().is_none());
        assert_eq!(env.records().unwrap().len(), 3);
        assert!(env.next_cursor().is_none());
    }

    #[test]
    fn failure_exposes_error_only() {
        let env = ResponseEnvelope::Failure(ApiError::new("nope"));
        assert!(!env.is_success());
        assert!(env.payload().is_none());
        assert_eq!(env.error().unwrap().message, "nope");
        assert!(env.records().is_none());
    }

    #[test]
    fn next_cursor_ignores_empty_string() {
        let env = ResponseEnvelope::Success(json!({"data": [], "paging": {"next": ""}}));
        assert!(env.next_cursor().is_none());

        let env = ResponseEnvelope::Success(
            json!({"data": [], "paging": {"next": "https://graph.example.com/v18.0/1/posts?after=X"}}),
        );
        assert_eq!(
            env.next_cursor(),
            Some("https://graph.example.com/v18.0/1/posts?after=X")
        );
    }

    #[test]
    fn serializes_with_success_flag() {
        let ok = serde_json::to_value(ResponseEnvelope::Success(json!({"id": "1"}))).unwrap();
        assert_eq!(ok, json!({"success": true, "data": {"id": "1"}}));

        let err = serde_json::to_value(ResponseEnvelope::Failure(
            ApiError::new("denied").with_status(403),
        ))
        .unwrap();
        assert_eq!(
            err,
            json!({"success": false, "error": {"message": "denied", "http_status": 403}})
        );
    }
}
