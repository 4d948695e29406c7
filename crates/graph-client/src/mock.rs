//! Scripted in-memory transport for unit tests
//!
//! Built for this crate's tests and, with the `test-util` feature, for
//! downstream crates' tests.

use std::collections::{BTreeMap, VecDeque};
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use crate::request::Method;
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};

/// What the transport saw, with secrets exposed so tests can assert on them.
#[derive(Debug, Clone)]
pub struct Recorded {
    pub method: Method,
    pub url: String,
    pub params: BTreeMap<String, String>,
    pub proxy: Option<String>,
    pub timeout: Duration,
}

impl Recorded {
    /// The credential the executor injected.
    pub fn access_token(&self) -> Option<&str> {
        self.params.get("access_token").map(String::as_str)
    }
}

/// Replays queued responses in order. An exhausted script answers with a
/// connection error.
#[derive(Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    seen: Mutex<Vec<Recorded>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_json(&self, status: u16, body: Value) {
        self.push_text(status, &body.to_string());
    }

    pub fn push_text(&self, status: u16, body: &str) {
        self.script.lock().unwrap().push_back(Ok(HttpResponse {
            status,
            body: body.to_string(),
        }));
    }

    pub fn push_error(&self, error: TransportError) {
        self.script.lock().unwrap().push_back(Err(error));
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.seen.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().unwrap().len()
    }
}

impl Transport for ScriptedTransport {
    fn send<'a>(
        &'a self,
        request: &'a HttpRequest,
    ) -> Pin<Box<dyn Future<Output = Result<HttpResponse, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            self.seen.lock().unwrap().push(Recorded {
                method: request.method,
                url: request.url.clone(),
                params: request.params.iter().cloned().collect(),
                proxy: request.proxy.as_ref().map(|p| p.expose().clone()),
                timeout: request.timeout,
            });
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TransportError::Connect("script exhausted".into())))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> HttpRequest {
        HttpRequest {
            method: Method::Get,
            url: "https://graph.example.com/v18.0/me".into(),
            params: vec![("access_token".into(), "EAAB-1".into())],
            proxy: None,
            timeout: Duration::from_secs(30),
        }
    }

    #[tokio::test]
    async fn replays_in_order_then_fails_to_connect() {
        let transport = ScriptedTransport::new();
        transport.push_text(200, "{}");

        assert_eq!(transport.send(&request()).await.unwrap().status, 200);
        let err = transport.send(&request()).await.unwrap_err();
        assert!(matches!(err, TransportError::Connect(_)), "got: {err:?}");

        assert_eq!(transport.calls(), 2);
        assert_eq!(transport.requests()[0].access_token(), Some("EAAB-1"));
    }
}
