//! HTTP transport seam
//!
//! The executor never talks to reqwest directly; it hands a fully resolved
//! [`HttpRequest`] to a [`Transport`]. Production uses [`ReqwestTransport`];
//! tests substitute a scripted in-memory transport.
//!
//! Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
//! (`Arc<dyn Transport>`).

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Duration;

use common::Secret;
use tracing::debug;

use crate::error::{Error, Result};
use crate::request::Method;

/// A resolved request: absolute URL, final parameters (credential
/// included), proxy URL and timeout.
pub struct HttpRequest {
    pub method: Method,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub proxy: Option<Secret<String>>,
    pub timeout: Duration,
}

impl fmt::Debug for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpRequest")
            .field("method", &self.method)
            .field("url", &self.url)
            .field(
                "params",
                &self.params.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            )
            .field("proxy", &self.proxy)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Status and raw body of a received response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// Failure to obtain any response at all.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

impl From<reqwest::Error> for TransportError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            TransportError::Timeout(e.to_string())
        } else if e.is_connect() {
            TransportError::Connect(e.to_string())
        } else {
            TransportError::Other(e.to_string())
        }
    }
}

/// Sends one HTTP request and returns whatever status came back.
pub trait Transport: Send + Sync {
    fn send<'a>(
        &'a self,
        request: &'a HttpRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<HttpResponse, TransportError>> + Send + 'a>>;
}

/// reqwest-backed transport.
///
/// Proxy routing is configured per `reqwest::Client`, so one client is built
/// lazily per distinct proxy URL and reused afterwards.
pub struct ReqwestTransport {
    direct: reqwest::Client,
    proxied: Mutex<HashMap<String, reqwest::Client>>,
}

impl ReqwestTransport {
    pub fn new() -> Result<Self> {
        let direct = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Client(e.to_string()))?;
        Ok(Self {
            direct,
            proxied: Mutex::new(HashMap::new()),
        })
    }

    fn client_for(&self, proxy: Option<&Secret<String>>) -> std::result::Result<reqwest::Client, TransportError> {
        let Some(proxy) = proxy else {
            return Ok(self.direct.clone());
        };
        let mut clients = self
            .proxied
            .lock()
            .map_err(|_| TransportError::Other("proxy client cache poisoned".into()))?;
        if let Some(client) = clients.get(proxy.expose()) {
            return Ok(client.clone());
        }
        let proxy_cfg = reqwest::Proxy::all(proxy.expose().as_str())
            .map_err(|e| TransportError::Other(format!("invalid proxy URL: {e}")))?;
        let client = reqwest::Client::builder()
            .proxy(proxy_cfg)
            .build()
            .map_err(|e| TransportError::Other(format!("building proxied client: {e}")))?;
        debug!("built client for new proxy");
        clients.insert(proxy.expose().clone(), client.clone());
        Ok(client)
    }
}

impl Transport for ReqwestTransport {
    fn send<'a>(
        &'a self,
        request: &'a HttpRequest,
    ) -> Pin<Box<dyn Future<Output = std::result::Result<HttpResponse, TransportError>> + Send + 'a>> {
        Box::pin(async move {
            let client = self.client_for(request.proxy.as_ref())?;
            let builder = match request.method {
                Method::Get => client.get(&request.url).query(&request.params),
                Method::Post => client.post(&request.url).form(&request.params),
            };
            let response = builder.timeout(request.timeout).send().await?;
            let status = response.status().as_u16();
            let body = response.text().await?;
            Ok(HttpResponse { status, body })
        })
    }
}
