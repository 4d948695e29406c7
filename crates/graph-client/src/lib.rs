//! Rate-limited request core for a graph-style HTTP API
//!
//! Every logical call goes through [`RequestExecutor::execute`], which:
//! 1. Waits on the [`RateLimiter`] (before every attempt, retries included)
//! 2. Resolves the credential (account token, explicit token, or app token)
//! 3. Resolves the proxy (account assignment, else optional [`ProxyPool`])
//! 4. Sends through the [`Transport`] seam
//! 5. Classifies the response: success, rate limited (backoff + retry),
//!    terminal API error, or transport failure (linear backoff + retry)
//!
//! The result is always a [`ResponseEnvelope`]; request-time failures never
//! surface as Rust errors. [`PagingFetcher`] follows `paging.next` cursors on
//! top of the executor and keeps partial results when a page fails.

pub mod classify;
pub mod envelope;
pub mod error;
pub mod executor;
pub mod limiter;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;
pub mod paging;
pub mod proxy_pool;
pub mod request;
pub mod transport;

pub use classify::{RATE_LIMIT_CODE, classify_response, is_rate_limited};
pub use envelope::{ALL_RETRIES_EXHAUSTED, ApiError, ResponseEnvelope};
pub use error::{Error, Result};
pub use executor::{Credential, ExecutorConfig, RequestExecutor};
pub use limiter::RateLimiter;
pub use paging::{Collected, MAX_PAGES, PagingFetcher, next_page_spec};
pub use proxy_pool::{ProxyPool, proxy_url};
pub use request::{Method, RequestSpec};
pub use store::{Proxy, ProxyStatus};
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};
