//! Test helpers: an executor wired to the shared scripted transport

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use graph_client::{ExecutorConfig, RateLimiter, RequestExecutor};
use store::{AccountStore, ProxyStore};

pub use graph_client::mock::ScriptedTransport;

pub const TEST_BASE: &str = "https://graph.example.com/v18.0";

/// Executor with a single attempt per call and an effectively unlimited
/// rate window.
pub fn executor_for(
    transport: &Arc<ScriptedTransport>,
    accounts: Arc<AccountStore>,
    proxies: Arc<ProxyStore>,
) -> Arc<RequestExecutor> {
    let mut config = ExecutorConfig::new(TEST_BASE, "app", Secret::new("shh".to_string()));
    config.max_attempts = 1;
    config.retry_delay = Duration::from_millis(1);
    let limiter = Arc::new(RateLimiter::new(10_000, Duration::from_secs(1)).unwrap());
    let executor = RequestExecutor::new(config, limiter, transport.clone())
        .unwrap()
        .with_accounts(accounts, proxies);
    Arc::new(executor)
}
