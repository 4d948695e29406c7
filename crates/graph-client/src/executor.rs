//! Request executor: throttling, credential and proxy injection, retries
//!
//! Retry strategy:
//! - Rate-limited API error: sleep `min(step * (attempt + 1), cap)` and retry;
//!   the sleep also follows the final attempt
//! - Transport failure or unreadable body: sleep `base * (attempt + 1)` and retry
//! - Any other API error: returned immediately
//!
//! Every attempt re-runs the whole pipeline, including the rate limiter and
//! credential/proxy resolution. Retries therefore count against the rate
//! window like first attempts do.

use std::sync::Arc;
use std::time::Duration;

use common::Secret;
use reqwest::Url;
use store::{Account, AccountStore, ProxyStore};
use tracing::{debug, instrument, warn};

use crate::classify::{Classification, classify_response};
use crate::envelope::{ALL_RETRIES_EXHAUSTED, ApiError, ResponseEnvelope};
use crate::error::{Error, Result};
use crate::limiter::RateLimiter;
use crate::proxy_pool::{ProxyPool, proxy_url};
use crate::request::RequestSpec;
use crate::transport::{HttpRequest, Transport};

/// Name of the parameter carrying the credential.
const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Settings consumed by the executor.
#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Versioned API root, e.g. `https://graph.example.com/v18.0`.
    pub base_url: String,
    pub timeout: Duration,
    /// Total attempts per call when the request does not set its own.
    pub max_attempts: u32,
    /// Linear backoff step for transport failures.
    pub retry_delay: Duration,
    /// Linear backoff step for rate-limit responses.
    pub rate_limit_backoff: Duration,
    /// Upper bound on a single rate-limit backoff.
    pub rate_limit_backoff_cap: Duration,
    pub app_id: String,
    pub app_secret: Secret<String>,
}

impl ExecutorConfig {
    /// Config with the default timing: 30s timeout, 3 attempts, 5s transport
    /// backoff, 60s rate-limit backoff capped at 300s.
    pub fn new(
        base_url: impl Into<String>,
        app_id: impl Into<String>,
        app_secret: Secret<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: Duration::from_secs(30),
            max_attempts: 3,
            retry_delay: Duration::from_secs(5),
            rate_limit_backoff: Duration::from_secs(60),
            rate_limit_backoff_cap: Duration::from_secs(300),
            app_id: app_id.into(),
            app_secret,
        }
    }

    fn validate(&self) -> Result<()> {
        let url = Url::parse(&self.base_url)
            .map_err(|e| Error::InvalidConfig(format!("base_url {:?}: {e}", self.base_url)))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(Error::InvalidConfig(format!(
                "base_url must be http or https, got {:?}",
                self.base_url
            )));
        }
        if self.timeout.is_zero() {
            return Err(Error::InvalidConfig("timeout must be greater than 0".into()));
        }
        if self.max_attempts == 0 {
            return Err(Error::InvalidConfig("max_attempts must be greater than 0".into()));
        }
        Ok(())
    }

    /// The application-level credential, `app_id|app_secret`.
    fn app_token(&self) -> Secret<String> {
        Secret::new(format!("{}|{}", self.app_id, self.app_secret.expose()))
    }
}

/// Where the credential of an attempt came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential {
    /// The referenced account's own token.
    Account,
    /// An `access_token` parameter set on the request.
    Explicit,
    /// The application credential.
    App,
}

impl Credential {
    pub fn label(&self) -> &'static str {
        match self {
            Credential::Account => "account",
            Credential::Explicit => "explicit",
            Credential::App => "app",
        }
    }
}

/// Sends logical calls and always answers with a [`ResponseEnvelope`].
pub struct RequestExecutor {
    config: ExecutorConfig,
    limiter: Arc<RateLimiter>,
    transport: Arc<dyn Transport>,
    accounts: Option<Arc<AccountStore>>,
    proxies: Option<Arc<ProxyStore>>,
    pool: Option<(Arc<ProxyPool>, bool)>,
}

impl RequestExecutor {
    /// Build an executor. Fails on an unusable base URL, zero timeout or a
    /// zero attempt budget.
    pub fn new(
        config: ExecutorConfig,
        limiter: Arc<RateLimiter>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            limiter,
            transport,
            accounts: None,
            proxies: None,
            pool: None,
        })
    }

    /// Resolve account credentials and proxy assignments from these stores.
    pub fn with_accounts(mut self, accounts: Arc<AccountStore>, proxies: Arc<ProxyStore>) -> Self {
        self.accounts = Some(accounts);
        self.proxies = Some(proxies);
        self
    }

    /// Draw a proxy from `pool` for calls with no account-assigned proxy.
    pub fn with_proxy_pool(mut self, pool: Arc<ProxyPool>, rotation: bool) -> Self {
        self.pool = Some((pool, rotation));
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    pub fn limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    /// Run one logical call to completion.
    #[instrument(skip_all, fields(
        endpoint = %spec.endpoint,
        method = %spec.method,
        account_id = spec.account_id.as_deref().unwrap_or("-"),
    ))]
    pub async fn execute(&self, spec: &RequestSpec) -> ResponseEnvelope {
        let attempts = spec.attempts.unwrap_or(self.config.max_attempts).max(1);
        let url = self.url_for(&spec.endpoint);
        let mut last_rate_limit: Option<ApiError> = None;

        for attempt in 0..attempts {
            let waited = self.limiter.throttle().await;
            if !waited.is_zero() {
                debug!(wait_ms = waited.as_millis() as u64, "throttled by rate limiter");
            }

            let account = self.lookup_account(spec).await;
            let (credential, token) = self.resolve_credential(spec, account.as_ref());
            let proxy = self.resolve_proxy(account.as_ref()).await;

            let mut params: Vec<(String, String)> = spec
                .params
                .iter()
                .filter(|(k, _)| k.as_str() != ACCESS_TOKEN_PARAM)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            params.push((ACCESS_TOKEN_PARAM.to_string(), token.expose().clone()));

            let request = HttpRequest {
                method: spec.method,
                url: url.clone(),
                params,
                proxy,
                timeout: self.config.timeout,
            };
            debug!(
                attempt = attempt + 1,
                attempts,
                credential = credential.label(),
                proxied = request.proxy.is_some(),
                "sending request"
            );

            let is_last = attempt + 1 == attempts;
            let failure = match self.transport.send(&request).await {
                Ok(response) => match classify_response(response.status, &response.body) {
                    Classification::Success(payload) => {
                        debug!(attempt = attempt + 1, "request succeeded");
                        return ResponseEnvelope::Success(payload);
                    }
                    Classification::Terminal(error) => {
                        warn!(error = %error, "request failed");
                        return ResponseEnvelope::Failure(error);
                    }
                    Classification::RateLimited(error) => {
                        // Sleeps after the final attempt too.
                        let delay = self.rate_limit_delay(attempt);
                        warn!(
                            error = %error,
                            attempt = attempt + 1,
                            backoff_secs = delay.as_secs(),
                            "rate limited, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        last_rate_limit = Some(error);
                        continue;
                    }
                    Classification::Malformed(message) => message,
                },
                Err(e) => e.to_string(),
            };

            if is_last {
                warn!(error = %failure, attempts, "request failed after all attempts");
                return ResponseEnvelope::Failure(ApiError::new(failure));
            }
            let delay = self.retry_delay(attempt);
            warn!(
                error = %failure,
                attempt = attempt + 1,
                backoff_secs = delay.as_secs(),
                "request failed, retrying"
            );
            tokio::time::sleep(delay).await;
        }

        warn!(attempts, "rate limited on every attempt");
        let mut error = ApiError::new(ALL_RETRIES_EXHAUSTED);
        if let Some(last) = last_rate_limit {
            error.code = last.code;
            error.http_status = last.http_status;
        }
        ResponseEnvelope::Failure(error)
    }

    fn url_for(&self, endpoint: &str) -> String {
        if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            return endpoint.to_string();
        }
        format!(
            "{}/{}",
            self.config.base_url.trim_end_matches('/'),
            endpoint.trim_start_matches('/')
        )
    }

    async fn lookup_account(&self, spec: &RequestSpec) -> Option<Account> {
        let account_id = spec.account_id.as_deref()?;
        let Some(accounts) = &self.accounts else {
            warn!(account_id, "account referenced but no account store configured");
            return None;
        };
        let account = accounts.get(account_id).await;
        if account.is_none() {
            warn!(account_id, "account not found, using fallback credential");
        }
        account
    }

    fn resolve_credential(
        &self,
        spec: &RequestSpec,
        account: Option<&Account>,
    ) -> (Credential, Secret<String>) {
        if let Some(token) = account.and_then(|a| a.access_token.as_ref()) {
            return (Credential::Account, token.clone());
        }
        if let Some(token) = spec.params.get(ACCESS_TOKEN_PARAM) {
            return (Credential::Explicit, Secret::new(token.clone()));
        }
        (Credential::App, self.config.app_token())
    }

    async fn resolve_proxy(&self, account: Option<&Account>) -> Option<Secret<String>> {
        if let Some(proxy_id) = account.and_then(Account::assigned_proxy) {
            match self.lookup_proxy(proxy_id).await {
                Some(proxy) if proxy.is_active() => match proxy_url(&proxy) {
                    Ok(url) => return Some(url),
                    Err(e) => warn!(proxy_id, error = %e, "unusable account proxy"),
                },
                Some(_) => warn!(proxy_id, "account proxy is disabled"),
                None => warn!(proxy_id, "account proxy not found"),
            }
        }

        let (pool, rotation) = self.pool.as_ref()?;
        let proxy = pool.select(*rotation).await?;
        match proxy_url(&proxy) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(address = %proxy.address(), error = %e, "unusable pool proxy");
                None
            }
        }
    }

    async fn lookup_proxy(&self, proxy_id: &str) -> Option<store::Proxy> {
        match &self.proxies {
            Some(proxies) => proxies.get(proxy_id).await,
            None => None,
        }
    }

    fn rate_limit_delay(&self, attempt: u32) -> Duration {
        self.config
            .rate_limit_backoff
            .saturating_mul(attempt + 1)
            .min(self.config.rate_limit_backoff_cap)
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        self.config.retry_delay.saturating_mul(attempt + 1)
    }
}
