//! Configuration types and loading
//!
//! Settings come from the TOML file, with serde defaults for anything it
//! leaves out. The file path is `--config`, else `CONFIG_PATH`, else
//! `graph-harvester.toml`. The app secret is never read from the TOML body:
//! GRAPH_APP_SECRET wins over the file named by `api.app_secret_file`.

use common::Secret;
use graph_client::ExecutorConfig;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Env var holding the application secret.
pub const APP_SECRET_ENV: &str = "GRAPH_APP_SECRET";

/// Root configuration
#[derive(Debug, Deserialize)]
pub struct Config {
    pub api: ApiConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default)]
    pub proxy: ProxyConfig,
    #[serde(default)]
    pub collection: CollectionConfig,
}

/// Remote API settings
#[derive(Debug, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_api_version")]
    pub api_version: String,
    pub app_id: String,
    #[serde(skip, default = "empty_secret")]
    pub app_secret: Secret<String>,
    /// Path to a file containing the app secret (alternative to GRAPH_APP_SECRET)
    #[serde(default)]
    pub app_secret_file: Option<PathBuf>,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    /// Total attempts per call, first attempt included.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,
}

/// Sliding-window request budget
#[derive(Debug, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_calls")]
    pub max_calls: usize,
    #[serde(default = "default_period")]
    pub period_secs: u64,
}

/// Record files and output directory
#[derive(Debug, Deserialize)]
pub struct FilesConfig {
    #[serde(default = "default_accounts_file")]
    pub accounts_file: PathBuf,
    #[serde(default = "default_proxies_file")]
    pub proxies_file: PathBuf,
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,
}

/// Proxy selection and probing
#[derive(Debug, Deserialize)]
pub struct ProxyConfig {
    /// Draw a pool proxy for calls whose account has no proxy of its own.
    #[serde(default)]
    pub use_pool: bool,
    /// Round-robin when true, uniform random otherwise.
    #[serde(default = "default_true")]
    pub rotation: bool,
    #[serde(default = "default_probe_url")]
    pub probe_url: String,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_secs: u64,
}

/// Collection defaults
#[derive(Debug, Deserialize)]
pub struct CollectionConfig {
    #[serde(default = "default_search_limit")]
    pub search_limit: usize,
    #[serde(default = "default_posts_limit")]
    pub posts_limit: usize,
    #[serde(default = "default_date_preset")]
    pub date_preset: String,
    /// Bounds of the random pause between account verifications.
    #[serde(default = "default_verify_pause_min")]
    pub verify_pause_min_ms: u64,
    #[serde(default = "default_verify_pause_max")]
    pub verify_pause_max_ms: u64,
}

fn default_base_url() -> String {
    "https://graph.facebook.com".to_string()
}

fn default_api_version() -> String {
    "v18.0".to_string()
}

fn empty_secret() -> Secret<String> {
    Secret::new(String::new())
}

fn default_timeout() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    5
}

fn default_max_calls() -> usize {
    100
}

fn default_period() -> u64 {
    60
}

fn default_accounts_file() -> PathBuf {
    PathBuf::from("accounts.json")
}

fn default_proxies_file() -> PathBuf {
    PathBuf::from("proxies.json")
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_true() -> bool {
    true
}

fn default_probe_url() -> String {
    "https://www.google.com".to_string()
}

fn default_probe_timeout() -> u64 {
    10
}

fn default_search_limit() -> usize {
    10
}

fn default_posts_limit() -> usize {
    25
}

fn default_date_preset() -> String {
    "last_30days".to_string()
}

fn default_verify_pause_min() -> u64 {
    1000
}

fn default_verify_pause_max() -> u64 {
    3000
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            period_secs: default_period(),
        }
    }
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            accounts_file: default_accounts_file(),
            proxies_file: default_proxies_file(),
            data_dir: default_data_dir(),
        }
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            use_pool: false,
            rotation: true,
            probe_url: default_probe_url(),
            probe_timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            search_limit: default_search_limit(),
            posts_limit: default_posts_limit(),
            date_preset: default_date_preset(),
            verify_pause_min_ms: default_verify_pause_min(),
            verify_pause_max_ms: default_verify_pause_max(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, then overlay environment variables.
    ///
    /// App secret resolution order:
    /// 1. GRAPH_APP_SECRET env var
    /// 2. app_secret_file path from config
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(secret) = std::env::var(APP_SECRET_ENV) {
            config.api.app_secret = Secret::new(secret);
        } else if let Some(ref secret_file) = config.api.app_secret_file {
            let secret = std::fs::read_to_string(secret_file).map_err(|e| {
                common::Error::Config(format!(
                    "failed to read app_secret_file {}: {e}",
                    secret_file.display()
                ))
            })?;
            config.api.app_secret = Secret::new(secret.trim().to_owned());
        }

        if config.api.app_secret.expose().is_empty() {
            return Err(common::Error::MissingSecret(format!(
                "set {APP_SECRET_ENV} or api.app_secret_file"
            )));
        }

        Ok(config)
    }

    fn validate(&self) -> common::Result<()> {
        if !self.api.base_url.starts_with("http://") && !self.api.base_url.starts_with("https://")
        {
            return Err(common::Error::Config(format!(
                "base_url must start with http:// or https://, got: {}",
                self.api.base_url
            )));
        }
        if self.api.app_id.trim().is_empty() {
            return Err(common::Error::Config("app_id must not be empty".into()));
        }
        if self.api.timeout_secs == 0 {
            return Err(common::Error::Config(
                "timeout_secs must be greater than 0".into(),
            ));
        }
        if self.api.max_retries == 0 {
            return Err(common::Error::Config(
                "max_retries must be greater than 0".into(),
            ));
        }
        if self.rate_limit.max_calls == 0 {
            return Err(common::Error::Config(
                "rate_limit.max_calls must be greater than 0".into(),
            ));
        }
        if self.rate_limit.period_secs == 0 {
            return Err(common::Error::Config(
                "rate_limit.period_secs must be greater than 0".into(),
            ));
        }
        if self.collection.verify_pause_min_ms > self.collection.verify_pause_max_ms {
            return Err(common::Error::Config(
                "verify_pause_min_ms must not exceed verify_pause_max_ms".into(),
            ));
        }
        Ok(())
    }

    /// Versioned API root, e.g. `https://graph.facebook.com/v18.0`.
    pub fn api_root(&self) -> String {
        let base = self.api.base_url.trim_end_matches('/');
        let version = self.api.api_version.trim_matches('/');
        if version.is_empty() {
            base.to_string()
        } else {
            format!("{base}/{version}")
        }
    }

    /// Settings for the request executor.
    pub fn executor_config(&self) -> ExecutorConfig {
        let mut exec = ExecutorConfig::new(
            self.api_root(),
            self.api.app_id.clone(),
            self.api.app_secret.clone(),
        );
        exec.timeout = Duration::from_secs(self.api.timeout_secs);
        exec.max_attempts = self.api.max_retries;
        exec.retry_delay = Duration::from_secs(self.api.retry_delay_secs);
        exec
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&Path>) -> PathBuf {
        if let Some(p) = cli_path {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("graph-harvester.toml")
    }
}
