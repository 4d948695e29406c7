//! Account and proxy records
//!
//! Both records are persisted as JSON objects. Field names follow the files
//! written by earlier versions of the tool (`ip` for the proxy host, string
//! ports, `error` for the last verification failure) so existing data files
//! keep loading. Timestamps are written as RFC 3339; the older
//! `YYYY-mm-dd HH:MM:SS` form is still accepted on load and read as UTC.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, Utc};
use common::Secret;
use serde::{Deserialize, Deserializer, Serialize};

/// Lifecycle state of a platform account.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountStatus {
    #[default]
    Pending,
    Active,
    Error,
    Deleted,
}

impl AccountStatus {
    /// Status label for logging and tables.
    pub fn label(&self) -> &'static str {
        match self {
            AccountStatus::Pending => "pending",
            AccountStatus::Active => "active",
            AccountStatus::Error => "error",
            AccountStatus::Deleted => "deleted",
        }
    }
}

/// A platform account and the credential it authorizes calls with.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Account-scoped access token. When absent the app credential is used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<Secret<String>>,
    #[serde(default)]
    pub status: AccountStatus,
    #[serde(deserialize_with = "timestamp")]
    pub created_at: DateTime<Utc>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub last_login: Option<DateTime<Utc>>,
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default)]
    pub proxy_id: Option<String>,
    /// Message from the last failed verification.
    #[serde(default, rename = "error", skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Profile payload returned by the last successful verification.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_info: Option<serde_json::Value>,
    /// Caller-supplied attributes with no dedicated field.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

impl Account {
    /// The proxy id to route this account's calls through, if any.
    pub fn assigned_proxy(&self) -> Option<&str> {
        if self.use_proxy {
            self.proxy_id.as_deref()
        } else {
            None
        }
    }
}

/// Input for [`crate::AccountStore::create`].
#[derive(Debug, Default)]
pub struct NewAccount {
    pub username: String,
    pub email: Option<String>,
    pub access_token: Option<Secret<String>>,
    pub use_proxy: bool,
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// Whether a proxy may be handed out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProxyStatus {
    #[default]
    Active,
    Disabled,
}

/// A forward proxy endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proxy {
    #[serde(default)]
    pub id: String,
    #[serde(alias = "ip")]
    pub host: String,
    #[serde(deserialize_with = "port_from_str_or_int")]
    pub port: u16,
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default)]
    pub status: ProxyStatus,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub added_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "optional_timestamp")]
    pub last_used: Option<DateTime<Utc>>,
    #[serde(default)]
    pub usage_count: u64,
}

impl Proxy {
    /// An active http proxy with no credentials and no id.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            id: String::new(),
            host: host.into(),
            port,
            scheme: default_scheme(),
            username: None,
            password: None,
            location: None,
            status: ProxyStatus::Active,
            added_at: None,
            last_used: None,
            usage_count: 0,
        }
    }

    /// Attach basic-auth credentials.
    pub fn with_auth(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self.password = Some(Secret::new(password.into()));
        self
    }

    /// Canonical address used for duplicate detection: `scheme://host:port`,
    /// lowercased, never including credentials.
    pub fn address(&self) -> String {
        format!(
            "{}://{}:{}",
            self.scheme.to_ascii_lowercase(),
            self.host.to_ascii_lowercase(),
            self.port
        )
    }

    pub fn is_active(&self) -> bool {
        self.status == ProxyStatus::Active
    }
}

/// Input for [`crate::ProxyStore::add`].
#[derive(Debug, Default)]
pub struct NewProxy {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<Secret<String>>,
    pub location: Option<String>,
}

fn default_scheme() -> String {
    "http".to_string()
}

fn port_from_str_or_int<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u16, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Port {
        Int(u16),
        Str(String),
    }

    match Port::deserialize(deserializer)? {
        Port::Int(p) => Ok(p),
        Port::Str(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Timestamp layout of records written before RFC 3339 was used.
const LEGACY_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, String> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, LEGACY_TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .map_err(|e| format!("invalid timestamp {raw:?}: {e}"))
}

fn timestamp<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

fn optional_timestamp<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<DateTime<Utc>>, D::Error> {
    match Option::<String>::deserialize(deserializer)? {
        Some(raw) if !raw.trim().is_empty() => parse_timestamp(&raw)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proxy_accepts_legacy_ip_and_string_port() {
        let json = r#"{"id":"proxy_1","ip":"10.0.0.1","port":"8080","username":"u","password":"p"}"#;
        let proxy: Proxy = serde_json::from_str(json).unwrap();
        assert_eq!(proxy.host, "10.0.0.1");
        assert_eq!(proxy.port, 8080);
        assert_eq!(proxy.scheme, "http");
        assert_eq!(proxy.status, ProxyStatus::Active);
        assert_eq!(proxy.password.as_ref().unwrap().expose(), "p");
    }

    #[test]
    fn proxy_rejects_non_numeric_port() {
        let json = r#"{"ip":"10.0.0.1","port":"http"}"#;
        assert!(serde_json::from_str::<Proxy>(json).is_err());
    }

    #[test]
    fn proxy_address_is_canonical_and_credential_free() {
        let proxy = Proxy::new("Proxy.Example.COM", 3128).with_auth("user", "secret");
        assert_eq!(proxy.address(), "http://proxy.example.com:3128");
    }

    #[test]
    fn account_extra_attributes_round_trip_flattened() {
        let json = r#"{
            "id": "acc_1",
            "username": "collector",
            "status": "active",
            "created_at": "2024-01-01T00:00:00Z",
            "use_proxy": true,
            "proxy_id": "proxy_9",
            "error": "token expired",
            "team": "research"
        }"#;
        let account: Account = serde_json::from_str(json).unwrap();
        assert_eq!(account.status, AccountStatus::Active);
        assert_eq!(account.last_error.as_deref(), Some("token expired"));
        assert_eq!(account.extra["team"], "research");
        assert_eq!(account.assigned_proxy(), Some("proxy_9"));

        let back = serde_json::to_value(&account).unwrap();
        assert_eq!(back["team"], "research");
        assert_eq!(back["error"], "token expired");
    }

    #[test]
    fn assigned_proxy_requires_use_proxy_flag() {
        let json = r#"{"id":"a","username":"u","created_at":"2024-01-01T00:00:00Z",
                       "use_proxy":false,"proxy_id":"proxy_1"}"#;
        let account: Account = serde_json::from_str(json).unwrap();
        assert_eq!(account.assigned_proxy(), None);
    }

    #[test]
    fn legacy_timestamps_are_read_as_utc() {
        let json = r#"{"id":"a","username":"u","created_at":"2024-01-01 12:00:00",
                       "last_login":"2024-02-03 04:05:06"}"#;
        let account: Account = serde_json::from_str(json).unwrap();
        assert_eq!(account.created_at.to_rfc3339(), "2024-01-01T12:00:00+00:00");
        assert_eq!(
            account.last_login.unwrap().to_rfc3339(),
            "2024-02-03T04:05:06+00:00"
        );
    }

    #[test]
    fn rfc3339_offsets_are_normalized_to_utc() {
        let json = r#"{"ip":"10.0.0.1","port":8080,"added_at":"2024-01-01T14:00:00+02:00","last_used":null}"#;
        let proxy: Proxy = serde_json::from_str(json).unwrap();
        assert_eq!(proxy.added_at.unwrap().to_rfc3339(), "2024-01-01T12:00:00+00:00");
        assert!(proxy.last_used.is_none());
    }

    #[test]
    fn garbage_timestamp_is_rejected() {
        let json = r#"{"id":"a","username":"u","created_at":"yesterday"}"#;
        let err = serde_json::from_str::<Account>(json).unwrap_err();
        assert!(err.to_string().contains("invalid timestamp"), "got: {err}");
    }

    #[test]
    fn status_labels() {
        assert_eq!(AccountStatus::Pending.label(), "pending");
        assert_eq!(AccountStatus::Deleted.label(), "deleted");
        assert_eq!(
            serde_json::to_string(&AccountStatus::Error).unwrap(),
            "\"error\""
        );
    }
}
