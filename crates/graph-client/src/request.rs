//! Description of one logical API call

use std::collections::BTreeMap;
use std::fmt;

/// HTTP method. POST sends parameters as a form-encoded body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Method {
    #[default]
    Get,
    Post,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One logical call: endpoint, method, parameters, optional account, and
/// optional attempt budget.
///
/// `endpoint` is relative to the executor's base URL (`me`, `123/posts`)
/// unless it is an absolute `http(s)://` URL, which is used as-is.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct RequestSpec {
    pub endpoint: String,
    pub method: Method,
    pub params: BTreeMap<String, String>,
    pub account_id: Option<String>,
    /// Total attempts including the first. `None` uses the executor default.
    pub attempts: Option<u32>,
}

impl RequestSpec {
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn post(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: Method::Post,
            ..Self::default()
        }
    }

    pub fn param(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.params.insert(key.into(), value.to_string());
        self
    }

    pub fn params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// Route the call through this account's credential and proxy.
    pub fn account(mut self, account_id: impl Into<String>) -> Self {
        self.account_id = Some(account_id.into());
        self
    }

    pub fn attempts(mut self, attempts: u32) -> Self {
        self.attempts = Some(attempts);
        self
    }

    pub fn is_absolute(&self) -> bool {
        self.endpoint.starts_with("http://") || self.endpoint.starts_with("https://")
    }
}

// Parameter values may carry access tokens, so only keys are printed.
impl fmt::Debug for RequestSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestSpec")
            .field("endpoint", &self.endpoint)
            .field("method", &self.method)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .field("account_id", &self.account_id)
            .field("attempts", &self.attempts)
            .finish()
    }
}
