//! Cursor-following fetcher for list endpoints
//!
//! List responses carry `data: [...]` and, when more records exist,
//! `paging.next`: a full URL with the cursor and the original query
//! parameters. Each follow-up call is rebuilt from that URL and sent through
//! the executor like any other call.

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Url;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::envelope::{ApiError, ResponseEnvelope};
use crate::executor::RequestExecutor;
use crate::request::RequestSpec;

/// Maximum number of pages followed in one fetch, guarding against cursor loops.
pub const MAX_PAGES: usize = 10_000;

/// Records gathered by [`PagingFetcher::fetch_all`].
///
/// `error` is set when a page failed; `records` then holds everything
/// collected before the failure.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Collected {
    pub records: Vec<Value>,
    pub pages: usize,
    pub error: Option<ApiError>,
}

impl Collected {
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }
}

pub struct PagingFetcher {
    executor: Arc<RequestExecutor>,
}

impl PagingFetcher {
    pub fn new(executor: Arc<RequestExecutor>) -> Self {
        Self { executor }
    }

    /// Collect up to `limit` records starting from `initial`.
    ///
    /// Stops when `limit` is reached, when a page has no `data` array, no
    /// records or no cursor, or when a call fails. The result never holds
    /// more than `limit` records.
    pub async fn fetch_all(&self, initial: RequestSpec, limit: usize) -> Collected {
        let mut collected = Collected::default();
        if limit == 0 {
            return collected;
        }

        let mut spec = initial;
        loop {
            if collected.pages >= MAX_PAGES {
                warn!(
                    pages = collected.pages,
                    records = collected.records.len(),
                    "page limit reached, stopping"
                );
                break;
            }

            let envelope = self.executor.execute(&spec).await;
            collected.pages += 1;

            if let ResponseEnvelope::Failure(error) = envelope {
                warn!(
                    page = collected.pages,
                    records = collected.records.len(),
                    error = %error,
                    "page fetch failed, keeping partial results"
                );
                collected.error = Some(error);
                break;
            }

            let Some(records) = envelope.records() else {
                debug!(page = collected.pages, "response has no data array");
                break;
            };
            if records.is_empty() {
                debug!(page = collected.pages, "empty page");
                break;
            }
            collected.records.extend(records.iter().cloned());
            debug!(
                page = collected.pages,
                received = records.len(),
                total = collected.records.len(),
                "page fetched"
            );

            if collected.records.len() >= limit {
                break;
            }
            let Some(next) = envelope.next_cursor() else {
                break;
            };
            match next_page_spec(self.executor.base_url(), next, &spec) {
                Some(next_spec) => spec = next_spec,
                None => {
                    warn!("unparseable paging cursor, stopping");
                    break;
                }
            }
        }

        collected.records.truncate(limit);
        info!(
            records = collected.records.len(),
            pages = collected.pages,
            complete = collected.is_complete(),
            "fetch finished"
        );
        collected
    }
}

/// Build the follow-up request for a `paging.next` URL.
///
/// The endpoint becomes relative when the URL lives under `base_url`, and
/// stays absolute otherwise. Parameters are taken from the cursor's query
/// string (decoded); method, account and attempt budget carry over from
/// `previous`.
pub fn next_page_spec(base_url: &str, next: &str, previous: &RequestSpec) -> Option<RequestSpec> {
    let url = Url::parse(next).ok()?;
    let params: BTreeMap<String, String> = url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    let mut bare = url;
    bare.set_query(None);
    bare.set_fragment(None);
    let bare = bare.as_str();

    let base = base_url.trim_end_matches('/');
    let endpoint = match bare.strip_prefix(base) {
        Some(rest) if rest.starts_with('/') => rest.trim_start_matches('/').to_string(),
        _ => bare.to_string(),
    };

    Some(RequestSpec {
        endpoint,
        method: previous.method,
        params,
        account_id: previous.account_id.clone(),
        attempts: previous.attempts,
    })
}
