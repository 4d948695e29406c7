//! Data collection: pages, groups and ad accounts
//!
//! Each collection resolves its targets (by id, or by search), enriches them
//! with details and paged posts, and saves the combined records to
//! `<data_dir>/<type>/<type>[_<identifier>]_<YYYYmmdd_HHMMSS>.json`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use graph_client::{Collected, PagingFetcher, RequestExecutor, RequestSpec};
use serde::Deserialize;
use serde_json::{Value, json};
use store::AccountStore;
use tracing::{info, warn};

use crate::config::CollectionConfig;
use crate::error::{Error, Result};

const PAGE_SEARCH_FIELDS: &str =
    "id,name,category,link,fan_count,verification_status,about,description,website";
const PAGE_DETAIL_FIELDS: &str = "id,name,category,link,fan_count,verification_status,about,\
description,website,location,phone,emails,founded,company_overview,mission,products,hours";
const PAGE_POST_FIELDS: &str = "id,message,created_time,type,permalink_url,shares,\
reactions.summary(true),comments.summary(true)";
const GROUP_SEARCH_FIELDS: &str = "id,name,description,privacy,member_count,owner";
const GROUP_DETAIL_FIELDS: &str =
    "id,name,description,privacy,member_count,owner,cover,updated_time";
const GROUP_POST_FIELDS: &str = "id,message,created_time,type,permalink_url,from,\
reactions.summary(true),comments.summary(true)";
const AD_ACCOUNT_FIELDS: &str =
    "id,name,account_id,account_status,business_name,currency,timezone_name";
const INSIGHT_FIELDS: &str = "account_id,account_name,campaign_id,campaign_name,adset_id,\
adset_name,ad_id,ad_name,impressions,clicks,cpc,cpm,ctr,spend,reach,frequency,actions,\
conversions,cost_per_action_type";

/// Longest identifier kept in an output file name.
const MAX_IDENTIFIER_CHARS: usize = 30;

/// What to collect: a known object id, or a search query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Id(String),
    Query(String),
}

impl Target {
    /// Prefer the id when both are given.
    pub fn from_parts(
        kind: &'static str,
        id: Option<String>,
        query: Option<String>,
    ) -> Result<Self> {
        match (id, query) {
            (Some(id), _) => Ok(Target::Id(id)),
            (None, Some(query)) => Ok(Target::Query(query)),
            (None, None) => Err(Error::MissingTarget(kind)),
        }
    }

    fn identifier(&self) -> &str {
        match self {
            Target::Id(id) => id,
            Target::Query(query) => query,
        }
    }
}

/// A collection task description, as read from a JSON task file.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Task {
    Page {
        #[serde(default)]
        query: Option<String>,
        #[serde(default)]
        page_id: Option<String>,
        #[serde(default = "default_true")]
        include_posts: bool,
    },
    Group {
        #[serde(default)]
        query: Option<String>,
        #[serde(default)]
        group_id: Option<String>,
        #[serde(default = "default_true")]
        include_posts: bool,
        #[serde(default)]
        account_id: Option<String>,
    },
    AdData {
        account_id: String,
        #[serde(default)]
        ad_account_id: Option<String>,
        #[serde(default = "default_true")]
        include_campaigns: bool,
        #[serde(default = "default_true")]
        include_insights: bool,
    },
}

fn default_true() -> bool {
    true
}

/// Collected records and where they were saved.
#[derive(Debug)]
pub struct Collection {
    pub records: Vec<Value>,
    pub path: PathBuf,
}

pub struct Collector {
    executor: Arc<RequestExecutor>,
    fetcher: PagingFetcher,
    accounts: Arc<AccountStore>,
    data_dir: PathBuf,
    search_limit: usize,
    posts_limit: usize,
    date_preset: String,
}

impl Collector {
    pub fn new(
        executor: Arc<RequestExecutor>,
        accounts: Arc<AccountStore>,
        data_dir: PathBuf,
        settings: &CollectionConfig,
    ) -> Self {
        Self {
            fetcher: PagingFetcher::new(executor.clone()),
            executor,
            accounts,
            data_dir,
            search_limit: settings.search_limit,
            posts_limit: settings.posts_limit,
            date_preset: settings.date_preset.clone(),
        }
    }

    /// Collect pages by id or search query, optionally with their posts.
    pub async fn collect_pages(&self, target: Target, include_posts: bool) -> Result<Collection> {
        let pages = match &target {
            Target::Id(id) => vec![self.object(id, PAGE_DETAIL_FIELDS, None).await?],
            Target::Query(query) => {
                let found = self.search(query, "page", PAGE_SEARCH_FIELDS).await?;
                if found.is_empty() {
                    return Err(Error::NothingFound("pages"));
                }
                let mut detailed = Vec::with_capacity(found.len());
                for page in found {
                    detailed.push(self.details_or_summary(page, PAGE_DETAIL_FIELDS, None).await);
                }
                detailed
            }
        };

        let mut records = Vec::with_capacity(pages.len());
        for mut page in pages {
            if include_posts {
                if let Some(id) = object_id(&page) {
                    let spec = RequestSpec::get(format!("{id}/posts"))
                        .param("limit", self.posts_limit)
                        .param("fields", PAGE_POST_FIELDS);
                    let posts = self.fetcher.fetch_all(spec, self.posts_limit).await;
                    attach_posts(&mut page, posts);
                }
            }
            records.push(page);
        }

        let path = save_collected_data(&self.data_dir, "page", &records, Some(target.identifier()))
            .await?;
        Ok(Collection { records, path })
    }

    /// Collect groups by id or search query, optionally with their feed.
    ///
    /// Group reads usually need a member account's credential, hence
    /// `account_id`.
    pub async fn collect_groups(
        &self,
        target: Target,
        include_posts: bool,
        account_id: Option<&str>,
    ) -> Result<Collection> {
        let groups = match &target {
            Target::Id(id) => vec![self.object(id, GROUP_DETAIL_FIELDS, account_id).await?],
            Target::Query(query) => {
                let found = self.search(query, "group", GROUP_SEARCH_FIELDS).await?;
                if found.is_empty() {
                    return Err(Error::NothingFound("groups"));
                }
                let mut detailed = Vec::with_capacity(found.len());
                for group in found {
                    detailed.push(
                        self.details_or_summary(group, GROUP_DETAIL_FIELDS, account_id)
                            .await,
                    );
                }
                detailed
            }
        };

        let mut records = Vec::with_capacity(groups.len());
        for mut group in groups {
            if include_posts {
                if let Some(id) = object_id(&group) {
                    let mut spec = RequestSpec::get(format!("{id}/feed"))
                        .param("limit", self.posts_limit)
                        .param("fields", GROUP_POST_FIELDS);
                    if let Some(account_id) = account_id {
                        spec = spec.account(account_id);
                    }
                    let posts = self.fetcher.fetch_all(spec, self.posts_limit).await;
                    attach_posts(&mut group, posts);
                }
            }
            records.push(group);
        }

        let path =
            save_collected_data(&self.data_dir, "group", &records, Some(target.identifier()))
                .await?;
        Ok(Collection { records, path })
    }

    /// Collect ad accounts with campaigns and account-level insights.
    ///
    /// Requires an account with its own access token. Without
    /// `ad_account_id`, every ad account visible to that token is collected.
    pub async fn collect_ads(
        &self,
        account_id: &str,
        ad_account_id: Option<&str>,
        include_campaigns: bool,
        include_insights: bool,
    ) -> Result<Collection> {
        let account = self
            .accounts
            .get(account_id)
            .await
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;
        if account.access_token.is_none() {
            return Err(Error::MissingToken(account_id.to_string()));
        }

        let ad_accounts = match ad_account_id {
            Some(id) => {
                let act = act_id(id);
                let number = act.trim_start_matches("act_").to_string();
                vec![json!({"id": act, "account_id": number})]
            }
            None => {
                let spec = RequestSpec::get("me/adaccounts")
                    .param("fields", AD_ACCOUNT_FIELDS)
                    .account(account_id);
                let found = self.fetcher.fetch_all(spec, usize::MAX).await;
                if let Some(error) = found.error {
                    if found.records.is_empty() {
                        return Err(Error::Api(error));
                    }
                    warn!(error = %error, "ad account listing incomplete");
                }
                if found.records.is_empty() {
                    return Err(Error::NothingFound("ad accounts"));
                }
                found.records
            }
        };

        let mut records = Vec::with_capacity(ad_accounts.len());
        for ad_account in ad_accounts {
            let Some(act) = object_id(&ad_account).map(act_id) else {
                warn!("ad account without id, skipping");
                continue;
            };
            let mut entry = json!({"account": ad_account});

            if include_campaigns {
                let fields = format!(
                    "id,name,objective,status,created_time,start_time,stop_time,daily_budget,\
lifetime_budget,insights.date_preset({}){{impressions,clicks,cpc,cpm,ctr,spend,reach}}",
                    self.date_preset
                );
                let spec = RequestSpec::get(format!("{act}/campaigns"))
                    .param("fields", fields)
                    .account(account_id);
                let campaigns = self.fetcher.fetch_all(spec, usize::MAX).await;
                if let Some(error) = &campaigns.error {
                    warn!(ad_account = %act, error = %error, "campaign listing incomplete");
                }
                entry["campaigns"] = Value::Array(campaigns.records);
            }

            if include_insights {
                let spec = RequestSpec::get(format!("{act}/insights"))
                    .param("level", "account")
                    .param("date_preset", &self.date_preset)
                    .param("fields", INSIGHT_FIELDS)
                    .account(account_id);
                match self.executor.execute(&spec).await.into_result() {
                    Ok(payload) => {
                        entry["insights"] = payload.get("data").cloned().unwrap_or(Value::Null);
                    }
                    Err(error) => warn!(ad_account = %act, error = %error, "insights unavailable"),
                }
            }
            records.push(entry);
        }

        let identifier = match ad_account_id {
            Some(id) => id.to_string(),
            None => format!("acc_{account_id}"),
        };
        let path =
            save_collected_data(&self.data_dir, "ad_data", &records, Some(&identifier)).await?;
        Ok(Collection { records, path })
    }

    /// Run one task description.
    pub async fn run_task(&self, task: Task) -> Result<Collection> {
        info!(?task, "running collection task");
        match task {
            Task::Page {
                query,
                page_id,
                include_posts,
            } => {
                let target = Target::from_parts("page", page_id, query)?;
                self.collect_pages(target, include_posts).await
            }
            Task::Group {
                query,
                group_id,
                include_posts,
                account_id,
            } => {
                let target = Target::from_parts("group", group_id, query)?;
                self.collect_groups(target, include_posts, account_id.as_deref())
                    .await
            }
            Task::AdData {
                account_id,
                ad_account_id,
                include_campaigns,
                include_insights,
            } => {
                self.collect_ads(
                    &account_id,
                    ad_account_id.as_deref(),
                    include_campaigns,
                    include_insights,
                )
                .await
            }
        }
    }

    async fn search(&self, query: &str, kind: &str, fields: &str) -> Result<Vec<Value>> {
        let spec = RequestSpec::get("search")
            .param("q", query)
            .param("type", kind)
            .param("limit", self.search_limit)
            .param("fields", fields);
        let payload = self
            .executor
            .execute(&spec)
            .await
            .into_result()
            .map_err(Error::Api)?;
        let found = match payload.get("data") {
            Some(Value::Array(items)) => items.clone(),
            _ => Vec::new(),
        };
        info!(query, kind, found = found.len(), "search finished");
        Ok(found)
    }

    async fn object(&self, id: &str, fields: &str, account_id: Option<&str>) -> Result<Value> {
        let mut spec = RequestSpec::get(id).param("fields", fields);
        if let Some(account_id) = account_id {
            spec = spec.account(account_id);
        }
        self.executor
            .execute(&spec)
            .await
            .into_result()
            .map_err(Error::Api)
    }

    /// Full details for a search hit, or the hit itself if the lookup fails.
    async fn details_or_summary(
        &self,
        summary: Value,
        fields: &str,
        account_id: Option<&str>,
    ) -> Value {
        let Some(id) = object_id(&summary) else {
            return summary;
        };
        match self.object(&id, fields, account_id).await {
            Ok(details) => details,
            Err(e) => {
                warn!(id = %id, error = %e, "details unavailable, keeping search result");
                summary
            }
        }
    }
}

fn object_id(record: &Value) -> Option<String> {
    match record.get("id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn act_id(id: impl AsRef<str>) -> String {
    let id = id.as_ref();
    if id.starts_with("act_") {
        id.to_string()
    } else {
        format!("act_{id}")
    }
}

fn attach_posts(record: &mut Value, posts: Collected) {
    if let Some(error) = &posts.error {
        warn!(error = %error, kept = posts.records.len(), "post collection incomplete");
    }
    if let Value::Object(map) = record {
        map.insert("posts".to_string(), Value::Array(posts.records));
    }
}

/// File-name-safe form of an identifier: whitespace and path separators
/// become `_`, truncated to a bounded length.
fn sanitize_identifier(identifier: &str) -> String {
    identifier
        .trim()
        .chars()
        .map(|c| {
            if c.is_whitespace() || c == '/' || c == '\\' {
                '_'
            } else {
                c
            }
        })
        .take(MAX_IDENTIFIER_CHARS)
        .collect()
}

/// Write `data` as pretty JSON under `<data_dir>/<data_type>/` and return
/// the file path.
pub async fn save_collected_data<T: serde::Serialize + ?Sized>(
    data_dir: &Path,
    data_type: &str,
    data: &T,
    identifier: Option<&str>,
) -> Result<PathBuf> {
    let type_dir = data_dir.join(data_type);
    tokio::fs::create_dir_all(&type_dir).await?;

    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
    let file_name = match identifier.map(sanitize_identifier).filter(|s| !s.is_empty()) {
        Some(identifier) => format!("{data_type}_{identifier}_{timestamp}.json"),
        None => format!("{data_type}_{timestamp}.json"),
    };
    let path = type_dir.join(file_name);

    let bytes = serde_json::to_vec_pretty(data)?;
    tokio::fs::write(&path, bytes).await?;
    info!(path = %path.display(), "collected data saved");
    Ok(path)
}
