//! Account record storage
//!
//! Manages a JSON file holding the list of platform accounts. A tokio Mutex
//! serializes writers; reads clone the record out so callers never hold the
//! lock across a network call.

use std::path::PathBuf;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::file::{generate_id, read_json, write_atomic};
use crate::model::{Account, AccountStatus, NewAccount, Proxy};

/// Thread-safe account file manager.
pub struct AccountStore {
    path: PathBuf,
    state: Mutex<Vec<Account>>,
}

impl AccountStore {
    /// Load accounts from the given file path.
    ///
    /// If the file doesn't exist, creates it as `[]`.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let accounts = match read_json::<Vec<Account>>(&path).await? {
            Some(accounts) => {
                info!(path = %path.display(), accounts = accounts.len(), "loaded accounts");
                accounts
            }
            None => {
                info!(path = %path.display(), "account file not found, starting with empty store");
                let accounts = Vec::new();
                write_atomic(&path, &accounts).await?;
                accounts
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(accounts),
        })
    }

    /// Get a clone of a specific account.
    pub async fn get(&self, account_id: &str) -> Option<Account> {
        let state = self.state.lock().await;
        state.iter().find(|a| a.id == account_id).cloned()
    }

    /// Snapshot of all accounts in file order.
    pub async fn list(&self) -> Vec<Account> {
        self.state.lock().await.clone()
    }

    /// Create a new `pending` account and persist it.
    ///
    /// When `use_proxy` is set and `proxies` is non-empty, one active proxy is
    /// assigned at random.
    pub async fn create(&self, new: NewAccount, proxies: &[Proxy]) -> Result<Account> {
        let mut state = self.state.lock().await;

        let mut id = generate_id("acc");
        while state.iter().any(|a| a.id == id) {
            id = generate_id("acc");
        }

        let proxy_id = if new.use_proxy {
            pick_proxy(proxies).map(|p| {
                info!(account_id = %id, proxy = %p.address(), "assigned proxy to account");
                p.id.clone()
            })
        } else {
            None
        };
        if new.use_proxy && proxy_id.is_none() {
            warn!(account_id = %id, "use_proxy requested but no active proxy is available");
        }

        let account = Account {
            id,
            username: new.username,
            email: new.email,
            access_token: new.access_token,
            status: AccountStatus::Pending,
            created_at: Utc::now(),
            last_login: None,
            use_proxy: new.use_proxy,
            proxy_id,
            last_error: None,
            account_info: None,
            extra: new.extra,
        };
        state.push(account.clone());
        write_atomic(&self.path, &*state).await?;

        info!(account_id = %account.id, username = %account.username, "created account");
        Ok(account)
    }

    /// Apply `f` to an account in place and persist.
    pub async fn update<F>(&self, account_id: &str, f: F) -> Result<Account>
    where
        F: FnOnce(&mut Account),
    {
        let mut state = self.state.lock().await;
        let account = state
            .iter_mut()
            .find(|a| a.id == account_id)
            .ok_or_else(|| Error::NotFound(format!("account {account_id}")))?;
        f(account);
        let updated = account.clone();
        write_atomic(&self.path, &*state).await?;
        debug!(account_id, "updated account");
        Ok(updated)
    }

    /// Record a successful verification.
    pub async fn mark_active(&self, account_id: &str, info: serde_json::Value) -> Result<Account> {
        self.update(account_id, |a| {
            a.status = AccountStatus::Active;
            a.last_login = Some(Utc::now());
            a.last_error = None;
            a.account_info = Some(info);
        })
        .await
    }

    /// Record a failed verification.
    pub async fn mark_error(&self, account_id: &str, message: &str) -> Result<Account> {
        self.update(account_id, |a| {
            a.status = AccountStatus::Error;
            a.last_error = Some(message.to_string());
        })
        .await
    }

    /// Remove an account and persist.
    ///
    /// Returns the removed account if it existed.
    pub async fn remove(&self, account_id: &str) -> Result<Option<Account>> {
        let mut state = self.state.lock().await;
        let Some(pos) = state.iter().position(|a| a.id == account_id) else {
            return Ok(None);
        };
        let removed = state.remove(pos);
        write_atomic(&self.path, &*state).await?;
        info!(account_id, "removed account");
        Ok(Some(removed))
    }

    /// Number of stored accounts.
    pub async fn len(&self) -> usize {
        self.state.lock().await.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn pick_proxy(proxies: &[Proxy]) -> Option<&Proxy> {
    use rand::RngExt;
    let active: Vec<&Proxy> = proxies.iter().filter(|p| p.is_active()).collect();
    if active.is_empty() {
        return None;
    }
    let idx = rand::rng().random_range(0..active.len());
    Some(active[idx])
}
