//! Account verification
//!
//! Issues `GET me` with each account's credential and proxy and records the
//! outcome on the account: `active` with the returned profile, or `error`
//! with the failure message.

use std::sync::Arc;
use std::time::Duration;

use graph_client::{RequestExecutor, RequestSpec, ResponseEnvelope};
use rand::RngExt;
use store::{AccountStatus, AccountStore};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

/// Outcome of verifying one account.
#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub account_id: String,
    pub username: String,
    pub status: AccountStatus,
    pub error: Option<String>,
}

pub struct Verifier {
    executor: Arc<RequestExecutor>,
    accounts: Arc<AccountStore>,
    pause_ms: (u64, u64),
}

impl Verifier {
    pub fn new(executor: Arc<RequestExecutor>, accounts: Arc<AccountStore>) -> Self {
        Self {
            executor,
            accounts,
            pause_ms: (1000, 3000),
        }
    }

    /// Bounds of the random pause between accounts in [`Verifier::verify_all`].
    pub fn with_pause(mut self, min_ms: u64, max_ms: u64) -> Self {
        self.pause_ms = (min_ms, max_ms.max(min_ms));
        self
    }

    /// Verify one account and persist the result.
    pub async fn verify(&self, account_id: &str) -> Result<Verification> {
        let account = self
            .accounts
            .get(account_id)
            .await
            .ok_or_else(|| Error::AccountNotFound(account_id.to_string()))?;

        let envelope = self
            .executor
            .execute(&RequestSpec::get("me").account(account_id))
            .await;

        let updated = match envelope {
            ResponseEnvelope::Success(info) => {
                info!(account_id, username = %account.username, "account verified");
                self.accounts.mark_active(account_id, info).await?
            }
            ResponseEnvelope::Failure(error) => {
                warn!(account_id, username = %account.username, error = %error, "account verification failed");
                self.accounts.mark_error(account_id, &error.message).await?
            }
        };

        Ok(Verification {
            account_id: updated.id,
            username: updated.username,
            status: updated.status,
            error: updated.last_error,
        })
    }

    /// Verify every account that is not deleted, pausing between accounts.
    pub async fn verify_all(&self) -> Result<Vec<Verification>> {
        let candidates: Vec<_> = self
            .accounts
            .list()
            .await
            .into_iter()
            .filter(|a| {
                if a.status == AccountStatus::Deleted {
                    debug!(account_id = %a.id, "skipping deleted account");
                    false
                } else {
                    true
                }
            })
            .collect();

        let mut results = Vec::with_capacity(candidates.len());
        for (i, account) in candidates.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.pause()).await;
            }
            results.push(self.verify(&account.id).await?);
        }

        let active = results
            .iter()
            .filter(|r| r.status == AccountStatus::Active)
            .count();
        info!(total = results.len(), active, "verification finished");
        Ok(results)
    }

    fn pause(&self) -> Duration {
        let (min, max) = self.pause_ms;
        if min >= max {
            return Duration::from_millis(min);
        }
        Duration::from_millis(rand::rng().random_range(min..=max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{ScriptedTransport, executor_for};
    use common::Secret;
    use serde_json::json;
    use store::{NewAccount, ProxyStore};

    async fn setup(dir: &tempfile::TempDir) -> (Arc<AccountStore>, Arc<ProxyStore>) {
        let accounts = AccountStore::load(dir.path().join("accounts.json")).await.unwrap();
        let proxies = ProxyStore::load(dir.path().join("proxies.json")).await.unwrap();
        (Arc::new(accounts), Arc::new(proxies))
    }

    async fn add_account(accounts: &AccountStore, name: &str) -> String {
        accounts
            .create(
                NewAccount {
                    username: name.into(),
                    access_token: Some(Secret::new(format!("EAAB-{name}"))),
                    ..NewAccount::default()
                },
                &[],
            )
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn success_marks_account_active() {
        let dir = tempfile::tempdir().unwrap();
        let (accounts, proxies) = setup(&dir).await;
        let id = add_account(&accounts, "alice").await;

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, json!({"id": "100", "name": "Alice"}));
        let executor = executor_for(&transport, accounts.clone(), proxies);

        let result = Verifier::new(executor, accounts.clone()).verify(&id).await.unwrap();
        assert_eq!(result.status, AccountStatus::Active);

        let stored = accounts.get(&id).await.unwrap();
        assert_eq!(stored.status, AccountStatus::Active);
        assert!(stored.last_login.is_some());
        assert_eq!(stored.account_info.unwrap()["name"], "Alice");

        let seen = transport.requests();
        assert!(seen[0].url.ends_with("/me"));
        assert_eq!(seen[0].access_token(), Some("EAAB-alice"));
    }

    #[tokio::test]
    async fn failure_marks_account_error() {
        let dir = tempfile::tempdir().unwrap();
        let (accounts, proxies) = setup(&dir).await;
        let id = add_account(&accounts, "bob").await;

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(
            400,
            json!({"error": {"code": 190, "message": "Error validating access token"}}),
        );
        let executor = executor_for(&transport, accounts.clone(), proxies);

        let result = Verifier::new(executor, accounts.clone()).verify(&id).await.unwrap();
        assert_eq!(result.status, AccountStatus::Error);
        assert_eq!(result.error.as_deref(), Some("Error validating access token"));
        assert_eq!(
            accounts.get(&id).await.unwrap().last_error.as_deref(),
            Some("Error validating access token")
        );
    }

    #[tokio::test]
    async fn unreachable_api_marks_account_error() {
        let dir = tempfile::tempdir().unwrap();
        let (accounts, proxies) = setup(&dir).await;
        let id = add_account(&accounts, "carol").await;

        // Nothing scripted: the transport cannot connect.
        let transport = Arc::new(ScriptedTransport::new());
        let executor = executor_for(&transport, accounts.clone(), proxies);

        let result = Verifier::new(executor, accounts.clone()).verify(&id).await.unwrap();
        assert_eq!(result.status, AccountStatus::Error);
        let message = result.error.unwrap();
        assert!(message.starts_with("connection failed"), "got: {message}");
        assert_eq!(transport.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_account_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (accounts, proxies) = setup(&dir).await;
        let transport = Arc::new(ScriptedTransport::new());
        let executor = executor_for(&transport, accounts.clone(), proxies);

        let err = Verifier::new(executor, accounts).verify("acc_0").await.unwrap_err();
        assert!(matches!(err, Error::AccountNotFound(_)));
        assert_eq!(transport.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn verify_all_skips_deleted_and_pauses_between_accounts() {
        let dir = tempfile::tempdir().unwrap();
        let (accounts, proxies) = setup(&dir).await;
        let first = add_account(&accounts, "one").await;
        let deleted = add_account(&accounts, "gone").await;
        let third = add_account(&accounts, "three").await;
        accounts
            .update(&deleted, |a| a.status = AccountStatus::Deleted)
            .await
            .unwrap();

        let transport = Arc::new(ScriptedTransport::new());
        transport.push_json(200, json!({"id": "1"}));
        transport.push_json(200, json!({"id": "3"}));
        let executor = executor_for(&transport, accounts.clone(), proxies);

        let start = tokio::time::Instant::now();
        let results = Verifier::new(executor, accounts.clone())
            .with_pause(2000, 2000)
            .verify_all()
            .await
            .unwrap();

        let ids: Vec<&str> = results.iter().map(|r| r.account_id.as_str()).collect();
        assert_eq!(ids, vec![first.as_str(), third.as_str()]);
        assert_eq!(transport.calls(), 2);
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(
            accounts.get(&deleted).await.unwrap().status,
            AccountStatus::Deleted
        );
    }
}
