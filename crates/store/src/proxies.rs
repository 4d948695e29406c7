//! Proxy record storage
//!
//! The proxy file is either a bare JSON array or `{"proxies": [...]}`; both
//! load, and writes always produce the bare array.

use std::path::PathBuf;

use chrono::Utc;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::{Error, Result};
use crate::file::{generate_id, read_json, write_atomic};
use crate::model::{NewProxy, Proxy, ProxyStatus};

#[derive(Deserialize)]
#[serde(untagged)]
enum ProxyFile {
    List(Vec<Proxy>),
    Wrapped { proxies: Vec<Proxy> },
}

/// Thread-safe proxy file manager.
pub struct ProxyStore {
    path: PathBuf,
    state: Mutex<Vec<Proxy>>,
}

impl ProxyStore {
    /// Load proxies from the given file path, creating `[]` if absent.
    pub async fn load(path: PathBuf) -> Result<Self> {
        let proxies = match read_json::<ProxyFile>(&path).await? {
            Some(ProxyFile::List(p)) | Some(ProxyFile::Wrapped { proxies: p }) => {
                info!(path = %path.display(), proxies = p.len(), "loaded proxies");
                p
            }
            None => {
                info!(path = %path.display(), "proxy file not found, starting with empty store");
                let proxies = Vec::new();
                write_atomic(&path, &proxies).await?;
                proxies
            }
        };

        Ok(Self {
            path,
            state: Mutex::new(proxies),
        })
    }

    /// Current proxy records in file order.
    pub async fn list(&self) -> Vec<Proxy> {
        self.state.lock().await.clone()
    }

    /// Get a clone of a specific proxy.
    pub async fn get(&self, proxy_id: &str) -> Option<Proxy> {
        let state = self.state.lock().await;
        state.iter().find(|p| p.id == proxy_id).cloned()
    }

    /// Add a proxy and persist. Rejects an address that is already stored.
    pub async fn add(&self, new: NewProxy) -> Result<Proxy> {
        let mut state = self.state.lock().await;

        let mut proxy = Proxy::new(new.host, new.port);
        proxy.username = new.username;
        proxy.password = new.password;
        proxy.location = new.location;
        proxy.added_at = Some(Utc::now());

        let address = proxy.address();
        if state.iter().any(|p| p.address() == address) {
            return Err(Error::Duplicate(format!("proxy {address}")));
        }

        let mut id = generate_id("proxy");
        while state.iter().any(|p| p.id == id) {
            id = generate_id("proxy");
        }
        proxy.id = id;

        state.push(proxy.clone());
        write_atomic(&self.path, &*state).await?;
        info!(proxy_id = %proxy.id, address = %address, "added proxy");
        Ok(proxy)
    }

    /// Enable or disable a proxy and persist.
    pub async fn set_status(&self, proxy_id: &str, status: ProxyStatus) -> Result<()> {
        let mut state = self.state.lock().await;
        let proxy = state
            .iter_mut()
            .find(|p| p.id == proxy_id)
            .ok_or_else(|| Error::NotFound(format!("proxy {proxy_id}")))?;
        proxy.status = status;
        write_atomic(&self.path, &*state).await
    }

    /// Remove a proxy and persist. Returns the removed proxy if it existed.
    pub async fn remove(&self, proxy_id: &str) -> Result<Option<Proxy>> {
        let mut state = self.state.lock().await;
        let Some(pos) = state.iter().position(|p| p.id == proxy_id) else {
            return Ok(None);
        };
        let removed = state.remove(pos);
        write_atomic(&self.path, &*state).await?;
        info!(proxy_id, "removed proxy");
        Ok(Some(removed))
    }
}
