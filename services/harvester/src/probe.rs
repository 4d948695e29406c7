//! Proxy liveness check for stored proxies

use std::time::Duration;

use graph_client::ProxyPool;
use store::{ProxyStatus, ProxyStore};
use tracing::info;

use crate::error::Result;

/// Liveness of one stored proxy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub proxy_id: String,
    pub address: String,
    pub alive: bool,
}

/// Probe every proxy in `pool` and write the resulting status back to the
/// matching record in `store`.
pub async fn probe_stored_proxies(
    store: &ProxyStore,
    pool: &ProxyPool,
    probe_url: &str,
    timeout: Duration,
) -> Result<Vec<ProbeResult>> {
    let stored = store.list().await;
    let mut results = Vec::new();

    for (address, alive) in pool.probe_all(probe_url, timeout).await {
        let Some(record) = stored.iter().find(|p| p.address() == address) else {
            continue;
        };
        let status = if alive {
            ProxyStatus::Active
        } else {
            ProxyStatus::Disabled
        };
        if record.status != status {
            store.set_status(&record.id, status).await?;
            info!(proxy_id = %record.id, address = %address, alive, "proxy status changed");
        }
        results.push(ProbeResult {
            proxy_id: record.id.clone(),
            address,
            alive,
        });
    }
    Ok(results)
}
