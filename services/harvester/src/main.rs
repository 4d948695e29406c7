//! Graph Harvester
//!
//! Command-line collector that:
//! 1. Manages platform accounts and forward proxies (JSON record files)
//! 2. Verifies accounts against the API
//! 3. Collects pages, groups and ad data through a rate-limited, retrying
//!    request core
//! 4. Saves collected records as timestamped JSON files

mod cli;
mod collector;
mod config;
mod error;
mod probe;
#[cfg(test)]
mod testing;
mod verify;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use common::Secret;
use graph_client::{ProxyPool, RateLimiter, ReqwestTransport, RequestExecutor, Transport};
use store::{AccountStore, NewAccount, NewProxy, ProxyStore};
use tracing::info;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::cli::{AccountsCommand, Cli, CollectCommand, Command, ProxiesCommand};
use crate::collector::{Collection, Collector, Target, Task};
use crate::config::Config;
use crate::verify::Verifier;

/// Long-lived components shared by every command.
struct App {
    config: Config,
    accounts: Arc<AccountStore>,
    proxies: Arc<ProxyStore>,
    transport: Arc<dyn Transport>,
    executor: Arc<RequestExecutor>,
}

impl App {
    async fn build(config: Config) -> Result<Self> {
        let accounts = Arc::new(
            AccountStore::load(config.files.accounts_file.clone())
                .await
                .context("failed to load account store")?,
        );
        let proxies = Arc::new(
            ProxyStore::load(config.files.proxies_file.clone())
                .await
                .context("failed to load proxy store")?,
        );

        let transport: Arc<dyn Transport> =
            Arc::new(ReqwestTransport::new().context("failed to build HTTP client")?);
        let limiter = Arc::new(
            RateLimiter::new(
                config.rate_limit.max_calls,
                Duration::from_secs(config.rate_limit.period_secs),
            )
            .context("invalid rate limit")?,
        );

        let mut executor =
            RequestExecutor::new(config.executor_config(), limiter, transport.clone())
                .context("invalid executor configuration")?
                .with_accounts(accounts.clone(), proxies.clone());
        if config.proxy.use_pool {
            let pool = Arc::new(ProxyPool::new(proxies.list().await, transport.clone()));
            executor = executor.with_proxy_pool(pool, config.proxy.rotation);
        }

        Ok(Self {
            config,
            accounts,
            proxies,
            transport,
            executor: Arc::new(executor),
        })
    }

    fn collector(&self) -> Collector {
        Collector::new(
            self.executor.clone(),
            self.accounts.clone(),
            self.config.files.data_dir.clone(),
            &self.config.collection,
        )
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout stays usable for command output
    let filter = EnvFilter::try_from_env("LOG_LEVEL")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if cli.plain_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init();
    }

    let config_path = Config::resolve_path(cli.config.as_deref());
    info!(path = %config_path.display(), "loading configuration");
    let config = Config::load(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;

    info!(
        api_root = %config.api_root(),
        max_calls = config.rate_limit.max_calls,
        period_secs = config.rate_limit.period_secs,
        use_pool = config.proxy.use_pool,
        "configuration loaded"
    );

    let app = App::build(config).await?;
    match cli.command {
        Command::Accounts(cmd) => run_accounts(&app, cmd).await,
        Command::Proxies(cmd) => run_proxies(&app, cmd).await,
        Command::Collect(cmd) => run_collect(&app, cmd).await,
    }
}

async fn run_accounts(app: &App, cmd: AccountsCommand) -> Result<()> {
    match cmd {
        AccountsCommand::List => {
            for account in app.accounts.list().await {
                println!(
                    "{}\t{}\t{}\t{}",
                    account.id,
                    account.username,
                    account.status.label(),
                    account.proxy_id.as_deref().unwrap_or("-")
                );
            }
        }
        AccountsCommand::Add(args) => {
            let access_token = match (&args.token_env, &args.token_file) {
                (Some(var), _) => Some(Secret::new(
                    std::env::var(var).with_context(|| format!("{var} is not set"))?,
                )),
                (None, Some(path)) => Some(read_secret_file(path)?),
                (None, None) => None,
            };
            let extra = args
                .attrs
                .into_iter()
                .map(|(k, v)| (k, serde_json::Value::String(v)))
                .collect::<BTreeMap<_, _>>();
            let account = app
                .accounts
                .create(
                    NewAccount {
                        username: args.username,
                        email: args.email,
                        access_token,
                        use_proxy: args.use_proxy,
                        extra,
                    },
                    &app.proxies.list().await,
                )
                .await
                .context("failed to create account")?;
            println!("{}", account.id);
        }
        AccountsCommand::Remove { id } => match app.accounts.remove(&id).await? {
            Some(account) => println!("removed {} ({})", account.id, account.username),
            None => anyhow::bail!("account not found: {id}"),
        },
        AccountsCommand::Verify { id } => {
            let verifier = Verifier::new(app.executor.clone(), app.accounts.clone()).with_pause(
                app.config.collection.verify_pause_min_ms,
                app.config.collection.verify_pause_max_ms,
            );
            let results = match id {
                Some(id) => vec![verifier.verify(&id).await?],
                None => verifier.verify_all().await?,
            };
            for result in results {
                println!(
                    "{}\t{}\t{}\t{}",
                    result.account_id,
                    result.username,
                    result.status.label(),
                    result.error.as_deref().unwrap_or("")
                );
            }
        }
    }
    Ok(())
}

async fn run_proxies(app: &App, cmd: ProxiesCommand) -> Result<()> {
    match cmd {
        ProxiesCommand::List => {
            for proxy in app.proxies.list().await {
                let status = if proxy.is_active() { "active" } else { "disabled" };
                println!(
                    "{}\t{}\t{}\t{}",
                    proxy.id,
                    proxy.address(),
                    status,
                    proxy.location.as_deref().unwrap_or("-")
                );
            }
        }
        ProxiesCommand::Add(args) => {
            let password = match &args.password_env {
                Some(var) => Some(Secret::new(
                    std::env::var(var).with_context(|| format!("{var} is not set"))?,
                )),
                None => None,
            };
            let proxy = app
                .proxies
                .add(NewProxy {
                    host: args.host,
                    port: args.port,
                    username: args.username,
                    password,
                    location: args.location,
                })
                .await
                .context("failed to add proxy")?;
            println!("{}", proxy.id);
        }
        ProxiesCommand::Remove { id } => match app.proxies.remove(&id).await? {
            Some(proxy) => println!("removed {} ({})", proxy.id, proxy.address()),
            None => anyhow::bail!("proxy not found: {id}"),
        },
        ProxiesCommand::Test => {
            let pool = ProxyPool::new(app.proxies.list().await, app.transport.clone());
            let results = probe::probe_stored_proxies(
                &app.proxies,
                &pool,
                &app.config.proxy.probe_url,
                Duration::from_secs(app.config.proxy.probe_timeout_secs),
            )
            .await?;
            for result in results {
                let state = if result.alive { "alive" } else { "dead" };
                println!("{}\t{}\t{}", result.proxy_id, result.address, state);
            }
        }
    }
    Ok(())
}

async fn run_collect(app: &App, cmd: CollectCommand) -> Result<()> {
    let collector = app.collector();
    let collection = match cmd {
        CollectCommand::Page {
            id,
            query,
            no_posts,
        } => {
            let target = Target::from_parts("page", id, query)?;
            collector.collect_pages(target, !no_posts).await?
        }
        CollectCommand::Group {
            id,
            query,
            no_posts,
            account,
        } => {
            let target = Target::from_parts("group", id, query)?;
            collector
                .collect_groups(target, !no_posts, account.as_deref())
                .await?
        }
        CollectCommand::Ads {
            account,
            ad_account,
            no_campaigns,
            no_insights,
        } => {
            collector
                .collect_ads(&account, ad_account.as_deref(), !no_campaigns, !no_insights)
                .await?
        }
        CollectCommand::Task { file } => {
            let contents = std::fs::read_to_string(&file)
                .with_context(|| format!("failed to read task file {}", file.display()))?;
            let task: Task = serde_json::from_str(&contents)
                .with_context(|| format!("invalid task file {}", file.display()))?;
            collector.run_task(task).await?
        }
    };
    report(&collection);
    Ok(())
}

fn report(collection: &Collection) {
    info!(records = collection.records.len(), path = %collection.path.display(), "collection finished");
    println!("{}", collection.path.display());
}

fn read_secret_file(path: &Path) -> Result<Secret<String>> {
    let value = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let value = value.trim();
    if value.is_empty() {
        anyhow::bail!("{} is empty", path.display());
    }
    Ok(Secret::new(value.to_owned()))
}
