//! Command-line interface
//!
//! | Command | Description |
//! |---------|-------------|
//! | `accounts list\|add\|remove\|verify` | Manage and verify platform accounts |
//! | `proxies list\|add\|remove\|test` | Manage and probe forward proxies |
//! | `collect page\|group\|ads\|task` | Collect records and save them under the data dir |
//!
//! Secrets (account tokens, proxy passwords) are never taken as argument
//! values; they are read from a named environment variable or a file.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "graph-harvester",
    version,
    about = "Rate-limited collector for a graph-style social API"
)]
pub struct Cli {
    /// Config file (overrides CONFIG_PATH).
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Human-readable logs instead of JSON.
    #[arg(long, global = true, default_value_t = false)]
    pub plain_logs: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Manage platform accounts.
    #[command(subcommand)]
    Accounts(AccountsCommand),

    /// Manage forward proxies.
    #[command(subcommand)]
    Proxies(ProxiesCommand),

    /// Collect data and save it as JSON.
    #[command(subcommand)]
    Collect(CollectCommand),
}

#[derive(Debug, Subcommand)]
pub enum AccountsCommand {
    /// List stored accounts.
    List,

    /// Add an account.
    Add(AddAccountArgs),

    /// Remove an account.
    Remove {
        #[arg(long)]
        id: String,
    },

    /// Verify one account, or every non-deleted account.
    Verify {
        #[arg(long)]
        id: Option<String>,
    },
}

#[derive(Debug, Args)]
pub struct AddAccountArgs {
    #[arg(long)]
    pub username: String,

    #[arg(long)]
    pub email: Option<String>,

    /// Environment variable holding the account's access token.
    #[arg(long, conflicts_with = "token_file")]
    pub token_env: Option<String>,

    /// File holding the account's access token.
    #[arg(long)]
    pub token_file: Option<PathBuf>,

    /// Assign a random active proxy to the account.
    #[arg(long, default_value_t = false)]
    pub use_proxy: bool,

    /// Extra attribute stored with the account (repeatable).
    #[arg(long = "attr", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub attrs: Vec<(String, String)>,
}

#[derive(Debug, Subcommand)]
pub enum ProxiesCommand {
    /// List stored proxies.
    List,

    /// Add a proxy.
    Add(AddProxyArgs),

    /// Remove a proxy.
    Remove {
        #[arg(long)]
        id: String,
    },

    /// Probe every stored proxy and record which ones are alive.
    Test,
}

#[derive(Debug, Args)]
pub struct AddProxyArgs {
    #[arg(long)]
    pub host: String,

    #[arg(long)]
    pub port: u16,

    #[arg(long, requires = "password_env")]
    pub username: Option<String>,

    /// Environment variable holding the proxy password.
    #[arg(long, requires = "username")]
    pub password_env: Option<String>,

    #[arg(long)]
    pub location: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum CollectCommand {
    /// Pages by id or search query.
    Page {
        #[arg(long, conflicts_with = "query")]
        id: Option<String>,
        #[arg(long)]
        query: Option<String>,
        /// Skip post collection.
        #[arg(long, default_value_t = false)]
        no_posts: bool,
    },

    /// Groups by id or search query.
    Group {
        #[arg(long, conflicts_with = "query")]
        id: Option<String>,
        #[arg(long)]
        query: Option<String>,
        #[arg(long, default_value_t = false)]
        no_posts: bool,
        /// Member account whose credential reads the group.
        #[arg(long)]
        account: Option<String>,
    },

    /// Ad accounts, campaigns and insights.
    Ads {
        /// Account whose token owns the ad accounts.
        #[arg(long)]
        account: String,
        #[arg(long)]
        ad_account: Option<String>,
        #[arg(long, default_value_t = false)]
        no_campaigns: bool,
        #[arg(long, default_value_t = false)]
        no_insights: bool,
    },

    /// Run a JSON task description.
    Task {
        #[arg(long)]
        file: PathBuf,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got {s:?}"))?;
    if key.is_empty() {
        return Err(format!("empty key in {s:?}"));
    }
    Ok((key.to_string(), value.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "graph-harvester",
            "accounts",
            "list",
            "--config",
            "/etc/harvester.toml",
            "--plain-logs",
        ])
        .unwrap();
        assert_eq!(cli.config, Some(PathBuf::from("/etc/harvester.toml")));
        assert!(cli.plain_logs);
        assert!(matches!(cli.command, Command::Accounts(AccountsCommand::List)));
    }

    #[test]
    fn parses_account_add_with_attrs() {
        let cli = Cli::try_parse_from([
            "graph-harvester",
            "accounts",
            "add",
            "--username",
            "collector",
            "--token-env",
            "COLLECTOR_TOKEN",
            "--use-proxy",
            "--attr",
            "team=research",
            "--attr",
            "region=eu",
        ])
        .unwrap();
        let Command::Accounts(AccountsCommand::Add(args)) = cli.command else {
            panic!("expected accounts add");
        };
        assert_eq!(args.username, "collector");
        assert_eq!(args.token_env.as_deref(), Some("COLLECTOR_TOKEN"));
        assert!(args.use_proxy);
        assert_eq!(
            args.attrs,
            vec![
                ("team".to_string(), "research".to_string()),
                ("region".to_string(), "eu".to_string())
            ]
        );
    }

    #[test]
    fn rejects_malformed_attr() {
        let result = Cli::try_parse_from([
            "graph-harvester",
            "accounts",
            "add",
            "--username",
            "u",
            "--attr",
            "novalue",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn collect_page_id_conflicts_with_query() {
        let result = Cli::try_parse_from([
            "graph-harvester",
            "collect",
            "page",
            "--id",
            "1",
            "--query",
            "news",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn proxy_username_requires_password_env() {
        let result = Cli::try_parse_from([
            "graph-harvester",
            "proxies",
            "add",
            "--host",
            "10.0.0.1",
            "--port",
            "8080",
            "--username",
            "u",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn parses_collect_ads() {
        let cli = Cli::try_parse_from([
            "graph-harvester",
            "collect",
            "ads",
            "--account",
            "acc_1",
            "--ad-account",
            "555",
            "--no-insights",
        ])
        .unwrap();
        match cli.command {
            Command::Collect(CollectCommand::Ads {
                account,
                ad_account,
                no_campaigns,
                no_insights,
            }) => {
                assert_eq!(account, "acc_1");
                assert_eq!(ad_account.as_deref(), Some("555"));
                assert!(!no_campaigns);
                assert!(no_insights);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
