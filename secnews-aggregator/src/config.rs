use crate::live::LiveOptions;
use crate::registry::FeedRegistry;
use crate::types::{FetchConfig, Result};
use clap::{ArgAction, Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::Level;

#[derive(Parser, Debug)]
#[command(author, version, about = "Aggregates security news feeds into a searchable store", long_about = None)]
pub struct AppConfig {
    /// Postgres connection string; without it records live in memory
    #[arg(long, env = "DATABASE_URL", global = true)]
    pub database_url: Option<String>,

    /// JSON feed table replacing the built-in sources
    #[arg(long, env = "SECNEWS_FEEDS", global = true)]
    pub feeds: Option<PathBuf>,

    /// Passthrough endpoint called as `GET relay?url=<feed>`
    #[arg(long, env = "SECNEWS_RELAY_URL", global = true)]
    pub relay_url: Option<String>,

    /// Per-source deadline in seconds
    #[arg(long, default_value_t = 8, global = true)]
    pub timeout: u64,

    #[arg(long, default_value_t = 1, global = true)]
    pub retries: u32,

    /// Feeds fetched at the same time
    #[arg(long, default_value_t = 4, global = true)]
    pub concurrency: usize,

    /// -v for debug, -vv for trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch every source once and store new records
    Sync,
    /// Print one page of news
    List {
        #[arg(long)]
        category: Option<String>,
        #[arg(long)]
        search: Option<String>,
        #[arg(long, default_value_t = 20)]
        page_size: usize,
        #[arg(long)]
        cursor: Option<String>,
    },
    /// Print the newest breaking records
    Breaking {
        #[arg(long, default_value_t = 5)]
        limit: usize,
    },
    /// Print per-category counts
    Counts,
    /// Serve the HTTP API
    Serve {
        #[arg(long, env = "SECNEWS_BIND", default_value = "127.0.0.1:8080")]
        bind: SocketAddr,
        /// Seconds between background syncs; 0 disables them
        #[arg(long, env = "SECNEWS_SYNC_INTERVAL", default_value_t = 0)]
        sync_interval: u64,
    },
}

impl AppConfig {
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            timeout_seconds: self.timeout.max(1),
            max_retries: self.retries,
            relay_url: self.relay_url.clone().filter(|r| !r.trim().is_empty()),
            concurrency: self.concurrency.max(1),
            ..FetchConfig::default()
        }
    }

    pub fn live_options(&self) -> LiveOptions {
        LiveOptions::from(&self.fetch_config())
    }

    pub fn registry(&self) -> Result<FeedRegistry> {
        match &self.feeds {
            Some(path) => FeedRegistry::from_json_file(path),
            None => Ok(FeedRegistry::builtin()),
        }
    }

    pub fn log_level(&self) -> Level {
        match self.verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    }
}
