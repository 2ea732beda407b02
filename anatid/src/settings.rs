use crate::server::ServerOptions;
use crate::tribune::Tribunes;
use crate::types::{FetchConfig, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Relay tribune posts to live WebSocket and SSE viewers.
#[derive(Debug, Clone, Parser)]
#[command(name = "anatid", version, about)]
pub struct Settings {
    /// TCP address to listen on
    #[arg(long, env = "ANATID_LISTEN", default_value = "0.0.0.0:6666")]
    pub listen: SocketAddr,

    /// Verbose logging
    #[arg(long, env = "ANATID_VERBOSE")]
    pub verbose: bool,

    /// Tribune table (TOML, JSON or YAML); the built-in table is used when absent
    #[arg(long, env = "ANATID_TRIBUNES")]
    pub tribunes: Option<PathBuf>,

    /// Seconds between full polls of every tribune
    #[arg(long, env = "ANATID_POLL_INTERVAL_SECS", default_value_t = 30)]
    pub poll_interval_secs: u64,

    /// Payloads buffered per viewer before it is disconnected as too slow
    #[arg(long, default_value_t = 8)]
    pub queue_capacity: usize,

    /// Seconds of silence before an SSE keep-alive comment is sent
    #[arg(long, default_value_t = 30)]
    pub keep_alive_secs: u64,

    /// User-Agent for feed polls and for posts whose viewer sent none
    #[arg(long, default_value = "anatid/0.1")]
    pub user_agent: String,

    /// Backend request timeout in seconds
    #[arg(long, default_value_t = 30)]
    pub timeout_secs: u64,

    /// Extra attempts for a failed feed fetch
    #[arg(long, default_value_t = 1)]
    pub max_retries: u32,
}

impl Settings {
    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig {
            user_agent: self.user_agent.clone(),
            timeout_seconds: self.timeout_secs,
            max_retries: self.max_retries,
            ..FetchConfig::default()
        }
    }

    pub fn server_options(&self) -> ServerOptions {
        ServerOptions {
            poll_interval: Duration::from_secs(self.poll_interval_secs),
            queue_capacity: self.queue_capacity,
            keep_alive: Duration::from_secs(self.keep_alive_secs),
        }
    }

    pub fn load_tribunes(&self) -> Result<Tribunes> {
        match &self.tribunes {
            Some(path) => Tribunes::from_file(path),
            None => Tribunes::builtin(),
        }
    }

    /// Default log filter when `RUST_LOG` is unset.
    pub fn log_filter(&self) -> &'static str {
        if self.verbose {
            "anatid=debug,tower_http=debug,info"
        } else {
            "info"
        }
    }
}
