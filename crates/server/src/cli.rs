use std::net::SocketAddr;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

#[derive(Parser, Debug)]
#[command(
    name = "muxdeck",
    version,
    about = "Session bridge for coding agents: transport mount, control API and dashboard feed"
)]
pub struct Cli {
    /// Directory holding logs/ and activity.db. Default: ~/.muxdeck.
    #[arg(long, global = true, env = "MUXDECK_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(flatten)]
    pub start: StartArgs,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the server (default when no subcommand is given).
    Start,
    /// Check a running server and list its sessions.
    Status {
        /// Base URL of the server.
        #[arg(long, default_value = "http://127.0.0.1:4000")]
        url: String,
    },
}

/// Server options. Global so they also parse after `start`.
#[derive(Args, Debug, Clone)]
pub struct StartArgs {
    /// Address to listen on.
    #[arg(long, global = true, env = "MUXDECK_BIND", default_value = "127.0.0.1:4000")]
    pub bind: SocketAddr,

    /// Tracing filter directive. Overrides RUST_LOG.
    #[arg(long, global = true, env = "MUXDECK_LOG_FILTER")]
    pub log_filter: Option<String>,

    #[arg(long, global = true, env = "MUXDECK_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Maximum entries kept by each dashboard live log.
    #[arg(long, global = true, env = "MUXDECK_LIVE_LOG_CAPACITY", default_value_t = muxdeck_bridge::live_log::DEFAULT_CAPACITY)]
    pub live_log_capacity: usize,

    /// Don't persist domain events to activity.db.
    #[arg(long, global = true, env = "MUXDECK_NO_ACTIVITY_LOG")]
    pub no_activity_log: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    Json,
    Pretty,
}
