//! muxdeck server
//!
//! Hosts the session bridge: agents attach over `/ws/agent`, dashboards over
//! `/ws/dashboard`, and everything else talks to the HTTP control API.

mod activity_log;
mod approvals;
mod cli;
mod cmd_status;
mod dashboard;
mod http;
mod logging;
mod migration_runner;
mod paths;
mod state;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use muxdeck_bridge::SessionBridge;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::approvals::ApprovalInbox;
use crate::cli::{Cli, Command, StartArgs};
use crate::state::AppState;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Status { url }) => cmd_status::run(&url).await,
        Some(Command::Start) | None => start(cli.data_dir.as_deref(), cli.start).await,
    }
}

async fn start(data_dir: Option<&std::path::Path>, args: StartArgs) -> anyhow::Result<()> {
    let data_dir = paths::init_data_dir(data_dir)?;
    paths::ensure_dirs(&data_dir)?;

    // Guard must live until shutdown so buffered log lines get flushed
    let logging = logging::init_logging(
        &paths::log_dir()?,
        args.log_filter.as_deref(),
        args.log_format,
    )?;

    info!(
        component = "server",
        event = "server.starting",
        version = VERSION,
        run_id = %logging.run_id,
        data_dir = %data_dir.display(),
        bind = %args.bind,
        "Starting muxdeck server"
    );

    let bridge = Arc::new(SessionBridge::new());

    let approvals = Arc::new(ApprovalInbox::new());
    let approvals_subscription = approvals.attach(&bridge);

    let mut activity_writer = None;
    let mut activity_subscription = None;
    let activity_store = if args.no_activity_log {
        info!(
            component = "server",
            event = "server.activity_log.disabled",
            "Activity log disabled"
        );
        None
    } else {
        let db_path = paths::activity_db_path()?;
        let (log, writer) = activity_log::open(&db_path)?;
        activity_writer = Some(tokio::spawn(writer.run()));
        activity_subscription = Some(log.attach(&bridge));
        Some(log.store())
    };

    let state = AppState::new(
        bridge.clone(),
        approvals,
        activity_store,
        args.live_log_capacity,
    );

    let app = http::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let listener = tokio::net::TcpListener::bind(args.bind).await?;
    info!(
        component = "server",
        event = "server.listening",
        addr = %listener.local_addr()?,
        "Listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Unsubscribing drops the activity sender so the writer flushes and exits
    approvals_subscription.unsubscribe();
    if let Some(subscription) = activity_subscription {
        subscription.unsubscribe();
    }
    if let Some(writer) = activity_writer {
        if tokio::time::timeout(Duration::from_secs(2), writer).await.is_err() {
            tracing::warn!(
                component = "server",
                event = "server.activity_log.flush_timeout",
                "Activity writer did not finish before shutdown"
            );
        }
    }

    info!(
        component = "server",
        event = "server.stopped",
        sessions = bridge.get_all_sessions().len(),
        "Server stopped"
    );
    drop(logging);
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(
            component = "server",
            event = "server.signal_failed",
            error = %e,
            "Failed to listen for ctrl-c"
        );
        std::future::pending::<()>().await;
    }
    info!(
        component = "server",
        event = "server.shutdown_requested",
        "Shutdown requested"
    );
}
