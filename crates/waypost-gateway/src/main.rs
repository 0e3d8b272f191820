use clap::Parser;
use std::sync::Arc;
use tracing::{info, warn};
use waypost_core::config::WaypostConfig;
use waypost_core::WaypostError;

mod app;
mod http;
mod ws;

/// Live location broadcast gateway.
#[derive(Debug, Parser)]
#[command(name = "waypost-gateway", version, about)]
struct Cli {
    /// Path to waypost.toml (default: ~/.waypost/waypost.toml).
    #[arg(long, env = "WAYPOST_CONFIG")]
    config: Option<String>,

    /// Listening port, overrides config and the PORT env var.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "waypost_gateway=info,waypost_fanout=info,waypost_ingest=info,tower_http=debug"
                    .into()
            }),
        )
        .init();

    let cli = Cli::parse();

    // load config: defaults < toml file < WAYPOST_* env < PORT env < --port
    let mut config = WaypostConfig::load(cli.config.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        WaypostConfig::default()
    });
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let addr = config.listen_addr();
    info!(
        retention = config.history.retention,
        queue_capacity = config.fanout.queue_capacity,
        coordinates = ?config.ingest.coordinates,
        "configuration loaded"
    );

    let state = Arc::new(app::AppState::new(config));
    let router = app::build_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| WaypostError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!("Waypost gateway listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
        .await?;

    info!("Waypost gateway stopped");
    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM, then end every live subscription so open
/// WebSocket loops close and the server can drain.
async fn shutdown_signal(state: Arc<app::AppState>) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    let closed = state.broadcaster.close_all();
    info!(closed, "shutdown requested, live subscriptions closed");
}
