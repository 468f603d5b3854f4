use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

mod app;
mod http;
mod ws;

/// Keyed WebSocket fan-out gateway.
#[derive(Debug, Parser)]
#[command(version)]
struct Cli {
    /// Path to keycast.toml (defaults to ~/.keycast/keycast.toml).
    #[arg(long, env = "KEYCAST_CONFIG")]
    config: Option<String>,

    /// Override gateway.bind.
    #[arg(long)]
    bind: Option<String>,

    /// Override gateway.port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "keycast_gateway=info,keycast_registry=info,tower_http=debug".into()
            }),
        )
        .init();

    let cli = Cli::parse();

    let mut config = keycast_core::config::KeycastConfig::load(cli.config.as_deref())
        .unwrap_or_else(|e| {
            tracing::warn!("Config load failed ({}), using defaults", e);
            keycast_core::config::KeycastConfig::default()
        });
    if let Some(bind) = cli.bind {
        config.gateway.bind = bind;
    }
    if let Some(port) = cli.port {
        config.gateway.port = port;
    }

    let addr: SocketAddr = format!("{}:{}", config.gateway.bind, config.gateway.port).parse()?;
    let drain_deadline = config.connections.send_timeout();

    let state = Arc::new(app::AppState::new(config));
    let router = app::build_router(Arc::clone(&state));

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("keycast gateway listening on {}", addr);

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal(Arc::clone(&state)))
        .await?;

    // upgraded sockets outlive the HTTP server; give their close frames a chance
    drain(&state, drain_deadline).await;
    info!("keycast gateway stopped");
    Ok(())
}

/// Resolve on ctrl-c, after telling the registry to close every connection.
async fn shutdown_signal(state: Arc<app::AppState>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c, shutting down");
    }
    info!("shutdown signal received");
    state.registry.shutdown();
}

async fn drain(state: &app::AppState, deadline: Duration) {
    let drained = tokio::time::timeout(deadline, async {
        while state.registry.connection_count() > 0 {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await;
    if drained.is_err() {
        tracing::warn!(
            remaining = state.registry.connection_count(),
            "connections still open at exit"
        );
    }
}
