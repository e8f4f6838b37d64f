use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use xiaokang_auth::auth::SystemClock;
use xiaokang_auth::config::Config;
use xiaokang_auth::engine::{spawn_reaper_task, SessionReaper};
use xiaokang_auth::AppState;

#[derive(Parser, Debug)]
#[command(name = "xiaokang-auth")]
#[command(author, version, about = "Session and identity service", long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "xiaokang.toml")]
    config: PathBuf,

    /// Override log level
    #[arg(short, long)]
    log_level: Option<String>,

    /// Token signing secret (overrides auth.jwt_secret)
    #[arg(long, env = "XIAOKANG_JWT_SECRET", hide_env_values = true)]
    jwt_secret: Option<String>,

    /// Override listen port
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let mut config = Config::load(&cli.config)?;

    // Initialize logging
    let log_level = cli
        .log_level
        .as_ref()
        .unwrap_or(&config.logging.level)
        .clone();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting xiaokang-auth v{}", env!("CARGO_PKG_VERSION"));

    if let Some(secret) = cli.jwt_secret {
        config.auth.jwt_secret = Some(secret);
    }
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if config.auth.jwt_secret.as_deref().map_or(true, str::is_empty) {
        tracing::warn!(
            "No signing secret configured; using a random one. Tokens will not survive a restart."
        );
        let bytes: [u8; 32] = rand::rng().random();
        config.auth.jwt_secret = Some(hex::encode(bytes));
    }

    // Initialize database
    let db = xiaokang_auth::db::init(&config.server).await?;

    let state = Arc::new(AppState::new(
        config.clone(),
        db,
        Arc::new(SystemClock),
    )?);

    spawn_reaper_task(
        SessionReaper::new(state.sessions.clone(), state.csrf.clone()),
        &config.cleanup,
    );

    let app = xiaokang_auth::api::create_router(state);

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    tracing::info!("API server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
