use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use ardu::auth::{bootstrap, JwtKeys};
use ardu::config::{Cli, Config};
use ardu::otp::Dispatcher;
use ardu::state::AppState;
use ardu::{cron, db, media, routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse CLI args and load config
    let cli = Cli::parse();
    let data_dir = Config::data_dir(&cli)?;
    std::fs::create_dir_all(&data_dir)?;
    tracing::info!("Data directory: {}", data_dir.display());

    let config = Config::load(&cli)?;

    // Initialize database
    let pool = db::create_pool(&config.db_path())?;
    db::run_migrations(&pool)?;
    bootstrap::ensure_main_admin(&pool, &config.bootstrap)?;

    let jwt = match &config.auth.jwt_secret {
        Some(secret) => JwtKeys::new(secret.as_bytes(), config.auth.jwt_expiration_secs),
        None => {
            tracing::warn!("No JWT secret configured; tokens will not survive a restart");
            JwtKeys::ephemeral(config.auth.jwt_expiration_secs)
        }
    };

    let state = AppState {
        db: pool,
        config: config.clone(),
        jwt: Arc::new(jwt),
        media: media::from_config(&config.media),
        otp: Arc::new(Dispatcher::from_config(&config.otp)?),
    };

    tokio::spawn(cron::schedule_daily_sweep(state.clone()));

    let app = routes::app(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    tracing::info!("Listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        return;
    }
    tracing::info!("Shutting down");
}
