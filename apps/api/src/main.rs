//! # Tally API
//!
//! REST server for the Tally back office.
//!
//! ## Startup
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ApiConfig::load  (defaults → tally.toml → TALLY_* env)                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  tracing (log_level, RUST_LOG wins)                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite pool + migrations ──► bootstrap admin (empty users table only)  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  axum::serve on host:port, until Ctrl+C / SIGTERM                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use anyhow::Context;
use tally_api::auth::JwtManager;
use tally_api::state::AppState;
use tally_api::{build_router, cors_layer, ensure_bootstrap_admin, ApiConfig};
use tally_db::{Database, DbConfig};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let config = ApiConfig::load().context("Failed to load configuration")?;

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .context("Invalid log_level")?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    info!("Starting Tally API server...");
    info!(
        addr = %config.bind_addr(),
        database = %config.database_url,
        permission_overrides = config.permissions.len(),
        "Configuration loaded"
    );

    let permissions = config.permission_table()?;
    let cors = cors_layer(&config.cors_origins)?;

    // Connect to database, migrations run on connect
    let db = Database::new(
        DbConfig::new(&config.database_url).max_connections(config.database_max_connections),
    )
    .await
    .context("Failed to open database")?;
    info!("Database ready");

    match &config.bootstrap_admin {
        Some(admin) => {
            ensure_bootstrap_admin(&db, admin)
                .await
                .context("Failed to create bootstrap administrator")?;
        }
        None if db.users().count().await? == 0 => {
            warn!("No users and no bootstrap_admin configured: only self-registered users can sign in");
        }
        None => {}
    }

    let jwt = JwtManager::new(&config.jwt_secret, config.jwt_expiry_hours);
    let state = AppState::new(db.clone(), jwt, permissions);
    let app = build_router(state, cors);

    let listener = tokio::net::TcpListener::bind(config.bind_addr())
        .await
        .with_context(|| format!("Failed to bind {}", config.bind_addr()))?;
    info!(addr = %config.bind_addr(), "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.close().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
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
                warn!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, starting graceful shutdown...");
}
