use std::net::SocketAddr;

use anyhow::Context;
use dotenv::dotenv;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    prelude::*,
    EnvFilter,
};

use vet_clinic_api::api::create_application;
use vet_clinic_domain::auth::{create_default_auth_service, AuthConfig};
use vet_clinic_domain::database::{initialize_database_pool, DatabaseConfig};

/// The main entry point for the VetClinic API server
///
/// Loads `.env`, sets up tracing, opens the SQLite pool (creating the
/// schema on first run), makes sure the configured administrator exists
/// and serves until CTRL+C or SIGTERM.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if dotenv().is_err() {
        eprintln!("Warning: .env file not found or couldn't be read. Using environment variables.");
    }

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_span_events(FmtSpan::CLOSE)
                .with_target(false)
                .with_ansi(true)
                .with_timer(fmt::time::uptime())
                .with_writer(std::io::stdout),
        )
        .with(env_filter)
        .init();

    info!("Starting VetClinic API server");

    let db_config = DatabaseConfig::from_env().context("invalid database configuration")?;
    let pool = initialize_database_pool(&db_config).context("failed to open the database")?;
    info!("Using SQLite database at {}", db_config.sqlite_path);

    let auth_config = AuthConfig::from_env().context("invalid authentication configuration")?;

    // Optional administrator account for a fresh database
    if let (Ok(username), Ok(password)) = (std::env::var("ADMIN_USERNAME"), std::env::var("ADMIN_PASSWORD")) {
        let auth = create_default_auth_service(pool.clone(), auth_config.clone());
        match auth.bootstrap_admin(&username, &password).await {
            Ok(Some(user)) => info!("Created administrator account {}", user.username),
            Ok(None) => info!("Accounts already exist, skipping administrator bootstrap"),
            Err(e) => warn!("Could not create administrator account {}: {}", username, e),
        }
    }

    let app = create_application(pool, auth_config);

    let port = std::env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse::<u16>()
        .context("PORT must be a number")?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Listening on {}", addr);

    let listener = TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolves on CTRL+C or, on Unix, SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("Shutting down server...");
}
