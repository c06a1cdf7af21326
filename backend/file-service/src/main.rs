/// File Service Main Entry Point
///
/// Starts the gRPC server with:
/// - Seeded in-memory user store
/// - On-disk file storage
/// - JWT authorization layer (admin role for file operations)
/// - Health and reflection services
use anyhow::{Context, Result};
use clap::Parser;
use file_service::{config::Settings, FileServer};
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(name = "file-service", version, about = "Remote file storage over gRPC")]
struct Args {
    /// Port to listen on (overrides SERVER_PORT)
    #[arg(short, long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "file_service=info,info".into()),
        )
        .with_target(false)
        .json()
        .init();

    info!("Starting File Service");

    let mut settings = Settings::load().context("Failed to load configuration")?;
    if let Some(port) = args.port {
        settings.server.port = port;
    }
    info!("Configuration loaded successfully");

    let server = FileServer::from_settings(&settings).await?;

    let addr = settings.server.address();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    server.serve(listener, shutdown_signal()).await?;

    info!("File service shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Shutting down gracefully...");
}
