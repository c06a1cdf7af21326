//! File service command-line client
//!
//! Logs in, keeps the token fresh in the background, and runs one of the
//! file operations against the server.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use file_service::admission::AdmissionControl;
use file_service::client::{AuthClient, TransferClient};
use file_service::config::ClientSettings;
use file_service::grpc::protected_methods;
use futures::future::join_all;
use grpc_jwt_propagation::JwtClientInterceptor;
use std::path::PathBuf;
use tonic::transport::Endpoint;
use tracing::{error, info};

/// Upload, list and download files on a file service
#[derive(Parser, Debug)]
#[command(name = "file-client")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address (defaults to FILE_SERVICE_ADDRESS or http://127.0.0.1:8080)
    #[arg(short, long, global = true, env = "FILE_SERVICE_ADDRESS")]
    address: Option<String>,

    #[arg(short, long, global = true, default_value = "admin")]
    username: String,

    #[arg(short, long, global = true, default_value = "secret")]
    password: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
enum Commands {
    /// Upload a local file
    Upload {
        path: PathBuf,

        /// Number of concurrent uploads of the same file
        #[arg(short, long, default_value = "1")]
        num: usize,

        /// Owner name (defaults to the logged-in user)
        #[arg(long)]
        owner: Option<String>,
    },

    /// List files of an owner
    List {
        #[arg(long)]
        owner: Option<String>,
    },

    /// Download a file by id
    Download {
        file_id: String,

        /// Directory to write into (defaults to CLIENT_DOWNLOAD_DIR)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "file_service=info,info".into()),
        )
        .with_target(false)
        .init();

    let mut settings = ClientSettings::load().context("Failed to load client configuration")?;
    if let Some(address) = cli.address.clone() {
        settings.server_address = address;
    }

    info!(address = %settings.server_address, "Connecting to file service");
    let channel = Endpoint::from_shared(settings.server_address.clone())
        .context("Invalid server address")?
        .connect()
        .await
        .context("Cannot connect to server")?;

    let auth = AuthClient::new(channel.clone(), &cli.username, &cli.password);
    let interceptor = JwtClientInterceptor::start(
        auth,
        protected_methods(),
        settings.token_refresh_interval(),
    )
    .await
    .context("Login failed")?;

    let mut client = TransferClient::new(channel, interceptor, settings.download_dir.clone())
        .with_admission(AdmissionControl::default())
        .with_request_timeout(settings.request_timeout());

    match cli.command {
        Commands::Upload { path, num, owner } => {
            let owner = owner.unwrap_or_else(|| cli.username.clone());
            let uploads = (0..num.max(1)).map(|_| client.upload_file(&owner, &path));

            let mut failures = 0;
            for result in join_all(uploads).await {
                match result {
                    Ok(uploaded) => println!(
                        "uploaded {} ({} bytes) id={}",
                        uploaded.file.title, uploaded.size, uploaded.file.id
                    ),
                    Err(e) => {
                        error!(error = %e, "Upload failed");
                        failures += 1;
                    }
                }
            }
            if failures > 0 {
                anyhow::bail!("{} of {} uploads failed", failures, num.max(1));
            }
        }
        Commands::List { owner } => {
            let owner = owner.unwrap_or_else(|| cli.username.clone());
            let files = client.list_files(&owner).await?;
            for file in &files {
                println!(
                    "{}\t{}\t{} bytes\t{}",
                    file.id,
                    file.title,
                    file.size_bytes,
                    file.created_at.to_rfc3339()
                );
            }
            info!(owner = %owner, count = files.len(), "Listed files");
        }
        Commands::Download { file_id, output } => {
            if let Some(dir) = output {
                client = client.with_download_dir(dir);
            }
            let downloaded = client.download(&file_id).await?;
            println!(
                "downloaded {} ({} bytes) to {}",
                downloaded.title,
                downloaded.bytes_written,
                downloaded.path.display()
            );
        }
    }

    Ok(())
}
