/// gRPC server assembly
///
/// Wires the user store, token authority and transfer service behind the
/// authorization layer, plus health and reflection services.
use crate::admission::AdmissionControl;
use crate::config::Settings;
use crate::grpc::proto::auth_service_server::AuthServiceServer;
use crate::grpc::proto::file_service_server::FileServiceServer;
use crate::grpc::{access_policy, proto, AuthServer, TransferLimits, TransferService};
use crate::store::{default_seeds, seed_users, DiskFileStore, FileStore, InMemoryUserStore, UserStore};
use anyhow::{Context, Result};
use crypto_core::TokenAuthority;
use grpc_jwt_propagation::{AuthorizationLayer, MethodPolicy};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tonic_health::server::health_reporter;
use tracing::info;

pub struct FileServer {
    authority: Arc<TokenAuthority>,
    users: Arc<dyn UserStore>,
    transfer: TransferService,
    policy: MethodPolicy,
}

impl FileServer {
    pub fn new(
        authority: Arc<TokenAuthority>,
        users: Arc<dyn UserStore>,
        transfer: TransferService,
    ) -> Self {
        Self {
            authority,
            users,
            transfer,
            policy: access_policy(),
        }
    }

    /// Replace the default admin-only policy
    pub fn with_policy(mut self, policy: MethodPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Build a server from settings: seeded users, on-disk storage
    pub async fn from_settings(settings: &Settings) -> Result<Self> {
        let authority = TokenAuthority::new(
            settings.jwt.secret.as_bytes(),
            settings.jwt.token_lifetime(),
        )
        .context("Failed to initialize token authority")?;

        let users = Arc::new(InMemoryUserStore::new());
        seed_users(users.as_ref(), &default_seeds())
            .await
            .context("Failed to seed users")?;

        let files: Arc<dyn FileStore> = Arc::new(
            DiskFileStore::new(settings.storage.root.clone())
                .await
                .context("Failed to open file storage")?,
        );
        info!(root = %settings.storage.root.display(), "File storage ready");

        let transfer = TransferService::new(
            files,
            AdmissionControl::from_settings(&settings.transfer),
            TransferLimits::from(&settings.transfer),
        );

        Ok(Self::new(Arc::new(authority), users, transfer))
    }

    /// Serve on `listener` until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send,
    {
        let (mut health, health_service) = health_reporter();
        health
            .set_serving::<FileServiceServer<TransferService>>()
            .await;
        health.set_serving::<AuthServiceServer<AuthServer>>().await;

        let reflection = tonic_reflection::server::Builder::configure()
            .register_encoded_file_descriptor_set(proto::FILE_DESCRIPTOR_SET)
            .build_v1()
            .context("Failed to build reflection service")?;

        let auth = AuthServer::new(self.users, Arc::clone(&self.authority));
        let layer = AuthorizationLayer::new(self.authority, self.policy);

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "Starting gRPC server");
        }

        Server::builder()
            .layer(layer)
            .add_service(health_service)
            .add_service(reflection)
            .add_service(AuthServiceServer::new(auth))
            .add_service(FileServiceServer::new(self.transfer))
            .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
            .await
            .context("gRPC server error")?;

        info!("gRPC server stopped");
        Ok(())
    }
}
