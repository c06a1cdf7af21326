/// Login RPC client; supplies tokens to the client interceptor
use crate::grpc::proto::auth_service_client::AuthServiceClient;
use crate::grpc::proto::LoginRequest;
use async_trait::async_trait;
use grpc_jwt_propagation::TokenSource;
use std::fmt;
use tonic::transport::Channel;
use tonic::Status;
use tracing::debug;

#[derive(Clone)]
pub struct AuthClient {
    service: AuthServiceClient<Channel>,
    username: String,
    password: String,
}

impl AuthClient {
    pub fn new(channel: Channel, username: &str, password: &str) -> Self {
        Self {
            service: AuthServiceClient::new(channel),
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub async fn login(&self) -> Result<String, Status> {
        let mut service = self.service.clone();
        let response = service
            .login(LoginRequest {
                username: self.username.clone(),
                password: self.password.clone(),
            })
            .await?;

        debug!(username = %self.username, "Obtained access token");
        Ok(response.into_inner().access_token)
    }
}

impl fmt::Debug for AuthClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthClient")
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl TokenSource for AuthClient {
    async fn fetch_token(&self) -> Result<String, Status> {
        self.login().await
    }
}
