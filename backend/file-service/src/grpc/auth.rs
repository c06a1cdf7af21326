/// Login RPC: exchanges username/password for a signed access token
use crate::error::{FileServiceError, Result};
use crate::grpc::proto::auth_service_server::AuthService;
use crate::grpc::proto::{LoginRequest, LoginResponse};
use crate::store::UserStore;
use crypto_core::jwt::TokenAuthority;
use std::sync::Arc;
use tonic::{Request, Response, Status};
use tracing::{info, warn};

#[derive(Clone)]
pub struct AuthServer {
    users: Arc<dyn UserStore>,
    authority: Arc<TokenAuthority>,
}

impl AuthServer {
    pub fn new(users: Arc<dyn UserStore>, authority: Arc<TokenAuthority>) -> Self {
        Self { users, authority }
    }

    /// Verify credentials and issue a token carrying the user's role
    ///
    /// Unknown users and wrong passwords fail identically.
    pub async fn authenticate(&self, username: &str, password: &str) -> Result<String> {
        let user = match self.users.find(username).await? {
            Some(user) => user,
            None => {
                warn!(username, "Login for unknown user");
                return Err(FileServiceError::InvalidCredentials);
            }
        };

        if !user.is_correct_password(password) {
            warn!(username, "Login with wrong password");
            return Err(FileServiceError::InvalidCredentials);
        }

        let token = self.authority.issue(&user.username, &user.role)?;
        info!(username, role = %user.role, "User logged in");

        Ok(token)
    }
}

#[tonic::async_trait]
impl AuthService for AuthServer {
    async fn login(
        &self,
        request: Request<LoginRequest>,
    ) -> std::result::Result<Response<LoginResponse>, Status> {
        let req = request.into_inner();

        let access_token = self.authenticate(&req.username, &req.password).await?;

        Ok(Response::new(LoginResponse { access_token }))
    }
}
