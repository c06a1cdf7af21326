//! JWT Authentication and Authorization for gRPC Services
//!
//! This library gates gRPC methods behind signed identity tokens and keeps
//! clients supplied with fresh ones.
//!
//! ## Core Components
//!
//! - **MethodPolicy**: method path → roles allowed to call it
//! - **AuthorizationLayer**: tower layer that verifies tokens for protected
//!   methods and stores the claims in request extensions
//! - **JwtClientInterceptor**: injects `authorization: Bearer <token>` into
//!   outgoing calls to protected methods, refreshing the token in the background
//! - **JwtClaimsExt**: request extension trait for reading claims in handlers
//!
//! ## Usage Example
//!
//! ### Server Side
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use chrono::Duration;
//! use crypto_core::jwt::TokenAuthority;
//! use grpc_jwt_propagation::{AuthorizationLayer, MethodPolicy};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let authority = Arc::new(TokenAuthority::new(b"secret", Duration::minutes(15))?);
//! let policy = MethodPolicy::new()
//!     .allow("/file.service.FileService/Upload", ["admin"])
//!     .allow("/file.service.FileService/List", ["admin"]);
//!
//! let _server = tonic::transport::Server::builder()
//!     .layer(AuthorizationLayer::new(authority, policy));
//! // .add_service(FileServiceServer::new(service))
//! # Ok(())
//! # }
//! ```
//!
//! ### Handler Side
//!
//! ```rust,no_run
//! use grpc_jwt_propagation::JwtClaimsExt;
//! use tonic::{Request, Response, Status};
//!
//! async fn list(request: Request<String>) -> Result<Response<()>, Status> {
//!     let claims = request.jwt_claims()?;
//!     tracing::info!(subject = %claims.subject, "listing files");
//!     Ok(Response::new(()))
//! }
//! ```
//!
//! ## Security Guarantees
//!
//! - Tokens are HS256-signed and verified with crypto-core
//! - Expiration checked on every protected call
//! - No token / invalid token = `Status::unauthenticated`
//! - Role not allowed for the method = `Status::permission_denied`

mod claims;
mod client;
mod extensions;
mod server;

pub use claims::JwtClaims;
pub use client::{JwtClientInterceptor, TokenSource, DEFAULT_REFRESH_INTERVAL};
pub use extensions::JwtClaimsExt;
pub use server::{AuthorizationLayer, AuthorizationService, Authorizer, MethodPolicy};

// Re-export tonic Status for convenience
pub use tonic::Status;
