//! Request Extension Trait for JWT Claims Access
//!
//! Provides ergonomic helpers for reading the claims stored by the
//! authorization layer from gRPC request handlers.

use crate::JwtClaims;
use tonic::{Request, Status};

/// Extension trait for accessing JWT claims from gRPC requests
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_jwt_propagation::JwtClaimsExt;
/// use tonic::{Request, Response, Status};
///
/// async fn download(request: Request<String>) -> Result<Response<()>, Status> {
///     let owner_name = "admin"; // From the file record
///     request.require_owner(owner_name)?;
///     Ok(Response::new(()))
/// }
/// ```
pub trait JwtClaimsExt {
    /// Claims for the caller, if the method was protected
    fn caller(&self) -> Option<&JwtClaims>;

    /// Claims for the caller, failing when none were stored
    ///
    /// ## Errors
    ///
    /// Returns `Status::unauthenticated` if the authorization layer did not
    /// store claims (public method, or layer not installed).
    fn jwt_claims(&self) -> Result<&JwtClaims, Status>;

    /// Require that the authenticated caller is the named owner
    ///
    /// ## Errors
    ///
    /// - `Status::unauthenticated` if no JWT claims found
    /// - `Status::permission_denied` if the caller is not the owner
    fn require_owner(&self, owner_name: &str) -> Result<&JwtClaims, Status>;
}

impl<T> JwtClaimsExt for Request<T> {
    fn caller(&self) -> Option<&JwtClaims> {
        self.extensions().get::<JwtClaims>()
    }

    fn jwt_claims(&self) -> Result<&JwtClaims, Status> {
        self.caller().ok_or_else(|| {
            Status::unauthenticated("No JWT claims found. Ensure AuthorizationLayer is installed.")
        })
    }

    fn require_owner(&self, owner_name: &str) -> Result<&JwtClaims, Status> {
        let claims = self.jwt_claims()?;

        if !claims.is_owner(owner_name) {
            return Err(Status::permission_denied(
                "You do not have permission to access this resource",
            ));
        }

        Ok(claims)
    }
}
