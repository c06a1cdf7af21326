//! Server-side Authorization Layer
//!
//! A tower layer that sits in front of every gRPC handler, unary and
//! streaming alike. For each call it looks up the method path in a
//! [`MethodPolicy`]; protected methods must carry a valid bearer token whose
//! role is allowed for that method. Verified claims are stored in request
//! extensions for handler access.

use crate::claims::JwtClaims;
use crypto_core::jwt::{JwtError, TokenAuthority};
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::codegen::http::{HeaderMap, Request as HttpRequest, Response as HttpResponse};
use tonic::Status;
use tower::{Layer, Service};
use tracing::{debug, warn};

const AUTHORIZATION_HEADER: &str = "authorization";
const BEARER_PREFIX: &str = "Bearer ";

// ============================================================================
// Method Policy
// ============================================================================

/// Fully-qualified method path (`/package.Service/Method`) → allowed roles
///
/// Methods absent from the policy are public.
#[derive(Debug, Clone, Default)]
pub struct MethodPolicy {
    rules: HashMap<String, HashSet<String>>,
}

impl MethodPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Protect `method`, allowing callers holding any of `roles`
    ///
    /// Calling this again for the same method adds to its role set.
    pub fn allow<I, R>(mut self, method: impl Into<String>, roles: I) -> Self
    where
        I: IntoIterator<Item = R>,
        R: Into<String>,
    {
        self.rules
            .entry(method.into())
            .or_default()
            .extend(roles.into_iter().map(Into::into));
        self
    }

    pub fn roles_for(&self, method: &str) -> Option<&HashSet<String>> {
        self.rules.get(method)
    }

    pub fn is_protected(&self, method: &str) -> bool {
        self.rules.contains_key(method)
    }

    /// Paths of every protected method, for configuring clients
    pub fn protected_methods(&self) -> HashSet<String> {
        self.rules.keys().cloned().collect()
    }
}

// ============================================================================
// Authorizer
// ============================================================================

/// The per-call decision, independent of the tower plumbing
#[derive(Debug, Clone)]
pub struct Authorizer {
    authority: Arc<TokenAuthority>,
    policy: Arc<MethodPolicy>,
}

impl Authorizer {
    pub fn new(authority: Arc<TokenAuthority>, policy: MethodPolicy) -> Self {
        Self {
            authority,
            policy: Arc::new(policy),
        }
    }

    pub fn policy(&self) -> &MethodPolicy {
        &self.policy
    }

    /// Decide whether a call to `method` carrying `headers` may proceed
    ///
    /// ## Returns
    ///
    /// - `Ok(None)` for public methods (no token inspected)
    /// - `Ok(Some(claims))` for protected methods with an allowed caller
    ///
    /// ## Errors
    ///
    /// - `Status::unauthenticated` if the header is missing, is not
    ///   `Bearer <token>`, or the token fails verification
    /// - `Status::permission_denied` if the token's role is not allowed
    pub fn authorize(&self, method: &str, headers: &HeaderMap) -> Result<Option<JwtClaims>, Status> {
        let Some(allowed_roles) = self.policy.roles_for(method) else {
            return Ok(None);
        };

        let auth_header = headers.get(AUTHORIZATION_HEADER).ok_or_else(|| {
            warn!(method, "Missing authorization header");
            Status::unauthenticated("authorization token is not provided")
        })?;

        let auth_str = auth_header.to_str().map_err(|e| {
            warn!(method, error = %e, "Invalid authorization header encoding");
            Status::unauthenticated("invalid authorization header")
        })?;

        let token = auth_str.strip_prefix(BEARER_PREFIX).ok_or_else(|| {
            warn!(method, "Invalid authorization format (expected 'Bearer <token>')");
            Status::unauthenticated("invalid authorization format")
        })?;

        let claims = self.authority.verify(token).map_err(|e| {
            warn!(method, error = %e, "JWT validation failed");
            match e {
                JwtError::Expired => Status::unauthenticated("access token is expired"),
                _ => Status::unauthenticated("access token is invalid"),
            }
        })?;

        if claims.sub.is_empty() {
            warn!(method, "Token carries an empty subject");
            return Err(Status::unauthenticated("access token is invalid"));
        }

        if !allowed_roles.contains(&claims.role) {
            warn!(method, subject = %claims.sub, role = %claims.role, "Role not permitted");
            return Err(Status::permission_denied(
                "no permission to access this RPC",
            ));
        }

        debug!(method, subject = %claims.sub, "Caller authorized");

        Ok(Some(JwtClaims::from(claims)))
    }
}

// ============================================================================
// Tower Layer
// ============================================================================

/// Layer installed with `Server::builder().layer(..)`
///
/// ## Usage
///
/// ```rust,no_run
/// use std::sync::Arc;
/// use chrono::Duration;
/// use crypto_core::jwt::TokenAuthority;
/// use grpc_jwt_propagation::{AuthorizationLayer, MethodPolicy};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let authority = Arc::new(TokenAuthority::new(b"secret", Duration::minutes(15))?);
/// let policy = MethodPolicy::new()
///     .allow("/file.service.FileService/Upload", ["admin"]);
///
/// let _builder = tonic::transport::Server::builder()
///     .layer(AuthorizationLayer::new(authority, policy));
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AuthorizationLayer {
    authorizer: Authorizer,
}

impl AuthorizationLayer {
    pub fn new(authority: Arc<TokenAuthority>, policy: MethodPolicy) -> Self {
        Self {
            authorizer: Authorizer::new(authority, policy),
        }
    }

    pub fn authorizer(&self) -> &Authorizer {
        &self.authorizer
    }
}

impl<S> Layer<S> for AuthorizationLayer {
    type Service = AuthorizationService<S>;

    fn layer(&self, service: S) -> Self::Service {
        AuthorizationService {
            inner: service,
            authorizer: self.authorizer.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AuthorizationService<S> {
    inner: S,
    authorizer: Authorizer,
}

impl<S, ReqBody> Service<HttpRequest<ReqBody>> for AuthorizationService<S>
where
    S: Service<HttpRequest<ReqBody>, Response = HttpResponse<BoxBody>> + Clone + Send + 'static,
    S::Future: Send + 'static,
    ReqBody: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, mut req: HttpRequest<ReqBody>) -> Self::Future {
        // The readied service is the one that must handle this request.
        let clone = self.inner.clone();
        let mut inner = std::mem::replace(&mut self.inner, clone);

        match self.authorizer.authorize(req.uri().path(), req.headers()) {
            Ok(claims) => {
                if let Some(claims) = claims {
                    req.extensions_mut().insert(claims);
                }
                Box::pin(inner.call(req))
            }
            Err(status) => Box::pin(async move { Ok(status.into_http()) }),
        }
    }
}
