//! Client-side JWT Interceptor
//!
//! Injects the current access token into outgoing calls to protected
//! methods, and keeps that token fresh by logging in again on a fixed
//! interval in a background task.

use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tonic::metadata::AsciiMetadataValue;
use tonic::service::Interceptor;
use tonic::{GrpcMethod, Request, Status};
use tracing::{debug, warn};

/// Default interval between background token refreshes
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(30);

/// Anything that can obtain a fresh access token (typically a Login RPC)
#[async_trait]
pub trait TokenSource: Send + Sync + 'static {
    async fn fetch_token(&self) -> Result<String, Status>;
}

/// Aborts the refresh loop once the last interceptor clone is gone
#[derive(Debug)]
struct RefreshTask(JoinHandle<()>);

impl Drop for RefreshTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Client-side interceptor that injects `authorization: Bearer <token>`
///
/// ## Design
///
/// - **Pre-formatted slot**: the header value is built once per token, and
///   a refresh swaps the whole value under a write lock
/// - **Method-aware**: only methods in the protected set carry the token;
///   Login and other public calls go out untouched
/// - **Cloneable**: clones share the slot and the refresh task
///
/// ## Usage
///
/// ```rust,no_run
/// use grpc_jwt_propagation::{JwtClientInterceptor, TokenSource, DEFAULT_REFRESH_INTERVAL};
/// use tonic::Status;
///
/// struct StaticLogin;
///
/// #[async_trait::async_trait]
/// impl TokenSource for StaticLogin {
///     async fn fetch_token(&self) -> Result<String, Status> {
///         Ok("eyJhbGc...".to_string())
///     }
/// }
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let interceptor = JwtClientInterceptor::start(
///     StaticLogin,
///     ["/file.service.FileService/Upload"],
///     DEFAULT_REFRESH_INTERVAL,
/// )
/// .await?;
///
/// let channel = tonic::transport::Channel::from_static("http://[::1]:8080")
///     .connect()
///     .await?;
/// // let client = FileServiceClient::with_interceptor(channel, interceptor);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct JwtClientInterceptor {
    auth_header: Arc<RwLock<AsciiMetadataValue>>,
    protected_methods: Arc<HashSet<String>>,
    refresh_task: Option<Arc<RefreshTask>>,
}

impl JwtClientInterceptor {
    /// Create an interceptor with a fixed token and no refresh
    ///
    /// ## Errors
    ///
    /// Returns `Status::internal` if the token is not valid header ASCII.
    pub fn new<I, M>(jwt_token: &str, protected_methods: I) -> Result<Self, Status>
    where
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        Ok(Self {
            auth_header: Arc::new(RwLock::new(bearer_value(jwt_token)?)),
            protected_methods: Arc::new(protected_methods.into_iter().map(Into::into).collect()),
            refresh_task: None,
        })
    }

    /// Log in once, then keep the token fresh every `refresh_interval`
    ///
    /// The first login happens before this returns, so its failure is the
    /// caller's failure. Later refresh failures are logged and the previous
    /// token stays in place.
    pub async fn start<T, I, M>(
        source: T,
        protected_methods: I,
        refresh_interval: Duration,
    ) -> Result<Self, Status>
    where
        T: TokenSource,
        I: IntoIterator<Item = M>,
        M: Into<String>,
    {
        if refresh_interval.is_zero() {
            return Err(Status::invalid_argument(
                "token refresh interval must be positive",
            ));
        }

        let token = source.fetch_token().await?;
        let mut interceptor = Self::new(&token, protected_methods)?;

        let slot = Arc::clone(&interceptor.auth_header);
        let handle = tokio::spawn(async move {
            let mut ticker =
                tokio::time::interval_at(Instant::now() + refresh_interval, refresh_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;

                match source
                    .fetch_token()
                    .await
                    .and_then(|token| bearer_value(&token))
                {
                    Ok(value) => {
                        replace_slot(&slot, value);
                        debug!("Access token refreshed");
                    }
                    Err(status) => {
                        warn!(
                            code = ?status.code(),
                            error = %status.message(),
                            "Token refresh failed, keeping previous token"
                        );
                    }
                }
            }
        });

        interceptor.refresh_task = Some(Arc::new(RefreshTask(handle)));
        Ok(interceptor)
    }

    /// Current `Bearer <token>` header value
    pub fn current_header(&self) -> AsciiMetadataValue {
        match self.auth_header.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn is_protected(&self, method: &GrpcMethod) -> bool {
        let path = format!("/{}/{}", method.service(), method.method());
        self.protected_methods.contains(&path)
    }
}

impl Interceptor for JwtClientInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let protected = request
            .extensions()
            .get::<GrpcMethod>()
            .is_some_and(|method| self.is_protected(method));

        if protected {
            request
                .metadata_mut()
                .insert("authorization", self.current_header());
        }

        Ok(request)
    }
}

fn bearer_value(token: &str) -> Result<AsciiMetadataValue, Status> {
    AsciiMetadataValue::try_from(format!("Bearer {}", token))
        .map_err(|_| Status::internal("access token contains invalid header characters"))
}

fn replace_slot(slot: &RwLock<AsciiMetadataValue>, value: AsciiMetadataValue) {
    match slot.write() {
        Ok(mut guard) => *guard = value,
        Err(poisoned) => *poisoned.into_inner() = value,
    }
}
