/// Integration tests for the authorization layer and client interceptor
///
/// This test module covers:
/// - Layer rejection paths answered as trailers-only gRPC statuses
/// - Claims propagation into request extensions
/// - Public methods passing through untouched
/// - Client interceptor output accepted by the layer
use chrono::{Duration, Utc};
use crypto_core::jwt::TokenAuthority;
use grpc_jwt_propagation::{AuthorizationLayer, JwtClaims, JwtClientInterceptor, MethodPolicy};
use std::convert::Infallible;
use std::future::{ready, Ready};
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use tonic::body::BoxBody;
use tonic::codegen::http::{Request as HttpRequest, Response as HttpResponse};
use tonic::service::Interceptor;
use tonic::{Code, GrpcMethod, Status};
use tower::{Layer, Service, ServiceExt};

const UPLOAD: &str = "/file.service.FileService/Upload";
const LIST: &str = "/file.service.FileService/List";
const LOGIN: &str = "/file.service.AuthService/Login";

// ============================================================================
// Test Fixtures
// ============================================================================

/// Inner service that records the claims it was handed
#[derive(Clone, Default)]
struct RecordingService {
    seen: Arc<Mutex<Vec<Option<JwtClaims>>>>,
}

impl Service<HttpRequest<()>> for RecordingService {
    type Response = HttpResponse<BoxBody>;
    type Error = Infallible;
    type Future = Ready<Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: HttpRequest<()>) -> Self::Future {
        self.seen
            .lock()
            .unwrap()
            .push(req.extensions().get::<JwtClaims>().cloned());
        ready(Ok(HttpResponse::new(tonic::body::empty_body())))
    }
}

fn authority() -> Arc<TokenAuthority> {
    Arc::new(TokenAuthority::new(b"layer-test-secret", Duration::minutes(15)).unwrap())
}

fn policy() -> MethodPolicy {
    MethodPolicy::new()
        .allow(UPLOAD, ["admin"])
        .allow(LIST, ["admin", "user"])
}

fn request(path: &str, authorization: Option<&str>) -> HttpRequest<()> {
    let mut builder = HttpRequest::builder().uri(path);
    if let Some(value) = authorization {
        builder = builder.header("authorization", value);
    }
    builder.body(()).unwrap()
}

async fn call(
    authority: Arc<TokenAuthority>,
    inner: RecordingService,
    req: HttpRequest<()>,
) -> HttpResponse<BoxBody> {
    let service = AuthorizationLayer::new(authority, policy()).layer(inner);
    service.oneshot(req).await.unwrap()
}

fn status_of(response: &HttpResponse<BoxBody>) -> Option<Status> {
    Status::from_header_map(response.headers())
}

// ============================================================================
// Rejection Tests
// ============================================================================

#[tokio::test]
async fn test_protected_method_without_token_is_rejected() {
    let inner = RecordingService::default();

    let response = call(authority(), inner.clone(), request(UPLOAD, None)).await;

    let status = status_of(&response).expect("rejection should carry grpc-status");
    assert_eq!(status.code(), Code::Unauthenticated);
    assert!(inner.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_token_from_other_secret_is_rejected() {
    let foreign = TokenAuthority::new(b"other-secret", Duration::minutes(15)).unwrap();
    let token = foreign.issue("admin", "admin").unwrap();
    let inner = RecordingService::default();

    let response = call(
        authority(),
        inner.clone(),
        request(UPLOAD, Some(&format!("Bearer {}", token))),
    )
    .await;

    assert_eq!(status_of(&response).unwrap().code(), Code::Unauthenticated);
    assert!(inner.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_expired_token_is_rejected() {
    let authority = authority();
    let token = authority
        .issue_at("admin", "admin", Utc::now() - Duration::minutes(16))
        .unwrap();

    let response = call(
        Arc::clone(&authority),
        RecordingService::default(),
        request(UPLOAD, Some(&format!("Bearer {}", token))),
    )
    .await;

    assert_eq!(status_of(&response).unwrap().code(), Code::Unauthenticated);
}

#[tokio::test]
async fn test_role_outside_policy_is_permission_denied() {
    let authority = authority();
    let token = authority.issue("reader", "user").unwrap();
    let inner = RecordingService::default();

    let response = call(
        Arc::clone(&authority),
        inner.clone(),
        request(UPLOAD, Some(&format!("Bearer {}", token))),
    )
    .await;

    assert_eq!(status_of(&response).unwrap().code(), Code::PermissionDenied);
    assert!(inner.seen.lock().unwrap().is_empty());
}

// ============================================================================
// Pass-through Tests
// ============================================================================

#[tokio::test]
async fn test_allowed_caller_reaches_handler_with_claims() {
    let authority = authority();
    let token = authority.issue("reader", "user").unwrap();
    let inner = RecordingService::default();

    let response = call(
        Arc::clone(&authority),
        inner.clone(),
        request(LIST, Some(&format!("Bearer {}", token))),
    )
    .await;

    assert!(status_of(&response).is_none());
    let seen = inner.seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    let claims = seen[0].as_ref().expect("claims should be stored");
    assert_eq!(claims.subject, "reader");
    assert_eq!(claims.role, "user");
}

#[tokio::test]
async fn test_public_method_passes_without_claims() {
    let inner = RecordingService::default();

    let response = call(authority(), inner.clone(), request(LOGIN, None)).await;

    assert!(status_of(&response).is_none());
    assert_eq!(*inner.seen.lock().unwrap(), vec![None]);
}

// ============================================================================
// Client / Server Composition
// ============================================================================

#[tokio::test]
async fn test_client_interceptor_header_is_accepted_by_layer() {
    let authority = authority();
    let token = authority.issue("admin", "admin").unwrap();
    let mut interceptor = JwtClientInterceptor::new(&token, policy().protected_methods()).unwrap();

    let mut outgoing = tonic::Request::new(());
    outgoing
        .extensions_mut()
        .insert(GrpcMethod::new("file.service.FileService", "Upload"));
    let outgoing = interceptor.call(outgoing).unwrap();

    let header = outgoing
        .metadata()
        .get("authorization")
        .expect("protected call should carry a token")
        .to_str()
        .unwrap()
        .to_string();

    let inner = RecordingService::default();
    let response = call(
        Arc::clone(&authority),
        inner.clone(),
        request(UPLOAD, Some(&header)),
    )
    .await;

    assert!(status_of(&response).is_none());
    assert_eq!(inner.seen.lock().unwrap().len(), 1);
}
