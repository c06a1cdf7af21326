/// File Service Library
///
/// Authenticated remote file storage over gRPC.
///
/// ## Modules
///
/// - `admission`: Per-operation concurrency ceilings
/// - `client`: gRPC client (login, upload, list, download)
/// - `config`: Server and client configuration
/// - `error`: Error types
/// - `grpc`: Protocol types and service implementations
/// - `security`: Password hashing, token re-exports
/// - `server`: Server assembly (authorization, health, reflection)
/// - `store`: User and file storage
pub mod admission;
pub mod client;
pub mod config;
pub mod error;
pub mod grpc;
pub mod security;
pub mod server;
pub mod store;

// Re-export commonly used types
pub use error::{FileServiceError, Result};
pub use server::FileServer;
