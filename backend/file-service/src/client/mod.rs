/// gRPC client for the file service
///
/// - `auth`: Login wrapper used as the interceptor's token source
/// - `transfer`: upload / list / download with client-side admission control
pub mod auth;
pub mod transfer;

pub use auth::AuthClient;
pub use transfer::{DownloadedFile, RemoteFile, TransferClient, UploadedFile};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("RPC failed: {0}")]
    Status(#[from] tonic::Status),

    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Admission failed: {0}")]
    Admission(String),
}

impl ClientError {
    /// gRPC status code, when the failure came from the server
    pub fn code(&self) -> Option<tonic::Code> {
        match self {
            ClientError::Status(status) => Some(status.code()),
            _ => None,
        }
    }
}
