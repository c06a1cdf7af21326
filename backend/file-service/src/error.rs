use thiserror::Error;
use tonic::{Code, Status};

pub type Result<T> = std::result::Result<T, FileServiceError>;

#[derive(Debug, Error)]
pub enum FileServiceError {
    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Username already exists: {0}")]
    UsernameAlreadyExists(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("File too large: {size} bytes exceeds limit of {limit} bytes")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Request cancelled")]
    Cancelled,

    #[error("Deadline exceeded")]
    DeadlineExceeded,

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("JWT error: {0}")]
    Jwt(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl FileServiceError {
    /// Convert to gRPC Status for wire protocol
    pub fn to_status(&self) -> Status {
        match self {
            FileServiceError::InvalidCredentials => {
                Status::new(Code::Unauthenticated, "Invalid username or password")
            }
            FileServiceError::UsernameAlreadyExists(name) => Status::new(
                Code::AlreadyExists,
                format!("Username already exists: {}", name),
            ),
            FileServiceError::FileNotFound(id) => Status::new(
                Code::NotFound,
                format!("File with id \"{}\" was not found", id),
            ),
            FileServiceError::InvalidArgument(msg) => Status::new(Code::InvalidArgument, msg.clone()),
            FileServiceError::FileTooLarge { limit, .. } => Status::new(
                Code::InvalidArgument,
                format!("The file size is too large. Expected <= {} bytes", limit),
            ),
            FileServiceError::PermissionDenied(msg) => {
                Status::new(Code::PermissionDenied, msg.clone())
            }
            FileServiceError::Cancelled => Status::new(Code::Cancelled, "Request is cancelled"),
            FileServiceError::DeadlineExceeded => {
                Status::new(Code::DeadlineExceeded, "Deadline is exceeded")
            }
            FileServiceError::Storage(_)
            | FileServiceError::PasswordHash(_)
            | FileServiceError::Jwt(_)
            | FileServiceError::Internal(_) => {
                // Don't leak internal details
                Status::new(Code::Internal, "Internal server error")
            }
        }
    }
}

impl From<std::io::Error> for FileServiceError {
    fn from(err: std::io::Error) -> Self {
        tracing::error!("Storage error: {}", err);
        FileServiceError::Storage(err.to_string())
    }
}

impl From<crypto_core::JwtError> for FileServiceError {
    fn from(err: crypto_core::JwtError) -> Self {
        tracing::error!("JWT error: {}", err);
        FileServiceError::Jwt(err.to_string())
    }
}

// gRPC Status conversion
impl From<FileServiceError> for Status {
    fn from(err: FileServiceError) -> Self {
        err.to_status()
    }
}
