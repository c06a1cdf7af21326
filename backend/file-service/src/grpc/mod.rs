/// gRPC server module for file-service
///
/// Exports:
/// - TransferService: Upload / Download / List implementation
/// - AuthServer: Login implementation
/// - proto: Generated protobuf types from file_service.proto and auth_service.proto
pub mod auth;
pub mod deadline;
pub mod transfer;

pub use auth::AuthServer;
pub use deadline::CallDeadline;
pub use transfer::{TransferLimits, TransferService};

use crate::store::FileRecord;
use grpc_jwt_propagation::MethodPolicy;

// Import generated protobuf types
pub mod proto {
    tonic::include_proto!("file.service");

    /// Encoded descriptor set for gRPC server reflection
    pub const FILE_DESCRIPTOR_SET: &[u8] =
        tonic::include_file_descriptor_set!("file_service_descriptor");
}

pub const UPLOAD_METHOD: &str = "/file.service.FileService/Upload";
pub const DOWNLOAD_METHOD: &str = "/file.service.FileService/Download";
pub const LIST_METHOD: &str = "/file.service.FileService/List";
pub const LOGIN_METHOD: &str = "/file.service.AuthService/Login";

/// Role that may call every file-transfer method
pub const ADMIN_ROLE: &str = "admin";

/// File-transfer methods that require a token; Login stays public
pub fn protected_methods() -> [&'static str; 3] {
    [UPLOAD_METHOD, DOWNLOAD_METHOD, LIST_METHOD]
}

/// Which roles may call which method
pub fn access_policy() -> MethodPolicy {
    protected_methods()
        .into_iter()
        .fold(MethodPolicy::new(), |policy, method| {
            policy.allow(method, [ADMIN_ROLE])
        })
}

impl From<&FileRecord> for proto::File {
    fn from(record: &FileRecord) -> Self {
        proto::File {
            id: record.id.to_string(),
            title: record.title.clone(),
            size_bytes: record.size_bytes,
            created_at: record.created_at.timestamp(),
            updated_at: record.updated_at.timestamp(),
            owner: Some(proto::Owner {
                id: record.owner.id.clone(),
                name: record.owner.name.clone(),
            }),
        }
    }
}
