/// Security module for authentication
///
/// - **crypto-core::jwt**: shared HS256 token authority
/// - **password**: Argon2id password hashing
pub use crypto_core::jwt::{Claims, TokenAuthority};

pub mod password;

pub use password::{hash_password, verify_password};
