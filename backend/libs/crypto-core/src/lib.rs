//! Shared cryptographic primitives for the file service.
//!
//! Currently this is the token authority used to issue and verify the
//! short-lived identity tokens carried in the `authorization` metadata entry.

pub mod jwt;

pub use jwt::{Claims, JwtError, TokenAuthority, DEFAULT_TOKEN_LIFETIME_SECS};
