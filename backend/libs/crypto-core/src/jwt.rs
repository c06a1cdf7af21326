//! Token authority for the file service
//!
//! Issues and verifies signed, time-limited identity tokens carrying
//! `{sub, role, iat, exp}`.
//!
//! ## Security Design
//!
//! - **HS256 only**: the signing secret is process-wide configuration loaded
//!   once at startup. Rotating it invalidates every outstanding token.
//! - **Stateless**: verification is a pure function of the token and the
//!   current time. There is no session table, so a token cannot be revoked
//!   before it expires; the short lifetime bounds exposure.
//! - **Signed claims only**: every field read from a token is covered by the
//!   signature.
//!
//! ## Usage
//!
//! ```rust
//! use chrono::Duration;
//! use crypto_core::jwt::{TokenAuthority, DEFAULT_TOKEN_LIFETIME_SECS};
//!
//! let lifetime = Duration::seconds(DEFAULT_TOKEN_LIFETIME_SECS);
//! let authority = TokenAuthority::new(b"process-wide-secret", lifetime)
//!     .expect("secret must not be empty");
//!
//! let token = authority.issue("admin", "admin").expect("subject is not empty");
//! let claims = authority.verify(&token).expect("token is fresh");
//! assert_eq!(claims.role, "admin");
//! ```

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

// ============================================================================
// Constants
// ============================================================================

/// Default token lifetime in seconds (15 minutes)
pub const DEFAULT_TOKEN_LIFETIME_SECS: i64 = 15 * 60;

const JWT_ALGORITHM: Algorithm = Algorithm::HS256;

// ============================================================================
// Data Structures
// ============================================================================

/// Identity token claims
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// Subject (username)
    pub sub: String,
    /// Role used for per-method authorization
    pub role: String,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum JwtError {
    #[error("signing secret must not be empty")]
    EmptySecret,

    #[error("token subject must not be empty")]
    EmptySubject,

    #[error("token signature is invalid")]
    InvalidSignature,

    #[error("token is malformed: {0}")]
    Malformed(String),

    #[error("token expired")]
    Expired,

    #[error("failed to sign token: {0}")]
    Signing(String),
}

// ============================================================================
// Token Authority
// ============================================================================

#[derive(Clone)]
pub struct TokenAuthority {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    lifetime: Duration,
}

impl std::fmt::Debug for TokenAuthority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenAuthority")
            .field("lifetime", &self.lifetime)
            .finish_non_exhaustive()
    }
}

impl TokenAuthority {
    /// Create an authority from the process-wide signing secret
    ///
    /// ## Errors
    ///
    /// Returns `JwtError::EmptySecret` if `secret` is empty.
    pub fn new(secret: &[u8], lifetime: Duration) -> Result<Self, JwtError> {
        if secret.is_empty() {
            return Err(JwtError::EmptySecret);
        }

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            lifetime,
        })
    }

    pub fn lifetime(&self) -> Duration {
        self.lifetime
    }

    /// Issue a token for `subject` with `role`, expiring `lifetime` from now
    pub fn issue(&self, subject: &str, role: &str) -> Result<String, JwtError> {
        self.issue_at(subject, role, Utc::now())
    }

    /// Issue a token as if the current time were `now`
    pub fn issue_at(
        &self,
        subject: &str,
        role: &str,
        now: DateTime<Utc>,
    ) -> Result<String, JwtError> {
        if subject.is_empty() {
            return Err(JwtError::EmptySubject);
        }

        let claims = Claims {
            sub: subject.to_string(),
            role: role.to_string(),
            iat: now.timestamp(),
            exp: (now + self.lifetime).timestamp(),
        };

        encode(&Header::new(JWT_ALGORITHM), &claims, &self.encoding_key)
            .map_err(|e| JwtError::Signing(e.to_string()))
    }

    /// Verify a token against the current time
    ///
    /// ## Errors
    ///
    /// - `InvalidSignature` if the signature does not match
    /// - `Malformed` if the token cannot be decoded or misses `sub`/`exp`
    /// - `Expired` if the current time is at or past `exp`
    pub fn verify(&self, token: &str) -> Result<Claims, JwtError> {
        self.verify_at(token, Utc::now())
    }

    /// Verify a token as if the current time were `now`
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, JwtError> {
        // Expiry is checked below against the injected clock, with no leeway.
        let mut validation = Validation::new(JWT_ALGORITHM);
        validation.validate_exp = false;
        validation.leeway = 0;
        validation.set_required_spec_claims(&["exp", "sub"]);

        let token_data =
            decode::<Claims>(token, &self.decoding_key, &validation).map_err(|e| {
                match e.kind() {
                    ErrorKind::InvalidSignature => JwtError::InvalidSignature,
                    _ => JwtError::Malformed(e.to_string()),
                }
            })?;

        let claims = token_data.claims;
        if now.timestamp() >= claims.exp {
            debug!(subject = %claims.sub, exp = claims.exp, "rejecting expired token");
            return Err(JwtError::Expired);
        }

        Ok(claims)
    }
}

// ============================================================================
// Tests
// ============================================================================
