//! JWT Claims Structure and Authorization Helpers
//!
//! `JwtClaims` is what the authorization layer stores in request extensions
//! once a token has been verified, for access by service handlers.

use serde::{Deserialize, Serialize};

/// Claims of a verified identity token
///
/// ## Design Notes
///
/// - Fields are public for direct access (no getter boilerplate)
/// - Built only from claims that passed signature and expiry checks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Authenticated username (`sub` claim)
    pub subject: String,

    /// Role the token was issued with
    pub role: String,

    /// Issued at timestamp (Unix timestamp)
    pub iat: i64,

    /// Expiration timestamp (Unix timestamp)
    pub exp: i64,
}

impl JwtClaims {
    /// Check if the caller is the named owner (exact string match)
    ///
    /// ```rust
    /// # use grpc_jwt_propagation::JwtClaims;
    /// let claims = JwtClaims {
    ///     subject: "admin".to_string(),
    ///     role: "admin".to_string(),
    ///     iat: 0,
    ///     exp: 0,
    /// };
    ///
    /// assert!(claims.is_owner("admin"));
    /// assert!(!claims.is_owner("Admin"));
    /// ```
    pub fn is_owner(&self, owner_name: &str) -> bool {
        self.subject == owner_name
    }
}

/// Bridge from crypto-core's verified claims to the authorization layer
impl From<crypto_core::jwt::Claims> for JwtClaims {
    fn from(claims: crypto_core::jwt::Claims) -> Self {
        Self {
            subject: claims.sub,
            role: claims.role,
            iat: claims.iat,
            exp: claims.exp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claims(subject: &str, role: &str) -> JwtClaims {
        JwtClaims {
            subject: subject.to_string(),
            role: role.to_string(),
            iat: 0,
            exp: 0,
        }
    }

    #[test]
    fn test_from_verified_claims() {
        let crypto_claims = crypto_core::jwt::Claims {
            sub: "admin".to_string(),
            role: "admin".to_string(),
            iat: 1234567890,
            exp: 1234568790,
        };

        let jwt_claims = JwtClaims::from(crypto_claims);

        assert_eq!(jwt_claims.subject, "admin");
        assert_eq!(jwt_claims.role, "admin");
        assert_eq!(jwt_claims.iat, 1234567890);
        assert_eq!(jwt_claims.exp, 1234568790);
    }

    #[test]
    fn test_is_owner() {
        let claims = claims("alice", "user");

        assert!(claims.is_owner("alice"));
        assert!(!claims.is_owner("bob"));
        assert!(!claims.is_owner(""));
    }
}
