/// JWT Claims structure
///
/// Payload carried by both access and refresh tokens: the subject identity
/// (the user's email), the role labels, the token kind and the standard
/// RFC 7519 claims.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Subject (user email)
    pub sub: String,
    /// Role labels, consumed by downstream route authorization
    #[serde(default)]
    pub roles: Vec<String>,
    pub kind: TokenKind,
    /// Expiration time (Unix timestamp)
    pub exp: i64,
    /// Issued at (Unix timestamp)
    pub iat: i64,
    pub iss: String,
    /// Unique token id, keeps two tokens minted in the same second distinct
    pub jti: String,
}

impl Claims {
    /// Create new claims expiring `expiry_seconds` from now.
    pub fn new(
        subject: String,
        roles: Vec<String>,
        kind: TokenKind,
        expiry_seconds: i64,
        issuer: String,
    ) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            sub: subject,
            roles,
            kind,
            exp: now + expiry_seconds,
            iat: now,
            iss: issuer,
            jti: Uuid::new_v4().to_string(),
        }
    }

    /// Expired once `exp` is not strictly in the future.
    pub fn is_expired(&self) -> bool {
        let now = chrono::Utc::now().timestamp();
        self.exp <= now
    }
}
