/// Token Ledger
///
/// Server-side record of issued tokens so a self-verifying JWT can still be
/// invalidated. Each entry belongs to exactly one user and carries two flags,
/// `expired` and `revoked`, which the service only ever flips together.
///
/// Tokens are stored as SHA-256 digests, never in plaintext. Digests are unique
/// across the ledger.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::error::AppError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub token_hash: String,
    pub expired: bool,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl TokenEntry {
    pub fn new(user_id: Uuid, token: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            token_hash: hash_token(token),
            expired: false,
            revoked: false,
            created_at: Utc::now(),
        }
    }

    /// Both flags clear.
    pub fn is_valid(&self) -> bool {
        !self.expired && !self.revoked
    }

    /// Both flags set. `list_valid_tokens` returns every entry that is not retired.
    pub fn is_retired(&self) -> bool {
        self.expired && self.revoked
    }

    pub fn retire(&mut self) {
        self.expired = true;
        self.revoked = true;
    }

    pub fn matches(&self, token: &str) -> bool {
        self.token_hash == hash_token(token)
    }
}

/// Hash a token string using SHA-256 (hex encoded).
pub fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Persistence contract for the ledger.
///
/// Only the authentication service writes through this trait.
#[async_trait]
pub trait TokenLedger: Send + Sync {
    /// Insert a fresh entry with both flags cleared.
    async fn record_issued_token(&self, user_id: Uuid, token: &str) -> Result<TokenEntry, AppError>;

    /// Entries for the user that are not both expired and revoked.
    async fn list_valid_tokens(&self, user_id: Uuid) -> Result<Vec<TokenEntry>, AppError>;

    /// Retire every entry `list_valid_tokens` would return. Returns how many
    /// entries changed; zero is not an error.
    async fn revoke_all_valid_tokens(&self, user_id: Uuid) -> Result<u64, AppError>;

    async fn find_by_token_string(&self, token: &str) -> Result<Option<TokenEntry>, AppError>;

    /// Retire all valid entries for the user and record `token`, as one atomic
    /// unit serialized per user. On failure nothing changes.
    async fn revoke_all_and_record(&self, user_id: Uuid, token: &str) -> Result<TokenEntry, AppError>;
}
