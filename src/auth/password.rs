/// Password Hashing and Verification
///
/// bcrypt hashing with a configurable work factor. Verification is delegated to
/// bcrypt, which compares digests in constant time.

use bcrypt::{hash, verify};

use crate::error::AppError;

/// Work-factor bounds accepted by bcrypt.
pub const MIN_BCRYPT_COST: u32 = 4;
pub const MAX_BCRYPT_COST: u32 = 31;

#[derive(Debug, Clone, Copy)]
pub struct PasswordHasher {
    cost: u32,
}

impl PasswordHasher {
    pub fn new(cost: u32) -> Self {
        Self { cost }
    }

    /// Hash a plaintext password.
    pub fn hash(&self, password: &str) -> Result<String, AppError> {
        hash(password, self.cost)
            .map_err(|e| AppError::Internal(format!("Password hashing failed: {}", e)))
    }

    /// Check a plaintext password against a stored hash.
    ///
    /// A malformed stored hash counts as a mismatch rather than an error so the
    /// caller cannot distinguish it from a wrong password.
    pub fn verify(&self, password: &str, password_hash: &str) -> bool {
        match verify(password, password_hash) {
            Ok(matches) => matches,
            Err(e) => {
                tracing::error!("Password verification failed: {}", e);
                false
            }
        }
    }
}

impl Default for PasswordHasher {
    fn default() -> Self {
        Self::new(bcrypt::DEFAULT_COST)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hasher() -> PasswordHasher {
        PasswordHasher::new(MIN_BCRYPT_COST)
    }

    #[test]
    fn test_min_cost_is_usable() {
        let hasher = PasswordHasher::new(MIN_BCRYPT_COST);
        let hash = hasher.hash("pw123").unwrap();
        // bcrypt encodes the cost as two digits after the version.
        assert!(hash.contains("$04$"));
    }

    #[test]
    fn test_hash_password() {
        let hash = hasher().hash("pw123").expect("Failed to hash password");

        assert_ne!("pw123", hash);
        assert!(hash.starts_with("$2"));
    }

    #[test]
    fn test_verify_password() {
        let hasher = hasher();
        let hash = hasher.hash("pw123").unwrap();
        assert!(hasher.verify("pw123", &hash));
    }

    #[test]
    fn test_verify_wrong_password() {
        let hasher = hasher();
        let hash = hasher.hash("pw123").unwrap();
        assert!(!hasher.verify("pw124", &hash));
    }

    #[test]
    fn test_malformed_hash_is_mismatch() {
        assert!(!hasher().verify("pw123", "not-a-bcrypt-hash"));
    }

    #[test]
    fn test_same_password_different_salts() {
        let hasher = hasher();
        assert_ne!(hasher.hash("pw123").unwrap(), hasher.hash("pw123").unwrap());
    }
}
