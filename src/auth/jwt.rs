/// Token codec
///
/// Signs and verifies self-describing bearer tokens (HS256 JWTs). Pure with
/// respect to the configured secret: no storage is consulted here.
///
/// Signature checks and expiry checks are kept apart on purpose so callers can
/// tell a forged/malformed token from one that merely ran out of time.

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};

use crate::auth::claims::{Claims, TokenKind};
use crate::configuration::JwtSettings;
use crate::error::{AppError, AuthError};

#[derive(Clone)]
pub struct TokenCodec {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    settings: JwtSettings,
}

impl TokenCodec {
    pub fn new(settings: &JwtSettings) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[&settings.issuer]);
        // Expiry is checked explicitly, see `is_valid`.
        validation.validate_exp = false;

        Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            validation,
            settings: settings.clone(),
        }
    }

    pub fn issue_access_token(&self, subject: &str, roles: Vec<String>) -> Result<String, AppError> {
        self.issue(subject, roles, TokenKind::Access, self.settings.access_token_expiry)
    }

    pub fn issue_refresh_token(&self, subject: &str, roles: Vec<String>) -> Result<String, AppError> {
        self.issue(subject, roles, TokenKind::Refresh, self.settings.refresh_token_expiry)
    }

    /// Sign a token with an explicit lifetime. A TTL of zero or less yields a
    /// token that is already expired.
    pub fn issue(
        &self,
        subject: &str,
        roles: Vec<String>,
        kind: TokenKind,
        ttl_seconds: i64,
    ) -> Result<String, AppError> {
        let claims = Claims::new(
            subject.to_string(),
            roles,
            kind,
            ttl_seconds,
            self.settings.issuer.clone(),
        );

        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AppError::Internal(format!("Token generation failed: {}", e)))
    }

    /// Verify the signature and issuer and return the claims. Does not reject
    /// tokens whose expiry is in the past.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| {
                tracing::debug!("JWT decode error: {}", e);
                AuthError::InvalidToken
            })
    }

    pub fn extract_subject(&self, token: &str) -> Result<String, AuthError> {
        self.decode(token).map(|claims| claims.sub)
    }

    /// True iff the signature verifies, the subject matches and the token has
    /// not expired.
    pub fn is_valid(&self, token: &str, expected_subject: &str) -> bool {
        match self.decode(token) {
            Ok(claims) => claims.sub == expected_subject && !claims.is_expired(),
            Err(_) => false,
        }
    }

    /// `is_valid` plus a check on the token kind.
    pub fn is_valid_for(&self, token: &str, expected_subject: &str, kind: TokenKind) -> bool {
        match self.decode(token) {
            Ok(claims) => {
                claims.kind == kind && claims.sub == expected_subject && !claims.is_expired()
            }
            Err(_) => false,
        }
    }

    /// Full stateless check for a presented bearer token of the given kind.
    pub fn authenticate(&self, token: &str, kind: TokenKind) -> Result<Claims, AuthError> {
        let claims = self.decode(token)?;
        if claims.kind != kind || claims.is_expired() {
            return Err(AuthError::InvalidToken);
        }
        Ok(claims)
    }
}
