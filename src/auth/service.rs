/// Authentication Service
///
/// Orchestrates registration, login and refresh over the credential store,
/// the password hasher, the token codec and the token ledger.
///
/// Login:   credentials verified -> access + refresh issued -> ledger rotated
/// Refresh: subject extracted -> user revalidated -> access reissued -> ledger rotated
///
/// Ledger rotation (retire every valid entry, record the new one) is a single
/// atomic call on the ledger, so a user never ends up with two valid entries.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;
use uuid::Uuid;

use crate::auth::claims::TokenKind;
use crate::auth::jwt::TokenCodec;
use crate::auth::ledger::TokenLedger;
use crate::auth::password::PasswordHasher;
use crate::domain::{NewUser, RoleName, User, UserProfile};
use crate::error::{AppError, AuthError};
use crate::store::{CredentialStore, EMAIL_TAKEN, USERNAME_TAKEN, USER_NOT_FOUND};
use crate::upload_client::{ImageCategory, ImageUploader};
use crate::validators::{validate_email, validate_password, validate_username};

pub const REGISTERED_MESSAGE: &str = "Successfully registered!";

/// Registration input after the multipart body has been taken apart.
#[derive(Debug, Clone)]
pub struct Registration {
    pub username: String,
    pub email: String,
    pub password: String,
    pub image: Option<Vec<u8>>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginOutcome {
    pub access_token: String,
    pub refresh_token: String,
    #[serde(flatten)]
    pub profile: UserProfile,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshOutcome {
    pub access_token: String,
    pub refresh_token: String,
}

/// The authenticated caller of a protected route.
#[derive(Debug, Clone)]
pub struct Principal {
    pub user_id: Uuid,
    pub email: String,
    pub roles: Vec<RoleName>,
}

impl Principal {
    pub fn require_role(&self, role: RoleName) -> Result<(), AuthError> {
        if self.roles.contains(&role) {
            Ok(())
        } else {
            Err(AuthError::Forbidden)
        }
    }
}

/// Extract the token from an `Authorization: Bearer <token>` header value.
pub fn bearer_token(header: &str) -> Option<&str> {
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
}

pub struct AuthService {
    users: Arc<dyn CredentialStore>,
    ledger: Arc<dyn TokenLedger>,
    codec: TokenCodec,
    hasher: PasswordHasher,
    uploader: Arc<dyn ImageUploader>,
    admin_usernames: HashSet<String>,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        ledger: Arc<dyn TokenLedger>,
        codec: TokenCodec,
        hasher: PasswordHasher,
        uploader: Arc<dyn ImageUploader>,
        admin_usernames: impl IntoIterator<Item = String>,
    ) -> Self {
        Self {
            users,
            ledger,
            codec,
            hasher,
            uploader,
            admin_usernames: admin_usernames.into_iter().collect(),
        }
    }

    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    /// Create an account. Does not log the new user in.
    pub async fn register(&self, registration: Registration) -> Result<&'static str, AppError> {
        let username = validate_username(&registration.username)?;
        let email = validate_email(&registration.email)?;
        validate_password(&registration.password)?;

        if self.users.username_exists(&username).await? {
            return Err(AppError::DuplicateIdentity(USERNAME_TAKEN.to_string()));
        }
        if self.users.email_exists(&email).await? {
            return Err(AppError::DuplicateIdentity(EMAIL_TAKEN.to_string()));
        }

        let password_hash = self.hasher.hash(&registration.password)?;
        let roles = self.roles_for(&username);

        // Uploaded before the insert so a failed upload leaves no account. An
        // insert that loses a concurrent identity race orphans the remote image.
        let image_url = match registration.image {
            Some(bytes) => Some(self.uploader.upload_image(bytes, ImageCategory::Users).await?),
            None => None,
        };

        // A concurrent registration can still win the race; the store reports
        // it as DuplicateIdentity through its unique constraints.
        let user = self
            .users
            .insert_user(NewUser {
                username,
                email,
                password_hash,
                image_url,
                roles,
            })
            .await?;

        tracing::info!(
            user_id = %user.id,
            admin = user.has_role(RoleName::Admin),
            "User registered successfully"
        );

        Ok(REGISTERED_MESSAGE)
    }

    fn roles_for(&self, username: &str) -> Vec<RoleName> {
        let mut roles = vec![RoleName::User];
        if self.admin_usernames.contains(username) {
            roles.push(RoleName::Admin);
        }
        roles
    }

    /// Check an email/password pair. Unknown email and wrong password are the
    /// same failure.
    pub async fn verify_credentials(&self, email: &str, password: &str) -> Result<User, AppError> {
        let user = self
            .users
            .find_user_by_email(email.trim())
            .await?
            .ok_or(AuthError::BadCredentials)?;

        if !self.hasher.verify(password, &user.password_hash) {
            return Err(AuthError::BadCredentials.into());
        }

        Ok(user)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AppError> {
        let user = self.verify_credentials(email, password).await?;

        let access_token = self.codec.issue_access_token(&user.email, user.role_names())?;
        let refresh_token = self.codec.issue_refresh_token(&user.email, user.role_names())?;

        self.ledger.revoke_all_and_record(user.id, &refresh_token).await?;

        tracing::info!(user_id = %user.id, "User logged in successfully");

        Ok(LoginOutcome {
            access_token,
            refresh_token,
            profile: user.profile(),
        })
    }

    /// Reissue an access token from the refresh token in an `Authorization`
    /// header. `Ok(None)` when no bearer header was presented.
    ///
    /// The refresh token itself is not rotated: the caller gets back the one it
    /// presented, and the new access token becomes the ledger's current entry.
    pub async fn refresh(&self, authorization: Option<&str>) -> Result<Option<RefreshOutcome>, AppError> {
        let Some(refresh_token) = authorization.and_then(bearer_token) else {
            return Ok(None);
        };

        // An undecodable token has no subject to look up.
        let subject = match self.codec.extract_subject(refresh_token) {
            Ok(subject) => subject,
            Err(_) => {
                tracing::warn!("Refresh token could not be decoded");
                return Err(AppError::NotFound(USER_NOT_FOUND.to_string()));
            }
        };

        let user = self
            .users
            .find_user_by_email(&subject)
            .await?
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;

        if !self.codec.is_valid_for(refresh_token, &user.email, TokenKind::Refresh) {
            return Err(AuthError::TokenRefresh {
                token: refresh_token.to_string(),
                reason: "Refresh token is expired or invalid".to_string(),
            }
            .into());
        }

        let access_token = self.codec.issue_access_token(&user.email, user.role_names())?;
        self.ledger.revoke_all_and_record(user.id, &access_token).await?;

        tracing::info!(user_id = %user.id, "Token refreshed successfully");

        Ok(Some(RefreshOutcome {
            access_token,
            refresh_token: refresh_token.to_string(),
        }))
    }

    /// Authenticate an access token for a protected route.
    ///
    /// Stateless checks first; then a ledger entry for the token, if there is
    /// one, must not be flagged expired.
    ///
    /// Only access tokens issued by `refresh` are recorded in the ledger. Those
    /// issued by `login` have no entry, so they pass until their `exp` even
    /// after a later login or refresh has revoked the user's other tokens.
    pub async fn authenticate_access(&self, token: &str) -> Result<Principal, AppError> {
        let claims = self.codec.authenticate(token, TokenKind::Access)?;

        if let Some(entry) = self.ledger.find_by_token_string(token).await? {
            if entry.expired {
                return Err(AuthError::InvalidToken.into());
            }
        }

        let user = self
            .users
            .find_user_by_email(&claims.sub)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        Ok(Principal {
            user_id: user.id,
            email: user.email,
            roles: user.roles,
        })
    }

    pub async fn current_profile(&self, principal: &Principal) -> Result<UserProfile, AppError> {
        self.users
            .find_user_by_id(principal.user_id)
            .await?
            .map(|user| user.profile())
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))
    }
}
