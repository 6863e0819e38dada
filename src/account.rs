/// Account maintenance for already-registered users
///
/// Role grants, password and profile changes, and deletion. Authentication
/// of the caller happens upstream; these operations trust the user id given.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::PasswordHasher;
use crate::domain::{RoleName, UserProfile};
use crate::error::{AppError, ValidationError};
use crate::store::{CredentialStore, USER_NOT_FOUND};
use crate::upload_client::{ImageCategory, ImageUploader};
use crate::validators::{validate_password, validate_username};

pub struct AccountService {
    users: Arc<dyn CredentialStore>,
    hasher: PasswordHasher,
    uploader: Arc<dyn ImageUploader>,
}

impl AccountService {
    pub fn new(
        users: Arc<dyn CredentialStore>,
        hasher: PasswordHasher,
        uploader: Arc<dyn ImageUploader>,
    ) -> Self {
        Self {
            users,
            hasher,
            uploader,
        }
    }

    /// Grant (`add`) or withdraw a role by its wire name.
    pub async fn update_user_role(
        &self,
        user_id: Uuid,
        role_name: &str,
        add: bool,
    ) -> Result<UserProfile, AppError> {
        let role: RoleName = role_name.parse()?;
        let user = self.users.set_user_role(user_id, role, add).await?;

        tracing::info!(user_id = %user_id, role = %role, granted = add, "User role updated");
        Ok(user.profile())
    }

    pub async fn update_password(
        &self,
        user_id: Uuid,
        current_password: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), AppError> {
        let user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;

        if !self.hasher.verify(current_password, &user.password_hash) {
            return Err(ValidationError::Rejected("Current password is incorrect".to_string()).into());
        }
        if new_password != confirmation {
            return Err(ValidationError::Rejected("Password confirmation does not match".to_string()).into());
        }
        validate_password(new_password)?;

        let password_hash = self.hasher.hash(new_password)?;
        self.users.update_password(user_id, &password_hash).await?;

        tracing::info!(user_id = %user_id, "Password updated");
        Ok(())
    }

    /// Change the username and, when new bytes are given, the profile image.
    /// Without new bytes the current image is kept.
    pub async fn update_profile(
        &self,
        user_id: Uuid,
        username: &str,
        image: Option<Vec<u8>>,
    ) -> Result<UserProfile, AppError> {
        let username = validate_username(username)?;

        let user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound(USER_NOT_FOUND.to_string()))?;

        let image_url = match image {
            Some(bytes) => Some(self.uploader.upload_image(bytes, ImageCategory::Users).await?),
            None => user.image_url,
        };

        let updated = self
            .users
            .update_profile(user_id, &username, image_url.as_deref())
            .await?;

        tracing::info!(user_id = %user_id, "Profile updated");
        Ok(updated.profile())
    }

    pub async fn delete_user(&self, user_id: Uuid) -> Result<(), AppError> {
        if !self.users.delete_user(user_id).await? {
            return Err(AppError::NotFound(USER_NOT_FOUND.to_string()));
        }

        tracing::info!(user_id = %user_id, "User deleted");
        Ok(())
    }
}
