/// Credential Store
///
/// Users, their role links and the role records themselves. Two backends:
/// Postgres through sqlx, and an in-process store for local runs and tests.
/// Each backend also implements the token ledger so that cascading user
/// deletion and per-user ledger serialization stay inside one storage unit.

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::{NewUser, Role, RoleName, User};
use crate::error::AppError;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

pub const USERNAME_TAKEN: &str = "Username already exists.";
pub const EMAIL_TAKEN: &str = "Email is already in use.";
pub(crate) const USER_NOT_FOUND: &str = "User not found.";

#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn username_exists(&self, username: &str) -> Result<bool, AppError>;

    async fn email_exists(&self, email: &str) -> Result<bool, AppError>;

    /// Persist a user with its roles, creating missing role records on the way.
    /// Fails with `DuplicateIdentity` if the username or email is taken.
    async fn insert_user(&self, user: NewUser) -> Result<User, AppError>;

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>, AppError>;

    async fn find_user_by_id(&self, user_id: Uuid) -> Result<Option<User>, AppError>;

    /// Look a role up by name, creating it the first time it is referenced.
    async fn find_or_create_role(&self, name: RoleName) -> Result<Role, AppError>;

    /// Grant (`granted = true`) or withdraw a role. `NotFound` if the user is missing.
    async fn set_user_role(&self, user_id: Uuid, role: RoleName, granted: bool) -> Result<User, AppError>;

    async fn update_password(&self, user_id: Uuid, password_hash: &str) -> Result<(), AppError>;

    /// Replace username and image reference. `DuplicateIdentity` if the username
    /// belongs to someone else.
    async fn update_profile(
        &self,
        user_id: Uuid,
        username: &str,
        image_url: Option<&str>,
    ) -> Result<User, AppError>;

    /// Remove the user together with its ledger rows and role links.
    /// Returns false if there was no such user.
    async fn delete_user(&self, user_id: Uuid) -> Result<bool, AppError>;
}
