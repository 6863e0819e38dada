/// Startup seeding
///
/// Makes sure both role rows exist and, when configured, that the seed
/// administrator account is present. Safe to run on every start.

use crate::auth::PasswordHasher;
use crate::configuration::SeedAdminSettings;
use crate::domain::{NewUser, RoleName};
use crate::error::AppError;
use crate::store::CredentialStore;
use crate::validators::{validate_email, validate_password, validate_username};

pub async fn seed(
    users: &dyn CredentialStore,
    hasher: &PasswordHasher,
    seed_admin: Option<&SeedAdminSettings>,
) -> Result<(), AppError> {
    for role in RoleName::ALL {
        users.find_or_create_role(role).await?;
    }

    let Some(admin) = seed_admin else {
        return Ok(());
    };

    let username = validate_username(&admin.username)?;
    let email = validate_email(&admin.email)?;
    validate_password(&admin.password)?;

    if users.username_exists(&username).await? || users.email_exists(&email).await? {
        tracing::debug!(username = %username, "Seed administrator already present");
        return Ok(());
    }

    let user = users
        .insert_user(NewUser {
            username,
            email,
            password_hash: hasher.hash(&admin.password)?,
            image_url: None,
            roles: vec![RoleName::User, RoleName::Admin],
        })
        .await?;

    tracing::info!(user_id = %user.id, "Seed administrator created");
    Ok(())
}
