/// Domain records shared by the credential store, the token ledger and the
/// authentication service.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::ValidationError;

/// Closed set of role labels. The strings are opaque to this service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RoleName {
    User,
    Admin,
}

impl RoleName {
    pub const ALL: [RoleName; 2] = [RoleName::User, RoleName::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            RoleName::User => "ROLE_USER",
            RoleName::Admin => "ROLE_ADMIN",
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RoleName {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ROLE_USER" => Ok(RoleName::User),
            "ROLE_ADMIN" => Ok(RoleName::Admin),
            _ => Err(ValidationError::Rejected(
                "Role can only be 'ROLE_USER' or 'ROLE_ADMIN'".to_string(),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    pub id: Uuid,
    pub name: RoleName,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub image_url: Option<String>,
    pub roles: Vec<RoleName>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn has_role(&self, role: RoleName) -> bool {
        self.roles.contains(&role)
    }

    pub fn role_names(&self) -> Vec<String> {
        self.roles.iter().map(|r| r.as_str().to_string()).collect()
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            image_url: self.image_url.clone(),
            roles: self.role_names(),
        }
    }
}

/// A user about to be persisted. The password is already hashed.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub image_url: Option<String>,
    pub roles: Vec<RoleName>,
}

/// Public projection of a user, safe to hand to clients.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub image_url: Option<String>,
    pub roles: Vec<String>,
}
