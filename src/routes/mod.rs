mod auth;
mod health_check;
mod multipart;
mod users;

pub use auth::{login, me, refresh_token, register, LoginRequest, MessageResponse, RegisterRequest};
pub use health_check::health_check;
pub use multipart::MAX_IMAGE_BYTES;
pub use users::{delete_user, grant_role, update_password, update_profile, withdraw_role};
