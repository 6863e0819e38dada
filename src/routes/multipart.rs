use actix_multipart::Multipart;
use futures::{StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;

use crate::error::{AppError, ValidationError};

/// Largest accepted image part.
pub const MAX_IMAGE_BYTES: usize = 5 * 1024 * 1024;
const MAX_USER_PART_BYTES: usize = 16 * 1024;

/// A multipart body with a JSON `user` part and an optional binary `image` part.
pub struct UserForm<T> {
    pub user: T,
    pub image: Option<Vec<u8>>,
}

pub async fn read_user_form<T: DeserializeOwned>(mut payload: Multipart) -> Result<UserForm<T>, AppError> {
    let mut user = None;
    let mut image = None;

    while let Some(mut field) = payload.try_next().await.map_err(malformed)? {
        let name = field.content_disposition().get_name().unwrap_or_default().to_string();
        let limit = match name.as_str() {
            "user" => MAX_USER_PART_BYTES,
            "image" => MAX_IMAGE_BYTES,
            // Unknown parts are drained and ignored.
            _ => {
                while field.next().await.is_some() {}
                continue;
            }
        };

        let mut bytes = Vec::new();
        while let Some(chunk) = field.try_next().await.map_err(malformed)? {
            if bytes.len() + chunk.len() > limit {
                return Err(ValidationError::Rejected(format!("{} part exceeds {} bytes", name, limit)).into());
            }
            bytes.extend_from_slice(&chunk);
        }

        if name == "user" {
            let parsed = serde_json::from_slice::<T>(&bytes)
                .map_err(|e| ValidationError::Rejected(format!("Malformed user part: {}", e)))?;
            user = Some(parsed);
        } else if !bytes.is_empty() {
            image = Some(bytes);
        }
    }

    let user = user.ok_or_else(|| ValidationError::EmptyField("user".to_string()))?;
    Ok(UserForm { user, image })
}

fn malformed(err: actix_multipart::MultipartError) -> AppError {
    ValidationError::Rejected(format!("Malformed multipart body: {}", err)).into()
}
