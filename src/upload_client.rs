use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::configuration::UploadSettings;
use crate::error::{AppError, UploadError};

/// Destination folder on the remote image store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageCategory {
    Users,
}

impl ImageCategory {
    pub fn folder(&self) -> &'static str {
        match self {
            ImageCategory::Users => "/albums/users",
        }
    }
}

/// File-upload collaborator: stores bytes remotely and hands back a URL.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    async fn upload_image(&self, bytes: Vec<u8>, category: ImageCategory) -> Result<String, AppError>;
}

/// Unsigned-upload client for a Cloudinary-style image API.
#[derive(Clone)]
pub struct UploadClient {
    http_client: reqwest::Client,
    base_url: String,
    upload_preset: String,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: Option<String>,
    url: Option<String>,
}

impl UploadClient {
    pub fn new(settings: &UploadSettings) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_millis))
            .build()
            .map_err(|e| UploadError::TransferFailed(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            upload_preset: settings.upload_preset.clone(),
        })
    }
}

#[async_trait]
impl ImageUploader for UploadClient {
    async fn upload_image(&self, bytes: Vec<u8>, category: ImageCategory) -> Result<String, AppError> {
        let url = format!("{}/image/upload", self.base_url);
        let size = bytes.len();
        let form = reqwest::multipart::Form::new()
            .text("upload_preset", self.upload_preset.clone())
            .text("folder", category.folder())
            .part("file", reqwest::multipart::Part::bytes(bytes).file_name("image"));

        let response = self
            .http_client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                tracing::error!("Failed to upload image: {}", e);
                UploadError::TransferFailed(e.to_string())
            })?
            .error_for_status()
            .map_err(|e| {
                tracing::error!("Upload service returned error: {}", e);
                UploadError::TransferFailed(e.to_string())
            })?;

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;

        let stored = body
            .secure_url
            .or(body.url)
            .ok_or_else(|| UploadError::InvalidResponse("missing url".to_string()))?;

        tracing::info!(bytes = size, folder = category.folder(), "Image uploaded");
        Ok(stored)
    }
}

/// Used when no upload endpoint is configured.
pub struct DisabledUploader;

#[async_trait]
impl ImageUploader for DisabledUploader {
    async fn upload_image(&self, _bytes: Vec<u8>, _category: ImageCategory) -> Result<String, AppError> {
        Err(UploadError::NotConfigured.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_images_go_to_users_folder() {
        assert_eq!(ImageCategory::Users.folder(), "/albums/users");
    }

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = UploadClient::new(&UploadSettings {
            base_url: "https://api.example.com/v1_1/demo/".to_string(),
            upload_preset: "musify".to_string(),
            timeout_millis: 1000,
        })
        .unwrap();
        assert_eq!(client.base_url, "https://api.example.com/v1_1/demo");
    }

    #[tokio::test]
    async fn test_disabled_uploader_fails() {
        let err = DisabledUploader
            .upload_image(vec![1, 2, 3], ImageCategory::Users)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Upload(UploadError::NotConfigured)));
    }
}
