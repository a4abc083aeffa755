// Media host seam for uploaded images and videos.
pub mod cloudinary;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

use crate::config::MediaConfig;
use crate::db::models::MediaType;

pub use cloudinary::CloudinaryHost;

#[derive(Debug, Error)]
pub enum MediaError {
    #[error("media host is not configured")]
    NotConfigured,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("media host rejected the request: {0}")]
    Rejected(String),
}

#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub bytes: Bytes,
    pub filename: String,
    pub content_type: String,
    pub folder: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub url: String,
    pub public_id: String,
    pub media_type: MediaType,
}

#[async_trait]
pub trait MediaHost: Send + Sync {
    async fn upload(&self, req: UploadRequest) -> Result<UploadedMedia, MediaError>;

    async fn delete(&self, public_id: &str, media_type: MediaType) -> Result<(), MediaError>;
}

/// Stand-in when no credentials are configured.
pub struct UnconfiguredMediaHost;

#[async_trait]
impl MediaHost for UnconfiguredMediaHost {
    async fn upload(&self, _req: UploadRequest) -> Result<UploadedMedia, MediaError> {
        Err(MediaError::NotConfigured)
    }

    async fn delete(&self, _public_id: &str, _media_type: MediaType) -> Result<(), MediaError> {
        Err(MediaError::NotConfigured)
    }
}

/// Build the host from config: Cloudinary when all credentials are present.
pub fn from_config(cfg: &MediaConfig) -> Arc<dyn MediaHost> {
    match (&cfg.cloud_name, &cfg.api_key, &cfg.api_secret) {
        (Some(cloud), Some(key), Some(secret)) => Arc::new(CloudinaryHost::new(
            cloud.clone(),
            key.clone(),
            secret.clone(),
            cfg.max_video_seconds,
        )),
        _ => {
            tracing::warn!("Media host not configured; uploads will be refused");
            Arc::new(UnconfiguredMediaHost)
        }
    }
}

/// Resolve the content type of an uploaded part, guessing from the filename
/// when the client sent none. Only images and videos are accepted.
pub fn classify(content_type: Option<&str>, filename: &str) -> Option<(String, MediaType)> {
    let mime = match content_type {
        Some(ct) if !ct.trim().is_empty() && ct != "application/octet-stream" => ct.to_string(),
        _ => mime_guess::from_path(filename).first()?.essence_str().to_string(),
    };
    let media_type = MediaType::from_mime(&mime)?;
    Some((mime, media_type))
}

/// Delete media and log instead of failing; used after the record is gone.
pub async fn delete_quietly(host: &dyn MediaHost, public_id: &str, media_type: MediaType) {
    if let Err(e) = host.delete(public_id, media_type).await {
        tracing::warn!("Failed to delete media {}: {}", public_id, e);
    }
}
