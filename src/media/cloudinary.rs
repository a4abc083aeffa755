use async_trait::async_trait;
use chrono::Utc;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{MediaError, MediaHost, UploadRequest, UploadedMedia};
use crate::db::models::MediaType;

const API_BASE: &str = "https://api.cloudinary.com/v1_1";

/// Signed uploads against the Cloudinary REST API.
pub struct CloudinaryHost {
    client: reqwest::Client,
    cloud_name: String,
    api_key: String,
    api_secret: String,
    max_video_seconds: u32,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
    public_id: String,
    resource_type: String,
}

#[derive(Deserialize)]
struct DestroyResponse {
    result: String,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

impl CloudinaryHost {
    pub fn new(cloud_name: String, api_key: String, api_secret: String, max_video_seconds: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            cloud_name,
            api_key,
            api_secret,
            max_video_seconds,
        }
    }

    fn endpoint(&self, resource: &str, action: &str) -> String {
        format!("{}/{}/{}/{}", API_BASE, self.cloud_name, resource, action)
    }

    /// Build the multipart fields shared by signed calls.
    fn signed_form(&self, mut params: Vec<(&'static str, String)>) -> Form {
        params.push(("timestamp", Utc::now().timestamp().to_string()));
        let signature = sign(&params, &self.api_secret);

        let mut form = Form::new();
        for (key, value) in params {
            form = form.text(key, value);
        }
        form.text("api_key", self.api_key.clone())
            .text("signature", signature)
            .text("signature_algorithm", "sha256")
    }

    async fn error_message(resp: reqwest::Response) -> String {
        let status = resp.status();
        match resp.json::<ErrorResponse>().await {
            Ok(body) => body.error.message,
            Err(_) => format!("status {}", status),
        }
    }
}

/// SHA-256 over `k=v` pairs sorted by key and joined with `&`, then the secret.
pub(crate) fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut sorted: Vec<_> = params.iter().filter(|(_, v)| !v.is_empty()).collect();
    sorted.sort_by(|a, b| a.0.cmp(&b.0));
    let to_sign = sorted
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join("&");

    let mut hasher = Sha256::new();
    hasher.update(to_sign.as_bytes());
    hasher.update(api_secret.as_bytes());
    hex::encode(hasher.finalize())
}

/// Insert an end-offset transformation so delivery stops at `max_seconds`.
pub fn trim_video_url(url: &str, max_seconds: u32) -> String {
    match url.split_once("/upload/") {
        Some((head, tail)) => format!("{}/upload/eo_{}/{}", head, max_seconds, tail),
        None => url.to_string(),
    }
}

#[async_trait]
impl MediaHost for CloudinaryHost {
    async fn upload(&self, req: UploadRequest) -> Result<UploadedMedia, MediaError> {
        let public_id = uuid::Uuid::now_v7().simple().to_string();
        let form = self.signed_form(vec![("folder", req.folder.clone()), ("public_id", public_id)]);

        let part = Part::bytes(req.bytes.to_vec())
            .file_name(req.filename.clone())
            .mime_str(&req.content_type)?;
        let form = form.part("file", part);

        let resp = self
            .client
            .post(self.endpoint("auto", "upload"))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(MediaError::Rejected(Self::error_message(resp).await));
        }

        let body: UploadResponse = resp.json().await?;
        let media_type = if body.resource_type == "video" {
            MediaType::Video
        } else {
            MediaType::Image
        };
        let url = match media_type {
            MediaType::Video => trim_video_url(&body.secure_url, self.max_video_seconds),
            MediaType::Image => body.secure_url,
        };

        tracing::info!("Uploaded {} to {}", body.public_id, req.folder);
        Ok(UploadedMedia {
            url,
            public_id: body.public_id,
            media_type,
        })
    }

    async fn delete(&self, public_id: &str, media_type: MediaType) -> Result<(), MediaError> {
        let form = self.signed_form(vec![("public_id", public_id.to_string())]);
        let resp = self
            .client
            .post(self.endpoint(media_type.as_str(), "destroy"))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(MediaError::Rejected(Self::error_message(resp).await));
        }

        let body: DestroyResponse = resp.json().await?;
        match body.result.as_str() {
            "ok" | "not found" => {
                tracing::info!("Deleted media {} ({})", public_id, body.result);
                Ok(())
            }
            other => Err(MediaError::Rejected(format!(
                "destroy {} returned {}",
                public_id, other
            ))),
        }
    }
}
