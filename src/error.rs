use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use crate::media::MediaError;
use crate::otp::DispatchError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Not found")]
    NotFound,

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Login failed: {0}")]
    LoginFailed(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("Media host error: {0}")]
    Media(#[from] MediaError),

    #[error("OTP dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Multipart error: {0}")]
    Multipart(#[from] axum::extract::multipart::MultipartError),

    #[error("Token error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn forbidden(msg: impl Into<String>) -> Self {
        AppError::Forbidden(msg.into())
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        AppError::BadRequest(msg.into())
    }
}

fn internal(what: &str, err: &dyn std::fmt::Display) -> (StatusCode, String) {
    tracing::error!("{}: {}", what, err);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        "Internal server error".to_string(),
    )
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "Not found".to_string()),
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AppError::LoginFailed(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Database(e) => internal("Database error", e),
            AppError::Pool(e) => internal("Pool error", e),
            AppError::Internal(msg) => internal("Internal error", msg),
            AppError::Media(MediaError::NotConfigured) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "Media storage is not configured".to_string(),
            ),
            AppError::Media(e) => {
                tracing::error!("Media host error: {}", e);
                (StatusCode::BAD_GATEWAY, "Media upload failed".to_string())
            }
            AppError::Dispatch(DispatchError::NotConfigured(channel)) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("OTP delivery via {} is not configured", channel),
            ),
            AppError::Dispatch(DispatchError::InvalidRecipient(msg)) => {
                (StatusCode::BAD_REQUEST, msg.clone())
            }
            AppError::Dispatch(e) => {
                tracing::error!("OTP dispatch error: {}", e);
                (StatusCode::BAD_GATEWAY, "Failed to send OTP".to_string())
            }
            AppError::Multipart(e) => (e.status(), e.body_text()),
            AppError::Jwt(e) => {
                tracing::debug!("Rejected token: {}", e);
                (StatusCode::UNAUTHORIZED, "Unauthorized".to_string())
            }
        };

        (status, message).into_response()
    }
}

pub type AppResult<T> = Result<T, AppError>;
