pub mod admins;
pub mod auth;
pub mod health;
pub mod otp;
pub mod posts;
pub mod public;
pub mod stories;
pub mod upload;
pub mod users;

use axum::extract::DefaultBodyLimit;
use axum::http::{header, HeaderValue, Method};
use axum::Router;
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::error::{AppError, AppResult};
use crate::state::AppState;

pub const DEFAULT_PAGE_SIZE: u32 = 10;
pub const MAX_PAGE_SIZE: u32 = 100;

/// `?page=&size=` on paged listings.
#[derive(Debug, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub size: Option<u32>,
}

impl PageParams {
    /// Zero-based page and a size clamped to `1..=MAX_PAGE_SIZE`.
    pub fn resolve(&self) -> (u32, u32) {
        let size = self
            .size
            .unwrap_or(DEFAULT_PAGE_SIZE)
            .clamp(1, MAX_PAGE_SIZE);
        (self.page.unwrap_or(0), size)
    }
}

/// A required text field, trimmed; blank reads as missing.
pub(crate) fn required<'a>(value: &'a str, label: &str) -> AppResult<&'a str> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::bad_request(format!("{} is required", label)));
    }
    Ok(value)
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| match HeaderValue::from_str(o) {
            Ok(v) => Some(v),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", o);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// The full application router with middleware applied.
pub fn app(state: AppState) -> Router {
    let server = &state.config.server;
    let cors = cors_layer(&server.cors_origins);
    let body_limit = DefaultBodyLimit::max(server.max_upload_bytes);

    Router::new()
        .merge(health::router())
        .merge(auth::router())
        .merge(users::router())
        .merge(admins::router())
        .merge(posts::router())
        .merge(public::router())
        .merge(stories::router())
        .merge(otp::router())
        .layer(body_limit)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_defaults() {
        assert_eq!(PageParams::default().resolve(), (0, DEFAULT_PAGE_SIZE));
    }

    #[test]
    fn required_trims_and_rejects_blank() {
        assert_eq!(required("  a@b.c ", "Email").unwrap(), "a@b.c");
        let err = required("   ", "Email").unwrap_err();
        assert!(matches!(err, AppError::BadRequest(msg) if msg == "Email is required"));
    }

    #[test]
    fn page_size_is_clamped() {
        let huge = PageParams {
            page: Some(2),
            size: Some(1000),
        };
        assert_eq!(huge.resolve(), (2, MAX_PAGE_SIZE));
        let zero = PageParams {
            page: None,
            size: Some(0),
        };
        assert_eq!(zero.resolve(), (0, 1));
    }
}
