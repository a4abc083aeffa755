use axum::routing::post;
use axum::Router;

use crate::auth::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/auth/login", post(handlers::login))
        .route("/api/auth/admin/login", post(handlers::admin_login))
        .route("/api/auth/logout", post(handlers::logout))
}
