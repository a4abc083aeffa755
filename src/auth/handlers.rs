use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::auth::{clear_session_cookie, password, session_cookie};
use crate::db::models::Role;
use crate::db::{admins, users};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

// -- Request types --

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

// -- Response types --

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JwtToken {
    pub token: String,
    pub token_type: &'static str,
    pub expires_in_seconds: u64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
    pub main_admin: bool,
    pub jwt: JwtToken,
}

fn login_response(state: &AppState, body: LoginResponse) -> Response {
    let cookie = session_cookie(&state.config.auth, &body.jwt.token);
    (
        StatusCode::OK,
        AppendHeaders([(header::SET_COOKIE, cookie)]),
        Json(body),
    )
        .into_response()
}

fn issue(state: &AppState, email: &str, role: Role) -> AppResult<JwtToken> {
    Ok(JwtToken {
        token: state.jwt.issue(email, role)?,
        token_type: "Bearer",
        expires_in_seconds: state.jwt.ttl_secs(),
    })
}

/// POST /api/auth/login
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let creds = {
        let conn = state.db.get()?;
        users::credentials(&conn, req.email.trim())?
    };

    // Approval state is only revealed once the password matches.
    let creds = creds
        .filter(|c| password::verify(&req.password, &c.password_hash))
        .ok_or_else(|| AppError::LoginFailed("Invalid email or password".into()))?;

    if !creds.can_log_in() {
        return Err(AppError::forbidden("User not approved or inactive"));
    }

    tracing::info!("User {} logged in", creds.email);
    let jwt = issue(&state, &creds.email, Role::User)?;
    Ok(login_response(
        &state,
        LoginResponse {
            id: creds.id,
            email: creds.email,
            name: creds.name,
            role: Role::User,
            main_admin: false,
            jwt,
        },
    ))
}

/// POST /api/auth/admin/login
pub async fn admin_login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Response> {
    let creds = {
        let conn = state.db.get()?;
        admins::credentials(&conn, req.email.trim())?
    };

    let creds = creds
        .filter(|c| c.active && password::verify(&req.password, &c.password_hash))
        .ok_or_else(|| AppError::LoginFailed("Invalid credentials".into()))?;

    let role = if creds.main_admin {
        Role::MainAdmin
    } else {
        Role::Admin
    };

    tracing::info!("Admin {} logged in as {}", creds.email, role);
    let jwt = issue(&state, &creds.email, role)?;
    Ok(login_response(
        &state,
        LoginResponse {
            id: creds.id,
            email: creds.email,
            name: creds.name,
            role,
            main_admin: creds.main_admin,
            jwt,
        },
    ))
}

/// POST /api/auth/logout
pub async fn logout(State(state): State<AppState>) -> impl IntoResponse {
    (
        StatusCode::OK,
        AppendHeaders([(header::SET_COOKIE, clear_session_cookie(&state.config.auth))]),
        "Logged out",
    )
}
