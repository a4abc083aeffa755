use axum::extract::{Path, Query, State};
use axum::routing::post;
use axum::Router;
use chrono::Utc;
use rusqlite::Connection;
use serde::Deserialize;

use crate::db::models::User;
use crate::db::users;
use crate::error::{AppError, AppResult};
use crate::otp::{self, Channel};
use crate::state::AppState;

/// The contact matching the channel; `otp` only on verify.
#[derive(Debug, Default, Deserialize)]
pub struct OtpParams {
    pub email: Option<String>,
    pub mobile: Option<String>,
    pub whatsapp: Option<String>,
    pub otp: Option<String>,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/otp/send/{channel}", post(send))
        .route("/api/otp/verify/{channel}", post(verify))
}

fn user_not_found(channel: &str) -> AppError {
    AppError::bad_request(format!("User not found for channel: {}", channel))
}

/// Find the user the request addresses on `raw_channel`.
fn resolve(
    conn: &Connection,
    raw_channel: &str,
    params: &OtpParams,
) -> AppResult<(Channel, User)> {
    let channel: Channel = raw_channel
        .parse()
        .map_err(|_| user_not_found(raw_channel))?;

    let contact = match channel {
        Channel::Email => params.email.as_deref(),
        Channel::Sms => params.mobile.as_deref(),
        Channel::Whatsapp => params.whatsapp.as_deref(),
    }
    .map(str::trim)
    .filter(|c| !c.is_empty())
    .ok_or_else(|| user_not_found(raw_channel))?;

    let user = match channel {
        Channel::Email => users::find_by_email(conn, contact)?,
        Channel::Sms => users::find_by_mobile(conn, contact)?,
        Channel::Whatsapp => users::find_by_whatsapp(conn, contact)?,
    };
    let user = user.ok_or_else(|| user_not_found(raw_channel))?;
    Ok((channel, user))
}

async fn send(
    State(state): State<AppState>,
    Path(raw_channel): Path<String>,
    Query(params): Query<OtpParams>,
) -> AppResult<String> {
    let (channel, user, code) = {
        let conn = state.db.get()?;
        let (channel, user) = resolve(&conn, &raw_channel, &params)?;
        let code = otp::issue(
            &conn,
            &user.id,
            channel,
            state.config.otp.ttl_secs,
            Utc::now(),
        )?;
        (channel, user, code)
    };

    let recipient = channel
        .recipient(&user)
        .ok_or_else(|| user_not_found(&raw_channel))?;
    state.otp.send(channel, recipient, &code).await?;

    tracing::info!("OTP issued to user {} via {}", user.id, channel);
    Ok(format!("OTP sent via {}", channel))
}

async fn verify(
    State(state): State<AppState>,
    Path(raw_channel): Path<String>,
    Query(params): Query<OtpParams>,
) -> AppResult<String> {
    let conn = state.db.get()?;
    let (channel, user) = resolve(&conn, &raw_channel, &params)?;

    let code = params.otp.as_deref().unwrap_or_default();
    let max_attempts = state.config.otp.max_attempts;
    if !otp::verify(&conn, &user.id, channel, code, max_attempts, Utc::now())? {
        return Err(AppError::bad_request("Invalid or expired OTP."));
    }

    tracing::info!("User {} verified {}", user.id, channel);
    Ok(format!("OTP verified successfully via {}!", channel))
}
