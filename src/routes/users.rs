use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::auth::password;
use crate::db;
use crate::db::models::{MediaType, User};
use crate::db::users::{self, NewUser, ProfileFields, UserChanges};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::lifecycle;
use crate::media;
use crate::routes::required;
use crate::routes::upload::UploadForm;
use crate::state::AppState;

/// Personal-detail fields accepted on registration and profile edits.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileInput {
    pub father_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub dl_number: Option<String>,
    pub badge_number: Option<String>,
    pub address: Option<String>,
    pub blood_group: Option<String>,
    pub whatsapp_number: Option<String>,
    pub nominee_name: Option<String>,
    pub nominee_relationship: Option<String>,
    pub nominee_contact_number: Option<String>,
}

impl From<ProfileInput> for ProfileFields {
    fn from(p: ProfileInput) -> Self {
        ProfileFields {
            father_name: p.father_name,
            date_of_birth: p.date_of_birth,
            dl_number: p.dl_number,
            badge_number: p.badge_number,
            address: p.address,
            blood_group: p.blood_group,
            whatsapp_number: p.whatsapp_number,
            nominee_name: p.nominee_name,
            nominee_relationship: p.nominee_relationship,
            nominee_contact_number: p.nominee_contact_number,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub mobile_number: String,
    #[serde(default)]
    pub password: String,
    pub date_of_joining_or_renewal: Option<NaiveDate>,
    #[serde(flatten)]
    pub profile: ProfileInput,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub name: Option<String>,
    pub password: Option<String>,
    pub date_of_joining_or_renewal: Option<NaiveDate>,
    #[serde(flatten)]
    pub profile: ProfileInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageResponse {
    pub image_url: String,
    pub public_id: String,
    pub message: &'static str,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/users/register", post(register))
        .route("/api/users", get(list_users))
        .route(
            "/api/users/{id}",
            get(get_user).put(update_user).delete(delete_user),
        )
        .route("/api/users/{id}/image", post(upload_image))
}

/// Re-hash a new password; blank means "keep the current one".
pub(crate) fn new_password_hash(password: Option<&str>) -> AppResult<Option<String>> {
    match password.map(str::trim) {
        Some(pw) if !pw.is_empty() => Ok(Some(password::hash(pw)?)),
        _ => Ok(None),
    }
}

async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<Json<User>> {
    let name = required(&req.name, "Name")?;
    let email = required(&req.email, "Email")?.to_lowercase();
    let mobile = required(&req.mobile_number, "Mobile number")?;
    let pw = required(&req.password, "Password")?;

    let now = Utc::now();
    let joining = req
        .date_of_joining_or_renewal
        .unwrap_or_else(|| lifecycle::civil_today(now, state.config.lifecycle.utc_offset_minutes));

    let conn = state.db.get()?;
    if users::email_exists(&conn, &email)? {
        return Err(AppError::bad_request("Email already exists"));
    }
    if users::mobile_exists(&conn, mobile)? {
        return Err(AppError::bad_request("Mobile number already exists"));
    }

    let user = users::insert(
        &conn,
        &NewUser {
            name: name.to_string(),
            email,
            mobile_number: mobile.to_string(),
            password_hash: password::hash(pw)?,
            profile: req.profile.into(),
            date_of_joining_or_renewal: joining,
            expiry_date: lifecycle::membership_expiry(
                joining,
                state.config.lifecycle.membership_days,
            ),
        },
        now,
    )
    .map_err(duplicate_user)?;

    tracing::info!("Registered user {} ({}), awaiting approval", user.email, user.id);
    Ok(Json(user))
}

/// A registration that lost the race on a unique contact gets the same answer
/// as the up-front check.
fn duplicate_user(err: rusqlite::Error) -> AppError {
    match db::unique_violation(&err) {
        Some("users.email") => AppError::bad_request("Email already exists"),
        Some("users.mobile_number") => AppError::bad_request("Mobile number already exists"),
        _ => err.into(),
    }
}

async fn list_users(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> AppResult<Json<Vec<User>>> {
    caller.require_admin()?;
    let conn = state.db.get()?;
    Ok(Json(users::list(&conn)?))
}

async fn get_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    caller.require_self_or_admin(&id)?;
    let conn = state.db.get()?;
    let user = users::get(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

async fn update_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateUserRequest>,
) -> AppResult<Json<User>> {
    caller.require_self_or_admin(&id)?;

    // Only admins may move a membership window.
    let membership = match req.date_of_joining_or_renewal {
        Some(joining) if caller.is_admin() => Some((
            joining,
            lifecycle::membership_expiry(joining, state.config.lifecycle.membership_days),
        )),
        _ => None,
    };

    let changes = UserChanges {
        name: req.name.filter(|n| !n.trim().is_empty()),
        password_hash: new_password_hash(req.password.as_deref())?,
        profile: req.profile.into(),
        membership,
    };

    let conn = state.db.get()?;
    let user = users::update(&conn, &id, &changes, Utc::now())?.ok_or(AppError::NotFound)?;
    Ok(Json(user))
}

async fn delete_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    caller.require_self_or_admin(&id)?;

    let user = {
        let conn = state.db.get()?;
        let user = users::get(&conn, &id)?.ok_or(AppError::NotFound)?;
        users::delete(&conn, &id)?;
        user
    };

    if let Some(public_id) = &user.image_public_id {
        media::delete_quietly(state.media.as_ref(), public_id, MediaType::Image).await;
    }

    tracing::info!("Deleted user {} by {}", user.email, caller.email);
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_image(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Json<ImageResponse>> {
    caller.require_self_or_admin(&id)?;

    let previous = {
        let conn = state.db.get()?;
        users::get(&conn, &id)?
            .ok_or(AppError::NotFound)?
            .image_public_id
    };

    let mut form = UploadForm::read(multipart).await?;
    let file = form
        .take_file()
        .ok_or_else(|| AppError::bad_request("Image file is required."))?;
    let uploaded = state
        .media
        .upload(file.into_request(&state.config.media.users_folder)?)
        .await?;

    {
        let conn = state.db.get()?;
        users::set_image(&conn, &id, &uploaded.url, &uploaded.public_id, Utc::now())?;
    }

    if let Some(old) = previous.filter(|old| *old != uploaded.public_id) {
        media::delete_quietly(state.media.as_ref(), &old, MediaType::Image).await;
    }

    Ok(Json(ImageResponse {
        image_url: uploaded.url,
        public_id: uploaded.public_id,
        message: "Uploaded",
    }))
}
