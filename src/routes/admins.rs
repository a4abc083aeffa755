use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::password;
use crate::cron;
use crate::db::admins::{self, AdminChanges, NewAdmin};
use crate::db::models::{Admin, ArchivedPost, MediaType, Page, User};
use crate::db::{self, archive, users};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::lifecycle::{self, SweepReport};
use crate::media;
use crate::routes::upload::UploadForm;
use crate::routes::users::{new_password_hash, ImageResponse, ProfileInput};
use crate::routes::{required, PageParams};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdminRequest {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub mobile_number: String,
    #[serde(default)]
    pub password: String,
    #[serde(flatten)]
    pub profile: ProfileInput,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateAdminRequest {
    pub name: Option<String>,
    pub mobile_number: Option<String>,
    pub password: Option<String>,
    #[serde(flatten)]
    pub profile: ProfileInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    pub main_admin: bool,
    pub image_url: Option<String>,
}

impl From<Admin> for AdminResponse {
    fn from(a: Admin) -> Self {
        AdminResponse {
            id: a.id,
            name: a.name,
            email: a.email,
            mobile_number: a.mobile_number,
            main_admin: a.main_admin,
            image_url: a.image_url,
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/admin", get(list_admins))
        .route("/api/admin/create", post(create_admin))
        .route("/api/admin/{id}", put(update_admin).delete(delete_admin))
        .route("/api/admin/{id}/image", post(upload_image))
        .route("/api/admin/main-admin/{id}", put(transfer_main))
        .route("/api/admin/users/pending", get(pending_users))
        .route("/api/admin/users/{id}/approve", post(approve_user))
        .route("/api/admin/users/{id}/reject", post(reject_user))
        .route("/api/admin/archive/posts", get(archived_posts))
        .route("/api/admin/lifecycle/sweep", post(sweep_now))
}

/// The main admin may manage anyone; other admins only themselves.
fn require_self_or_main(caller: &CurrentUser, id: &str) -> AppResult<()> {
    caller.require_admin()?;
    if caller.is_main_admin() || caller.id == id {
        Ok(())
    } else {
        Err(AppError::forbidden("Admins can only edit their own profile"))
    }
}

async fn create_admin(
    State(state): State<AppState>,
    caller: CurrentUser,
    Json(req): Json<CreateAdminRequest>,
) -> AppResult<Json<AdminResponse>> {
    caller.require_main_admin()?;
    let email = required(&req.email, "Email")?.to_lowercase();
    let pw = required(&req.password, "Password")?;

    let conn = state.db.get()?;
    if admins::email_exists(&conn, &email)? {
        return Err(AppError::bad_request("Admin email already exists"));
    }

    let admin = admins::insert(
        &conn,
        &NewAdmin {
            name: req.name.trim().to_string(),
            email,
            mobile_number: req.mobile_number.trim().to_string(),
            password_hash: password::hash(pw)?,
            profile: req.profile.into(),
            main_admin: false,
        },
        Utc::now(),
    )
    .map_err(duplicate_admin)?;

    tracing::info!("Admin {} created by {}", admin.email, caller.email);
    Ok(Json(admin.into()))
}

fn duplicate_admin(err: rusqlite::Error) -> AppError {
    match db::unique_violation(&err) {
        Some("admins.email") => AppError::bad_request("Admin email already exists"),
        _ => err.into(),
    }
}

async fn list_admins(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> AppResult<Json<Vec<AdminResponse>>> {
    caller.require_admin()?;
    let conn = state.db.get()?;
    let list = admins::list(&conn)?.into_iter().map(Into::into).collect();
    Ok(Json(list))
}

async fn update_admin(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateAdminRequest>,
) -> AppResult<Json<AdminResponse>> {
    require_self_or_main(&caller, &id)?;

    let changes = AdminChanges {
        name: req.name.filter(|n| !n.trim().is_empty()),
        mobile_number: req.mobile_number.filter(|m| !m.trim().is_empty()),
        password_hash: new_password_hash(req.password.as_deref())?,
        profile: req.profile.into(),
    };

    let conn = state.db.get()?;
    let admin = admins::update(&conn, &id, &changes, Utc::now())?.ok_or(AppError::NotFound)?;
    Ok(Json(admin.into()))
}

async fn transfer_main(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<AdminResponse>> {
    caller.require_main_admin()?;

    let mut conn = state.db.get()?;
    let target = admins::get(&conn, &id)?.ok_or(AppError::NotFound)?;
    if target.main_admin {
        return Ok(Json(target.into()));
    }

    let promoted = admins::transfer_main(&mut conn, &id, Utc::now())?.ok_or(AppError::NotFound)?;
    tracing::info!("Main admin transferred from {} to {}", caller.email, promoted.email);
    Ok(Json(promoted.into()))
}

async fn delete_admin(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    caller.require_admin()?;

    let target = {
        let conn = state.db.get()?;
        let target = admins::get(&conn, &id)?.ok_or(AppError::NotFound)?;
        if target.main_admin {
            return Err(AppError::forbidden(
                "Cannot delete MAIN_ADMIN. Transfer main admin first.",
            ));
        }
        if !caller.is_main_admin() && caller.id != id {
            return Err(AppError::forbidden("Admins can only delete themselves"));
        }
        if !admins::delete(&conn, &id)? {
            return Err(AppError::NotFound);
        }
        target
    };

    if let Some(public_id) = &target.image_public_id {
        media::delete_quietly(state.media.as_ref(), public_id, MediaType::Image).await;
    }

    tracing::info!("Admin {} deleted by {}", target.email, caller.email);
    Ok(StatusCode::NO_CONTENT)
}

async fn upload_image(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
    multipart: Multipart,
) -> AppResult<Json<ImageResponse>> {
    require_self_or_main(&caller, &id)?;

    let previous = {
        let conn = state.db.get()?;
        admins::get(&conn, &id)?
            .ok_or(AppError::NotFound)?
            .image_public_id
    };

    let mut form = UploadForm::read(multipart).await?;
    let file = form
        .take_file()
        .ok_or_else(|| AppError::bad_request("Image file is required."))?;
    let uploaded = state
        .media
        .upload(file.into_request(&state.config.media.admins_folder)?)
        .await?;

    {
        let conn = state.db.get()?;
        admins::set_image(&conn, &id, &uploaded.url, &uploaded.public_id, Utc::now())?;
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

async fn pending_users(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> AppResult<Json<Vec<User>>> {
    caller.require_admin()?;
    let conn = state.db.get()?;
    Ok(Json(users::list_pending(&conn)?))
}

async fn approve_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    caller.require_admin()?;

    let now = Utc::now();
    let lc = &state.config.lifecycle;
    let today = lifecycle::civil_today(now, lc.utc_offset_minutes);
    let expiry = lifecycle::membership_expiry(today, lc.membership_days);

    let conn = state.db.get()?;
    let user = users::approve(&conn, &id, today, expiry, now)?.ok_or(AppError::NotFound)?;
    tracing::info!("User {} approved by {} until {}", user.email, caller.email, expiry);
    Ok(Json(user))
}

async fn reject_user(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
    reason: String,
) -> AppResult<&'static str> {
    caller.require_admin()?;

    let reason = reason.trim();
    let reason = (!reason.is_empty()).then_some(reason);

    let conn = state.db.get()?;
    if !users::reject(&conn, &id, reason, Utc::now())? {
        return Err(AppError::NotFound);
    }
    tracing::info!("User {} rejected by {}", id, caller.email);
    Ok("User rejected")
}

async fn archived_posts(
    State(state): State<AppState>,
    caller: CurrentUser,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<ArchivedPost>>> {
    caller.require_admin()?;
    let (page, size) = params.resolve();
    let conn = state.db.get()?;
    Ok(Json(archive::list(&conn, page, size)?))
}

async fn sweep_now(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> AppResult<Json<SweepReport>> {
    caller.require_admin()?;
    tracing::info!("Manual lifecycle sweep requested by {}", caller.email);
    Ok(Json(cron::run_sweep(&state).await?))
}
