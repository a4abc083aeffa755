use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post, put};
use axum::{Json, Router};
use chrono::Utc;
use serde::Deserialize;

use crate::db::models::Story;
use crate::db::stories::{self, Approver, NewStory};
use crate::error::{AppError, AppResult};
use crate::extractors::CurrentUser;
use crate::lifecycle;
use crate::media;
use crate::routes::upload::UploadForm;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ApproveParams {
    pub approved: bool,
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/stories", get(list_stories))
        .route("/api/stories/create", post(create_story))
        .route("/api/stories/{id}", delete(delete_story))
        .route("/api/stories/{id}/approve", put(approve_story))
        .route("/api/stories/archive/expired", get(expired_stories))
        .route("/api/stories/archive/cleanup", delete(cleanup_expired))
}

async fn create_story(
    State(state): State<AppState>,
    caller: CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<Story>> {
    let mut form = UploadForm::read(multipart).await?;
    let file = form
        .take_file()
        .ok_or_else(|| AppError::bad_request("Story file cannot be empty."))?;
    let uploaded = state
        .media
        .upload(file.into_request(&state.config.media.stories_folder)?)
        .await?;

    let approved_by = lifecycle::initial_story_approval(caller.role).then(|| Approver {
        admin_id: caller.id.clone(),
        name: caller.name.clone(),
    });

    let now = Utc::now();
    let new = NewStory {
        author: caller.author(),
        content_url: uploaded.url,
        media_public_id: uploaded.public_id,
        media_type: uploaded.media_type,
        approved_by,
        expires_at: lifecycle::story_expiry(now),
    };

    let conn = state.db.get()?;
    let story = stories::insert(&conn, &new, now)?;
    tracing::info!(
        "Story {} created by {} (approved: {})",
        story.id,
        caller.email,
        story.approved
    );
    Ok(Json(story))
}

async fn approve_story(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
    Query(params): Query<ApproveParams>,
) -> AppResult<Json<Story>> {
    caller.require_admin()?;

    let conn = state.db.get()?;
    let story = stories::get(&conn, &id)?.ok_or(AppError::NotFound)?;
    if story.approved == params.approved {
        return Ok(Json(story));
    }

    let approver = params.approved.then(|| Approver {
        admin_id: caller.id.clone(),
        name: caller.name.clone(),
    });
    stories::set_approval(&conn, &id, approver.as_ref())?;
    tracing::info!(
        "Story {} {} by {}",
        id,
        if params.approved { "approved" } else { "unapproved" },
        caller.email
    );

    let story = stories::get(&conn, &id)?.ok_or(AppError::NotFound)?;
    Ok(Json(story))
}

async fn list_stories(
    State(state): State<AppState>,
    _caller: CurrentUser,
) -> AppResult<Json<Vec<Story>>> {
    let conn = state.db.get()?;
    Ok(Json(stories::list_visible(&conn, Utc::now())?))
}

async fn delete_story(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    caller.require_admin()?;

    let story = {
        let conn = state.db.get()?;
        let story = stories::get(&conn, &id)?.ok_or(AppError::NotFound)?;
        stories::delete(&conn, &id)?;
        story
    };
    media::delete_quietly(state.media.as_ref(), &story.media_public_id, story.media_type).await;

    tracing::info!("Story {} deleted by {}", id, caller.email);
    Ok(StatusCode::NO_CONTENT)
}

async fn expired_stories(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> AppResult<Json<Vec<Story>>> {
    caller.require_admin()?;
    let conn = state.db.get()?;
    Ok(Json(stories::list_expired(&conn, Utc::now())?))
}

async fn cleanup_expired(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> AppResult<String> {
    caller.require_admin()?;

    let removed = {
        let conn = state.db.get()?;
        stories::delete_expired(&conn, Utc::now())?
    };
    for (public_id, media_type) in &removed {
        media::delete_quietly(state.media.as_ref(), public_id, *media_type).await;
    }

    tracing::info!("{} expired stories removed by {}", removed.len(), caller.email);
    Ok(format!(
        "Deleted {} expired stories from the database and cloud storage.",
        removed.len()
    ))
}
