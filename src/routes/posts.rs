use axum::extract::{Multipart, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::db::interactions::{self, ReactionOutcome};
use crate::db::models::{Comment, Page, Post, PostKind, Reaction, ReactionType};
use crate::db::posts::{self, NewPost};
use crate::error::{AppError, AppResult};
use crate::extractors::{CurrentUser, MaybeUser};
use crate::lifecycle;
use crate::media;
use crate::routes::upload::UploadForm;
use crate::routes::PageParams;
use crate::state::AppState;

pub const MAX_COMMENT_CHARS: usize = 500;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionRequest {
    pub reaction_type: ReactionType,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReactionResponse {
    pub action: &'static str,
    pub reaction: Option<Reaction>,
}

impl From<ReactionOutcome> for ReactionResponse {
    fn from(outcome: ReactionOutcome) -> Self {
        match outcome {
            ReactionOutcome::Added(r) => ReactionResponse {
                action: "ADDED",
                reaction: Some(r),
            },
            ReactionOutcome::Changed(r) => ReactionResponse {
                action: "CHANGED",
                reaction: Some(r),
            },
            ReactionOutcome::Removed => ReactionResponse {
                action: "REMOVED",
                reaction: None,
            },
        }
    }
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/posts", get(list_posts))
        .route("/api/posts/create", post(create_post))
        .route("/api/posts/pending", get(pending_posts))
        .route("/api/posts/mine", get(my_posts))
        .route("/api/posts/{id}", get(get_post).delete(delete_post))
        .route("/api/posts/{id}/approve", put(approve_post))
        .route("/api/posts/{id}/reject", put(reject_post))
        .route("/api/posts/{id}/reaction", post(react))
        .route("/api/posts/{id}/comment", post(comment))
        .route("/api/posts/{id}/comments", get(list_comments))
        .route("/api/posts/{id}/reactions", get(list_reactions))
}

/// A post the caller may see: visible ones to anyone, others only to
/// their author or an admin. Everything else is a 404.
pub(crate) fn readable_post(
    conn: &Connection,
    id: &str,
    caller: Option<&CurrentUser>,
    now: DateTime<Utc>,
) -> AppResult<Post> {
    let post = posts::get(conn, id)?.ok_or(AppError::NotFound)?;
    if post.is_visible_at(now) {
        return Ok(post);
    }
    match caller {
        Some(c) if c.is_admin() || c.author() == post.author => Ok(post),
        _ => Err(AppError::NotFound),
    }
}

/// Reactions and comments only land on live posts.
fn visible_post(conn: &Connection, id: &str, now: DateTime<Utc>) -> AppResult<Post> {
    readable_post(conn, id, None, now)
}

pub(crate) fn comment_text(raw: &str) -> AppResult<&str> {
    let text = raw.trim();
    let len = text.chars().count();
    if len == 0 || len > MAX_COMMENT_CHARS {
        return Err(AppError::bad_request(format!(
            "Comment must be between 1 and {} characters.",
            MAX_COMMENT_CHARS
        )));
    }
    Ok(text)
}

async fn create_post(
    State(state): State<AppState>,
    caller: CurrentUser,
    multipart: Multipart,
) -> AppResult<Json<Post>> {
    let mut form = UploadForm::read(multipart).await?;
    let kind = if form.flag("story") {
        PostKind::Story
    } else {
        PostKind::Post
    };
    let file = form
        .take_file()
        .ok_or_else(|| AppError::bad_request("Media file is required for a post."))?;

    let folder = match kind {
        PostKind::Story => &state.config.media.stories_folder,
        PostKind::Post => &state.config.media.posts_folder,
    };
    let uploaded = state.media.upload(file.into_request(folder)?).await?;

    let now = Utc::now();
    let new = NewPost {
        author: caller.author(),
        content_url: uploaded.url,
        media_public_id: uploaded.public_id,
        media_type: uploaded.media_type,
        kind,
        approved: lifecycle::initial_post_approval(kind, caller.role),
        expires_at: lifecycle::post_expiry(kind, now),
    };

    let conn = state.db.get()?;
    let post = posts::insert(&conn, &new, now)?;
    tracing::info!(
        "{} {} created by {} (approved: {})",
        post.kind,
        post.id,
        caller.email,
        post.approved
    );
    Ok(Json(post))
}

async fn list_posts(
    State(state): State<AppState>,
    _caller: CurrentUser,
) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    Ok(Json(posts::list_visible(&conn, Utc::now())?))
}

async fn pending_posts(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> AppResult<Json<Vec<Post>>> {
    caller.require_admin()?;
    let conn = state.db.get()?;
    Ok(Json(posts::list_pending(&conn, Utc::now())?))
}

async fn my_posts(
    State(state): State<AppState>,
    caller: CurrentUser,
) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    Ok(Json(posts::list_by_author(&conn, &caller.author())?))
}

async fn get_post(
    State(state): State<AppState>,
    MaybeUser(caller): MaybeUser,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    let conn = state.db.get()?;
    Ok(Json(readable_post(&conn, &id, caller.as_ref(), Utc::now())?))
}

async fn approve_post(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Post>> {
    caller.require_admin()?;
    let conn = state.db.get()?;
    if !posts::approve(&conn, &id)? {
        return Err(AppError::NotFound);
    }
    let post = posts::get(&conn, &id)?.ok_or(AppError::NotFound)?;
    tracing::info!("Post {} approved by {}", id, caller.email);
    Ok(Json(post))
}

/// Remove a post record, then its media.
async fn remove_post(state: &AppState, id: &str) -> AppResult<Post> {
    let post = {
        let conn = state.db.get()?;
        let post = posts::get(&conn, id)?.ok_or(AppError::NotFound)?;
        posts::delete(&conn, id)?;
        post
    };
    media::delete_quietly(state.media.as_ref(), &post.media_public_id, post.media_type).await;
    Ok(post)
}

async fn reject_post(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    caller.require_admin()?;
    remove_post(&state, &id).await?;
    tracing::info!("Post {} rejected by {}", id, caller.email);
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_post(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<StatusCode> {
    caller.require_admin()?;
    remove_post(&state, &id).await?;
    tracing::info!("Post {} deleted by {}", id, caller.email);
    Ok(StatusCode::NO_CONTENT)
}

async fn react(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<ReactionRequest>,
) -> AppResult<Json<ReactionResponse>> {
    let now = Utc::now();
    let conn = state.db.get()?;
    visible_post(&conn, &id, now)?;
    let outcome = interactions::react(&conn, &id, &caller.author(), req.reaction_type, now)?;
    Ok(Json(outcome.into()))
}

async fn comment(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
    Json(req): Json<CommentRequest>,
) -> AppResult<Json<Comment>> {
    let text = comment_text(&req.text)?;
    let now = Utc::now();
    let conn = state.db.get()?;
    visible_post(&conn, &id, now)?;
    let comment = interactions::add_comment(&conn, &id, &caller.author(), text, now)?;
    Ok(Json(comment))
}

async fn list_comments(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<Comment>>> {
    let (page, size) = params.resolve();
    let conn = state.db.get()?;
    readable_post(&conn, &id, Some(&caller), Utc::now())?;
    Ok(Json(interactions::list_comments(&conn, &id, page, size)?))
}

async fn list_reactions(
    State(state): State<AppState>,
    caller: CurrentUser,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<Reaction>>> {
    let (page, size) = params.resolve();
    let conn = state.db.get()?;
    readable_post(&conn, &id, Some(&caller), Utc::now())?;
    Ok(Json(interactions::list_reactions(&conn, &id, page, size)?))
}
