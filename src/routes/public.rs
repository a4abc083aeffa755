//! Read-only feed for visitors without an account.

use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;

use crate::db::interactions;
use crate::db::models::{Comment, Page, Post, Reaction};
use crate::db::posts;
use crate::error::AppResult;
use crate::routes::posts::readable_post;
use crate::routes::PageParams;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/public/posts", get(list_posts))
        .route("/api/public/posts/{id}/comments", get(list_comments))
        .route("/api/public/posts/{id}/reactions", get(list_reactions))
}

async fn list_posts(State(state): State<AppState>) -> AppResult<Json<Vec<Post>>> {
    let conn = state.db.get()?;
    Ok(Json(posts::list_visible(&conn, Utc::now())?))
}

async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<Comment>>> {
    let (page, size) = params.resolve();
    let conn = state.db.get()?;
    readable_post(&conn, &id, None, Utc::now())?;
    Ok(Json(interactions::list_comments(&conn, &id, page, size)?))
}

async fn list_reactions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> AppResult<Json<Page<Reaction>>> {
    let (page, size) = params.resolve();
    let conn = state.db.get()?;
    readable_post(&conn, &id, None, Utc::now())?;
    Ok(Json(interactions::list_reactions(&conn, &id, page, size)?))
}
