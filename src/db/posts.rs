use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{Author, MediaType, Post, PostKind};
use super::{new_id, timestamp, timestamp_column};

const POST_SELECT: &str = "SELECT p.id, p.author_user_id, p.author_admin_id,
        COALESCE(u.name, a.name, ''), p.content_url, p.media_public_id, p.media_type,
        p.kind, p.approved, p.created_at, p.expires_at
     FROM posts p
     LEFT JOIN users u ON u.id = p.author_user_id
     LEFT JOIN admins a ON a.id = p.author_admin_id";

/// Read the user/admin author pair starting at `idx`.
pub(crate) fn author_columns(row: &Row<'_>, idx: usize) -> rusqlite::Result<Author> {
    let user_id: Option<String> = row.get(idx)?;
    let admin_id: Option<String> = row.get(idx + 1)?;
    Author::from_columns(user_id, admin_id)
        .ok_or_else(|| rusqlite::Error::InvalidColumnType(idx, "author".into(), Type::Null))
}

fn map_post(row: &Row<'_>) -> rusqlite::Result<Post> {
    Ok(Post {
        id: row.get(0)?,
        author: author_columns(row, 1)?,
        author_name: row.get(3)?,
        content_url: row.get(4)?,
        media_public_id: row.get(5)?,
        media_type: row.get(6)?,
        kind: row.get(7)?,
        approved: row.get(8)?,
        created_at: timestamp_column(row, 9)?,
        expires_at: timestamp_column(row, 10)?,
    })
}

#[derive(Debug, Clone)]
pub struct NewPost {
    pub author: Author,
    pub content_url: String,
    pub media_public_id: String,
    pub media_type: MediaType,
    pub kind: PostKind,
    pub approved: bool,
    pub expires_at: DateTime<Utc>,
}

pub fn insert(conn: &Connection, new: &NewPost, now: DateTime<Utc>) -> rusqlite::Result<Post> {
    let id = new_id();
    conn.execute(
        "INSERT INTO posts (id, author_user_id, author_admin_id, content_url, media_public_id,
                            media_type, kind, approved, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            id,
            new.author.user_id(),
            new.author.admin_id(),
            new.content_url,
            new.media_public_id,
            new.media_type,
            new.kind,
            new.approved,
            timestamp(&now),
            timestamp(&new.expires_at),
        ],
    )?;
    get(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Post>> {
    conn.query_row(
        &format!("{POST_SELECT} WHERE p.id = ?1"),
        params![id],
        map_post,
    )
    .optional()
}

/// Approved and not yet expired, newest first.
pub fn list_visible(conn: &Connection, now: DateTime<Utc>) -> rusqlite::Result<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "{POST_SELECT} WHERE p.approved = 1 AND p.expires_at > ?1 ORDER BY p.created_at DESC"
    ))?;
    let posts = stmt.query_map(params![timestamp(&now)], map_post)?.collect();
    posts
}

/// Awaiting moderation and still inside their window, oldest first.
pub fn list_pending(conn: &Connection, now: DateTime<Utc>) -> rusqlite::Result<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "{POST_SELECT} WHERE p.approved = 0 AND p.expires_at > ?1 ORDER BY p.created_at ASC"
    ))?;
    let posts = stmt.query_map(params![timestamp(&now)], map_post)?.collect();
    posts
}

pub fn list_by_author(conn: &Connection, author: &Author) -> rusqlite::Result<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "{POST_SELECT}
         WHERE (?1 IS NOT NULL AND p.author_user_id = ?1)
            OR (?2 IS NOT NULL AND p.author_admin_id = ?2)
         ORDER BY p.created_at DESC"
    ))?;
    let posts = stmt
        .query_map(params![author.user_id(), author.admin_id()], map_post)?
        .collect();
    posts
}

pub fn list_expired(conn: &Connection, now: DateTime<Utc>) -> rusqlite::Result<Vec<Post>> {
    let mut stmt = conn.prepare(&format!(
        "{POST_SELECT} WHERE p.expires_at < ?1 ORDER BY p.expires_at ASC"
    ))?;
    let posts = stmt.query_map(params![timestamp(&now)], map_post)?.collect();
    posts
}

pub fn approve(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let rows = conn.execute("UPDATE posts SET approved = 1 WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let rows = conn.execute("DELETE FROM posts WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}
