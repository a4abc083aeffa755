use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};

use super::models::{ArchivedPost, Author, Page, Post};
use super::{new_id, timestamp, timestamp_column};

fn map_archived(row: &Row<'_>) -> rusqlite::Result<ArchivedPost> {
    Ok(ArchivedPost {
        id: row.get(0)?,
        original_post_id: row.get(1)?,
        content_url: row.get(2)?,
        media_type: row.get(3)?,
        kind: row.get(4)?,
        author: Author::from_columns(row.get(5)?, row.get(6)?),
        created_at: timestamp_column(row, 7)?,
        archived_at: timestamp_column(row, 8)?,
    })
}

/// Copy a post into the archive. The caller deletes the original.
pub fn archive_post(conn: &Connection, post: &Post, now: DateTime<Utc>) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO archived_posts (id, original_post_id, content_url, media_type, kind,
                                     author_user_id, author_admin_id, created_at, archived_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            new_id(),
            post.id,
            post.content_url,
            post.media_type,
            post.kind,
            post.author.user_id(),
            post.author.admin_id(),
            timestamp(&post.created_at),
            timestamp(&now),
        ],
    )?;
    Ok(())
}

/// Archived posts, most recently archived first.
pub fn list(conn: &Connection, page: u32, size: u32) -> rusqlite::Result<Page<ArchivedPost>> {
    let total: i64 = conn.query_row("SELECT COUNT(*) FROM archived_posts", [], |r| r.get(0))?;
    let mut stmt = conn.prepare(
        "SELECT id, original_post_id, content_url, media_type, kind, author_user_id,
                author_admin_id, created_at, archived_at
         FROM archived_posts
         ORDER BY archived_at DESC, id DESC
         LIMIT ?1 OFFSET ?2",
    )?;
    let content = stmt
        .query_map(params![size, i64::from(page) * i64::from(size)], map_archived)?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Page::new(content, page, size, total))
}
