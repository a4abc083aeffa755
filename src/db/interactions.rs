use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction, TransactionBehavior};

use super::models::{Author, Comment, Page, Reaction, ReactionType};
use super::posts::author_columns;
use super::{new_id, timestamp, timestamp_column};

const COMMENT_SELECT: &str = "SELECT c.id, c.post_id, c.author_user_id, c.author_admin_id,
        COALESCE(u.name, a.name, ''), c.text, c.created_at
     FROM comments c
     LEFT JOIN users u ON u.id = c.author_user_id
     LEFT JOIN admins a ON a.id = c.author_admin_id";

const REACTION_SELECT: &str = "SELECT r.id, r.post_id, r.author_user_id, r.author_admin_id,
        COALESCE(u.name, a.name, ''), r.reaction_type, r.created_at
     FROM reactions r
     LEFT JOIN users u ON u.id = r.author_user_id
     LEFT JOIN admins a ON a.id = r.author_admin_id";

/// Matches rows written by `?2` (user) or `?3` (admin).
const BY_AUTHOR: &str = "((?2 IS NOT NULL AND author_user_id = ?2)
      OR (?3 IS NOT NULL AND author_admin_id = ?3))";

fn map_comment(row: &Row<'_>) -> rusqlite::Result<Comment> {
    Ok(Comment {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author: author_columns(row, 2)?,
        author_name: row.get(4)?,
        text: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
    })
}

fn map_reaction(row: &Row<'_>) -> rusqlite::Result<Reaction> {
    Ok(Reaction {
        id: row.get(0)?,
        post_id: row.get(1)?,
        author: author_columns(row, 2)?,
        author_name: row.get(4)?,
        reaction_type: row.get(5)?,
        created_at: timestamp_column(row, 6)?,
    })
}

pub fn add_comment(
    conn: &Connection,
    post_id: &str,
    author: &Author,
    text: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<Comment> {
    let id = new_id();
    conn.execute(
        "INSERT INTO comments (id, post_id, author_user_id, author_admin_id, text, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            post_id,
            author.user_id(),
            author.admin_id(),
            text,
            timestamp(&now)
        ],
    )?;
    conn.query_row(
        &format!("{COMMENT_SELECT} WHERE c.id = ?1"),
        params![id],
        map_comment,
    )
}

/// Comments on a post, oldest first.
pub fn list_comments(
    conn: &Connection,
    post_id: &str,
    page: u32,
    size: u32,
) -> rusqlite::Result<Page<Comment>> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM comments WHERE post_id = ?1",
        params![post_id],
        |r| r.get(0),
    )?;
    let mut stmt = conn.prepare(&format!(
        "{COMMENT_SELECT} WHERE c.post_id = ?1
         ORDER BY c.created_at ASC, c.id ASC LIMIT ?2 OFFSET ?3"
    ))?;
    let content = stmt
        .query_map(
            params![post_id, size, i64::from(page) * i64::from(size)],
            map_comment,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Page::new(content, page, size, total))
}

/// What a reaction request did to the caller's reaction on a post.
#[derive(Debug, Clone)]
pub enum ReactionOutcome {
    Added(Reaction),
    Changed(Reaction),
    Removed,
}

/// Toggle the author's reaction: repeating the same type removes it,
/// a different type replaces it.
pub fn react(
    conn: &Connection,
    post_id: &str,
    author: &Author,
    reaction_type: ReactionType,
    now: DateTime<Utc>,
) -> rusqlite::Result<ReactionOutcome> {
    // Take the write lock before reading so concurrent toggles serialize.
    let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
    let outcome = toggle_reaction(&tx, post_id, author, reaction_type, now)?;
    tx.commit()?;
    Ok(outcome)
}

fn toggle_reaction(
    conn: &Connection,
    post_id: &str,
    author: &Author,
    reaction_type: ReactionType,
    now: DateTime<Utc>,
) -> rusqlite::Result<ReactionOutcome> {
    let existing: Option<(String, ReactionType)> = conn
        .query_row(
            &format!("SELECT id, reaction_type FROM reactions WHERE post_id = ?1 AND {BY_AUTHOR}"),
            params![post_id, author.user_id(), author.admin_id()],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    let id = match existing {
        Some((id, current)) if current == reaction_type => {
            conn.execute("DELETE FROM reactions WHERE id = ?1", params![id])?;
            return Ok(ReactionOutcome::Removed);
        }
        Some((id, _)) => {
            conn.execute(
                "UPDATE reactions SET reaction_type = ?2, created_at = ?3 WHERE id = ?1",
                params![id, reaction_type, timestamp(&now)],
            )?;
            let reaction = get_reaction(conn, &id)?;
            return Ok(ReactionOutcome::Changed(reaction));
        }
        None => new_id(),
    };

    conn.execute(
        "INSERT INTO reactions (id, post_id, author_user_id, author_admin_id, reaction_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            id,
            post_id,
            author.user_id(),
            author.admin_id(),
            reaction_type,
            timestamp(&now)
        ],
    )?;
    Ok(ReactionOutcome::Added(get_reaction(conn, &id)?))
}

fn get_reaction(conn: &Connection, id: &str) -> rusqlite::Result<Reaction> {
    conn.query_row(
        &format!("{REACTION_SELECT} WHERE r.id = ?1"),
        params![id],
        map_reaction,
    )
}

/// Reactions on a post, newest first.
pub fn list_reactions(
    conn: &Connection,
    post_id: &str,
    page: u32,
    size: u32,
) -> rusqlite::Result<Page<Reaction>> {
    let total: i64 = conn.query_row(
        "SELECT COUNT(*) FROM reactions WHERE post_id = ?1",
        params![post_id],
        |r| r.get(0),
    )?;
    let mut stmt = conn.prepare(&format!(
        "{REACTION_SELECT} WHERE r.post_id = ?1
         ORDER BY r.created_at DESC, r.id DESC LIMIT ?2 OFFSET ?3"
    ))?;
    let content = stmt
        .query_map(
            params![post_id, size, i64::from(page) * i64::from(size)],
            map_reaction,
        )?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(Page::new(content, page, size, total))
}
