use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{Author, MediaType, Story};
use super::posts::author_columns;
use super::{new_id, timestamp, timestamp_column};

const STORY_SELECT: &str = "SELECT s.id, s.author_user_id, s.author_admin_id,
        COALESCE(u.name, a.name, ''), s.content_url, s.media_public_id, s.media_type,
        s.approved, s.approved_by_admin_id, s.approved_by_name, s.created_at, s.expires_at
     FROM stories s
     LEFT JOIN users u ON u.id = s.author_user_id
     LEFT JOIN admins a ON a.id = s.author_admin_id";

fn map_story(row: &Row<'_>) -> rusqlite::Result<Story> {
    Ok(Story {
        id: row.get(0)?,
        author: author_columns(row, 1)?,
        author_name: row.get(3)?,
        content_url: row.get(4)?,
        media_public_id: row.get(5)?,
        media_type: row.get(6)?,
        approved: row.get(7)?,
        approved_by_admin_id: row.get(8)?,
        approved_by_name: row.get(9)?,
        created_at: timestamp_column(row, 10)?,
        expires_at: timestamp_column(row, 11)?,
    })
}

/// The admin who approved a story, recorded alongside the flag.
#[derive(Debug, Clone)]
pub struct Approver {
    pub admin_id: String,
    pub name: String,
}

#[derive(Debug, Clone)]
pub struct NewStory {
    pub author: Author,
    pub content_url: String,
    pub media_public_id: String,
    pub media_type: MediaType,
    pub approved_by: Option<Approver>,
    pub expires_at: DateTime<Utc>,
}

pub fn insert(conn: &Connection, new: &NewStory, now: DateTime<Utc>) -> rusqlite::Result<Story> {
    let id = new_id();
    conn.execute(
        "INSERT INTO stories (id, author_user_id, author_admin_id, content_url, media_public_id,
                              media_type, approved, approved_by_admin_id, approved_by_name,
                              created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            id,
            new.author.user_id(),
            new.author.admin_id(),
            new.content_url,
            new.media_public_id,
            new.media_type,
            new.approved_by.is_some(),
            new.approved_by.as_ref().map(|a| a.admin_id.as_str()),
            new.approved_by.as_ref().map(|a| a.name.as_str()),
            timestamp(&now),
            timestamp(&new.expires_at),
        ],
    )?;
    get(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Story>> {
    conn.query_row(
        &format!("{STORY_SELECT} WHERE s.id = ?1"),
        params![id],
        map_story,
    )
    .optional()
}

pub fn list_visible(conn: &Connection, now: DateTime<Utc>) -> rusqlite::Result<Vec<Story>> {
    let mut stmt = conn.prepare(&format!(
        "{STORY_SELECT} WHERE s.approved = 1 AND s.expires_at > ?1 ORDER BY s.created_at DESC"
    ))?;
    let stories = stmt.query_map(params![timestamp(&now)], map_story)?.collect();
    stories
}

pub fn list_expired(conn: &Connection, now: DateTime<Utc>) -> rusqlite::Result<Vec<Story>> {
    let mut stmt = conn.prepare(&format!(
        "{STORY_SELECT} WHERE s.expires_at < ?1 ORDER BY s.expires_at ASC"
    ))?;
    let stories = stmt.query_map(params![timestamp(&now)], map_story)?.collect();
    stories
}

/// Set the approval flag. Approving records `approver`; revoking clears it.
pub fn set_approval(
    conn: &Connection,
    id: &str,
    approver: Option<&Approver>,
) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "UPDATE stories SET approved = ?2, approved_by_admin_id = ?3, approved_by_name = ?4
         WHERE id = ?1",
        params![
            id,
            approver.is_some(),
            approver.map(|a| a.admin_id.as_str()),
            approver.map(|a| a.name.as_str()),
        ],
    )?;
    Ok(rows > 0)
}

pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let rows = conn.execute("DELETE FROM stories WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// Delete every expired story, returning the media they referenced.
pub fn delete_expired(
    conn: &Connection,
    now: DateTime<Utc>,
) -> rusqlite::Result<Vec<(String, MediaType)>> {
    let now = timestamp(&now);
    let media = {
        let mut stmt =
            conn.prepare("SELECT media_public_id, media_type FROM stories WHERE expires_at < ?1")?;
        let rows = stmt
            .query_map(params![now], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows
    };
    conn.execute("DELETE FROM stories WHERE expires_at < ?1", params![now])?;
    Ok(media)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::admins;
    use crate::db::test_support::test_pool;
    use chrono::Duration;

    fn new_story(author: Author, approved_by: Option<Approver>, expires_at: DateTime<Utc>) -> NewStory {
        NewStory {
            author,
            content_url: "https://media.test/s.mp4".into(),
            media_public_id: "stories/s".into(),
            media_type: MediaType::Video,
            approved_by,
            expires_at,
        }
    }

    #[test]
    fn admin_story_records_approver() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let admin = admins::insert(
            &conn,
            &admins::fixtures::new_admin("Root", "root@example.com", true),
            Utc::now(),
        )
        .unwrap();
        let approver = Approver {
            admin_id: admin.id.clone(),
            name: admin.name.clone(),
        };
        let now = Utc::now();

        let story = insert(
            &conn,
            &new_story(Author::Admin(admin.id.clone()), Some(approver), now + Duration::hours(24)),
            now,
        )
        .unwrap();
        assert!(story.approved);
        assert_eq!(story.approved_by_name.as_deref(), Some("Root"));
        assert_eq!(story.author_name, "Root");
        assert_eq!(list_visible(&conn, now).unwrap().len(), 1);

        assert!(set_approval(&conn, &story.id, None).unwrap());
        let revoked = get(&conn, &story.id).unwrap().unwrap();
        assert!(!revoked.approved);
        assert!(revoked.approved_by_admin_id.is_none());
        assert!(list_visible(&conn, now).unwrap().is_empty());
    }

    #[test]
    fn delete_expired_returns_media() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let admin = admins::insert(
            &conn,
            &admins::fixtures::new_admin("Root", "root@example.com", true),
            Utc::now(),
        )
        .unwrap();
        let now = Utc::now();
        let author = Author::Admin(admin.id);

        insert(&conn, &new_story(author.clone(), None, now - Duration::minutes(1)), now).unwrap();
        let fresh = insert(&conn, &new_story(author, None, now + Duration::hours(1)), now).unwrap();

        assert_eq!(list_expired(&conn, now).unwrap().len(), 1);
        let media = delete_expired(&conn, now).unwrap();
        assert_eq!(media, vec![("stories/s".to_string(), MediaType::Video)]);
        assert!(list_expired(&conn, now).unwrap().is_empty());
        assert!(get(&conn, &fresh.id).unwrap().is_some());
    }
}
