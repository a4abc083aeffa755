//! Expiry, approval and archiving rules for posts, stories and memberships.

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, Utc};
use rusqlite::Connection;
use serde::Serialize;

use crate::db::models::{MediaType, PostKind, Role};
use crate::db::{archive, posts, stories, users};

pub const STORY_TTL_HOURS: i64 = 24;
pub const POST_TTL_DAYS: i64 = 7;

/// Stories go live immediately; regular posts only when an admin wrote them.
pub fn initial_post_approval(kind: PostKind, role: Role) -> bool {
    match kind {
        PostKind::Story => true,
        PostKind::Post => role.is_admin(),
    }
}

pub fn post_expiry(kind: PostKind, now: DateTime<Utc>) -> DateTime<Utc> {
    match kind {
        PostKind::Story => now + Duration::hours(STORY_TTL_HOURS),
        PostKind::Post => now + Duration::days(POST_TTL_DAYS),
    }
}

pub fn story_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(STORY_TTL_HOURS)
}

pub fn initial_story_approval(role: Role) -> bool {
    role.is_admin()
}

pub fn membership_expiry(joining: NaiveDate, membership_days: i64) -> NaiveDate {
    joining + Duration::days(membership_days)
}

/// The civil date at `now` in the membership calendar.
pub fn civil_today(now: DateTime<Utc>, utc_offset_minutes: i32) -> NaiveDate {
    match FixedOffset::east_opt(utc_offset_minutes * 60) {
        Some(offset) => now.with_timezone(&offset).date_naive(),
        None => now.date_naive(),
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SweepReport {
    pub archived_posts: usize,
    pub deleted_stories: usize,
    pub expired_memberships: usize,
}

/// Result of a sweep: counts plus story media to remove once committed.
#[derive(Debug, Clone, Default)]
pub struct SweepOutcome {
    pub report: SweepReport,
    pub story_media: Vec<(String, MediaType)>,
}

/// Archive expired posts, delete expired stories and lapse expired
/// memberships, all in one transaction.
pub fn sweep(
    conn: &mut Connection,
    now: DateTime<Utc>,
    today: NaiveDate,
) -> rusqlite::Result<SweepOutcome> {
    let tx = conn.transaction()?;

    let expired = posts::list_expired(&tx, now)?;
    for post in &expired {
        archive::archive_post(&tx, post, now)?;
        posts::delete(&tx, &post.id)?;
    }

    let story_media = stories::delete_expired(&tx, now)?;
    let expired_memberships = users::deactivate_expired_memberships(&tx, today, now)?;

    tx.commit()?;

    let report = SweepReport {
        archived_posts: expired.len(),
        deleted_stories: story_media.len(),
        expired_memberships,
    };
    tracing::info!(
        archived_posts = report.archived_posts,
        deleted_stories = report.deleted_stories,
        expired_memberships = report.expired_memberships,
        "Lifecycle sweep complete"
    );

    Ok(SweepOutcome {
        report,
        story_media,
    })
}
