use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::{ApprovalStatus, Role, User};
use super::{date, new_id, opt_date_column, opt_timestamp_column, timestamp, timestamp_column};

const USER_COLUMNS: &str = "id, username, name, email, mobile_number, mobile_verified, \
     email_verified, whatsapp_number, whatsapp_verified, role, approval_status, \
     rejection_reason, father_name, date_of_birth, dl_number, badge_number, address, \
     blood_group, nominee_name, nominee_relationship, nominee_contact_number, active, \
     date_of_joining_or_renewal, expiry_date, image_url, image_public_id, approved_at, \
     created_at, updated_at";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        name: row.get(2)?,
        email: row.get(3)?,
        mobile_number: row.get(4)?,
        mobile_verified: row.get(5)?,
        email_verified: row.get(6)?,
        whatsapp_number: row.get(7)?,
        whatsapp_verified: row.get(8)?,
        role: row.get(9)?,
        approval_status: row.get(10)?,
        rejection_reason: row.get(11)?,
        father_name: row.get(12)?,
        date_of_birth: opt_date_column(row, 13)?,
        dl_number: row.get(14)?,
        badge_number: row.get(15)?,
        address: row.get(16)?,
        blood_group: row.get(17)?,
        nominee_name: row.get(18)?,
        nominee_relationship: row.get(19)?,
        nominee_contact_number: row.get(20)?,
        active: row.get(21)?,
        date_of_joining_or_renewal: opt_date_column(row, 22)?,
        expiry_date: opt_date_column(row, 23)?,
        image_url: row.get(24)?,
        image_public_id: row.get(25)?,
        approved_at: opt_timestamp_column(row, 26)?,
        created_at: timestamp_column(row, 27)?,
        updated_at: timestamp_column(row, 28)?,
    })
}

/// Personal-detail fields shared by registration and profile edits.
#[derive(Debug, Clone, Default)]
pub struct ProfileFields {
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

#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    pub password_hash: String,
    pub profile: ProfileFields,
    pub date_of_joining_or_renewal: NaiveDate,
    pub expiry_date: NaiveDate,
}

/// A partial update; `None` leaves the column untouched.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub name: Option<String>,
    pub password_hash: Option<String>,
    pub profile: ProfileFields,
    pub membership: Option<(NaiveDate, NaiveDate)>,
}

/// What login needs and nothing more.
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub approval_status: ApprovalStatus,
    pub active: bool,
}

impl UserCredentials {
    pub fn can_log_in(&self) -> bool {
        self.approval_status == ApprovalStatus::Approved && self.active
    }
}

pub fn insert(conn: &Connection, new: &NewUser, now: DateTime<Utc>) -> rusqlite::Result<User> {
    let id = new_id();
    let now = timestamp(&now);
    conn.execute(
        "INSERT INTO users (
            id, username, name, email, password_hash, mobile_number, whatsapp_number,
            role, approval_status, father_name, date_of_birth, dl_number, badge_number,
            address, blood_group, nominee_name, nominee_relationship, nominee_contact_number,
            active, date_of_joining_or_renewal, expiry_date, created_at, updated_at
         ) VALUES (?1, ?2, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17,
                   0, ?18, ?19, ?20, ?20)",
        params![
            id,
            new.name,
            new.email.to_lowercase(),
            new.password_hash,
            new.mobile_number,
            new.profile.whatsapp_number,
            Role::User,
            ApprovalStatus::Pending,
            new.profile.father_name,
            new.profile.date_of_birth.as_ref().map(date),
            new.profile.dl_number,
            new.profile.badge_number,
            new.profile.address,
            new.profile.blood_group,
            new.profile.nominee_name,
            new.profile.nominee_relationship,
            new.profile.nominee_contact_number,
            date(&new.date_of_joining_or_renewal),
            date(&new.expiry_date),
            now,
        ],
    )?;
    get(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        map_user,
    )
    .optional()
}

pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE email = ?1"),
        params![email.to_lowercase()],
        map_user,
    )
    .optional()
}

pub fn find_by_mobile(conn: &Connection, mobile: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE mobile_number = ?1"),
        params![mobile],
        map_user,
    )
    .optional()
}

pub fn find_by_whatsapp(conn: &Connection, whatsapp: &str) -> rusqlite::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE whatsapp_number = ?1 LIMIT 1"),
        params![whatsapp],
        map_user,
    )
    .optional()
}

pub fn email_exists(conn: &Connection, email: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE email = ?1",
        params![email.to_lowercase()],
        |r| r.get(0),
    )
}

pub fn mobile_exists(conn: &Connection, mobile: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM users WHERE mobile_number = ?1",
        params![mobile],
        |r| r.get(0),
    )
}

pub fn list(conn: &Connection) -> rusqlite::Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users ORDER BY created_at ASC"
    ))?;
    let users = stmt.query_map([], map_user)?.collect();
    users
}

pub fn list_pending(conn: &Connection) -> rusqlite::Result<Vec<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE approval_status = ?1 ORDER BY created_at ASC"
    ))?;
    let users = stmt
        .query_map(params![ApprovalStatus::Pending], map_user)?
        .collect();
    users
}

pub fn credentials(conn: &Connection, email: &str) -> rusqlite::Result<Option<UserCredentials>> {
    conn.query_row(
        "SELECT id, email, name, password_hash, approval_status, active
         FROM users WHERE email = ?1",
        params![email.to_lowercase()],
        |row| {
            Ok(UserCredentials {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                password_hash: row.get(3)?,
                approval_status: row.get(4)?,
                active: row.get(5)?,
            })
        },
    )
    .optional()
}

pub fn update(
    conn: &Connection,
    id: &str,
    changes: &UserChanges,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<User>> {
    let (joining, expiry) = match &changes.membership {
        Some((joining, expiry)) => (Some(date(joining)), Some(date(expiry))),
        None => (None, None),
    };
    let p = &changes.profile;

    let rows = conn.execute(
        "UPDATE users SET
            username = COALESCE(?2, username),
            name = COALESCE(?2, name),
            password_hash = COALESCE(?3, password_hash),
            father_name = COALESCE(?4, father_name),
            date_of_birth = COALESCE(?5, date_of_birth),
            dl_number = COALESCE(?6, dl_number),
            badge_number = COALESCE(?7, badge_number),
            address = COALESCE(?8, address),
            blood_group = COALESCE(?9, blood_group),
            whatsapp_number = COALESCE(?10, whatsapp_number),
            nominee_name = COALESCE(?11, nominee_name),
            nominee_relationship = COALESCE(?12, nominee_relationship),
            nominee_contact_number = COALESCE(?13, nominee_contact_number),
            date_of_joining_or_renewal = COALESCE(?14, date_of_joining_or_renewal),
            expiry_date = COALESCE(?15, expiry_date),
            updated_at = ?16
         WHERE id = ?1",
        params![
            id,
            changes.name,
            changes.password_hash,
            p.father_name,
            p.date_of_birth.as_ref().map(date),
            p.dl_number,
            p.badge_number,
            p.address,
            p.blood_group,
            p.whatsapp_number,
            p.nominee_name,
            p.nominee_relationship,
            p.nominee_contact_number,
            joining,
            expiry,
            timestamp(&now),
        ],
    )?;

    if rows == 0 {
        return Ok(None);
    }
    get(conn, id)
}

pub fn approve(
    conn: &Connection,
    id: &str,
    joining: NaiveDate,
    expiry: NaiveDate,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<User>> {
    let now = timestamp(&now);
    let rows = conn.execute(
        "UPDATE users SET
            approval_status = ?2,
            rejection_reason = NULL,
            active = 1,
            date_of_joining_or_renewal = ?3,
            expiry_date = ?4,
            approved_at = ?5,
            updated_at = ?5
         WHERE id = ?1",
        params![
            id,
            ApprovalStatus::Approved,
            date(&joining),
            date(&expiry),
            now
        ],
    )?;
    if rows == 0 {
        return Ok(None);
    }
    get(conn, id)
}

pub fn reject(
    conn: &Connection,
    id: &str,
    reason: Option<&str>,
    now: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "UPDATE users SET approval_status = ?2, rejection_reason = ?3, active = 0, updated_at = ?4
         WHERE id = ?1",
        params![id, ApprovalStatus::Rejected, reason, timestamp(&now)],
    )?;
    Ok(rows > 0)
}

pub fn set_image(
    conn: &Connection,
    id: &str,
    url: &str,
    public_id: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "UPDATE users SET image_url = ?2, image_public_id = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, url, public_id, timestamp(&now)],
    )?;
    Ok(rows > 0)
}

pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let rows = conn.execute("DELETE FROM users WHERE id = ?1", params![id])?;
    Ok(rows > 0)
}

/// Column flipped to true when a contact channel is verified.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifiedContact {
    Email,
    Mobile,
    Whatsapp,
}

impl VerifiedContact {
    fn column(&self) -> &'static str {
        match self {
            VerifiedContact::Email => "email_verified",
            VerifiedContact::Mobile => "mobile_verified",
            VerifiedContact::Whatsapp => "whatsapp_verified",
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            VerifiedContact::Email => "email",
            VerifiedContact::Mobile => "mobile",
            VerifiedContact::Whatsapp => "whatsapp",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "email" => Some(VerifiedContact::Email),
            "mobile" => Some(VerifiedContact::Mobile),
            "whatsapp" => Some(VerifiedContact::Whatsapp),
            _ => None,
        }
    }
}

/// An outstanding code: its hash, the contact it was sent to, and failed guesses so far.
#[derive(Debug, Clone)]
pub struct PendingOtp {
    pub hash: String,
    pub contact: VerifiedContact,
    pub expires_at: DateTime<Utc>,
    pub attempts: u32,
}

pub fn store_otp(
    conn: &Connection,
    id: &str,
    contact: VerifiedContact,
    otp_hash: &str,
    expires_at: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "UPDATE users SET otp_hash = ?2, otp_channel = ?3, otp_expires_at = ?4, otp_attempts = 0
         WHERE id = ?1",
        params![id, otp_hash, contact.as_str(), timestamp(&expires_at)],
    )?;
    Ok(())
}

pub fn pending_otp(conn: &Connection, id: &str) -> rusqlite::Result<Option<PendingOtp>> {
    let row = conn
        .query_row(
            "SELECT otp_hash, otp_channel, otp_expires_at, otp_attempts FROM users WHERE id = ?1",
            params![id],
            |row| {
                let hash: Option<String> = row.get(0)?;
                let channel: Option<String> = row.get(1)?;
                let expires = opt_timestamp_column(row, 2)?;
                let attempts: u32 = row.get(3)?;
                let contact = channel.as_deref().and_then(VerifiedContact::parse);
                Ok(hash.zip(contact).zip(expires).map(|((hash, contact), expires_at)| {
                    PendingOtp {
                        hash,
                        contact,
                        expires_at,
                        attempts,
                    }
                }))
            },
        )
        .optional()?;
    Ok(row.flatten())
}

/// Count a wrong guess; the code is dropped once `max_attempts` is reached.
/// Returns true if the code was dropped.
pub fn record_failed_otp(conn: &Connection, id: &str, max_attempts: u32) -> rusqlite::Result<bool> {
    conn.execute(
        "UPDATE users SET otp_attempts = otp_attempts + 1 WHERE id = ?1 AND otp_hash IS NOT NULL",
        params![id],
    )?;
    let dropped = conn.execute(
        "UPDATE users SET otp_hash = NULL, otp_channel = NULL, otp_expires_at = NULL, otp_attempts = 0
         WHERE id = ?1 AND otp_hash IS NOT NULL AND otp_attempts >= ?2",
        params![id, max_attempts],
    )?;
    Ok(dropped > 0)
}

pub fn consume_otp(
    conn: &Connection,
    id: &str,
    contact: VerifiedContact,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        &format!(
            "UPDATE users SET otp_hash = NULL, otp_channel = NULL, otp_expires_at = NULL,
                 otp_attempts = 0, {} = 1, updated_at = ?2
             WHERE id = ?1",
            contact.column()
        ),
        params![id, timestamp(&now)],
    )?;
    Ok(())
}

/// Deactivate members whose expiry date has passed. Returns the number affected.
pub fn deactivate_expired_memberships(
    conn: &Connection,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> rusqlite::Result<usize> {
    conn.execute(
        "UPDATE users SET active = 0, updated_at = ?2
         WHERE active = 1 AND expiry_date IS NOT NULL AND expiry_date < ?1",
        params![date(&today), timestamp(&now)],
    )
}


#[cfg(test)]
mod tests {
    use super::fixtures::new_user;
    use super::*;
    use crate::db::test_support::test_pool;

    #[test]
    fn insert_creates_pending_inactive_user() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let user = insert(&conn, &new_user("Asha", "asha@example.com", "100"), Utc::now()).unwrap();

        assert_eq!(user.username, "Asha");
        assert_eq!(user.role, Role::User);
        assert_eq!(user.approval_status, ApprovalStatus::Pending);
        assert!(!user.active);
        assert!(email_exists(&conn, "ASHA@example.com").unwrap());
        assert!(mobile_exists(&conn, "100").unwrap());
    }

    #[test]
    fn update_only_overwrites_provided_fields() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let mut new = new_user("Asha", "asha@example.com", "100");
        new.profile.address = Some("Old street".into());
        new.profile.blood_group = Some("O+".into());
        let user = insert(&conn, &new, Utc::now()).unwrap();

        let changes = UserChanges {
            profile: ProfileFields {
                address: Some("New street".into()),
                ..Default::default()
            },
            ..Default::default()
        };
        let updated = update(&conn, &user.id, &changes, Utc::now()).unwrap().unwrap();

        assert_eq!(updated.address.as_deref(), Some("New street"));
        assert_eq!(updated.blood_group.as_deref(), Some("O+"));
        assert_eq!(updated.name, "Asha");
    }

    #[test]
    fn update_missing_user_returns_none() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        assert!(update(&conn, "nope", &UserChanges::default(), Utc::now())
            .unwrap()
            .is_none());
    }

    #[test]
    fn approve_then_reject() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let user = insert(&conn, &new_user("Asha", "asha@example.com", "100"), Utc::now()).unwrap();
        let joining = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2026, 5, 31).unwrap();

        let approved = approve(&conn, &user.id, joining, expiry, Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(approved.approval_status, ApprovalStatus::Approved);
        assert!(approved.active);
        assert_eq!(approved.expiry_date, Some(expiry));
        assert!(approved.approved_at.is_some());

        assert!(reject(&conn, &user.id, Some("duplicate"), Utc::now()).unwrap());
        let rejected = get(&conn, &user.id).unwrap().unwrap();
        assert_eq!(rejected.approval_status, ApprovalStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("duplicate"));
        assert!(!rejected.active);
    }

    #[test]
    fn otp_round_trip_marks_contact_verified() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let user = insert(&conn, &new_user("Asha", "asha@example.com", "100"), Utc::now()).unwrap();
        let expires = Utc::now() + chrono::Duration::minutes(5);

        store_otp(&conn, &user.id, VerifiedContact::Mobile, "abc", expires).unwrap();
        let pending = pending_otp(&conn, &user.id).unwrap().unwrap();
        assert_eq!(pending.hash, "abc");
        assert_eq!(pending.contact, VerifiedContact::Mobile);
        assert_eq!(pending.attempts, 0);
        assert_eq!(timestamp(&pending.expires_at), timestamp(&expires));

        consume_otp(&conn, &user.id, VerifiedContact::Mobile, Utc::now()).unwrap();
        assert!(pending_otp(&conn, &user.id).unwrap().is_none());
        let user = get(&conn, &user.id).unwrap().unwrap();
        assert!(user.mobile_verified);
        assert!(!user.email_verified);
    }

    #[test]
    fn failed_otp_guesses_drop_the_code() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let user = insert(&conn, &new_user("Asha", "asha@example.com", "100"), Utc::now()).unwrap();
        let expires = Utc::now() + chrono::Duration::minutes(5);
        store_otp(&conn, &user.id, VerifiedContact::Email, "abc", expires).unwrap();

        assert!(!record_failed_otp(&conn, &user.id, 3).unwrap());
        assert!(!record_failed_otp(&conn, &user.id, 3).unwrap());
        assert_eq!(pending_otp(&conn, &user.id).unwrap().unwrap().attempts, 2);
        assert!(record_failed_otp(&conn, &user.id, 3).unwrap());
        assert!(pending_otp(&conn, &user.id).unwrap().is_none());

        store_otp(&conn, &user.id, VerifiedContact::Email, "def", expires).unwrap();
        assert_eq!(pending_otp(&conn, &user.id).unwrap().unwrap().attempts, 0);
    }

    #[test]
    fn duplicate_contact_is_a_unique_violation() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        insert(&conn, &new_user("Asha", "asha@example.com", "100"), Utc::now()).unwrap();

        let err = insert(&conn, &new_user("Other", "ASHA@example.com", "200"), Utc::now()).unwrap_err();
        assert_eq!(crate::db::unique_violation(&err), Some("users.email"));
        let err = insert(&conn, &new_user("Other", "other@example.com", "100"), Utc::now()).unwrap_err();
        assert_eq!(crate::db::unique_violation(&err), Some("users.mobile_number"));
    }

    #[test]
    fn expired_memberships_are_deactivated() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let user = insert(&conn, &new_user("Asha", "asha@example.com", "100"), Utc::now()).unwrap();
        let joining = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let expiry = NaiveDate::from_ymd_opt(2024, 12, 30).unwrap();
        approve(&conn, &user.id, joining, expiry, Utc::now()).unwrap();

        let day_of_expiry = expiry;
        assert_eq!(
            deactivate_expired_memberships(&conn, day_of_expiry, Utc::now()).unwrap(),
            0
        );
        let day_after = expiry.succ_opt().unwrap();
        assert_eq!(
            deactivate_expired_memberships(&conn, day_after, Utc::now()).unwrap(),
            1
        );
        assert!(!get(&conn, &user.id).unwrap().unwrap().active);
    }
}
