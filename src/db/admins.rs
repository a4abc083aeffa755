use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

use super::models::Admin;
use super::users::ProfileFields;
use super::{date, new_id, opt_date_column, timestamp, timestamp_column};

const ADMIN_COLUMNS: &str = "id, name, email, mobile_number, mobile_verified, email_verified, \
     whatsapp_number, whatsapp_verified, father_name, date_of_birth, dl_number, badge_number, \
     address, blood_group, nominee_name, nominee_relationship, nominee_contact_number, \
     main_admin, active, image_url, image_public_id, created_at, updated_at";

fn map_admin(row: &Row<'_>) -> rusqlite::Result<Admin> {
    Ok(Admin {
        id: row.get(0)?,
        name: row.get(1)?,
        email: row.get(2)?,
        mobile_number: row.get(3)?,
        mobile_verified: row.get(4)?,
        email_verified: row.get(5)?,
        whatsapp_number: row.get(6)?,
        whatsapp_verified: row.get(7)?,
        father_name: row.get(8)?,
        date_of_birth: opt_date_column(row, 9)?,
        dl_number: row.get(10)?,
        badge_number: row.get(11)?,
        address: row.get(12)?,
        blood_group: row.get(13)?,
        nominee_name: row.get(14)?,
        nominee_relationship: row.get(15)?,
        nominee_contact_number: row.get(16)?,
        main_admin: row.get(17)?,
        active: row.get(18)?,
        image_url: row.get(19)?,
        image_public_id: row.get(20)?,
        created_at: timestamp_column(row, 21)?,
        updated_at: timestamp_column(row, 22)?,
    })
}

#[derive(Debug, Clone)]
pub struct NewAdmin {
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    pub password_hash: String,
    pub profile: ProfileFields,
    pub main_admin: bool,
}

#[derive(Debug, Clone, Default)]
pub struct AdminChanges {
    pub name: Option<String>,
    pub mobile_number: Option<String>,
    pub password_hash: Option<String>,
    pub profile: ProfileFields,
}

#[derive(Debug, Clone)]
pub struct AdminCredentials {
    pub id: String,
    pub email: String,
    pub name: String,
    pub password_hash: String,
    pub main_admin: bool,
    pub active: bool,
}

pub fn insert(conn: &Connection, new: &NewAdmin, now: DateTime<Utc>) -> rusqlite::Result<Admin> {
    let id = new_id();
    let now = timestamp(&now);
    conn.execute(
        "INSERT INTO admins (
            id, name, email, password_hash, mobile_number, whatsapp_number, father_name,
            date_of_birth, dl_number, badge_number, address, blood_group, nominee_name,
            nominee_relationship, nominee_contact_number, main_admin, active,
            created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, 1,
                   ?17, ?17)",
        params![
            id,
            new.name,
            new.email.to_lowercase(),
            new.password_hash,
            new.mobile_number,
            new.profile.whatsapp_number,
            new.profile.father_name,
            new.profile.date_of_birth.as_ref().map(date),
            new.profile.dl_number,
            new.profile.badge_number,
            new.profile.address,
            new.profile.blood_group,
            new.profile.nominee_name,
            new.profile.nominee_relationship,
            new.profile.nominee_contact_number,
            new.main_admin,
            now,
        ],
    )?;
    get(conn, &id)?.ok_or(rusqlite::Error::QueryReturnedNoRows)
}

pub fn get(conn: &Connection, id: &str) -> rusqlite::Result<Option<Admin>> {
    conn.query_row(
        &format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE id = ?1"),
        params![id],
        map_admin,
    )
    .optional()
}

pub fn find_by_email(conn: &Connection, email: &str) -> rusqlite::Result<Option<Admin>> {
    conn.query_row(
        &format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE email = ?1"),
        params![email.to_lowercase()],
        map_admin,
    )
    .optional()
}

pub fn email_exists(conn: &Connection, email: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT COUNT(*) > 0 FROM admins WHERE email = ?1",
        params![email.to_lowercase()],
        |r| r.get(0),
    )
}

pub fn main_admin(conn: &Connection) -> rusqlite::Result<Option<Admin>> {
    conn.query_row(
        &format!("SELECT {ADMIN_COLUMNS} FROM admins WHERE main_admin = 1"),
        [],
        map_admin,
    )
    .optional()
}

pub fn list(conn: &Connection) -> rusqlite::Result<Vec<Admin>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {ADMIN_COLUMNS} FROM admins ORDER BY main_admin DESC, created_at ASC"
    ))?;
    let admins = stmt.query_map([], map_admin)?.collect();
    admins
}

pub fn credentials(conn: &Connection, email: &str) -> rusqlite::Result<Option<AdminCredentials>> {
    conn.query_row(
        "SELECT id, email, name, password_hash, main_admin, active FROM admins WHERE email = ?1",
        params![email.to_lowercase()],
        |row| {
            Ok(AdminCredentials {
                id: row.get(0)?,
                email: row.get(1)?,
                name: row.get(2)?,
                password_hash: row.get(3)?,
                main_admin: row.get(4)?,
                active: row.get(5)?,
            })
        },
    )
    .optional()
}

pub fn update(
    conn: &Connection,
    id: &str,
    changes: &AdminChanges,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<Admin>> {
    let p = &changes.profile;
    let rows = conn.execute(
        "UPDATE admins SET
            name = COALESCE(?2, name),
            mobile_number = COALESCE(?3, mobile_number),
            password_hash = COALESCE(?4, password_hash),
            father_name = COALESCE(?5, father_name),
            date_of_birth = COALESCE(?6, date_of_birth),
            dl_number = COALESCE(?7, dl_number),
            badge_number = COALESCE(?8, badge_number),
            address = COALESCE(?9, address),
            blood_group = COALESCE(?10, blood_group),
            whatsapp_number = COALESCE(?11, whatsapp_number),
            nominee_name = COALESCE(?12, nominee_name),
            nominee_relationship = COALESCE(?13, nominee_relationship),
            nominee_contact_number = COALESCE(?14, nominee_contact_number),
            updated_at = ?15
         WHERE id = ?1",
        params![
            id,
            changes.name,
            changes.mobile_number,
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
            timestamp(&now),
        ],
    )?;
    if rows == 0 {
        return Ok(None);
    }
    get(conn, id)
}

/// Hand the main-admin flag to `new_main_id`. Both writes commit together,
/// so there is never a moment with zero or two main admins.
pub fn transfer_main(
    conn: &mut Connection,
    new_main_id: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<Option<Admin>> {
    let now = timestamp(&now);
    let tx = conn.transaction()?;

    let exists: bool = tx.query_row(
        "SELECT COUNT(*) > 0 FROM admins WHERE id = ?1",
        params![new_main_id],
        |r| r.get(0),
    )?;
    if !exists {
        return Ok(None);
    }

    tx.execute(
        "UPDATE admins SET main_admin = 0, updated_at = ?2 WHERE main_admin = 1 AND id <> ?1",
        params![new_main_id, now],
    )?;
    tx.execute(
        "UPDATE admins SET main_admin = 1, updated_at = ?2 WHERE id = ?1",
        params![new_main_id, now],
    )?;
    tx.commit()?;

    get(conn, new_main_id)
}

pub fn set_image(
    conn: &Connection,
    id: &str,
    url: &str,
    public_id: &str,
    now: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "UPDATE admins SET image_url = ?2, image_public_id = ?3, updated_at = ?4 WHERE id = ?1",
        params![id, url, public_id, timestamp(&now)],
    )?;
    Ok(rows > 0)
}

/// Delete a non-main admin. The main admin row is never removed here.
pub fn delete(conn: &Connection, id: &str) -> rusqlite::Result<bool> {
    let rows = conn.execute(
        "DELETE FROM admins WHERE id = ?1 AND main_admin = 0",
        params![id],
    )?;
    Ok(rows > 0)
}
