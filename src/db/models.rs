use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Enums stored as their upper-case wire name in TEXT columns.
macro_rules! text_enum {
    ($name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.to_ascii_uppercase().as_str() {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {}: {}", stringify!($name), other)),
                }
            }
        }

        impl ToSql for $name {
            fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
                Ok(ToSqlOutput::from(self.as_str()))
            }
        }

        impl FromSql for $name {
            fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
                value
                    .as_str()?
                    .parse()
                    .map_err(|e: String| FromSqlError::Other(e.into()))
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    User,
    Admin,
    MainAdmin,
}

text_enum!(Role {
    User => "USER",
    Admin => "ADMIN",
    MainAdmin => "MAIN_ADMIN",
});

impl Role {
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin | Role::MainAdmin)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

text_enum!(ApprovalStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    Rejected => "REJECTED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PostKind {
    Post,
    Story,
}

text_enum!(PostKind {
    Post => "POST",
    Story => "STORY",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Image,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Image => "image",
            MediaType::Video => "video",
        }
    }

    /// Classify a MIME type; anything other than image/* or video/* is rejected.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let top = mime.split('/').next()?.trim().to_ascii_lowercase();
        match top.as_str() {
            "image" => Some(MediaType::Image),
            "video" => Some(MediaType::Video),
            _ => None,
        }
    }
}

impl ToSql for MediaType {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for MediaType {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value.as_str()? {
            "image" => Ok(MediaType::Image),
            "video" => Ok(MediaType::Video),
            other => Err(FromSqlError::Other(
                format!("unknown media type: {other}").into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReactionType {
    Like,
    Dislike,
}

text_enum!(ReactionType {
    Like => "LIKE",
    Dislike => "DISLIKE",
});

/// Who wrote a piece of content. Users and admins live in separate tables,
/// so content rows carry one of two nullable author columns.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Author {
    User(String),
    Admin(String),
}

impl Author {
    pub fn user_id(&self) -> Option<&str> {
        match self {
            Author::User(id) => Some(id),
            Author::Admin(_) => None,
        }
    }

    pub fn admin_id(&self) -> Option<&str> {
        match self {
            Author::Admin(id) => Some(id),
            Author::User(_) => None,
        }
    }

    pub(crate) fn from_columns(user_id: Option<String>, admin_id: Option<String>) -> Option<Self> {
        match (user_id, admin_id) {
            (Some(id), None) => Some(Author::User(id)),
            (None, Some(id)) => Some(Author::Admin(id)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    pub mobile_verified: bool,
    pub email_verified: bool,
    pub whatsapp_number: Option<String>,
    pub whatsapp_verified: bool,
    pub role: Role,
    pub approval_status: ApprovalStatus,
    pub rejection_reason: Option<String>,
    pub father_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub dl_number: Option<String>,
    pub badge_number: Option<String>,
    pub address: Option<String>,
    pub blood_group: Option<String>,
    pub nominee_name: Option<String>,
    pub nominee_relationship: Option<String>,
    pub nominee_contact_number: Option<String>,
    pub active: bool,
    pub date_of_joining_or_renewal: Option<NaiveDate>,
    pub expiry_date: Option<NaiveDate>,
    pub image_url: Option<String>,
    #[serde(skip)]
    pub image_public_id: Option<String>,
    pub approved_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: String,
    pub name: String,
    pub email: String,
    pub mobile_number: String,
    pub mobile_verified: bool,
    pub email_verified: bool,
    pub whatsapp_number: Option<String>,
    pub whatsapp_verified: bool,
    pub father_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub dl_number: Option<String>,
    pub badge_number: Option<String>,
    pub address: Option<String>,
    pub blood_group: Option<String>,
    pub nominee_name: Option<String>,
    pub nominee_relationship: Option<String>,
    pub nominee_contact_number: Option<String>,
    pub main_admin: bool,
    pub active: bool,
    pub image_url: Option<String>,
    #[serde(skip)]
    pub image_public_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Admin {
    pub fn role(&self) -> Role {
        if self.main_admin {
            Role::MainAdmin
        } else {
            Role::Admin
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Post {
    pub id: String,
    pub author: Author,
    pub author_name: String,
    pub content_url: String,
    #[serde(skip)]
    pub media_public_id: String,
    pub media_type: MediaType,
    pub kind: PostKind,
    pub approved: bool,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Post {
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.approved && self.expires_at > now
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Story {
    pub id: String,
    pub author: Author,
    pub author_name: String,
    pub content_url: String,
    #[serde(skip)]
    pub media_public_id: String,
    pub media_type: MediaType,
    pub approved: bool,
    pub approved_by_admin_id: Option<String>,
    pub approved_by_name: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub author: Author,
    pub author_name: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Reaction {
    pub id: String,
    pub post_id: String,
    pub author: Author,
    pub author_name: String,
    pub reaction_type: ReactionType,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ArchivedPost {
    pub id: String,
    pub original_post_id: String,
    pub content_url: String,
    pub media_type: MediaType,
    pub kind: PostKind,
    pub author: Option<Author>,
    pub created_at: DateTime<Utc>,
    pub archived_at: DateTime<Utc>,
}

/// One page of a listing, shaped like the frontend expects.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub content: Vec<T>,
    pub page: u32,
    pub size: u32,
    pub total_elements: i64,
    pub total_pages: i64,
}

impl<T> Page<T> {
    pub fn new(content: Vec<T>, page: u32, size: u32, total_elements: i64) -> Self {
        let size_i = i64::from(size.max(1));
        Self {
            content,
            page,
            size,
            total_elements,
            total_pages: (total_elements + size_i - 1) / size_i,
        }
    }
}
