//! One-time codes for verifying a user's email, mobile or WhatsApp contact.

pub mod dispatch;
pub mod email;
pub mod vonage;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use rusqlite::Connection;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::db::models::User;
use crate::db::users::{self, VerifiedContact};

pub use dispatch::Dispatcher;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Email,
    Sms,
    Whatsapp,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "email",
            Channel::Sms => "sms",
            Channel::Whatsapp => "whatsapp",
        }
    }

    pub fn contact(&self) -> VerifiedContact {
        match self {
            Channel::Email => VerifiedContact::Email,
            Channel::Sms => VerifiedContact::Mobile,
            Channel::Whatsapp => VerifiedContact::Whatsapp,
        }
    }

    /// The address on the user record this channel delivers to.
    pub fn recipient<'a>(&self, user: &'a User) -> Option<&'a str> {
        let address = match self {
            Channel::Email => Some(user.email.as_str()),
            Channel::Sms => Some(user.mobile_number.as_str()),
            Channel::Whatsapp => user.whatsapp_number.as_deref(),
        };
        address.filter(|s| !s.trim().is_empty())
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "email" => Ok(Channel::Email),
            "sms" => Ok(Channel::Sms),
            "whatsapp" => Ok(Channel::Whatsapp),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no provider configured for {0}")]
    NotConfigured(&'static str),

    #[error("{0}")]
    InvalidRecipient(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait OtpSender: Send + Sync {
    async fn send(&self, channel: Channel, recipient: &str, code: &str) -> Result<(), DispatchError>;
}

pub fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

pub fn hash_code(code: &str) -> String {
    hex::encode(Sha256::digest(code.trim().as_bytes()))
}

pub fn message_text(channel: Channel, code: &str, ttl_secs: i64) -> String {
    let minutes = (ttl_secs / 60).max(1);
    match channel {
        Channel::Whatsapp => format!(
            "Your WhatsApp OTP is: {} (valid for {} minutes).",
            code, minutes
        ),
        _ => format!("Your OTP is: {} (valid for {} minutes).", code, minutes),
    }
}

/// Generate and store a fresh code for the user on `channel`, replacing any outstanding one.
pub fn issue(
    conn: &Connection,
    user_id: &str,
    channel: Channel,
    ttl_secs: i64,
    now: DateTime<Utc>,
) -> rusqlite::Result<String> {
    let code = generate_code();
    users::store_otp(
        conn,
        user_id,
        channel.contact(),
        &hash_code(&code),
        now + Duration::seconds(ttl_secs),
    )?;
    Ok(code)
}

/// Check a submitted code against the one sent on `channel`. A match consumes
/// it and marks that contact verified. A code asked for on another channel is
/// left in place; a wrong code counts against `max_attempts`.
pub fn verify(
    conn: &Connection,
    user_id: &str,
    channel: Channel,
    code: &str,
    max_attempts: u32,
    now: DateTime<Utc>,
) -> rusqlite::Result<bool> {
    let Some(pending) = users::pending_otp(conn, user_id)? else {
        return Ok(false);
    };
    if pending.expires_at <= now || pending.contact != channel.contact() {
        return Ok(false);
    }
    if pending.hash != hash_code(code) {
        if users::record_failed_otp(conn, user_id, max_attempts)? {
            tracing::warn!("OTP for user {} dropped after {} failed attempts", user_id, max_attempts);
        }
        return Ok(false);
    }
    users::consume_otp(conn, user_id, channel.contact(), now)?;
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::test_pool;

    #[test]
    fn channel_parses_case_insensitively() {
        assert_eq!("EMAIL".parse::<Channel>(), Ok(Channel::Email));
        assert_eq!("WhatsApp".parse::<Channel>(), Ok(Channel::Whatsapp));
        assert!("fax".parse::<Channel>().is_err());
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let n: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&n));
        }
    }

    #[test]
    fn message_mentions_validity() {
        assert_eq!(
            message_text(Channel::Sms, "123456", 300),
            "Your OTP is: 123456 (valid for 5 minutes)."
        );
        assert!(message_text(Channel::Whatsapp, "123456", 300).starts_with("Your WhatsApp OTP"));
    }

    #[test]
    fn issue_then_verify_once() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let user = users::insert(
            &conn,
            &users::fixtures::new_user("Asha", "asha@example.com", "100"),
            Utc::now(),
        )
        .unwrap();
        let now = Utc::now();

        let code = issue(&conn, &user.id, Channel::Email, 300, now).unwrap();
        assert!(!verify(&conn, &user.id, Channel::Email, "000000", 5, now).unwrap());
        assert!(verify(&conn, &user.id, Channel::Email, &code, 5, now).unwrap());
        assert!(!verify(&conn, &user.id, Channel::Email, &code, 5, now).unwrap());

        let user = users::get(&conn, &user.id).unwrap().unwrap();
        assert!(user.email_verified);
    }

    #[test]
    fn expired_code_is_rejected() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let user = users::insert(
            &conn,
            &users::fixtures::new_user("Asha", "asha@example.com", "100"),
            Utc::now(),
        )
        .unwrap();
        let issued = Utc::now();
        let code = issue(&conn, &user.id, Channel::Sms, 300, issued).unwrap();

        let later = issued + Duration::seconds(301);
        assert!(!verify(&conn, &user.id, Channel::Sms, &code, 5, later).unwrap());
        assert!(!users::get(&conn, &user.id).unwrap().unwrap().mobile_verified);
    }

    #[test]
    fn code_only_verifies_the_channel_it_was_sent_on() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let user = users::insert(
            &conn,
            &users::fixtures::new_user("Asha", "asha@example.com", "100"),
            Utc::now(),
        )
        .unwrap();
        let now = Utc::now();
        let code = issue(&conn, &user.id, Channel::Email, 300, now).unwrap();

        assert!(!verify(&conn, &user.id, Channel::Sms, &code, 5, now).unwrap());
        assert!(!verify(&conn, &user.id, Channel::Whatsapp, &code, 5, now).unwrap());
        let user_row = users::get(&conn, &user.id).unwrap().unwrap();
        assert!(!user_row.mobile_verified);
        assert!(!user_row.whatsapp_verified);

        assert!(verify(&conn, &user.id, Channel::Email, &code, 5, now).unwrap());
        assert!(users::get(&conn, &user.id).unwrap().unwrap().email_verified);
    }

    #[test]
    fn too_many_wrong_guesses_burn_the_code() {
        let pool = test_pool();
        let conn = pool.get().unwrap();
        let user = users::insert(
            &conn,
            &users::fixtures::new_user("Asha", "asha@example.com", "100"),
            Utc::now(),
        )
        .unwrap();
        let now = Utc::now();
        let code = issue(&conn, &user.id, Channel::Sms, 300, now).unwrap();
        let wrong = if code == "111111" { "222222" } else { "111111" };

        for _ in 0..3 {
            assert!(!verify(&conn, &user.id, Channel::Sms, wrong, 3, now).unwrap());
        }
        assert!(!verify(&conn, &user.id, Channel::Sms, &code, 3, now).unwrap());
        assert!(!users::get(&conn, &user.id).unwrap().unwrap().mobile_verified);
    }
}
