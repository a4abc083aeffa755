use chrono::Utc;

use crate::auth::password;
use crate::config::BootstrapConfig;
use crate::db::admins::{self, NewAdmin};
use crate::db::users::ProfileFields;
use crate::state::DbPool;

/// Create the main admin on first start. Does nothing once one exists.
pub fn ensure_main_admin(pool: &DbPool, cfg: &BootstrapConfig) -> anyhow::Result<()> {
    let mut conn = pool.get()?;

    if let Some(existing) = admins::main_admin(&conn)? {
        tracing::info!("Main admin present: {}", existing.email);
        return Ok(());
    }

    let (plain, generated) = match &cfg.main_admin_password {
        Some(pw) if !pw.trim().is_empty() => (pw.clone(), false),
        _ => (password::generate(20), true),
    };

    let new = NewAdmin {
        name: cfg.main_admin_name.clone(),
        email: cfg.main_admin_email.clone(),
        mobile_number: cfg.main_admin_mobile.clone(),
        password_hash: password::hash(&plain).map_err(|e| anyhow::anyhow!(e.to_string()))?,
        profile: ProfileFields::default(),
        main_admin: true,
    };

    match admins::find_by_email(&conn, &new.email)? {
        // An ordinary admin already holds the configured address; promote it.
        Some(admin) => {
            admins::transfer_main(&mut conn, &admin.id, Utc::now())?;
            tracing::info!("Promoted existing admin {} to main admin", admin.email);
        }
        None => {
            let admin = admins::insert(&conn, &new, Utc::now())?;
            if generated {
                tracing::warn!(
                    "Created main admin {} with generated password: {}",
                    admin.email,
                    plain
                );
            } else {
                tracing::info!("Created main admin {}", admin.email);
            }
        }
    }

    Ok(())
}
