use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::auth::request_token;
use crate::db::models::{ApprovalStatus, Author, Role};
use crate::db::{admins, users};
use crate::error::{AppError, AppResult};
use crate::state::AppState;

/// Represents the currently authenticated account, user or admin.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
    pub name: String,
    pub role: Role,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }

    pub fn is_main_admin(&self) -> bool {
        self.role == Role::MainAdmin
    }

    pub fn require_admin(&self) -> AppResult<()> {
        if self.is_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("Admin access required"))
        }
    }

    pub fn require_main_admin(&self) -> AppResult<()> {
        if self.is_main_admin() {
            Ok(())
        } else {
            Err(AppError::forbidden("Main admin access required"))
        }
    }

    /// Users may act on their own account; admins on any user account.
    pub fn require_self_or_admin(&self, user_id: &str) -> AppResult<()> {
        if self.is_admin() || (self.role == Role::User && self.id == user_id) {
            Ok(())
        } else {
            Err(AppError::forbidden("Access denied"))
        }
    }

    pub fn author(&self) -> Author {
        if self.is_admin() {
            Author::Admin(self.id.clone())
        } else {
            Author::User(self.id.clone())
        }
    }
}

/// Extractor that requires a valid JWT whose account still exists and may log in.
/// The role is read from the database, not trusted from the token.
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = request_token(&parts.headers, &state.config.auth.cookie_name)
            .ok_or(AppError::Unauthorized)?;
        let claims = state.jwt.verify(token)?;

        let conn = state.db.get()?;
        if claims.role.is_admin() {
            let admin = admins::find_by_email(&conn, &claims.sub)?
                .filter(|a| a.active)
                .ok_or(AppError::Unauthorized)?;
            Ok(CurrentUser {
                role: admin.role(),
                id: admin.id,
                email: admin.email,
                name: admin.name,
            })
        } else {
            let user = users::find_by_email(&conn, &claims.sub)?
                .filter(|u| u.active && u.approval_status == ApprovalStatus::Approved)
                .ok_or(AppError::Unauthorized)?;
            Ok(CurrentUser {
                id: user.id,
                email: user.email,
                name: user.name,
                role: Role::User,
            })
        }
    }
}

/// Optional user extractor: `None` instead of 401 when not authenticated.
pub struct MaybeUser(pub Option<CurrentUser>);

impl FromRequestParts<AppState> for MaybeUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match CurrentUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::Unauthorized | AppError::Jwt(_)) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}
