use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::JwtKeys;
use crate::config::Config;
use crate::media::MediaHost;
use crate::otp::OtpSender;

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub jwt: Arc<JwtKeys>,
    pub media: Arc<dyn MediaHost>,
    pub otp: Arc<dyn OtpSender>,
}
