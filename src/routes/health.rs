use axum::extract::State;
use axum::routing::get;
use axum::Router;

use crate::error::AppResult;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}

async fn health(State(state): State<AppState>) -> AppResult<&'static str> {
    let conn = state.db.get()?;
    conn.query_row("SELECT 1", [], |r| r.get::<_, i64>(0))?;
    Ok("ok")
}
