use chrono::{DateTime, Duration, NaiveTime, Utc};

use crate::error::AppResult;
use crate::lifecycle::{self, SweepReport};
use crate::media;
use crate::state::AppState;

/// The next `hour:00` UTC strictly after `now`.
pub fn next_run_after(now: DateTime<Utc>, hour: u32) -> DateTime<Utc> {
    let at = NaiveTime::from_hms_opt(hour.min(23), 0, 0).unwrap_or(NaiveTime::MIN);
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

/// Run the lifecycle sweep now, then remove media of deleted stories.
pub async fn run_sweep(state: &AppState) -> AppResult<SweepReport> {
    let now = Utc::now();
    let today = lifecycle::civil_today(now, state.config.lifecycle.utc_offset_minutes);

    let outcome = {
        let mut conn = state.db.get()?;
        lifecycle::sweep(&mut conn, now, today)?
    };

    for (public_id, media_type) in &outcome.story_media {
        media::delete_quietly(state.media.as_ref(), public_id, *media_type).await;
    }

    Ok(outcome.report)
}

/// Daily sweep loop. Failures are logged and the loop carries on.
pub async fn schedule_daily_sweep(state: AppState) {
    let hour = state.config.lifecycle.sweep_hour_utc;
    loop {
        let now = Utc::now();
        let next = next_run_after(now, hour);
        tracing::info!("Next lifecycle sweep at {}", next);

        let wait = (next - now).to_std().unwrap_or_default();
        tokio::time::sleep(wait).await;

        if let Err(e) = run_sweep(&state).await {
            tracing::error!("Lifecycle sweep failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_run_later_today() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 1, 30, 0).unwrap();
        assert_eq!(
            next_run_after(now, 2),
            Utc.with_ymd_and_hms(2025, 5, 1, 2, 0, 0).unwrap()
        );
    }

    #[test]
    fn next_run_tomorrow_once_passed() {
        let now = Utc.with_ymd_and_hms(2025, 5, 1, 2, 0, 0).unwrap();
        assert_eq!(
            next_run_after(now, 2),
            Utc.with_ymd_and_hms(2025, 5, 2, 2, 0, 0).unwrap()
        );
        let evening = Utc.with_ymd_and_hms(2025, 12, 31, 23, 0, 0).unwrap();
        assert_eq!(
            next_run_after(evening, 2),
            Utc.with_ymd_and_hms(2026, 1, 1, 2, 0, 0).unwrap()
        );
    }
}
