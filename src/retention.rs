//! Retention task: purge stale reports and reset the aggregate
//!
//! Runs once at startup, then on every local-midnight boundary. Reports older
//! than the retention window are bulk-deleted; on success the whole
//! in-memory aggregate is cleared rather than patched, trading a short window
//! of zeroed sums for not having to know which rows the delete removed. New
//! submissions repopulate the aggregate immediately.

use crate::repo::ReportRepository;
use crate::stats::RegionalStats;
use chrono::{DateTime, Local};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval, Duration, MissedTickBehavior};

/// Reports older than this many days are purged.
const RETENTION_DAYS: i64 = 3;

/// Cadence of the purge loop once the first midnight has passed.
const PURGE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Time remaining until the next local midnight.
///
/// Computed on naive local time so the result is well defined even across
/// DST transitions (the tick may drift by the offset change, which is
/// harmless for a daily purge).
pub fn delay_until_midnight(now: DateTime<Local>) -> Duration {
    let naive = now.naive_local();
    let next_midnight = (naive.date() + chrono::Duration::days(1))
        .and_hms_opt(0, 0, 0)
        .unwrap_or(naive);
    (next_midnight - naive).to_std().unwrap_or(Duration::ZERO)
}

/// One purge cycle: bulk-delete then reset the aggregate.
///
/// On storage failure nothing is reset; the next scheduled tick retries
/// naturally, so there is no tight retry loop against a down backend.
async fn purge_old_reports(repo: &dyn ReportRepository, stats: &RegionalStats) {
    let cutoff = Local::now().date_naive() - chrono::Duration::days(RETENTION_DAYS);

    match repo.delete_older_than(cutoff).await {
        Ok(deleted) => {
            stats.clear_all();
            log::info!(
                "purged {} report(s) older than {}, aggregate reset",
                deleted,
                cutoff
            );
        }
        Err(e) => {
            log::error!("failed to purge reports older than {}: {}", cutoff, e);
        }
    }
}

/// Background retention loop.
///
/// Purges immediately on start, waits until the next local midnight, then
/// purges on a fixed 24-hour cadence. The shutdown signal is checked only at
/// the two wait points; a purge already in progress runs to completion.
pub async fn retention_task(
    repo: Arc<dyn ReportRepository>,
    stats: Arc<RegionalStats>,
    mut shutdown: watch::Receiver<bool>,
) {
    purge_old_reports(repo.as_ref(), stats.as_ref()).await;

    let delay = delay_until_midnight(Local::now());
    log::info!("waiting {:?} until next midnight for purge schedule", delay);

    tokio::select! {
        _ = tokio::time::sleep(delay) => {}
        _ = shutdown.changed() => {
            log::info!("retention task cancelled before first scheduled run");
            return;
        }
    }

    let mut timer = interval(PURGE_INTERVAL);
    timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = timer.tick() => {
                purge_old_reports(repo.as_ref(), stats.as_ref()).await;
            }
            _ = shutdown.changed() => {
                log::info!("retention task cancelled");
                return;
            }
        }
    }
}
