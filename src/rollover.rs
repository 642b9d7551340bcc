//! Background date rollover.
//!
//! One-shot reminders of non-daily plans are anchored to "today". When the
//! calendar date changes the task marks yesterday's unlogged doses missed
//! and re-syncs every group so the new day's reminders get registered.
//!
//! Must be started from inside a tokio runtime.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use serde::Serialize;
use tokio::task::JoinHandle;

use crate::commands::doses::sweep_missed;
use crate::commands::schedules::resync_group;
use crate::core_state::{CoreError, CoreState};
use crate::db::repository;

/// Sleep granularity so shutdown is noticed promptly.
const SLEEP_GRANULARITY_SECS: u64 = 1;

/// What one rollover pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RolloverSummary {
    pub swept: usize,
    pub groups: usize,
    pub registered: usize,
}

/// Handle to the background rollover task.
pub struct RolloverHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl RolloverHandle {
    /// Request graceful shutdown. A pass already running completes.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().map_or(true, |h| h.is_finished())
    }
}

impl Drop for RolloverHandle {
    fn drop(&mut self) {
        self.shutdown();
        if let Some(h) = self.handle.take() {
            h.abort();
        }
    }
}

/// Spawn the rollover task. Keep the returned handle alive for as long as
/// reminders should follow the date.
pub fn start_rollover(state: Arc<CoreState>) -> RolloverHandle {
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();

    let handle = tokio::spawn(async move {
        tracing::info!(
            check_secs = state.scheduler().config().rollover_check_secs,
            "Background rollover started"
        );
        rollover_loop(&state, &flag).await;
    });

    RolloverHandle {
        shutdown,
        handle: Some(handle),
    }
}

async fn rollover_loop(state: &CoreState, shutdown: &AtomicBool) {
    let check_secs = state.scheduler().config().rollover_check_secs.max(SLEEP_GRANULARITY_SECS);
    let mut last_date = state.today();

    while !shutdown.load(Ordering::Relaxed) {
        for _ in 0..(check_secs / SLEEP_GRANULARITY_SECS) {
            if shutdown.load(Ordering::Relaxed) {
                tracing::info!("Background rollover shutting down");
                return;
            }
            tokio::time::sleep(Duration::from_secs(SLEEP_GRANULARITY_SECS)).await;
        }

        let today = state.today();
        if !date_changed(last_date, today) {
            continue;
        }

        match run_rollover(state).await {
            Ok(summary) => {
                tracing::info!(
                    from = %last_date,
                    to = %today,
                    swept = summary.swept,
                    groups = summary.groups,
                    registered = summary.registered,
                    "Date rollover complete"
                );
                last_date = today;
            }
            // Retried on the next check.
            Err(e) => tracing::warn!(error = %e, "Date rollover failed"),
        }
    }
    tracing::info!("Background rollover shutting down");
}

fn date_changed(last: NaiveDate, today: NaiveDate) -> bool {
    last != today
}

/// One rollover pass: sweep overdue doses, then re-sync every group that
/// has an active plan.
pub async fn run_rollover(state: &CoreState) -> Result<RolloverSummary, CoreError> {
    let now = state.now();
    let (swept, group_ids) = {
        let conn = state.open_db()?;
        let swept = sweep_missed(&conn, now)?;
        (swept, repository::list_active_group_ids(&conn)?)
    };

    let mut summary = RolloverSummary {
        swept,
        groups: group_ids.len(),
        registered: 0,
    };
    for group_id in &group_ids {
        match resync_group(state, group_id).await {
            Ok(results) => {
                summary.registered += results.iter().map(|r| r.outcome.registered).sum::<usize>();
            }
            Err(e) => tracing::warn!(group_id = %group_id, error = %e, "Group re-sync failed"),
        }
    }
    Ok(summary)
}
