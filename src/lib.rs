pub mod commands;
pub mod config;
pub mod core_state; // Transport-agnostic state shared by every host
pub mod db;
pub mod dosage;
pub mod models;
pub mod recurrence; // Pure due-date evaluation
pub mod reminders;
pub mod rollover; // Background date-change task

use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use core_state::{CoreError, CoreState};
use rollover::RolloverHandle;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default
/// filter. Calling it twice is harmless.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init();
}

/// Host entry point, called once the host has built its state.
///
/// Sweeps overdue doses and re-syncs every group's reminders (platforms may
/// drop pending notifications across reinstalls and reboots), then starts
/// the rollover task. Keep the returned handle alive.
pub async fn start(state: Arc<CoreState>) -> Result<RolloverHandle, CoreError> {
    init_tracing();
    tracing::info!("{} starting v{}", config::APP_NAME, config::APP_VERSION);

    let summary = rollover::run_rollover(&state).await?;
    tracing::info!(
        swept = summary.swept,
        groups = summary.groups,
        registered = summary.registered,
        "Startup reminder sync complete"
    );

    Ok(rollover::start_rollover(state))
}
