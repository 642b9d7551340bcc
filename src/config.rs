use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Application-level constants
pub const APP_NAME: &str = "Pillbox";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the application data directory
/// ~/Pillbox/ on all platforms, falling back to the working directory
/// when no home directory can be resolved (sandboxed mobile hosts).
pub fn app_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Pillbox")
}

/// Path of the local SQLite database.
pub fn database_path() -> PathBuf {
    app_data_dir().join("pillbox.db")
}

/// Log filter used when `RUST_LOG` is not set.
pub fn default_log_filter() -> &'static str {
    "pillbox_lib=info"
}

/// Reminder tuning shared by the scheduler and the background rollover task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderConfig {
    /// Minutes before the dose for the `10min` stage.
    pub pre_dose_minutes: i64,
    /// Minutes after the dose for the `5min-late` stage.
    pub late_minutes: i64,
    /// Minutes after the dose for the `missed` stage.
    pub missed_minutes: i64,
    /// One-shot reminders closer than this are not registered.
    pub min_lead_secs: i64,
    /// Platform notification channel.
    pub channel_id: String,
    pub priority: NotificationPriority,
    /// How often the rollover task checks for a calendar-date change.
    pub rollover_check_secs: u64,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            pre_dose_minutes: 10,
            late_minutes: 5,
            missed_minutes: 30,
            min_lead_secs: 60,
            channel_id: "medication-reminders".into(),
            priority: NotificationPriority::High,
            rollover_check_secs: 5 * 60,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Default,
    High,
    Max,
}
