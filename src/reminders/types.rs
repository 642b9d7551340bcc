//! Types exchanged with the notification facility.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::error::ReminderError;
use crate::config::NotificationPriority;
use crate::models::enums::ReminderStage;

/// Which day a reminder belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReminderScope {
    /// Repeats every day.
    Daily,
    /// One-shot on a specific date.
    Date(NaiveDate),
}

impl fmt::Display for ReminderScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Daily => f.write_str("daily"),
            Self::Date(d) => write!(f, "{}", d.format("%Y-%m-%d")),
        }
    }
}

/// Structured reminder identity.
///
/// Serialized as `{plan_id}_{daily_time_index}_{stage}_{date|daily}` only
/// when it crosses into the notification payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ReminderTag {
    pub plan_id: Uuid,
    pub daily_time_index: usize,
    pub stage: ReminderStage,
    pub scope: ReminderScope,
}

impl ReminderTag {
    pub fn unique_id(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ReminderTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}_{}_{}_{}",
            self.plan_id, self.daily_time_index, self.stage, self.scope
        )
    }
}

impl FromStr for ReminderTag {
    type Err = ReminderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || ReminderError::MalformedTag(s.to_string());

        // Neither UUIDs, stage names nor ISO dates contain '_'.
        let parts: Vec<&str> = s.split('_').collect();
        let [plan_id, index, stage, scope] = parts.as_slice() else {
            return Err(malformed());
        };

        let scope = if *scope == "daily" {
            ReminderScope::Daily
        } else {
            ReminderScope::Date(
                NaiveDate::parse_from_str(scope, "%Y-%m-%d").map_err(|_| malformed())?,
            )
        };

        Ok(Self {
            plan_id: Uuid::parse_str(plan_id).map_err(|_| malformed())?,
            daily_time_index: index.parse().map_err(|_| malformed())?,
            stage: ReminderStage::from_str(stage).map_err(|_| malformed())?,
            scope,
        })
    }
}

/// Data attached to every reminder; the join key for enumeration and cancel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub unique_id: String,
    pub plan_id: Uuid,
    pub medicine_id: Uuid,
    pub daily_time_index: usize,
    pub stage: ReminderStage,
    pub record_id: Option<Uuid>,
}

impl ReminderPayload {
    pub fn new(tag: &ReminderTag, medicine_id: Uuid, record_id: Option<Uuid>) -> Self {
        Self {
            unique_id: tag.unique_id(),
            plan_id: tag.plan_id,
            medicine_id,
            daily_time_index: tag.daily_time_index,
            stage: tag.stage,
            record_id,
        }
    }

    /// Structured tag recovered from `unique_id`.
    pub fn tag(&self) -> Result<ReminderTag, ReminderError> {
        self.unique_id.parse()
    }
}

/// What the platform shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub channel_id: String,
    pub priority: NotificationPriority,
    /// Opaque to the facility; reminders store a [`ReminderPayload`] here.
    pub data: serde_json::Value,
}

/// When the platform fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReminderTrigger {
    /// Fires once at a local wall-clock instant.
    At { fire_at: NaiveDateTime },
    /// Fires at hour:minute, every day when `repeats` is set.
    Daily { hour: u8, minute: u8, repeats: bool },
}

/// Platform-assigned identifier, only usable for direct cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationHandle(pub String);

impl fmt::Display for NotificationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One entry of the facility's pending list. Entries registered by other
/// subsystems carry data that is not a [`ReminderPayload`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledNotification {
    pub handle: NotificationHandle,
    pub data: serde_json::Value,
}

impl ScheduledNotification {
    pub fn reminder_payload(&self) -> Option<ReminderPayload> {
        serde_json::from_value(self.data.clone()).ok()
    }
}

/// Result of a cancel pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelOutcome {
    pub cancelled: usize,
    pub failed: usize,
    /// False when the pending list could not be read; nothing was cancelled.
    pub listed: bool,
}

/// Result of re-syncing one plan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub cancelled: usize,
    pub registered: usize,
    /// Registrations declined (too soon, in the past, invalid time) or failed.
    pub skipped: usize,
    pub failed: usize,
    pub permission_granted: bool,
}
