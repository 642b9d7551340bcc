//! Reminder scheduler: keeps a plan's pending notifications in line with
//! the plan.
//!
//! Every sync is cancel-then-recreate. Ownership of a pending notification
//! is decided by its payload (`plan_id` / `medicine_id`), never by handles
//! remembered from earlier runs, so a restart between syncs loses nothing.
//! Old and new reminders never coexist because the cancel pass completes
//! before the first registration; a failed cancel leaves that one stale
//! entry behind.

use std::sync::Arc;

use chrono::{Duration, Local, NaiveDateTime, NaiveTime};
use uuid::Uuid;

use super::traits::NotificationCenter;
use super::types::*;
use crate::config::ReminderConfig;
use crate::dosage::format_dosage;
use crate::models::enums::{RepeatKind, ReminderStage};
use crate::models::{DailyTime, DosingPlan, MedicationRecord};
use crate::recurrence::{dose_events_at, DoseEvent};

/// Stages registered by a bulk sync of a non-daily plan.
const SYNC_STAGES: [ReminderStage; 2] = [ReminderStage::TenMinutesBefore, ReminderStage::OnTime];

pub struct ReminderScheduler {
    center: Arc<dyn NotificationCenter>,
    config: ReminderConfig,
}

impl ReminderScheduler {
    pub fn new(center: Arc<dyn NotificationCenter>, config: ReminderConfig) -> Self {
        Self { center, config }
    }

    pub fn config(&self) -> &ReminderConfig {
        &self.config
    }

    /// Signed offset of a stage from the dose time.
    pub fn stage_offset(&self, stage: ReminderStage) -> Duration {
        match stage {
            ReminderStage::TenMinutesBefore => Duration::minutes(-self.config.pre_dose_minutes),
            ReminderStage::OnTime => Duration::zero(),
            ReminderStage::FiveMinutesLate => Duration::minutes(self.config.late_minutes),
            ReminderStage::Missed => Duration::minutes(self.config.missed_minutes),
        }
    }

    /// Replace every reminder of `plan`, relative to the current local time.
    pub async fn sync_plan(&self, plan: &DosingPlan, records: &[MedicationRecord]) -> SyncOutcome {
        self.sync_plan_at(plan, records, Local::now().naive_local()).await
    }

    /// Replace every reminder of `plan`.
    ///
    /// Daily plans get one repeating reminder per slot. Other plans get
    /// one-shot `10min` and `on-time` reminders for today's due doses;
    /// doses that `records` show as taken or skipped get none.
    /// Never fails: denied permission and facility errors are logged and
    /// reported in the outcome.
    pub async fn sync_plan_at(
        &self,
        plan: &DosingPlan,
        records: &[MedicationRecord],
        now: NaiveDateTime,
    ) -> SyncOutcome {
        let plan_id = plan.id;
        let cancel = self.cancel_where(|p| p.plan_id == plan_id).await;

        let mut outcome = SyncOutcome {
            cancelled: cancel.cancelled,
            failed: cancel.failed,
            ..SyncOutcome::default()
        };

        if !cancel.listed {
            // Registering without a clean cancel pass would duplicate reminders.
            tracing::warn!(plan_id = %plan.id, "Skipping reminder sync: pending list unavailable");
            return outcome;
        }

        if !plan.is_active {
            tracing::debug!(plan_id = %plan.id, cancelled = outcome.cancelled, "Plan inactive, reminders cleared");
            return outcome;
        }

        outcome.permission_granted = match self.center.request_permission().await {
            Ok(granted) => granted,
            Err(e) => {
                tracing::warn!(error = %e, "Notification permission check failed");
                false
            }
        };
        if !outcome.permission_granted {
            tracing::warn!(plan_id = %plan.id, "Notification permission denied, reminders not registered");
            return outcome;
        }

        if plan.repeat_kind == RepeatKind::Daily {
            for (index, slot) in plan.daily_times.iter().enumerate() {
                match self.register_daily(plan, index, slot).await {
                    Some(_) => outcome.registered += 1,
                    None => outcome.skipped += 1,
                }
            }
        } else {
            for event in dose_events_at(plan, now.date(), records, now.time()) {
                if event.status.is_terminal() {
                    tracing::debug!(plan_id = %plan.id, time = %event.time_of_day, status = %event.status, "Dose already logged, no reminder");
                    continue;
                }
                for stage in SYNC_STAGES {
                    match self.schedule_one_at(&event, stage, now).await {
                        Some(_) => outcome.registered += 1,
                        None => outcome.skipped += 1,
                    }
                }
            }
        }

        tracing::info!(
            plan_id = %plan.id,
            kind = %plan.repeat_kind,
            cancelled = outcome.cancelled,
            registered = outcome.registered,
            skipped = outcome.skipped,
            failed = outcome.failed,
            "Reminders synced"
        );
        outcome
    }

    /// Cancel every reminder whose payload names `plan_id`.
    pub async fn cancel_for_plan(&self, plan_id: &Uuid) -> CancelOutcome {
        let plan_id = *plan_id;
        let outcome = self.cancel_where(|p| p.plan_id == plan_id).await;
        tracing::info!(plan_id = %plan_id, cancelled = outcome.cancelled, failed = outcome.failed, "Plan reminders cancelled");
        outcome
    }

    /// Cancel every reminder whose payload names `medicine_id`, across plans.
    pub async fn cancel_for_medicine(&self, medicine_id: &Uuid) -> CancelOutcome {
        let medicine_id = *medicine_id;
        let outcome = self.cancel_where(|p| p.medicine_id == medicine_id).await;
        tracing::info!(medicine_id = %medicine_id, cancelled = outcome.cancelled, failed = outcome.failed, "Medicine reminders cancelled");
        outcome
    }

    /// Register a single one-shot reminder for `event` at `stage`, relative
    /// to the current local time.
    pub async fn schedule_one(
        &self,
        event: &DoseEvent,
        stage: ReminderStage,
    ) -> Option<NotificationHandle> {
        self.schedule_one_at(event, stage, Local::now().naive_local()).await
    }

    /// Register a single one-shot reminder for `event` at `stage`.
    ///
    /// Returns `None` without registering when the time is malformed, the
    /// trigger is in the past, or it is less than `min_lead_secs` away.
    /// `None` is not an error.
    pub async fn schedule_one_at(
        &self,
        event: &DoseEvent,
        stage: ReminderStage,
        now: NaiveDateTime,
    ) -> Option<NotificationHandle> {
        let Some(dose_time) = NaiveTime::from_hms_opt(u32::from(event.hour), u32::from(event.minute), 0) else {
            tracing::debug!(plan_id = %event.plan_id, hour = event.hour, minute = event.minute, "Invalid dose time, not scheduling");
            return None;
        };

        let fire_at = event.date.and_time(dose_time) + self.stage_offset(stage);
        if fire_at - now < Duration::seconds(self.config.min_lead_secs) {
            tracing::debug!(plan_id = %event.plan_id, stage = %stage, %fire_at, "Trigger too soon or past, not scheduling");
            return None;
        }

        let tag = ReminderTag {
            plan_id: event.plan_id,
            daily_time_index: event.daily_time_index,
            stage,
            scope: ReminderScope::Date(event.date),
        };
        let record_id = event.record.as_ref().map(|r| r.id);
        let content = self.build_content(
            &tag,
            event.medicine_id,
            record_id,
            &event.medicine_name,
            &event.dosage,
            &event.unit,
            &event.time_of_day,
            event.meal.map(|m| m.phrase()),
        )?;

        self.register(content, ReminderTrigger::At { fire_at }, &tag).await
    }

    async fn register_daily(
        &self,
        plan: &DosingPlan,
        index: usize,
        slot: &DailyTime,
    ) -> Option<NotificationHandle> {
        if !slot.is_valid() {
            tracing::debug!(plan_id = %plan.id, hour = slot.hour, minute = slot.minute, "Invalid dose time, not scheduling");
            return None;
        }

        let tag = ReminderTag {
            plan_id: plan.id,
            daily_time_index: index,
            stage: ReminderStage::OnTime,
            scope: ReminderScope::Daily,
        };
        let content = self.build_content(
            &tag,
            plan.medicine_id,
            None,
            &plan.medicine_name,
            &plan.dosage_for(slot),
            &plan.unit,
            &slot.time_of_day(),
            slot.meal.map(|m| m.phrase()),
        )?;
        let trigger = ReminderTrigger::Daily {
            hour: slot.hour,
            minute: slot.minute,
            repeats: true,
        };

        self.register(content, trigger, &tag).await
    }

    async fn register(
        &self,
        content: NotificationContent,
        trigger: ReminderTrigger,
        tag: &ReminderTag,
    ) -> Option<NotificationHandle> {
        match self.center.register(content, trigger).await {
            Ok(handle) => {
                tracing::debug!(unique_id = %tag, %handle, "Reminder registered");
                Some(handle)
            }
            Err(e) => {
                tracing::warn!(unique_id = %tag, error = %e, "Reminder registration failed");
                None
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn build_content(
        &self,
        tag: &ReminderTag,
        medicine_id: Uuid,
        record_id: Option<Uuid>,
        medicine_name: &str,
        dosage: &str,
        unit: &str,
        time_of_day: &str,
        meal: Option<&str>,
    ) -> Option<NotificationContent> {
        let dose = format_dosage(dosage, unit);
        let meal = meal.map(|m| format!(" ({m})")).unwrap_or_default();

        let (title, body) = match tag.stage {
            ReminderStage::TenMinutesBefore => (
                format!("Upcoming dose: {medicine_name}"),
                format!("Take {dose} at {time_of_day}{meal}"),
            ),
            ReminderStage::OnTime => (
                format!("Time for {medicine_name}"),
                format!("Take {dose} now{meal}"),
            ),
            ReminderStage::FiveMinutesLate => (
                format!("Reminder: {medicine_name}"),
                format!("Your {time_of_day} dose of {dose} has not been recorded yet{meal}"),
            ),
            ReminderStage::Missed => (
                format!("Missed dose: {medicine_name}"),
                format!("{dose} scheduled at {time_of_day} was not taken"),
            ),
        };

        let payload = ReminderPayload::new(tag, medicine_id, record_id);
        let data = match serde_json::to_value(&payload) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(unique_id = %tag, error = %e, "Reminder payload serialization failed");
                return None;
            }
        };

        Some(NotificationContent {
            title,
            body,
            channel_id: self.config.channel_id.clone(),
            priority: self.config.priority,
            data,
        })
    }

    /// Enumerate pending notifications, keep our reminders matching `pred`,
    /// cancel each. One failed cancel does not stop the others.
    async fn cancel_where<F>(&self, pred: F) -> CancelOutcome
    where
        F: Fn(&ReminderPayload) -> bool,
    {
        let scheduled = match self.center.list_scheduled().await {
            Ok(list) => list,
            Err(e) => {
                tracing::warn!(error = %e, "Could not list scheduled notifications");
                return CancelOutcome::default();
            }
        };

        let mut outcome = CancelOutcome {
            listed: true,
            ..CancelOutcome::default()
        };

        let targets: Vec<(NotificationHandle, String)> = scheduled
            .into_iter()
            .filter_map(|entry| {
                let payload = entry.reminder_payload()?;
                pred(&payload).then_some((entry.handle, payload.unique_id))
            })
            .collect();

        for (handle, unique_id) in targets {
            match self.center.cancel(&handle).await {
                Ok(()) => outcome.cancelled += 1,
                Err(e) => {
                    tracing::warn!(%unique_id, %handle, error = %e, "Failed to cancel stale reminder");
                    outcome.failed += 1;
                }
            }
        }
        outcome
    }
}
