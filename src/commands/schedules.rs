//! Schedule commands: create, edit, pause, delete, list, and re-sync
//! reminders for a group.
//!
//! Every write persists first, then re-syncs the plan's reminders. A
//! reminder failure never rolls back the stored plan.

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core_state::{CoreError, CoreState};
use crate::db::repository::{PlanStore, RecordStore};
use crate::db::DatabaseError;
use crate::dosage::format_dosage;
use crate::models::enums::RepeatKind;
use crate::models::{DailyTime, DosingPlan, MedicationRecord, RecordFilter};
use crate::recurrence::is_due_on;
use crate::reminders::{CancelOutcome, SyncOutcome};

fn default_repeat_value() -> i32 {
    1
}

/// User-editable fields of a plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleInput {
    pub group_id: Uuid,
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub dosage: String,
    pub unit: String,
    pub repeat_kind: RepeatKind,
    #[serde(default = "default_repeat_value")]
    pub repeat_value: i32,
    #[serde(default)]
    pub weekdays: Vec<u8>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub daily_times: Vec<DailyTime>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A stored plan together with what happened to its reminders.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleSaved {
    pub plan: DosingPlan,
    pub reminders: SyncOutcome,
}

/// List row for the schedule screen.
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleCard {
    pub plan: DosingPlan,
    /// e.g. `"1片"`, `"5ml"`.
    pub dosage_label: String,
    /// Slot times joined, e.g. `"08:00, 20:00"`.
    pub times_label: String,
    pub due_today: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlanSync {
    pub plan_id: Uuid,
    pub outcome: SyncOutcome,
}

pub async fn add_schedule(state: &CoreState, input: ScheduleInput) -> Result<ScheduleSaved, CoreError> {
    let now = state.now();
    let plan = DosingPlan {
        id: Uuid::new_v4(),
        group_id: input.group_id,
        medicine_id: input.medicine_id,
        medicine_name: input.medicine_name.trim().to_string(),
        dosage: input.dosage,
        unit: input.unit,
        repeat_kind: input.repeat_kind,
        repeat_value: input.repeat_value,
        weekdays: input.weekdays,
        start_date: input.start_date,
        end_date: input.end_date,
        daily_times: input.daily_times,
        is_active: true,
        notes: input.notes,
        created_at: now,
        updated_at: now,
    };
    plan.validate()?;

    let _guard = state.lock_plan(&plan.id).await;
    {
        let conn = state.open_db()?;
        conn.upsert_plan(&plan)?;
    }
    tracing::info!(plan_id = %plan.id, group_id = %plan.group_id, kind = %plan.repeat_kind, "Schedule added");

    let reminders = state.scheduler().sync_plan_at(&plan, &[], now).await;
    Ok(ScheduleSaved { plan, reminders })
}

/// Replace the editable fields of an existing plan. Identity, active flag
/// and creation time are kept.
pub async fn update_schedule(
    state: &CoreState,
    plan_id: &Uuid,
    input: ScheduleInput,
) -> Result<ScheduleSaved, CoreError> {
    let _guard = state.lock_plan(plan_id).await;
    let now = state.now();
    let (plan, records) = {
        let conn = state.open_db()?;
        let existing = load_plan(&conn, plan_id)?;
        let plan = DosingPlan {
            id: existing.id,
            group_id: input.group_id,
            medicine_id: input.medicine_id,
            medicine_name: input.medicine_name.trim().to_string(),
            dosage: input.dosage,
            unit: input.unit,
            repeat_kind: input.repeat_kind,
            repeat_value: input.repeat_value,
            weekdays: input.weekdays,
            start_date: input.start_date,
            end_date: input.end_date,
            daily_times: input.daily_times,
            is_active: existing.is_active,
            notes: input.notes,
            created_at: existing.created_at,
            updated_at: now,
        };
        plan.validate()?;
        conn.upsert_plan(&plan)?;
        let records = records_for_day(&conn, &plan.id, now)?;
        (plan, records)
    };
    tracing::info!(plan_id = %plan.id, "Schedule updated");

    let reminders = state.scheduler().sync_plan_at(&plan, &records, now).await;
    Ok(ScheduleSaved { plan, reminders })
}

/// Pause or resume a plan. Pausing clears its reminders.
pub async fn toggle_schedule(
    state: &CoreState,
    plan_id: &Uuid,
    active: bool,
) -> Result<ScheduleSaved, CoreError> {
    let _guard = state.lock_plan(plan_id).await;
    let now = state.now();
    let (plan, records) = {
        let conn = state.open_db()?;
        load_plan(&conn, plan_id)?;
        conn.set_plan_active(plan_id, active, now)?;
        (load_plan(&conn, plan_id)?, records_for_day(&conn, plan_id, now)?)
    };
    tracing::info!(plan_id = %plan.id, active, "Schedule toggled");

    let reminders = state.scheduler().sync_plan_at(&plan, &records, now).await;
    Ok(ScheduleSaved { plan, reminders })
}

/// Delete a plan and cancel every reminder it owns. Adherence records are
/// kept as history.
pub async fn delete_schedule(state: &CoreState, plan_id: &Uuid) -> Result<CancelOutcome, CoreError> {
    let _guard = state.lock_plan(plan_id).await;
    {
        let conn = state.open_db()?;
        load_plan(&conn, plan_id)?;
        conn.delete_plan(plan_id)?;
    }
    tracing::info!(plan_id = %plan_id, "Schedule deleted");

    Ok(state.scheduler().cancel_for_plan(plan_id).await)
}

pub fn list_schedules(state: &CoreState, group_id: &Uuid) -> Result<Vec<ScheduleCard>, CoreError> {
    let today = state.today();
    let conn = state.open_db()?;
    let plans = conn.list_plans(group_id)?;

    Ok(plans
        .into_iter()
        .map(|plan| ScheduleCard {
            dosage_label: format_dosage(&plan.dosage, &plan.unit),
            times_label: plan
                .daily_times
                .iter()
                .map(DailyTime::time_of_day)
                .collect::<Vec<_>>()
                .join(", "),
            due_today: is_due_on(&plan, today),
            plan,
        })
        .collect())
}

/// Re-sync every plan of a group, e.g. on app start or after a date change.
/// Each plan is re-read under its lock, so an edit that lands while the
/// group is being walked is synced from its stored state. One plan's
/// failure does not stop the others.
pub async fn resync_group(state: &CoreState, group_id: &Uuid) -> Result<Vec<PlanSync>, CoreError> {
    let plan_ids: Vec<Uuid> = {
        let conn = state.open_db()?;
        conn.list_plans(group_id)?.into_iter().map(|p| p.id).collect()
    };

    let mut results = Vec::with_capacity(plan_ids.len());
    for plan_id in &plan_ids {
        let _guard = state.lock_plan(plan_id).await;
        let now = state.now();
        let loaded = state.open_db().and_then(|conn| {
            let Some(plan) = conn.get_plan(plan_id)? else {
                return Ok(None);
            };
            let records = records_for_day(&conn, plan_id, now)?;
            Ok(Some((plan, records)))
        });
        let (plan, records) = match loaded {
            Ok(Some(loaded)) => loaded,
            // Deleted since the group was listed.
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(plan_id = %plan_id, error = %e, "Could not load plan for re-sync");
                continue;
            }
        };

        let outcome = state.scheduler().sync_plan_at(&plan, &records, now).await;
        results.push(PlanSync {
            plan_id: plan.id,
            outcome,
        });
    }

    tracing::info!(group_id = %group_id, plans = results.len(), "Group reminders re-synced");
    Ok(results)
}

fn load_plan(store: &impl PlanStore, plan_id: &Uuid) -> Result<DosingPlan, CoreError> {
    store.get_plan(plan_id)?.ok_or_else(|| CoreError::NotFound {
        entity: "Schedule",
        id: plan_id.to_string(),
    })
}

/// The plan's records on `now`'s date, so logged doses get no reminder.
fn records_for_day(
    store: &impl RecordStore,
    plan_id: &Uuid,
    now: NaiveDateTime,
) -> Result<Vec<MedicationRecord>, DatabaseError> {
    store.list_records(&RecordFilter {
        plan_id: Some(*plan_id),
        date_from: Some(now.date()),
        date_to: Some(now.date()),
        ..RecordFilter::default()
    })
}
