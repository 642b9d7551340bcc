//! Today's doses and intake logging.

use chrono::{NaiveDate, NaiveDateTime};
use serde::Serialize;
use uuid::Uuid;

use crate::core_state::{CoreError, CoreState};
use crate::db::repository::{PlanStore, RecordStore};
use crate::db::DatabaseError;
use crate::dosage::format_dosage;
use crate::models::enums::RecordStatus;
use crate::models::{DosingPlan, MedicationRecord, RecordFilter};
use crate::recurrence::{dose_events_at, DoseEvent};

/// Row of the "today" screen.
#[derive(Debug, Clone, Serialize)]
pub struct DoseCard {
    #[serde(flatten)]
    pub event: DoseEvent,
    pub dosage_label: String,
}

/// Every dose of a group due today, across plans, ordered by time.
///
/// Doses without a record get one on first read, carrying the computed
/// status, so intake can be logged against a stable record id.
pub fn get_today_doses(state: &CoreState, group_id: &Uuid) -> Result<Vec<DoseCard>, CoreError> {
    let now = state.now();
    let conn = state.open_db()?;
    let events = doses_for_day(&conn, group_id, now.date(), now)?;

    Ok(events
        .into_iter()
        .map(|event| DoseCard {
            dosage_label: format_dosage(&event.dosage, &event.unit),
            event,
        })
        .collect())
}

fn doses_for_day<S: PlanStore + RecordStore>(
    store: &S,
    group_id: &Uuid,
    date: NaiveDate,
    now: NaiveDateTime,
) -> Result<Vec<DoseEvent>, CoreError> {
    let plans = store.list_plans(group_id)?;
    let records = store.list_records(&RecordFilter::for_day(*group_id, date))?;

    let mut events = Vec::new();
    let mut created = 0usize;
    for plan in &plans {
        for mut event in dose_events_at(plan, date, &records, now.time()) {
            if event.record.is_none() {
                let record = record_for_event(plan, &event, now);
                if store.insert_record_if_absent(&record)? {
                    created += 1;
                    event.record = Some(record);
                } else if let Some(existing) = store.find_record(&plan.id, date, &event.time_of_day)? {
                    // Written by a concurrent reader between the list and the insert.
                    event.status = existing.status;
                    event.record = Some(existing);
                }
            }
            events.push(event);
        }
    }
    events.sort_by(|a, b| a.time_of_day.cmp(&b.time_of_day));

    if created > 0 {
        tracing::debug!(group_id = %group_id, %date, created, "Materialized dose records");
    }
    Ok(events)
}

fn record_for_event(plan: &DosingPlan, event: &DoseEvent, now: NaiveDateTime) -> MedicationRecord {
    MedicationRecord {
        id: Uuid::new_v4(),
        group_id: plan.group_id,
        user_id: None,
        plan_id: plan.id,
        medicine_id: plan.medicine_id,
        record_date: event.date,
        time_of_day: event.time_of_day.clone(),
        dosage: event.dosage.clone(),
        meal: event.meal,
        status: event.status,
        notes: None,
        taken_at: None,
        created_at: now,
        updated_at: now,
    }
}

/// Log an intake. A missed dose can still be taken late.
pub fn mark_dose_taken(state: &CoreState, record_id: &Uuid) -> Result<MedicationRecord, CoreError> {
    let now = state.now();
    transition(state, record_id, RecordStatus::Taken, Some(now))
}

pub fn skip_dose(state: &CoreState, record_id: &Uuid) -> Result<MedicationRecord, CoreError> {
    transition(state, record_id, RecordStatus::Skipped, None)
}

fn transition(
    state: &CoreState,
    record_id: &Uuid,
    to: RecordStatus,
    taken_at: Option<NaiveDateTime>,
) -> Result<MedicationRecord, CoreError> {
    let now = state.now();
    let conn = state.open_db()?;
    let not_found = || CoreError::NotFound {
        entity: "MedicationRecord",
        id: record_id.to_string(),
    };
    let mut record = conn.get_record(record_id)?.ok_or_else(not_found)?;

    if record.status.is_terminal() {
        return Err(CoreError::InvalidTransition {
            from: record.status,
            to,
        });
    }

    if !conn.update_record_status(record_id, to, taken_at, now)? {
        // Another writer made it terminal after our read.
        let current = conn.get_record(record_id)?.ok_or_else(not_found)?;
        return Err(CoreError::InvalidTransition {
            from: current.status,
            to,
        });
    }
    tracing::info!(record_id = %record_id, from = %record.status, to = %to, "Dose status changed");

    record.status = to;
    record.taken_at = taken_at;
    record.updated_at = now;
    Ok(record)
}

/// Mark every still-scheduled record whose time has passed as missed:
/// all of them on dates before `now`, and those earlier than `now`'s
/// `HH:MM` on its date.
pub fn sweep_missed(store: &impl RecordStore, now: NaiveDateTime) -> Result<usize, DatabaseError> {
    let cutoff = now.format("%H:%M").to_string();
    let changed = store.mark_overdue_missed(now.date(), &cutoff, now)?;
    if changed > 0 {
        tracing::info!(changed, "Overdue doses marked missed");
    }
    Ok(changed)
}
