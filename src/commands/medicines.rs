//! Medicine cabinet commands.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::core_state::{CoreError, CoreState};
use crate::db::repository;
use crate::dosage::format_dosage;
use crate::models::{Medicine, ValidationError};
use crate::reminders::CancelOutcome;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicineInput {
    pub group_id: Uuid,
    pub name: String,
    pub dosage: String,
    pub unit: String,
    #[serde(default)]
    pub pillbox_slot: Option<u8>,
    #[serde(default)]
    pub stock_count: Option<i32>,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MedicineCard {
    pub medicine: Medicine,
    pub dosage_label: String,
    /// Compartment badge, e.g. `"#3 · 1片"`. `None` when unassigned.
    pub slot_badge: Option<String>,
}

pub fn add_medicine(state: &CoreState, input: MedicineInput) -> Result<Medicine, CoreError> {
    let name = input.name.trim();
    if name.is_empty() {
        return Err(ValidationError::MissingMedicineName.into());
    }

    let now = state.now();
    let medicine = Medicine {
        id: Uuid::new_v4(),
        group_id: input.group_id,
        name: name.to_string(),
        dosage: input.dosage,
        unit: input.unit,
        pillbox_slot: input.pillbox_slot,
        stock_count: input.stock_count,
        notes: input.notes,
        created_at: now,
        updated_at: now,
    };

    let conn = state.open_db()?;
    repository::upsert_medicine(&conn, &medicine)?;
    tracing::info!(medicine_id = %medicine.id, group_id = %medicine.group_id, "Medicine added");
    Ok(medicine)
}

pub fn list_medicines(state: &CoreState, group_id: &Uuid) -> Result<Vec<MedicineCard>, CoreError> {
    let conn = state.open_db()?;
    let medicines = repository::list_medicines(&conn, group_id)?;

    Ok(medicines
        .into_iter()
        .map(|medicine| {
            let dosage_label = format_dosage(&medicine.dosage, &medicine.unit);
            let slot_badge = medicine
                .pillbox_slot
                .map(|slot| format!("#{slot} · {dosage_label}"));
            MedicineCard {
                medicine,
                dosage_label,
                slot_badge,
            }
        })
        .collect())
}

/// Delete a medicine, every plan that doses it, and all of their reminders.
pub async fn delete_medicine(state: &CoreState, medicine_id: &Uuid) -> Result<CancelOutcome, CoreError> {
    let mut plan_ids: Vec<Uuid> = {
        let conn = state.open_db()?;
        if repository::get_medicine(&conn, medicine_id)?.is_none() {
            return Err(CoreError::NotFound {
                entity: "Medicine",
                id: medicine_id.to_string(),
            });
        }
        repository::list_schedules_for_medicine(&conn, medicine_id)?
            .into_iter()
            .map(|p| p.id)
            .collect()
    };

    // Sorted so two multi-plan deletes cannot deadlock.
    plan_ids.sort();
    let mut guards = Vec::with_capacity(plan_ids.len());
    for plan_id in &plan_ids {
        guards.push(state.lock_plan(plan_id).await);
    }

    {
        let conn = state.open_db()?;
        repository::delete_medicine_cascade(&conn, medicine_id)?;
    }
    tracing::info!(medicine_id = %medicine_id, plans = plan_ids.len(), "Medicine deleted");

    Ok(state.scheduler().cancel_for_medicine(medicine_id).await)
}
