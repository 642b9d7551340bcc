use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{MealLabel, RecordStatus};

/// One logged occurrence of a due dose.
///
/// At most one record exists per natural key (plan id, date, time of day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicationRecord {
    pub id: Uuid,
    pub group_id: Uuid,
    pub user_id: Option<Uuid>,
    pub plan_id: Uuid,
    pub medicine_id: Uuid,
    pub record_date: NaiveDate,
    /// Zero-padded `HH:MM`.
    pub time_of_day: String,
    pub dosage: String,
    pub meal: Option<MealLabel>,
    pub status: RecordStatus,
    pub notes: Option<String>,
    pub taken_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl MedicationRecord {
    pub fn matches_key(&self, plan_id: &Uuid, date: NaiveDate, time_of_day: &str) -> bool {
        self.plan_id == *plan_id && self.record_date == date && self.time_of_day == time_of_day
    }
}
