use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Medicine {
    pub id: Uuid,
    pub group_id: Uuid,
    pub name: String,
    pub dosage: String,
    pub unit: String,
    /// Physical pillbox compartment, if the medicine is assigned to one.
    pub pillbox_slot: Option<u8>,
    pub stock_count: Option<i32>,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}
