use chrono::NaiveDate;
use uuid::Uuid;

use super::enums::RecordStatus;

#[derive(Debug, Default, Clone)]
pub struct RecordFilter {
    pub group_id: Option<Uuid>,
    pub plan_id: Option<Uuid>,
    pub medicine_id: Option<Uuid>,
    pub date_from: Option<NaiveDate>,
    pub date_to: Option<NaiveDate>,
    pub status: Option<RecordStatus>,
}

impl RecordFilter {
    /// All records of a group on one calendar date.
    pub fn for_day(group_id: Uuid, date: NaiveDate) -> Self {
        Self {
            group_id: Some(group_id),
            date_from: Some(date),
            date_to: Some(date),
            ..Self::default()
        }
    }
}
