//! Repository layer: entity-scoped database operations.
//!
//! Free functions take a `&Connection`. Schedule and dose commands go through
//! `PlanStore` and `RecordStore`, which `Connection` implements; medicine
//! commands call the free functions directly.

mod medication;
mod record;
mod schedule;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use uuid::Uuid;

use super::DatabaseError;
use crate::models::enums::RecordStatus;
use crate::models::{DosingPlan, MedicationRecord, RecordFilter};

pub use medication::*;
pub use record::*;
pub use schedule::*;

/// Storage for dosing plans.
pub trait PlanStore {
    fn list_plans(&self, group_id: &Uuid) -> Result<Vec<DosingPlan>, DatabaseError>;
    fn get_plan(&self, id: &Uuid) -> Result<Option<DosingPlan>, DatabaseError>;
    fn upsert_plan(&self, plan: &DosingPlan) -> Result<(), DatabaseError>;
    fn set_plan_active(&self, id: &Uuid, active: bool, now: NaiveDateTime) -> Result<(), DatabaseError>;
    fn delete_plan(&self, id: &Uuid) -> Result<(), DatabaseError>;
}

/// Storage for adherence records, keyed naturally by (plan id, date, time).
pub trait RecordStore {
    fn list_records(&self, filter: &RecordFilter) -> Result<Vec<MedicationRecord>, DatabaseError>;
    fn get_record(&self, id: &Uuid) -> Result<Option<MedicationRecord>, DatabaseError>;
    fn find_record(
        &self,
        plan_id: &Uuid,
        date: NaiveDate,
        time_of_day: &str,
    ) -> Result<Option<MedicationRecord>, DatabaseError>;
    fn upsert_record(&self, record: &MedicationRecord) -> Result<(), DatabaseError>;
    /// Returns `false` when a record already holds the natural key.
    fn insert_record_if_absent(&self, record: &MedicationRecord) -> Result<bool, DatabaseError>;
    /// Returns `false` when the record is already taken or skipped.
    fn update_record_status(
        &self,
        id: &Uuid,
        status: RecordStatus,
        taken_at: Option<NaiveDateTime>,
        updated_at: NaiveDateTime,
    ) -> Result<bool, DatabaseError>;
    fn mark_overdue_missed(
        &self,
        date: NaiveDate,
        cutoff_time: &str,
        updated_at: NaiveDateTime,
    ) -> Result<usize, DatabaseError>;
}

impl PlanStore for Connection {
    fn list_plans(&self, group_id: &Uuid) -> Result<Vec<DosingPlan>, DatabaseError> {
        list_schedules(self, group_id)
    }

    fn get_plan(&self, id: &Uuid) -> Result<Option<DosingPlan>, DatabaseError> {
        get_schedule(self, id)
    }

    fn upsert_plan(&self, plan: &DosingPlan) -> Result<(), DatabaseError> {
        upsert_schedule(self, plan)
    }

    fn set_plan_active(&self, id: &Uuid, active: bool, now: NaiveDateTime) -> Result<(), DatabaseError> {
        set_schedule_active(self, id, active, now)
    }

    fn delete_plan(&self, id: &Uuid) -> Result<(), DatabaseError> {
        delete_schedule(self, id)
    }
}

impl RecordStore for Connection {
    fn list_records(&self, filter: &RecordFilter) -> Result<Vec<MedicationRecord>, DatabaseError> {
        list_records(self, filter)
    }

    fn get_record(&self, id: &Uuid) -> Result<Option<MedicationRecord>, DatabaseError> {
        get_record(self, id)
    }

    fn find_record(
        &self,
        plan_id: &Uuid,
        date: NaiveDate,
        time_of_day: &str,
    ) -> Result<Option<MedicationRecord>, DatabaseError> {
        find_record(self, plan_id, date, time_of_day)
    }

    fn upsert_record(&self, record: &MedicationRecord) -> Result<(), DatabaseError> {
        upsert_record(self, record)
    }

    fn insert_record_if_absent(&self, record: &MedicationRecord) -> Result<bool, DatabaseError> {
        insert_record_if_absent(self, record)
    }

    fn update_record_status(
        &self,
        id: &Uuid,
        status: RecordStatus,
        taken_at: Option<NaiveDateTime>,
        updated_at: NaiveDateTime,
    ) -> Result<bool, DatabaseError> {
        update_record_status(self, id, status, taken_at, updated_at)
    }

    fn mark_overdue_missed(
        &self,
        date: NaiveDate,
        cutoff_time: &str,
        updated_at: NaiveDateTime,
    ) -> Result<usize, DatabaseError> {
        mark_overdue_missed(self, date, cutoff_time, updated_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::sqlite::open_memory_database;
    use crate::models::enums::*;
    use crate::models::*;

    fn test_db() -> Connection {
        open_memory_database().unwrap()
    }

    fn ts(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").unwrap()
    }

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn make_plan(group_id: Uuid, medicine_id: Uuid) -> DosingPlan {
        DosingPlan {
            id: Uuid::new_v4(),
            group_id,
            medicine_id,
            medicine_name: "Aspirin".into(),
            dosage: "1".into(),
            unit: "pill".into(),
            repeat_kind: RepeatKind::Weekly,
            repeat_value: 1,
            weekdays: vec![1, 3, 5],
            start_date: date("2024-01-01"),
            end_date: Some(date("2024-06-30")),
            daily_times: vec![
                DailyTime::at(8, 0),
                DailyTime {
                    hour: 20,
                    minute: 30,
                    dosage: Some("2".into()),
                    meal: Some(MealLabel::AfterMeal),
                },
            ],
            is_active: true,
            notes: Some("with water".into()),
            created_at: ts("2024-01-01 09:00:00"),
            updated_at: ts("2024-01-01 09:00:00"),
        }
    }

    fn make_record(plan: &DosingPlan, day: &str, time: &str, status: RecordStatus) -> MedicationRecord {
        MedicationRecord {
            id: Uuid::new_v4(),
            group_id: plan.group_id,
            user_id: None,
            plan_id: plan.id,
            medicine_id: plan.medicine_id,
            record_date: date(day),
            time_of_day: time.into(),
            dosage: plan.dosage.clone(),
            meal: None,
            status,
            notes: None,
            taken_at: None,
            created_at: ts("2024-01-03 07:00:00"),
            updated_at: ts("2024-01-03 07:00:00"),
        }
    }

    fn make_medicine(group_id: Uuid, name: &str, slot: Option<u8>) -> Medicine {
        Medicine {
            id: Uuid::new_v4(),
            group_id,
            name: name.into(),
            dosage: "1".into(),
            unit: "pill".into(),
            pillbox_slot: slot,
            stock_count: Some(30),
            notes: None,
            created_at: ts("2024-01-01 09:00:00"),
            updated_at: ts("2024-01-01 09:00:00"),
        }
    }

    #[test]
    fn schedule_round_trips_with_times_in_order() {
        let conn = test_db();
        let plan = make_plan(Uuid::new_v4(), Uuid::new_v4());
        conn.upsert_plan(&plan).unwrap();

        let loaded = conn.get_plan(&plan.id).unwrap().unwrap();
        assert_eq!(loaded, plan);
    }

    #[test]
    fn upsert_replaces_daily_times() {
        let conn = test_db();
        let mut plan = make_plan(Uuid::new_v4(), Uuid::new_v4());
        conn.upsert_plan(&plan).unwrap();

        plan.daily_times = vec![DailyTime::at(12, 15)];
        plan.repeat_kind = RepeatKind::Daily;
        conn.upsert_plan(&plan).unwrap();

        let loaded = conn.get_plan(&plan.id).unwrap().unwrap();
        assert_eq!(loaded.daily_times, vec![DailyTime::at(12, 15)]);
        assert_eq!(loaded.repeat_kind, RepeatKind::Daily);
    }

    #[test]
    fn list_plans_scoped_to_group() {
        let conn = test_db();
        let group = Uuid::new_v4();
        conn.upsert_plan(&make_plan(group, Uuid::new_v4())).unwrap();
        conn.upsert_plan(&make_plan(group, Uuid::new_v4())).unwrap();
        conn.upsert_plan(&make_plan(Uuid::new_v4(), Uuid::new_v4())).unwrap();

        assert_eq!(conn.list_plans(&group).unwrap().len(), 2);
    }

    #[test]
    fn delete_plan_removes_times() {
        let conn = test_db();
        let plan = make_plan(Uuid::new_v4(), Uuid::new_v4());
        conn.upsert_plan(&plan).unwrap();
        conn.delete_plan(&plan.id).unwrap();

        assert!(conn.get_plan(&plan.id).unwrap().is_none());
        let times: i64 = conn
            .query_row("SELECT COUNT(*) FROM schedule_times", [], |row| row.get(0))
            .unwrap();
        assert_eq!(times, 0);
    }

    #[test]
    fn delete_missing_plan_is_not_found() {
        let conn = test_db();
        let result = conn.delete_plan(&Uuid::new_v4());
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn toggle_active_persists() {
        let conn = test_db();
        let plan = make_plan(Uuid::new_v4(), Uuid::new_v4());
        conn.upsert_plan(&plan).unwrap();
        set_schedule_active(&conn, &plan.id, false, ts("2024-02-01 10:00:00")).unwrap();

        let loaded = conn.get_plan(&plan.id).unwrap().unwrap();
        assert!(!loaded.is_active);
        assert_eq!(loaded.updated_at, ts("2024-02-01 10:00:00"));
        assert!(list_active_group_ids(&conn).unwrap().is_empty());
    }

    #[test]
    fn record_natural_key_is_unique() {
        let conn = test_db();
        let plan = make_plan(Uuid::new_v4(), Uuid::new_v4());
        conn.upsert_plan(&plan).unwrap();

        let first = make_record(&plan, "2024-01-03", "08:00", RecordStatus::Scheduled);
        conn.upsert_record(&first).unwrap();
        let mut second = make_record(&plan, "2024-01-03", "08:00", RecordStatus::Taken);
        second.taken_at = Some(ts("2024-01-03 08:02:00"));
        conn.upsert_record(&second).unwrap();

        let all = conn.list_records(&RecordFilter::default()).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, first.id);
        assert_eq!(all[0].status, RecordStatus::Taken);
        assert_eq!(all[0].taken_at, Some(ts("2024-01-03 08:02:00")));
    }

    #[test]
    fn insert_if_absent_keeps_existing() {
        let conn = test_db();
        let plan = make_plan(Uuid::new_v4(), Uuid::new_v4());
        let taken = make_record(&plan, "2024-01-03", "08:00", RecordStatus::Taken);
        conn.upsert_record(&taken).unwrap();

        let fresh = make_record(&plan, "2024-01-03", "08:00", RecordStatus::Scheduled);
        assert!(!insert_record_if_absent(&conn, &fresh).unwrap());

        let found = conn.find_record(&plan.id, date("2024-01-03"), "08:00").unwrap().unwrap();
        assert_eq!(found.status, RecordStatus::Taken);
    }

    #[test]
    fn list_records_filters_by_day_and_status() {
        let conn = test_db();
        let plan = make_plan(Uuid::new_v4(), Uuid::new_v4());
        conn.upsert_record(&make_record(&plan, "2024-01-03", "08:00", RecordStatus::Taken)).unwrap();
        conn.upsert_record(&make_record(&plan, "2024-01-03", "20:30", RecordStatus::Scheduled)).unwrap();
        conn.upsert_record(&make_record(&plan, "2024-01-05", "08:00", RecordStatus::Scheduled)).unwrap();

        let day = conn
            .list_records(&RecordFilter::for_day(plan.group_id, date("2024-01-03")))
            .unwrap();
        assert_eq!(day.len(), 2);
        assert_eq!(day[0].time_of_day, "08:00");

        let scheduled = conn
            .list_records(&RecordFilter {
                status: Some(RecordStatus::Scheduled),
                ..RecordFilter::default()
            })
            .unwrap();
        assert_eq!(scheduled.len(), 2);
    }

    #[test]
    fn overdue_scheduled_records_become_missed() {
        let conn = test_db();
        let plan = make_plan(Uuid::new_v4(), Uuid::new_v4());
        conn.upsert_record(&make_record(&plan, "2024-01-01", "20:30", RecordStatus::Scheduled)).unwrap();
        conn.upsert_record(&make_record(&plan, "2024-01-03", "08:00", RecordStatus::Scheduled)).unwrap();
        conn.upsert_record(&make_record(&plan, "2024-01-03", "20:30", RecordStatus::Scheduled)).unwrap();
        conn.upsert_record(&make_record(&plan, "2024-01-03", "07:00", RecordStatus::Taken)).unwrap();

        let changed =
            mark_overdue_missed(&conn, date("2024-01-03"), "12:00", ts("2024-01-03 12:00:00")).unwrap();
        assert_eq!(changed, 2);

        let evening = conn.find_record(&plan.id, date("2024-01-03"), "20:30").unwrap().unwrap();
        assert_eq!(evening.status, RecordStatus::Scheduled);
        let taken = conn.find_record(&plan.id, date("2024-01-03"), "07:00").unwrap().unwrap();
        assert_eq!(taken.status, RecordStatus::Taken);
    }

    #[test]
    fn update_missing_record_is_not_found() {
        let conn = test_db();
        let result = conn.update_record_status(
            &Uuid::new_v4(),
            RecordStatus::Taken,
            None,
            ts("2024-01-03 08:00:00"),
        );
        assert!(matches!(result, Err(DatabaseError::NotFound { .. })));
    }

    #[test]
    fn terminal_record_status_is_not_overwritten() {
        let conn = test_db();
        let plan = make_plan(Uuid::new_v4(), Uuid::new_v4());
        let mut taken = make_record(&plan, "2024-01-03", "08:00", RecordStatus::Taken);
        taken.taken_at = Some(ts("2024-01-03 08:02:00"));
        conn.upsert_record(&taken).unwrap();

        let changed = conn
            .update_record_status(&taken.id, RecordStatus::Skipped, None, ts("2024-01-03 08:03:00"))
            .unwrap();
        assert!(!changed);

        let stored = conn.get_record(&taken.id).unwrap().unwrap();
        assert_eq!(stored.status, RecordStatus::Taken);
        assert_eq!(stored.taken_at, Some(ts("2024-01-03 08:02:00")));
        assert_eq!(stored.updated_at, taken.updated_at);
    }

    #[test]
    fn missed_record_can_still_be_taken() {
        let conn = test_db();
        let plan = make_plan(Uuid::new_v4(), Uuid::new_v4());
        let missed = make_record(&plan, "2024-01-03", "08:00", RecordStatus::Missed);
        conn.upsert_record(&missed).unwrap();

        let changed = conn
            .update_record_status(
                &missed.id,
                RecordStatus::Taken,
                Some(ts("2024-01-03 11:00:00")),
                ts("2024-01-03 11:00:00"),
            )
            .unwrap();
        assert!(changed);
        assert_eq!(conn.get_record(&missed.id).unwrap().unwrap().status, RecordStatus::Taken);
    }

    #[test]
    fn malformed_end_date_is_an_error() {
        let conn = test_db();
        let plan = make_plan(Uuid::new_v4(), Uuid::new_v4());
        conn.upsert_plan(&plan).unwrap();
        conn.execute(
            "UPDATE schedules SET end_date = '30/06/2024' WHERE id = ?1",
            [plan.id.to_string()],
        )
        .unwrap();

        assert!(conn.get_plan(&plan.id).is_err());
        assert!(conn.list_plans(&plan.group_id).is_err());
    }

    #[test]
    fn malformed_weekdays_or_timestamp_is_an_error() {
        let conn = test_db();
        let plan = make_plan(Uuid::new_v4(), Uuid::new_v4());
        conn.upsert_plan(&plan).unwrap();
        conn.execute("UPDATE schedules SET weekdays = 'mon,wed' WHERE id = ?1", [plan.id.to_string()])
            .unwrap();
        assert!(matches!(
            conn.get_plan(&plan.id),
            Err(DatabaseError::ConstraintViolation(_))
        ));

        let record = make_record(&plan, "2024-01-03", "08:00", RecordStatus::Scheduled);
        conn.upsert_record(&record).unwrap();
        conn.execute(
            "UPDATE medication_records SET created_at = 'yesterday' WHERE id = ?1",
            [record.id.to_string()],
        )
        .unwrap();
        assert!(matches!(
            conn.get_record(&record.id),
            Err(DatabaseError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn medicines_listed_by_slot() {
        let conn = test_db();
        let group = Uuid::new_v4();
        upsert_medicine(&conn, &make_medicine(group, "Zinc", None)).unwrap();
        upsert_medicine(&conn, &make_medicine(group, "Vitamin D", Some(2))).unwrap();
        upsert_medicine(&conn, &make_medicine(group, "Aspirin", Some(1))).unwrap();

        let names: Vec<String> = list_medicines(&conn, &group)
            .unwrap()
            .into_iter()
            .map(|m| m.name)
            .collect();
        assert_eq!(names, vec!["Aspirin", "Vitamin D", "Zinc"]);
    }

    #[test]
    fn medicine_delete_cascades_to_schedules() {
        let conn = test_db();
        let group = Uuid::new_v4();
        let med = make_medicine(group, "Aspirin", Some(1));
        upsert_medicine(&conn, &med).unwrap();
        let plan = make_plan(group, med.id);
        conn.upsert_plan(&plan).unwrap();
        conn.upsert_plan(&make_plan(group, med.id)).unwrap();

        assert_eq!(list_schedules_for_medicine(&conn, &med.id).unwrap().len(), 2);
        delete_medicine_cascade(&conn, &med.id).unwrap();

        assert!(get_medicine(&conn, &med.id).unwrap().is_none());
        assert!(list_schedules_for_medicine(&conn, &med.id).unwrap().is_empty());
    }
}
