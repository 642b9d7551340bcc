//! Recurrence evaluation: which plans are due on a date, and which doses.
//!
//! Everything here is a pure function of its arguments. Callers supply the
//! records and, for status resolution, the wall-clock time.

use chrono::{Datelike, Local, NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::enums::{MealLabel, RecordStatus, RepeatKind};
use crate::models::{DosingPlan, MedicationRecord};

/// One concrete "take medicine X at time T on date D".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DoseEvent {
    pub plan_id: Uuid,
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub dosage: String,
    pub unit: String,
    pub date: NaiveDate,
    /// Position of the slot in the plan's `daily_times`.
    pub daily_time_index: usize,
    pub hour: u8,
    pub minute: u8,
    /// Zero-padded `HH:MM`.
    pub time_of_day: String,
    pub meal: Option<MealLabel>,
    pub status: RecordStatus,
    pub record: Option<MedicationRecord>,
}

/// Whether `plan` has doses on `date`.
///
/// Malformed weekdays or repeat values make the plan "not due" rather than
/// failing.
pub fn is_due_on(plan: &DosingPlan, date: NaiveDate) -> bool {
    if !plan.is_active {
        return false;
    }
    if date < plan.start_date {
        return false;
    }
    if plan.end_date.is_some_and(|end| date > end) {
        return false;
    }

    match plan.repeat_kind {
        RepeatKind::Daily => true,
        RepeatKind::Weekly => {
            let weekday = date.weekday().num_days_from_sunday();
            plan.weekdays
                .iter()
                .any(|&d| d <= 6 && u32::from(d) == weekday)
        }
        RepeatKind::Monthly => {
            if plan.repeat_value < 1 {
                return false;
            }
            // Day-of-month distance modulo 31. Months shorter than 31 days
            // are not modelled; kept for compatibility with stored plans.
            let target_day = date.day() as i32;
            let start_day = plan.start_date.day() as i32;
            let diff = (target_day - start_day + 31) % 31;
            diff % plan.repeat_value == 0
        }
        RepeatKind::Course | RepeatKind::Custom => true,
    }
}

/// Dose events of `plan` on `date`, resolving status against the current
/// local time.
pub fn dose_events_on(
    plan: &DosingPlan,
    date: NaiveDate,
    records: &[MedicationRecord],
) -> Vec<DoseEvent> {
    dose_events_at(plan, date, records, Local::now().time())
}

/// Dose events of `plan` on `date`, sorted by time of day (stable on ties).
///
/// Status: the matching record's status if one exists, else `missed` when
/// the slot's `HH:MM` is before `now`'s `HH:MM`, else `scheduled`.
pub fn dose_events_at(
    plan: &DosingPlan,
    date: NaiveDate,
    records: &[MedicationRecord],
    now: NaiveTime,
) -> Vec<DoseEvent> {
    if !is_due_on(plan, date) {
        return Vec::new();
    }

    let now_hhmm = now.format("%H:%M").to_string();

    let mut events: Vec<DoseEvent> = plan
        .daily_times
        .iter()
        .enumerate()
        .map(|(index, slot)| {
            let time_of_day = slot.time_of_day();
            let record = records
                .iter()
                .find(|r| r.matches_key(&plan.id, date, &time_of_day))
                .cloned();

            let status = match &record {
                Some(r) => r.status,
                None if time_of_day < now_hhmm => RecordStatus::Missed,
                None => RecordStatus::Scheduled,
            };

            DoseEvent {
                plan_id: plan.id,
                medicine_id: plan.medicine_id,
                medicine_name: plan.medicine_name.clone(),
                dosage: plan.dosage_for(slot),
                unit: plan.unit.clone(),
                date,
                daily_time_index: index,
                hour: slot.hour,
                minute: slot.minute,
                time_of_day,
                meal: slot.meal,
                status,
                record,
            }
        })
        .collect();

    // Vec::sort_by is stable: equal times keep their input order.
    events.sort_by(|a, b| a.time_of_day.cmp(&b.time_of_day));
    events
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DailyTime;
    use chrono::{Duration, NaiveDateTime};

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn make_plan(kind: RepeatKind) -> DosingPlan {
        let created = NaiveDateTime::parse_from_str("2024-01-01 00:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        DosingPlan {
            id: Uuid::new_v4(),
            group_id: Uuid::new_v4(),
            medicine_id: Uuid::new_v4(),
            medicine_name: "Amoxicillin".into(),
            dosage: "1".into(),
            unit: "pill".into(),
            repeat_kind: kind,
            repeat_value: 1,
            weekdays: vec![],
            start_date: date("2024-01-01"),
            end_date: None,
            daily_times: vec![DailyTime::at(8, 0), DailyTime::at(20, 0)],
            is_active: true,
            notes: None,
            created_at: created,
            updated_at: created,
        }
    }

    fn record_for(plan: &DosingPlan, day: NaiveDate, time: &str, status: RecordStatus) -> MedicationRecord {
        MedicationRecord {
            id: Uuid::new_v4(),
            group_id: plan.group_id,
            user_id: None,
            plan_id: plan.id,
            medicine_id: plan.medicine_id,
            record_date: day,
            time_of_day: time.into(),
            dosage: "1".into(),
            meal: None,
            status,
            notes: None,
            taken_at: None,
            created_at: NaiveDateTime::default(),
            updated_at: NaiveDateTime::default(),
        }
    }

    #[test]
    fn daily_due_every_day_within_bounds() {
        let mut plan = make_plan(RepeatKind::Daily);
        plan.end_date = Some(date("2024-03-31"));

        let mut day = date("2023-12-01");
        while day <= date("2024-05-01") {
            let expected = day >= plan.start_date && day <= date("2024-03-31");
            assert_eq!(is_due_on(&plan, day), expected, "day {day}");
            day += Duration::days(1);
        }
    }

    #[test]
    fn open_ended_daily_due_far_in_future() {
        let plan = make_plan(RepeatKind::Daily);
        assert!(is_due_on(&plan, date("2030-06-15")));
    }

    #[test]
    fn inactive_plan_never_due() {
        let mut plan = make_plan(RepeatKind::Daily);
        plan.is_active = false;
        assert!(!is_due_on(&plan, date("2024-01-10")));
        assert!(dose_events_at(&plan, date("2024-01-10"), &[], at(0, 0)).is_empty());
    }

    #[test]
    fn end_date_is_inclusive() {
        let mut plan = make_plan(RepeatKind::Course);
        plan.end_date = Some(date("2024-01-07"));
        assert!(is_due_on(&plan, date("2024-01-07")));
        assert!(!is_due_on(&plan, date("2024-01-08")));
    }

    #[test]
    fn weekly_matches_weekday_set() {
        let mut plan = make_plan(RepeatKind::Weekly);
        plan.weekdays = vec![1, 3, 5];

        let mut day = date("2024-01-01");
        while day <= date("2024-02-29") {
            let weekday = day.weekday().num_days_from_sunday();
            assert_eq!(is_due_on(&plan, day), [1, 3, 5].contains(&weekday), "day {day}");
            day += Duration::days(1);
        }
    }

    #[test]
    fn weekly_mon_wed_fri_scenario() {
        let mut plan = make_plan(RepeatKind::Weekly);
        plan.weekdays = vec![1, 3, 5];

        assert!(!is_due_on(&plan, date("2024-01-02")));
        assert!(is_due_on(&plan, date("2024-01-03")));

        let events = dose_events_at(&plan, date("2024-01-03"), &[], at(0, 0));
        let times: Vec<&str> = events.iter().map(|e| e.time_of_day.as_str()).collect();
        assert_eq!(times, vec!["08:00", "20:00"]);
    }

    #[test]
    fn weekly_with_garbage_weekdays_is_not_due() {
        let mut plan = make_plan(RepeatKind::Weekly);
        plan.weekdays = vec![9, 200];
        assert!(!is_due_on(&plan, date("2024-01-03")));
        plan.weekdays.clear();
        assert!(!is_due_on(&plan, date("2024-01-03")));
    }

    #[test]
    fn monthly_every_day_of_month_distance() {
        let mut plan = make_plan(RepeatKind::Monthly);
        plan.start_date = date("2024-01-05");
        plan.repeat_value = 3;

        assert!(is_due_on(&plan, date("2024-01-05")));
        assert!(!is_due_on(&plan, date("2024-01-06")));
        assert!(is_due_on(&plan, date("2024-01-08")));
        // Day 2 of next month: (2 - 5 + 31) % 31 = 28, not a multiple of 3.
        assert!(!is_due_on(&plan, date("2024-02-02")));
        // Day 5 of next month: distance 0.
        assert!(is_due_on(&plan, date("2024-02-05")));
    }

    #[test]
    fn monthly_modulo_31_skips_short_month_end() {
        let mut plan = make_plan(RepeatKind::Monthly);
        plan.start_date = date("2024-01-31");
        plan.repeat_value = 31;

        assert!(is_due_on(&plan, date("2024-03-31")));
        assert!(!is_due_on(&plan, date("2024-02-29")));
    }

    #[test]
    fn monthly_with_non_positive_repeat_is_not_due() {
        let mut plan = make_plan(RepeatKind::Monthly);
        plan.repeat_value = 0;
        assert!(!is_due_on(&plan, date("2024-01-01")));
        plan.repeat_value = -2;
        assert!(!is_due_on(&plan, date("2024-01-01")));
    }

    #[test]
    fn custom_due_within_bounds() {
        let plan = make_plan(RepeatKind::Custom);
        assert!(is_due_on(&plan, date("2024-01-09")));
        assert!(!is_due_on(&plan, date("2023-12-31")));
    }

    #[test]
    fn event_count_matches_daily_times_when_due() {
        let mut plan = make_plan(RepeatKind::Weekly);
        plan.weekdays = vec![3];
        plan.daily_times.push(DailyTime::at(12, 0));

        assert_eq!(dose_events_at(&plan, date("2024-01-03"), &[], at(0, 0)).len(), 3);
        assert_eq!(dose_events_at(&plan, date("2024-01-04"), &[], at(0, 0)).len(), 0);
    }

    #[test]
    fn events_sorted_and_stable_on_ties() {
        let mut plan = make_plan(RepeatKind::Daily);
        plan.daily_times = vec![
            DailyTime::at(21, 0),
            DailyTime { dosage: Some("first".into()), ..DailyTime::at(7, 30) },
            DailyTime::at(12, 0),
            DailyTime { dosage: Some("second".into()), ..DailyTime::at(7, 30) },
        ];

        let events = dose_events_at(&plan, date("2024-01-02"), &[], at(0, 0));
        let times: Vec<&str> = events.iter().map(|e| e.time_of_day.as_str()).collect();
        assert_eq!(times, vec!["07:30", "07:30", "12:00", "21:00"]);
        assert_eq!(events[0].dosage, "first");
        assert_eq!(events[1].dosage, "second");
        assert_eq!(events[0].daily_time_index, 1);
        assert_eq!(events[1].daily_time_index, 3);
    }

    #[test]
    fn evaluation_is_idempotent() {
        let plan = make_plan(RepeatKind::Daily);
        let day = date("2024-01-02");
        let records = vec![record_for(&plan, day, "08:00", RecordStatus::Taken)];
        let first = dose_events_at(&plan, day, &records, at(12, 0));
        let second = dose_events_at(&plan, day, &records, at(12, 0));
        assert_eq!(first, second);
    }

    #[test]
    fn status_missed_when_past_without_record() {
        let plan = make_plan(RepeatKind::Daily);
        let events = dose_events_at(&plan, date("2024-01-02"), &[], at(12, 0));
        assert_eq!(events[0].status, RecordStatus::Missed);
        assert_eq!(events[1].status, RecordStatus::Scheduled);
    }

    #[test]
    fn status_scheduled_at_exact_minute() {
        let plan = make_plan(RepeatKind::Daily);
        let events = dose_events_at(&plan, date("2024-01-02"), &[], at(8, 0));
        assert_eq!(events[0].status, RecordStatus::Scheduled);
    }

    #[test]
    fn status_mirrors_record_regardless_of_time() {
        let plan = make_plan(RepeatKind::Daily);
        let day = date("2024-01-02");
        let records = vec![
            record_for(&plan, day, "08:00", RecordStatus::Scheduled),
            record_for(&plan, day, "20:00", RecordStatus::Skipped),
        ];

        let events = dose_events_at(&plan, day, &records, at(23, 0));
        assert_eq!(events[0].status, RecordStatus::Scheduled);
        assert_eq!(events[1].status, RecordStatus::Skipped);
        assert_eq!(events[1].record.as_ref().map(|r| r.id), Some(records[1].id));
    }

    #[test]
    fn records_of_other_plans_or_days_ignored() {
        let plan = make_plan(RepeatKind::Daily);
        let other = make_plan(RepeatKind::Daily);
        let day = date("2024-01-02");
        let records = vec![
            record_for(&other, day, "08:00", RecordStatus::Taken),
            record_for(&plan, date("2024-01-01"), "08:00", RecordStatus::Taken),
        ];

        let events = dose_events_at(&plan, day, &records, at(0, 0));
        assert!(events.iter().all(|e| e.record.is_none()));
        assert_eq!(events[0].status, RecordStatus::Scheduled);
    }

    #[test]
    fn slot_meal_and_dosage_carried() {
        let mut plan = make_plan(RepeatKind::Daily);
        plan.daily_times = vec![DailyTime {
            hour: 9,
            minute: 5,
            dosage: Some("2".into()),
            meal: Some(MealLabel::WithMeal),
        }];

        let events = dose_events_at(&plan, date("2024-01-02"), &[], at(0, 0));
        assert_eq!(events[0].time_of_day, "09:05");
        assert_eq!(events[0].dosage, "2");
        assert_eq!(events[0].meal, Some(MealLabel::WithMeal));
        assert_eq!(events[0].medicine_name, "Amoxicillin");
    }
}
