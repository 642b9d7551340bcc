use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use super::enums::{MealLabel, RepeatKind};

/// One intake slot within a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailyTime {
    pub hour: u8,
    pub minute: u8,
    /// Overrides the plan's default dosage for this slot.
    pub dosage: Option<String>,
    pub meal: Option<MealLabel>,
}

impl DailyTime {
    pub fn at(hour: u8, minute: u8) -> Self {
        Self {
            hour,
            minute,
            dosage: None,
            meal: None,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.hour < 24 && self.minute < 60
    }

    /// Zero-padded `HH:MM`. Lexicographic order equals chronological order.
    pub fn time_of_day(&self) -> String {
        format!("{:02}:{:02}", self.hour, self.minute)
    }

    pub fn as_naive_time(&self) -> Option<NaiveTime> {
        NaiveTime::from_hms_opt(u32::from(self.hour), u32::from(self.minute), 0)
    }
}

/// A recurring intake plan for one medicine (a "schedule").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DosingPlan {
    pub id: Uuid,
    pub group_id: Uuid,
    pub medicine_id: Uuid,
    pub medicine_name: String,
    pub dosage: String,
    pub unit: String,
    pub repeat_kind: RepeatKind,
    /// Meaning depends on `repeat_kind`; "every N days" for monthly.
    pub repeat_value: i32,
    /// Weekday indices, 0 = Sunday.
    pub weekdays: Vec<u8>,
    pub start_date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub daily_times: Vec<DailyTime>,
    pub is_active: bool,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("A schedule needs at least one daily time")]
    EmptyDailyTimes,

    #[error("Invalid time of day {hour}:{minute}")]
    InvalidTime { hour: u8, minute: u8 },

    #[error("Weekly schedules need at least one weekday")]
    MissingWeekdays,

    #[error("Weekday index out of range: {0}")]
    InvalidWeekday(u8),

    #[error("Repeat value must be positive, got {0}")]
    InvalidRepeatValue(i32),

    #[error("End date {end} is before start date {start}")]
    DateRange { start: NaiveDate, end: NaiveDate },

    #[error("Medicine name is required")]
    MissingMedicineName,
}

impl DosingPlan {
    /// Check the invariants every stored plan must satisfy.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.medicine_name.trim().is_empty() {
            return Err(ValidationError::MissingMedicineName);
        }
        if self.daily_times.is_empty() {
            return Err(ValidationError::EmptyDailyTimes);
        }
        if let Some(bad) = self.daily_times.iter().find(|t| !t.is_valid()) {
            return Err(ValidationError::InvalidTime {
                hour: bad.hour,
                minute: bad.minute,
            });
        }
        match self.repeat_kind {
            RepeatKind::Weekly => {
                if self.weekdays.is_empty() {
                    return Err(ValidationError::MissingWeekdays);
                }
                if let Some(&day) = self.weekdays.iter().find(|&&d| d > 6) {
                    return Err(ValidationError::InvalidWeekday(day));
                }
            }
            RepeatKind::Monthly if self.repeat_value < 1 => {
                return Err(ValidationError::InvalidRepeatValue(self.repeat_value));
            }
            _ => {}
        }
        if let Some(end) = self.end_date {
            if end < self.start_date {
                return Err(ValidationError::DateRange {
                    start: self.start_date,
                    end,
                });
            }
        }
        Ok(())
    }

    /// Dosage for a slot: the slot override, else the plan default.
    pub fn dosage_for(&self, slot: &DailyTime) -> String {
        slot.dosage
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .unwrap_or(&self.dosage)
            .to_string()
    }
}
