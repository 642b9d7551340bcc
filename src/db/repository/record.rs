use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use uuid::Uuid;

use super::schedule::{parse_date, parse_datetime, parse_uuid};
use crate::db::{DatabaseError, DATETIME_FORMAT};
use crate::models::enums::*;
use crate::models::*;

/// Insert a record, or update the existing one sharing its natural key.
pub fn upsert_record(conn: &Connection, record: &MedicationRecord) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medication_records (id, group_id, user_id, schedule_id, medicine_id,
         record_date, time_of_day, dosage, meal, status, notes, taken_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
         ON CONFLICT(schedule_id, record_date, time_of_day) DO UPDATE SET
            user_id = excluded.user_id,
            dosage = excluded.dosage,
            meal = excluded.meal,
            status = excluded.status,
            notes = excluded.notes,
            taken_at = excluded.taken_at,
            updated_at = excluded.updated_at",
        params![
            record.id.to_string(),
            record.group_id.to_string(),
            record.user_id.map(|id| id.to_string()),
            record.plan_id.to_string(),
            record.medicine_id.to_string(),
            record.record_date.to_string(),
            record.time_of_day,
            record.dosage,
            record.meal.map(|m| m.as_str()),
            record.status.as_str(),
            record.notes,
            record.taken_at.map(|t| t.format(DATETIME_FORMAT).to_string()),
            record.created_at.format(DATETIME_FORMAT).to_string(),
            record.updated_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

/// Insert only when no record exists for the natural key. Returns whether a row was written.
pub fn insert_record_if_absent(
    conn: &Connection,
    record: &MedicationRecord,
) -> Result<bool, DatabaseError> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO medication_records (id, group_id, user_id, schedule_id, medicine_id,
         record_date, time_of_day, dosage, meal, status, notes, taken_at, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
        params![
            record.id.to_string(),
            record.group_id.to_string(),
            record.user_id.map(|id| id.to_string()),
            record.plan_id.to_string(),
            record.medicine_id.to_string(),
            record.record_date.to_string(),
            record.time_of_day,
            record.dosage,
            record.meal.map(|m| m.as_str()),
            record.status.as_str(),
            record.notes,
            record.taken_at.map(|t| t.format(DATETIME_FORMAT).to_string()),
            record.created_at.format(DATETIME_FORMAT).to_string(),
            record.updated_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(inserted > 0)
}

pub fn get_record(conn: &Connection, id: &Uuid) -> Result<Option<MedicationRecord>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("{RECORD_COLUMNS} WHERE id = ?1"),
            params![id.to_string()],
            record_row_from_rusqlite,
        )
        .optional()?;
    row.map(record_from_row).transpose()
}

/// Look up a record by natural key (plan id, date, time of day).
pub fn find_record(
    conn: &Connection,
    plan_id: &Uuid,
    date: NaiveDate,
    time_of_day: &str,
) -> Result<Option<MedicationRecord>, DatabaseError> {
    let row = conn
        .query_row(
            &format!(
                "{RECORD_COLUMNS} WHERE schedule_id = ?1 AND record_date = ?2 AND time_of_day = ?3"
            ),
            params![plan_id.to_string(), date.to_string(), time_of_day],
            record_row_from_rusqlite,
        )
        .optional()?;
    row.map(record_from_row).transpose()
}

pub fn list_records(
    conn: &Connection,
    filter: &RecordFilter,
) -> Result<Vec<MedicationRecord>, DatabaseError> {
    let mut clauses: Vec<&str> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    if let Some(group_id) = filter.group_id {
        clauses.push("group_id = ?");
        values.push(Value::Text(group_id.to_string()));
    }
    if let Some(plan_id) = filter.plan_id {
        clauses.push("schedule_id = ?");
        values.push(Value::Text(plan_id.to_string()));
    }
    if let Some(medicine_id) = filter.medicine_id {
        clauses.push("medicine_id = ?");
        values.push(Value::Text(medicine_id.to_string()));
    }
    if let Some(from) = filter.date_from {
        clauses.push("record_date >= ?");
        values.push(Value::Text(from.to_string()));
    }
    if let Some(to) = filter.date_to {
        clauses.push("record_date <= ?");
        values.push(Value::Text(to.to_string()));
    }
    if let Some(status) = filter.status {
        clauses.push("status = ?");
        values.push(Value::Text(status.as_str().to_string()));
    }

    let mut sql = RECORD_COLUMNS.to_string();
    if !clauses.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&clauses.join(" AND "));
    }
    sql.push_str(" ORDER BY record_date, time_of_day");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values), record_row_from_rusqlite)?;

    let mut records = Vec::new();
    for row in rows {
        records.push(record_from_row(row?)?);
    }
    Ok(records)
}

/// Move a record to `status` unless it is already taken or skipped.
///
/// The terminal check is part of the UPDATE, so two writers racing on the
/// same record cannot overwrite each other's decision. Returns `false` when
/// the record exists but was already terminal.
pub fn update_record_status(
    conn: &Connection,
    id: &Uuid,
    status: RecordStatus,
    taken_at: Option<NaiveDateTime>,
    updated_at: NaiveDateTime,
) -> Result<bool, DatabaseError> {
    let updated = conn.execute(
        "UPDATE medication_records SET status = ?1, taken_at = ?2, updated_at = ?3
         WHERE id = ?4 AND status NOT IN ('taken', 'skipped')",
        params![
            status.as_str(),
            taken_at.map(|t| t.format(DATETIME_FORMAT).to_string()),
            updated_at.format(DATETIME_FORMAT).to_string(),
            id.to_string(),
        ],
    )?;
    if updated > 0 {
        return Ok(true);
    }

    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM medication_records WHERE id = ?1)",
        params![id.to_string()],
        |row| row.get(0),
    )?;
    if !exists {
        return Err(DatabaseError::NotFound {
            entity_type: "MedicationRecord".into(),
            id: id.to_string(),
        });
    }
    Ok(false)
}

/// Flip every still-scheduled record before `cutoff_time` on `date` (and all
/// earlier dates) to missed. Returns the number of records changed.
pub fn mark_overdue_missed(
    conn: &Connection,
    date: NaiveDate,
    cutoff_time: &str,
    updated_at: NaiveDateTime,
) -> Result<usize, DatabaseError> {
    let changed = conn.execute(
        "UPDATE medication_records SET status = 'missed', updated_at = ?1
         WHERE status = 'scheduled'
           AND (record_date < ?2 OR (record_date = ?2 AND time_of_day < ?3))",
        params![
            updated_at.format(DATETIME_FORMAT).to_string(),
            date.to_string(),
            cutoff_time
        ],
    )?;
    Ok(changed)
}

const RECORD_COLUMNS: &str = "SELECT id, group_id, user_id, schedule_id, medicine_id,
    record_date, time_of_day, dosage, meal, status, notes, taken_at, created_at, updated_at
    FROM medication_records";

// Internal row type for MedicationRecord mapping
struct RecordRow {
    id: String,
    group_id: String,
    user_id: Option<String>,
    schedule_id: String,
    medicine_id: String,
    record_date: String,
    time_of_day: String,
    dosage: String,
    meal: Option<String>,
    status: String,
    notes: Option<String>,
    taken_at: Option<String>,
    created_at: String,
    updated_at: String,
}

fn record_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<RecordRow, rusqlite::Error> {
    Ok(RecordRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        user_id: row.get(2)?,
        schedule_id: row.get(3)?,
        medicine_id: row.get(4)?,
        record_date: row.get(5)?,
        time_of_day: row.get(6)?,
        dosage: row.get(7)?,
        meal: row.get(8)?,
        status: row.get(9)?,
        notes: row.get(10)?,
        taken_at: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
    })
}

fn record_from_row(row: RecordRow) -> Result<MedicationRecord, DatabaseError> {
    Ok(MedicationRecord {
        id: parse_uuid(&row.id)?,
        group_id: parse_uuid(&row.group_id)?,
        user_id: row.user_id.as_deref().map(parse_uuid).transpose()?,
        plan_id: parse_uuid(&row.schedule_id)?,
        medicine_id: parse_uuid(&row.medicine_id)?,
        record_date: parse_date(&row.record_date)?,
        time_of_day: row.time_of_day,
        dosage: row.dosage,
        meal: row.meal.as_deref().map(MealLabel::from_str).transpose()?,
        status: RecordStatus::from_str(&row.status)?,
        notes: row.notes,
        taken_at: row.taken_at.as_deref().map(parse_datetime).transpose()?,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}
