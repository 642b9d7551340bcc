use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::db::{DatabaseError, DATETIME_FORMAT};
use crate::models::enums::*;
use crate::models::*;

/// Insert or replace a schedule together with its daily times.
pub fn upsert_schedule(conn: &Connection, plan: &DosingPlan) -> Result<(), DatabaseError> {
    let weekdays = serde_json::to_string(&plan.weekdays)
        .map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))?;

    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO schedules (id, group_id, medicine_id, medicine_name, dosage, unit,
         repeat_kind, repeat_value, weekdays, start_date, end_date, is_active, notes,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
         ON CONFLICT(id) DO UPDATE SET
            group_id = excluded.group_id,
            medicine_id = excluded.medicine_id,
            medicine_name = excluded.medicine_name,
            dosage = excluded.dosage,
            unit = excluded.unit,
            repeat_kind = excluded.repeat_kind,
            repeat_value = excluded.repeat_value,
            weekdays = excluded.weekdays,
            start_date = excluded.start_date,
            end_date = excluded.end_date,
            is_active = excluded.is_active,
            notes = excluded.notes,
            updated_at = excluded.updated_at",
        params![
            plan.id.to_string(),
            plan.group_id.to_string(),
            plan.medicine_id.to_string(),
            plan.medicine_name,
            plan.dosage,
            plan.unit,
            plan.repeat_kind.as_str(),
            plan.repeat_value,
            weekdays,
            plan.start_date.to_string(),
            plan.end_date.map(|d| d.to_string()),
            plan.is_active as i32,
            plan.notes,
            plan.created_at.format(DATETIME_FORMAT).to_string(),
            plan.updated_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;

    tx.execute(
        "DELETE FROM schedule_times WHERE schedule_id = ?1",
        params![plan.id.to_string()],
    )?;
    for (position, slot) in plan.daily_times.iter().enumerate() {
        tx.execute(
            "INSERT INTO schedule_times (schedule_id, position, hour, minute, dosage, meal)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                plan.id.to_string(),
                position as i64,
                slot.hour,
                slot.minute,
                slot.dosage,
                slot.meal.map(|m| m.as_str()),
            ],
        )?;
    }
    tx.commit()?;
    Ok(())
}

pub fn get_schedule(conn: &Connection, id: &Uuid) -> Result<Option<DosingPlan>, DatabaseError> {
    let row = conn
        .query_row(
            &format!("{SCHEDULE_COLUMNS} WHERE id = ?1"),
            params![id.to_string()],
            schedule_row_from_rusqlite,
        )
        .optional()?;

    match row {
        Some(row) => Ok(Some(schedule_from_row(conn, row)?)),
        None => Ok(None),
    }
}

/// All schedules of a group, oldest first.
pub fn list_schedules(conn: &Connection, group_id: &Uuid) -> Result<Vec<DosingPlan>, DatabaseError> {
    query_schedules(
        conn,
        &format!("{SCHEDULE_COLUMNS} WHERE group_id = ?1 ORDER BY created_at, id"),
        &group_id.to_string(),
    )
}

/// Schedules referencing a medicine, across groups.
pub fn list_schedules_for_medicine(
    conn: &Connection,
    medicine_id: &Uuid,
) -> Result<Vec<DosingPlan>, DatabaseError> {
    query_schedules(
        conn,
        &format!("{SCHEDULE_COLUMNS} WHERE medicine_id = ?1 ORDER BY created_at, id"),
        &medicine_id.to_string(),
    )
}

/// Every group id that owns at least one active schedule.
pub fn list_active_group_ids(conn: &Connection) -> Result<Vec<Uuid>, DatabaseError> {
    let mut stmt = conn.prepare("SELECT DISTINCT group_id FROM schedules WHERE is_active = 1")?;
    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut ids = Vec::new();
    for row in rows {
        ids.push(parse_uuid(&row?)?);
    }
    Ok(ids)
}

pub fn set_schedule_active(
    conn: &Connection,
    id: &Uuid,
    is_active: bool,
    updated_at: NaiveDateTime,
) -> Result<(), DatabaseError> {
    let updated = conn.execute(
        "UPDATE schedules SET is_active = ?1, updated_at = ?2 WHERE id = ?3",
        params![
            is_active as i32,
            updated_at.format(DATETIME_FORMAT).to_string(),
            id.to_string()
        ],
    )?;
    if updated == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Schedule".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

/// Deletes a schedule; its daily times go with it (ON DELETE CASCADE).
pub fn delete_schedule(conn: &Connection, id: &Uuid) -> Result<(), DatabaseError> {
    let deleted = conn.execute("DELETE FROM schedules WHERE id = ?1", params![id.to_string()])?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Schedule".into(),
            id: id.to_string(),
        });
    }
    Ok(())
}

const SCHEDULE_COLUMNS: &str = "SELECT id, group_id, medicine_id, medicine_name, dosage, unit,
    repeat_kind, repeat_value, weekdays, start_date, end_date, is_active, notes,
    created_at, updated_at FROM schedules";

fn query_schedules(
    conn: &Connection,
    sql: &str,
    param: &str,
) -> Result<Vec<DosingPlan>, DatabaseError> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params![param], schedule_row_from_rusqlite)?;

    let mut raw = Vec::new();
    for row in rows {
        raw.push(row?);
    }

    raw.into_iter()
        .map(|row| schedule_from_row(conn, row))
        .collect()
}

fn get_daily_times(conn: &Connection, schedule_id: &str) -> Result<Vec<DailyTime>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT hour, minute, dosage, meal FROM schedule_times
         WHERE schedule_id = ?1 ORDER BY position",
    )?;
    let rows = stmt.query_map(params![schedule_id], |row| {
        Ok((
            row.get::<_, u8>(0)?,
            row.get::<_, u8>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, Option<String>>(3)?,
        ))
    })?;

    let mut times = Vec::new();
    for row in rows {
        let (hour, minute, dosage, meal) = row?;
        times.push(DailyTime {
            hour,
            minute,
            dosage,
            meal: meal.as_deref().map(MealLabel::from_str).transpose()?,
        });
    }
    Ok(times)
}

// Internal row type for DosingPlan mapping
struct ScheduleRow {
    id: String,
    group_id: String,
    medicine_id: String,
    medicine_name: String,
    dosage: String,
    unit: String,
    repeat_kind: String,
    repeat_value: i32,
    weekdays: String,
    start_date: String,
    end_date: Option<String>,
    is_active: i32,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn schedule_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<ScheduleRow, rusqlite::Error> {
    Ok(ScheduleRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        medicine_id: row.get(2)?,
        medicine_name: row.get(3)?,
        dosage: row.get(4)?,
        unit: row.get(5)?,
        repeat_kind: row.get(6)?,
        repeat_value: row.get(7)?,
        weekdays: row.get(8)?,
        start_date: row.get(9)?,
        end_date: row.get(10)?,
        is_active: row.get(11)?,
        notes: row.get(12)?,
        created_at: row.get(13)?,
        updated_at: row.get(14)?,
    })
}

fn schedule_from_row(conn: &Connection, row: ScheduleRow) -> Result<DosingPlan, DatabaseError> {
    let daily_times = get_daily_times(conn, &row.id)?;
    Ok(DosingPlan {
        id: parse_uuid(&row.id)?,
        group_id: parse_uuid(&row.group_id)?,
        medicine_id: parse_uuid(&row.medicine_id)?,
        medicine_name: row.medicine_name,
        dosage: row.dosage,
        unit: row.unit,
        repeat_kind: RepeatKind::from_str(&row.repeat_kind)?,
        repeat_value: row.repeat_value,
        weekdays: serde_json::from_str(&row.weekdays).map_err(|e| {
            DatabaseError::ConstraintViolation(format!("bad weekdays {}: {e}", row.weekdays))
        })?,
        start_date: parse_date(&row.start_date)?,
        end_date: row.end_date.as_deref().map(parse_date).transpose()?,
        daily_times,
        is_active: row.is_active != 0,
        notes: row.notes,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}

pub(crate) fn parse_uuid(s: &str) -> Result<Uuid, DatabaseError> {
    Uuid::parse_str(s).map_err(|e| DatabaseError::ConstraintViolation(e.to_string()))
}

pub(crate) fn parse_date(s: &str) -> Result<NaiveDate, DatabaseError> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad date {s}: {e}")))
}

pub(crate) fn parse_datetime(s: &str) -> Result<NaiveDateTime, DatabaseError> {
    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
        .map_err(|e| DatabaseError::ConstraintViolation(format!("bad timestamp {s}: {e}")))
}
