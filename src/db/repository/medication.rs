use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use super::schedule::{parse_datetime, parse_uuid};
use crate::db::{DatabaseError, DATETIME_FORMAT};
use crate::models::*;

pub fn upsert_medicine(conn: &Connection, med: &Medicine) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO medicines (id, group_id, name, dosage, unit, pillbox_slot, stock_count,
         notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
         ON CONFLICT(id) DO UPDATE SET
            name = excluded.name,
            dosage = excluded.dosage,
            unit = excluded.unit,
            pillbox_slot = excluded.pillbox_slot,
            stock_count = excluded.stock_count,
            notes = excluded.notes,
            updated_at = excluded.updated_at",
        params![
            med.id.to_string(),
            med.group_id.to_string(),
            med.name,
            med.dosage,
            med.unit,
            med.pillbox_slot,
            med.stock_count,
            med.notes,
            med.created_at.format(DATETIME_FORMAT).to_string(),
            med.updated_at.format(DATETIME_FORMAT).to_string(),
        ],
    )?;
    Ok(())
}

pub fn get_medicine(conn: &Connection, id: &Uuid) -> Result<Option<Medicine>, DatabaseError> {
    let row = conn
        .query_row(
            "SELECT id, group_id, name, dosage, unit, pillbox_slot, stock_count, notes,
             created_at, updated_at FROM medicines WHERE id = ?1",
            params![id.to_string()],
            medicine_row_from_rusqlite,
        )
        .optional()?;
    row.map(medicine_from_row).transpose()
}

/// Medicines of a group ordered by pillbox slot, unassigned last.
pub fn list_medicines(conn: &Connection, group_id: &Uuid) -> Result<Vec<Medicine>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, group_id, name, dosage, unit, pillbox_slot, stock_count, notes,
         created_at, updated_at FROM medicines WHERE group_id = ?1
         ORDER BY pillbox_slot IS NULL, pillbox_slot, name",
    )?;
    let rows = stmt.query_map(params![group_id.to_string()], medicine_row_from_rusqlite)?;

    let mut meds = Vec::new();
    for row in rows {
        meds.push(medicine_from_row(row?)?);
    }
    Ok(meds)
}

/// Deletes a medicine and every schedule that references it.
pub fn delete_medicine_cascade(conn: &Connection, med_id: &Uuid) -> Result<(), DatabaseError> {
    let tx = conn.unchecked_transaction()?;
    tx.execute("DELETE FROM schedules WHERE medicine_id = ?1", params![med_id.to_string()])?;
    let deleted = tx.execute("DELETE FROM medicines WHERE id = ?1", params![med_id.to_string()])?;
    if deleted == 0 {
        return Err(DatabaseError::NotFound {
            entity_type: "Medicine".into(),
            id: med_id.to_string(),
        });
    }
    tx.commit()?;
    Ok(())
}

struct MedicineRow {
    id: String,
    group_id: String,
    name: String,
    dosage: String,
    unit: String,
    pillbox_slot: Option<u8>,
    stock_count: Option<i32>,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
}

fn medicine_row_from_rusqlite(row: &rusqlite::Row<'_>) -> Result<MedicineRow, rusqlite::Error> {
    Ok(MedicineRow {
        id: row.get(0)?,
        group_id: row.get(1)?,
        name: row.get(2)?,
        dosage: row.get(3)?,
        unit: row.get(4)?,
        pillbox_slot: row.get(5)?,
        stock_count: row.get(6)?,
        notes: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn medicine_from_row(row: MedicineRow) -> Result<Medicine, DatabaseError> {
    Ok(Medicine {
        id: parse_uuid(&row.id)?,
        group_id: parse_uuid(&row.group_id)?,
        name: row.name,
        dosage: row.dosage,
        unit: row.unit,
        pillbox_slot: row.pillbox_slot,
        stock_count: row.stock_count,
        notes: row.notes,
        created_at: parse_datetime(&row.created_at)?,
        updated_at: parse_datetime(&row.updated_at)?,
    })
}
