use chrono::NaiveDate;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row};
use tracing::{debug, info};

use super::appointment::optional_name;
use super::errors::RepositoryError;
use super::query::Conditions;
use crate::database::DatabasePool;
use crate::models::{
    display_name, now_utc, timestamp_at, to_db_timestamp, AppointmentStatus, BranchScope,
    MedicalRecord, RecordFilter, RecordInput,
};

pub(crate) const RECORD_COLUMNS: &str = "SELECT r.id, r.patient_id, p.name, p.species,
        o.id, ou.first_name, ou.last_name, ou.username,
        r.vet_id, vu.first_name, vu.last_name, vu.username,
        r.recorded_at, r.diagnosis, r.treatment, r.notes, r.weight_kg, r.temperature_c,
        r.exams, r.next_checkup, r.no_next_checkup, r.appointment_id
    FROM medical_records r
    JOIN patients p ON p.id = r.patient_id
    JOIN owners o ON o.id = p.owner_id
    JOIN users ou ON ou.id = o.user_id
    LEFT JOIN users vu ON vu.id = r.vet_id";

pub(crate) fn map_record(row: &Row<'_>) -> rusqlite::Result<MedicalRecord> {
    let owner_first: String = row.get(5)?;
    let owner_last: String = row.get(6)?;
    let owner_username: String = row.get(7)?;

    Ok(MedicalRecord {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        patient_name: row.get(2)?,
        patient_species: row.get(3)?,
        owner_id: row.get(4)?,
        owner_name: display_name(&owner_first, &owner_last, &owner_username),
        vet_id: row.get(8)?,
        vet_name: optional_name(row, 9)?,
        recorded_at: timestamp_at(row, 12)?,
        diagnosis: row.get(13)?,
        treatment: row.get(14)?,
        notes: row.get(15)?,
        weight_kg: row.get(16)?,
        temperature_c: row.get(17)?,
        exams: row.get(18)?,
        next_checkup: row.get(19)?,
        no_next_checkup: row.get(20)?,
        appointment_id: row.get(21)?,
    })
}

pub(crate) fn fetch_record(conn: &Connection, id: i64) -> rusqlite::Result<MedicalRecord> {
    conn.query_row(&format!("{} WHERE r.id = ?1", RECORD_COLUMNS), [id], map_record)
}

/// Write the record linked to `appointment_id`, updating it when one exists.
/// Runs on the caller's connection so it can join a larger transaction.
pub(crate) fn upsert_linked(
    conn: &Connection,
    appointment_id: i64,
    patient_id: i64,
    vet_id: i64,
    input: &RecordInput,
) -> Result<i64, RepositoryError> {
    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM medical_records WHERE appointment_id = ?1",
            [appointment_id],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(id) => {
            conn.execute(
                "UPDATE medical_records
                 SET patient_id = ?1, vet_id = ?2, diagnosis = ?3, treatment = ?4, notes = ?5,
                     weight_kg = ?6, temperature_c = ?7, exams = ?8, next_checkup = ?9,
                     no_next_checkup = ?10
                 WHERE id = ?11",
                params![
                    patient_id,
                    vet_id,
                    input.diagnosis.trim(),
                    input.treatment.trim(),
                    input.notes.trim(),
                    input.weight_kg,
                    input.temperature_c,
                    input.exams.trim(),
                    input.effective_next_checkup(),
                    input.no_next_checkup,
                    id,
                ],
            )?;
            debug!("Updated record {} for appointment {}", id, appointment_id);
            Ok(id)
        }
        None => insert(conn, Some(appointment_id), patient_id, vet_id, input),
    }
}

fn insert(
    conn: &Connection,
    appointment_id: Option<i64>,
    patient_id: i64,
    vet_id: i64,
    input: &RecordInput,
) -> Result<i64, RepositoryError> {
    conn.execute(
        "INSERT INTO medical_records (patient_id, vet_id, recorded_at, diagnosis, treatment, notes,
            weight_kg, temperature_c, exams, next_checkup, no_next_checkup, appointment_id)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            patient_id,
            vet_id,
            to_db_timestamp(&now_utc()),
            input.diagnosis.trim(),
            input.treatment.trim(),
            input.notes.trim(),
            input.weight_kg,
            input.temperature_c,
            input.exams.trim(),
            input.effective_next_checkup(),
            input.no_next_checkup,
            appointment_id,
        ],
    )?;
    let id = conn.last_insert_rowid();
    debug!("Inserted record {} for patient {}", id, patient_id);
    Ok(id)
}

/// Repository for medical records
#[derive(Debug, Clone)]
pub struct RecordRepository {
    pool: DatabasePool,
}

impl RecordRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Register a record. When linked to an appointment the record of that
    /// appointment is replaced and the appointment is marked attended.
    pub fn create(
        &self,
        patient_id: i64,
        vet_id: i64,
        appointment_id: Option<i64>,
        input: &RecordInput,
    ) -> Result<MedicalRecord, RepositoryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let id = match appointment_id {
            Some(appointment_id) => {
                let id = upsert_linked(&tx, appointment_id, patient_id, vet_id, input)?;
                tx.execute(
                    "UPDATE appointments SET status = ?1 WHERE id = ?2",
                    params![AppointmentStatus::Attended, appointment_id],
                )?;
                id
            }
            None => insert(&tx, None, patient_id, vet_id, input)?,
        };
        let record = fetch_record(&tx, id)?;
        tx.commit()?;

        info!("Saved medical record {} for patient {}", id, patient_id);
        Ok(record)
    }

    pub fn get(&self, id: i64) -> Result<Option<MedicalRecord>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(fetch_record(&conn, id).optional()?)
    }

    pub fn get_by_appointment(&self, appointment_id: i64) -> Result<Option<MedicalRecord>, RepositoryError> {
        let conn = self.pool.get()?;
        let record = conn
            .query_row(
                &format!("{} WHERE r.appointment_id = ?1", RECORD_COLUMNS),
                [appointment_id],
                map_record,
            )
            .optional()?;
        Ok(record)
    }

    /// First unlinked record of the patient written on `date`
    pub fn same_day_unlinked(
        &self,
        patient_id: i64,
        date: NaiveDate,
    ) -> Result<Option<MedicalRecord>, RepositoryError> {
        let conn = self.pool.get()?;
        let record = conn
            .query_row(
                &format!(
                    "{} WHERE r.patient_id = ?1 AND r.appointment_id IS NULL
                        AND date(r.recorded_at) = ?2
                     ORDER BY r.recorded_at, r.id LIMIT 1",
                    RECORD_COLUMNS
                ),
                params![patient_id, date],
                map_record,
            )
            .optional()?;
        Ok(record)
    }

    /// Records matching `filter`, newest first. A branch scope keeps records
    /// of patients with an appointment in that branch.
    pub fn list(&self, filter: &RecordFilter) -> Result<Vec<MedicalRecord>, RepositoryError> {
        debug!("Listing records with {:?}", filter);
        let mut conds = Conditions::new();
        conds.push_opt("r.patient_id = ?", filter.patient_id);
        conds.push_opt("o.id = ?", filter.owner_id);
        conds.push_opt("r.vet_id = ?", filter.vet_id);
        match filter.scope {
            BranchScope::All => {}
            BranchScope::Branch(id) => conds.push(
                "EXISTS (SELECT 1 FROM appointments a WHERE a.patient_id = r.patient_id AND a.branch_id = ?)",
                [id.into()],
            ),
            BranchScope::Nothing => conds.push("0 = 1", []),
        }
        conds.search(
            &["p.name", "ou.first_name", "ou.last_name", "r.diagnosis"],
            filter.search.as_deref(),
        );
        conds.push_opt("date(r.recorded_at) >= ?", filter.from.map(|d| d.to_string()));
        conds.push_opt("date(r.recorded_at) <= ?", filter.to.map(|d| d.to_string()));

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{}{} ORDER BY r.recorded_at DESC, r.id DESC",
            RECORD_COLUMNS,
            conds.where_sql()
        ))?;
        let records = stmt
            .query_map(params_from_iter(conds.params()), map_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }
}
