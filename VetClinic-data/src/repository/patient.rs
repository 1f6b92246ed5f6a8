use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::info;

use super::errors::RepositoryError;
use super::query::Conditions;
use crate::database::DatabasePool;
use crate::models::{display_name, BranchScope, Patient, PatientInput};

const PATIENT_COLUMNS: &str = "SELECT p.id, p.name, p.species, p.breed, p.sex, p.birth_date,
        p.owner_id, u.first_name, u.last_name, u.username, p.vaccines, p.allergies
    FROM patients p
    JOIN owners o ON o.id = p.owner_id
    JOIN users u ON u.id = o.user_id";

fn map_patient(row: &Row<'_>) -> rusqlite::Result<Patient> {
    let first: String = row.get(7)?;
    let last: String = row.get(8)?;
    let username: String = row.get(9)?;
    Ok(Patient {
        id: row.get(0)?,
        name: row.get(1)?,
        species: row.get(2)?,
        breed: row.get(3)?,
        sex: row.get(4)?,
        birth_date: row.get(5)?,
        owner_id: row.get(6)?,
        owner_name: display_name(&first, &last, &username),
        vaccines: row.get(10)?,
        allergies: row.get(11)?,
    })
}

/// Repository for pets
#[derive(Debug, Clone)]
pub struct PatientRepository {
    pool: DatabasePool,
}

impl PatientRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn create(&self, owner_id: i64, input: &PatientInput) -> Result<Patient, RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO patients (name, species, breed, sex, birth_date, owner_id, vaccines, allergies)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                input.name.trim(),
                input.species.trim(),
                input.breed.trim(),
                input.sex.trim(),
                input.birth_date,
                owner_id,
                input.vaccines,
                input.allergies,
            ],
        )?;
        let id = conn.last_insert_rowid();
        info!("Registered patient {} for owner {}", id, owner_id);

        conn.query_row(&format!("{} WHERE p.id = ?1", PATIENT_COLUMNS), [id], map_patient)
            .map_err(RepositoryError::from)
    }

    pub fn get(&self, id: i64) -> Result<Option<Patient>, RepositoryError> {
        let conn = self.pool.get()?;
        let patient = conn
            .query_row(&format!("{} WHERE p.id = ?1", PATIENT_COLUMNS), [id], map_patient)
            .optional()?;
        Ok(patient)
    }

    /// Patients visible in `scope`, ordered by name. A branch scope keeps
    /// patients with at least one appointment in that branch.
    pub fn list(&self, scope: BranchScope) -> Result<Vec<Patient>, RepositoryError> {
        let mut conds = Conditions::new();
        match scope {
            BranchScope::All => {}
            BranchScope::Branch(id) => conds.push(
                "EXISTS (SELECT 1 FROM appointments a WHERE a.patient_id = p.id AND a.branch_id = ?)",
                [id.into()],
            ),
            BranchScope::Nothing => conds.push("0 = 1", []),
        }

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{}{} ORDER BY p.name, p.id",
            PATIENT_COLUMNS,
            conds.where_sql()
        ))?;
        let patients = stmt
            .query_map(params_from_iter(conds.params()), map_patient)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(patients)
    }

    pub fn list_by_owner(&self, owner_id: i64) -> Result<Vec<Patient>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE p.owner_id = ?1 ORDER BY p.name, p.id",
            PATIENT_COLUMNS
        ))?;
        let patients = stmt
            .query_map([owner_id], map_patient)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(patients)
    }

    /// Move a pet to another owner
    pub fn transfer(&self, patient_id: i64, new_owner_id: i64) -> Result<Patient, RepositoryError> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE patients SET owner_id = ?1 WHERE id = ?2",
            params![new_owner_id, patient_id],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("Patient {}", patient_id)));
        }
        info!("Transferred patient {} to owner {}", patient_id, new_owner_id);

        conn.query_row(&format!("{} WHERE p.id = ?1", PATIENT_COLUMNS), [patient_id], map_patient)
            .map_err(RepositoryError::from)
    }

    pub fn count(&self) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM patients", [], |row| row.get(0))?)
    }
}
