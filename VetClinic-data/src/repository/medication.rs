use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::{debug, info, warn};

use super::errors::RepositoryError;
use crate::database::DatabasePool;
use crate::models::{now_utc, timestamp_at, to_db_timestamp, Medication, MedicationInput};

const MEDICATION_COLUMNS: &str = "SELECT m.id, m.branch_id, b.name, m.name, m.category,
        m.description, m.stock, m.created_at, m.updated_at
    FROM medications m JOIN branches b ON b.id = m.branch_id";

fn map_medication(row: &Row<'_>) -> rusqlite::Result<Medication> {
    Ok(Medication {
        id: row.get(0)?,
        branch_id: row.get(1)?,
        branch_name: row.get(2)?,
        name: row.get(3)?,
        category: row.get(4)?,
        description: row.get(5)?,
        stock: row.get(6)?,
        created_at: timestamp_at(row, 7)?,
        updated_at: timestamp_at(row, 8)?,
    })
}

fn fetch(conn: &Connection, id: i64) -> rusqlite::Result<Medication> {
    conn.query_row(&format!("{} WHERE m.id = ?1", MEDICATION_COLUMNS), [id], map_medication)
}

fn duplicate_name(input: &MedicationInput) -> String {
    format!("A medication named '{}' already exists in this branch", input.name.trim())
}

/// Repository for the per-branch pharmacy stock
#[derive(Debug, Clone)]
pub struct MedicationRepository {
    pool: DatabasePool,
}

impl MedicationRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Stock of one branch ordered by name
    pub fn list_by_branch(&self, branch_id: i64) -> Result<Vec<Medication>, RepositoryError> {
        debug!("Listing medications of branch {}", branch_id);
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE m.branch_id = ?1 ORDER BY m.name COLLATE NOCASE, m.id",
            MEDICATION_COLUMNS
        ))?;
        let medications = stmt
            .query_map([branch_id], map_medication)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(medications)
    }

    pub fn get(&self, id: i64) -> Result<Option<Medication>, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(fetch(&conn, id).optional()?)
    }

    pub fn create(&self, input: &MedicationInput) -> Result<Medication, RepositoryError> {
        let conn = self.pool.get()?;
        let now = to_db_timestamp(&now_utc());
        conn.execute(
            "INSERT INTO medications (branch_id, name, category, description, stock, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)",
            params![
                input.branch_id,
                input.name.trim(),
                input.category,
                input.description.trim(),
                input.stock,
                now,
            ],
        )
        .map_err(|e| RepositoryError::from_constraint(e, duplicate_name(input)))?;
        let id = conn.last_insert_rowid();
        info!("Added medication {} '{}' to branch {}", id, input.name.trim(), input.branch_id);

        Ok(fetch(&conn, id)?)
    }

    pub fn update(&self, id: i64, input: &MedicationInput) -> Result<Medication, RepositoryError> {
        let conn = self.pool.get()?;
        let changed = conn
            .execute(
                "UPDATE medications
                 SET branch_id = ?1, name = ?2, category = ?3, description = ?4, stock = ?5,
                     updated_at = ?6
                 WHERE id = ?7",
                params![
                    input.branch_id,
                    input.name.trim(),
                    input.category,
                    input.description.trim(),
                    input.stock,
                    to_db_timestamp(&now_utc()),
                    id,
                ],
            )
            .map_err(|e| RepositoryError::from_constraint(e, duplicate_name(input)))?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("Medication {}", id)));
        }
        info!("Updated medication {}", id);

        Ok(fetch(&conn, id)?)
    }

    /// Remove a medication; one that was already dispensed cannot be removed
    pub fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        let conn = self.pool.get()?;
        let changed = conn
            .execute("DELETE FROM medications WHERE id = ?1", [id])
            .map_err(|e| {
                warn!("Refused to delete medication {}: {}", id, e);
                RepositoryError::from_constraint(
                    e,
                    "The medication has recorded usage and cannot be deleted",
                )
            })?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("Medication {}", id)));
        }
        info!("Deleted medication {}", id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MedicationCategory;
    use crate::testing::Fixture;

    fn input(branch_id: i64, name: &str, stock: i64) -> MedicationInput {
        MedicationInput {
            branch_id,
            name: name.to_string(),
            category: MedicationCategory::Antibiotics,
            description: String::new(),
            stock,
        }
    }

    #[test]
    fn test_name_is_unique_per_branch() {
        let fixture = Fixture::new();
        let repo = MedicationRepository::new(fixture.pool.clone());

        repo.create(&input(fixture.branch_id, "Amoxicillin", 10)).unwrap();
        let dup = repo.create(&input(fixture.branch_id, "Amoxicillin", 3));
        assert!(matches!(dup, Err(RepositoryError::Conflict(_))));

        let other = repo.create(&input(fixture.other_branch_id, "Amoxicillin", 3)).unwrap();
        assert_eq!(other.branch_name, "Norte");
        assert_eq!(repo.list_by_branch(fixture.branch_id).unwrap().len(), 1);
    }

    #[test]
    fn test_negative_stock_is_rejected_by_schema() {
        let fixture = Fixture::new();
        let repo = MedicationRepository::new(fixture.pool.clone());
        let created = repo.create(&input(fixture.branch_id, "Meloxicam", 4)).unwrap();

        assert!(repo.update(created.id, &input(fixture.branch_id, "Meloxicam", -1)).is_err());
        let updated = repo.update(created.id, &input(fixture.branch_id, "Meloxicam", 9)).unwrap();
        assert_eq!(updated.stock, 9);
    }

    #[test]
    fn test_delete_missing_is_not_found() {
        let fixture = Fixture::new();
        let repo = MedicationRepository::new(fixture.pool.clone());
        assert!(matches!(repo.delete(999), Err(RepositoryError::NotFound(_))));

        let created = repo.create(&input(fixture.branch_id, "Tramadol", 2)).unwrap();
        repo.delete(created.id).unwrap();
        assert!(repo.get(created.id).unwrap().is_none());
    }
}
