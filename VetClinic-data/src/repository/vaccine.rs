use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};
use tracing::info;

use super::errors::RepositoryError;
use crate::database::DatabasePool;
use crate::models::{now_utc, timestamp_at, to_db_timestamp, Species, Vaccine, VaccineRecord};

const VACCINE_COLUMNS: &str = "SELECT id, name, species, description, recommended_age,
        age_unit, booster, sort_order
    FROM vaccines";

fn map_vaccine(row: &Row<'_>) -> rusqlite::Result<Vaccine> {
    Ok(Vaccine {
        id: row.get(0)?,
        name: row.get(1)?,
        species: row.get(2)?,
        description: row.get(3)?,
        recommended_age: row.get(4)?,
        age_unit: row.get(5)?,
        booster: row.get(6)?,
        sort_order: row.get(7)?,
    })
}

fn map_vaccine_record(row: &Row<'_>) -> rusqlite::Result<VaccineRecord> {
    Ok(VaccineRecord {
        id: row.get(0)?,
        patient_id: row.get(1)?,
        vaccine_id: row.get(2)?,
        applied_on: row.get(3)?,
        notes: row.get(4)?,
        created_at: timestamp_at(row, 5)?,
        updated_at: timestamp_at(row, 6)?,
    })
}

/// Repository for the vaccine schedule and applied doses
#[derive(Debug, Clone)]
pub struct VaccineRepository {
    pool: DatabasePool,
}

impl VaccineRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Schedule of one species in calendar order
    pub fn list_for_species(&self, species: Species) -> Result<Vec<Vaccine>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE species = ?1 ORDER BY sort_order, name",
            VACCINE_COLUMNS
        ))?;
        let vaccines = stmt
            .query_map([species], map_vaccine)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(vaccines)
    }

    pub fn get(&self, id: i64) -> Result<Option<Vaccine>, RepositoryError> {
        let conn = self.pool.get()?;
        let vaccine = conn
            .query_row(&format!("{} WHERE id = ?1", VACCINE_COLUMNS), [id], map_vaccine)
            .optional()?;
        Ok(vaccine)
    }

    pub fn records_for_patient(&self, patient_id: i64) -> Result<Vec<VaccineRecord>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, patient_id, vaccine_id, applied_on, notes, created_at, updated_at
             FROM vaccine_records WHERE patient_id = ?1 ORDER BY applied_on",
        )?;
        let records = stmt
            .query_map([patient_id], map_vaccine_record)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(records)
    }

    /// Record a dose; returns the stored row and whether it was newly created
    pub fn upsert_record(
        &self,
        patient_id: i64,
        vaccine_id: i64,
        applied_on: NaiveDate,
        notes: &str,
    ) -> Result<(VaccineRecord, bool), RepositoryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        let now = to_db_timestamp(&now_utc());

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM vaccine_records WHERE patient_id = ?1 AND vaccine_id = ?2",
                params![patient_id, vaccine_id],
                |row| row.get(0),
            )
            .optional()?;
        let created = existing.is_none();

        match existing {
            Some(id) => {
                tx.execute(
                    "UPDATE vaccine_records SET applied_on = ?1, notes = ?2, updated_at = ?3 WHERE id = ?4",
                    params![applied_on, notes.trim(), now, id],
                )?;
            }
            None => {
                tx.execute(
                    "INSERT INTO vaccine_records (patient_id, vaccine_id, applied_on, notes, created_at, updated_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                    params![patient_id, vaccine_id, applied_on, notes.trim(), now],
                )?;
            }
        }

        let record = tx.query_row(
            "SELECT id, patient_id, vaccine_id, applied_on, notes, created_at, updated_at
             FROM vaccine_records WHERE patient_id = ?1 AND vaccine_id = ?2",
            params![patient_id, vaccine_id],
            map_vaccine_record,
        )?;
        tx.commit()?;

        info!(
            "{} vaccine {} for patient {} on {}",
            if created { "Recorded" } else { "Updated" },
            vaccine_id,
            patient_id,
            applied_on
        );
        Ok((record, created))
    }

    /// Remove a dose; returns whether there was one
    pub fn delete_record(&self, patient_id: i64, vaccine_id: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let deleted = conn.execute(
            "DELETE FROM vaccine_records WHERE patient_id = ?1 AND vaccine_id = ?2",
            params![patient_id, vaccine_id],
        )?;
        Ok(deleted > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn test_schedule_is_seeded_in_order() {
        let fixture = Fixture::new();
        let repo = VaccineRepository::new(fixture.pool.clone());

        let canine = repo.list_for_species(Species::Canine).unwrap();
        assert_eq!(canine.len(), 6);
        assert!(canine.windows(2).all(|w| w[0].sort_order <= w[1].sort_order));
        assert_eq!(repo.list_for_species(Species::Feline).unwrap().len(), 4);
    }

    #[test]
    fn test_upsert_then_delete_record() {
        let fixture = Fixture::new();
        let repo = VaccineRepository::new(fixture.pool.clone());
        let vaccine = &repo.list_for_species(Species::Canine).unwrap()[0];
        let day = NaiveDate::from_ymd_opt(2024, 5, 2).unwrap();

        let (first, created) = repo.upsert_record(fixture.patient_id, vaccine.id, day, "").unwrap();
        assert!(created);
        let (second, created) = repo
            .upsert_record(fixture.patient_id, vaccine.id, day.succ_opt().unwrap(), "booster")
            .unwrap();
        assert!(!created);
        assert_eq!(first.id, second.id);
        assert_eq!(second.notes, "booster");
        assert_eq!(repo.records_for_patient(fixture.patient_id).unwrap().len(), 1);

        assert!(repo.delete_record(fixture.patient_id, vaccine.id).unwrap());
        assert!(!repo.delete_record(fixture.patient_id, vaccine.id).unwrap());
    }
}
