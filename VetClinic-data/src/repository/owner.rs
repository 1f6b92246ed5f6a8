use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use rusqlite::types::Value;
use tracing::debug;

use super::errors::RepositoryError;
use super::query::Conditions;
use crate::database::DatabasePool;
use crate::models::{
    display_name, optional_timestamp_at, Owner, OwnerActivity, OwnerActivityFilter, OwnerWithPets,
};

const OWNER_COLUMNS: &str = "SELECT o.id, o.user_id, u.username, u.first_name, u.last_name,
        u.email, o.phone, o.address, o.city, o.notes, u.phone
    FROM owners o JOIN users u ON u.id = o.user_id";

fn map_owner(row: &Row<'_>) -> rusqlite::Result<Owner> {
    Ok(Owner {
        id: row.get(0)?,
        user_id: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        email: row.get(5)?,
        phone: row.get(6)?,
        address: row.get(7)?,
        city: row.get(8)?,
        notes: row.get(9)?,
        user_phone: row.get(10)?,
    })
}

/// Repository for owner profiles
#[derive(Debug, Clone)]
pub struct OwnerRepository {
    pool: DatabasePool,
}

impl OwnerRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    pub fn get(&self, id: i64) -> Result<Option<Owner>, RepositoryError> {
        let conn = self.pool.get()?;
        let owner = conn
            .query_row(&format!("{} WHERE o.id = ?1", OWNER_COLUMNS), [id], map_owner)
            .optional()?;
        Ok(owner)
    }

    pub fn get_by_user(&self, user_id: i64) -> Result<Option<Owner>, RepositoryError> {
        let conn = self.pool.get()?;
        let owner = conn
            .query_row(&format!("{} WHERE o.user_id = ?1", OWNER_COLUMNS), [user_id], map_owner)
            .optional()?;
        Ok(owner)
    }

    /// Owners matching `term` on names, username, phone, address or city,
    /// with their pet counts; an empty term matches nobody
    pub fn search(&self, term: &str) -> Result<Vec<OwnerWithPets>, RepositoryError> {
        if term.trim().is_empty() {
            return Ok(Vec::new());
        }
        debug!("Searching owners for '{}'", term);

        let mut conds = Conditions::new();
        conds.search(
            &["u.first_name", "u.last_name", "u.username", "o.phone", "o.address", "o.city"],
            Some(term),
        );

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT o.id, o.user_id, u.username, u.first_name, u.last_name,
                    u.email, o.phone, o.address, o.city, o.notes, u.phone,
                    (SELECT COUNT(*) FROM patients p WHERE p.owner_id = o.id)
             FROM owners o JOIN users u ON u.id = o.user_id{}
             ORDER BY u.first_name, u.last_name",
            conds.where_sql()
        ))?;
        let owners = stmt
            .query_map(params_from_iter(conds.params()), |row| {
                Ok(OwnerWithPets {
                    owner: map_owner(row)?,
                    pet_count: row.get(11)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(owners)
    }

    /// Every owner except `owner_id`, ordered by name
    pub fn list_except(&self, owner_id: i64) -> Result<Vec<Owner>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{} WHERE o.id <> ?1 ORDER BY u.first_name, u.last_name, u.username",
            OWNER_COLUMNS
        ))?;
        let owners = stmt
            .query_map([owner_id], map_owner)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(owners)
    }

    /// Whether the owner has at least one appointment in `branch_id`
    pub fn has_appointments_in_branch(&self, owner_id: i64, branch_id: i64) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM appointments a JOIN patients p ON p.id = a.patient_id
             WHERE p.owner_id = ?1 AND a.branch_id = ?2",
            params![owner_id, branch_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn count(&self) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM owners", [], |row| row.get(0))?)
    }

    /// Owners with pet, record and appointment counters, most recently
    /// treated first
    pub fn activity(&self, filter: &OwnerActivityFilter) -> Result<Vec<OwnerActivity>, RepositoryError> {
        let branch = filter.branch_id.map(Value::Integer).unwrap_or(Value::Null);

        let mut conds = Conditions::new();
        conds.search(&["u.first_name", "u.last_name", "u.username", "o.phone"], filter.search.as_deref());
        if let Some(since) = filter.records_since {
            conds.push(
                "EXISTS (SELECT 1 FROM medical_records r JOIN patients p ON p.id = r.patient_id
                         WHERE p.owner_id = o.id AND date(r.recorded_at) >= ?)",
                [since.to_string().into()],
            );
        }
        if let Some(medication_id) = filter.medication_id {
            conds.push(
                "EXISTS (SELECT 1 FROM appointment_medications am
                         JOIN appointments a ON a.id = am.appointment_id
                         JOIN patients p ON p.id = a.patient_id
                         WHERE p.owner_id = o.id AND am.medication_id = ?
                           AND (? IS NULL OR a.branch_id = ?))",
                [medication_id.into(), branch.clone(), branch.clone()],
            );
        }
        if filter.branch_id.is_some() {
            conds.push(
                "EXISTS (SELECT 1 FROM appointments a JOIN patients p ON p.id = a.patient_id
                         WHERE p.owner_id = o.id AND a.branch_id = ?)",
                [branch.clone()],
            );
        }

        let mut params: Vec<Value> = vec![branch.clone(), branch];
        params.extend(conds.params().iter().cloned());
        let limit = if filter.limit == 0 { 25 } else { filter.limit };

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT o.id, u.first_name, u.last_name, u.username,
                    CASE WHEN o.phone <> '' THEN o.phone ELSE u.phone END,
                    (SELECT COUNT(*) FROM patients p WHERE p.owner_id = o.id),
                    (SELECT COUNT(*) FROM medical_records r JOIN patients p ON p.id = r.patient_id
                     WHERE p.owner_id = o.id),
                    (SELECT COUNT(*) FROM appointments a JOIN patients p ON p.id = a.patient_id
                     WHERE p.owner_id = o.id AND (? IS NULL OR a.branch_id = ?)),
                    (SELECT MAX(r.recorded_at) FROM medical_records r JOIN patients p ON p.id = r.patient_id
                     WHERE p.owner_id = o.id) AS last_record
             FROM owners o JOIN users u ON u.id = o.user_id{}
             ORDER BY last_record IS NULL, last_record DESC, u.first_name, u.last_name
             LIMIT {}",
            conds.where_sql(),
            limit
        ))?;
        let rows = stmt
            .query_map(params_from_iter(params.iter()), |row| {
                let first: String = row.get(1)?;
                let last: String = row.get(2)?;
                let username: String = row.get(3)?;
                Ok(OwnerActivity {
                    owner_id: row.get(0)?,
                    name: display_name(&first, &last, &username),
                    username,
                    phone: row.get(4)?,
                    pet_count: row.get(5)?,
                    record_count: row.get(6)?,
                    appointment_count: row.get(7)?,
                    last_record_at: optional_timestamp_at(row, 8)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Fixture;

    #[test]
    fn test_search_matches_names_and_phone() {
        let fixture = Fixture::new();
        let repo = OwnerRepository::new(fixture.pool.clone());

        let found = repo.search("góm").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].owner.id, fixture.owner_id);
        assert_eq!(found[0].pet_count, 1);
        assert_eq!(repo.search("555-0101").unwrap().len(), 1);
        assert!(repo.search("   ").unwrap().is_empty());
    }

    #[test]
    fn test_search_treats_wildcards_literally() {
        let fixture = Fixture::new();
        let repo = OwnerRepository::new(fixture.pool.clone());

        assert!(repo.search("%").unwrap().is_empty());
        assert!(repo.search("_").unwrap().is_empty());
        assert!(repo.search("\\").unwrap().is_empty());
    }
}
