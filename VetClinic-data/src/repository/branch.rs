use rusqlite::{params, OptionalExtension, Row};
use tracing::{debug, info};

use super::errors::RepositoryError;
use crate::database::DatabasePool;
use crate::models::{Branch, BranchInput};

const BRANCH_COLUMNS: &str = "SELECT id, name, address, city, phone FROM branches";

fn map_branch(row: &Row<'_>) -> rusqlite::Result<Branch> {
    Ok(Branch {
        id: row.get(0)?,
        name: row.get(1)?,
        address: row.get(2)?,
        city: row.get(3)?,
        phone: row.get(4)?,
    })
}

/// Repository for clinic branches
#[derive(Debug, Clone)]
pub struct BranchRepository {
    pool: DatabasePool,
}

impl BranchRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// All branches ordered by name
    pub fn list(&self) -> Result<Vec<Branch>, RepositoryError> {
        debug!("Listing branches");
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY name", BRANCH_COLUMNS))?;
        let branches = stmt
            .query_map([], map_branch)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(branches)
    }

    pub fn get(&self, id: i64) -> Result<Option<Branch>, RepositoryError> {
        let conn = self.pool.get()?;
        let branch = conn
            .query_row(&format!("{} WHERE id = ?1", BRANCH_COLUMNS), [id], map_branch)
            .optional()?;
        Ok(branch)
    }

    pub fn create(&self, input: &BranchInput) -> Result<Branch, RepositoryError> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT INTO branches (name, address, city, phone) VALUES (?1, ?2, ?3, ?4)",
            params![input.name.trim(), input.address, input.city, input.phone],
        )
        .map_err(|e| {
            RepositoryError::from_constraint(e, format!("A branch named '{}' already exists", input.name.trim()))
        })?;
        let id = conn.last_insert_rowid();
        info!("Created branch {} ({})", id, input.name);

        conn.query_row(&format!("{} WHERE id = ?1", BRANCH_COLUMNS), [id], map_branch)
            .map_err(RepositoryError::from)
    }

    pub fn update(&self, id: i64, input: &BranchInput) -> Result<Branch, RepositoryError> {
        let conn = self.pool.get()?;
        let changed = conn
            .execute(
                "UPDATE branches SET name = ?1, address = ?2, city = ?3, phone = ?4 WHERE id = ?5",
                params![input.name.trim(), input.address, input.city, input.phone, id],
            )
            .map_err(|e| {
                RepositoryError::from_constraint(e, format!("A branch named '{}' already exists", input.name.trim()))
            })?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("Branch {}", id)));
        }
        info!("Updated branch {}", id);

        conn.query_row(&format!("{} WHERE id = ?1", BRANCH_COLUMNS), [id], map_branch)
            .map_err(RepositoryError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::initialize_in_memory_pool;

    fn input(name: &str) -> BranchInput {
        BranchInput {
            name: name.to_string(),
            address: "Av. Colón 100".to_string(),
            city: "Córdoba".to_string(),
            phone: "+54 351 000-0000".to_string(),
        }
    }

    #[test]
    fn test_branches_are_listed_by_name() {
        let repo = BranchRepository::new(initialize_in_memory_pool().unwrap());
        repo.create(&input("Norte")).unwrap();
        repo.create(&input("Centro")).unwrap();

        let names: Vec<String> = repo.list().unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["Centro", "Norte"]);
    }

    #[test]
    fn test_duplicate_branch_name_is_a_conflict() {
        let repo = BranchRepository::new(initialize_in_memory_pool().unwrap());
        repo.create(&input("Centro")).unwrap();
        assert!(matches!(repo.create(&input("Centro")), Err(RepositoryError::Conflict(_))));
    }

    #[test]
    fn test_update_missing_branch() {
        let repo = BranchRepository::new(initialize_in_memory_pool().unwrap());
        assert!(matches!(repo.update(99, &input("X")), Err(RepositoryError::NotFound(_))));
    }
}
