use rusqlite::{params, params_from_iter, OptionalExtension, Row};
use tracing::{debug, info};

use super::errors::RepositoryError;
use super::query::Conditions;
use crate::database::DatabasePool;
use crate::models::{
    now_utc, timestamp_at, to_db_timestamp, AccountUpdate, BranchScope, NewUser, ProfileUpdate, Role,
    User,
};

const USER_COLUMNS: &str = "SELECT u.id, u.username, u.email, u.first_name, u.last_name,
        u.password_hash, u.role, u.phone, u.address, u.specialty, u.available,
        u.is_active, u.is_superuser, u.branch_id, b.name, u.created_at
    FROM users u LEFT JOIN branches b ON b.id = u.branch_id";

fn map_user(row: &Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        password_hash: row.get(5)?,
        role: row.get(6)?,
        phone: row.get(7)?,
        address: row.get(8)?,
        specialty: row.get(9)?,
        available: row.get(10)?,
        is_active: row.get(11)?,
        is_superuser: row.get(12)?,
        branch_id: row.get(13)?,
        branch_name: row.get(14)?,
        created_at: timestamp_at(row, 15)?,
    })
}

/// Repository for login accounts and their owner profiles
#[derive(Debug, Clone)]
pub struct UserRepository {
    pool: DatabasePool,
}

impl UserRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }

    /// Insert an account; an OWNER gets its owner profile in the same transaction
    pub fn create(&self, user: &NewUser) -> Result<User, RepositoryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT INTO users (username, email, first_name, last_name, password_hash, role,
                phone, address, specialty, available, is_active, is_superuser, branch_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                user.username.trim(),
                user.email.trim(),
                user.first_name.trim(),
                user.last_name.trim(),
                user.password_hash,
                user.role,
                user.phone.trim(),
                user.address.trim(),
                user.specialty.trim(),
                user.available,
                user.is_active,
                user.is_superuser,
                user.branch_id,
                to_db_timestamp(&now_utc()),
            ],
        )
        .map_err(|e| {
            RepositoryError::from_constraint(e, format!("The username '{}' is already taken", user.username.trim()))
        })?;
        let id = tx.last_insert_rowid();

        if user.role == Role::Owner {
            tx.execute(
                "INSERT INTO owners (user_id, phone, address) VALUES (?1, ?2, ?3)",
                params![id, user.phone.trim(), user.address.trim()],
            )?;
        }

        let created = tx.query_row(&format!("{} WHERE u.id = ?1", USER_COLUMNS), [id], map_user)?;
        tx.commit()?;

        info!("Created user {} with role {}", created.username, created.role);
        Ok(created)
    }

    pub fn get(&self, id: i64) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(&format!("{} WHERE u.id = ?1", USER_COLUMNS), [id], map_user)
            .optional()?;
        Ok(user)
    }

    pub fn get_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let user = conn
            .query_row(
                &format!("{} WHERE lower(u.username) = lower(?1)", USER_COLUMNS),
                [username.trim()],
                map_user,
            )
            .optional()?;
        Ok(user)
    }

    pub fn username_exists(&self, username: &str) -> Result<bool, RepositoryError> {
        Ok(self.get_by_username(username)?.is_some())
    }

    /// Whether another account already uses this email (case-insensitive)
    pub fn email_in_use(&self, email: &str, exclude_user: Option<i64>) -> Result<bool, RepositoryError> {
        let conn = self.pool.get()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM users
             WHERE email <> '' AND lower(email) = lower(?1) AND id <> ?2",
            params![email.trim(), exclude_user.unwrap_or(0)],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Every non-empty phone on file with the account it belongs to,
    /// from both account rows and owner profiles
    pub fn contact_phones(&self) -> Result<Vec<(i64, String)>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, phone FROM users WHERE phone <> ''
             UNION ALL
             SELECT user_id, phone FROM owners WHERE phone <> ''",
        )?;
        let phones = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(phones)
    }

    /// All accounts ordered by username
    pub fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!("{} ORDER BY u.username", USER_COLUMNS))?;
        let users = stmt.query_map([], map_user)?.collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Vets in scope ordered by name; `active_only` keeps available, enabled accounts
    pub fn list_vets(&self, scope: BranchScope, active_only: bool) -> Result<Vec<User>, RepositoryError> {
        debug!("Listing vets for {:?} (active_only={})", scope, active_only);
        let mut conds = Conditions::new();
        conds.push("u.role = ?", [Role::Vet.as_str().to_string().into()]);
        conds.scope("u.branch_id", scope);
        if active_only {
            conds.push("u.available = 1 AND u.is_active = 1", []);
        }

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{}{} ORDER BY u.first_name, u.last_name, u.username",
            USER_COLUMNS,
            conds.where_sql()
        ))?;
        let vets = stmt
            .query_map(params_from_iter(conds.params()), map_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(vets)
    }

    /// Non-vet accounts that could be promoted; a branch scope also admits
    /// accounts with no branch yet
    pub fn vet_candidates(&self, scope: BranchScope) -> Result<Vec<User>, RepositoryError> {
        let mut conds = Conditions::new();
        conds.push("u.role <> ?", [Role::Vet.as_str().to_string().into()]);
        match scope {
            BranchScope::All => {}
            BranchScope::Branch(id) => {
                conds.push("(u.branch_id = ? OR u.branch_id IS NULL)", [id.into()])
            }
            BranchScope::Nothing => conds.push("0 = 1", []),
        }

        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(&format!(
            "{}{} ORDER BY u.first_name, u.last_name, u.username",
            USER_COLUMNS,
            conds.where_sql()
        ))?;
        let users = stmt
            .query_map(params_from_iter(conds.params()), map_user)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(users)
    }

    /// Make the account a vet of `branch_id`
    pub fn promote_to_vet(&self, user_id: i64, branch_id: i64) -> Result<User, RepositoryError> {
        let conn = self.pool.get()?;
        let changed = conn.execute(
            "UPDATE users SET role = ?1, branch_id = ?2, available = 1 WHERE id = ?3",
            params![Role::Vet, branch_id, user_id],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("User {}", user_id)));
        }
        info!("Promoted user {} to vet of branch {}", user_id, branch_id);

        conn.query_row(&format!("{} WHERE u.id = ?1", USER_COLUMNS), [user_id], map_user)
            .map_err(RepositoryError::from)
    }

    /// Apply a profile edit and mirror phone and address onto the owner profile
    /// of OWNER accounts, creating that profile when missing
    pub fn update_profile(&self, user_id: i64, update: &ProfileUpdate) -> Result<User, RepositoryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let changed = tx.execute(
            "UPDATE users SET email = ?1, first_name = ?2, last_name = ?3, phone = ?4, address = ?5
             WHERE id = ?6",
            params![
                update.email.trim(),
                update.first_name.trim(),
                update.last_name.trim(),
                update.phone.trim(),
                update.address.trim(),
                user_id,
            ],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("User {}", user_id)));
        }

        if let Some(hash) = &update.password_hash {
            tx.execute("UPDATE users SET password_hash = ?1 WHERE id = ?2", params![hash, user_id])?;
        }

        let user = tx.query_row(&format!("{} WHERE u.id = ?1", USER_COLUMNS), [user_id], map_user)?;
        if user.role == Role::Owner {
            tx.execute(
                "INSERT INTO owners (user_id, phone, address) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET phone = excluded.phone, address = excluded.address",
                params![user_id, update.phone.trim(), update.address.trim()],
            )?;
        }
        tx.commit()?;

        info!("Updated profile of user {}", user_id);
        Ok(user)
    }

    /// Administrative edit of every account field. An account that ends up
    /// as OWNER keeps an owner profile in step with its phone and address.
    pub fn update_account(&self, user_id: i64, update: &AccountUpdate) -> Result<User, RepositoryError> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;

        let branch_id = if update.role.is_branch_role() { update.branch_id } else { None };
        let changed = tx.execute(
            "UPDATE users SET email = ?1, first_name = ?2, last_name = ?3, phone = ?4, address = ?5,
                role = ?6, specialty = ?7, branch_id = ?8, available = ?9, is_active = ?10,
                is_superuser = ?11
             WHERE id = ?12",
            params![
                update.email.trim(),
                update.first_name.trim(),
                update.last_name.trim(),
                update.phone.trim(),
                update.address.trim(),
                update.role,
                update.specialty.trim(),
                branch_id,
                update.available,
                update.is_active,
                update.is_superuser,
                user_id,
            ],
        )?;
        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("User {}", user_id)));
        }

        if let Some(hash) = &update.password_hash {
            tx.execute("UPDATE users SET password_hash = ?1 WHERE id = ?2", params![hash, user_id])?;
        }

        if update.role == Role::Owner {
            tx.execute(
                "INSERT INTO owners (user_id, phone, address) VALUES (?1, ?2, ?3)
                 ON CONFLICT(user_id) DO UPDATE SET phone = excluded.phone, address = excluded.address",
                params![user_id, update.phone.trim(), update.address.trim()],
            )?;
        }

        let user = tx.query_row(&format!("{} WHERE u.id = ?1", USER_COLUMNS), [user_id], map_user)?;
        tx.commit()?;

        info!(
            "Updated account {} (role {}, active={}, available={})",
            user.username, user.role, user.is_active, user.available
        );
        Ok(user)
    }

    pub fn count(&self) -> Result<i64, RepositoryError> {
        let conn = self.pool.get()?;
        Ok(conn.query_row("SELECT COUNT(*) FROM users", [], |row| row.get(0))?)
    }

    pub fn count_in_scope(&self, scope: BranchScope) -> Result<i64, RepositoryError> {
        let mut conds = Conditions::new();
        conds.scope("u.branch_id", scope);
        let conn = self.pool.get()?;
        Ok(conn.query_row(
            &format!("SELECT COUNT(*) FROM users u{}", conds.where_sql()),
            params_from_iter(conds.params()),
            |row| row.get(0),
        )?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::initialize_in_memory_pool;
    use crate::models::BranchInput;
    use crate::repository::BranchRepository;

    fn setup() -> (UserRepository, i64) {
        let pool = initialize_in_memory_pool().unwrap();
        let branch = BranchRepository::new(pool.clone())
            .create(&BranchInput {
                name: "Centro".to_string(),
                address: "Main 1".to_string(),
                ..BranchInput::default()
            })
            .unwrap();
        (UserRepository::new(pool), branch.id)
    }

    #[test]
    fn test_owner_account_gets_owner_profile() {
        let (repo, _) = setup();
        let mut new_user = NewUser::basic("maria", "hash", Role::Owner);
        new_user.phone = "351 555-0101".to_string();
        let user = repo.create(&new_user).unwrap();

        let conn = repo.pool.get().unwrap();
        let phone: String = conn
            .query_row("SELECT phone FROM owners WHERE user_id = ?1", [user.id], |row| row.get(0))
            .unwrap();
        assert_eq!(phone, "351 555-0101");
    }

    #[test]
    fn test_duplicate_username_is_a_conflict() {
        let (repo, _) = setup();
        repo.create(&NewUser::basic("maria", "hash", Role::Owner)).unwrap();
        let result = repo.create(&NewUser::basic("maria", "hash", Role::Vet));
        assert!(matches!(result, Err(RepositoryError::Conflict(_))));
    }

    #[test]
    fn test_email_in_use_is_case_insensitive_and_excludes_self() {
        let (repo, _) = setup();
        let mut new_user = NewUser::basic("maria", "hash", Role::Owner);
        new_user.email = "Maria@Example.com".to_string();
        let user = repo.create(&new_user).unwrap();

        assert!(repo.email_in_use("maria@example.com", None).unwrap());
        assert!(!repo.email_in_use("maria@example.com", Some(user.id)).unwrap());
        assert!(!repo.email_in_use("other@example.com", None).unwrap());
    }

    #[test]
    fn test_active_vets_are_filtered_by_branch() {
        let (repo, branch_id) = setup();
        let mut vet = NewUser::basic("vet1", "hash", Role::Vet);
        vet.branch_id = Some(branch_id);
        repo.create(&vet).unwrap();
        repo.create(&NewUser::basic("vet2", "hash", Role::Vet)).unwrap();

        let in_branch = repo.list_vets(BranchScope::Branch(branch_id), true).unwrap();
        assert_eq!(in_branch.len(), 1);
        assert_eq!(in_branch[0].username, "vet1");
        assert_eq!(repo.list_vets(BranchScope::All, true).unwrap().len(), 2);
        assert!(repo.list_vets(BranchScope::Nothing, true).unwrap().is_empty());
    }

    #[test]
    fn test_unavailable_or_disabled_vets_are_not_active() {
        let (repo, branch_id) = setup();
        let mut resting = NewUser::basic("resting", "hash", Role::Vet);
        resting.branch_id = Some(branch_id);
        resting.available = false;
        repo.create(&resting).unwrap();
        let mut gone = NewUser::basic("gone", "hash", Role::Vet);
        gone.branch_id = Some(branch_id);
        gone.is_active = false;
        repo.create(&gone).unwrap();
        let mut working = NewUser::basic("working", "hash", Role::Vet);
        working.branch_id = Some(branch_id);
        repo.create(&working).unwrap();

        let active = repo.list_vets(BranchScope::Branch(branch_id), true).unwrap();
        let names: Vec<_> = active.iter().map(|u| u.username.as_str()).collect();
        assert_eq!(names, vec!["working"]);
        assert_eq!(repo.list_vets(BranchScope::Branch(branch_id), false).unwrap().len(), 3);
    }

    #[test]
    fn test_update_account_changes_role_branch_and_flags() {
        let (repo, branch_id) = setup();
        let user = repo.create(&NewUser::basic("staff", "hash", Role::AdminOp)).unwrap();
        assert!(user.available && user.is_active);

        let updated = repo
            .update_account(
                user.id,
                &AccountUpdate {
                    email: "staff@example.com".to_string(),
                    first_name: "Sara".to_string(),
                    last_name: "Gómez".to_string(),
                    phone: "351 222".to_string(),
                    address: "Calle 3".to_string(),
                    role: Role::Vet,
                    specialty: "Cirugía".to_string(),
                    branch_id: Some(branch_id),
                    available: false,
                    is_active: false,
                    is_superuser: false,
                    password_hash: None,
                },
            )
            .unwrap();

        assert_eq!(updated.role, Role::Vet);
        assert_eq!(updated.branch_name.as_deref(), Some("Centro"));
        assert_eq!(updated.specialty, "Cirugía");
        assert!(!updated.available);
        assert!(!updated.is_active);
        assert_eq!(updated.password_hash, "hash");
    }

    #[test]
    fn test_update_account_to_owner_drops_branch_and_adds_profile() {
        let (repo, branch_id) = setup();
        let mut vet = NewUser::basic("vet1", "hash", Role::Vet);
        vet.branch_id = Some(branch_id);
        let vet = repo.create(&vet).unwrap();

        let updated = repo
            .update_account(
                vet.id,
                &AccountUpdate {
                    email: String::new(),
                    first_name: String::new(),
                    last_name: String::new(),
                    phone: "351 333".to_string(),
                    address: String::new(),
                    role: Role::Owner,
                    specialty: String::new(),
                    branch_id: Some(branch_id),
                    available: true,
                    is_active: true,
                    is_superuser: false,
                    password_hash: Some("other".to_string()),
                },
            )
            .unwrap();

        assert_eq!(updated.branch_id, None);
        assert_eq!(updated.password_hash, "other");
        let conn = repo.pool.get().unwrap();
        let phone: String = conn
            .query_row("SELECT phone FROM owners WHERE user_id = ?1", [vet.id], |row| row.get(0))
            .unwrap();
        assert_eq!(phone, "351 333");
    }

    #[test]
    fn test_update_unknown_account_is_not_found() {
        let (repo, _) = setup();
        let result = repo.update_account(
            999,
            &AccountUpdate {
                email: String::new(),
                first_name: String::new(),
                last_name: String::new(),
                phone: String::new(),
                address: String::new(),
                role: Role::AdminOp,
                specialty: String::new(),
                branch_id: None,
                available: true,
                is_active: true,
                is_superuser: false,
                password_hash: None,
            },
        );
        assert!(matches!(result, Err(RepositoryError::NotFound(_))));
    }

    #[test]
    fn test_promote_to_vet_sets_branch() {
        let (repo, branch_id) = setup();
        let user = repo.create(&NewUser::basic("staff", "hash", Role::AdminOp)).unwrap();

        let candidates = repo.vet_candidates(BranchScope::Branch(branch_id)).unwrap();
        assert!(candidates.iter().any(|u| u.id == user.id));

        let promoted = repo.promote_to_vet(user.id, branch_id).unwrap();
        assert_eq!(promoted.role, Role::Vet);
        assert_eq!(promoted.branch_id, Some(branch_id));
        assert_eq!(promoted.branch_name.as_deref(), Some("Centro"));
    }

    #[test]
    fn test_profile_update_syncs_owner_profile() {
        let (repo, _) = setup();
        let user = repo.create(&NewUser::basic("maria", "hash", Role::Owner)).unwrap();
        repo.update_profile(
            user.id,
            &ProfileUpdate {
                email: "m@example.com".to_string(),
                first_name: "María".to_string(),
                last_name: "Pérez".to_string(),
                phone: "351 111".to_string(),
                address: "Calle 2".to_string(),
                password_hash: Some("new-hash".to_string()),
            },
        )
        .unwrap();

        let updated = repo.get(user.id).unwrap().unwrap();
        assert_eq!(updated.password_hash, "new-hash");
        let phones = repo.contact_phones().unwrap();
        assert_eq!(phones.iter().filter(|(id, p)| *id == user.id && p == "351 111").count(), 2);
    }
}
