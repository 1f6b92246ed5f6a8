//! Accounts as seen by administrators: listing, creation, edits and vet promotion

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{AccountUpdate, BranchScope, NewUser, Role, User};
use vet_clinic_data::repository::{BranchRepository, UserRepository};

use crate::access::Actor;
use crate::auth::password::hash_password;
use crate::error::{validate_payload, ServiceError};

fn default_true() -> bool {
    true
}

/// Account created by an administrator
#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 150, message = "Username must have between 3 and 150 characters"))]
    pub username: String,
    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub password: String,
    pub role: Role,
    /// Ignored for OWNER accounts; only a superuser may pick a branch other than its own
    pub branch_id: Option<i64>,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub specialty: String,
    #[serde(default = "default_true")]
    pub available: bool,
    #[serde(default = "default_true")]
    pub is_active: bool,
    /// Only a superuser may grant it
    #[serde(default)]
    pub is_superuser: bool,
}

/// Partial edit of an account; absent fields keep their value
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct UpdateUserRequest {
    pub role: Option<Role>,
    pub branch_id: Option<i64>,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub phone: Option<String>,
    pub address: Option<String>,
    pub specialty: Option<String>,
    pub available: Option<bool>,
    pub is_active: Option<bool>,
    pub is_superuser: Option<bool>,
    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub new_password: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct PromoteVetRequest {
    /// Only a superuser may choose the branch
    pub branch_id: Option<i64>,
}

#[async_trait]
pub trait StaffServiceTrait: Send + Sync {
    async fn list_users(&self, actor: &Actor) -> Result<Vec<User>, ServiceError>;

    async fn create_user(&self, actor: &Actor, request: CreateUserRequest) -> Result<User, ServiceError>;

    async fn update_user(
        &self,
        actor: &Actor,
        user_id: i64,
        request: UpdateUserRequest,
    ) -> Result<User, ServiceError>;

    async fn vet_candidates(&self, actor: &Actor) -> Result<Vec<User>, ServiceError>;

    async fn promote_to_vet(
        &self,
        actor: &Actor,
        user_id: i64,
        request: PromoteVetRequest,
    ) -> Result<User, ServiceError>;
}

pub struct StaffService {
    users: UserRepository,
    branches: BranchRepository,
}

impl StaffService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            branches: BranchRepository::new(pool),
        }
    }

    /// Branch an account of `role` ends up in. Branch roles need a branch the
    /// caller manages; a non-superuser always assigns its own.
    fn resolve_branch(&self, actor: &Actor, role: Role, requested: Option<i64>) -> Result<Option<i64>, ServiceError> {
        if !role.is_branch_role() {
            return Ok(None);
        }
        if actor.is_superuser {
            return match requested {
                Some(branch_id) => Ok(Some(
                    self.branches
                        .get(branch_id)?
                        .ok_or_else(|| ServiceError::validation("The selected branch does not exist"))?
                        .id,
                )),
                None => Ok(None),
            };
        }

        let own = actor
            .branch_id
            .ok_or_else(|| ServiceError::forbidden("You have no branch assigned"))?;
        if requested.map_or(false, |branch| branch != own) {
            warn!("Admin {} tried to place an account in branch {:?}", actor.username, requested);
            return Err(ServiceError::forbidden("You cannot manage this branch"));
        }
        Ok(Some(own))
    }

    fn check_email(&self, email: &str, exclude_user: Option<i64>) -> Result<(), ServiceError> {
        if email.is_empty() {
            return Ok(());
        }
        if !validator::validate_email(email) {
            return Err(ServiceError::validation("Enter a valid email address"));
        }
        if self.users.email_in_use(email, exclude_user)? {
            return Err(ServiceError::conflict("That email is already registered"));
        }
        Ok(())
    }
}

#[async_trait]
impl StaffServiceTrait for StaffService {
    async fn list_users(&self, actor: &Actor) -> Result<Vec<User>, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        Ok(self.users.list()?)
    }

    async fn create_user(&self, actor: &Actor, request: CreateUserRequest) -> Result<User, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        validate_payload(&request)?;
        if request.is_superuser && !actor.is_superuser {
            warn!("Admin {} tried to create a superuser", actor.username);
            return Err(ServiceError::forbidden("Only a superuser can grant superuser access"));
        }
        let email = request.email.trim();
        self.check_email(email, None)?;
        let branch_id = self.resolve_branch(actor, request.role, request.branch_id)?;

        let mut new_user = NewUser::basic(request.username.trim(), &hash_password(&request.password), request.role);
        new_user.email = email.to_string();
        new_user.first_name = request.first_name.trim().to_string();
        new_user.last_name = request.last_name.trim().to_string();
        new_user.phone = request.phone.trim().to_string();
        new_user.address = request.address.trim().to_string();
        new_user.specialty = request.specialty.trim().to_string();
        new_user.available = request.available;
        new_user.is_active = request.is_active;
        new_user.is_superuser = request.is_superuser;
        new_user.branch_id = branch_id;

        let user = self.users.create(&new_user)?;
        info!("User {} created account {} ({})", actor.username, user.username, user.role);
        Ok(user)
    }

    async fn update_user(
        &self,
        actor: &Actor,
        user_id: i64,
        request: UpdateUserRequest,
    ) -> Result<User, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        validate_payload(&request)?;
        let user = self
            .users
            .get(user_id)?
            .ok_or_else(|| ServiceError::not_found(format!("User {} not found", user_id)))?;

        if !actor.is_superuser {
            if user.is_superuser {
                return Err(ServiceError::forbidden("Only a superuser can edit a superuser account"));
            }
            if request.is_superuser == Some(true) {
                warn!("Admin {} tried to grant superuser access to {}", actor.username, user.username);
                return Err(ServiceError::forbidden("Only a superuser can grant superuser access"));
            }
            if user.branch_id.map_or(false, |branch| !actor.can_manage_branch(branch)) {
                return Err(ServiceError::forbidden("The user belongs to another branch"));
            }
        }
        if user.id == actor.user_id && request.is_active == Some(false) {
            return Err(ServiceError::validation("You cannot disable your own account"));
        }

        let email = request.email.as_deref().map(str::trim).unwrap_or(&user.email).to_string();
        if request.email.is_some() {
            self.check_email(&email, Some(user.id))?;
        }
        let role = request.role.unwrap_or(user.role);
        let branch_id = self.resolve_branch(actor, role, request.branch_id.or(user.branch_id))?;
        let pick = |value: Option<String>, current: &str| value.map_or_else(|| current.to_string(), |v| v.trim().to_string());

        let updated = self.users.update_account(
            user.id,
            &AccountUpdate {
                email,
                first_name: pick(request.first_name, &user.first_name),
                last_name: pick(request.last_name, &user.last_name),
                phone: pick(request.phone, &user.phone),
                address: pick(request.address, &user.address),
                role,
                specialty: pick(request.specialty, &user.specialty),
                branch_id,
                available: request.available.unwrap_or(user.available),
                is_active: request.is_active.unwrap_or(user.is_active),
                is_superuser: request.is_superuser.unwrap_or(user.is_superuser),
                password_hash: request.new_password.as_deref().map(hash_password),
            },
        )?;
        info!("User {} updated account {}", actor.username, updated.username);
        Ok(updated)
    }

    async fn vet_candidates(&self, actor: &Actor) -> Result<Vec<User>, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        let scope = if actor.is_superuser {
            BranchScope::All
        } else {
            actor.branch_id.map(BranchScope::Branch).unwrap_or(BranchScope::Nothing)
        };
        Ok(self.users.vet_candidates(scope)?)
    }

    async fn promote_to_vet(
        &self,
        actor: &Actor,
        user_id: i64,
        request: PromoteVetRequest,
    ) -> Result<User, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        let user = self
            .users
            .get(user_id)?
            .ok_or_else(|| ServiceError::not_found(format!("User {} not found", user_id)))?;
        if user.role == Role::Vet {
            return Err(ServiceError::validation(format!("{} is already a vet", user.username)));
        }

        let branch_id = if actor.is_superuser {
            let branch_id = request
                .branch_id
                .ok_or_else(|| ServiceError::validation("Choose the branch of the new vet"))?;
            self.branches
                .get(branch_id)?
                .ok_or_else(|| ServiceError::validation("The selected branch does not exist"))?
                .id
        } else {
            let own = actor
                .branch_id
                .ok_or_else(|| ServiceError::forbidden("You have no branch assigned"))?;
            if request.branch_id.map_or(false, |requested| requested != own) {
                warn!("Admin {} tried to promote into branch {:?}", actor.username, request.branch_id);
                return Err(ServiceError::forbidden("You cannot manage this branch"));
            }
            if user.branch_id.map_or(false, |branch| branch != own) {
                return Err(ServiceError::forbidden("The user belongs to another branch"));
            }
            own
        };

        let promoted = self.users.promote_to_vet(user.id, branch_id)?;
        info!("User {} promoted {} to vet of branch {}", actor.username, promoted.username, branch_id);
        Ok(promoted)
    }
}

pub fn create_default_staff_service(pool: DatabasePool) -> Arc<dyn StaffServiceTrait> {
    Arc::new(StaffService::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor_for, add_user, superuser, Fixture};

    #[tokio::test]
    async fn test_vet_candidates_follow_admin_branch() {
        let fixture = Fixture::new();
        let service = StaffService::new(fixture.pool.clone());
        let admin = add_user(&fixture.pool, "admin_centro", Role::AdminOp, Some(fixture.branch_id));
        add_user(&fixture.pool, "desk_norte", Role::AdminOp, Some(fixture.other_branch_id));
        let boss = add_user(&fixture.pool, "boss", Role::Admin, Some(fixture.branch_id));
        let boss = actor_for(&fixture.pool, boss.id);

        let names: Vec<String> = service
            .vet_candidates(&boss)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.username)
            .collect();
        assert!(names.contains(&admin.username));
        assert!(names.contains(&"ana".to_string()));
        assert!(!names.contains(&"desk_norte".to_string()));
        assert!(!names.contains(&"lrivas".to_string()));

        let all = service.vet_candidates(&superuser()).await.unwrap();
        assert!(all.iter().any(|u| u.username == "desk_norte"));
    }

    #[tokio::test]
    async fn test_promote_rules() {
        let fixture = Fixture::new();
        let service = StaffService::new(fixture.pool.clone());
        let boss = add_user(&fixture.pool, "boss", Role::Admin, Some(fixture.branch_id));
        let boss = actor_for(&fixture.pool, boss.id);
        let candidate = add_user(&fixture.pool, "newvet", Role::AdminOp, None);

        let other_branch = service
            .promote_to_vet(
                &boss,
                candidate.id,
                PromoteVetRequest {
                    branch_id: Some(fixture.other_branch_id),
                },
            )
            .await;
        assert!(matches!(other_branch, Err(ServiceError::Forbidden(_))));

        let promoted = service
            .promote_to_vet(&boss, candidate.id, PromoteVetRequest::default())
            .await
            .unwrap();
        assert_eq!(promoted.role, Role::Vet);
        assert_eq!(promoted.branch_id, Some(fixture.branch_id));

        let second = add_user(&fixture.pool, "second", Role::Owner, None);
        let by_root = service
            .promote_to_vet(
                &superuser(),
                second.id,
                PromoteVetRequest {
                    branch_id: Some(fixture.other_branch_id),
                },
            )
            .await
            .unwrap();
        assert_eq!(by_root.branch_id, Some(fixture.other_branch_id));
    }

    #[tokio::test]
    async fn test_only_admins_list_users() {
        let fixture = Fixture::new();
        let service = StaffService::new(fixture.pool.clone());
        let vet = actor_for(&fixture.pool, fixture.vet_id);
        assert!(matches!(service.list_users(&vet).await, Err(ServiceError::Forbidden(_))));
        assert_eq!(service.list_users(&superuser()).await.unwrap().len(), 2);
    }

    fn new_account(username: &str, role: Role) -> CreateUserRequest {
        CreateUserRequest {
            username: username.to_string(),
            password: "long-enough-pass".to_string(),
            role,
            branch_id: None,
            email: String::new(),
            first_name: "Sara".to_string(),
            last_name: "Paz".to_string(),
            phone: String::new(),
            address: String::new(),
            specialty: String::new(),
            available: true,
            is_active: true,
            is_superuser: false,
        }
    }

    #[tokio::test]
    async fn test_branch_admin_creates_staff_in_own_branch() {
        let fixture = Fixture::new();
        let service = StaffService::new(fixture.pool.clone());
        let boss = add_user(&fixture.pool, "boss", Role::Admin, Some(fixture.branch_id));
        let boss = actor_for(&fixture.pool, boss.id);

        let mut vet = new_account("nuevo", Role::Vet);
        vet.specialty = "Dermatología".to_string();
        vet.available = false;
        let created = service.create_user(&boss, vet).await.unwrap();
        assert_eq!(created.branch_id, Some(fixture.branch_id));
        assert_eq!(created.specialty, "Dermatología");
        assert!(!created.available);
        assert!(created.is_active);

        let mut elsewhere = new_account("norte", Role::AdminOp);
        elsewhere.branch_id = Some(fixture.other_branch_id);
        assert!(matches!(service.create_user(&boss, elsewhere).await, Err(ServiceError::Forbidden(_))));

        let mut root = new_account("root2", Role::Admin);
        root.is_superuser = true;
        assert!(matches!(service.create_user(&boss, root).await, Err(ServiceError::Forbidden(_))));

        let duplicate = service.create_user(&boss, new_account("lrivas", Role::AdminOp)).await;
        assert!(matches!(duplicate, Err(ServiceError::Conflict(_))));

        let mut short = new_account("short", Role::AdminOp);
        short.password = "short".to_string();
        assert!(matches!(service.create_user(&boss, short).await, Err(ServiceError::Validation(_))));

        let vet = actor_for(&fixture.pool, fixture.vet_id);
        let by_vet = service.create_user(&vet, new_account("x-user", Role::AdminOp)).await;
        assert!(matches!(by_vet, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_superuser_creates_in_any_branch() {
        let fixture = Fixture::new();
        let service = StaffService::new(fixture.pool.clone());

        let mut admin = new_account("norte_admin", Role::Admin);
        admin.branch_id = Some(fixture.other_branch_id);
        admin.is_superuser = true;
        let created = service.create_user(&superuser(), admin).await.unwrap();
        assert_eq!(created.branch_id, Some(fixture.other_branch_id));
        assert!(created.is_superuser);

        let mut owner = new_account("cliente", Role::Owner);
        owner.branch_id = Some(fixture.branch_id);
        let owner = service.create_user(&superuser(), owner).await.unwrap();
        assert_eq!(owner.branch_id, None);

        let mut missing = new_account("lost", Role::Vet);
        missing.branch_id = Some(9_999);
        assert!(matches!(
            service.create_user(&superuser(), missing).await,
            Err(ServiceError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_update_user_flags_and_role() {
        let fixture = Fixture::new();
        let service = StaffService::new(fixture.pool.clone());
        let boss = add_user(&fixture.pool, "boss", Role::Admin, Some(fixture.branch_id));
        let boss = actor_for(&fixture.pool, boss.id);

        let updated = service
            .update_user(
                &boss,
                fixture.vet_id,
                UpdateUserRequest {
                    available: Some(false),
                    specialty: Some(" Cardiología ".to_string()),
                    phone: Some("351-777".to_string()),
                    ..UpdateUserRequest::default()
                },
            )
            .await
            .unwrap();
        assert!(!updated.available);
        assert!(updated.is_active);
        assert_eq!(updated.specialty, "Cardiología");
        assert_eq!(updated.first_name, "Laura");
        assert_eq!(updated.branch_id, Some(fixture.branch_id));

        let desk = service
            .update_user(
                &boss,
                fixture.vet_id,
                UpdateUserRequest {
                    role: Some(Role::AdminOp),
                    is_active: Some(false),
                    ..UpdateUserRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(desk.role, Role::AdminOp);
        assert!(!desk.is_active);
    }

    #[tokio::test]
    async fn test_update_user_respects_branch_and_superuser_rules() {
        let fixture = Fixture::new();
        let service = StaffService::new(fixture.pool.clone());
        let boss = add_user(&fixture.pool, "boss", Role::Admin, Some(fixture.branch_id));
        let boss = actor_for(&fixture.pool, boss.id);
        let norte = add_user(&fixture.pool, "norte", Role::AdminOp, Some(fixture.other_branch_id));

        let foreign = service
            .update_user(&boss, norte.id, UpdateUserRequest { available: Some(false), ..Default::default() })
            .await;
        assert!(matches!(foreign, Err(ServiceError::Forbidden(_))));

        let moved = service
            .update_user(
                &boss,
                fixture.vet_id,
                UpdateUserRequest { branch_id: Some(fixture.other_branch_id), ..Default::default() },
            )
            .await;
        assert!(matches!(moved, Err(ServiceError::Forbidden(_))));

        let grant = service
            .update_user(&boss, fixture.vet_id, UpdateUserRequest { is_superuser: Some(true), ..Default::default() })
            .await;
        assert!(matches!(grant, Err(ServiceError::Forbidden(_))));

        let self_disable = service
            .update_user(&boss, boss.user_id, UpdateUserRequest { is_active: Some(false), ..Default::default() })
            .await;
        assert!(matches!(self_disable, Err(ServiceError::Validation(_))));

        let by_root = service
            .update_user(
                &superuser(),
                norte.id,
                UpdateUserRequest {
                    branch_id: Some(fixture.branch_id),
                    is_superuser: Some(true),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(by_root.branch_id, Some(fixture.branch_id));
        assert!(by_root.is_superuser);

        let now_super = service
            .update_user(&boss, norte.id, UpdateUserRequest { phone: Some("1".to_string()), ..Default::default() })
            .await;
        assert!(matches!(now_super, Err(ServiceError::Forbidden(_))));

        let missing = service.update_user(&superuser(), 9_999, UpdateUserRequest::default()).await;
        assert!(matches!(missing, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_update_user_to_owner_leaves_branch() {
        let fixture = Fixture::new();
        let service = StaffService::new(fixture.pool.clone());
        let desk = add_user(&fixture.pool, "desk", Role::AdminOp, Some(fixture.branch_id));

        let owner = service
            .update_user(&superuser(), desk.id, UpdateUserRequest { role: Some(Role::Owner), ..Default::default() })
            .await
            .unwrap();
        assert_eq!(owner.role, Role::Owner);
        assert_eq!(owner.branch_id, None);
    }
}
