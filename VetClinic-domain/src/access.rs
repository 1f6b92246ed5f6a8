//! The authenticated caller and the branches they may act on

use serde::Serialize;
use tracing::warn;

use vet_clinic_data::models::{Branch, BranchScope, Role, User};
use vet_clinic_data::repository::{BranchRepository, RepositoryError};

use crate::error::ServiceError;

/// Caller resolved from the current user row on every request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Actor {
    pub user_id: i64,
    pub username: String,
    pub role: Role,
    pub branch_id: Option<i64>,
    pub is_superuser: bool,
}

impl Actor {
    pub fn from_user(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            role: user.role,
            branch_id: user.branch_id,
            is_superuser: user.is_superuser,
        }
    }

    /// A superuser counts as ADMIN whatever its stored role
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role || (role == Role::Admin && self.is_superuser)
    }

    pub fn has_any_role(&self, roles: &[Role]) -> bool {
        roles.iter().any(|role| self.has_role(*role))
    }

    /// Refuse the operation unless the caller holds one of `roles`
    pub fn require_any(&self, roles: &[Role]) -> Result<(), ServiceError> {
        if self.has_any_role(roles) {
            Ok(())
        } else {
            warn!(
                "User {} ({}) refused: needs one of {:?}",
                self.username, self.role, roles
            );
            Err(ServiceError::forbidden("You don't have permission to perform this action"))
        }
    }

    /// Branch-scoped roles see only their branch; the others are restricted
    /// by ownership instead
    pub fn scope(&self) -> BranchScope {
        if self.is_superuser || !self.role.is_branch_role() {
            return BranchScope::All;
        }
        match self.branch_id {
            Some(id) => BranchScope::Branch(id),
            None => BranchScope::Nothing,
        }
    }

    pub fn can_manage_branch(&self, branch_id: i64) -> bool {
        if self.is_superuser {
            return true;
        }
        if !self.role.is_branch_role() {
            return false;
        }
        self.branch_id == Some(branch_id)
    }

    /// Refuse unless the caller manages `branch_id`
    pub fn require_branch(&self, branch_id: i64) -> Result<(), ServiceError> {
        if self.can_manage_branch(branch_id) {
            Ok(())
        } else {
            warn!("User {} refused access to branch {}", self.username, branch_id);
            Err(ServiceError::forbidden("You cannot manage this branch"))
        }
    }
}

/// Branches the caller may administer
pub fn manageable_branches(
    actor: &Actor,
    branches: &BranchRepository,
) -> Result<Vec<Branch>, RepositoryError> {
    if actor.is_superuser {
        return branches.list();
    }
    match actor.branch_id {
        Some(id) => Ok(branches.get(id)?.into_iter().collect()),
        None => Ok(Vec::new()),
    }
}
