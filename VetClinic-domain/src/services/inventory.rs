//! Per-branch pharmacy stock

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use validator::Validate;

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{Branch, Medication, MedicationCategory, MedicationInput, Role};
use vet_clinic_data::repository::{BranchRepository, MedicationRepository};

use crate::access::{manageable_branches, Actor};
use crate::error::{validate_payload, ServiceError};

/// Items at or below this stock are flagged as critical
pub const CRITICAL_STOCK: i64 = 5;

#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct MedicationRequest {
    pub branch_id: i64,
    #[validate(length(min = 1, max = 150, message = "Name is required"))]
    pub name: String,
    pub category: MedicationCategory,
    #[serde(default)]
    pub description: String,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    pub stock: i64,
}

impl MedicationRequest {
    fn input(&self) -> MedicationInput {
        MedicationInput {
            branch_id: self.branch_id,
            name: self.name.trim().to_string(),
            category: self.category,
            description: self.description.trim().to_string(),
            stock: self.stock,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::IntoParams), into_params(parameter_in = Query))]
pub struct InventoryQuery {
    /// Branch to show; defaults to the caller's branch
    pub branch_id: Option<i64>,
    /// Name or description
    pub q: Option<String>,
    /// Category code
    pub category: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct CategoryGroup {
    pub category: MedicationCategory,
    pub label: String,
    pub total_items: usize,
    pub total_stock: i64,
    pub items: Vec<Medication>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct InventorySummary {
    pub total_items: usize,
    pub total_stock: i64,
    pub last_update: Option<DateTime<Utc>>,
    pub categories: Vec<CategoryGroup>,
    pub critical: Vec<Medication>,
}

impl InventorySummary {
    /// Totals, non-empty category groups in category order and critical items
    pub fn from_medications(medications: &[Medication]) -> Self {
        let categories = MedicationCategory::ALL
            .iter()
            .filter_map(|category| {
                let items: Vec<Medication> = medications
                    .iter()
                    .filter(|m| m.category == *category)
                    .cloned()
                    .collect();
                if items.is_empty() {
                    return None;
                }
                Some(CategoryGroup {
                    category: *category,
                    label: category.label().to_string(),
                    total_items: items.len(),
                    total_stock: items.iter().map(|m| m.stock).sum(),
                    items,
                })
            })
            .collect();

        InventorySummary {
            total_items: medications.len(),
            total_stock: medications.iter().map(|m| m.stock).sum(),
            last_update: medications.iter().map(|m| m.updated_at).max(),
            categories,
            critical: medications
                .iter()
                .filter(|m| m.stock <= CRITICAL_STOCK)
                .cloned()
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct InventoryView {
    /// Branches the caller may pick from
    pub branches: Vec<Branch>,
    pub branch: Option<Branch>,
    pub medications: Vec<Medication>,
    pub summary: InventorySummary,
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait InventoryServiceTrait: Send + Sync {
    async fn admin_view(&self, actor: &Actor, query: InventoryQuery) -> Result<InventoryView, ServiceError>;

    async fn vet_view(&self, actor: &Actor, query: InventoryQuery) -> Result<InventoryView, ServiceError>;

    async fn create(&self, actor: &Actor, request: MedicationRequest) -> Result<Medication, ServiceError>;

    async fn update(&self, actor: &Actor, id: i64, request: MedicationRequest) -> Result<Medication, ServiceError>;

    async fn delete(&self, actor: &Actor, id: i64) -> Result<(), ServiceError>;

    /// Summary of one branch, empty when there is none
    async fn branch_summary(&self, branch_id: Option<i64>) -> Result<InventorySummary, ServiceError>;
}

pub struct InventoryService {
    branches: BranchRepository,
    medications: MedicationRepository,
}

fn matches_query(medication: &Medication, term: Option<&str>, category: Option<MedicationCategory>) -> bool {
    let term_ok = term.map_or(true, |term| {
        let term = term.to_lowercase();
        medication.name.to_lowercase().contains(&term) || medication.description.to_lowercase().contains(&term)
    });
    term_ok && category.map_or(true, |c| medication.category == c)
}

impl InventoryService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            branches: BranchRepository::new(pool.clone()),
            medications: MedicationRepository::new(pool),
        }
    }

    fn managed_medication(&self, actor: &Actor, id: i64) -> Result<Medication, ServiceError> {
        let medication = self
            .medications
            .get(id)?
            .ok_or_else(|| ServiceError::not_found(format!("Medication {} not found", id)))?;
        actor.require_branch(medication.branch_id)?;
        Ok(medication)
    }

    fn check_target_branch(&self, actor: &Actor, branch_id: i64) -> Result<(), ServiceError> {
        if self.branches.get(branch_id)?.is_none() {
            return Err(ServiceError::validation("Choose a valid branch"));
        }
        actor.require_branch(branch_id)
    }
}

#[async_trait]
impl InventoryServiceTrait for InventoryService {
    async fn admin_view(&self, actor: &Actor, query: InventoryQuery) -> Result<InventoryView, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        let branches = manageable_branches(actor, &self.branches)?;
        let mut warnings = Vec::new();

        let branch = match query.branch_id {
            Some(id) => {
                let branch = self
                    .branches
                    .get(id)?
                    .ok_or_else(|| ServiceError::not_found(format!("Branch {} not found", id)))?;
                if !actor.can_manage_branch(branch.id) {
                    warn!("Admin {} tried to open the inventory of branch {}", actor.username, id);
                    return Err(ServiceError::forbidden(
                        "You don't have permission to manage the inventory of that branch",
                    ));
                }
                Some(branch)
            }
            None => match actor.branch_id {
                Some(own) => self.branches.get(own)?,
                None => branches.first().cloned(),
            },
        };
        if branch.is_none() {
            warnings.push("There is no branch whose inventory you can manage".to_string());
        }

        let medications = match &branch {
            Some(branch) => self.medications.list_by_branch(branch.id)?,
            None => Vec::new(),
        };
        debug!("Inventory view with {} medications", medications.len());
        Ok(InventoryView {
            summary: InventorySummary::from_medications(&medications),
            branches,
            branch,
            medications,
            warnings,
        })
    }

    async fn vet_view(&self, actor: &Actor, query: InventoryQuery) -> Result<InventoryView, ServiceError> {
        actor.require_any(&[Role::Vet])?;
        let mut warnings = Vec::new();
        let branch = match actor.branch_id {
            Some(id) => self.branches.get(id)?,
            None => None,
        };
        let Some(branch) = branch else {
            warnings.push(
                "Your profile has no branch. Ask the front desk to update it to see the pharmacy inventory"
                    .to_string(),
            );
            return Ok(InventoryView {
                branches: Vec::new(),
                branch: None,
                medications: Vec::new(),
                summary: InventorySummary::default(),
                warnings,
            });
        };

        let term = query.q.as_deref().map(str::trim).filter(|q| !q.is_empty());
        let category = crate::services::appointment::parse_filter(query.category.as_deref(), "category", &mut warnings);
        let all = self.medications.list_by_branch(branch.id)?;
        let last_update = all.iter().map(|m| m.updated_at).max();
        let medications: Vec<Medication> = all
            .into_iter()
            .filter(|m| matches_query(m, term, category))
            .collect();

        let mut summary = InventorySummary::from_medications(&medications);
        summary.last_update = last_update;
        Ok(InventoryView {
            branches: vec![branch.clone()],
            branch: Some(branch),
            medications,
            summary,
            warnings,
        })
    }

    async fn create(&self, actor: &Actor, request: MedicationRequest) -> Result<Medication, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        validate_payload(&request)?;
        self.check_target_branch(actor, request.branch_id)?;

        let medication = self.medications.create(&request.input())?;
        info!(
            "{} added '{}' to the inventory of {}",
            actor.username, medication.name, medication.branch_name
        );
        Ok(medication)
    }

    async fn update(&self, actor: &Actor, id: i64, request: MedicationRequest) -> Result<Medication, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        validate_payload(&request)?;
        self.managed_medication(actor, id)?;
        self.check_target_branch(actor, request.branch_id)?;

        let medication = self.medications.update(id, &request.input())?;
        info!("{} updated the stock of '{}'", actor.username, medication.name);
        Ok(medication)
    }

    async fn delete(&self, actor: &Actor, id: i64) -> Result<(), ServiceError> {
        actor.require_any(&[Role::Admin])?;
        let medication = self.managed_medication(actor, id)?;
        self.medications.delete(medication.id)?;
        info!("{} removed '{}' from {}", actor.username, medication.name, medication.branch_name);
        Ok(())
    }

    async fn branch_summary(&self, branch_id: Option<i64>) -> Result<InventorySummary, ServiceError> {
        match branch_id {
            Some(id) => Ok(InventorySummary::from_medications(&self.medications.list_by_branch(id)?)),
            None => Ok(InventorySummary::default()),
        }
    }
}

pub fn create_default_inventory_service(pool: DatabasePool) -> Arc<dyn InventoryServiceTrait> {
    Arc::new(InventoryService::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor_for, add_user, superuser, Fixture};

    fn request(branch_id: i64, name: &str, category: MedicationCategory, stock: i64) -> MedicationRequest {
        MedicationRequest {
            branch_id,
            name: name.to_string(),
            category,
            description: String::new(),
            stock,
        }
    }

    #[tokio::test]
    async fn test_summary_groups_in_category_order() {
        let fixture = Fixture::new();
        let service = InventoryService::new(fixture.pool.clone());
        let root = superuser();
        service
            .create(&root, request(fixture.branch_id, "Vitamin B", MedicationCategory::VitaminsSupplements, 30))
            .await
            .unwrap();
        service
            .create(&root, request(fixture.branch_id, "Amoxicillin", MedicationCategory::Antibiotics, 5))
            .await
            .unwrap();
        service
            .create(&root, request(fixture.branch_id, "Cefalexin", MedicationCategory::Antibiotics, 12))
            .await
            .unwrap();

        let summary = service.branch_summary(Some(fixture.branch_id)).await.unwrap();
        assert_eq!(summary.total_items, 3);
        assert_eq!(summary.total_stock, 47);
        assert_eq!(
            summary.categories.iter().map(|g| g.category).collect::<Vec<_>>(),
            vec![MedicationCategory::Antibiotics, MedicationCategory::VitaminsSupplements]
        );
        assert_eq!(summary.categories[0].total_stock, 17);
        assert_eq!(summary.critical.len(), 1);
        assert_eq!(summary.critical[0].name, "Amoxicillin");

        assert_eq!(service.branch_summary(None).await.unwrap(), InventorySummary::default());
    }

    #[tokio::test]
    async fn test_admin_limited_to_own_branch() {
        let fixture = Fixture::new();
        let service = InventoryService::new(fixture.pool.clone());
        let admin = add_user(&fixture.pool, "boss", Role::Admin, Some(fixture.branch_id));
        let admin = actor_for(&fixture.pool, admin.id);

        let own = service
            .create(&admin, request(fixture.branch_id, "Tramadol", MedicationCategory::AnalgesicsAntiInflammatories, 3))
            .await
            .unwrap();
        let foreign = service
            .create(&admin, request(fixture.other_branch_id, "Tramadol", MedicationCategory::AnalgesicsAntiInflammatories, 3))
            .await;
        assert!(matches!(foreign, Err(ServiceError::Forbidden(_))));

        let duplicate = service
            .create(&admin, request(fixture.branch_id, "Tramadol", MedicationCategory::AnalgesicsAntiInflammatories, 1))
            .await;
        assert!(matches!(duplicate, Err(ServiceError::Conflict(_))));

        let negative = service
            .update(&admin, own.id, request(fixture.branch_id, "Tramadol", MedicationCategory::AnalgesicsAntiInflammatories, -2))
            .await;
        assert!(matches!(negative, Err(ServiceError::Validation(_))));

        let view = service.admin_view(&admin, InventoryQuery::default()).await.unwrap();
        assert_eq!(view.branch.map(|b| b.id), Some(fixture.branch_id));
        assert_eq!(view.branches.len(), 1);
        assert_eq!(view.medications.len(), 1);

        let other = service
            .admin_view(&admin, InventoryQuery { branch_id: Some(fixture.other_branch_id), ..InventoryQuery::default() })
            .await;
        assert!(matches!(other, Err(ServiceError::Forbidden(_))));

        service.delete(&admin, own.id).await.unwrap();
        assert!(matches!(service.delete(&admin, own.id).await, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_vet_view_filters_own_branch() {
        let fixture = Fixture::new();
        let service = InventoryService::new(fixture.pool.clone());
        let root = superuser();
        service
            .create(&root, request(fixture.branch_id, "Meloxicam", MedicationCategory::AnalgesicsAntiInflammatories, 8))
            .await
            .unwrap();
        service
            .create(&root, request(fixture.branch_id, "Ivermectin", MedicationCategory::InternalAntiparasitics, 2))
            .await
            .unwrap();

        let vet = actor_for(&fixture.pool, fixture.vet_id);
        let view = service
            .vet_view(&vet, InventoryQuery { q: Some("melox".to_string()), ..InventoryQuery::default() })
            .await
            .unwrap();
        assert_eq!(view.medications.len(), 1);
        assert!(view.summary.critical.is_empty());

        let homeless = add_user(&fixture.pool, "homeless", Role::Vet, None);
        let empty = service
            .vet_view(&actor_for(&fixture.pool, homeless.id), InventoryQuery::default())
            .await
            .unwrap();
        assert!(empty.branch.is_none());
        assert_eq!(empty.warnings.len(), 1);
    }
}
