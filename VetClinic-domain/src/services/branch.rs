//! Branch locations and the public contact directory

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{Branch, BranchInput};
use vet_clinic_data::repository::BranchRepository;

use crate::access::Actor;
use crate::error::ServiceError;
use crate::services::contact::{
    phone_digits, tel_link, whatsapp_url, DEFAULT_ADDRESS, DEFAULT_EMAIL, DEFAULT_PHONE,
};

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct BranchContact {
    pub branch: Branch,
    pub phone_digits: String,
    pub tel_link: String,
    pub whatsapp_url: String,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct OpeningHours {
    pub days: String,
    pub hours: String,
}

/// Main contact of the clinic plus one entry per branch
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct ContactDirectory {
    pub address: String,
    pub phone: String,
    pub tel_link: String,
    pub whatsapp_url: String,
    pub email: String,
    pub opening_hours: Vec<OpeningHours>,
    pub branches: Vec<BranchContact>,
}

#[async_trait]
pub trait BranchServiceTrait: Send + Sync {
    async fn list(&self) -> Result<Vec<Branch>, ServiceError>;

    async fn get(&self, id: i64) -> Result<Branch, ServiceError>;

    /// Superuser only
    async fn create(&self, actor: &Actor, input: BranchInput) -> Result<Branch, ServiceError>;

    /// Superuser only
    async fn update(&self, actor: &Actor, id: i64, input: BranchInput) -> Result<Branch, ServiceError>;

    async fn contact_directory(&self) -> Result<ContactDirectory, ServiceError>;
}

pub struct BranchService {
    branches: BranchRepository,
}

impl BranchService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            branches: BranchRepository::new(pool),
        }
    }
}

fn require_superuser(actor: &Actor) -> Result<(), ServiceError> {
    if actor.is_superuser {
        Ok(())
    } else {
        warn!("User {} tried to manage branches without being superuser", actor.username);
        Err(ServiceError::forbidden("Only a superuser can manage branches"))
    }
}

fn validate_input(input: &BranchInput) -> Result<(), ServiceError> {
    if input.name.trim().is_empty() {
        return Err(ServiceError::validation("Branch name is required"));
    }
    if input.address.trim().is_empty() {
        return Err(ServiceError::validation("Branch address is required"));
    }
    Ok(())
}

#[async_trait]
impl BranchServiceTrait for BranchService {
    async fn list(&self) -> Result<Vec<Branch>, ServiceError> {
        Ok(self.branches.list()?)
    }

    async fn get(&self, id: i64) -> Result<Branch, ServiceError> {
        self.branches
            .get(id)?
            .ok_or_else(|| ServiceError::not_found(format!("Branch {} not found", id)))
    }

    async fn create(&self, actor: &Actor, input: BranchInput) -> Result<Branch, ServiceError> {
        require_superuser(actor)?;
        validate_input(&input)?;
        let branch = self.branches.create(&input)?;
        info!("User {} created branch {}", actor.username, branch.name);
        Ok(branch)
    }

    async fn update(&self, actor: &Actor, id: i64, input: BranchInput) -> Result<Branch, ServiceError> {
        require_superuser(actor)?;
        validate_input(&input)?;
        Ok(self.branches.update(id, &input)?)
    }

    async fn contact_directory(&self) -> Result<ContactDirectory, ServiceError> {
        let branches = self.branches.list()?;

        let (address, phone) = match branches.first() {
            Some(main) => {
                let address = if main.city.trim().is_empty() {
                    main.address.clone()
                } else {
                    format!("{}, {}", main.address, main.city)
                };
                let phone = if main.phone.trim().is_empty() {
                    DEFAULT_PHONE.to_string()
                } else {
                    main.phone.clone()
                };
                (address, phone)
            }
            None => (DEFAULT_ADDRESS.to_string(), DEFAULT_PHONE.to_string()),
        };
        let main_phone = if phone_digits(&phone).is_empty() {
            DEFAULT_PHONE.to_string()
        } else {
            phone.clone()
        };

        Ok(ContactDirectory {
            address,
            tel_link: tel_link(&main_phone),
            whatsapp_url: whatsapp_url(&main_phone, None),
            phone,
            email: DEFAULT_EMAIL.to_string(),
            opening_hours: vec![
                OpeningHours {
                    days: "Monday to Friday".to_string(),
                    hours: "08:00 to 20:00".to_string(),
                },
                OpeningHours {
                    days: "Saturday".to_string(),
                    hours: "09:00 to 14:00".to_string(),
                },
            ],
            branches: branches
                .into_iter()
                .map(|branch| BranchContact {
                    phone_digits: phone_digits(&branch.phone),
                    tel_link: tel_link(&branch.phone),
                    whatsapp_url: whatsapp_url(&branch.phone, None),
                    branch,
                })
                .collect(),
        })
    }
}

pub fn create_default_branch_service(pool: DatabasePool) -> Arc<dyn BranchServiceTrait> {
    Arc::new(BranchService::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor_for, superuser};
    use vet_clinic_data::database::initialize_in_memory_pool;
    use vet_clinic_data::testing::Fixture;

    fn input(name: &str, phone: &str) -> BranchInput {
        BranchInput {
            name: name.to_string(),
            address: "Calle 1".to_string(),
            city: "Córdoba".to_string(),
            phone: phone.to_string(),
        }
    }

    #[tokio::test]
    async fn test_only_superuser_manages_branches() {
        let fixture = Fixture::new();
        let service = BranchService::new(fixture.pool.clone());

        let vet = actor_for(&fixture.pool, fixture.vet_id);
        let denied = service.create(&vet, input("Sur", "")).await;
        assert!(matches!(denied, Err(ServiceError::Forbidden(_))));

        let created = service.create(&superuser(), input("Sur", "")).await.unwrap();
        assert_eq!(created.name, "Sur");

        let duplicate = service.create(&superuser(), input("Sur", "")).await;
        assert!(matches!(duplicate, Err(ServiceError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_contact_directory_uses_first_branch() {
        let fixture = Fixture::new();
        let service = BranchService::new(fixture.pool.clone());

        let directory = service.contact_directory().await.unwrap();
        assert_eq!(directory.address, "Av. Colón 100, Córdoba");
        assert_eq!(directory.tel_link, "tel:+3514001000");
        assert_eq!(directory.branches.len(), 2);
        let centro = &directory.branches[0];
        assert_eq!(centro.phone_digits, "3514001000");
        assert_eq!(centro.whatsapp_url, "https://wa.me/3514001000");
    }

    #[tokio::test]
    async fn test_contact_directory_defaults_without_branches() {
        let service = BranchService::new(initialize_in_memory_pool().unwrap());
        let directory = service.contact_directory().await.unwrap();
        assert_eq!(directory.address, DEFAULT_ADDRESS);
        assert_eq!(directory.whatsapp_url, "https://wa.me/543515301903");
        assert!(directory.branches.is_empty());
    }
}
