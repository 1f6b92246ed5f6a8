//! Owner accounts managed by the front desk

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::info;
use validator::Validate;

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{
    Appointment, AppointmentFilter, AppointmentStatus, BranchScope, MedicalRecord, NewUser, Owner,
    OwnerWithPets, Patient, RecordFilter, Role,
};
use vet_clinic_data::repository::{
    AppointmentRepository, OwnerRepository, PatientRepository, RecordRepository, UserRepository,
};

use crate::access::Actor;
use crate::auth::password::hash_password;
use crate::error::{validate_payload, ServiceError};

#[derive(Debug, Clone, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct CreateOwnerRequest {
    #[validate(length(min = 3, max = 150, message = "Username must have between 3 and 150 characters"))]
    pub username: String,
    #[validate(length(min = 8, message = "Password must have at least 8 characters"))]
    pub password: String,
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
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct OwnerDetail {
    pub owner: Owner,
    pub pets: Vec<Patient>,
    /// Most recent first
    pub appointments: Vec<Appointment>,
    /// Oldest request first
    pub pending_appointments: Vec<Appointment>,
    pub records: Vec<MedicalRecord>,
}

#[async_trait]
pub trait OwnerServiceTrait: Send + Sync {
    async fn create(&self, actor: &Actor, request: CreateOwnerRequest) -> Result<Owner, ServiceError>;

    async fn search(&self, actor: &Actor, query: &str) -> Result<Vec<OwnerWithPets>, ServiceError>;

    async fn detail(&self, actor: &Actor, owner_id: i64) -> Result<OwnerDetail, ServiceError>;
}

pub struct OwnerService {
    users: UserRepository,
    owners: OwnerRepository,
    patients: PatientRepository,
    appointments: AppointmentRepository,
    records: RecordRepository,
}

impl OwnerService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            owners: OwnerRepository::new(pool.clone()),
            patients: PatientRepository::new(pool.clone()),
            appointments: AppointmentRepository::new(pool.clone()),
            records: RecordRepository::new(pool),
        }
    }
}

/// Keep the pets that have at least one visible appointment
pub(crate) fn pets_seen_in(pets: Vec<Patient>, appointments: &[Appointment], scope: BranchScope) -> Vec<Patient> {
    match scope {
        BranchScope::All => pets,
        BranchScope::Nothing => Vec::new(),
        BranchScope::Branch(_) => {
            let seen: HashSet<i64> = appointments.iter().map(|a| a.patient_id).collect();
            pets.into_iter().filter(|p| seen.contains(&p.id)).collect()
        }
    }
}

#[async_trait]
impl OwnerServiceTrait for OwnerService {
    async fn create(&self, actor: &Actor, request: CreateOwnerRequest) -> Result<Owner, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        validate_payload(&request)?;
        if self.users.username_exists(&request.username)? {
            return Err(ServiceError::conflict("That username is already taken"));
        }
        let email = request.email.trim();
        if !email.is_empty() && !validator::validate_email(email) {
            return Err(ServiceError::validation("Enter a valid email address"));
        }

        let mut user = NewUser::basic(&request.username, &hash_password(&request.password), Role::Owner);
        user.email = email.to_string();
        user.first_name = request.first_name;
        user.last_name = request.last_name;
        user.phone = request.phone;
        user.address = request.address;
        let user = self.users.create(&user)?;

        let owner = self
            .owners
            .get_by_user(user.id)?
            .ok_or_else(|| ServiceError::Repository("Owner profile was not created".to_string()))?;
        info!("User {} registered owner {}", actor.username, owner.username);
        Ok(owner)
    }

    async fn search(&self, actor: &Actor, query: &str) -> Result<Vec<OwnerWithPets>, ServiceError> {
        actor.require_any(&[Role::Admin, Role::AdminOp])?;
        Ok(self.owners.search(query)?)
    }

    async fn detail(&self, actor: &Actor, owner_id: i64) -> Result<OwnerDetail, ServiceError> {
        actor.require_any(&[Role::Admin, Role::AdminOp])?;
        let owner = self
            .owners
            .get(owner_id)?
            .ok_or_else(|| ServiceError::not_found(format!("Owner {} not found", owner_id)))?;
        let scope = actor.scope();

        let appointments = self.appointments.list(&AppointmentFilter {
            owner_id: Some(owner.id),
            ..AppointmentFilter::scoped(scope)
        })?;
        let mut pending_appointments: Vec<Appointment> = appointments
            .iter()
            .filter(|a| a.status == AppointmentStatus::Pending)
            .cloned()
            .collect();
        pending_appointments.sort_by(|a, b| a.requested_date.cmp(&b.requested_date).then(a.id.cmp(&b.id)));

        let pets = pets_seen_in(self.patients.list_by_owner(owner.id)?, &appointments, scope);
        let records = self.records.list(&RecordFilter {
            owner_id: Some(owner.id),
            scope,
            ..RecordFilter::default()
        })?;

        Ok(OwnerDetail {
            owner,
            pets,
            appointments,
            pending_appointments,
            records,
        })
    }
}

pub fn create_default_owner_service(pool: DatabasePool) -> Arc<dyn OwnerServiceTrait> {
    Arc::new(OwnerService::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor_for, add_user, superuser, Fixture};
    use chrono::NaiveDate;
    use vet_clinic_data::models::{AppointmentKind, NewAppointment};

    fn request(username: &str) -> CreateOwnerRequest {
        CreateOwnerRequest {
            username: username.to_string(),
            password: "long-enough".to_string(),
            email: String::new(),
            first_name: "Carlos".to_string(),
            last_name: "Paz".to_string(),
            phone: "351-777".to_string(),
            address: "Ituzaingó 5".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_owner_and_search() {
        let fixture = Fixture::new();
        let service = OwnerService::new(fixture.pool.clone());

        let owner = service.create(&superuser(), request("cpaz")).await.unwrap();
        assert_eq!(owner.phone, "351-777");

        let duplicate = service.create(&superuser(), request("CPAZ")).await;
        assert!(matches!(duplicate, Err(ServiceError::Conflict(_))));

        let found = service.search(&superuser(), "paz").await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].pet_count, 0);
        assert!(service.search(&superuser(), "  ").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_owner_detail_is_branch_scoped() {
        let fixture = Fixture::new();
        let service = OwnerService::new(fixture.pool.clone());
        let desk_centro = add_user(&fixture.pool, "desk_centro", Role::AdminOp, Some(fixture.branch_id));
        let desk_norte = add_user(&fixture.pool, "desk_norte", Role::AdminOp, Some(fixture.other_branch_id));

        AppointmentRepository::new(fixture.pool.clone())
            .create(&NewAppointment {
                patient_id: fixture.patient_id,
                branch_id: fixture.branch_id,
                vet_id: None,
                requested_date: NaiveDate::from_ymd_opt(2030, 5, 2).unwrap(),
                scheduled_at: None,
                kind: AppointmentKind::Consultation,
                status: AppointmentStatus::Pending,
                notes: String::new(),
            })
            .unwrap();

        let centro = service
            .detail(&actor_for(&fixture.pool, desk_centro.id), fixture.owner_id)
            .await
            .unwrap();
        assert_eq!(centro.pets.len(), 1);
        assert_eq!(centro.pending_appointments.len(), 1);

        let norte = service
            .detail(&actor_for(&fixture.pool, desk_norte.id), fixture.owner_id)
            .await
            .unwrap();
        assert!(norte.pets.is_empty());
        assert!(norte.appointments.is_empty());

        let vet = actor_for(&fixture.pool, fixture.vet_id);
        assert!(matches!(service.detail(&vet, fixture.owner_id).await, Err(ServiceError::Forbidden(_))));
    }
}
