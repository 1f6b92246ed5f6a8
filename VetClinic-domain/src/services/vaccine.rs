//! Vaccination calendar kept by owners for their pets

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{Patient, Role, Species, Vaccine, VaccineRecord};
use vet_clinic_data::repository::{OwnerRepository, PatientRepository, VaccineRepository};

use crate::access::Actor;
use crate::error::ServiceError;

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct CalendarEntry {
    pub vaccine: Vaccine,
    pub readable_age: String,
    pub record: Option<VaccineRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct VaccineCalendar {
    pub pets: Vec<Patient>,
    pub selected: Option<Patient>,
    /// Species of the selected pet, when it has a schedule
    pub species: Option<Species>,
    pub entries: Vec<CalendarEntry>,
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    /// Whole percentage of completed vaccines, rounded down
    pub progress: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct MarkVaccineRequest {
    /// Defaults to today
    pub applied_on: Option<NaiveDate>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct MarkOutcome {
    pub record: VaccineRecord,
    pub created: bool,
    pub message: String,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct UnmarkOutcome {
    pub removed: bool,
    pub message: String,
}

#[async_trait]
pub trait VaccineServiceTrait: Send + Sync {
    /// Calendar of `patient_id`, or of the first pet by name
    async fn calendar(&self, actor: &Actor, patient_id: Option<i64>) -> Result<VaccineCalendar, ServiceError>;

    async fn mark(
        &self,
        actor: &Actor,
        patient_id: i64,
        vaccine_id: i64,
        request: MarkVaccineRequest,
    ) -> Result<MarkOutcome, ServiceError>;

    async fn unmark(&self, actor: &Actor, patient_id: i64, vaccine_id: i64) -> Result<UnmarkOutcome, ServiceError>;
}

pub struct VaccineService {
    owners: OwnerRepository,
    patients: PatientRepository,
    vaccines: VaccineRepository,
}

fn progress(completed: usize, total: usize) -> u32 {
    if total == 0 {
        0
    } else {
        (completed * 100 / total) as u32
    }
}

impl VaccineService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            owners: OwnerRepository::new(pool.clone()),
            patients: PatientRepository::new(pool.clone()),
            vaccines: VaccineRepository::new(pool),
        }
    }

    fn own_pets(&self, actor: &Actor) -> Result<Vec<Patient>, ServiceError> {
        actor.require_any(&[Role::Owner])?;
        let owner = self
            .owners
            .get_by_user(actor.user_id)?
            .ok_or_else(|| ServiceError::not_found("You have no owner profile"))?;
        Ok(self.patients.list_by_owner(owner.id)?)
    }

    /// The owner's pet and the schedule entry matching its species
    fn pet_and_vaccine(&self, actor: &Actor, patient_id: i64, vaccine_id: i64) -> Result<(Patient, Vaccine), ServiceError> {
        let pet = self
            .own_pets(actor)?
            .into_iter()
            .find(|p| p.id == patient_id)
            .ok_or_else(|| ServiceError::not_found("The selected pet is not valid"))?;
        let vaccine = self
            .vaccines
            .get(vaccine_id)?
            .ok_or_else(|| ServiceError::not_found("The vaccine does not exist"))?;

        match Species::normalize(&pet.species) {
            None => Err(ServiceError::validation("The pet's species has no vaccination schedule")),
            Some(species) if species != vaccine.species => {
                warn!("Vaccine {} does not apply to {} ({})", vaccine.id, pet.name, pet.species);
                Err(ServiceError::validation("The vaccine does not match the pet's species"))
            }
            Some(_) => Ok((pet, vaccine)),
        }
    }
}

#[async_trait]
impl VaccineServiceTrait for VaccineService {
    async fn calendar(&self, actor: &Actor, patient_id: Option<i64>) -> Result<VaccineCalendar, ServiceError> {
        let pets = self.own_pets(actor)?;
        let selected = match patient_id {
            Some(id) => Some(
                pets.iter()
                    .find(|p| p.id == id)
                    .cloned()
                    .ok_or_else(|| ServiceError::not_found("The selected pet is not valid"))?,
            ),
            None => pets.first().cloned(),
        };
        let species = selected.as_ref().and_then(|p| Species::normalize(&p.species));

        let entries: Vec<CalendarEntry> = match (&selected, species) {
            (Some(pet), Some(species)) => {
                let mut records: HashMap<i64, VaccineRecord> = self
                    .vaccines
                    .records_for_patient(pet.id)?
                    .into_iter()
                    .map(|r| (r.vaccine_id, r))
                    .collect();
                self.vaccines
                    .list_for_species(species)?
                    .into_iter()
                    .map(|vaccine| CalendarEntry {
                        readable_age: vaccine.readable_age(),
                        record: records.remove(&vaccine.id),
                        vaccine,
                    })
                    .collect()
            }
            _ => Vec::new(),
        };

        let total = entries.len();
        let completed = entries.iter().filter(|e| e.record.is_some()).count();
        Ok(VaccineCalendar {
            pets,
            selected,
            species,
            entries,
            total,
            completed,
            pending: total - completed,
            progress: progress(completed, total),
        })
    }

    async fn mark(
        &self,
        actor: &Actor,
        patient_id: i64,
        vaccine_id: i64,
        request: MarkVaccineRequest,
    ) -> Result<MarkOutcome, ServiceError> {
        let (pet, vaccine) = self.pet_and_vaccine(actor, patient_id, vaccine_id)?;
        let today = Utc::now().date_naive();
        let applied_on = request.applied_on.unwrap_or(today);
        if applied_on > today {
            return Err(ServiceError::validation("The application date cannot be in the future"));
        }

        let (record, created) = self
            .vaccines
            .upsert_record(pet.id, vaccine.id, applied_on, &request.notes)?;
        let message = if created {
            format!("Recorded {} for {}", vaccine.name, pet.name)
        } else {
            format!("Updated {} for {}", vaccine.name, pet.name)
        };
        info!("{}", message);
        Ok(MarkOutcome { record, created, message })
    }

    async fn unmark(&self, actor: &Actor, patient_id: i64, vaccine_id: i64) -> Result<UnmarkOutcome, ServiceError> {
        let (pet, vaccine) = self.pet_and_vaccine(actor, patient_id, vaccine_id)?;
        let removed = self.vaccines.delete_record(pet.id, vaccine.id)?;
        let message = if removed {
            format!("Removed {} for {}", vaccine.name, pet.name)
        } else {
            "There was no previous record to remove".to_string()
        };
        Ok(UnmarkOutcome { removed, message })
    }
}

pub fn create_default_vaccine_service(pool: DatabasePool) -> Arc<dyn VaccineServiceTrait> {
    Arc::new(VaccineService::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor_for, Fixture};
    use chrono::Duration;
    use vet_clinic_data::models::PatientInput;

    fn feline_vaccine(fixture: &Fixture) -> Vaccine {
        VaccineRepository::new(fixture.pool.clone())
            .list_for_species(Species::Feline)
            .unwrap()
            .remove(0)
    }

    #[test]
    fn test_progress_rounds_down() {
        assert_eq!(progress(0, 0), 0);
        assert_eq!(progress(1, 3), 33);
        assert_eq!(progress(2, 3), 66);
        assert_eq!(progress(5, 5), 100);
    }

    #[tokio::test]
    async fn test_calendar_tracks_progress() {
        let fixture = Fixture::new();
        let service = VaccineService::new(fixture.pool.clone());
        let owner = actor_for(&fixture.pool, fixture.owner_user_id);

        let calendar = service.calendar(&owner, None).await.unwrap();
        assert_eq!(calendar.selected.as_ref().map(|p| p.id), Some(fixture.patient_id));
        assert_eq!(calendar.species, Some(Species::Canine));
        assert!(calendar.total > 0);
        assert_eq!(calendar.completed, 0);

        let first = calendar.entries[0].vaccine.id;
        let marked = service
            .mark(&owner, fixture.patient_id, first, MarkVaccineRequest::default())
            .await
            .unwrap();
        assert!(marked.created);
        assert_eq!(marked.record.applied_on, Utc::now().date_naive());
        let again = service
            .mark(&owner, fixture.patient_id, first, MarkVaccineRequest::default())
            .await
            .unwrap();
        assert!(!again.created);

        let updated = service.calendar(&owner, Some(fixture.patient_id)).await.unwrap();
        assert_eq!(updated.completed, 1);
        assert_eq!(updated.pending, updated.total - 1);
        assert_eq!(updated.progress, progress(1, updated.total));

        assert!(service.unmark(&owner, fixture.patient_id, first).await.unwrap().removed);
        assert!(!service.unmark(&owner, fixture.patient_id, first).await.unwrap().removed);
    }

    #[tokio::test]
    async fn test_mark_rules() {
        let fixture = Fixture::new();
        let service = VaccineService::new(fixture.pool.clone());
        let owner = actor_for(&fixture.pool, fixture.owner_user_id);

        let wrong_species = service
            .mark(&owner, fixture.patient_id, feline_vaccine(&fixture).id, MarkVaccineRequest::default())
            .await;
        assert!(matches!(wrong_species, Err(ServiceError::Validation(_))));

        let canine = service.calendar(&owner, None).await.unwrap().entries[0].vaccine.id;
        let future = service
            .mark(
                &owner,
                fixture.patient_id,
                canine,
                MarkVaccineRequest {
                    applied_on: Some(Utc::now().date_naive() + Duration::days(2)),
                    notes: String::new(),
                },
            )
            .await;
        assert!(matches!(future, Err(ServiceError::Validation(_))));

        let parrot = PatientRepository::new(fixture.pool.clone())
            .create(
                fixture.owner_id,
                &PatientInput {
                    name: "Kiwi".to_string(),
                    species: "Loro".to_string(),
                    breed: String::new(),
                    sex: "M".to_string(),
                    birth_date: NaiveDate::from_ymd_opt(2022, 1, 1).unwrap(),
                    vaccines: String::new(),
                    allergies: String::new(),
                },
            )
            .unwrap();
        let no_schedule = service.calendar(&owner, Some(parrot.id)).await.unwrap();
        assert!(no_schedule.species.is_none());
        assert_eq!(no_schedule.progress, 0);
        assert_eq!(no_schedule.pets.len(), 2);

        let vet = actor_for(&fixture.pool, fixture.vet_id);
        assert!(matches!(service.calendar(&vet, None).await, Err(ServiceError::Forbidden(_))));
    }
}
