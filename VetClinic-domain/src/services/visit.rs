//! Closing an appointment: clinical record plus pharmacy reconciliation

use std::sync::Arc;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{info, warn};
use validator::Validate;

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{AppointmentStatus, RecordInput, Role};
use vet_clinic_data::repository::{AppointmentRepository, VisitCompletion, VisitOutcome, VisitRepository};

use crate::access::Actor;
use crate::error::{validate_payload, ServiceError};

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct DispensedMedication {
    pub medication_id: i64,
    pub quantity: i64,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct CompleteVisitRequest {
    #[validate(length(min = 1, message = "Diagnosis is required"))]
    pub diagnosis: String,
    #[serde(default)]
    pub treatment: String,
    #[serde(default)]
    pub notes: String,
    #[validate(range(min = 0.0, message = "Weight cannot be negative"))]
    pub weight_kg: Option<f64>,
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub exams: String,
    pub next_checkup: Option<NaiveDate>,
    #[serde(default)]
    pub no_next_checkup: bool,
    #[serde(default)]
    pub used_medications: bool,
    #[serde(default)]
    pub medications: Vec<DispensedMedication>,
}

impl CompleteVisitRequest {
    fn record(&self) -> RecordInput {
        RecordInput {
            diagnosis: self.diagnosis.trim().to_string(),
            treatment: self.treatment.trim().to_string(),
            notes: self.notes.trim().to_string(),
            weight_kg: self.weight_kg,
            temperature_c: self.temperature_c,
            exams: self.exams.trim().to_string(),
            next_checkup: self.next_checkup,
            no_next_checkup: self.no_next_checkup,
        }
    }

    /// Validated (medication id, quantity) pairs, `None` when nothing was used
    fn dispensed(&self) -> Result<Option<Vec<(i64, i64)>>, ServiceError> {
        if !self.used_medications {
            return Ok(None);
        }
        if self.medications.is_empty() {
            return Err(ServiceError::validation(
                "Add at least one medication or mark that none were used",
            ));
        }
        if let Some(bad) = self.medications.iter().find(|m| m.quantity <= 0) {
            return Err(ServiceError::validation(format!(
                "The quantity for medication {} must be greater than zero",
                bad.medication_id
            )));
        }
        Ok(Some(
            self.medications
                .iter()
                .map(|m| (m.medication_id, m.quantity))
                .collect(),
        ))
    }
}

#[async_trait]
pub trait VisitServiceTrait: Send + Sync {
    /// Write the clinical record, mark the appointment attended and
    /// reconcile dispensed medications with the branch stock
    async fn complete(
        &self,
        actor: &Actor,
        appointment_id: i64,
        request: CompleteVisitRequest,
    ) -> Result<VisitOutcome, ServiceError>;
}

pub struct VisitService {
    appointments: AppointmentRepository,
    visits: VisitRepository,
}

impl VisitService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            appointments: AppointmentRepository::new(pool.clone()),
            visits: VisitRepository::new(pool),
        }
    }
}

#[async_trait]
impl VisitServiceTrait for VisitService {
    async fn complete(
        &self,
        actor: &Actor,
        appointment_id: i64,
        request: CompleteVisitRequest,
    ) -> Result<VisitOutcome, ServiceError> {
        actor.require_any(&[Role::Vet])?;
        validate_payload(&request)?;

        let appointment = self
            .appointments
            .get(appointment_id)?
            .ok_or_else(|| ServiceError::not_found(format!("Appointment {} not found", appointment_id)))?;
        if !actor.can_manage_branch(appointment.branch_id) {
            warn!("Vet {} outside branch {} tried to complete {}", actor.username, appointment.branch_id, appointment.id);
            return Err(ServiceError::forbidden("This appointment belongs to another branch"));
        }
        if matches!(appointment.vet_id, Some(vet) if vet != actor.user_id) {
            warn!("Vet {} tried to complete appointment {} of another vet", actor.username, appointment.id);
            return Err(ServiceError::forbidden("This appointment is assigned to another vet"));
        }
        if appointment.status == AppointmentStatus::Cancelled {
            return Err(ServiceError::validation("A cancelled appointment cannot be completed"));
        }

        let outcome = self.visits.complete(&VisitCompletion {
            appointment_id: appointment.id,
            vet_id: actor.user_id,
            record: request.record(),
            medications: request.dispensed()?,
        })?;
        info!(
            "Vet {} completed appointment {} for {}",
            actor.username, appointment.id, appointment.patient_name
        );
        Ok(outcome)
    }
}

pub fn create_default_visit_service(pool: DatabasePool) -> Arc<dyn VisitServiceTrait> {
    Arc::new(VisitService::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor_for, add_user, Fixture};
    use chrono::Utc;
    use vet_clinic_data::models::{AppointmentKind, MedicationCategory, MedicationInput, NewAppointment};
    use vet_clinic_data::repository::MedicationRepository;

    fn scheduled(fixture: &Fixture, vet_id: Option<i64>) -> i64 {
        AppointmentRepository::new(fixture.pool.clone())
            .create(&NewAppointment {
                patient_id: fixture.patient_id,
                branch_id: fixture.branch_id,
                vet_id,
                requested_date: Utc::now().date_naive(),
                scheduled_at: Some(Utc::now()),
                kind: AppointmentKind::Consultation,
                status: AppointmentStatus::Scheduled,
                notes: String::new(),
            })
            .unwrap()
            .id
    }

    fn request(medications: Vec<(i64, i64)>) -> CompleteVisitRequest {
        CompleteVisitRequest {
            diagnosis: "Otitis".to_string(),
            used_medications: !medications.is_empty(),
            medications: medications
                .into_iter()
                .map(|(medication_id, quantity)| DispensedMedication { medication_id, quantity })
                .collect(),
            ..CompleteVisitRequest::default()
        }
    }

    #[tokio::test]
    async fn test_vet_completes_and_dispenses() {
        let fixture = Fixture::new();
        let service = VisitService::new(fixture.pool.clone());
        let medications = MedicationRepository::new(fixture.pool.clone());
        let drops = medications
            .create(&MedicationInput {
                branch_id: fixture.branch_id,
                name: "Otic drops".to_string(),
                category: MedicationCategory::OphthalmicOtic,
                description: String::new(),
                stock: 4,
            })
            .unwrap();
        let appointment_id = scheduled(&fixture, Some(fixture.vet_id));

        let outcome = service
            .complete(&actor_for(&fixture.pool, fixture.vet_id), appointment_id, request(vec![(drops.id, 3), (drops.id, 1)]))
            .await
            .unwrap();

        assert_eq!(outcome.record.diagnosis, "Otitis");
        assert_eq!(outcome.stock_changes[0].stock_after, 3);
        assert_eq!(medications.get(drops.id).unwrap().unwrap().stock, 3);
    }

    #[tokio::test]
    async fn test_rejects_invalid_medication_entries() {
        let fixture = Fixture::new();
        let service = VisitService::new(fixture.pool.clone());
        let vet = actor_for(&fixture.pool, fixture.vet_id);
        let appointment_id = scheduled(&fixture, None);

        let mut flagged = request(vec![]);
        flagged.used_medications = true;
        assert!(matches!(service.complete(&vet, appointment_id, flagged).await, Err(ServiceError::Validation(_))));

        let zero = request(vec![(1, 0)]);
        assert!(matches!(service.complete(&vet, appointment_id, zero).await, Err(ServiceError::Validation(_))));

        let mut blank = request(vec![]);
        blank.diagnosis.clear();
        assert!(matches!(service.complete(&vet, appointment_id, blank).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_only_the_assigned_vet_of_the_branch() {
        let fixture = Fixture::new();
        let service = VisitService::new(fixture.pool.clone());
        let colleague = add_user(&fixture.pool, "colleague", Role::Vet, Some(fixture.branch_id));
        let outsider = add_user(&fixture.pool, "outsider", Role::Vet, Some(fixture.other_branch_id));
        let appointment_id = scheduled(&fixture, Some(fixture.vet_id));

        let taken = service
            .complete(&actor_for(&fixture.pool, colleague.id), appointment_id, request(vec![]))
            .await;
        assert!(matches!(taken, Err(ServiceError::Forbidden(_))));

        let foreign = service
            .complete(&actor_for(&fixture.pool, outsider.id), appointment_id, request(vec![]))
            .await;
        assert!(matches!(foreign, Err(ServiceError::Forbidden(_))));

        let owner = service
            .complete(&actor_for(&fixture.pool, fixture.owner_user_id), appointment_id, request(vec![]))
            .await;
        assert!(matches!(owner, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_superuser_vet_completes_in_any_branch() {
        let fixture = Fixture::new();
        let service = VisitService::new(fixture.pool.clone());
        let root = Actor {
            user_id: fixture.vet_id,
            username: "root-vet".to_string(),
            role: Role::Vet,
            branch_id: None,
            is_superuser: true,
        };
        let appointment_id = scheduled(&fixture, None);

        let outcome = service.complete(&root, appointment_id, request(vec![])).await.unwrap();
        assert_eq!(outcome.record.diagnosis, "Otitis");
    }
}
