//! Pets: registration, listings, clinical detail and owner transfer

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{
    now_utc, Appointment, AppointmentFilter, BranchScope, MedicalRecord, Owner, Patient,
    PatientInput, RecordFilter, Role,
};
use vet_clinic_data::repository::{
    AppointmentRepository, OwnerRepository, PatientRepository, RecordRepository, UserRepository,
};

use crate::access::Actor;
use crate::auth::password::verify_password;
use crate::error::ServiceError;

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct CreatePatientRequest {
    /// Required when an administrator registers the pet
    pub owner_id: Option<i64>,
    #[serde(flatten)]
    pub patient: PatientInput,
}

/// Appointment with the record that documents it, if any
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct AppointmentWithRecord {
    pub appointment: Appointment,
    pub related_record: Option<MedicalRecord>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct PatientDetail {
    pub patient: Patient,
    /// Newest first
    pub records: Vec<MedicalRecord>,
    /// Newest requested date first
    pub appointments: Vec<AppointmentWithRecord>,
    /// Confirmed in the future, soonest first
    pub upcoming: Vec<Appointment>,
    /// Confirmed in the past
    pub past: Vec<Appointment>,
    pub last_consultation: Option<MedicalRecord>,
    pub next_appointment: Option<Appointment>,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct TransferRequest {
    pub new_owner_id: i64,
    pub password: String,
    pub password_confirmation: String,
    /// Without confirmation nothing changes and a preview is returned
    #[serde(default)]
    pub confirmed: bool,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct TransferOutcome {
    pub patient: Patient,
    pub new_owner: Owner,
    pub transferred: bool,
    pub message: String,
}

#[async_trait]
pub trait PatientServiceTrait: Send + Sync {
    async fn create(&self, actor: &Actor, request: CreatePatientRequest) -> Result<Patient, ServiceError>;

    async fn list(&self, actor: &Actor) -> Result<Vec<Patient>, ServiceError>;

    async fn detail(&self, actor: &Actor, patient_id: i64) -> Result<PatientDetail, ServiceError>;

    async fn transfer(
        &self,
        actor: &Actor,
        patient_id: i64,
        request: TransferRequest,
    ) -> Result<TransferOutcome, ServiceError>;
}

pub struct PatientService {
    users: UserRepository,
    owners: OwnerRepository,
    patients: PatientRepository,
    appointments: AppointmentRepository,
    records: RecordRepository,
}

impl PatientService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            users: UserRepository::new(pool.clone()),
            owners: OwnerRepository::new(pool.clone()),
            patients: PatientRepository::new(pool.clone()),
            appointments: AppointmentRepository::new(pool.clone()),
            records: RecordRepository::new(pool),
        }
    }

    fn own_profile(&self, actor: &Actor) -> Result<Owner, ServiceError> {
        self.owners
            .get_by_user(actor.user_id)?
            .ok_or_else(|| ServiceError::not_found("You have no owner profile"))
    }
}

fn validate_patient(input: &PatientInput) -> Result<(), ServiceError> {
    if input.name.trim().is_empty() {
        return Err(ServiceError::validation("The pet name is required"));
    }
    if input.species.trim().is_empty() {
        return Err(ServiceError::validation("The species is required"));
    }
    if input.birth_date > Utc::now().date_naive() {
        return Err(ServiceError::validation("The birth date cannot be in the future"));
    }
    Ok(())
}

/// Date an appointment happened on: the confirmed time, else the requested date
pub(crate) fn appointment_day(appointment: &Appointment) -> NaiveDate {
    appointment
        .scheduled_at
        .map(|at| at.date_naive())
        .unwrap_or(appointment.requested_date)
}

/// Pair each appointment with its linked record, falling back to the first
/// record (in `records` order) written on the appointment's day
pub(crate) fn with_related_records(
    appointments: &[Appointment],
    records: &[MedicalRecord],
) -> Vec<AppointmentWithRecord> {
    let by_id: HashMap<i64, &MedicalRecord> = records.iter().map(|r| (r.id, r)).collect();
    let mut by_day: HashMap<NaiveDate, &MedicalRecord> = HashMap::new();
    for record in records {
        by_day.entry(record.recorded_at.date_naive()).or_insert(record);
    }

    appointments
        .iter()
        .map(|appointment| {
            let related = appointment
                .record_id
                .and_then(|id| by_id.get(&id))
                .or_else(|| by_day.get(&appointment_day(appointment)))
                .map(|record| (*record).clone());
            AppointmentWithRecord {
                appointment: appointment.clone(),
                related_record: related,
            }
        })
        .collect()
}

#[async_trait]
impl PatientServiceTrait for PatientService {
    async fn create(&self, actor: &Actor, request: CreatePatientRequest) -> Result<Patient, ServiceError> {
        actor.require_any(&[Role::Owner, Role::Admin])?;
        validate_patient(&request.patient)?;

        let owner_id = if actor.has_role(Role::Admin) {
            let owner_id = request
                .owner_id
                .ok_or_else(|| ServiceError::validation("Choose the owner of the pet"))?;
            self.owners
                .get(owner_id)?
                .ok_or_else(|| ServiceError::validation("The selected owner does not exist"))?
                .id
        } else {
            self.own_profile(actor)?.id
        };

        let patient = self.patients.create(owner_id, &request.patient)?;
        info!("User {} registered patient {}", actor.username, patient.name);
        Ok(patient)
    }

    async fn list(&self, actor: &Actor) -> Result<Vec<Patient>, ServiceError> {
        if actor.has_any_role(&[Role::Admin, Role::AdminOp]) {
            Ok(self.patients.list(BranchScope::All)?)
        } else if actor.has_role(Role::Vet) {
            Ok(self.patients.list(actor.scope())?)
        } else {
            match self.owners.get_by_user(actor.user_id)? {
                Some(owner) => Ok(self.patients.list_by_owner(owner.id)?),
                None => Ok(Vec::new()),
            }
        }
    }

    async fn detail(&self, actor: &Actor, patient_id: i64) -> Result<PatientDetail, ServiceError> {
        let patient = self
            .patients
            .get(patient_id)?
            .ok_or_else(|| ServiceError::not_found(format!("Patient {} not found", patient_id)))?;
        if actor.role == Role::Owner && !actor.is_superuser {
            let owner = self.own_profile(actor)?;
            if owner.id != patient.owner_id {
                warn!("Owner {} asked for patient {} of someone else", actor.username, patient.id);
                return Err(ServiceError::forbidden("You cannot view this pet"));
            }
        }

        let records = self.records.list(&RecordFilter {
            patient_id: Some(patient.id),
            ..RecordFilter::default()
        })?;
        let appointments = self.appointments.list(&AppointmentFilter {
            patient_id: Some(patient.id),
            ..AppointmentFilter::default()
        })?;

        let now = now_utc();
        let mut upcoming: Vec<Appointment> = appointments
            .iter()
            .filter(|a| a.scheduled_at.map_or(false, |at| at >= now))
            .cloned()
            .collect();
        upcoming.sort_by_key(|a| a.scheduled_at);
        let past: Vec<Appointment> = appointments
            .iter()
            .filter(|a| a.scheduled_at.map_or(false, |at| at < now))
            .cloned()
            .collect();

        Ok(PatientDetail {
            appointments: with_related_records(&appointments, &records),
            last_consultation: records.first().cloned(),
            next_appointment: upcoming.first().cloned(),
            patient,
            records,
            upcoming,
            past,
        })
    }

    async fn transfer(
        &self,
        actor: &Actor,
        patient_id: i64,
        request: TransferRequest,
    ) -> Result<TransferOutcome, ServiceError> {
        actor.require_any(&[Role::Owner])?;
        let owner = self.own_profile(actor)?;
        let patient = self
            .patients
            .get(patient_id)?
            .filter(|p| p.owner_id == owner.id)
            .ok_or_else(|| ServiceError::not_found("You have no pet with that id"))?;

        if request.new_owner_id == owner.id {
            return Err(ServiceError::validation("Choose a different owner"));
        }
        let new_owner = self
            .owners
            .get(request.new_owner_id)?
            .ok_or_else(|| ServiceError::validation("The selected owner does not exist"))?;

        if request.password != request.password_confirmation {
            return Err(ServiceError::validation("The passwords do not match"));
        }
        let user = self
            .users
            .get(actor.user_id)?
            .ok_or_else(|| ServiceError::not_found("User not found"))?;
        if !verify_password(&request.password, &user.password_hash).unwrap_or(false) {
            return Err(ServiceError::validation("The password is not valid"));
        }

        if !request.confirmed {
            return Ok(TransferOutcome {
                message: format!(
                    "Confirm to transfer {} to {}",
                    patient.name,
                    new_owner.display_name()
                ),
                patient,
                new_owner,
                transferred: false,
            });
        }

        let patient = self.patients.transfer(patient.id, new_owner.id)?;
        info!("Owner {} transferred {} to owner {}", owner.id, patient.name, new_owner.id);
        Ok(TransferOutcome {
            message: format!("You transferred {} to {}", patient.name, new_owner.display_name()),
            patient,
            new_owner,
            transferred: true,
        })
    }
}

pub fn create_default_patient_service(pool: DatabasePool) -> Arc<dyn PatientServiceTrait> {
    Arc::new(PatientService::new(pool))
}
