//! Clinical history: registration, team overview and per-record access

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use validator::Validate;

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{now_utc, MedicalRecord, RecordFilter, RecordInput, Role};
use vet_clinic_data::repository::{AppointmentRepository, OwnerRepository, PatientRepository, RecordRepository};

use crate::access::Actor;
use crate::error::{validate_payload, ServiceError};
use crate::services::appointment::parse_filter_date;

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct RegisterRecordRequest {
    /// Appointment of the same patient this record documents
    pub appointment_id: Option<i64>,
    #[validate(length(min = 1, message = "Diagnosis is required"))]
    pub diagnosis: String,
    #[serde(default)]
    pub treatment: String,
    #[serde(default)]
    pub notes: String,
    pub weight_kg: Option<f64>,
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub exams: String,
    pub next_checkup: Option<chrono::NaiveDate>,
    #[serde(default)]
    pub no_next_checkup: bool,
}

impl RegisterRecordRequest {
    fn input(&self) -> RecordInput {
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
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct RegisteredRecord {
    pub record: MedicalRecord,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::IntoParams), into_params(parameter_in = Query))]
pub struct RecordQuery {
    /// Patient name, owner names or diagnosis
    pub q: Option<String>,
    /// `YYYY-MM-DD`
    pub from: Option<String>,
    /// `YYYY-MM-DD`
    pub to: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct RecordSummary {
    pub total: usize,
    pub last_7_days: usize,
    pub last_30_days: usize,
    pub without_appointment: usize,
    pub patients: usize,
    pub vets: usize,
    pub last_update: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct NamedCount {
    pub id: Option<i64>,
    pub name: String,
    pub total: usize,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct RecordOverview {
    pub records: Vec<MedicalRecord>,
    pub summary: RecordSummary,
    pub top_species: Vec<NamedCount>,
    pub top_vets: Vec<NamedCount>,
    pub latest: Vec<MedicalRecord>,
    pub warnings: Vec<String>,
}

#[async_trait]
pub trait RecordServiceTrait: Send + Sync {
    async fn register(
        &self,
        actor: &Actor,
        patient_id: i64,
        request: RegisterRecordRequest,
    ) -> Result<RegisteredRecord, ServiceError>;

    async fn overview(&self, actor: &Actor, query: RecordQuery) -> Result<RecordOverview, ServiceError>;

    async fn mine(&self, actor: &Actor) -> Result<Vec<MedicalRecord>, ServiceError>;

    async fn detail(&self, actor: &Actor, record_id: i64) -> Result<MedicalRecord, ServiceError>;
}

pub struct RecordService {
    appointments: AppointmentRepository,
    owners: OwnerRepository,
    patients: PatientRepository,
    records: RecordRepository,
}

/// Counts sorted by total descending then name, truncated to `limit`
fn ranked(counts: HashMap<(Option<i64>, String), usize>, limit: usize) -> Vec<NamedCount> {
    let mut ranked: Vec<NamedCount> = counts
        .into_iter()
        .map(|((id, name), total)| NamedCount { id, name, total })
        .collect();
    ranked.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(limit);
    ranked
}

pub(crate) fn summarize(records: &[MedicalRecord], now: DateTime<Utc>) -> RecordSummary {
    let week_ago = now - Duration::days(7);
    let month_ago = now - Duration::days(30);
    RecordSummary {
        total: records.len(),
        last_7_days: records.iter().filter(|r| r.recorded_at >= week_ago).count(),
        last_30_days: records.iter().filter(|r| r.recorded_at >= month_ago).count(),
        without_appointment: records.iter().filter(|r| r.appointment_id.is_none()).count(),
        patients: records.iter().map(|r| r.patient_id).collect::<HashSet<_>>().len(),
        vets: records.iter().filter_map(|r| r.vet_id).collect::<HashSet<_>>().len(),
        last_update: records.iter().map(|r| r.recorded_at).max(),
    }
}

fn top_species(records: &[MedicalRecord]) -> Vec<NamedCount> {
    let mut counts = HashMap::new();
    for record in records {
        *counts.entry((None, record.patient_species.clone())).or_insert(0) += 1;
    }
    ranked(counts, 4)
}

fn top_vets(records: &[MedicalRecord]) -> Vec<NamedCount> {
    let mut counts = HashMap::new();
    for record in records {
        if let (Some(id), Some(name)) = (record.vet_id, record.vet_name.as_ref()) {
            *counts.entry((Some(id), name.clone())).or_insert(0) += 1;
        }
    }
    ranked(counts, 6)
}

impl RecordService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            appointments: AppointmentRepository::new(pool.clone()),
            owners: OwnerRepository::new(pool.clone()),
            patients: PatientRepository::new(pool.clone()),
            records: RecordRepository::new(pool),
        }
    }
}

#[async_trait]
impl RecordServiceTrait for RecordService {
    async fn register(
        &self,
        actor: &Actor,
        patient_id: i64,
        request: RegisterRecordRequest,
    ) -> Result<RegisteredRecord, ServiceError> {
        actor.require_any(&[Role::Vet])?;
        validate_payload(&request)?;
        let patient = self
            .patients
            .get(patient_id)?
            .ok_or_else(|| ServiceError::not_found(format!("Patient {} not found", patient_id)))?;

        let mut warnings = Vec::new();
        let appointment_id = match request.appointment_id {
            Some(id) => match self.appointments.get(id)?.filter(|a| a.patient_id == patient.id) {
                Some(appointment) => Some(appointment.id),
                None => {
                    warn!("Appointment {} does not belong to patient {}", id, patient.id);
                    warnings.push(
                        "The selected appointment does not belong to this patient or is no longer available"
                            .to_string(),
                    );
                    None
                }
            },
            None => None,
        };

        let record = self
            .records
            .create(patient.id, actor.user_id, appointment_id, &request.input())?;
        info!("Vet {} registered record {} for {}", actor.username, record.id, patient.name);
        Ok(RegisteredRecord { record, warnings })
    }

    async fn overview(&self, actor: &Actor, query: RecordQuery) -> Result<RecordOverview, ServiceError> {
        actor.require_any(&[Role::Admin, Role::Vet])?;
        let mut warnings = Vec::new();
        let filter = RecordFilter {
            scope: actor.scope(),
            search: query.q.filter(|q| !q.trim().is_empty()),
            from: parse_filter_date(query.from.as_deref(), "from", &mut warnings),
            to: parse_filter_date(query.to.as_deref(), "to", &mut warnings),
            ..RecordFilter::default()
        };
        let records = self.records.list(&filter)?;

        Ok(RecordOverview {
            summary: summarize(&records, now_utc()),
            top_species: top_species(&records),
            top_vets: top_vets(&records),
            latest: records.iter().take(5).cloned().collect(),
            records,
            warnings,
        })
    }

    async fn mine(&self, actor: &Actor) -> Result<Vec<MedicalRecord>, ServiceError> {
        actor.require_any(&[Role::Vet])?;
        Ok(self.records.list(&RecordFilter {
            vet_id: Some(actor.user_id),
            ..RecordFilter::default()
        })?)
    }

    async fn detail(&self, actor: &Actor, record_id: i64) -> Result<MedicalRecord, ServiceError> {
        let record = self
            .records
            .get(record_id)?
            .ok_or_else(|| ServiceError::not_found(format!("Record {} not found", record_id)))?;
        if actor.has_role(Role::Owner) && !actor.is_superuser {
            let own = self.owners.get_by_user(actor.user_id)?.map(|o| o.id);
            if own != Some(record.owner_id) {
                warn!("Owner {} tried to read record {}", actor.username, record_id);
                return Err(ServiceError::forbidden("You can only view the records of your own pets"));
            }
        }
        Ok(record)
    }
}

pub fn create_default_record_service(pool: DatabasePool) -> Arc<dyn RecordServiceTrait> {
    Arc::new(RecordService::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor_for, add_user, Fixture};
    use vet_clinic_data::models::{AppointmentKind, AppointmentStatus, NewAppointment};

    fn request(diagnosis: &str, appointment_id: Option<i64>) -> RegisterRecordRequest {
        RegisterRecordRequest {
            appointment_id,
            diagnosis: diagnosis.to_string(),
            next_checkup: chrono::NaiveDate::from_ymd_opt(2030, 1, 1),
            no_next_checkup: true,
            ..RegisterRecordRequest::default()
        }
    }

    #[tokio::test]
    async fn test_register_links_own_appointment_only() {
        let fixture = Fixture::new();
        let service = RecordService::new(fixture.pool.clone());
        let vet = actor_for(&fixture.pool, fixture.vet_id);
        let appointment = AppointmentRepository::new(fixture.pool.clone())
            .create(&NewAppointment {
                patient_id: fixture.patient_id,
                branch_id: fixture.branch_id,
                vet_id: Some(fixture.vet_id),
                requested_date: Utc::now().date_naive(),
                scheduled_at: Some(Utc::now()),
                kind: AppointmentKind::Vaccination,
                status: AppointmentStatus::Scheduled,
                notes: String::new(),
            })
            .unwrap();

        let linked = service
            .register(&vet, fixture.patient_id, request("Healthy", Some(appointment.id)))
            .await
            .unwrap();
        assert!(linked.warnings.is_empty());
        assert_eq!(linked.record.appointment_id, Some(appointment.id));
        assert!(linked.record.next_checkup.is_none());
        let attended = AppointmentRepository::new(fixture.pool.clone()).get(appointment.id).unwrap().unwrap();
        assert_eq!(attended.status, AppointmentStatus::Attended);

        let foreign = service
            .register(&vet, fixture.patient_id, request("Follow-up", Some(9999)))
            .await
            .unwrap();
        assert_eq!(foreign.warnings.len(), 1);
        assert!(foreign.record.appointment_id.is_none());

        let owner = actor_for(&fixture.pool, fixture.owner_user_id);
        let refused = service.register(&owner, fixture.patient_id, request("x", None)).await;
        assert!(matches!(refused, Err(ServiceError::Forbidden(_))));
    }

    #[tokio::test]
    async fn test_overview_summary_and_rankings() {
        let fixture = Fixture::new();
        let service = RecordService::new(fixture.pool.clone());
        let vet = actor_for(&fixture.pool, fixture.vet_id);
        service.register(&vet, fixture.patient_id, request("Otitis", None)).await.unwrap();
        service.register(&vet, fixture.patient_id, request("Dermatitis", None)).await.unwrap();

        let admin = crate::testing::superuser();
        let overview = service
            .overview(&admin, RecordQuery { q: Some("otitis".to_string()), from: Some("bad".to_string()), to: None })
            .await
            .unwrap();
        assert_eq!(overview.summary.total, 1);
        assert_eq!(overview.warnings.len(), 1);

        let all = service.overview(&admin, RecordQuery::default()).await.unwrap();
        assert_eq!(all.summary.total, 2);
        assert_eq!(all.summary.last_7_days, 2);
        assert_eq!(all.summary.without_appointment, 2);
        assert_eq!(all.summary.patients, 1);
        assert_eq!(all.summary.vets, 1);
        assert_eq!(all.top_species, vec![NamedCount { id: None, name: "Perro".to_string(), total: 2 }]);
        assert_eq!(all.top_vets[0].name, "Laura Rivas");
        assert_eq!(all.latest.len(), 2);

        assert_eq!(service.mine(&vet).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_owner_sees_only_own_records() {
        let fixture = Fixture::new();
        let service = RecordService::new(fixture.pool.clone());
        let vet = actor_for(&fixture.pool, fixture.vet_id);
        let record = service.register(&vet, fixture.patient_id, request("Otitis", None)).await.unwrap().record;

        let owner = actor_for(&fixture.pool, fixture.owner_user_id);
        assert_eq!(service.detail(&owner, record.id).await.unwrap().id, record.id);

        let other = add_user(&fixture.pool, "other", Role::Owner, None);
        let denied = service.detail(&actor_for(&fixture.pool, other.id), record.id).await;
        assert!(matches!(denied, Err(ServiceError::Forbidden(_))));
    }
}
