//! Appointment lifecycle: owner requests, front desk scheduling and
//! role-scoped boards

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{
    now_utc, Appointment, AppointmentFilter, AppointmentKind, AppointmentStatus, BranchScope,
    MedicalRecord, MedicationUse, NewAppointment, Role, User,
};
use vet_clinic_data::repository::{
    AppointmentRepository, BranchRepository, OwnerRepository, PatientRepository, RecordRepository,
    UserRepository,
};

use crate::access::Actor;
use crate::error::ServiceError;
use crate::services::contact::{phone_digits, whatsapp_url, CLINIC_NAME};

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct RequestAppointment {
    pub patient_id: i64,
    pub branch_id: i64,
    pub requested_date: NaiveDate,
    pub kind: Option<AppointmentKind>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct ScheduleAppointment {
    pub patient_id: i64,
    /// Only a superuser chooses the branch; other admins use their own
    pub branch_id: Option<i64>,
    pub vet_id: i64,
    pub scheduled_at: DateTime<Utc>,
    pub kind: Option<AppointmentKind>,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct AssignVetRequest {
    pub vet_id: i64,
    pub scheduled_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
#[serde(rename_all = "snake_case")]
pub enum AppointmentAction {
    Cancel,
    MarkAttended,
    Reopen,
}

#[derive(Debug, Clone, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct ActionRequest {
    pub action: AppointmentAction,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct ActionOutcome {
    pub appointment: Appointment,
    /// False when the appointment was already in the target state
    pub changed: bool,
    pub message: String,
}

/// Filters of the appointment board; dates are `YYYY-MM-DD`
#[derive(Debug, Clone, Default, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::IntoParams), into_params(parameter_in = Query))]
pub struct AppointmentQuery {
    pub status: Option<String>,
    pub q: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    /// Front desk only
    pub vet_id: Option<i64>,
    /// Front desk only
    pub owner_id: Option<i64>,
    /// Front desk only
    pub kind: Option<String>,
    /// Front desk only
    #[serde(default)]
    pub unassigned: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct AppointmentStats {
    pub total: usize,
    pub pending: usize,
    pub scheduled: usize,
    pub attended: usize,
    pub cancelled: usize,
    pub unassigned: usize,
}

impl AppointmentStats {
    pub fn from_appointments(appointments: &[Appointment]) -> Self {
        let mut stats = AppointmentStats {
            total: appointments.len(),
            ..Self::default()
        };
        for appointment in appointments {
            match appointment.status {
                AppointmentStatus::Pending => stats.pending += 1,
                AppointmentStatus::Scheduled => stats.scheduled += 1,
                AppointmentStatus::Attended => stats.attended += 1,
                AppointmentStatus::Cancelled => stats.cancelled += 1,
            }
            if appointment.vet_id.is_none() {
                stats.unassigned += 1;
            }
        }
        stats
    }
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct AppointmentBoard {
    /// Confirmed from now on, soonest first
    pub upcoming: Vec<Appointment>,
    /// Without a confirmed time, by requested date then patient name
    pub pending: Vec<Appointment>,
    /// Confirmed in the past, most recent first
    pub past: Vec<Appointment>,
    pub stats: AppointmentStats,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct PendingItem {
    pub appointment: Appointment,
    pub available_vets: Vec<User>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct PendingQueue {
    pub items: Vec<PendingItem>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct AppointmentDetail {
    pub appointment: Appointment,
    pub record: Option<MedicalRecord>,
    /// The record was written for this appointment rather than matched by day
    pub direct_report: bool,
    pub medications: Vec<MedicationUse>,
    pub owner_phone: String,
    pub whatsapp_message: String,
    pub whatsapp_url: String,
}

#[async_trait]
pub trait AppointmentServiceTrait: Send + Sync {
    async fn request(&self, actor: &Actor, request: RequestAppointment) -> Result<Appointment, ServiceError>;

    async fn schedule(&self, actor: &Actor, request: ScheduleAppointment) -> Result<Appointment, ServiceError>;

    async fn assign_vet(
        &self,
        actor: &Actor,
        appointment_id: i64,
        request: AssignVetRequest,
    ) -> Result<Appointment, ServiceError>;

    async fn apply_action(
        &self,
        actor: &Actor,
        appointment_id: i64,
        action: AppointmentAction,
    ) -> Result<ActionOutcome, ServiceError>;

    async fn list(&self, actor: &Actor, query: AppointmentQuery) -> Result<AppointmentBoard, ServiceError>;

    async fn pending_queue(&self, actor: &Actor) -> Result<PendingQueue, ServiceError>;

    async fn detail(&self, actor: &Actor, appointment_id: i64) -> Result<AppointmentDetail, ServiceError>;
}

pub struct AppointmentService {
    appointments: AppointmentRepository,
    branches: BranchRepository,
    owners: OwnerRepository,
    patients: PatientRepository,
    records: RecordRepository,
    users: UserRepository,
}

/// Whether a branch scope covers `branch_id`
pub(crate) fn scope_covers(scope: BranchScope, branch_id: i64) -> bool {
    match scope {
        BranchScope::All => true,
        BranchScope::Branch(id) => id == branch_id,
        BranchScope::Nothing => false,
    }
}

/// Split appointments into upcoming, pending-without-time and past
pub(crate) fn group_appointments(
    appointments: &[Appointment],
    now: DateTime<Utc>,
) -> (Vec<Appointment>, Vec<Appointment>, Vec<Appointment>) {
    let mut upcoming = Vec::new();
    let mut pending = Vec::new();
    let mut past = Vec::new();
    for appointment in appointments {
        match appointment.scheduled_at {
            Some(at) if at >= now => upcoming.push(appointment.clone()),
            Some(_) => past.push(appointment.clone()),
            None => pending.push(appointment.clone()),
        }
    }
    upcoming.sort_by_key(|a| a.scheduled_at);
    pending.sort_by(|a, b| {
        a.requested_date
            .cmp(&b.requested_date)
            .then_with(|| a.patient_name.cmp(&b.patient_name))
    });
    past.sort_by(|a, b| b.scheduled_at.cmp(&a.scheduled_at));
    (upcoming, pending, past)
}

pub(crate) fn parse_filter_date(raw: Option<&str>, label: &str, warnings: &mut Vec<String>) -> Option<NaiveDate> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        Ok(date) => Some(date),
        Err(_) => {
            warnings.push(format!("The {} date '{}' is not valid and was ignored", label, raw));
            None
        }
    }
}

pub(crate) fn parse_filter<T: std::str::FromStr>(raw: Option<&str>, label: &str, warnings: &mut Vec<String>) -> Option<T> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warnings.push(format!("Unknown {} '{}' was ignored", label, raw));
            None
        }
    }
}

pub(crate) fn whatsapp_message(appointment: &Appointment) -> String {
    format!(
        "Hi {}, greetings from {}. Can we arrange the time for {}'s appointment on {}?",
        appointment.owner_name,
        CLINIC_NAME,
        appointment.patient_name,
        appointment.requested_date.format("%d/%m/%Y")
    )
}

impl AppointmentService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            appointments: AppointmentRepository::new(pool.clone()),
            branches: BranchRepository::new(pool.clone()),
            owners: OwnerRepository::new(pool.clone()),
            patients: PatientRepository::new(pool.clone()),
            records: RecordRepository::new(pool.clone()),
            users: UserRepository::new(pool),
        }
    }

    /// Appointment the front desk may act on; outside the scope it does not exist
    fn staff_appointment(&self, actor: &Actor, appointment_id: i64) -> Result<Appointment, ServiceError> {
        self.appointments
            .get(appointment_id)?
            .filter(|a| scope_covers(actor.scope(), a.branch_id))
            .ok_or_else(|| ServiceError::not_found(format!("Appointment {} not found", appointment_id)))
    }

    /// Active vet of `branch_id`, else a validation error
    fn active_vet(&self, vet_id: i64, branch_id: i64) -> Result<User, ServiceError> {
        self.users
            .list_vets(BranchScope::Branch(branch_id), true)?
            .into_iter()
            .find(|vet| vet.id == vet_id)
            .ok_or_else(|| ServiceError::validation("The vet is not an active vet of the appointment's branch"))
    }
}

#[async_trait]
impl AppointmentServiceTrait for AppointmentService {
    async fn request(&self, actor: &Actor, request: RequestAppointment) -> Result<Appointment, ServiceError> {
        actor.require_any(&[Role::Owner])?;
        let owner = self
            .owners
            .get_by_user(actor.user_id)?
            .ok_or_else(|| ServiceError::not_found("You have no owner profile"))?;
        let patient = self
            .patients
            .get(request.patient_id)?
            .filter(|p| p.owner_id == owner.id)
            .ok_or_else(|| ServiceError::not_found("You have no pet with that id"))?;
        let branch = self
            .branches
            .get(request.branch_id)?
            .ok_or_else(|| ServiceError::validation("Choose a valid branch for the appointment"))?;
        if request.requested_date < Utc::now().date_naive() {
            return Err(ServiceError::validation("The selected day has already passed"));
        }

        let appointment = self.appointments.create(&NewAppointment {
            patient_id: patient.id,
            branch_id: branch.id,
            vet_id: None,
            requested_date: request.requested_date,
            scheduled_at: None,
            kind: request.kind.unwrap_or(AppointmentKind::Consultation),
            status: AppointmentStatus::Pending,
            notes: request.notes.trim().to_string(),
        })?;
        info!("Owner {} requested appointment {} for {}", owner.id, appointment.id, patient.name);
        Ok(appointment)
    }

    async fn schedule(&self, actor: &Actor, request: ScheduleAppointment) -> Result<Appointment, ServiceError> {
        actor.require_any(&[Role::Admin])?;
        let patient = self
            .patients
            .get(request.patient_id)?
            .ok_or_else(|| ServiceError::not_found(format!("Patient {} not found", request.patient_id)))?;

        let branch_id = if actor.is_superuser {
            let branch_id = request
                .branch_id
                .ok_or_else(|| ServiceError::validation("Choose a valid branch for the appointment"))?;
            self.branches
                .get(branch_id)?
                .ok_or_else(|| ServiceError::validation("Choose a valid branch for the appointment"))?
                .id
        } else {
            match actor.branch_id {
                Some(own) if request.branch_id.map_or(true, |b| b == own) => own,
                _ => {
                    warn!("Admin {} tried to schedule in branch {:?}", actor.username, request.branch_id);
                    return Err(ServiceError::forbidden("You cannot schedule appointments in that branch"));
                }
            }
        };

        let vet = self.active_vet(request.vet_id, branch_id)?;
        if request.scheduled_at < now_utc() {
            return Err(ServiceError::validation("An appointment cannot be scheduled in the past"));
        }

        let appointment = self.appointments.create(&NewAppointment {
            patient_id: patient.id,
            branch_id,
            vet_id: Some(vet.id),
            requested_date: request.scheduled_at.date_naive(),
            scheduled_at: Some(request.scheduled_at),
            kind: request.kind.unwrap_or(AppointmentKind::Consultation),
            status: AppointmentStatus::Scheduled,
            notes: request.notes.trim().to_string(),
        })?;
        info!(
            "Admin {} scheduled appointment {} for {} with {}",
            actor.username,
            appointment.id,
            patient.name,
            vet.display_name()
        );
        Ok(appointment)
    }

    async fn assign_vet(
        &self,
        actor: &Actor,
        appointment_id: i64,
        request: AssignVetRequest,
    ) -> Result<Appointment, ServiceError> {
        actor.require_any(&[Role::Admin, Role::AdminOp])?;
        let appointment = self.staff_appointment(actor, appointment_id)?;
        if !matches!(appointment.status, AppointmentStatus::Pending | AppointmentStatus::Scheduled) {
            return Err(ServiceError::validation(format!(
                "A {} appointment cannot be assigned",
                appointment.status
            )));
        }
        let vet = self.active_vet(request.vet_id, appointment.branch_id)?;
        if request.scheduled_at < now_utc() {
            return Err(ServiceError::validation("The confirmed time cannot be in the past"));
        }

        let updated = self.appointments.assign(appointment.id, vet.id, request.scheduled_at)?;
        info!("{} assigned {} to appointment {}", actor.username, vet.display_name(), updated.id);
        Ok(updated)
    }

    async fn apply_action(
        &self,
        actor: &Actor,
        appointment_id: i64,
        action: AppointmentAction,
    ) -> Result<ActionOutcome, ServiceError> {
        actor.require_any(&[Role::Admin, Role::AdminOp])?;
        let appointment = self.staff_appointment(actor, appointment_id)?;

        let outcome = match action {
            AppointmentAction::Cancel if appointment.status == AppointmentStatus::Cancelled => ActionOutcome {
                appointment,
                changed: false,
                message: "The appointment was already cancelled".to_string(),
            },
            AppointmentAction::Cancel => ActionOutcome {
                appointment: self
                    .appointments
                    .set_status(appointment.id, AppointmentStatus::Cancelled, None)?,
                changed: true,
                message: "Appointment cancelled".to_string(),
            },
            AppointmentAction::MarkAttended if appointment.status == AppointmentStatus::Attended => ActionOutcome {
                appointment,
                changed: false,
                message: "The appointment was already attended".to_string(),
            },
            AppointmentAction::MarkAttended => {
                let time = appointment.scheduled_at.is_none().then(now_utc);
                ActionOutcome {
                    appointment: self
                        .appointments
                        .set_status(appointment.id, AppointmentStatus::Attended, time)?,
                    changed: true,
                    message: "Appointment marked as attended".to_string(),
                }
            }
            AppointmentAction::Reopen => ActionOutcome {
                appointment: self.appointments.reopen(appointment.id)?,
                changed: true,
                message: "Appointment returned to the pending queue".to_string(),
            },
        };
        if outcome.changed {
            info!("{} applied {:?} to appointment {}", actor.username, action, appointment_id);
        }
        Ok(outcome)
    }

    async fn list(&self, actor: &Actor, query: AppointmentQuery) -> Result<AppointmentBoard, ServiceError> {
        let mut warnings = Vec::new();
        let mut filter = AppointmentFilter {
            status: parse_filter(query.status.as_deref(), "status", &mut warnings),
            search: query.q.clone().filter(|q| !q.trim().is_empty()),
            requested_from: parse_filter_date(query.from.as_deref(), "from", &mut warnings),
            requested_to: parse_filter_date(query.to.as_deref(), "to", &mut warnings),
            ..AppointmentFilter::default()
        };

        let appointments = if actor.has_any_role(&[Role::Admin, Role::AdminOp]) {
            filter.scope = actor.scope();
            filter.vet_id = query.vet_id;
            filter.owner_id = query.owner_id;
            filter.kind = parse_filter(query.kind.as_deref(), "kind", &mut warnings);
            filter.unassigned = query.unassigned;
            self.appointments.list(&filter)?
        } else if actor.has_role(Role::Vet) {
            filter.vet_id = Some(actor.user_id);
            self.appointments.list(&filter)?
        } else {
            match self.owners.get_by_user(actor.user_id)? {
                Some(owner) => {
                    filter.owner_id = Some(owner.id);
                    self.appointments.list(&filter)?
                }
                None => {
                    warnings.push("Complete your owner profile to start requesting appointments".to_string());
                    Vec::new()
                }
            }
        };

        let (upcoming, pending, past) = group_appointments(&appointments, now_utc());
        Ok(AppointmentBoard {
            stats: AppointmentStats::from_appointments(&appointments),
            upcoming,
            pending,
            past,
            warnings,
        })
    }

    async fn pending_queue(&self, actor: &Actor) -> Result<PendingQueue, ServiceError> {
        actor.require_any(&[Role::Admin, Role::AdminOp])?;
        let mut warnings = Vec::new();
        if !actor.is_superuser && actor.branch_id.is_none() {
            warnings.push("Assign a branch to your profile to coordinate pending appointments".to_string());
        }
        let scope = actor.scope();

        let mut vets_by_branch: HashMap<i64, Vec<User>> = HashMap::new();
        for vet in self.users.list_vets(scope, true)? {
            if let Some(branch_id) = vet.branch_id {
                vets_by_branch.entry(branch_id).or_default().push(vet);
            }
        }

        let mut pending = self.appointments.list(&AppointmentFilter {
            status: Some(AppointmentStatus::Pending),
            ..AppointmentFilter::scoped(scope)
        })?;
        pending.sort_by(|a, b| {
            a.requested_date
                .cmp(&b.requested_date)
                .then_with(|| a.scheduled_at.cmp(&b.scheduled_at))
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(PendingQueue {
            items: pending
                .into_iter()
                .map(|appointment| PendingItem {
                    available_vets: vets_by_branch.get(&appointment.branch_id).cloned().unwrap_or_default(),
                    appointment,
                })
                .collect(),
            warnings,
        })
    }

    async fn detail(&self, actor: &Actor, appointment_id: i64) -> Result<AppointmentDetail, ServiceError> {
        let not_found = || ServiceError::not_found(format!("Appointment {} not found", appointment_id));
        let appointment = self.appointments.get(appointment_id)?.ok_or_else(not_found)?;

        let allowed = if actor.has_any_role(&[Role::Admin, Role::AdminOp]) {
            scope_covers(actor.scope(), appointment.branch_id)
        } else if actor.has_role(Role::Vet) {
            actor.branch_id == Some(appointment.branch_id)
        } else {
            actor.user_id == appointment.owner_user_id
        };
        if !allowed {
            warn!("User {} may not view appointment {}", actor.username, appointment_id);
            return Err(ServiceError::forbidden("You cannot view this appointment"));
        }

        let (record, direct_report) = match self.records.get_by_appointment(appointment.id)? {
            Some(record) => (Some(record), true),
            None => {
                let day = crate::services::patient::appointment_day(&appointment);
                (self.records.same_day_unlinked(appointment.patient_id, day)?, false)
            }
        };

        let message = whatsapp_message(&appointment);
        Ok(AppointmentDetail {
            medications: self.appointments.medication_uses(appointment.id)?,
            owner_phone: phone_digits(&appointment.owner_phone),
            whatsapp_url: whatsapp_url(&appointment.owner_phone, Some(&message)),
            whatsapp_message: message,
            record,
            direct_report,
            appointment,
        })
    }
}

pub fn create_default_appointment_service(pool: DatabasePool) -> Arc<dyn AppointmentServiceTrait> {
    Arc::new(AppointmentService::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{actor_for, add_user, superuser, Fixture};
    use chrono::Duration;

    fn tomorrow() -> NaiveDate {
        Utc::now().date_naive() + Duration::days(1)
    }

    fn owner_request(fixture: &Fixture, date: NaiveDate) -> RequestAppointment {
        RequestAppointment {
            patient_id: fixture.patient_id,
            branch_id: fixture.branch_id,
            requested_date: date,
            kind: None,
            notes: "Cojea".to_string(),
        }
    }

    #[tokio::test]
    async fn test_owner_request_is_pending() {
        let fixture = Fixture::new();
        let service = AppointmentService::new(fixture.pool.clone());
        let owner = actor_for(&fixture.pool, fixture.owner_user_id);

        let appointment = service.request(&owner, owner_request(&fixture, tomorrow())).await.unwrap();
        assert_eq!(appointment.status, AppointmentStatus::Pending);
        assert!(appointment.vet_id.is_none());
        assert!(appointment.scheduled_at.is_none());

        let yesterday = Utc::now().date_naive() - Duration::days(1);
        let late = service.request(&owner, owner_request(&fixture, yesterday)).await;
        assert!(matches!(late, Err(ServiceError::Validation(_))));

        let stranger = add_user(&fixture.pool, "stranger", Role::Owner, None);
        let foreign = service
            .request(&actor_for(&fixture.pool, stranger.id), owner_request(&fixture, tomorrow()))
            .await;
        assert!(matches!(foreign, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_schedule_respects_admin_branch() {
        let fixture = Fixture::new();
        let service = AppointmentService::new(fixture.pool.clone());
        let admin = add_user(&fixture.pool, "boss", Role::Admin, Some(fixture.branch_id));
        let admin = actor_for(&fixture.pool, admin.id);
        let at = now_utc() + Duration::days(2);

        let request = ScheduleAppointment {
            patient_id: fixture.patient_id,
            branch_id: None,
            vet_id: fixture.vet_id,
            scheduled_at: at,
            kind: Some(AppointmentKind::Surgery),
            notes: String::new(),
        };
        let scheduled = service.schedule(&admin, request.clone()).await.unwrap();
        assert_eq!(scheduled.status, AppointmentStatus::Scheduled);
        assert_eq!(scheduled.requested_date, at.date_naive());
        assert_eq!(scheduled.branch_id, fixture.branch_id);

        let mut elsewhere = request.clone();
        elsewhere.branch_id = Some(fixture.other_branch_id);
        assert!(matches!(service.schedule(&admin, elsewhere).await, Err(ServiceError::Forbidden(_))));

        let mut wrong_branch_vet = request.clone();
        wrong_branch_vet.branch_id = Some(fixture.other_branch_id);
        assert!(matches!(
            service.schedule(&superuser(), wrong_branch_vet).await,
            Err(ServiceError::Validation(_))
        ));

        let mut past = request;
        past.scheduled_at = now_utc() - Duration::hours(1);
        assert!(matches!(service.schedule(&admin, past).await, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_assign_and_actions() {
        let fixture = Fixture::new();
        let service = AppointmentService::new(fixture.pool.clone());
        let owner = actor_for(&fixture.pool, fixture.owner_user_id);
        let desk = add_user(&fixture.pool, "desk", Role::AdminOp, Some(fixture.branch_id));
        let desk = actor_for(&fixture.pool, desk.id);
        let requested = service.request(&owner, owner_request(&fixture, tomorrow())).await.unwrap();

        let queue = service.pending_queue(&desk).await.unwrap();
        assert_eq!(queue.items.len(), 1);
        assert_eq!(queue.items[0].available_vets.len(), 1);

        let at = now_utc() + Duration::days(3);
        let assigned = service
            .assign_vet(&desk, requested.id, AssignVetRequest { vet_id: fixture.vet_id, scheduled_at: at })
            .await
            .unwrap();
        assert_eq!(assigned.status, AppointmentStatus::Scheduled);
        assert_eq!(assigned.vet_id, Some(fixture.vet_id));
        assert_eq!(assigned.requested_date, at.date_naive());

        let cancelled = service.apply_action(&desk, requested.id, AppointmentAction::Cancel).await.unwrap();
        assert!(cancelled.changed);
        let again = service.apply_action(&desk, requested.id, AppointmentAction::Cancel).await.unwrap();
        assert!(!again.changed);

        let reopened = service.apply_action(&desk, requested.id, AppointmentAction::Reopen).await.unwrap();
        assert_eq!(reopened.appointment.status, AppointmentStatus::Pending);
        assert!(reopened.appointment.vet_id.is_none());

        let attended = service
            .apply_action(&desk, requested.id, AppointmentAction::MarkAttended)
            .await
            .unwrap();
        assert_eq!(attended.appointment.status, AppointmentStatus::Attended);
        assert!(attended.appointment.scheduled_at.is_some());

        let norte = add_user(&fixture.pool, "norte", Role::AdminOp, Some(fixture.other_branch_id));
        let out_of_scope = service
            .apply_action(&actor_for(&fixture.pool, norte.id), requested.id, AppointmentAction::Cancel)
            .await;
        assert!(matches!(out_of_scope, Err(ServiceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_unavailable_vet_cannot_take_appointments() {
        let fixture = Fixture::new();
        let service = AppointmentService::new(fixture.pool.clone());
        let owner = actor_for(&fixture.pool, fixture.owner_user_id);
        let admin = add_user(&fixture.pool, "boss", Role::Admin, Some(fixture.branch_id));
        let admin = actor_for(&fixture.pool, admin.id);
        let requested = service.request(&owner, owner_request(&fixture, tomorrow())).await.unwrap();
        fixture
            .pool
            .get()
            .unwrap()
            .execute("UPDATE users SET available = 0 WHERE id = ?1", [fixture.vet_id])
            .unwrap();
        let at = now_utc() + Duration::days(2);

        let queue = service.pending_queue(&admin).await.unwrap();
        assert!(queue.items[0].available_vets.is_empty());

        let assigned = service
            .assign_vet(&admin, requested.id, AssignVetRequest { vet_id: fixture.vet_id, scheduled_at: at })
            .await;
        assert!(matches!(assigned, Err(ServiceError::Validation(_))));

        let scheduled = service
            .schedule(
                &admin,
                ScheduleAppointment {
                    patient_id: fixture.patient_id,
                    branch_id: None,
                    vet_id: fixture.vet_id,
                    scheduled_at: at,
                    kind: None,
                    notes: String::new(),
                },
            )
            .await;
        assert!(matches!(scheduled, Err(ServiceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_board_groups_and_warns() {
        let fixture = Fixture::new();
        let service = AppointmentService::new(fixture.pool.clone());
        let owner = actor_for(&fixture.pool, fixture.owner_user_id);
        service.request(&owner, owner_request(&fixture, tomorrow())).await.unwrap();
        service
            .schedule(
                &superuser(),
                ScheduleAppointment {
                    patient_id: fixture.patient_id,
                    branch_id: Some(fixture.branch_id),
                    vet_id: fixture.vet_id,
                    scheduled_at: now_utc() + Duration::days(5),
                    kind: None,
                    notes: String::new(),
                },
            )
            .await
            .unwrap();

        let board = service
            .list(
                &owner,
                AppointmentQuery {
                    from: Some("not-a-date".to_string()),
                    status: Some("bogus".to_string()),
                    ..AppointmentQuery::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(board.warnings.len(), 2);
        assert_eq!(board.upcoming.len(), 1);
        assert_eq!(board.pending.len(), 1);
        assert!(board.past.is_empty());
        assert_eq!(board.stats.total, 2);
        assert_eq!(board.stats.unassigned, 1);

        let vet_board = service
            .list(&actor_for(&fixture.pool, fixture.vet_id), AppointmentQuery::default())
            .await
            .unwrap();
        assert_eq!(vet_board.stats.total, 1);

        let no_profile = Actor {
            user_id: 999,
            username: "ghost".to_string(),
            role: Role::Owner,
            branch_id: None,
            is_superuser: false,
        };
        let empty = service.list(&no_profile, AppointmentQuery::default()).await.unwrap();
        assert_eq!(empty.stats.total, 0);
        assert_eq!(empty.warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_detail_visibility_and_whatsapp() {
        let fixture = Fixture::new();
        let service = AppointmentService::new(fixture.pool.clone());
        let owner = actor_for(&fixture.pool, fixture.owner_user_id);
        let appointment = service.request(&owner, owner_request(&fixture, tomorrow())).await.unwrap();

        let detail = service.detail(&owner, appointment.id).await.unwrap();
        assert_eq!(detail.owner_phone, "3515550101");
        assert!(detail.whatsapp_url.starts_with("https://wa.me/3515550101?text="));
        assert!(detail.whatsapp_message.contains("Luna"));
        assert!(detail.record.is_none());

        let vet = actor_for(&fixture.pool, fixture.vet_id);
        assert!(service.detail(&vet, appointment.id).await.is_ok());

        let other_vet = add_user(&fixture.pool, "vet_norte", Role::Vet, Some(fixture.other_branch_id));
        let denied = service.detail(&actor_for(&fixture.pool, other_vet.id), appointment.id).await;
        assert!(matches!(denied, Err(ServiceError::Forbidden(_))));
    }
}
