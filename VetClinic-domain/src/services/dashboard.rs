//! Role dashboards and the public landing summary

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{
    now_utc, Appointment, AppointmentFilter, AppointmentStatus, Branch, BranchScope, MedicalRecord,
    Patient, Product, ProductFilter, RecordFilter, Role,
};
use vet_clinic_data::repository::{
    AppointmentRepository, BranchRepository, MedicationRepository, OwnerRepository,
    PatientRepository, ProductRepository, RecordRepository, UserRepository,
};

use crate::access::Actor;
use crate::error::ServiceError;
use crate::services::appointment::{group_appointments, AppointmentStats};
use crate::services::inventory::InventorySummary;

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct AdminDashboard {
    pub total_users: i64,
    pub total_patients: usize,
    pub total_appointments: usize,
    pub total_records: usize,
    pub total_products: usize,
    pub appointment_status: AppointmentStats,
    /// 20 latest by requested date
    pub latest_appointments: Vec<Appointment>,
    /// First 20 by name
    pub patients: Vec<Patient>,
    pub recent_products: Vec<Product>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct VetDashboard {
    pub branch: Option<Branch>,
    pub appointments: Vec<Appointment>,
    pub records: Vec<MedicalRecord>,
    pub inventory: Option<InventorySummary>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct OwnerStats {
    pub pets: usize,
    /// Upcoming plus pending without a time
    pub active_appointments: usize,
    pub reports: usize,
    /// Distinct vets across the owner's appointments
    pub professionals: usize,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct OwnerDashboard {
    pub profile_complete: bool,
    pub pets: Vec<Patient>,
    pub appointments: Vec<Appointment>,
    pub records: Vec<MedicalRecord>,
    pub next_appointment: Option<Appointment>,
    pub upcoming: Vec<Appointment>,
    pub recent: Vec<Appointment>,
    pub pending: Vec<Appointment>,
    pub recent_records: Vec<MedicalRecord>,
    pub stats: OwnerStats,
    pub suggested_products: Vec<Product>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct FrontDeskDashboard {
    pub appointments: Vec<Appointment>,
    pub patients: Vec<Patient>,
}

/// Dashboard of the caller; exactly one section is filled, matching `role`
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Dashboard {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub admin: Option<AdminDashboard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vet: Option<VetDashboard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<OwnerDashboard>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub front_desk: Option<FrontDeskDashboard>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct NextAppointment {
    pub appointment: Appointment,
    pub vet_name: String,
    pub owner_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Landing {
    pub available_products: i64,
    pub featured_products: Vec<Product>,
    pub owners: i64,
    pub patients: i64,
    pub vets: usize,
    pub scheduled_appointments: usize,
    pub next_appointment: Option<NextAppointment>,
}

#[async_trait]
pub trait DashboardServiceTrait: Send + Sync {
    async fn dashboard(&self, actor: &Actor) -> Result<Dashboard, ServiceError>;

    async fn landing(&self) -> Result<Landing, ServiceError>;
}

pub struct DashboardService {
    appointments: AppointmentRepository,
    branches: BranchRepository,
    medications: MedicationRepository,
    owners: OwnerRepository,
    patients: PatientRepository,
    products: ProductRepository,
    records: RecordRepository,
    users: UserRepository,
}

/// Newest requested date first, then newest confirmed time
fn latest_first(appointments: &mut [Appointment]) {
    appointments.sort_by(|a, b| {
        b.requested_date
            .cmp(&a.requested_date)
            .then_with(|| b.scheduled_at.cmp(&a.scheduled_at))
    });
}

const BRANCH_WARNING: &str = "Assign a branch to your profile to start managing the operation";

impl DashboardService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            appointments: AppointmentRepository::new(pool.clone()),
            branches: BranchRepository::new(pool.clone()),
            medications: MedicationRepository::new(pool.clone()),
            owners: OwnerRepository::new(pool.clone()),
            patients: PatientRepository::new(pool.clone()),
            products: ProductRepository::new(pool.clone()),
            records: RecordRepository::new(pool.clone()),
            users: UserRepository::new(pool),
        }
    }

    fn admin(&self, actor: &Actor) -> Result<AdminDashboard, ServiceError> {
        let scope = actor.scope();
        let mut appointments = self.appointments.list(&AppointmentFilter::scoped(scope))?;
        latest_first(&mut appointments);
        let patients = self.patients.list(scope)?;
        let records = self.records.list(&RecordFilter {
            scope,
            ..RecordFilter::default()
        })?;

        Ok(AdminDashboard {
            total_users: self.users.count_in_scope(scope)?,
            total_patients: patients.len(),
            total_appointments: appointments.len(),
            total_records: records.len(),
            total_products: self.products.list(&ProductFilter::default())?.len(),
            appointment_status: AppointmentStats::from_appointments(&appointments),
            latest_appointments: appointments.into_iter().take(20).collect(),
            patients: patients.into_iter().take(20).collect(),
            recent_products: self.products.list(&ProductFilter {
                newest_first: true,
                limit: Some(6),
                ..ProductFilter::default()
            })?,
        })
    }

    fn vet(&self, actor: &Actor) -> Result<VetDashboard, ServiceError> {
        let branch = match actor.branch_id {
            Some(id) => self.branches.get(id)?,
            None => None,
        };
        let mut appointments = self.appointments.list(&AppointmentFilter {
            vet_id: Some(actor.user_id),
            ..AppointmentFilter::default()
        })?;
        appointments.sort_by(|a, b| {
            b.scheduled_at
                .cmp(&a.scheduled_at)
                .then_with(|| b.requested_date.cmp(&a.requested_date))
        });
        let inventory = match &branch {
            Some(branch) => Some(InventorySummary::from_medications(
                &self.medications.list_by_branch(branch.id)?,
            )),
            None => None,
        };

        Ok(VetDashboard {
            records: self.records.list(&RecordFilter {
                vet_id: Some(actor.user_id),
                ..RecordFilter::default()
            })?,
            branch,
            appointments,
            inventory,
        })
    }

    fn owner(&self, actor: &Actor) -> Result<OwnerDashboard, ServiceError> {
        let suggested_products = self.products.list(&ProductFilter {
            available_only: true,
            newest_first: true,
            limit: Some(3),
            ..ProductFilter::default()
        })?;
        let Some(owner) = self.owners.get_by_user(actor.user_id)? else {
            return Ok(OwnerDashboard {
                profile_complete: false,
                pets: Vec::new(),
                appointments: Vec::new(),
                records: Vec::new(),
                next_appointment: None,
                upcoming: Vec::new(),
                recent: Vec::new(),
                pending: Vec::new(),
                recent_records: Vec::new(),
                stats: OwnerStats::default(),
                suggested_products,
            });
        };

        let pets = self.patients.list_by_owner(owner.id)?;
        let mut appointments = self.appointments.list(&AppointmentFilter {
            owner_id: Some(owner.id),
            ..AppointmentFilter::default()
        })?;
        latest_first(&mut appointments);
        let records = self.records.list(&RecordFilter {
            owner_id: Some(owner.id),
            ..RecordFilter::default()
        })?;

        let (upcoming, pending, past) = group_appointments(&appointments, now_utc());
        let professionals = appointments
            .iter()
            .filter_map(|a| a.vet_id)
            .collect::<HashSet<_>>()
            .len();
        let stats = OwnerStats {
            pets: pets.len(),
            active_appointments: upcoming.len() + pending.len(),
            reports: records.len(),
            professionals,
        };

        Ok(OwnerDashboard {
            profile_complete: true,
            next_appointment: upcoming.first().cloned(),
            upcoming: upcoming.into_iter().take(5).collect(),
            recent: past.into_iter().take(5).collect(),
            pending,
            recent_records: records.iter().take(5).cloned().collect(),
            pets,
            appointments,
            records,
            stats,
            suggested_products,
        })
    }

    fn front_desk(&self, actor: &Actor) -> Result<FrontDeskDashboard, ServiceError> {
        let scope = actor.scope();
        let mut appointments = self.appointments.list(&AppointmentFilter::scoped(scope))?;
        latest_first(&mut appointments);
        Ok(FrontDeskDashboard {
            appointments,
            patients: self.patients.list(scope)?,
        })
    }
}

#[async_trait]
impl DashboardServiceTrait for DashboardService {
    async fn dashboard(&self, actor: &Actor) -> Result<Dashboard, ServiceError> {
        debug!("Building dashboard for {} ({})", actor.username, actor.role);
        let mut dashboard = Dashboard {
            role: actor.role,
            admin: None,
            vet: None,
            owner: None,
            front_desk: None,
            warnings: Vec::new(),
        };
        let missing_branch = !actor.is_superuser && actor.branch_id.is_none();

        if actor.has_role(Role::Admin) {
            dashboard.role = Role::Admin;
            if missing_branch {
                dashboard.warnings.push(BRANCH_WARNING.to_string());
            }
            dashboard.admin = Some(self.admin(actor)?);
        } else {
            match actor.role {
                Role::Vet => {
                    if missing_branch {
                        dashboard.warnings.push(
                            "Your profile has no branch yet. Ask an administrator to update it".to_string(),
                        );
                    }
                    dashboard.vet = Some(self.vet(actor)?);
                }
                Role::Owner => {
                    let owner = self.owner(actor)?;
                    if !owner.profile_complete {
                        dashboard.warnings.push(
                            "Your owner profile is not complete yet. Ask the front desk to register your details"
                                .to_string(),
                        );
                    }
                    dashboard.owner = Some(owner);
                }
                Role::AdminOp => {
                    if missing_branch {
                        dashboard.warnings.push(BRANCH_WARNING.to_string());
                    }
                    dashboard.front_desk = Some(self.front_desk(actor)?);
                }
                Role::Admin => {}
            }
        }
        Ok(dashboard)
    }

    async fn landing(&self) -> Result<Landing, ServiceError> {
        let scheduled = self.appointments.list(&AppointmentFilter {
            status: Some(AppointmentStatus::Scheduled),
            ..AppointmentFilter::default()
        })?;
        let now = now_utc();
        let next = scheduled
            .iter()
            .filter(|a| a.scheduled_at.map_or(false, |at| at >= now))
            .min_by_key(|a| a.scheduled_at)
            .cloned();

        Ok(Landing {
            available_products: self.products.count_available()?,
            featured_products: self.products.list(&ProductFilter {
                available_only: true,
                limit: Some(6),
                ..ProductFilter::default()
            })?,
            owners: self.owners.count()?,
            patients: self.patients.count()?,
            vets: self.users.list_vets(BranchScope::All, false)?.len(),
            scheduled_appointments: scheduled.iter().filter(|a| a.scheduled_at.is_some()).count(),
            next_appointment: next.map(|appointment| NextAppointment {
                vet_name: appointment.vet_name.clone().unwrap_or_default(),
                owner_name: appointment.owner_name.clone(),
                appointment,
            }),
        })
    }
}

pub fn create_default_dashboard_service(pool: DatabasePool) -> Arc<dyn DashboardServiceTrait> {
    Arc::new(DashboardService::new(pool))
}
