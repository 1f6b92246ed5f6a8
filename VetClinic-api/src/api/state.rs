use std::sync::Arc;

use vet_clinic_domain::auth::{create_default_auth_service, AuthConfig, AuthServiceTrait};
use vet_clinic_domain::database::DatabasePool;
use vet_clinic_domain::services::{
    create_default_analytics_service, create_default_appointment_service,
    create_default_branch_service, create_default_dashboard_service,
    create_default_inventory_service, create_default_owner_service, create_default_patient_service,
    create_default_record_service, create_default_report_service, create_default_staff_service,
    create_default_store_service, create_default_vaccine_service, create_default_visit_service,
    AnalyticsServiceTrait, AppointmentServiceTrait, BranchServiceTrait, DashboardServiceTrait,
    InventoryServiceTrait, OwnerServiceTrait, PatientServiceTrait, RecordServiceTrait,
    ReportServiceTrait, StaffServiceTrait, StoreServiceTrait, VaccineServiceTrait,
    VisitServiceTrait,
};

/// Services shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub auth: Arc<dyn AuthServiceTrait>,
    pub analytics: Arc<dyn AnalyticsServiceTrait>,
    pub appointments: Arc<dyn AppointmentServiceTrait>,
    pub branches: Arc<dyn BranchServiceTrait>,
    pub dashboard: Arc<dyn DashboardServiceTrait>,
    pub inventory: Arc<dyn InventoryServiceTrait>,
    pub owners: Arc<dyn OwnerServiceTrait>,
    pub patients: Arc<dyn PatientServiceTrait>,
    pub records: Arc<dyn RecordServiceTrait>,
    pub reports: Arc<dyn ReportServiceTrait>,
    pub staff: Arc<dyn StaffServiceTrait>,
    pub store: Arc<dyn StoreServiceTrait>,
    pub vaccines: Arc<dyn VaccineServiceTrait>,
    pub visits: Arc<dyn VisitServiceTrait>,
}

impl AppState {
    /// Wire the default services over one connection pool
    pub fn new(pool: DatabasePool, auth_config: AuthConfig) -> Self {
        Self {
            auth: create_default_auth_service(pool.clone(), auth_config),
            analytics: create_default_analytics_service(pool.clone()),
            appointments: create_default_appointment_service(pool.clone()),
            branches: create_default_branch_service(pool.clone()),
            dashboard: create_default_dashboard_service(pool.clone()),
            inventory: create_default_inventory_service(pool.clone()),
            owners: create_default_owner_service(pool.clone()),
            patients: create_default_patient_service(pool.clone()),
            records: create_default_record_service(pool.clone()),
            reports: create_default_report_service(pool.clone()),
            staff: create_default_staff_service(pool.clone()),
            store: create_default_store_service(pool.clone()),
            vaccines: create_default_vaccine_service(pool.clone()),
            visits: create_default_visit_service(pool),
        }
    }
}
