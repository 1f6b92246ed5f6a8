// Domain services
// Each service checks who is asking, applies the branch scope and talks to
// the repositories of the data crate.

pub mod analytics;
pub mod appointment;
pub mod branch;
pub mod contact;
pub mod dashboard;
pub mod inventory;
pub mod owner;
pub mod patient;
pub mod record;
pub mod reports;
pub mod staff;
pub mod store;
pub mod vaccine;
pub mod visit;

// Re-export service traits and factory functions
pub use analytics::{create_default_analytics_service, AnalyticsServiceTrait};
pub use appointment::{create_default_appointment_service, AppointmentServiceTrait};
pub use branch::{create_default_branch_service, BranchServiceTrait};
pub use dashboard::{create_default_dashboard_service, DashboardServiceTrait};
pub use inventory::{create_default_inventory_service, InventoryServiceTrait};
pub use owner::{create_default_owner_service, OwnerServiceTrait};
pub use patient::{create_default_patient_service, PatientServiceTrait};
pub use record::{create_default_record_service, RecordServiceTrait};
pub use reports::{create_default_report_service, ReportServiceTrait};
pub use staff::{create_default_staff_service, StaffServiceTrait};
pub use store::{create_default_store_service, StoreServiceTrait};
pub use vaccine::{create_default_vaccine_service, VaccineServiceTrait};
pub use visit::{create_default_visit_service, VisitServiceTrait};
