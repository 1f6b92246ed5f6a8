use utoipa::openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::handlers;

/// Configure Swagger UI endpoints
pub fn configure_swagger_routes() -> SwaggerUi {
    SwaggerUi::new("/api-docs").url("/api-docs/openapi.json", ApiDoc::openapi())
}

/// Registers the bearer scheme referenced by protected operations
struct BearerAuth;

impl Modify for BearerAuth {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer",
                SecurityScheme::Http(HttpBuilder::new().scheme(HttpAuthScheme::Bearer).bearer_format("JWT").build()),
            );
        }
    }
}

// API Documentation
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::dashboard::landing,
        handlers::dashboard::dashboard,
        handlers::branches::contact_directory,
        handlers::branches::list_branches,
        handlers::branches::get_branch,
        handlers::branches::create_branch,
        handlers::branches::update_branch,

        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::logout,
        handlers::auth::profile,
        handlers::auth::update_profile,
        handlers::users::list_users,
        handlers::users::create_user,
        handlers::users::update_user,
        handlers::users::vet_candidates,
        handlers::users::promote_vet,

        handlers::owners::search_owners,
        handlers::owners::create_owner,
        handlers::owners::get_owner,
        handlers::patients::list_patients,
        handlers::patients::create_patient,
        handlers::patients::get_patient,
        handlers::patients::transfer_patient,
        handlers::patients::register_record,
        handlers::patients::vaccine_calendar,
        handlers::patients::mark_vaccine,
        handlers::patients::unmark_vaccine,

        handlers::appointments::list_appointments,
        handlers::appointments::request_appointment,
        handlers::appointments::schedule_appointment,
        handlers::appointments::pending_queue,
        handlers::appointments::get_appointment,
        handlers::appointments::assign_vet,
        handlers::appointments::apply_action,
        handlers::appointments::complete_visit,
        handlers::records::records_overview,
        handlers::records::my_records,
        handlers::records::get_record,

        handlers::inventory::admin_inventory,
        handlers::inventory::vet_inventory,
        handlers::inventory::create_medication,
        handlers::inventory::update_medication,
        handlers::inventory::delete_medication,
        handlers::store::catalogue,
        handlers::store::product_detail,
        handlers::store::admin_products,
        handlers::store::create_product,
        handlers::store::update_product,

        handlers::analytics::admin_analytics,
        handlers::analytics::vet_team,
        handlers::analytics::indicators,
        handlers::reports::inventory_report,
        handlers::reports::owner_dossier
    ),
    components(
        schemas(
            // Shared entities
            crate::entities::ErrorResponse,
            crate::entities::MessageResponse,
            handlers::health::HealthResponse,
            handlers::health::ComponentStatus,
            handlers::health::ComponentHealthStatus,

            // Storage models
            vet_clinic_data::models::Role,
            vet_clinic_data::models::Species,
            vet_clinic_data::models::AppointmentStatus,
            vet_clinic_data::models::AppointmentKind,
            vet_clinic_data::models::MedicationCategory,
            vet_clinic_data::models::ProductCategory,
            vet_clinic_data::models::AgeUnit,
            vet_clinic_data::models::Branch,
            vet_clinic_data::models::BranchInput,
            vet_clinic_data::models::User,
            vet_clinic_data::models::Owner,
            vet_clinic_data::models::OwnerWithPets,
            vet_clinic_data::models::Patient,
            vet_clinic_data::models::Appointment,
            vet_clinic_data::models::MedicalRecord,
            vet_clinic_data::models::Medication,
            vet_clinic_data::models::Product,
            vet_clinic_data::models::Vaccine,
            vet_clinic_data::models::VaccineRecord,
            vet_clinic_data::repository::VisitOutcome,

            // Authentication
            vet_clinic_domain::access::Actor,
            vet_clinic_domain::auth::Claims,
            vet_clinic_domain::auth::LoginRequest,
            vet_clinic_domain::auth::RegisterRequest,
            vet_clinic_domain::auth::AuthResponse,
            vet_clinic_domain::auth::ProfileResponse,
            vet_clinic_domain::auth::ProfileUpdateRequest,

            // Service payloads
            vet_clinic_domain::services::branch::ContactDirectory,
            vet_clinic_domain::services::dashboard::Dashboard,
            vet_clinic_domain::services::dashboard::Landing,
            vet_clinic_domain::services::staff::PromoteVetRequest,
            vet_clinic_domain::services::staff::CreateUserRequest,
            vet_clinic_domain::services::staff::UpdateUserRequest,
            vet_clinic_domain::services::owner::CreateOwnerRequest,
            vet_clinic_domain::services::owner::OwnerDetail,
            vet_clinic_domain::services::patient::CreatePatientRequest,
            vet_clinic_domain::services::patient::PatientDetail,
            vet_clinic_domain::services::patient::TransferRequest,
            vet_clinic_domain::services::patient::TransferOutcome,
            vet_clinic_domain::services::vaccine::VaccineCalendar,
            vet_clinic_domain::services::vaccine::MarkVaccineRequest,
            vet_clinic_domain::services::vaccine::MarkOutcome,
            vet_clinic_domain::services::vaccine::UnmarkOutcome,
            vet_clinic_domain::services::appointment::AppointmentBoard,
            vet_clinic_domain::services::appointment::AppointmentDetail,
            vet_clinic_domain::services::appointment::RequestAppointment,
            vet_clinic_domain::services::appointment::ScheduleAppointment,
            vet_clinic_domain::services::appointment::PendingQueue,
            vet_clinic_domain::services::appointment::AssignVetRequest,
            vet_clinic_domain::services::appointment::ActionRequest,
            vet_clinic_domain::services::appointment::ActionOutcome,
            vet_clinic_domain::services::visit::CompleteVisitRequest,
            vet_clinic_domain::services::record::RecordOverview,
            vet_clinic_domain::services::record::RegisterRecordRequest,
            vet_clinic_domain::services::record::RegisteredRecord,
            vet_clinic_domain::services::inventory::InventoryView,
            vet_clinic_domain::services::inventory::MedicationRequest,
            vet_clinic_domain::services::store::Catalogue,
            vet_clinic_domain::services::store::ProductDetail,
            vet_clinic_domain::services::store::ProductRequest,
            vet_clinic_domain::services::analytics::AdminAnalytics,
            vet_clinic_domain::services::analytics::VetTeamReport,
            vet_clinic_domain::services::analytics::Indicators
        )
    ),
    modifiers(&BearerAuth),
    tags(
        (name = "health", description = "Health check endpoint"),
        (name = "auth", description = "Registration, sign in and profile"),
        (name = "dashboard", description = "Landing page and role dashboards"),
        (name = "branches", description = "Branches and the public contact directory"),
        (name = "users", description = "Staff administration"),
        (name = "owners", description = "Owners and their pets"),
        (name = "patients", description = "Patients, transfers and vaccination calendars"),
        (name = "appointments", description = "Appointment requests, scheduling and visits"),
        (name = "records", description = "Clinical records"),
        (name = "inventory", description = "Pharmacy stock"),
        (name = "store", description = "Public store and product administration"),
        (name = "analytics", description = "Operational indicators"),
        (name = "reports", description = "Spreadsheet exports")
    ),
    info(
        title = "VetClinic API",
        version = "0.1.0",
        description = "Multi-branch veterinary clinic management API",
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        ),
    ),
    servers(
        (url = "/", description = "Local development server")
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_doc_generation() {
        let openapi = ApiDoc::openapi();

        assert_eq!(openapi.info.title, "VetClinic API");
        assert_eq!(openapi.info.version, "0.1.0");

        let tags = openapi.tags.as_ref().unwrap();
        assert!(tags.iter().any(|tag| tag.name == "appointments"));
        assert!(tags.iter().any(|tag| tag.name == "reports"));

        let paths = &openapi.paths.paths;
        for path in [
            "/api/v1/health",
            "/api/v1/auth/login",
            "/api/v1/patients/{id}/vaccines/{vaccine_id}",
            "/api/v1/appointments/{id}/complete",
            "/api/v1/store/products/{id}",
            "/api/v1/reports/owners/{id}",
            "/api/v1/users/{id}",
        ] {
            assert!(paths.contains_key(path), "missing {}", path);
        }
    }

    #[test]
    fn test_bearer_scheme_is_registered() {
        let openapi = ApiDoc::openapi();
        let components = openapi.components.unwrap();
        assert!(components.security_schemes.contains_key("bearer"));
    }
}
