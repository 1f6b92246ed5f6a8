use std::sync::Arc;

use axum::{
    middleware,
    routing::{get, post, put},
    Extension, Router,
};
use tower_http::trace::TraceLayer;
use tracing::debug;

use vet_clinic_domain::auth::{auth_middleware, authorize, configure_auth};
use vet_clinic_domain::health::HealthServiceTrait;
use vet_clinic_domain::models::Role;

use crate::api::handlers::{
    analytics, appointments, auth, branches, dashboard, health, inventory, owners, patients, records, reports, store,
    users,
};
use crate::api::state::AppState;
use crate::openapi::configure_swagger_routes;

/// Create the application router
pub fn create_app(state: AppState, health_service: Arc<dyn HealthServiceTrait>) -> Router {
    debug!("Creating application router");

    // Routes that do not need a token
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/landing", get(dashboard::landing))
        .route("/contact", get(branches::contact_directory))
        .route("/store/products", get(store::catalogue))
        .route("/store/products/:id", get(store::product_detail))
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .layer(Extension(health_service));

    debug!("Public routes configured");

    // Administration; the services check roles again with branch scope
    let admin_routes = Router::new()
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/users/vet-candidates", get(users::vet_candidates))
        .route("/users/:id", put(users::update_user))
        .route("/users/:id/promote-vet", post(users::promote_vet))
        .route("/admin/products", get(store::admin_products).post(store::create_product))
        .route("/admin/products/:id", put(store::update_product))
        .route("/analytics", get(analytics::admin_analytics))
        .route("/analytics/vets", get(analytics::vet_team))
        .route("/reports/inventory", get(reports::inventory_report))
        .route("/reports/owners/:id", get(reports::owner_dossier))
        .route_layer(middleware::from_fn(authorize::require_role(Role::Admin)));

    debug!("Admin routes configured");

    // Authentication must happen before authorization, so this layer wraps the admin group
    let protected_routes = Router::new()
        .route("/auth/logout", post(auth::logout))
        .route("/auth/me", get(auth::profile).put(auth::update_profile))
        .route("/dashboard", get(dashboard::dashboard))
        .route("/branches", get(branches::list_branches).post(branches::create_branch))
        .route("/branches/:id", get(branches::get_branch).put(branches::update_branch))
        .route("/owners", get(owners::search_owners).post(owners::create_owner))
        .route("/owners/:id", get(owners::get_owner))
        .route("/patients", get(patients::list_patients).post(patients::create_patient))
        .route("/patients/:id", get(patients::get_patient))
        .route("/patients/:id/transfer", post(patients::transfer_patient))
        .route("/patients/:id/records", post(patients::register_record))
        .route("/patients/:id/vaccines", get(patients::vaccine_calendar))
        .route(
            "/patients/:id/vaccines/:vaccine_id",
            put(patients::mark_vaccine).delete(patients::unmark_vaccine),
        )
        .route(
            "/appointments",
            get(appointments::list_appointments).post(appointments::request_appointment),
        )
        .route("/appointments/schedule", post(appointments::schedule_appointment))
        .route("/appointments/pending", get(appointments::pending_queue))
        .route("/appointments/:id", get(appointments::get_appointment))
        .route("/appointments/:id/assign", post(appointments::assign_vet))
        .route("/appointments/:id/actions", post(appointments::apply_action))
        .route("/appointments/:id/complete", post(appointments::complete_visit))
        .route("/records", get(records::records_overview))
        .route("/records/mine", get(records::my_records))
        .route("/records/:id", get(records::get_record))
        .route("/inventory", get(inventory::admin_inventory).post(inventory::create_medication))
        .route("/inventory/mine", get(inventory::vet_inventory))
        .route(
            "/inventory/:id",
            put(inventory::update_medication).delete(inventory::delete_medication),
        )
        .route("/analytics/indicators", get(analytics::indicators))
        .merge(admin_routes)
        .route_layer(middleware::from_fn_with_state(state.auth.clone(), auth_middleware));

    debug!("Protected routes configured");

    let api_routes = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .with_state(state);

    let app = Router::new().nest("/api/v1", api_routes).merge(configure_swagger_routes());

    debug!("API routes nested and Swagger UI merged");

    // Apply security configuration
    let app = configure_auth(app).layer(TraceLayer::new_for_http());
    debug!("Security configuration applied");

    // Initialize health check service startup time
    health::initialize_server_start_time();

    app
}
