pub mod handlers;
pub mod routes;
pub mod state;

use axum::Router;
use vet_clinic_domain::auth::AuthConfig;
use vet_clinic_domain::database::DatabasePool;
use vet_clinic_domain::health::create_default_health_service;

pub use state::AppState;

/// Create the application router over one connection pool
pub fn create_application(pool: DatabasePool, auth_config: AuthConfig) -> Router {
    let health = create_default_health_service(pool.clone());
    routes::create_app(AppState::new(pool, auth_config), health)
}
