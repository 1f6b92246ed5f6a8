use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::{http::StatusCode, response::IntoResponse, Extension, Json};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;

use vet_clinic_domain::health::{ComponentStatus as DomainComponentStatus, HealthServiceTrait, SystemStatus};

/// Health check response
#[derive(Serialize, Deserialize, ToSchema)]
pub struct HealthResponse {
    /// "ok", "degraded" or "error"
    pub status: String,
    /// Application version from the Cargo manifest
    pub version: String,
    /// Unix timestamp of the response
    pub timestamp: u64,
    /// Seconds since the server started
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uptime: Option<u64>,
    pub components: ComponentStatus,
}

/// Status of individual system components
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ComponentStatus {
    pub database: ComponentHealthStatus,
    pub api: ComponentHealthStatus,
}

/// Health status for an individual component
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ComponentHealthStatus {
    /// "ok", "degraded" or "error"
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

static SERVER_START_TIME: OnceCell<u64> = OnceCell::new();

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Remember when the server started; later calls keep the first value
pub fn initialize_server_start_time() {
    let _ = SERVER_START_TIME.set(unix_now());
}

fn map_component_status(status: &DomainComponentStatus) -> String {
    match status {
        DomainComponentStatus::Healthy => "ok",
        DomainComponentStatus::Degraded => "degraded",
        DomainComponentStatus::Unhealthy => "error",
    }
    .to_string()
}

/// Health check endpoint to verify the API is running
#[utoipa::path(
    get,
    path = "/api/v1/health",
    responses(
        (status = 200, description = "API is healthy", body = HealthResponse),
        (status = 500, description = "API is not healthy", body = HealthResponse),
        (status = 503, description = "API is degraded", body = HealthResponse)
    ),
    tag = "health"
)]
#[instrument(skip(health_service))]
pub async fn health_check(Extension(health_service): Extension<Arc<dyn HealthServiceTrait>>) -> impl IntoResponse {
    info!("Health check requested");
    let now = unix_now();
    let system_health = health_service.get_system_health().await;

    let database = system_health.components.get("database");
    let response = HealthResponse {
        status: match system_health.status {
            SystemStatus::Healthy => "ok",
            SystemStatus::Degraded => "degraded",
            SystemStatus::Unhealthy => "error",
        }
        .to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: now,
        uptime: SERVER_START_TIME.get().map(|start| now.saturating_sub(*start)),
        components: ComponentStatus {
            database: ComponentHealthStatus {
                status: map_component_status(
                    &database.map_or(DomainComponentStatus::Healthy, |c| c.status.clone()),
                ),
                message: database.and_then(|c| c.details.clone()),
            },
            api: ComponentHealthStatus {
                status: "ok".to_string(),
                message: None,
            },
        },
    };

    let status = match system_health.status {
        SystemStatus::Healthy => StatusCode::OK,
        SystemStatus::Degraded => StatusCode::SERVICE_UNAVAILABLE,
        SystemStatus::Unhealthy => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (status, Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vet_clinic_domain::testing::MockHealthService;

    async fn status_for(service: MockHealthService) -> StatusCode {
        initialize_server_start_time();
        let service: Arc<dyn HealthServiceTrait> = Arc::new(service);
        health_check(Extension(service)).await.into_response().status()
    }

    #[tokio::test]
    async fn test_healthy_database_is_ok() {
        assert_eq!(status_for(MockHealthService::new()).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_degraded_database_is_unavailable() {
        let service = MockHealthService::new().with_database_status(DomainComponentStatus::Degraded);
        assert_eq!(status_for(service).await, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_unhealthy_database_is_an_error() {
        let service = MockHealthService::new().with_database_status(DomainComponentStatus::Unhealthy);
        assert_eq!(status_for(service).await, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
