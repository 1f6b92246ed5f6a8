//! Domain layer health check functionality

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error, warn};

use vet_clinic_data::database::{self, DatabasePool};

/// System health status
#[derive(Debug, Clone, PartialEq)]
pub enum SystemStatus {
    /// All components are healthy
    Healthy,
    /// Some components are degraded but the system is functional
    Degraded,
    /// System is not functioning properly
    Unhealthy,
}

/// Component health status
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Represents a health component with status and optional details
#[derive(Debug, Clone)]
pub struct HealthComponent {
    pub status: ComponentStatus,
    pub details: Option<String>,
}

/// Represents the overall health of the system
#[derive(Debug, Clone)]
pub struct SystemHealth {
    pub status: SystemStatus,
    /// Map of component names to their health status
    pub components: HashMap<String, HealthComponent>,
}

/// Trait for health services
#[async_trait]
pub trait HealthServiceTrait: Send + Sync + std::fmt::Debug {
    /// Get the overall system health
    async fn get_system_health(&self) -> SystemHealth;

    /// Ok(true) when the database answers quickly, Ok(false) when it answers
    /// slower than the configured threshold, Err when it cannot be reached
    async fn check_database_status(&self) -> Result<bool, String>;
}

/// Ping latency from which the database is reported as degraded
pub const DEFAULT_SLOW_PING: Duration = Duration::from_millis(500);

/// Health checks against the application's connection pool
#[derive(Debug, Clone)]
pub struct HealthService {
    pool: DatabasePool,
    slow_ping: Duration,
}

impl HealthService {
    pub fn new(pool: DatabasePool) -> Self {
        Self {
            pool,
            slow_ping: DEFAULT_SLOW_PING,
        }
    }

    pub fn with_slow_ping(mut self, threshold: Duration) -> Self {
        self.slow_ping = threshold;
        self
    }
}

#[async_trait]
impl HealthServiceTrait for HealthService {
    async fn get_system_health(&self) -> SystemHealth {
        let database = match self.check_database_status().await {
            Ok(true) => HealthComponent {
                status: ComponentStatus::Healthy,
                details: Some(database::get_connection_info(&self.pool)),
            },
            Ok(false) => HealthComponent {
                status: ComponentStatus::Degraded,
                details: Some(format!(
                    "Database answered slower than {} ms",
                    self.slow_ping.as_millis()
                )),
            },
            Err(e) => HealthComponent {
                status: ComponentStatus::Unhealthy,
                details: Some(e),
            },
        };

        let status = match database.status {
            ComponentStatus::Healthy => SystemStatus::Healthy,
            ComponentStatus::Degraded => SystemStatus::Degraded,
            ComponentStatus::Unhealthy => SystemStatus::Unhealthy,
        };

        SystemHealth {
            status,
            components: vec![("database".to_string(), database)].into_iter().collect(),
        }
    }

    async fn check_database_status(&self) -> Result<bool, String> {
        let started = Instant::now();
        match database::ping(&self.pool) {
            Ok(()) => {
                let elapsed = started.elapsed();
                if elapsed >= self.slow_ping {
                    warn!("Database ping took {:?}", elapsed);
                    return Ok(false);
                }
                debug!("Database ping succeeded in {:?}", elapsed);
                Ok(true)
            }
            Err(e) => {
                error!("Database ping failed: {}", e);
                Err(format!("Database connection error: {}", e))
            }
        }
    }
}

pub fn create_default_health_service(pool: DatabasePool) -> Arc<dyn HealthServiceTrait> {
    Arc::new(HealthService::new(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use vet_clinic_data::database::initialize_in_memory_pool;

    #[tokio::test]
    async fn test_get_system_health() {
        let service = HealthService::new(initialize_in_memory_pool().unwrap());
        let health = service.get_system_health().await;

        assert_eq!(health.status, SystemStatus::Healthy);
        let database = &health.components["database"];
        assert_eq!(database.status, ComponentStatus::Healthy);
        assert!(database.details.as_deref().unwrap_or_default().contains("in-memory"));
    }

    #[tokio::test]
    async fn test_slow_database_is_degraded() {
        let service = HealthService::new(initialize_in_memory_pool().unwrap()).with_slow_ping(Duration::ZERO);

        assert_eq!(service.check_database_status().await, Ok(false));
        let health = service.get_system_health().await;
        assert_eq!(health.status, SystemStatus::Degraded);
        assert_eq!(health.components["database"].status, ComponentStatus::Degraded);
    }
}
