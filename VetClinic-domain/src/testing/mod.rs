// Testing utilities for the domain layer
// Only compiled for tests or when the "mock" feature is enabled

use std::collections::HashMap;

use async_trait::async_trait;

pub use vet_clinic_data::testing::Fixture;

use vet_clinic_data::database::DatabasePool;
use vet_clinic_data::models::{NewUser, Role, User};
use vet_clinic_data::repository::UserRepository;

use crate::access::Actor;
use crate::auth::password::hash_password;
use crate::health::{ComponentStatus, HealthComponent, HealthServiceTrait, SystemHealth, SystemStatus};

/// Password given to every account created through [`add_user`]
pub const TEST_PASSWORD: &str = "test-password";

/// Create an account with [`TEST_PASSWORD`]
pub fn add_user(pool: &DatabasePool, username: &str, role: Role, branch_id: Option<i64>) -> User {
    let mut user = NewUser::basic(username, &hash_password(TEST_PASSWORD), role);
    user.first_name = username.to_string();
    user.branch_id = branch_id;
    UserRepository::new(pool.clone()).create(&user).unwrap()
}

/// Actor of an existing account
pub fn actor_for(pool: &DatabasePool, user_id: i64) -> Actor {
    let user = UserRepository::new(pool.clone()).get(user_id).unwrap().unwrap();
    Actor::from_user(&user)
}

/// Superuser that is not backed by a stored account
pub fn superuser() -> Actor {
    Actor {
        user_id: 0,
        username: "root".to_string(),
        role: Role::Admin,
        branch_id: None,
        is_superuser: true,
    }
}

/// Health service whose database status is set by the test
#[derive(Debug)]
pub struct MockHealthService {
    database_status: ComponentStatus,
}

impl Default for MockHealthService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockHealthService {
    /// Create a mock with every component healthy
    pub fn new() -> Self {
        Self {
            database_status: ComponentStatus::Healthy,
        }
    }

    pub fn with_database_status(mut self, status: ComponentStatus) -> Self {
        self.database_status = status;
        self
    }
}

#[async_trait]
impl HealthServiceTrait for MockHealthService {
    async fn get_system_health(&self) -> SystemHealth {
        let details = match self.database_status {
            ComponentStatus::Healthy => None,
            ComponentStatus::Degraded => Some("Database is experiencing high load".to_string()),
            ComponentStatus::Unhealthy => Some("Database connection failed".to_string()),
        };
        let status = match self.database_status {
            ComponentStatus::Healthy => SystemStatus::Healthy,
            ComponentStatus::Degraded => SystemStatus::Degraded,
            ComponentStatus::Unhealthy => SystemStatus::Unhealthy,
        };

        let mut components = HashMap::new();
        components.insert(
            "database".to_string(),
            HealthComponent {
                status: self.database_status.clone(),
                details,
            },
        );
        SystemHealth { status, components }
    }

    async fn check_database_status(&self) -> Result<bool, String> {
        match self.database_status {
            ComponentStatus::Healthy => Ok(true),
            ComponentStatus::Degraded => Ok(false),
            ComponentStatus::Unhealthy => Err("Database connection failed".to_string()),
        }
    }
}
