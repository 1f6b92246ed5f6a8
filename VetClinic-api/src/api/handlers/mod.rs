pub mod analytics;
pub mod appointments;
pub mod auth;
pub mod branches;
pub mod dashboard;
pub mod health;
pub mod inventory;
pub mod owners;
pub mod patients;
pub mod records;
pub mod reports;
pub mod store;
pub mod users;

pub use health::health_check;
