// VetClinic Domain
// This crate contains the business rules of the VetClinic application

// Who is asking and which branches they may see
pub mod access;

// Authentication
pub mod auth;

// Service error shared by every service
pub mod error;

// Health checks and system status
pub mod health;

// Services that implement business logic
pub mod services;

// Re-export the data crate modules for convenience
pub use vet_clinic_data::{database, models};

// Testing utilities - only available with mock feature
#[cfg(any(test, feature = "mock"))]
pub mod testing;
