// VetClinic Data
// This crate owns the SQLite schema and every query the application runs

// Database connection management
pub mod database;

// Repository implementations for data access
pub mod repository;

// Data storage models
pub mod models;

// Seeded database for tests of this crate and the ones above it
#[cfg(any(test, feature = "mock"))]
pub mod testing;
