// Repository module structure
pub mod errors;
pub(crate) mod query;

mod appointment;
mod branch;
mod medication;
mod owner;
mod patient;
mod product;
mod record;
mod usage;
mod user;
mod vaccine;
mod visit;

// Re-export commonly used types
pub use errors::RepositoryError;
pub use appointment::AppointmentRepository;
pub use branch::BranchRepository;
pub use medication::MedicationRepository;
pub use owner::OwnerRepository;
pub use patient::PatientRepository;
pub use product::ProductRepository;
pub use record::RecordRepository;
pub use usage::UsageRepository;
pub use user::UserRepository;
pub use vaccine::VaccineRepository;
pub use visit::{VisitCompletion, VisitOutcome, VisitRepository};
