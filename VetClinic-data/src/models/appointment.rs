use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::BranchScope;

text_enum! {
    /// Lifecycle of an appointment
    pub enum AppointmentStatus {
        Pending => ("pending", "Pending"),
        Scheduled => ("scheduled", "Scheduled"),
        Attended => ("attended", "Attended"),
        Cancelled => ("cancelled", "Cancelled"),
    }
}

text_enum! {
    /// Reason for the visit
    pub enum AppointmentKind {
        Consultation => ("consultation", "Consultation"),
        Vaccination => ("vaccination", "Vaccination"),
        Surgery => ("surgery", "Surgery"),
    }
}

/// An appointment joined with the names needed to display it
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Appointment {
    pub id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    pub patient_species: String,
    pub owner_id: i64,
    pub owner_user_id: i64,
    pub owner_name: String,
    /// Owner profile phone, or the account phone when the profile has none
    pub owner_phone: String,
    pub vet_id: Option<i64>,
    pub vet_name: Option<String>,
    pub branch_id: i64,
    pub branch_name: String,
    pub requested_date: NaiveDate,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub duration_minutes: i64,
    pub kind: AppointmentKind,
    pub status: AppointmentStatus,
    pub notes: String,
    /// Medical record written for this appointment, if any
    pub record_id: Option<i64>,
}

/// Fields written when creating an appointment
#[derive(Debug, Clone)]
pub struct NewAppointment {
    pub patient_id: i64,
    pub branch_id: i64,
    pub vet_id: Option<i64>,
    pub requested_date: NaiveDate,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub kind: AppointmentKind,
    pub status: AppointmentStatus,
    pub notes: String,
}

/// Filters for appointment listings; unset fields do not restrict
#[derive(Debug, Clone)]
pub struct AppointmentFilter {
    pub scope: BranchScope,
    pub vet_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub patient_id: Option<i64>,
    pub status: Option<AppointmentStatus>,
    pub kind: Option<AppointmentKind>,
    /// Only appointments without a vet
    pub unassigned: bool,
    /// Case-insensitive match on patient, owner and vet names and notes
    pub search: Option<String>,
    pub requested_from: Option<NaiveDate>,
    pub requested_to: Option<NaiveDate>,
}

impl Default for AppointmentFilter {
    fn default() -> Self {
        Self {
            scope: BranchScope::All,
            vet_id: None,
            owner_id: None,
            patient_id: None,
            status: None,
            kind: None,
            unassigned: false,
            search: None,
            requested_from: None,
            requested_to: None,
        }
    }
}

impl AppointmentFilter {
    pub fn scoped(scope: BranchScope) -> Self {
        Self {
            scope,
            ..Self::default()
        }
    }
}
