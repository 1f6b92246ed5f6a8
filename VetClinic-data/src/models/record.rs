use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::BranchScope;

/// A clinical note written by a vet
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct MedicalRecord {
    pub id: i64,
    pub patient_id: i64,
    pub patient_name: String,
    pub patient_species: String,
    pub owner_id: i64,
    pub owner_name: String,
    pub vet_id: Option<i64>,
    pub vet_name: Option<String>,
    pub recorded_at: DateTime<Utc>,
    pub diagnosis: String,
    pub treatment: String,
    pub notes: String,
    pub weight_kg: Option<f64>,
    pub temperature_c: Option<f64>,
    pub exams: String,
    pub next_checkup: Option<NaiveDate>,
    pub no_next_checkup: bool,
    pub appointment_id: Option<i64>,
}

/// Clinical fields a vet fills in
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct RecordInput {
    pub diagnosis: String,
    pub treatment: String,
    #[serde(default)]
    pub notes: String,
    pub weight_kg: Option<f64>,
    pub temperature_c: Option<f64>,
    #[serde(default)]
    pub exams: String,
    pub next_checkup: Option<NaiveDate>,
    #[serde(default)]
    pub no_next_checkup: bool,
}

impl RecordInput {
    /// The follow-up date actually stored: none when no follow-up is wanted
    pub fn effective_next_checkup(&self) -> Option<NaiveDate> {
        if self.no_next_checkup {
            None
        } else {
            self.next_checkup
        }
    }
}

/// Filters for record listings; newest first
#[derive(Debug, Clone)]
pub struct RecordFilter {
    pub patient_id: Option<i64>,
    pub owner_id: Option<i64>,
    pub vet_id: Option<i64>,
    /// Restrict to patients with at least one appointment in scope
    pub scope: BranchScope,
    /// Case-insensitive match on patient name, owner names and diagnosis
    pub search: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

impl Default for RecordFilter {
    fn default() -> Self {
        Self {
            patient_id: None,
            owner_id: None,
            vet_id: None,
            scope: BranchScope::All,
            search: None,
            from: None,
            to: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_next_checkup_clears_date() {
        let date = NaiveDate::from_ymd_opt(2030, 1, 1);
        let mut input = RecordInput {
            next_checkup: date,
            ..RecordInput::default()
        };
        assert_eq!(input.effective_next_checkup(), date);

        input.no_next_checkup = true;
        assert_eq!(input.effective_next_checkup(), None);
    }
}
