use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{AppointmentKind, AppointmentStatus, BranchScope};

text_enum! {
    /// Therapeutic category, in display order
    pub enum MedicationCategory {
        AnalgesicsAntiInflammatories => ("analgesics_anti_inflammatories", "Analgesics and anti-inflammatories"),
        Antibiotics => ("antibiotics", "Antibiotics"),
        InternalAntiparasitics => ("internal_antiparasitics", "Internal antiparasitics"),
        ExternalAntiparasitics => ("external_antiparasitics", "External antiparasitics"),
        Vaccines => ("vaccines", "Vaccines"),
        AntiemeticsDigestive => ("antiemetics_digestive", "Antiemetics and digestive"),
        FluidsSolutions => ("fluids_solutions", "Fluids and solutions"),
        Anticonvulsants => ("anticonvulsants", "Anticonvulsants"),
        Corticosteroids => ("corticosteroids", "Corticosteroids"),
        AnestheticsSedatives => ("anesthetics_sedatives", "Anesthetics and sedatives"),
        AntisepticsTopicals => ("antiseptics_topicals", "Antiseptics and topicals"),
        HormonesEndocrine => ("hormones_endocrine", "Hormones and endocrine treatments"),
        VitaminsSupplements => ("vitamins_supplements", "Vitamins and nutritional supplements"),
        OphthalmicOtic => ("ophthalmic_otic", "Ophthalmic and otic"),
        Dermatological => ("dermatological", "Dermatological products"),
        EuthanasiaEmergency => ("euthanasia_emergency", "Euthanasia and emergencies"),
    }
}

/// A stocked medication of one branch
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Medication {
    pub id: i64,
    pub branch_id: i64,
    pub branch_name: String,
    pub name: String,
    pub category: MedicationCategory,
    pub description: String,
    pub stock: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields written when creating or editing a medication
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct MedicationInput {
    pub branch_id: i64,
    pub name: String,
    pub category: MedicationCategory,
    #[serde(default)]
    pub description: String,
    pub stock: i64,
}

/// Quantity of a medication dispensed during an appointment
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct MedicationUse {
    pub id: i64,
    pub appointment_id: i64,
    pub medication_id: i64,
    pub medication_name: String,
    pub category: MedicationCategory,
    pub quantity: i64,
    pub recorded_at: DateTime<Utc>,
}

/// One dispensation row joined with its appointment, patient, owner and vet
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct UsageRecord {
    pub use_id: i64,
    pub quantity: i64,
    pub recorded_at: DateTime<Utc>,
    pub appointment_id: i64,
    pub appointment_kind: AppointmentKind,
    pub appointment_status: AppointmentStatus,
    pub requested_date: NaiveDate,
    pub scheduled_at: Option<DateTime<Utc>>,
    pub branch_id: i64,
    pub branch_name: String,
    pub medication_id: i64,
    pub medication_name: String,
    pub category: MedicationCategory,
    pub stock_now: i64,
    pub patient_id: i64,
    pub patient_name: String,
    pub patient_species: String,
    pub owner_id: i64,
    pub owner_name: String,
    pub vet_id: Option<i64>,
    pub vet_name: Option<String>,
    pub record_id: Option<i64>,
    pub diagnosis: Option<String>,
}

/// Filters for dispensation listings
#[derive(Debug, Clone)]
pub struct UsageFilter {
    pub scope: BranchScope,
    pub since: Option<DateTime<Utc>>,
    pub owner_id: Option<i64>,
}

impl Default for UsageFilter {
    fn default() -> Self {
        Self {
            scope: BranchScope::All,
            since: None,
            owner_id: None,
        }
    }
}

/// Stock movement applied while reconciling a visit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct StockChange {
    pub medication_id: i64,
    pub medication_name: String,
    /// Units taken from stock; negative when units were returned
    pub delta: i64,
    pub stock_after: i64,
}
