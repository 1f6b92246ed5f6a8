use serde::Serialize;

use super::display_name;

/// Customer profile attached one-to-one to an OWNER account
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Owner {
    pub id: i64,
    pub user_id: i64,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
    pub address: String,
    pub city: String,
    pub notes: String,
    /// Phone stored on the account itself
    pub user_phone: String,
}

impl Owner {
    pub fn display_name(&self) -> String {
        display_name(&self.first_name, &self.last_name, &self.username)
    }

    /// Profile phone, falling back to the account phone
    pub fn contact_phone(&self) -> &str {
        if self.phone.trim().is_empty() {
            &self.user_phone
        } else {
            &self.phone
        }
    }
}

/// Owner search hit with the number of pets registered
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct OwnerWithPets {
    #[serde(flatten)]
    pub owner: Owner,
    pub pet_count: i64,
}

/// Filters for the owner activity listing
#[derive(Debug, Clone, Default)]
pub struct OwnerActivityFilter {
    pub search: Option<String>,
    /// Only owners whose pets have a record on or after this date
    pub records_since: Option<chrono::NaiveDate>,
    /// Only owners whose appointments dispensed this medication
    pub medication_id: Option<i64>,
    /// Appointment branch restriction for the activity counts
    pub branch_id: Option<i64>,
    pub limit: usize,
}

/// Owner with clinical activity counters
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct OwnerActivity {
    pub owner_id: i64,
    pub name: String,
    pub username: String,
    pub phone: String,
    pub pet_count: i64,
    pub record_count: i64,
    pub appointment_count: i64,
    pub last_record_at: Option<chrono::DateTime<chrono::Utc>>,
}
