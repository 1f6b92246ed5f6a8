use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use super::Species;

text_enum! {
    /// Unit of a recommended vaccination age
    pub enum AgeUnit {
        Weeks => ("weeks", "weeks"),
        Months => ("months", "months"),
        Years => ("years", "years"),
    }
}

impl AgeUnit {
    fn singular(&self) -> &'static str {
        match self {
            AgeUnit::Weeks => "week",
            AgeUnit::Months => "month",
            AgeUnit::Years => "year",
        }
    }
}

/// An entry of the reference vaccination schedule
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Vaccine {
    pub id: i64,
    pub name: String,
    pub species: Species,
    pub description: String,
    pub recommended_age: i64,
    pub age_unit: AgeUnit,
    pub booster: String,
    pub sort_order: i64,
}

impl Vaccine {
    /// "1 week", "8 weeks", "1 year"
    pub fn readable_age(&self) -> String {
        let unit = if self.recommended_age == 1 {
            self.age_unit.singular()
        } else {
            self.age_unit.label()
        };
        format!("{} {}", self.recommended_age, unit)
    }
}

/// A vaccine applied to a patient
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct VaccineRecord {
    pub id: i64,
    pub patient_id: i64,
    pub vaccine_id: i64,
    pub applied_on: NaiveDate,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vaccine(age: i64, unit: AgeUnit) -> Vaccine {
        Vaccine {
            id: 1,
            name: "Rabies".to_string(),
            species: Species::Canine,
            description: String::new(),
            recommended_age: age,
            age_unit: unit,
            booster: String::new(),
            sort_order: 0,
        }
    }

    #[test]
    fn test_readable_age_singularizes_one() {
        assert_eq!(vaccine(1, AgeUnit::Weeks).readable_age(), "1 week");
        assert_eq!(vaccine(8, AgeUnit::Weeks).readable_age(), "8 weeks");
        assert_eq!(vaccine(1, AgeUnit::Years).readable_age(), "1 year");
        assert_eq!(vaccine(3, AgeUnit::Months).readable_age(), "3 months");
    }
}
