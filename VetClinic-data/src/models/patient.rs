use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

text_enum! {
    /// Species covered by the vaccine schedule
    pub enum Species {
        Canine => ("canine", "Canine"),
        Feline => ("feline", "Feline"),
    }
}

impl Species {
    /// Interpret the free-text species typed on a patient
    pub fn normalize(text: &str) -> Option<Species> {
        let value = text.trim().to_lowercase();
        if value.starts_with("perr") || value.starts_with("can") || value.starts_with("dog") {
            Some(Species::Canine)
        } else if value.starts_with("gat") || value.starts_with("fel") || value.starts_with("cat") {
            Some(Species::Feline)
        } else {
            None
        }
    }
}

/// A pet
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub species: String,
    pub breed: String,
    pub sex: String,
    pub birth_date: NaiveDate,
    pub owner_id: i64,
    pub owner_name: String,
    pub vaccines: String,
    pub allergies: String,
}

/// Fields written when registering a pet
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct PatientInput {
    pub name: String,
    pub species: String,
    #[serde(default)]
    pub breed: String,
    #[serde(default)]
    pub sex: String,
    pub birth_date: NaiveDate,
    #[serde(default)]
    pub vaccines: String,
    #[serde(default)]
    pub allergies: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_species_normalization() {
        assert_eq!(Species::normalize("Perro"), Some(Species::Canine));
        assert_eq!(Species::normalize("canino"), Some(Species::Canine));
        assert_eq!(Species::normalize(" Gato "), Some(Species::Feline));
        assert_eq!(Species::normalize("Felino"), Some(Species::Feline));
        assert_eq!(Species::normalize("dog"), Some(Species::Canine));
        assert_eq!(Species::normalize("conejo"), None);
        assert_eq!(Species::normalize(""), None);
    }
}
