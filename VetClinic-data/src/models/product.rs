use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

text_enum! {
    /// Storefront section
    pub enum ProductCategory {
        Food => ("food", "Food"),
        Medicine => ("medicine", "Medicine"),
        Accessories => ("accessories", "Accessories"),
    }
}

/// A storefront item
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: String,
    pub category: ProductCategory,
    pub price_cents: i64,
    pub contact_phone: String,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Price with two decimals, e.g. "1250.00"
    pub fn price_display(&self) -> String {
        format!("{}.{:02}", self.price_cents / 100, self.price_cents % 100)
    }
}

/// Fields written when creating or editing a product
#[derive(Debug, Clone, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub category: ProductCategory,
    pub price_cents: i64,
    #[serde(default)]
    pub contact_phone: String,
    #[serde(default = "default_available")]
    pub available: bool,
}

fn default_available() -> bool {
    true
}

/// Filters for the catalogue
#[derive(Debug, Clone, Default)]
pub struct ProductFilter {
    pub available_only: bool,
    pub category: Option<ProductCategory>,
    /// Case-insensitive match on name and description
    pub search: Option<String>,
    /// Sort by most recently updated instead of by name
    pub newest_first: bool,
    pub limit: Option<usize>,
}
