use serde::{Deserialize, Serialize};

/// A physical clinic location
#[derive(Debug, Clone, PartialEq, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct Branch {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub city: String,
    pub phone: String,
}

/// Fields written when creating or editing a branch
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct BranchInput {
    pub name: String,
    pub address: String,
    #[serde(default)]
    pub city: String,
    #[serde(default)]
    pub phone: String,
}
