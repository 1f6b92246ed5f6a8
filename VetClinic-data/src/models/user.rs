use chrono::{DateTime, Utc};
use serde::Serialize;

use super::display_name;

text_enum! {
    /// Account role
    pub enum Role {
        Admin => ("ADMIN", "Administrator"),
        Vet => ("VET", "Veterinarian"),
        AdminOp => ("ADMIN_OP", "Front desk"),
        Owner => ("OWNER", "Owner"),
    }
}

impl Role {
    /// Roles whose visibility is bounded by their assigned branch
    pub fn is_branch_role(&self) -> bool {
        matches!(self, Role::Admin | Role::AdminOp | Role::Vet)
    }
}

/// A login account
#[derive(Debug, Clone, Serialize)]
#[cfg_attr(feature = "with-api", derive(utoipa::ToSchema))]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    pub phone: String,
    pub address: String,
    pub specialty: String,
    /// Listed for assignment and operational views
    pub available: bool,
    /// Allowed to log in
    pub is_active: bool,
    pub is_superuser: bool,
    pub branch_id: Option<i64>,
    pub branch_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl User {
    pub fn display_name(&self) -> String {
        display_name(&self.first_name, &self.last_name, &self.username)
    }

    /// Up to two uppercase initials taken from the display name
    pub fn initials(&self) -> String {
        let initials: String = self
            .display_name()
            .split_whitespace()
            .filter_map(|part| part.chars().next())
            .take(2)
            .flat_map(char::to_uppercase)
            .collect();
        if initials.is_empty() {
            "?".to_string()
        } else {
            initials
        }
    }
}

/// Fields written when creating an account
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub password_hash: String,
    pub role: Role,
    pub phone: String,
    pub address: String,
    pub specialty: String,
    pub available: bool,
    pub is_active: bool,
    pub is_superuser: bool,
    pub branch_id: Option<i64>,
}

impl NewUser {
    /// Account with the given credentials and role and every other field blank
    pub fn basic(username: &str, password_hash: &str, role: Role) -> Self {
        Self {
            username: username.to_string(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            password_hash: password_hash.to_string(),
            role,
            phone: String::new(),
            address: String::new(),
            specialty: String::new(),
            available: true,
            is_active: true,
            is_superuser: false,
            branch_id: None,
        }
    }
}

/// Self-service profile edit
#[derive(Debug, Clone)]
pub struct ProfileUpdate {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub address: String,
    /// Replacement password hash, when the password changes
    pub password_hash: Option<String>,
}

/// Administrative edit of an account: identity, contact data, role,
/// branch and the availability and activation flags
#[derive(Debug, Clone)]
pub struct AccountUpdate {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: String,
    pub address: String,
    pub role: Role,
    pub specialty: String,
    pub branch_id: Option<i64>,
    pub available: bool,
    pub is_active: bool,
    pub is_superuser: bool,
    pub password_hash: Option<String>,
}
