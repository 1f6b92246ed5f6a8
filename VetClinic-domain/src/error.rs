use thiserror::Error;
use tracing::error;
use validator::{Validate, ValidationErrors};

use vet_clinic_data::repository::RepositoryError;

/// Errors returned by every domain service
#[derive(Debug, Error)]
pub enum ServiceError {
    /// The request is malformed or breaks a business rule
    #[error("Validation error: {0}")]
    Validation(String),

    /// The resource does not exist or is outside the caller's scope
    #[error("Not found: {0}")]
    NotFound(String),

    /// The caller's role or branch does not allow the operation
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Missing or wrong credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The write collides with existing data
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Storage failure
    #[error("Repository error: {0}")]
    Repository(String),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ServiceError::NotFound(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ServiceError::Forbidden(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ServiceError::Conflict(message.into())
    }

    /// Human readable part of the error, without the variant prefix
    pub fn message(&self) -> &str {
        match self {
            ServiceError::Validation(m)
            | ServiceError::NotFound(m)
            | ServiceError::Forbidden(m)
            | ServiceError::Unauthorized(m)
            | ServiceError::Conflict(m)
            | ServiceError::Repository(m) => m,
        }
    }
}

/// Map repository errors to service errors
impl From<RepositoryError> for ServiceError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => ServiceError::NotFound(msg),
            RepositoryError::Validation(msg) => ServiceError::Validation(msg),
            RepositoryError::Conflict(msg) => ServiceError::Conflict(msg),
            RepositoryError::InsufficientStock { .. } => ServiceError::Conflict(err.to_string()),
            RepositoryError::MedicationNotInBranch(_) => ServiceError::Validation(err.to_string()),
            other => {
                error!("Repository failure: {}", other);
                ServiceError::Repository(other.to_string())
            }
        }
    }
}

/// Flatten `validator` errors into "field: message; field: message"
pub fn validation_message(errors: &ValidationErrors) -> String {
    let mut fields: Vec<String> = errors
        .field_errors()
        .iter()
        .map(|(field, errors)| {
            let messages: Vec<String> = errors
                .iter()
                .map(|err| match &err.message {
                    Some(msg) => msg.to_string(),
                    None => format!("Invalid {}", field),
                })
                .collect();
            format!("{}: {}", field, messages.join(", "))
        })
        .collect();
    fields.sort();
    fields.join("; ")
}

/// Run the derived validations of a request payload
pub fn validate_payload<T: Validate>(payload: &T) -> Result<(), ServiceError> {
    payload
        .validate()
        .map_err(|errors| ServiceError::Validation(validation_message(&errors)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Validate)]
    struct Payload {
        #[validate(length(min = 1, message = "Name is required"))]
        name: String,
        #[validate(range(min = 0, message = "Stock cannot be negative"))]
        stock: i64,
    }

    #[test]
    fn test_validation_message_lists_fields() {
        let err = validate_payload(&Payload {
            name: String::new(),
            stock: -1,
        })
        .unwrap_err();
        assert_eq!(
            err.message(),
            "name: Name is required; stock: Stock cannot be negative"
        );
    }

    #[test]
    fn test_insufficient_stock_is_a_conflict() {
        let err: ServiceError = RepositoryError::InsufficientStock {
            medication: "Tramadol".to_string(),
            available: 1,
        }
        .into();
        assert!(matches!(err, ServiceError::Conflict(ref m) if m.contains("Available: 1")));
    }
}
