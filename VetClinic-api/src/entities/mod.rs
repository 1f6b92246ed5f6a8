// Public entities for the VetClinic API
// Request and response shapes that only exist at the HTTP boundary

// Error responses and shared query parameters
pub mod common;

pub use common::{ApiResult, ErrorResponse, MessageResponse, SearchQuery};
