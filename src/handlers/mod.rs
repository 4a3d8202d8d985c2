pub mod history;
pub mod pending;
pub mod query;
pub mod system;

use uuid::Uuid;

use crate::error::ApiError;

/// Path ids are taken as strings so malformed ids get the JSON error body
pub(crate) fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ApiError::bad_request(format!("Invalid operation id '{}'", raw)))
}
