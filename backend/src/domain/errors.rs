use thiserror::Error;

use crate::platform::MonitorError;
use crate::storage::StoreError;

/// Error taxonomy shared by every domain service
#[derive(Debug, Error)]
pub enum GuardianError {
    #[error("not authenticated")]
    NotAuthenticated,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("malformed document: {0}")]
    MalformedDocument(String),

    #[error("remote operation failed: {0}")]
    Remote(#[source] StoreError),

    #[error("geofence monitor error: {0}")]
    Monitor(#[from] MonitorError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, GuardianError>;

impl From<StoreError> for GuardianError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Encoding(inner) => GuardianError::MalformedDocument(inner.to_string()),
            StoreError::NotFound { path, id } => GuardianError::NotFound(format!("{}/{}", path, id)),
            other => GuardianError::Remote(other),
        }
    }
}

/// Geofence form validation failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeofenceValidationError {
    #[error("geofence name is required")]
    MissingName,

    #[error("{field} must be a number")]
    NotNumeric { field: &'static str },

    #[error("latitude must be between -90 and 90")]
    LatitudeOutOfRange,

    #[error("longitude must be between -180 and 180")]
    LongitudeOutOfRange,

    #[error("radius must be greater than zero")]
    NonPositiveRadius,
}

impl From<GeofenceValidationError> for GuardianError {
    fn from(e: GeofenceValidationError) -> Self {
        GuardianError::Validation(e.to_string())
    }
}
