//! Error types for FleetOps

use thiserror::Error;

/// Result type alias using FleetOps Error
pub type Result<T> = std::result::Result<T, Error>;

/// FleetOps error types
#[derive(Error, Debug)]
pub enum Error {
    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Patch or group template not found
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Device has no activation
    #[error("Device activation not found: {0}")]
    DeviceActivationNotFound(String),

    /// SSM knows no managed instance for the device
    #[error("Target instance not found: {0}")]
    TargetInstanceNotFound(String),

    /// Entity already exists or is already associated
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Items left unprocessed after a batch write
    #[error("Save failed: {0}")]
    SaveFailed(String),

    /// Items left unprocessed after a batch delete
    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    /// Request body failed schema validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Malformed pagination token
    #[error("Invalid pagination token: {0}")]
    InvalidToken(String),

    /// Request was throttled by a downstream service
    #[error("Throttled: {0}")]
    Throttled(String),

    /// DynamoDB error
    #[error("Database error: {0}")]
    Database(String),

    /// JSON serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// DynamoDB serialization error
    #[error("DynamoDB serialization error: {0}")]
    DynamoSerialization(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Returns the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "NOT_FOUND",
            Error::TemplateNotFound(_) => "TEMPLATE_NOT_FOUND",
            Error::DeviceActivationNotFound(_) => "DEVICE_ACTIVATION_NOT_FOUND",
            Error::TargetInstanceNotFound(_) => "TARGET_INSTANCE_NOT_FOUND",
            Error::Conflict(_) => "CONFLICT",
            Error::SaveFailed(_) => "SAVE_FAILED",
            Error::DeleteFailed(_) => "DELETE_FAILED",
            Error::Validation(_) => "VALIDATION_ERROR",
            Error::InvalidToken(_) => "INVALID_TOKEN",
            Error::Throttled(_) => "THROTTLED",
            Error::Database(_) => "DATABASE_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::DynamoSerialization(_) => "SERIALIZATION_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Returns the HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Error::NotFound(_) => 404,
            Error::TemplateNotFound(_) => 404,
            Error::DeviceActivationNotFound(_) => 404,
            Error::TargetInstanceNotFound(_) => 404,
            Error::Conflict(_) => 409,
            Error::SaveFailed(_) => 500,
            Error::DeleteFailed(_) => 500,
            Error::Validation(_) => 400,
            Error::InvalidToken(_) => 400,
            Error::Throttled(_) => 429,
            Error::Database(_) => 500,
            Error::Serialization(_) => 400,
            Error::DynamoSerialization(_) => 500,
            Error::Internal(_) => 500,
        }
    }

    /// Classify a DynamoDB SDK error by its rendered message.
    ///
    /// Conditional-check failures become `Conflict`, throttling becomes
    /// `Throttled`, everything else `Database`.
    pub fn from_dynamo(message: String, conflict_subject: &str) -> Self {
        if message.contains("ConditionalCheckFailed") {
            Error::Conflict(conflict_subject.to_string())
        } else if message.contains("ThrottlingException")
            || message.contains("ProvisionedThroughputExceeded")
        {
            Error::Throttled(message)
        } else {
            Error::Database(message)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let err = Error::TemplateNotFound("nginx".into());
        assert_eq!(err.code(), "TEMPLATE_NOT_FOUND");
        assert_eq!(err.status_code(), 404);
    }

    #[test]
    fn test_error_display() {
        let err = Error::DeviceActivationNotFound("core-001".into());
        assert_eq!(err.to_string(), "Device activation not found: core-001");
    }

    #[test]
    fn test_conflict_maps_to_409() {
        let err = Error::Conflict("group my-group already has device core-001".into());
        assert_eq!(err.code(), "CONFLICT");
        assert_eq!(err.status_code(), 409);
    }

    #[test]
    fn test_batch_failures_map_to_500() {
        assert_eq!(Error::SaveFailed("2 unprocessed".into()).status_code(), 500);
        assert_eq!(Error::DeleteFailed("1 unprocessed".into()).status_code(), 500);
    }

    #[test]
    fn test_throttled_maps_to_429() {
        let err = Error::Throttled("rate exceeded".into());
        assert_eq!(err.code(), "THROTTLED");
        assert_eq!(err.status_code(), 429);
    }

    #[test]
    fn test_from_dynamo_classification() {
        let conflict =
            Error::from_dynamo("ConditionalCheckFailedException: ...".into(), "patch p-1");
        assert!(matches!(conflict, Error::Conflict(_)));

        let throttled = Error::from_dynamo("ThrottlingException: slow down".into(), "x");
        assert!(matches!(throttled, Error::Throttled(_)));

        let database = Error::from_dynamo("some other failure".into(), "x");
        assert!(matches!(database, Error::Database(_)));
    }
}
