use thiserror::Error;

/// Main error type for Pling operations
#[derive(Debug, Error)]
pub enum PlingError {
    #[error("Notification not found: {0}")]
    NotificationNotFound(String),

    #[error("Identity could not be resolved: {0}")]
    IdentityUnresolved(String),

    #[error("Persistent store unavailable")]
    StoreUnavailable,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl PlingError {
    /// Stable error code for API surfaces and logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotificationNotFound(_) => "NOTIFICATION_NOT_FOUND",
            Self::IdentityUnresolved(_) => "IDENTITY_UNRESOLVED",
            Self::StoreUnavailable => "STORE_UNAVAILABLE",
            Self::InvalidRequest(_) => "INVALID_REQUEST",
            Self::SerializationError(_) => "SERIALIZATION_ERROR",
            Self::InternalError(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<serde_json::Error> for PlingError {
    fn from(err: serde_json::Error) -> Self {
        Self::SerializationError(err.to_string())
    }
}

/// Result type alias for Pling operations
pub type Result<T> = std::result::Result<T, PlingError>;
