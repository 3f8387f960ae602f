use thiserror::Error;

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Backing store errors (transport failure, command rejected)
    #[error("Store error: {0}")]
    Store(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A search filter name with no resolver
    #[error("Unknown search filter: {0}")]
    UnknownFilter(String),

    /// A known search filter carrying a value of the wrong shape
    #[error("Invalid value for filter '{facet}': {message}")]
    InvalidFilter { facet: String, message: String },

    /// Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Get error code string
    pub fn error_code(&self) -> &str {
        match self {
            AppError::Store(_) => "STORE_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::Configuration(_) => "CONFIGURATION_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::UnknownFilter(_) => "UNKNOWN_FILTER",
            AppError::InvalidFilter { .. } => "INVALID_FILTER",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Whether the error came from the caller's input rather than the store
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_) | AppError::UnknownFilter(_) | AppError::InvalidFilter { .. }
        )
    }
}

/// Conversion from serde_json::Error
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::Serialization(err.to_string())
    }
}

/// Conversion from validator::ValidationErrors
impl From<validator::ValidationErrors> for AppError {
    fn from(err: validator::ValidationErrors) -> Self {
        AppError::Validation(err.to_string())
    }
}

/// Conversion from config::ConfigError
impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::Configuration(err.to_string())
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(AppError::Store("down".to_string()).error_code(), "STORE_ERROR");
        assert_eq!(
            AppError::UnknownFilter("colour".to_string()).error_code(),
            "UNKNOWN_FILTER"
        );
        assert_eq!(
            AppError::InvalidFilter {
                facet: "state".to_string(),
                message: "expected open or closed".to_string(),
            }
            .error_code(),
            "INVALID_FILTER"
        );
    }

    #[test]
    fn test_caller_errors() {
        assert!(AppError::UnknownFilter("x".to_string()).is_caller_error());
        assert!(AppError::Validation("x".to_string()).is_caller_error());
        assert!(!AppError::Store("x".to_string()).is_caller_error());
    }

    #[test]
    fn test_invalid_filter_message() {
        let err = AppError::InvalidFilter {
            facet: "prize_money".to_string(),
            message: "not a number".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid value for filter 'prize_money': not a number"
        );
    }
}
