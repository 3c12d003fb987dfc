//! Error handling for the query layer and its HTTP transport

use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, AppError>;

/// Serializable view of an error, for logging sinks and test snapshots
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

/// Every variant owns plain data so the error can be stored in a mutation's
/// state and returned to the caller at the same time.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppError {
    /// The request never produced an HTTP response (connectivity, DNS, TLS).
    #[error("Client-side error: {message}")]
    ClientSide { message: String },

    /// The server answered with a non-2xx status.
    #[error("Server-side error: HTTP {status} - {message}")]
    ServerSide { status: u16, message: String },

    #[error("Response validation failed: {message}")]
    Validation { message: String },

    #[error("Timeout error: {operation}")]
    Timeout { operation: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl AppError {
    pub fn client_side(message: impl Into<String>) -> Self {
        Self::ClientSide {
            message: message.into(),
        }
    }

    pub fn server_side(status: u16, message: impl Into<String>) -> Self {
        Self::ServerSide {
            status,
            message: message.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>) -> Self {
        Self::Timeout {
            operation: operation.into(),
        }
    }

    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// HTTP status carried by the error, if the server produced one.
    pub fn status(&self) -> Option<u16> {
        match self {
            AppError::ServerSide { status, .. } => Some(*status),
            AppError::NotFound { .. } => Some(404),
            _ => None,
        }
    }

    pub fn is_server_side(&self) -> bool {
        matches!(self, AppError::ServerSide { .. } | AppError::NotFound { .. })
    }

    pub fn is_client_side(&self) -> bool {
        matches!(self, AppError::ClientSide { .. } | AppError::Timeout { .. })
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            AppError::ClientSide { .. } => "CLIENT_SIDE_ERROR",
            AppError::ServerSide { .. } => "SERVER_SIDE_ERROR",
            AppError::Validation { .. } => "VALIDATION_ERROR",
            AppError::Timeout { .. } => "TIMEOUT",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Serialization { .. } => "SERIALIZATION_ERROR",
            AppError::Configuration { .. } => "CONFIG_ERROR",
            AppError::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    pub fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_code().to_string(),
            message: self.to_string(),
            status: self.status(),
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(error: serde_json::Error) -> Self {
        AppError::serialization(error.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            AppError::timeout(error.to_string())
        } else if let Some(status) = error.status() {
            AppError::server_side(status.as_u16(), error.to_string())
        } else {
            AppError::client_side(error.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_server_and_client_side_are_distinguished() {
        let server = AppError::server_side(503, "Service Unavailable");
        assert!(server.is_server_side());
        assert!(!server.is_client_side());
        assert_eq!(server.status(), Some(503));

        let client = AppError::client_side("connection refused");
        assert!(client.is_client_side());
        assert_eq!(client.status(), None);
    }

    #[test]
    fn test_validation_message_mentions_validation_failed() {
        let err = AppError::validation("email: invalid");
        assert!(err.to_string().to_lowercase().contains("validation failed"));
        assert_eq!(err.error_code(), "VALIDATION_ERROR");
    }

    #[test]
    fn test_error_response_snapshot() {
        let response = AppError::server_side(500, "boom").to_response();
        assert_eq!(response.error, "SERVER_SIDE_ERROR");
        assert_eq!(response.status, Some(500));
        assert_eq!(response.message, "Server-side error: HTTP 500 - boom");
    }
}
