//! Error types for nanoc6-core.
//!
//! This module defines the errors that can occur when talking to NanoC6
//! devices over Bluetooth Low Energy and to the hosted readings backend
//! over HTTP.
//!
//! # Error Recovery Strategies
//!
//! | Error Type | Strategy | Rationale |
//! |------------|----------|-----------|
//! | [`Error::Timeout`] | Retry (2-3 times) | Transient BLE congestion or slow backend |
//! | [`Error::Bluetooth`] | Retry, then reconnect | May be transient or connection lost |
//! | [`Error::NotConnected`] | Reconnect | Connection was lost |
//! | [`Error::ConnectionFailed`] | Retry with backoff | Device may be busy with another central |
//! | [`Error::WriteFailed`] | Retry (1-2 times) | BLE write can fail transiently |
//! | [`Error::Http`] | Retry | Network or TLS failure |
//! | [`Error::Backend`] with 5xx | Retry | Backend temporarily unavailable |
//! | [`Error::Backend`] with 4xx | Do not retry | Bad key, bad query or constraint violation |
//! | [`Error::InvalidData`] | Do not retry | Unexpected payload, report to user |
//! | [`Error::UnexpectedResponse`] | Do not retry | Device answered with another state |
//! | [`Error::DeviceNotFound`] | Do not retry | Device not in range or wrong name |
//! | [`Error::CharacteristicNotFound`] | Do not retry | Firmware incompatibility |
//! | [`Error::InvalidConfig`] | Do not retry | Fix configuration and restart |
//!
//! Use [`crate::RetryConfig`] with [`crate::with_retry`] for the retryable
//! cases.

use std::time::Duration;

use thiserror::Error;

use nanoc6_types::ParseError;

/// Errors that can occur when communicating with NanoC6 devices or the
/// readings backend.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Bluetooth Low Energy error.
    #[error("Bluetooth error: {0}")]
    Bluetooth(#[from] btleplug::Error),

    /// Device not found during scan or connection.
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceNotFoundReason),

    /// Operation attempted while not connected to device.
    #[error("Not connected to device")]
    NotConnected,

    /// Required BLE characteristic not found on device.
    #[error("Characteristic not found: {uuid} (searched in {service_count} services)")]
    CharacteristicNotFound {
        /// The UUID that was not found.
        uuid: String,
        /// Number of services that were searched.
        service_count: usize,
    },

    /// Failed to parse data received from a device or the backend.
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// The device answered a command with a different response.
    #[error("Unexpected response to {command}: {actual}")]
    UnexpectedResponse {
        /// The command that was sent.
        command: String,
        /// Description of what came back.
        actual: String,
    },

    /// Operation timed out.
    #[error("Operation '{operation}' timed out after {duration:?}")]
    Timeout {
        /// The operation that timed out.
        operation: String,
        /// The timeout duration.
        duration: Duration,
    },

    /// Operation was cancelled.
    #[error("Operation cancelled")]
    Cancelled,

    /// I/O error.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Connection failed with specific reason.
    #[error("Connection failed: {reason}")]
    ConnectionFailed {
        /// The device identifier that failed to connect.
        device_id: Option<String>,
        /// The structured reason for the failure.
        reason: ConnectionFailureReason,
    },

    /// Write operation failed.
    #[error("Write failed to characteristic {uuid}: {reason}")]
    WriteFailed {
        /// The characteristic UUID.
        uuid: String,
        /// The reason for the failure.
        reason: String,
    },

    /// HTTP transport error talking to the backend.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The backend answered with an error status.
    #[error("Backend returned {status}: {message}")]
    Backend {
        /// HTTP status code.
        status: u16,
        /// Error message from the response body, or the status text.
        message: String,
    },

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Structured reasons for connection failures.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionFailureReason {
    /// Connection attempt timed out.
    Timeout,
    /// The BLE stack refused or dropped the connection attempt.
    BleError(String),
}

impl std::fmt::Display for ConnectionFailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "connection timed out"),
            Self::BleError(msg) => write!(f, "BLE error: {}", msg),
        }
    }
}

/// Reason why a device was not found.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new reasons
/// in future versions without breaking downstream code.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum DeviceNotFoundReason {
    /// Device with specified name/address not found.
    NotFound { identifier: String },
    /// No Bluetooth adapter available.
    NoAdapter,
}

impl std::fmt::Display for DeviceNotFoundReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound { identifier } => write!(f, "device '{}' not found", identifier),
            Self::NoAdapter => write!(f, "no Bluetooth adapter available"),
        }
    }
}

impl Error {
    /// Create a device not found error for a specific identifier.
    pub fn device_not_found(identifier: impl Into<String>) -> Self {
        Self::DeviceNotFound(DeviceNotFoundReason::NotFound {
            identifier: identifier.into(),
        })
    }

    /// Create a timeout error with operation context.
    pub fn timeout(operation: impl Into<String>, duration: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            duration,
        }
    }

    /// Create a characteristic not found error.
    pub fn characteristic_not_found(uuid: impl Into<String>, service_count: usize) -> Self {
        Self::CharacteristicNotFound {
            uuid: uuid.into(),
            service_count,
        }
    }

    /// Create an unexpected response error.
    pub fn unexpected_response(command: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            command: command.into(),
            actual: actual.into(),
        }
    }

    /// Create a backend status error.
    pub fn backend(status: u16, message: impl Into<String>) -> Self {
        Self::Backend {
            status,
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig(message.into())
    }

    /// Create a connection failure with structured reason.
    pub fn connection_failed(device_id: Option<String>, reason: ConnectionFailureReason) -> Self {
        Self::ConnectionFailed { device_id, reason }
    }

    /// Whether the backend rejected the request with a status code, as
    /// opposed to the request never completing.
    pub fn is_backend_status(&self) -> bool {
        match self {
            Error::Backend { .. } => true,
            Error::Http(e) => e.status().is_some(),
            _ => false,
        }
    }
}

impl From<ParseError> for Error {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::InvalidValue(msg) => Error::InvalidData(msg),
            ParseError::InvalidFilter(msg) => Error::InvalidConfig(msg),
            ParseError::InvalidMacAddress(_) | ParseError::InvalidUuid(_) => {
                Error::InvalidConfig(err.to_string())
            }
            // Handle future ParseError variants (non_exhaustive)
            _ => Error::InvalidData(format!("Parse error: {}", err)),
        }
    }
}

/// Result type alias using nanoc6-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::device_not_found("NanoC6-D4E5F6");
        assert!(err.to_string().contains("NanoC6-D4E5F6"));

        let err = Error::NotConnected;
        assert_eq!(err.to_string(), "Not connected to device");

        let err = Error::characteristic_not_found("6e400002", 3);
        assert!(err.to_string().contains("6e400002"));
        assert!(err.to_string().contains("3 services"));

        let err = Error::timeout("request_readings", Duration::from_secs(10));
        assert!(err.to_string().contains("request_readings"));
        assert!(err.to_string().contains("10s"));
    }

    #[test]
    fn test_backend_error_display() {
        let err = Error::backend(401, "Invalid API key");
        assert_eq!(err.to_string(), "Backend returned 401: Invalid API key");
        assert!(err.is_backend_status());
        assert!(!Error::NotConnected.is_backend_status());
    }

    #[test]
    fn test_unexpected_response_display() {
        let err = Error::unexpected_response("REGISTER", "\"hello\"");
        assert!(err.to_string().contains("REGISTER"));
    }

    #[test]
    fn test_device_not_found_reasons() {
        let err = Error::DeviceNotFound(DeviceNotFoundReason::NoAdapter);
        assert!(err.to_string().contains("no Bluetooth adapter"));

        let err = Error::device_not_found("NanoC6-D4E5F6");
        assert!(err.to_string().contains("'NanoC6-D4E5F6' not found"));
    }

    #[test]
    fn test_connection_failed_display() {
        let err = Error::connection_failed(
            Some("hci0/AA:BB".to_string()),
            ConnectionFailureReason::Timeout,
        );
        assert!(err.to_string().contains("connection timed out"));

        let err = Error::connection_failed(None, ConnectionFailureReason::BleError("refused".to_string()));
        assert!(err.to_string().contains("BLE error: refused"));
    }

    #[test]
    fn test_parse_error_conversion() {
        let err: Error = ParseError::InvalidValue("bad".to_string()).into();
        assert!(matches!(err, Error::InvalidData(_)));

        let err: Error = ParseError::InvalidFilter("empty".to_string()).into();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err: Error = ParseError::InsufficientBytes {
            expected: 4,
            actual: 1,
        }
        .into();
        assert!(matches!(err, Error::InvalidData(_)));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(matches!(err, Error::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }
}
