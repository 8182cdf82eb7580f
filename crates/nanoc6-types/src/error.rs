//! Error types for data parsing in nanoc6-types.

use thiserror::Error;

/// Errors that can occur when parsing NanoC6 data.
///
/// This error type is platform-agnostic and does not include
/// BLE or HTTP errors (those belong in nanoc6-core).
///
/// This enum is marked `#[non_exhaustive]` to allow adding new error variants
/// in future versions without breaking downstream code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ParseError {
    /// Not enough bytes to decode a structure.
    #[error("Insufficient bytes: expected {expected}, got {actual}")]
    InsufficientBytes {
        /// Bytes required.
        expected: usize,
        /// Bytes available.
        actual: usize,
    },

    /// A value was syntactically present but not acceptable.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// A MAC address could not be parsed.
    #[error("Invalid MAC address '{0}': expected 12 hex digits")]
    InvalidMacAddress(String),

    /// A Bluetooth UUID alias or string could not be resolved.
    #[error("Invalid Bluetooth UUID '{0}'")]
    InvalidUuid(String),

    /// An advertising payload exceeded the legacy advertising limit.
    #[error("Advertising payload too large: {size} bytes (maximum {max})")]
    PayloadTooLarge {
        /// Encoded size.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Request-device options were rejected.
    #[error("Invalid request options: {0}")]
    InvalidFilter(String),
}

/// Result type alias using nanoc6-types' ParseError type.
pub type ParseResult<T> = std::result::Result<T, ParseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ParseError::InsufficientBytes {
            expected: 3,
            actual: 1,
        };
        assert_eq!(err.to_string(), "Insufficient bytes: expected 3, got 1");

        let err = ParseError::InvalidMacAddress("zz".to_string());
        assert!(err.to_string().contains("'zz'"));

        let err = ParseError::PayloadTooLarge { size: 40, max: 31 };
        assert!(err.to_string().contains("40 bytes"));
    }
}
