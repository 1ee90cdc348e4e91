//! Unified error handling for the mtmd signal override engine
//!
//! This crate provides a single error type used across all mtmd components.
//! It uses thiserror for ergonomic error definitions with proper Display and
//! Error trait impls.

use std::io;

/// Result type alias using MtmError
pub type Result<T> = std::result::Result<T, MtmError>;

/// Unified error type for all signal override operations
#[derive(thiserror::Error, Debug)]
pub enum MtmError {
    // ============================================================================
    // Property Bus Errors
    // ============================================================================
    #[error("Failed to read property {property} at {path}: {reason}")]
    PropertyRead {
        path: String,
        property: String,
        reason: String,
    },

    #[error("Failed to write property {property} at {path}: {reason}")]
    PropertyWrite {
        path: String,
        property: String,
        reason: String,
    },

    #[error("Property {property} at {path} has unexpected type: {reason}")]
    PropertyType {
        path: String,
        property: String,
        reason: String,
    },

    // ============================================================================
    // Signal Catalog Errors
    // ============================================================================
    #[error("Unknown signal ordinal: {0:#04x}")]
    UnknownSignal(u8),

    #[error("Unknown action ordinal: {0:#04x}")]
    UnknownAction(u8),

    #[error("Signal {signal:#04x} has no instance {instance}")]
    UnknownInstance {
        signal: u8,
        instance: u8,
    },

    #[error("Signal {0:#04x} is not addressable")]
    SignalNotAddressable(u8),

    // ============================================================================
    // Privilege Errors
    // ============================================================================
    #[error("Manufacturing test mode not available")]
    InsufficientPrivilege,

    // ============================================================================
    // Service Control Errors
    // ============================================================================
    #[error("Service control failed: {0}")]
    ServiceControl(String),

    // ============================================================================
    // Configuration and IPC Errors
    // ============================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IPC protocol error: {0}")]
    IpcProtocol(String),

    // ============================================================================
    // Generic Errors
    // ============================================================================
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("{0}")]
    Generic(String),
}

impl MtmError {
    /// Create a generic error from a string
    pub fn generic(msg: impl Into<String>) -> Self {
        Self::Generic(msg.into())
    }

    /// Create a config error from a string
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a property-read error
    pub fn property_read(
        path: impl Into<String>,
        property: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PropertyRead {
            path: path.into(),
            property: property.into(),
            reason: reason.into(),
        }
    }

    /// Create a property-write error
    pub fn property_write(
        path: impl Into<String>,
        property: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PropertyWrite {
            path: path.into(),
            property: property.into(),
            reason: reason.into(),
        }
    }

    /// Create a service-control error from a string
    pub fn service(msg: impl Into<String>) -> Self {
        Self::ServiceControl(msg.into())
    }
}

// Allow converting from String to MtmError
impl From<String> for MtmError {
    fn from(s: String) -> Self {
        Self::Generic(s)
    }
}

// Allow converting from &str to MtmError
impl From<&str> for MtmError {
    fn from(s: &str) -> Self {
        Self::Generic(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_addressing() {
        let err = MtmError::property_read(
            "/xyz/openbmc_project/sensors/fan_pwm/Pwm_2",
            "Value",
            "no reply",
        );
        let text = err.to_string();
        assert!(text.contains("fan_pwm/Pwm_2"));
        assert!(text.contains("Value"));
    }

    #[test]
    fn unknown_signal_formats_hex() {
        assert_eq!(
            MtmError::UnknownSignal(0x1f).to_string(),
            "Unknown signal ordinal: 0x1f"
        );
    }

    #[test]
    fn string_conversions() {
        let err: MtmError = "boom".into();
        assert!(matches!(err, MtmError::Generic(_)));
        let err: MtmError = String::from("boom").into();
        assert_eq!(err.to_string(), "boom");
    }
}
