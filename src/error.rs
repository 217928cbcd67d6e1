//! Error types and handling for the power limiter
//!
//! The control loop itself never fails: every abnormal condition it meets is
//! expressed as a [`crate::limiter::Status`]. The errors defined here belong
//! to the edges of the system (configuration, logging setup, command input).

use thiserror::Error;

/// Result type alias for power limiter operations
pub type Result<T> = std::result::Result<T, LimiterError>;

/// Main error type for the power limiter
#[derive(Debug, Error)]
pub enum LimiterError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Inverter handle errors (unknown inverter, rejected command)
    #[error("Inverter error: {message}")]
    Inverter { message: String },

    /// External command errors (malformed payloads, unknown commands)
    #[error("Command error: {message}")]
    Command { message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl LimiterError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, S: Into<String>>(field: F, message: S) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Create a new inverter error
    pub fn inverter<S: Into<String>>(message: S) -> Self {
        Self::Inverter {
            message: message.into(),
        }
    }

    /// Create a new command error
    pub fn command<S: Into<String>>(message: S) -> Self {
        Self::Command {
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for LimiterError {
    fn from(err: std::io::Error) -> Self {
        Self::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for LimiterError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for LimiterError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<chrono_tz::ParseError> for LimiterError {
    fn from(err: chrono_tz::ParseError) -> Self {
        Self::validation("timezone", err.to_string())
    }
}
