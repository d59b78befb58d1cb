// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Error types for endpoint instrumentation.
//!
//! None of these ever reach the caller of a traced method: the interceptor
//! logs and discards them. They exist so backends, the serializer and the
//! config loader can report *why* something degraded.

use std::fmt::Display;

use thiserror::Error;

/// Errors raised inside the entry/exit path of an intercepted call.
#[derive(Error, Debug)]
pub enum InstrumentationError {
    #[error("Tracing backend error: {0}")]
    Backend(String),

    #[error("Serialization failed: {0}")]
    Serialization(#[from] SerializationError),

    #[error("Instrumentation panicked: {0}")]
    Panicked(String),

    #[error("Global instrumenter already bound")]
    AlreadyBound,
}

impl InstrumentationError {
    /// Create a backend error.
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Build an error from a payload caught by `catch_unwind`.
    pub fn from_panic(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked(message)
    }
}

/// Errors produced while turning a value into an attribute string.
#[derive(Error, Debug)]
pub enum SerializationError {
    #[error("{0}")]
    Custom(String),

    #[error("JSON encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

impl serde::ser::Error for SerializationError {
    fn custom<T: Display>(msg: T) -> Self {
        Self::Custom(msg.to_string())
    }
}

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },

    #[error("IO error reading config: {0}")]
    IoError(String),

    #[error("YAML parsing error: {0}")]
    YamlError(String),

    #[error("JSON parsing error: {0}")]
    JsonError(String),
}

impl ConfigError {
    /// Create an invalid value error.
    pub fn invalid(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ConfigError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(err.to_string()),
            _ => Self::IoError(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(err: serde_json::Error) -> Self {
        Self::JsonError(err.to_string())
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::YamlError(err.to_string())
    }
}

/// Result type alias using anyhow for flexible error handling.
pub type Result<T> = anyhow::Result<T>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde::ser::Error as _;

    #[test]
    fn test_from_panic_str_payload() {
        let payload = std::panic::catch_unwind(|| panic!("boom")).unwrap_err();
        let err = InstrumentationError::from_panic(payload.as_ref());
        assert!(matches!(err, InstrumentationError::Panicked(ref m) if m == "boom"));
    }

    #[test]
    fn test_from_panic_string_payload() {
        let payload = std::panic::catch_unwind(|| panic!("code {}", 7)).unwrap_err();
        let err = InstrumentationError::from_panic(payload.as_ref());
        assert_eq!(err.to_string(), "Instrumentation panicked: code 7");
    }

    #[test]
    fn test_serialization_error_custom() {
        let err = SerializationError::custom("not today");
        assert_eq!(err.to_string(), "not today");

        let wrapped: InstrumentationError = err.into();
        assert!(matches!(wrapped, InstrumentationError::Serialization(_)));
    }

    #[test]
    fn test_config_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let config_err: ConfigError = io_err.into();
        assert!(matches!(config_err, ConfigError::NotFound(_)));
    }

    #[test]
    fn test_config_error_from_json() {
        let result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid json");
        let config_err: ConfigError = result.unwrap_err().into();
        assert!(matches!(config_err, ConfigError::JsonError(_)));
    }

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::invalid("maxDepth", "must be at least 1");
        let display = format!("{}", err);
        assert!(display.contains("maxDepth"));
        assert!(display.contains("at least 1"));
    }
}
