// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration type definitions.

use serde::{Deserialize, Serialize};

use crate::context::SpanKind;
use crate::error::ConfigError;
use crate::serializer::SerializerLimits;

/// Default instrumentation scope name.
pub const DEFAULT_INSTRUMENTATION_NAME: &str = "endpoints-1.0";

/// Settings for endpoint instrumentation.
/// Can be defined in a JSON or YAML file named by `ENDPOINT_TRACER_CONFIG`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct InstrumentationConfig {
    /// Master switch; when false the inert backend is bound
    pub enabled: bool,

    /// Instrumentation scope the backend is bound under
    pub instrumentation_name: String,

    /// Kind given to every endpoint span
    pub span_kind: SpanKind,

    /// Record the serialized argument list as `arguments`
    pub capture_arguments: bool,

    /// Record the serialized return value as `result`
    pub capture_result: bool,

    /// Bounds for argument/result serialization
    pub serializer: SerializerLimits,
}

impl Default for InstrumentationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            instrumentation_name: DEFAULT_INSTRUMENTATION_NAME.to_string(),
            span_kind: SpanKind::Server,
            capture_arguments: true,
            capture_result: true,
            serializer: SerializerLimits::default(),
        }
    }
}

impl InstrumentationConfig {
    /// A config with instrumentation switched off.
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }

    /// Check every field for usable values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.instrumentation_name.trim().is_empty() {
            return Err(ConfigError::invalid(
                "instrumentationName",
                "must not be empty",
            ));
        }
        self.serializer.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = InstrumentationConfig::default();
        assert!(config.enabled);
        assert_eq!(config.instrumentation_name, "endpoints-1.0");
        assert_eq!(config.span_kind, SpanKind::Server);
        assert!(config.capture_arguments);
        assert!(config.capture_result);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_disabled() {
        assert!(!InstrumentationConfig::disabled().enabled);
    }

    #[test]
    fn test_camel_case_round_trip() {
        let json = r#"{
            "enabled": false,
            "spanKind": "internal",
            "captureResult": false,
            "serializer": { "maxItems": 10 }
        }"#;
        let config: InstrumentationConfig = serde_json::from_str(json).unwrap();
        assert!(!config.enabled);
        assert_eq!(config.span_kind, SpanKind::Internal);
        assert!(config.capture_arguments);
        assert!(!config.capture_result);
        assert_eq!(config.serializer.max_items, 10);
        assert_eq!(config.serializer.max_depth, 8);
    }

    #[test]
    fn test_empty_name_rejected() {
        let config = InstrumentationConfig {
            instrumentation_name: "  ".to_string(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "instrumentationName"
        ));
    }
}
