// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Configuration loading from files and the environment.
//!
//! Precedence, lowest to highest: built-in defaults, the file named by
//! `ENDPOINT_TRACER_CONFIG`, then individual environment variables.

use std::path::Path;
use std::str::FromStr;

use crate::error::ConfigError;

use super::types::InstrumentationConfig;

/// Path of a JSON or YAML config file.
pub const CONFIG_PATH_ENV: &str = "ENDPOINT_TRACER_CONFIG";

/// Standard OpenTelemetry kill switch.
pub const OTEL_SDK_DISABLED_ENV: &str = "OTEL_SDK_DISABLED";

/// Per-instrumentation switch, following the `OTEL_INSTRUMENTATION_<NAME>_ENABLED` convention.
pub const ENABLED_ENV: &str = "OTEL_INSTRUMENTATION_ENDPOINTS_ENABLED";

pub const MAX_DEPTH_ENV: &str = "ENDPOINT_TRACER_MAX_DEPTH";
pub const MAX_OUTPUT_LEN_ENV: &str = "ENDPOINT_TRACER_MAX_OUTPUT_LEN";
pub const CAPTURE_ARGUMENTS_ENV: &str = "ENDPOINT_TRACER_CAPTURE_ARGUMENTS";
pub const CAPTURE_RESULT_ENV: &str = "ENDPOINT_TRACER_CAPTURE_RESULT";

/// Load a configuration file (JSON or YAML).
pub fn load_config_file(path: &Path) -> Result<InstrumentationConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("");

    match extension.to_lowercase().as_str() {
        "yaml" | "yml" => serde_yaml::from_str(&content).map_err(ConfigError::from),
        _ => serde_json::from_str(&content).map_err(ConfigError::from),
    }
}

fn parse_bool(field: &str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(ConfigError::invalid(field, format!("expected a boolean, got '{}'", other))),
    }
}

fn parse_number<T: FromStr>(field: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| ConfigError::invalid(field, format!("expected a number, got '{}'", raw)))
}

/// Apply environment overrides read through `lookup`.
///
/// Taking the lookup as a parameter keeps this testable without touching the
/// process environment.
pub fn apply_env_overrides<F>(
    mut config: InstrumentationConfig,
    lookup: F,
) -> Result<InstrumentationConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(raw) = lookup(ENABLED_ENV) {
        config.enabled = parse_bool(ENABLED_ENV, &raw)?;
    }
    // Explicit SDK disable takes priority
    if let Some(raw) = lookup(OTEL_SDK_DISABLED_ENV) {
        if parse_bool(OTEL_SDK_DISABLED_ENV, &raw)? {
            config.enabled = false;
        }
    }
    if let Some(raw) = lookup(MAX_DEPTH_ENV) {
        config.serializer.max_depth = parse_number(MAX_DEPTH_ENV, &raw)?;
    }
    if let Some(raw) = lookup(MAX_OUTPUT_LEN_ENV) {
        config.serializer.max_output_len = parse_number(MAX_OUTPUT_LEN_ENV, &raw)?;
    }
    if let Some(raw) = lookup(CAPTURE_ARGUMENTS_ENV) {
        config.capture_arguments = parse_bool(CAPTURE_ARGUMENTS_ENV, &raw)?;
    }
    if let Some(raw) = lookup(CAPTURE_RESULT_ENV) {
        config.capture_result = parse_bool(CAPTURE_RESULT_ENV, &raw)?;
    }
    Ok(config)
}

/// Resolve configuration through `lookup`: optional file, then overrides.
pub fn load_config_with<F>(lookup: F) -> Result<InstrumentationConfig, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let base = match lookup(CONFIG_PATH_ENV) {
        Some(path) => load_config_file(Path::new(&path))?,
        None => InstrumentationConfig::default(),
    };
    let config = apply_env_overrides(base, lookup)?;
    config.validate()?;
    Ok(config)
}

/// Resolve configuration from the process environment.
pub fn load_config() -> Result<InstrumentationConfig, ConfigError> {
    load_config_with(|key| std::env::var(key).ok())
}
