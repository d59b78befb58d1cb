// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Instrumentation configuration.
//!
//! Configuration is resolved once, when the global registry initializes:
//!
//! 1. Built-in defaults
//! 2. JSON/YAML file named by `ENDPOINT_TRACER_CONFIG`
//! 3. Environment variable overrides (`OTEL_SDK_DISABLED`,
//!    `OTEL_INSTRUMENTATION_ENDPOINTS_ENABLED`, `ENDPOINT_TRACER_*`)

mod loader;
mod types;

pub use loader::{
    apply_env_overrides, load_config, load_config_file, load_config_with, CAPTURE_ARGUMENTS_ENV,
    CAPTURE_RESULT_ENV, CONFIG_PATH_ENV, ENABLED_ENV, MAX_DEPTH_ENV, MAX_OUTPUT_LEN_ENV,
    OTEL_SDK_DISABLED_ENV,
};
pub use types::{InstrumentationConfig, DEFAULT_INSTRUMENTATION_NAME};
