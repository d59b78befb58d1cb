// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging subscriber setup for host binaries.
//!
//! The library itself only emits through `tracing`. Hosts that have no
//! subscriber of their own can call [`init_logging`]; once a global
//! subscriber exists the registry binds the `tracing` backend, so endpoint
//! spans show up in the same output.

use std::io;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Configuration for logging initialization.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Default log level if RUST_LOG is not set.
    pub default_level: Level,

    /// Log a line when each endpoint span closes, with its timing.
    pub log_span_close: bool,

    /// Whether to include file/line information.
    pub include_file_line: bool,

    /// Whether to use ANSI colors in output.
    pub ansi_colors: bool,

    /// Custom filter directive (overrides default_level).
    pub filter_directive: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            default_level: Level::INFO,
            log_span_close: true,
            include_file_line: false,
            ansi_colors: true,
            filter_directive: None,
        }
    }
}

impl LogConfig {
    /// Verbose output including the interceptor's own debug logs.
    pub fn development() -> Self {
        Self {
            default_level: Level::DEBUG,
            log_span_close: true,
            include_file_line: true,
            ansi_colors: true,
            filter_directive: None,
        }
    }

    /// Minimal output.
    pub fn production() -> Self {
        Self {
            default_level: Level::WARN,
            log_span_close: false,
            include_file_line: false,
            ansi_colors: false,
            filter_directive: None,
        }
    }

    /// Trace-level output for this crate only.
    pub fn testing() -> Self {
        Self {
            default_level: Level::TRACE,
            log_span_close: true,
            include_file_line: true,
            ansi_colors: false,
            filter_directive: Some("endpoint_tracer=trace".to_string()),
        }
    }

    /// Set the default log level.
    pub fn with_level(mut self, level: Level) -> Self {
        self.default_level = level;
        self
    }

    /// Set a custom filter directive.
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter_directive = Some(filter.into());
        self
    }

    /// Enable or disable ANSI colors.
    pub fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi_colors = ansi;
        self
    }

    fn env_filter(&self) -> EnvFilter {
        let fallback = || EnvFilter::new(self.default_level.to_string());
        match &self.filter_directive {
            Some(directive) => EnvFilter::try_new(directive).unwrap_or_else(|_| fallback()),
            None => EnvFilter::try_from_default_env().unwrap_or_else(|_| fallback()),
        }
    }
}

/// Install a global `tracing` subscriber.
///
/// Call before the first intercepted call: the registry picks its backend on
/// first use and does not rebind afterwards.
pub fn init_logging(config: &LogConfig) -> io::Result<()> {
    let span_events = if config.log_span_close {
        FmtSpan::CLOSE
    } else {
        FmtSpan::NONE
    };

    let fmt_layer = fmt::layer()
        .with_ansi(config.ansi_colors)
        .with_file(config.include_file_line)
        .with_line_number(config.include_file_line)
        .with_span_events(span_events)
        .compact();

    tracing_subscriber::registry()
        .with(config.env_filter())
        .with(fmt_layer)
        .try_init()
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_config_default() {
        let config = LogConfig::default();
        assert_eq!(config.default_level, Level::INFO);
        assert!(config.log_span_close);
        assert!(config.filter_directive.is_none());
    }

    #[test]
    fn test_log_config_presets() {
        assert_eq!(LogConfig::development().default_level, Level::DEBUG);
        assert!(!LogConfig::production().log_span_close);
        assert_eq!(
            LogConfig::testing().filter_directive.as_deref(),
            Some("endpoint_tracer=trace")
        );
    }

    #[test]
    fn test_log_config_builder() {
        let config = LogConfig::default()
            .with_level(Level::DEBUG)
            .with_filter("endpoint_tracer=debug")
            .with_ansi(false);

        assert_eq!(config.default_level, Level::DEBUG);
        assert_eq!(config.filter_directive, Some("endpoint_tracer=debug".to_string()));
        assert!(!config.ansi_colors);
    }

    #[test]
    fn test_bad_directive_falls_back() {
        // an invalid directive must not prevent a filter from being built
        let config = LogConfig::default().with_filter("[[[");
        let _ = config.env_filter();
    }
}
