// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Logging setup and instrumentation counters.
//!
//! Initialize logging at application startup, before any endpoint runs:
//!
//! ```rust,ignore
//! use endpoint_tracer::telemetry::{init_logging, LogConfig};
//!
//! init_logging(&LogConfig::default())?;
//! ```

mod init;
pub mod metrics;

pub use init::{init_logging, LogConfig};
pub use metrics::{InstrumentationMetrics, MetricsSnapshot, GLOBAL_METRICS};
