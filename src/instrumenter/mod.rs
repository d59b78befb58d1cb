// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Tracing backend contract.
//!
//! The interceptor never talks to a tracing SDK directly. It asks an
//! [`Instrumenter`] whether to start, asks it to start, and tells it when the
//! call has ended. Backends provided here:
//!
//! - [`NoopInstrumenter`] - inert; never starts anything
//! - [`TracingInstrumenter`] - spans on the `tracing` crate's subscriber
//! - [`InMemoryInstrumenter`] - keeps finished spans in memory for inspection
//! - `OtelInstrumenter` - the `opentelemetry` global tracer (feature `otel`)

mod memory;
mod noop;
#[cfg(feature = "otel")]
mod otel;
mod tracing_bridge;

use crate::context::{SpanKind, TraceContext};
use crate::error::InstrumentationError;

pub use memory::{InMemoryInstrumenter, RecordedSpan, SpanData};
pub use noop::NoopInstrumenter;
#[cfg(feature = "otel")]
pub use otel::{mark_span_kind, ActiveSpanKinds, OtelInstrumenter, OtelSpan};
pub use tracing_bridge::{TracingInstrumenter, TracingSpan};

/// Start/end contract for one instrumentation scope.
///
/// Implementations must be safe to share between threads; one instance
/// serves every intercepted call in the process.
#[cfg_attr(test, mockall::automock)]
pub trait Instrumenter: Send + Sync {
    /// Whether a new span should be started under `parent` for `request`.
    fn should_start(&self, parent: &TraceContext, request: &str) -> bool;

    /// Start a span for `request` and return the context that contains it.
    fn start(&self, parent: &TraceContext, request: &str)
        -> Result<TraceContext, InstrumentationError>;

    /// End the span held by `context`.
    ///
    /// `response` and `error` are reserved for status reporting; the
    /// interceptor currently passes `None` for both.
    fn end(
        &self,
        context: TraceContext,
        request: &str,
        response: Option<String>,
        error: Option<String>,
    );
}

/// Default start policy shared by the built-in backends: do not nest a span
/// under a parent chain that already has a span of the same kind.
pub fn suppress_nested(parent: &TraceContext, kind: SpanKind) -> bool {
    parent.contains_kind(kind)
}
