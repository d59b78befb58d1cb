// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Endpoint tracer - method-boundary tracing for service endpoints.
//!
//! Wraps each endpoint call in a span named `Type#method(signature)`, with the
//! serialized arguments and return value attached as attributes. Tracing never
//! changes what the traced call does: instrumentation errors and panics are
//! logged and discarded, the call's own result, `Err` or panic passes through.
//!
//! # Architecture
//!
//! - [`interceptor`] - entry/exit protocol around one call ([`Interceptor`], [`CallFrame`])
//! - [`serializer`] - bounded, deterministic attribute serialization
//! - [`registry`] - lazily initialized process-wide backend and serializer
//! - [`instrumenter`] - the backend contract and its implementations
//! - [`context`] - trace context chain and the per-thread current context
//! - [`config`] - file and environment configuration
//! - [`telemetry`] - logging setup and interceptor counters
//! - [`error`] - error types and result aliases
//!
//! # Example
//!
//! ```rust,ignore
//! use endpoint_tracer::{call_identity, Interceptor};
//!
//! let interceptor = Interceptor::global();
//! let user = interceptor.intercept(
//!     &call_identity!(UserService, get_user(u32)),
//!     &(42,),
//!     || service.get_user(42),
//! );
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod instrumenter;
pub mod interceptor;
pub mod registry;
pub mod serializer;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use config::InstrumentationConfig;
pub use context::{current_span, Scope, SpanHandle, SpanKind, TraceContext};
pub use error::{ConfigError, InstrumentationError, Result, SerializationError};
pub use instrumenter::{InMemoryInstrumenter, Instrumenter, NoopInstrumenter, TracingInstrumenter};
#[cfg(feature = "otel")]
pub use instrumenter::OtelInstrumenter;
pub use interceptor::{CallFrame, CallIdentity, Interceptor};
pub use registry::set_global_instrumenter;
pub use serializer::{AttributeSerializer, SerializerLimits};

/// Crate version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
