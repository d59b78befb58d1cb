// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Backend that emits endpoint spans through the `tracing` crate.
//!
//! Span fields follow the `tracing-opentelemetry` conventions (`otel.name`,
//! `otel.kind`) so a host that installs an OpenTelemetry layer exports them
//! under the request key with the right kind.

use std::any::Any;

use tracing::field::Empty;
use tracing::{debug, info_span, Span};

use crate::context::{SpanHandle, SpanKind, TraceContext};
use crate::error::InstrumentationError;

use super::{suppress_nested, Instrumenter};

/// [`SpanHandle`] backed by a `tracing::Span`.
#[derive(Debug)]
pub struct TracingSpan {
    span: Span,
    name: String,
    kind: SpanKind,
}

impl TracingSpan {
    /// The underlying `tracing` span.
    pub fn span(&self) -> &Span {
        &self.span
    }
}

impl SpanHandle for TracingSpan {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SpanKind {
        self.kind
    }

    fn set_attribute(&self, key: &'static str, value: String) {
        // Unknown keys are ignored by `tracing`; the endpoint keys are
        // declared up front in `start`.
        self.span.record(key, value.as_str());
    }

    fn on_enter(&self) {
        self.span.with_subscriber(|(id, dispatch)| dispatch.enter(id));
    }

    fn on_exit(&self) {
        self.span.with_subscriber(|(id, dispatch)| dispatch.exit(id));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Starts one `tracing` span per endpoint call.
#[derive(Debug, Clone)]
pub struct TracingInstrumenter {
    instrumentation_name: String,
    kind: SpanKind,
}

impl TracingInstrumenter {
    /// Create a bridge scoped to `instrumentation_name`, starting spans of `kind`.
    pub fn new(instrumentation_name: impl Into<String>, kind: SpanKind) -> Self {
        Self {
            instrumentation_name: instrumentation_name.into(),
            kind,
        }
    }

    /// Instrumentation scope recorded on every span.
    pub fn instrumentation_name(&self) -> &str {
        &self.instrumentation_name
    }
}

impl Instrumenter for TracingInstrumenter {
    fn should_start(&self, parent: &TraceContext, _request: &str) -> bool {
        !suppress_nested(parent, self.kind)
    }

    fn start(
        &self,
        parent: &TraceContext,
        request: &str,
    ) -> Result<TraceContext, InstrumentationError> {
        // Prefer the span of the explicit parent; fall back to whatever the
        // host's subscriber considers current.
        let parent_id = match parent
            .span()
            .and_then(|span| span.as_any().downcast_ref::<TracingSpan>())
        {
            Some(parent_span) => parent_span.span.id(),
            None => Span::current().id(),
        };

        let span = info_span!(
            target: "endpoint_tracer",
            parent: parent_id,
            "endpoint",
            otel.name = %request,
            otel.kind = self.kind.as_str(),
            instrumentation = %self.instrumentation_name,
            class = Empty,
            method = Empty,
            arguments = Empty,
            result = Empty,
        );

        let handle = TracingSpan {
            span,
            name: request.to_string(),
            kind: self.kind,
        };
        Ok(parent.with_span(std::sync::Arc::new(handle)))
    }

    fn end(
        &self,
        context: TraceContext,
        request: &str,
        _response: Option<String>,
        _error: Option<String>,
    ) {
        debug!(target: "endpoint_tracer", request, "Endpoint span ended");
        // The `tracing` span closes once the last clone of its context is gone.
        drop(context);
    }
}
