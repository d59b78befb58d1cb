// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Backend on the `opentelemetry` global tracer provider.
//!
//! Whatever provider the host registered with `global::set_tracer_provider`
//! receives the spans; with none registered the global tracer is a no-op and
//! so is this backend.
//!
//! OpenTelemetry spans do not expose their kind, so contexts carry an
//! [`ActiveSpanKinds`] value listing the kinds of the spans they hold. This
//! backend adds to it for every span it starts; hosts that open their own
//! server spans (an HTTP layer, say) can mark them with [`mark_span_kind`] so
//! endpoint spans nested under them are suppressed.

use std::any::Any;
use std::cell::RefCell;

use opentelemetry::global::{self, BoxedTracer};
use opentelemetry::trace::{self as otel_trace, TraceContextExt, Tracer as _};
use opentelemetry::{Context, ContextGuard, KeyValue};

use crate::context::{SpanHandle, SpanKind, TraceContext};
use crate::error::InstrumentationError;

use super::{suppress_nested, Instrumenter};

thread_local! {
    // Keyed by the address of the `OtelSpan` that attached the guard.
    static ATTACHED: RefCell<Vec<(usize, ContextGuard)>> = const { RefCell::new(Vec::new()) };
}

/// Span kinds present in an OpenTelemetry context.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveSpanKinds(Vec<SpanKind>);

impl ActiveSpanKinds {
    /// Whether a span of `kind` is present.
    pub fn contains(&self, kind: SpanKind) -> bool {
        self.0.contains(&kind)
    }
}

/// Derive a context from `cx` that records a span of `kind` as active.
pub fn mark_span_kind(cx: &Context, kind: SpanKind) -> Context {
    let mut kinds = cx.get::<ActiveSpanKinds>().cloned().unwrap_or_default();
    if !kinds.contains(kind) {
        kinds.0.push(kind);
    }
    cx.with_value(kinds)
}

fn ambient_has_kind(kind: SpanKind) -> bool {
    Context::current()
        .get::<ActiveSpanKinds>()
        .is_some_and(|kinds| kinds.contains(kind))
}

fn otel_kind(kind: SpanKind) -> otel_trace::SpanKind {
    match kind {
        SpanKind::Internal => otel_trace::SpanKind::Internal,
        SpanKind::Server => otel_trace::SpanKind::Server,
        SpanKind::Client => otel_trace::SpanKind::Client,
        SpanKind::Producer => otel_trace::SpanKind::Producer,
        SpanKind::Consumer => otel_trace::SpanKind::Consumer,
    }
}

/// [`SpanHandle`] holding an OpenTelemetry context whose active span is ours.
#[derive(Debug)]
pub struct OtelSpan {
    cx: Context,
    name: String,
    kind: SpanKind,
}

impl OtelSpan {
    /// OpenTelemetry context carrying the span.
    pub fn context(&self) -> &Context {
        &self.cx
    }

    fn key(&self) -> usize {
        self as *const Self as usize
    }
}

impl SpanHandle for OtelSpan {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SpanKind {
        self.kind
    }

    fn set_attribute(&self, key: &'static str, value: String) {
        self.cx.span().set_attribute(KeyValue::new(key, value));
    }

    // Attaching makes the span visible to other OTel instrumentation running
    // inside the traced call (HTTP clients, database drivers).
    fn on_enter(&self) {
        let key = self.key();
        let guard = self.cx.clone().attach();
        let _ = ATTACHED.try_with(|attached| attached.borrow_mut().push((key, guard)));
    }

    fn on_exit(&self) {
        let key = self.key();
        let detached = ATTACHED.try_with(|attached| {
            let mut attached = attached.borrow_mut();
            let position = attached.iter().rposition(|(k, _)| *k == key)?;
            Some(attached.remove(position))
        });
        // guard dropped outside the borrow
        drop(detached);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Starts endpoint spans on a tracer obtained from the global provider.
pub struct OtelInstrumenter {
    tracer: BoxedTracer,
    kind: SpanKind,
}

impl OtelInstrumenter {
    /// Bind to the global provider under `instrumentation_name`.
    pub fn from_global(instrumentation_name: impl Into<String>, kind: SpanKind) -> Self {
        Self {
            tracer: global::tracer(instrumentation_name.into()),
            kind,
        }
    }
}

impl std::fmt::Debug for OtelInstrumenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OtelInstrumenter")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

impl Instrumenter for OtelInstrumenter {
    fn should_start(&self, parent: &TraceContext, _request: &str) -> bool {
        !suppress_nested(parent, self.kind) && !ambient_has_kind(self.kind)
    }

    fn start(
        &self,
        parent: &TraceContext,
        request: &str,
    ) -> Result<TraceContext, InstrumentationError> {
        let parent_cx = match parent
            .span()
            .and_then(|span| span.as_any().downcast_ref::<OtelSpan>())
        {
            Some(parent_span) => parent_span.cx.clone(),
            None => Context::current(),
        };

        let span = self
            .tracer
            .span_builder(request.to_string())
            .with_kind(otel_kind(self.kind))
            .start_with_context(&self.tracer, &parent_cx);

        let handle = OtelSpan {
            cx: mark_span_kind(&parent_cx.with_span(span), self.kind),
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
        match context
            .span()
            .and_then(|span| span.as_any().downcast_ref::<OtelSpan>())
        {
            Some(span) => span.cx.span().end(),
            None => tracing::debug!(
                target: "endpoint_tracer",
                request,
                "End called on a context without an OpenTelemetry span"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_and_end_on_noop_provider() {
        let instrumenter = OtelInstrumenter::from_global("endpoints-1.0", SpanKind::Server);
        let cx = instrumenter
            .start(&TraceContext::root(), "shop::Cart#add(u32)")
            .unwrap();

        let span = cx.span().unwrap();
        assert_eq!(span.name(), "shop::Cart#add(u32)");
        assert!(span.as_any().downcast_ref::<OtelSpan>().is_some());

        let scope = cx.make_current();
        span.set_attribute("class", "shop::Cart".to_string());
        scope.close();
        instrumenter.end(cx, "shop::Cart#add(u32)", None, None);
    }

    #[test]
    fn test_nested_suppressed() {
        let instrumenter = OtelInstrumenter::from_global("endpoints-1.0", SpanKind::Server);
        let cx = instrumenter.start(&TraceContext::root(), "a#b()").unwrap();
        assert!(!instrumenter.should_start(&cx, "a#c()"));
        assert_eq!(otel_kind(SpanKind::Client), otel_trace::SpanKind::Client);
    }

    #[test]
    fn test_ambient_server_span_suppresses() {
        let instrumenter = OtelInstrumenter::from_global("endpoints-1.0", SpanKind::Server);
        assert!(instrumenter.should_start(&TraceContext::root(), "a#b()"));

        let host = mark_span_kind(&Context::current(), SpanKind::Server);
        let guard = host.attach();
        assert!(!instrumenter.should_start(&TraceContext::root(), "a#b()"));

        let client = OtelInstrumenter::from_global("endpoints-1.0", SpanKind::Client);
        assert!(client.should_start(&TraceContext::root(), "a#b()"));
        drop(guard);

        assert!(instrumenter.should_start(&TraceContext::root(), "a#b()"));
    }

    #[test]
    fn test_started_context_is_marked() {
        let instrumenter = OtelInstrumenter::from_global("endpoints-1.0", SpanKind::Server);
        let cx = instrumenter.start(&TraceContext::root(), "a#b()").unwrap();
        let span = cx.span().unwrap();
        let otel = span.as_any().downcast_ref::<OtelSpan>().unwrap();
        assert!(otel
            .context()
            .get::<ActiveSpanKinds>()
            .is_some_and(|kinds| kinds.contains(SpanKind::Server)));
    }

    #[test]
    fn test_out_of_order_exit_detaches_own_guard() {
        let instrumenter = OtelInstrumenter::from_global("endpoints-1.0", SpanKind::Internal);
        let outer = instrumenter.start(&TraceContext::root(), "outer").unwrap();
        let inner = instrumenter.start(&outer, "inner").unwrap();
        let outer_span = outer.span().unwrap();
        let inner_span = inner.span().unwrap();

        outer_span.on_enter();
        inner_span.on_enter();
        outer_span.on_exit();

        let inner_key = inner_span
            .as_any()
            .downcast_ref::<OtelSpan>()
            .unwrap()
            .key();
        let remaining: Vec<usize> =
            ATTACHED.with(|attached| attached.borrow().iter().map(|(k, _)| *k).collect());
        assert_eq!(remaining, vec![inner_key]);

        inner_span.on_exit();
        assert!(ATTACHED.with(|attached| attached.borrow().is_empty()));
    }
}
