// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Call interceptor.
//!
//! Wraps one endpoint call in a span. The protocol per call:
//!
//! ```text
//! enter: parent = current context
//!        key    = declaring_type + "#" + method_name + method_signature
//!        should_start(parent, key)?  no  -> frame stays NotStarted
//!                                    yes -> start, make current, set
//!                                           class / method / arguments
//! exit:  NotStarted -> nothing
//!        Started    -> set result, close scope, end(context, key)
//! ```
//!
//! Every step of entry and exit runs behind `catch_unwind`; an error or panic
//! in the instrumentation is logged and counted, never propagated. The traced
//! call's own return value, `Err`, or panic passes through untouched. A
//! [`CallFrame`] that is dropped without [`CallFrame::exit`] (early return,
//! unwinding) still closes its scope and ends its span.

use std::borrow::Cow;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use anyhow::{anyhow, Context as _};
use serde::Serialize;
use tracing::{debug, trace};

use crate::config::InstrumentationConfig;
use crate::context::{Scope, TraceContext};
use crate::error::InstrumentationError;
use crate::instrumenter::Instrumenter;
use crate::serializer::AttributeSerializer;
use crate::telemetry::InstrumentationMetrics;

/// Span attribute holding the declaring type.
pub const CLASS_ATTRIBUTE: &str = "class";

/// Span attribute holding method name plus signature.
pub const METHOD_ATTRIBUTE: &str = "method";

/// Span attribute holding the serialized argument list.
pub const ARGUMENTS_ATTRIBUTE: &str = "arguments";

/// Span attribute holding the serialized return value.
pub const RESULT_ATTRIBUTE: &str = "result";

/// Static identity of an intercepted method.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallIdentity {
    declaring_type: Cow<'static, str>,
    method_name: Cow<'static, str>,
    method_signature: Cow<'static, str>,
}

impl CallIdentity {
    /// Build an identity from its three parts. `method_signature` is the
    /// parenthesized parameter list, e.g. `"(int)"`.
    pub fn new(
        declaring_type: impl Into<Cow<'static, str>>,
        method_name: impl Into<Cow<'static, str>>,
        method_signature: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self {
            declaring_type: declaring_type.into(),
            method_name: method_name.into(),
            method_signature: method_signature.into(),
        }
    }

    /// Identity of a method declared on `T`, named by `std::any::type_name`.
    pub fn of<T: ?Sized>(
        method_name: impl Into<Cow<'static, str>>,
        method_signature: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::new(std::any::type_name::<T>(), method_name, method_signature)
    }

    pub fn declaring_type(&self) -> &str {
        &self.declaring_type
    }

    pub fn method_name(&self) -> &str {
        &self.method_name
    }

    pub fn method_signature(&self) -> &str {
        &self.method_signature
    }

    /// Method name followed by its signature: `getUser(int)`.
    pub fn signature(&self) -> String {
        format!("{}{}", self.method_name, self.method_signature)
    }

    /// Operation name and entry/exit pairing key: `Type#getUser(int)`.
    pub fn request_key(&self) -> String {
        format!("{}#{}", self.declaring_type, self.signature())
    }
}

impl fmt::Display for CallIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#{}{}",
            self.declaring_type, self.method_name, self.method_signature
        )
    }
}

/// Build a [`CallIdentity`] for a method on a type.
///
/// # Example
///
/// ```rust,ignore
/// let identity = call_identity!(UserService, get_user(u64));
/// assert_eq!(identity.signature(), "get_user(u64)");
/// ```
#[macro_export]
macro_rules! call_identity {
    ($ty:ty, $method:ident($($arg:ty),* $(,)?)) => {
        $crate::CallIdentity::of::<$ty>(
            stringify!($method),
            concat!("(", stringify!($($arg),*), ")"),
        )
    };
}

/// Wraps endpoint calls in spans.
#[derive(Clone)]
pub struct Interceptor {
    instrumenter: Arc<dyn Instrumenter>,
    serializer: AttributeSerializer,
    capture_arguments: bool,
    capture_result: bool,
    metrics: Arc<InstrumentationMetrics>,
}

impl Interceptor {
    /// Create an interceptor on an explicit backend, with default settings.
    pub fn new(instrumenter: Arc<dyn Instrumenter>) -> Self {
        Self {
            instrumenter,
            serializer: AttributeSerializer::default(),
            capture_arguments: true,
            capture_result: true,
            metrics: Arc::new(InstrumentationMetrics::new()),
        }
    }

    /// Interceptor bound to the process-wide registry.
    pub fn global() -> Self {
        crate::registry::global().interceptor()
    }

    /// Use a specific serializer.
    pub fn with_serializer(mut self, serializer: AttributeSerializer) -> Self {
        self.serializer = serializer;
        self
    }

    /// Apply capture flags and serializer limits from a config.
    pub fn with_config(mut self, config: &InstrumentationConfig) -> Self {
        self.serializer = AttributeSerializer::new(config.serializer);
        self.capture_arguments = config.capture_arguments;
        self.capture_result = config.capture_result;
        self
    }

    /// Report into shared counters instead of private ones.
    pub fn with_metrics(mut self, metrics: Arc<InstrumentationMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn instrumenter(&self) -> &Arc<dyn Instrumenter> {
        &self.instrumenter
    }

    pub fn serializer(&self) -> &AttributeSerializer {
        &self.serializer
    }

    pub fn metrics(&self) -> &Arc<InstrumentationMetrics> {
        &self.metrics
    }

    /// Entry hook. Call immediately before the traced call runs.
    pub fn enter<A>(&self, identity: &CallIdentity, arguments: &A) -> CallFrame<'_>
    where
        A: Serialize + ?Sized,
    {
        let mut frame = CallFrame {
            interceptor: self,
            request: String::new(),
            state: FrameState::NotStarted,
        };

        let entered = panic::catch_unwind(AssertUnwindSafe(|| {
            self.try_enter(&mut frame, identity, arguments)
        }));
        let failure = match entered {
            Ok(Ok(())) => None,
            Ok(Err(err)) => Some(err),
            Err(payload) => Some(InstrumentationError::from_panic(payload.as_ref()).into()),
        };
        if let Some(err) = failure {
            self.metrics.record_entry_failure();
            let message = format!("{:#}", err);
            debug!(
                target: "endpoint_tracer",
                request = %frame.request,
                error = %message,
                "Suppressed instrumentation failure on entry"
            );
        }
        frame
    }

    // Fields of `frame` are assigned as soon as each step succeeds, so a
    // failure part-way leaves the frame describing exactly what exists.
    fn try_enter<A>(
        &self,
        frame: &mut CallFrame<'_>,
        identity: &CallIdentity,
        arguments: &A,
    ) -> crate::Result<()>
    where
        A: Serialize + ?Sized,
    {
        let parent = TraceContext::current();
        frame.request = identity.request_key();

        if !self.instrumenter.should_start(&parent, &frame.request) {
            self.metrics.record_suppressed();
            trace!(target: "endpoint_tracer", request = %frame.request, "Span not started");
            return Ok(());
        }

        let context = self
            .instrumenter
            .start(&parent, &frame.request)
            .context("starting endpoint span")?;
        let span = context.span().cloned();
        // Recorded before any span hook runs, so exit ends the span even if
        // making it current fails.
        frame.state = FrameState::Started {
            context: context.clone(),
            scope: None,
        };
        self.metrics.record_started();

        let opened = context.make_current();
        if let FrameState::Started { scope, .. } = &mut frame.state {
            *scope = Some(opened);
        }

        let span = span.ok_or_else(|| anyhow!("backend started a context without a span"))?;
        span.set_attribute(CLASS_ATTRIBUTE, identity.declaring_type().to_string());
        span.set_attribute(METHOD_ATTRIBUTE, identity.signature());
        if self.capture_arguments {
            span.set_attribute(ARGUMENTS_ATTRIBUTE, self.attribute_value(arguments));
        }
        Ok(())
    }

    fn attribute_value<T: Serialize + ?Sized>(&self, value: &T) -> String {
        match self.serializer.serialize_guarded(value) {
            Ok(text) => text,
            Err(err) => {
                self.metrics.record_serializer_fallback();
                debug!(target: "endpoint_tracer", error = %err, "Attribute replaced by placeholder");
                self.serializer.placeholder(&err)
            }
        }
    }

    fn exit_failed(&self, request: &str, step: &str, payload: Box<dyn std::any::Any + Send>) {
        self.metrics.record_exit_failure();
        let err = InstrumentationError::from_panic(payload.as_ref());
        debug!(
            target: "endpoint_tracer",
            request,
            step,
            error = %err,
            "Suppressed instrumentation failure on exit"
        );
    }

    /// Trace `call`, recording its return value as `result`.
    pub fn intercept<A, R, F>(&self, identity: &CallIdentity, arguments: &A, call: F) -> R
    where
        A: Serialize + ?Sized,
        R: Serialize,
        F: FnOnce() -> R,
    {
        let frame = self.enter(identity, arguments);
        let result = call();
        frame.exit(Some(&result));
        result
    }

    /// Trace a fallible `call`. `Ok` values are recorded as `result`; on
    /// `Err` the result is recorded as absent and the error is returned as is.
    pub fn intercept_result<A, T, E, F>(
        &self,
        identity: &CallIdentity,
        arguments: &A,
        call: F,
    ) -> Result<T, E>
    where
        A: Serialize + ?Sized,
        T: Serialize,
        F: FnOnce() -> Result<T, E>,
    {
        let frame = self.enter(identity, arguments);
        let outcome = call();
        match &outcome {
            Ok(value) => frame.exit(Some(value)),
            Err(_) => frame.exit::<T>(None),
        }
        outcome
    }
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("serializer", &self.serializer)
            .field("capture_arguments", &self.capture_arguments)
            .field("capture_result", &self.capture_result)
            .finish_non_exhaustive()
    }
}

enum FrameState {
    NotStarted,
    Started {
        context: TraceContext,
        scope: Option<Scope>,
    },
    Ended,
}

/// Per-call state shared between entry and exit.
///
/// Bound to the thread that entered it. Dropping a started frame without
/// calling [`exit`](Self::exit) ends it with an absent result.
#[must_use = "dropping a frame ends its span immediately"]
pub struct CallFrame<'a> {
    interceptor: &'a Interceptor,
    request: String,
    state: FrameState,
}

impl CallFrame<'_> {
    /// Whether a span was started for this call.
    pub fn is_started(&self) -> bool {
        matches!(self.state, FrameState::Started { .. })
    }

    /// Request key computed at entry; empty if entry failed before computing it.
    pub fn request_key(&self) -> &str {
        &self.request
    }

    /// Exit hook. `None` means the call produced no value (it failed).
    pub fn exit<R: Serialize + ?Sized>(mut self, result: Option<&R>) {
        self.finish(result);
    }

    fn finish<R: Serialize + ?Sized>(&mut self, result: Option<&R>) {
        let FrameState::Started { context, scope } =
            std::mem::replace(&mut self.state, FrameState::Ended)
        else {
            return;
        };
        let interceptor = self.interceptor;
        let request = self.request.as_str();

        if interceptor.capture_result {
            let recorded = panic::catch_unwind(AssertUnwindSafe(|| {
                if let Some(span) = context.span() {
                    let value = match result {
                        Some(value) => interceptor.attribute_value(value),
                        None => interceptor.attribute_value(&()),
                    };
                    span.set_attribute(RESULT_ATTRIBUTE, value);
                }
            }));
            if let Err(payload) = recorded {
                interceptor.exit_failed(request, "result", payload);
            }
        }

        if let Some(scope) = scope {
            if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| scope.close())) {
                interceptor.exit_failed(request, "scope", payload);
            }
        }

        let ended = panic::catch_unwind(AssertUnwindSafe(|| {
            interceptor.instrumenter.end(context, request, None, None)
        }));
        match ended {
            Ok(()) => interceptor.metrics.record_ended(),
            Err(payload) => interceptor.exit_failed(request, "end", payload),
        }
    }
}

impl Drop for CallFrame<'_> {
    fn drop(&mut self) {
        self.finish::<()>(None);
    }
}

impl fmt::Debug for CallFrame<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match self.state {
            FrameState::NotStarted => "not_started",
            FrameState::Started { .. } => "started",
            FrameState::Ended => "ended",
        };
        f.debug_struct("CallFrame")
            .field("request", &self.request)
            .field("state", &state)
            .finish()
    }
}
