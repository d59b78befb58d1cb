// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Process-wide instrumentation registry.
//!
//! Holds the one backend and the one serializer shared by every interceptor
//! obtained through [`Interceptor::global`](crate::Interceptor::global).
//! Initialization is lazy and happens exactly once, on first access from any
//! thread; concurrent first accesses block until the winner has finished.
//!
//! Backend discovery, in order:
//!
//! 1. instrumentation disabled by config: the inert backend
//! 2. the backend passed to [`set_global_instrumenter`], if that call was
//!    the one to initialize the registry
//! 3. with the `otel` feature: the `opentelemetry` global tracer
//! 4. a global `tracing` subscriber is installed: the `tracing` bridge
//! 5. otherwise: the inert backend
//!
//! Nothing here ever fails past its accessor. Config errors and panics during
//! discovery degrade to defaults or to the inert backend.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{load_config, InstrumentationConfig};
use crate::error::InstrumentationError;
use crate::instrumenter::{Instrumenter, NoopInstrumenter};
use crate::interceptor::Interceptor;
use crate::serializer::AttributeSerializer;
use crate::telemetry::GLOBAL_METRICS;

static INSTRUMENTATION: OnceCell<EndpointInstrumentation> = OnceCell::new();

/// Initialize the registry around `instrumenter`.
///
/// Binding is itself the initialization: it succeeds only if no thread has
/// initialized the registry yet, through this call or through [`global`].
/// Otherwise it returns [`InstrumentationError::AlreadyBound`].
pub fn set_global_instrumenter(
    instrumenter: Arc<dyn Instrumenter>,
) -> Result<(), InstrumentationError> {
    if INSTRUMENTATION.get().is_some() {
        return Err(InstrumentationError::AlreadyBound);
    }
    INSTRUMENTATION
        .set(EndpointInstrumentation::resolve(Some(instrumenter)))
        .map_err(|_| InstrumentationError::AlreadyBound)
}

/// Whether the registry has been initialized.
pub fn is_initialized() -> bool {
    INSTRUMENTATION.get().is_some()
}

/// The registry, initializing it on first call.
pub fn global() -> &'static EndpointInstrumentation {
    INSTRUMENTATION.get_or_init(|| EndpointInstrumentation::resolve(None))
}

/// The process-wide backend, serializer and the config they came from.
pub struct EndpointInstrumentation {
    instrumenter: Arc<dyn Instrumenter>,
    serializer: AttributeSerializer,
    config: InstrumentationConfig,
}

impl EndpointInstrumentation {
    fn resolve(bound: Option<Arc<dyn Instrumenter>>) -> Self {
        let config = load_config().unwrap_or_else(|err| {
            warn!(
                target: "endpoint_tracer",
                error = %err,
                "Invalid instrumentation config, using defaults"
            );
            InstrumentationConfig::default()
        });

        let instrumenter = panic::catch_unwind(AssertUnwindSafe(|| select_backend(&config, bound)))
            .unwrap_or_else(|payload| {
                let err = InstrumentationError::from_panic(payload.as_ref());
                warn!(
                    target: "endpoint_tracer",
                    error = %err,
                    "Tracing backend unavailable, endpoint tracing disabled"
                );
                Arc::new(NoopInstrumenter)
            });

        Self {
            instrumenter,
            serializer: AttributeSerializer::new(config.serializer),
            config,
        }
    }

    /// The backend every global interceptor starts and ends spans with.
    pub fn instrumenter(&self) -> &Arc<dyn Instrumenter> {
        &self.instrumenter
    }

    /// The shared attribute serializer.
    pub fn serializer(&self) -> &AttributeSerializer {
        &self.serializer
    }

    /// Config resolved at initialization.
    pub fn config(&self) -> &InstrumentationConfig {
        &self.config
    }

    /// An interceptor on the shared backend, reporting into [`GLOBAL_METRICS`].
    pub fn interceptor(&self) -> Interceptor {
        Interceptor::new(self.instrumenter.clone())
            .with_config(&self.config)
            .with_serializer(self.serializer.clone())
            .with_metrics(GLOBAL_METRICS.clone())
    }
}

impl std::fmt::Debug for EndpointInstrumentation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EndpointInstrumentation")
            .field("serializer", &self.serializer)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

fn select_backend(
    config: &InstrumentationConfig,
    bound: Option<Arc<dyn Instrumenter>>,
) -> Arc<dyn Instrumenter> {
    if !config.enabled {
        info!(target: "endpoint_tracer", "Endpoint instrumentation disabled");
        return Arc::new(NoopInstrumenter);
    }

    if let Some(bound) = bound {
        debug!(target: "endpoint_tracer", "Using explicitly bound backend");
        return bound;
    }

    #[cfg(feature = "otel")]
    {
        debug!(
            target: "endpoint_tracer",
            name = %config.instrumentation_name,
            "Binding to the opentelemetry global tracer"
        );
        return Arc::new(crate::instrumenter::OtelInstrumenter::from_global(
            config.instrumentation_name.clone(),
            config.span_kind,
        ));
    }

    #[cfg(not(feature = "otel"))]
    {
        if tracing::dispatcher::has_been_set() {
            debug!(
                target: "endpoint_tracer",
                name = %config.instrumentation_name,
                "Binding to the global tracing subscriber"
            );
            return Arc::new(crate::instrumenter::TracingInstrumenter::new(
                config.instrumentation_name.clone(),
                config.span_kind,
            ));
        }

        debug!(target: "endpoint_tracer", "No tracing backend registered, endpoint tracing is inert");
        Arc::new(NoopInstrumenter)
    }
}
