// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Counters describing what the interceptor did.
//!
//! Lock-free and cheap enough to bump on every intercepted call.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Counters shared by every interceptor obtained through the global registry.
pub static GLOBAL_METRICS: Lazy<Arc<InstrumentationMetrics>> =
    Lazy::new(|| Arc::new(InstrumentationMetrics::new()));

/// Interceptor counters.
#[derive(Debug, Default)]
pub struct InstrumentationMetrics {
    started: AtomicU64,
    suppressed: AtomicU64,
    ended: AtomicU64,
    entry_failures: AtomicU64,
    exit_failures: AtomicU64,
    serializer_fallbacks: AtomicU64,
}

impl InstrumentationMetrics {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_started(&self) {
        self.started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_suppressed(&self) {
        self.suppressed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_ended(&self) {
        self.ended.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_entry_failure(&self) {
        self.entry_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_exit_failure(&self) {
        self.exit_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_serializer_fallback(&self) {
        self.serializer_fallbacks.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a snapshot of all counters.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            started: self.started.load(Ordering::Relaxed),
            suppressed: self.suppressed.load(Ordering::Relaxed),
            ended: self.ended.load(Ordering::Relaxed),
            entry_failures: self.entry_failures.load(Ordering::Relaxed),
            exit_failures: self.exit_failures.load(Ordering::Relaxed),
            serializer_fallbacks: self.serializer_fallbacks.load(Ordering::Relaxed),
        }
    }

    /// Reset all counters.
    pub fn reset(&self) {
        self.started.store(0, Ordering::Relaxed);
        self.suppressed.store(0, Ordering::Relaxed);
        self.ended.store(0, Ordering::Relaxed);
        self.entry_failures.store(0, Ordering::Relaxed);
        self.exit_failures.store(0, Ordering::Relaxed);
        self.serializer_fallbacks.store(0, Ordering::Relaxed);
    }
}

/// Point-in-time copy of [`InstrumentationMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Calls for which a span was started.
    pub started: u64,

    /// Calls the backend declined to trace.
    pub suppressed: u64,

    /// Started calls whose span was ended.
    pub ended: u64,

    /// Failures swallowed on the entry path.
    pub entry_failures: u64,

    /// Failures swallowed on the exit path.
    pub exit_failures: u64,

    /// Attributes replaced by a placeholder.
    pub serializer_fallbacks: u64,
}

impl MetricsSnapshot {
    /// Spans started but not yet ended.
    pub fn in_flight(&self) -> u64 {
        self.started.saturating_sub(self.ended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = InstrumentationMetrics::new();
        metrics.record_started();
        metrics.record_started();
        metrics.record_ended();
        metrics.record_suppressed();
        metrics.record_serializer_fallback();

        let snap = metrics.snapshot();
        assert_eq!(snap.started, 2);
        assert_eq!(snap.ended, 1);
        assert_eq!(snap.suppressed, 1);
        assert_eq!(snap.serializer_fallbacks, 1);
        assert_eq!(snap.in_flight(), 1);
    }

    #[test]
    fn test_reset() {
        let metrics = InstrumentationMetrics::new();
        metrics.record_entry_failure();
        metrics.record_exit_failure();
        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
