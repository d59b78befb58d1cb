// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

use crate::context::TraceContext;
use crate::error::InstrumentationError;

use super::Instrumenter;

/// Inert backend bound when tracing is disabled or unavailable.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopInstrumenter;

impl Instrumenter for NoopInstrumenter {
    fn should_start(&self, _parent: &TraceContext, _request: &str) -> bool {
        false
    }

    fn start(
        &self,
        parent: &TraceContext,
        _request: &str,
    ) -> Result<TraceContext, InstrumentationError> {
        Ok(parent.clone())
    }

    fn end(
        &self,
        _context: TraceContext,
        _request: &str,
        _response: Option<String>,
        _error: Option<String>,
    ) {
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_noop_never_starts() {
        let noop = NoopInstrumenter;
        assert!(!noop.should_start(&TraceContext::root(), "a.B#c()"));
    }

    #[test]
    fn test_noop_start_returns_parent() {
        let noop = NoopInstrumenter;
        let parent = TraceContext::root();
        let cx = noop.start(&parent, "a.B#c()").unwrap();
        assert!(cx.ptr_eq(&parent));
        noop.end(cx, "a.B#c()", None, None);
    }
}
