// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Trace context propagation.
//!
//! A [`TraceContext`] is an immutable, cheaply clonable chain of spans. The
//! interceptor passes contexts around explicitly; the only implicit state is
//! the per-thread "current" context, which is touched exclusively through
//! [`TraceContext::current`] and [`TraceContext::make_current`].
//!
//! Making a context current yields a [`Scope`]. Closing (or dropping) the
//! scope restores whatever was current before it was opened. Scopes are
//! bound to the thread that opened them and are therefore `!Send`.

use std::any::Any;
use std::cell::RefCell;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

/// The role a span plays in a trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    Internal,
    #[default]
    Server,
    Client,
    Producer,
    Consumer,
}

impl SpanKind {
    /// Lowercase name, as used for `otel.kind` style fields.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Internal => "internal",
            Self::Server => "server",
            Self::Client => "client",
            Self::Producer => "producer",
            Self::Consumer => "consumer",
        }
    }
}

impl fmt::Display for SpanKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A live span owned by a tracing backend.
///
/// Attributes are append-only; nothing in this crate reads them back.
pub trait SpanHandle: Send + Sync + fmt::Debug {
    /// Operation name the span was started with.
    fn name(&self) -> &str;

    /// Kind the span was started with.
    fn kind(&self) -> SpanKind;

    /// Attach a string attribute to the span.
    fn set_attribute(&self, key: &'static str, value: String);

    /// Called when a scope makes this span current on the calling thread.
    fn on_enter(&self) {}

    /// Called when that scope closes, on the same thread.
    fn on_exit(&self) {}

    /// Downcast hook so a backend can recover its own span type from a parent.
    fn as_any(&self) -> &dyn Any;
}

struct ContextNode {
    span: Arc<dyn SpanHandle>,
    parent: TraceContext,
}

/// Position in a trace: the innermost span plus all of its ancestors.
#[derive(Clone, Default)]
pub struct TraceContext {
    node: Option<Arc<ContextNode>>,
}

thread_local! {
    static CURRENT: RefCell<TraceContext> = RefCell::new(TraceContext::root());
}

impl TraceContext {
    /// The empty context: no span, no parent.
    pub fn root() -> Self {
        Self { node: None }
    }

    /// Context currently active on this thread.
    pub fn current() -> Self {
        CURRENT
            .try_with(|current| current.borrow().clone())
            .unwrap_or_default()
    }

    /// Derive a child context whose innermost span is `span`.
    pub fn with_span(&self, span: Arc<dyn SpanHandle>) -> Self {
        Self {
            node: Some(Arc::new(ContextNode {
                span,
                parent: self.clone(),
            })),
        }
    }

    /// Innermost span, if any.
    pub fn span(&self) -> Option<&Arc<dyn SpanHandle>> {
        self.node.as_ref().map(|node| &node.span)
    }

    /// Context this one was derived from.
    pub fn parent(&self) -> Option<&TraceContext> {
        self.node.as_ref().map(|node| &node.parent)
    }

    /// True when this context holds no span at all.
    pub fn is_root(&self) -> bool {
        self.node.is_none()
    }

    /// Iterate over spans from innermost to outermost.
    pub fn spans(&self) -> impl Iterator<Item = &Arc<dyn SpanHandle>> {
        let mut cursor = self.node.as_deref();
        std::iter::from_fn(move || {
            let node = cursor?;
            cursor = node.parent.node.as_deref();
            Some(&node.span)
        })
    }

    /// Whether any span in the chain has the given kind.
    pub fn contains_kind(&self, kind: SpanKind) -> bool {
        self.spans().any(|span| span.kind() == kind)
    }

    /// Identity comparison: same chain, not merely equal content.
    pub fn ptr_eq(&self, other: &TraceContext) -> bool {
        match (&self.node, &other.node) {
            (Some(a), Some(b)) => Arc::ptr_eq(a, b),
            (None, None) => true,
            _ => false,
        }
    }

    /// Make this context the current one on this thread until the returned
    /// scope is closed.
    pub fn make_current(&self) -> Scope {
        let previous = CURRENT
            .try_with(|current| current.replace(self.clone()))
            .unwrap_or_default();
        // Built before the hook runs so a panicking hook still restores.
        let mut scope = Scope {
            installed: self.clone(),
            previous: Some(previous),
            entered: false,
            _not_send: PhantomData,
        };
        if let Some(span) = self.span() {
            span.on_enter();
        }
        scope.entered = true;
        scope
    }
}

impl fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.spans().map(|span| span.name()).collect();
        f.debug_struct("TraceContext").field("spans", &names).finish()
    }
}

/// Span of the context currently active on this thread.
pub fn current_span() -> Option<Arc<dyn SpanHandle>> {
    TraceContext::current().span().cloned()
}

/// Guard that keeps a context current. Closes exactly once.
#[must_use = "dropping a scope immediately restores the previous context"]
pub struct Scope {
    installed: TraceContext,
    previous: Option<TraceContext>,
    // `on_exit` only pairs with an `on_enter` that returned
    entered: bool,
    _not_send: PhantomData<*const ()>,
}

impl Scope {
    /// Restore the context that was current before this scope was opened.
    pub fn close(mut self) {
        self.restore();
    }

    fn restore(&mut self) {
        let Some(previous) = self.previous.take() else {
            return;
        };
        let _ = CURRENT.try_with(|current| {
            let mut current = current.borrow_mut();
            if !current.ptr_eq(&self.installed) {
                tracing::warn!(
                    target: "endpoint_tracer",
                    expected = ?self.installed,
                    actual = ?*current,
                    "Closing a scope that is not the current context"
                );
            }
            *current = previous;
        });
        if !self.entered {
            return;
        }
        if let Some(span) = self.installed.span() {
            span.on_exit();
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.restore();
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("installed", &self.installed)
            .field("closed", &self.previous.is_none())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct TestSpan {
        name: String,
        kind: SpanKind,
        entered: AtomicUsize,
        exited: AtomicUsize,
    }

    impl TestSpan {
        fn new(name: &str, kind: SpanKind) -> Arc<Self> {
            Arc::new(Self {
                name: name.to_string(),
                kind,
                ..Default::default()
            })
        }
    }

    impl SpanHandle for TestSpan {
        fn name(&self) -> &str {
            &self.name
        }

        fn kind(&self) -> SpanKind {
            self.kind
        }

        fn set_attribute(&self, _key: &'static str, _value: String) {}

        fn on_enter(&self) {
            self.entered.fetch_add(1, Ordering::SeqCst);
        }

        fn on_exit(&self) {
            self.exited.fetch_add(1, Ordering::SeqCst);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_root_context_is_empty() {
        let cx = TraceContext::root();
        assert!(cx.is_root());
        assert!(cx.span().is_none());
        assert!(cx.parent().is_none());
        assert!(!cx.contains_kind(SpanKind::Server));
    }

    #[test]
    fn test_with_span_chains_parents() {
        let outer = TraceContext::root().with_span(TestSpan::new("outer", SpanKind::Server));
        let inner = outer.with_span(TestSpan::new("inner", SpanKind::Internal));

        let names: Vec<&str> = inner.spans().map(|s| s.name()).collect();
        assert_eq!(names, vec!["inner", "outer"]);
        assert!(inner.parent().unwrap().ptr_eq(&outer));
        assert!(inner.contains_kind(SpanKind::Server));
        assert!(!outer.contains_kind(SpanKind::Client));
    }

    #[test]
    fn test_make_current_and_close_restores() {
        let span = TestSpan::new("op", SpanKind::Server);
        let cx = TraceContext::root().with_span(span.clone());

        assert!(TraceContext::current().is_root());
        let scope = cx.make_current();
        assert!(TraceContext::current().ptr_eq(&cx));
        assert_eq!(current_span().unwrap().name(), "op");
        assert_eq!(span.entered.load(Ordering::SeqCst), 1);

        scope.close();
        assert!(TraceContext::current().is_root());
        assert_eq!(span.exited.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_scope_drop_restores_once() {
        let span = TestSpan::new("op", SpanKind::Server);
        let cx = TraceContext::root().with_span(span.clone());
        {
            let _scope = cx.make_current();
            assert!(!TraceContext::current().is_root());
        }
        assert!(TraceContext::current().is_root());
        assert_eq!(span.exited.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_nested_scopes_restore_in_order() {
        let outer = TraceContext::root().with_span(TestSpan::new("outer", SpanKind::Server));
        let inner = outer.with_span(TestSpan::new("inner", SpanKind::Internal));

        let outer_scope = outer.make_current();
        let inner_scope = inner.make_current();
        assert!(TraceContext::current().ptr_eq(&inner));

        inner_scope.close();
        assert!(TraceContext::current().ptr_eq(&outer));
        outer_scope.close();
        assert!(TraceContext::current().is_root());
    }

    #[test]
    fn test_current_is_thread_local() {
        let cx = TraceContext::root().with_span(TestSpan::new("main", SpanKind::Server));
        let _scope = cx.make_current();

        let seen_root = std::thread::spawn(|| TraceContext::current().is_root())
            .join()
            .unwrap();
        assert!(seen_root);
    }

    #[derive(Debug)]
    struct RefusesEnter {
        exited: AtomicUsize,
    }

    impl SpanHandle for RefusesEnter {
        fn name(&self) -> &str {
            "refuses"
        }

        fn kind(&self) -> SpanKind {
            SpanKind::Server
        }

        fn set_attribute(&self, _key: &'static str, _value: String) {}

        fn on_enter(&self) {
            panic!("enter hook failed");
        }

        fn on_exit(&self) {
            self.exited.fetch_add(1, Ordering::SeqCst);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn test_panicking_enter_hook_restores_previous() {
        let span = Arc::new(RefusesEnter {
            exited: AtomicUsize::new(0),
        });
        let cx = TraceContext::root().with_span(span.clone());

        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| cx.make_current()));
        assert!(outcome.is_err());
        assert!(TraceContext::current().is_root());
        assert_eq!(span.exited.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_span_kind_serde() {
        assert_eq!(serde_json::to_string(&SpanKind::Server).unwrap(), "\"server\"");
        let parsed: SpanKind = serde_json::from_str("\"client\"").unwrap();
        assert_eq!(parsed, SpanKind::Client);
        assert_eq!(SpanKind::default(), SpanKind::Server);
    }
}
