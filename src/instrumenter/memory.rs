// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! In-memory backend.
//!
//! Records every started and finished span so tests (and hosts that want to
//! inspect what the interceptor produced) can assert on attributes and on
//! start/end pairing.

use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, ThreadId};

use crate::context::{SpanHandle, SpanKind, TraceContext};
use crate::error::InstrumentationError;

use super::{suppress_nested, Instrumenter};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Live span recorded by [`InMemoryInstrumenter`].
#[derive(Debug)]
pub struct RecordedSpan {
    id: u64,
    parent_id: Option<u64>,
    name: String,
    kind: SpanKind,
    thread: ThreadId,
    attributes: Mutex<BTreeMap<&'static str, String>>,
    enters: AtomicUsize,
    exits: AtomicUsize,
}

impl RecordedSpan {
    /// Snapshot of the span as it currently stands.
    pub fn snapshot(&self) -> SpanData {
        SpanData {
            id: self.id,
            parent_id: self.parent_id,
            name: self.name.clone(),
            kind: self.kind,
            thread: self.thread,
            attributes: lock(&self.attributes)
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
            enters: self.enters.load(Ordering::SeqCst),
            exits: self.exits.load(Ordering::SeqCst),
        }
    }
}

impl SpanHandle for RecordedSpan {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> SpanKind {
        self.kind
    }

    fn set_attribute(&self, key: &'static str, value: String) {
        lock(&self.attributes).insert(key, value);
    }

    fn on_enter(&self) {
        self.enters.fetch_add(1, Ordering::SeqCst);
    }

    fn on_exit(&self) {
        self.exits.fetch_add(1, Ordering::SeqCst);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Immutable copy of a recorded span.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpanData {
    pub id: u64,
    pub parent_id: Option<u64>,
    pub name: String,
    pub kind: SpanKind,
    pub thread: ThreadId,
    pub attributes: BTreeMap<String, String>,
    /// How many times a scope made this span current.
    pub enters: usize,
    /// How many times such a scope was closed.
    pub exits: usize,
}

impl SpanData {
    /// Look up an attribute by key.
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

/// Backend that keeps spans in memory.
#[derive(Debug)]
pub struct InMemoryInstrumenter {
    kind: SpanKind,
    suppress_nested: bool,
    next_id: AtomicU64,
    started: Mutex<Vec<Arc<RecordedSpan>>>,
    finished: Mutex<Vec<SpanData>>,
    ends_without_span: AtomicUsize,
}

impl InMemoryInstrumenter {
    /// Create a backend that starts server spans and suppresses nested ones.
    pub fn new() -> Self {
        Self {
            kind: SpanKind::Server,
            suppress_nested: true,
            next_id: AtomicU64::new(1),
            started: Mutex::new(Vec::new()),
            finished: Mutex::new(Vec::new()),
            ends_without_span: AtomicUsize::new(0),
        }
    }

    /// Use a different span kind.
    pub fn with_kind(mut self, kind: SpanKind) -> Self {
        self.kind = kind;
        self
    }

    /// Start spans even when a same-kind span is already in the parent chain.
    pub fn allow_nested(mut self) -> Self {
        self.suppress_nested = false;
        self
    }

    /// Number of `start` calls so far.
    pub fn start_count(&self) -> usize {
        lock(&self.started).len()
    }

    /// Number of `end` calls that closed a recorded span.
    pub fn end_count(&self) -> usize {
        lock(&self.finished).len()
    }

    /// Number of `end` calls whose context held no span from this backend.
    pub fn orphan_end_count(&self) -> usize {
        self.ends_without_span.load(Ordering::SeqCst)
    }

    /// Spans that have been started, in start order, as they stand now.
    pub fn started_spans(&self) -> Vec<SpanData> {
        lock(&self.started).iter().map(|s| s.snapshot()).collect()
    }

    /// Spans that have ended, in end order.
    pub fn finished_spans(&self) -> Vec<SpanData> {
        lock(&self.finished).clone()
    }

    /// Forget everything recorded so far.
    pub fn reset(&self) {
        lock(&self.started).clear();
        lock(&self.finished).clear();
        self.ends_without_span.store(0, Ordering::SeqCst);
    }
}

impl Default for InMemoryInstrumenter {
    fn default() -> Self {
        Self::new()
    }
}

impl Instrumenter for InMemoryInstrumenter {
    fn should_start(&self, parent: &TraceContext, _request: &str) -> bool {
        !(self.suppress_nested && suppress_nested(parent, self.kind))
    }

    fn start(
        &self,
        parent: &TraceContext,
        request: &str,
    ) -> Result<TraceContext, InstrumentationError> {
        let parent_id = parent
            .span()
            .and_then(|span| span.as_any().downcast_ref::<RecordedSpan>())
            .map(|span| span.id);

        let span = Arc::new(RecordedSpan {
            id: self.next_id.fetch_add(1, Ordering::SeqCst),
            parent_id,
            name: request.to_string(),
            kind: self.kind,
            thread: thread::current().id(),
            attributes: Mutex::new(BTreeMap::new()),
            enters: AtomicUsize::new(0),
            exits: AtomicUsize::new(0),
        });
        lock(&self.started).push(span.clone());

        Ok(parent.with_span(span))
    }

    fn end(
        &self,
        context: TraceContext,
        _request: &str,
        _response: Option<String>,
        _error: Option<String>,
    ) {
        match context
            .span()
            .and_then(|span| span.as_any().downcast_ref::<RecordedSpan>())
        {
            Some(span) => lock(&self.finished).push(span.snapshot()),
            None => {
                self.ends_without_span.fetch_add(1, Ordering::SeqCst);
            }
        }
    }
}
