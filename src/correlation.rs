//! Mirrors the current identifiers into an external diagnostic store.
//!
//! Logging frameworks keep a string-keyed diagnostic context that log
//! patterns read for correlation. On every scope transition this bridge
//! writes the triple (`traceId`, `parentId`, `spanId`) for the newly
//! active span — touching only keys whose value actually changed, since
//! the store may be a costly thread-local structure — and on scope close
//! restores exactly the previous triple, unconditionally, no matter what
//! mutated the store mid-scope.

use crate::context::TraceContext;
use crate::util::hex;

/// Store key for the rendered trace id.
pub const TRACE_ID_KEY: &str = "traceId";
/// Store key for the rendered parent span id.
pub const PARENT_ID_KEY: &str = "parentId";
/// Store key for the rendered span id.
pub const SPAN_ID_KEY: &str = "spanId";

/// Minimal contract for an external string-keyed diagnostic store.
pub trait CorrelationStore {
    /// Reads the value under `key`.
    fn get(&self, key: &str) -> Option<String>;
    /// Writes `value` under `key`, replacing any prior value.
    fn put(&mut self, key: &str, value: &str);
    /// Removes `key`; removing an absent key is a no-op.
    fn remove(&mut self, key: &str);
}

impl CorrelationStore for std::collections::BTreeMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        Self::get(self, key).cloned()
    }

    fn put(&mut self, key: &str, value: &str) {
        self.insert(key.to_owned(), value.to_owned());
    }

    fn remove(&mut self, key: &str) {
        Self::remove(self, key);
    }
}

impl CorrelationStore for std::collections::HashMap<String, String> {
    fn get(&self, key: &str) -> Option<String> {
        Self::get(self, key).cloned()
    }

    fn put(&mut self, key: &str, value: &str) {
        self.insert(key.to_owned(), value.to_owned());
    }

    fn remove(&mut self, key: &str) {
        Self::remove(self, key);
    }
}

#[derive(Debug)]
struct Snapshot {
    trace_id: Option<String>,
    parent_id: Option<String>,
    span_id: Option<String>,
}

/// One scope's snapshot of the store triple.
///
/// Opened at a scope transition, closed when the scope ends. Closing
/// restores the snapshot; an open that found nothing to change yields a
/// no-op scope whose close touches nothing.
#[derive(Debug)]
#[must_use = "closing the scope is what restores the store"]
pub struct CorrelationScope {
    previous: Option<Snapshot>,
}

impl CorrelationScope {
    /// Opens a scope unconditionally: snapshots the previous triple, then
    /// writes the triple for `context` — or removes all three keys when
    /// there is no context — touching only keys whose value changed.
    pub fn open<S>(store: &mut S, context: Option<&TraceContext>) -> Self
    where
        S: CorrelationStore + ?Sized,
    {
        let previous = Snapshot {
            trace_id: store.get(TRACE_ID_KEY),
            parent_id: store.get(PARENT_ID_KEY),
            span_id: store.get(SPAN_ID_KEY),
        };
        match context {
            Some(context) => replace_triple(store, &previous, context),
            None => {
                store.remove(TRACE_ID_KEY);
                store.remove(PARENT_ID_KEY);
                store.remove(SPAN_ID_KEY);
            }
        }
        Self {
            previous: Some(previous),
        }
    }

    /// Opens a scope only when the store does not already reflect
    /// `context`: the same trace id and span id (or absence on both
    /// sides) yields a no-op scope with nothing written and nothing
    /// removed.
    pub fn maybe_open<S>(store: &mut S, context: Option<&TraceContext>) -> Self
    where
        S: CorrelationStore + ?Sized,
    {
        let previous_trace_id = store.get(TRACE_ID_KEY);
        let Some(context) = context else {
            if previous_trace_id.is_none() {
                return Self::noop();
            }
            return Self::open(store, None);
        };

        let same_trace = previous_trace_id
            .as_deref()
            .is_some_and(|s| hex::eq_trace_id(s, context.trace_id_high(), context.trace_id()));
        let same_span = store
            .get(SPAN_ID_KEY)
            .as_deref()
            .is_some_and(|s| hex::eq_lower_hex_u64(s, context.span_id()));
        if same_trace && same_span {
            return Self::noop();
        }
        Self::open(store, Some(context))
    }

    const fn noop() -> Self {
        Self { previous: None }
    }

    /// `true` when closing this scope will touch nothing.
    #[must_use]
    pub const fn is_noop(&self) -> bool {
        self.previous.is_none()
    }

    /// Restores exactly the snapshot triple, independent of the store's
    /// current values — restoration is unconditional, not diffed.
    pub fn close<S>(self, store: &mut S)
    where
        S: CorrelationStore + ?Sized,
    {
        if let Some(previous) = self.previous {
            restore(store, TRACE_ID_KEY, previous.trace_id.as_deref());
            restore(store, PARENT_ID_KEY, previous.parent_id.as_deref());
            restore(store, SPAN_ID_KEY, previous.span_id.as_deref());
        }
    }
}

/// Writes the triple for `context`, skipping keys already holding the
/// right rendering and removing an inapplicable parent key.
fn replace_triple<S>(store: &mut S, previous: &Snapshot, context: &TraceContext)
where
    S: CorrelationStore + ?Sized,
{
    let same_trace = previous
        .trace_id
        .as_deref()
        .is_some_and(|s| hex::eq_trace_id(s, context.trace_id_high(), context.trace_id()));
    if !same_trace {
        store.put(TRACE_ID_KEY, &context.trace_id_string());
    }

    match context.parent_id() {
        None => store.remove(PARENT_ID_KEY),
        Some(parent_id) => {
            let same_parent = previous
                .parent_id
                .as_deref()
                .is_some_and(|s| hex::eq_lower_hex_u64(s, parent_id));
            if !same_parent {
                store.put(PARENT_ID_KEY, &hex::to_lower_hex(parent_id));
            }
        }
    }

    let same_span = previous
        .span_id
        .as_deref()
        .is_some_and(|s| hex::eq_lower_hex_u64(s, context.span_id()));
    if !same_span {
        store.put(SPAN_ID_KEY, &hex::to_lower_hex(context.span_id()));
    }
}

fn restore<S>(store: &mut S, key: &str, value: Option<&str>)
where
    S: CorrelationStore + ?Sized,
{
    match value {
        Some(value) => store.put(key, value),
        None => store.remove(key),
    }
}
