//! Scoped "current span" state across asynchronous callback pairs.
//!
//! Transport libraries split one logical operation across paired
//! callbacks — send then send-complete, receive then receive-complete —
//! and a single thread may interleave a consumer-side completion with a
//! producer-side start when a handler both receives and forwards. A
//! [`SpanScopeStack`] keeps the "current span" correct across such
//! sequences with one independent stack per [`ScopeRole`].
//!
//! The stack is an explicit value confined to the thread that owns it
//! (it is `!Send`), not ambient thread-local state; callers thread it
//! through their execution context. A thread hop therefore starts from
//! an empty stack unless the caller explicitly carries one across.
//!
//! Every [`enter_next`](SpanScopeStack::enter_next) must be matched by
//! exactly one terminal [`remove`](SpanScopeStack::remove) on the same
//! thread, on the error path too — guaranteed-release wrappers are the
//! caller's responsibility.

mod span;

pub use span::{Span, SpanKind, Tracer};

use crate::context::Extracted;
use std::cell::RefCell;
use std::error::Error;
use std::marker::PhantomData;
use std::rc::Rc;

/// Which of the two independent scope stacks an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeRole {
    /// Outbound sends.
    Producer,
    /// Inbound receives and handler dispatch.
    Consumer,
}

/// Per-role stacks of in-flight spans for one thread of execution.
pub struct SpanScopeStack<T: Tracer> {
    tracer: T,
    producer: RefCell<Vec<T::Span>>,
    consumer: RefCell<Vec<T::Span>>,
    _confined: PhantomData<Rc<()>>,
}

impl<T: Tracer> SpanScopeStack<T> {
    /// Builds an empty stack over the collaborating tracer.
    pub fn new(tracer: T) -> Self {
        Self {
            tracer,
            producer: RefCell::new(Vec::new()),
            consumer: RefCell::new(Vec::new()),
            _confined: PhantomData,
        }
    }

    /// The collaborating tracer.
    pub const fn tracer(&self) -> &T {
        &self.tracer
    }

    /// Starts the next span for `role` and makes it active.
    ///
    /// With an extraction carrying a parent context, the new span is its
    /// child. With no extraction at all, the ongoing operation continues:
    /// the new span descends from whatever is active for this role, or
    /// starts a fresh root when nothing is. With an empty extraction, the
    /// new span is a fresh root (out-of-band sampling flags still apply).
    pub fn enter_next(&self, role: ScopeRole, extracted: Option<&Extracted>) -> T::Span {
        let span = match extracted {
            Some(extracted) => self.tracer.next_span(extracted),
            None => {
                let continued = self
                    .stack(role)
                    .borrow()
                    .last()
                    .map(|active| Extracted::from_context(active.context()));
                match continued {
                    Some(active) => self.tracer.next_span(&active),
                    None => self.tracer.next_span(&Extracted::empty()),
                }
            }
        };
        self.stack(role).borrow_mut().push(span.clone());
        span
    }

    /// Pops the active span for `role`, restoring whatever was active
    /// before it.
    ///
    /// An already-empty stack returns `None` and is tolerated: completion
    /// callbacks can legitimately race with cleanup in degenerate
    /// transport edge cases.
    pub fn remove(&self, role: ScopeRole) -> Option<T::Span> {
        self.stack(role).borrow_mut().pop()
    }

    /// The active span for `role`, without changing the stack.
    pub fn active(&self, role: ScopeRole) -> Option<T::Span> {
        self.stack(role).borrow().last().cloned()
    }

    const fn stack(&self, role: ScopeRole) -> &RefCell<Vec<T::Span>> {
        match role {
            ScopeRole::Producer => &self.producer,
            ScopeRole::Consumer => &self.consumer,
        }
    }
}

/// Finishes `span`, first recording `error` as a diagnostic tag.
///
/// The tag value is the error's display text, or its type name when the
/// text is empty. The error itself is only borrowed: the caller still
/// owns it and rethrows or returns it unmodified — this helper annotates,
/// it never swallows.
pub fn finish_span<S: Span, E: Error>(span: &S, error: Option<&E>) {
    if let Some(error) = error {
        if !span.is_noop() {
            let text = error.to_string();
            if text.is_empty() {
                let name = std::any::type_name::<E>().rsplit("::").next().unwrap_or("error");
                span.tag("error", name);
            } else {
                span.tag("error", &text);
            }
        }
    }
    span.finish();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{SamplingFlags, TraceContext, TraceContextBuilder};
    use crate::propagation::extra::ExtraField;
    use std::cell::{Cell, RefCell as StdRefCell};
    use std::fmt;
    use std::rc::Rc;

    #[derive(Debug, Default)]
    struct SpanState {
        context: Option<TraceContext>,
        noop: bool,
        started: bool,
        kind: Option<SpanKind>,
        name: Option<String>,
        tags: Vec<(String, String)>,
        finished: bool,
        finish_calls: u32,
    }

    #[derive(Debug, Clone, Default)]
    struct TestSpan(Rc<StdRefCell<SpanState>>);

    impl Span for TestSpan {
        fn context(&self) -> TraceContext {
            self.0.borrow().context.clone().expect("span has a context")
        }

        fn is_noop(&self) -> bool {
            self.0.borrow().noop
        }

        fn set_kind(&self, kind: SpanKind) {
            self.0.borrow_mut().kind = Some(kind);
        }

        fn set_name(&self, name: &str) {
            self.0.borrow_mut().name = Some(name.to_owned());
        }

        fn start(&self) {
            self.0.borrow_mut().started = true;
        }

        fn tag(&self, key: &str, value: &str) {
            let mut state = self.0.borrow_mut();
            if state.noop {
                return;
            }
            state.tags.push((key.to_owned(), value.to_owned()));
        }

        fn finish(&self) {
            let mut state = self.0.borrow_mut();
            if state.finished {
                return;
            }
            state.finished = true;
            state.finish_calls += 1;
        }
    }

    /// Mints deterministic span ids; children share the parent's trace
    /// id, record its span id as their parent, and inherit extra fields
    /// by copy.
    #[derive(Debug, Default)]
    struct TestTracer {
        next_id: Cell<u64>,
        noop: bool,
    }

    impl TestTracer {
        fn noop() -> Self {
            Self {
                next_id: Cell::new(0),
                noop: true,
            }
        }

        fn mint(&self) -> u64 {
            let id = self.next_id.get() + 1;
            self.next_id.set(id);
            id
        }
    }

    impl Tracer for TestTracer {
        type Span = TestSpan;

        fn next_span(&self, extracted: &Extracted) -> TestSpan {
            let span_id = self.mint();
            let context = match extracted.context() {
                Some(parent) => {
                    // Children inherit extra fields by copy, never by sharing.
                    let builder = TraceContext::builder()
                        .with_trace_id_high(parent.trace_id_high())
                        .with_trace_id(parent.trace_id())
                        .with_span_id(span_id)
                        .with_parent_id(parent.span_id())
                        .with_sampled(parent.sampled());
                    parent
                        .extra()
                        .iter()
                        .map(ExtraField::make_child)
                        .fold(builder, TraceContextBuilder::with_extra)
                        .build()
                        .expect("child context is valid")
                }
                None => TraceContext::builder()
                    .with_trace_id(0x1000 + span_id)
                    .with_span_id(span_id)
                    .with_sampled(extracted.flags().sampled())
                    .build()
                    .expect("root context is valid"),
            };
            TestSpan(Rc::new(StdRefCell::new(SpanState {
                context: Some(context),
                noop: self.noop,
                ..SpanState::default()
            })))
        }

        fn join_span(&self, context: &TraceContext) -> TestSpan {
            TestSpan(Rc::new(StdRefCell::new(SpanState {
                context: Some(context.clone()),
                noop: self.noop,
                ..SpanState::default()
            })))
        }

        fn current_span(&self) -> Option<TestSpan> {
            None
        }
    }

    #[derive(Debug)]
    struct PlainError(&'static str);

    impl fmt::Display for PlainError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str(self.0)
        }
    }

    impl Error for PlainError {}

    fn extracted_parent() -> Extracted {
        Extracted::from_context(
            TraceContext::builder()
                .with_trace_id_high(0x6789_1233_abcd_ef01)
                .with_trace_id(0x2345_6789_1234_5678)
                .with_span_id(0x463a_c35c_9f64_13ad)
                .with_sampled(true)
                .build()
                .unwrap(),
        )
    }

    #[test]
    fn nested_enter_and_remove_restore_the_original_state() {
        let stack = SpanScopeStack::new(TestTracer::default());

        let outer = stack.enter_next(ScopeRole::Producer, None);
        let inner = stack.enter_next(ScopeRole::Producer, None);

        // The inner span continues the operation under the outer one.
        assert_eq!(
            inner.context().parent_id(),
            Some(outer.context().span_id())
        );

        assert_eq!(
            stack.remove(ScopeRole::Producer).map(|s| s.context()),
            Some(inner.context())
        );
        assert_eq!(
            stack.remove(ScopeRole::Producer).map(|s| s.context()),
            Some(outer.context())
        );
        assert!(stack.active(ScopeRole::Producer).is_none());
    }

    #[test]
    fn extracted_parent_creates_a_child() {
        let stack = SpanScopeStack::new(TestTracer::default());
        let extracted = extracted_parent();

        let span = stack.enter_next(ScopeRole::Consumer, Some(&extracted));
        let context = span.context();
        assert_eq!(context.trace_id(), 0x2345_6789_1234_5678);
        assert_eq!(context.parent_id(), Some(0x463a_c35c_9f64_13ad));
        assert_eq!(context.sampled(), Some(true));
    }

    #[test]
    fn empty_extraction_starts_a_fresh_root_with_flags() {
        let stack = SpanScopeStack::new(TestTracer::default());
        let _outer = stack.enter_next(ScopeRole::Producer, None);

        let hinted = Extracted::from_flags(SamplingFlags::NOT_SAMPLED);
        let span = stack.enter_next(ScopeRole::Producer, Some(&hinted));
        assert_eq!(span.context().parent_id(), None);
        assert_eq!(span.context().sampled(), Some(false));
    }

    #[test]
    fn roles_never_cross_contaminate() {
        let stack = SpanScopeStack::new(TestTracer::default());

        let consumer = stack.enter_next(ScopeRole::Consumer, None);
        let producer = stack.enter_next(ScopeRole::Producer, None);

        // The producer span is a root, not a child of the consumer one.
        assert_eq!(producer.context().parent_id(), None);

        assert_eq!(
            stack.remove(ScopeRole::Consumer).map(|s| s.context()),
            Some(consumer.context())
        );
        assert_eq!(
            stack.remove(ScopeRole::Producer).map(|s| s.context()),
            Some(producer.context())
        );
    }

    #[test]
    fn send_flow_annotates_and_starts_the_span() {
        let stack = SpanScopeStack::new(TestTracer::default());
        let span = stack.enter_next(ScopeRole::Producer, Some(&Extracted::empty()));

        if !span.is_noop() {
            span.set_kind(SpanKind::Producer);
            span.set_name("send");
            span.start();
        }
        {
            let state = span.0.borrow();
            assert_eq!(state.kind, Some(SpanKind::Producer));
            assert_eq!(state.name.as_deref(), Some("send"));
            assert!(state.started);
        }

        let removed = stack.remove(ScopeRole::Producer).unwrap();
        finish_span(&removed, None::<&PlainError>);
        assert!(span.0.borrow().finished);
    }

    #[test]
    fn remove_on_an_empty_stack_is_tolerated() {
        let stack = SpanScopeStack::new(TestTracer::default());
        assert!(stack.remove(ScopeRole::Producer).is_none());
        assert!(stack.remove(ScopeRole::Consumer).is_none());
    }

    #[test]
    fn finish_records_the_error_text() {
        let stack = SpanScopeStack::new(TestTracer::default());
        let span = stack.enter_next(ScopeRole::Consumer, None);

        let removed = stack.remove(ScopeRole::Consumer).unwrap();
        finish_span(&removed, Some(&PlainError("connection reset")));

        let state = span.0.borrow();
        assert_eq!(
            state.tags,
            [("error".to_owned(), "connection reset".to_owned())]
        );
        assert!(state.finished);
    }

    #[test]
    fn finish_falls_back_to_the_error_type_name() {
        let stack = SpanScopeStack::new(TestTracer::default());
        let span = stack.enter_next(ScopeRole::Consumer, None);

        finish_span(&span, Some(&PlainError("")));
        assert_eq!(span.0.borrow().tags, [("error".to_owned(), "PlainError".to_owned())]);
    }

    #[test]
    fn finish_from_racing_completions_is_idempotent() {
        let stack = SpanScopeStack::new(TestTracer::default());
        let span = stack.enter_next(ScopeRole::Producer, None);

        finish_span(&span, None::<&PlainError>);
        finish_span(&span, Some(&PlainError("late timeout")));

        let state = span.0.borrow();
        assert!(state.finished);
        // Both completion callbacks ran; the span finished exactly once.
        assert_eq!(state.finish_calls, 1);
    }

    #[test]
    fn noop_spans_flow_through_without_annotation_work() {
        let stack = SpanScopeStack::new(TestTracer::noop());
        let span = stack.enter_next(ScopeRole::Producer, None);
        assert!(span.is_noop());

        finish_span(&span, Some(&PlainError("ignored")));
        let state = span.0.borrow();
        assert!(state.tags.is_empty());
        assert!(state.finished);
    }

    #[test]
    fn children_inherit_extra_fields_by_copy() {
        use crate::propagation::extra::{ExtraFieldKind, TagFields};

        let mut tags = TagFields::new();
        tags.put("env", "staging");
        let parent = TraceContext::builder()
            .with_trace_id(1)
            .with_span_id(2)
            .with_extra(ExtraField::Tags(tags))
            .build()
            .unwrap();

        let stack = SpanScopeStack::new(TestTracer::default());
        let child = stack.enter_next(ScopeRole::Consumer, Some(&Extracted::from_context(parent)));

        let context = child.context();
        let inherited = context
            .find_extra(ExtraFieldKind::Tags)
            .and_then(ExtraField::as_tags)
            .unwrap();
        assert_eq!(inherited.get("env"), Some("staging"));
    }

    #[test]
    fn join_span_shares_the_identifiers() {
        let tracer = TestTracer::default();
        let context = extracted_parent().context().unwrap().clone();
        let joined = tracer.join_span(&context);
        assert_eq!(joined.context(), context);
    }
}
