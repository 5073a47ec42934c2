//! Span and tracer seams consumed from the collaborating tracer.
//!
//! This crate never creates spans itself; it correlates them. The tracer
//! — whatever records, samples, and reports — plugs in behind these two
//! traits.

use crate::context::{Extracted, TraceContext};

/// Role a span plays relative to its transport hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpanKind {
    /// Outbound message publication.
    Producer,
    /// Inbound message receipt.
    Consumer,
    /// Outbound RPC request.
    Client,
    /// Inbound RPC dispatch.
    Server,
}

/// Handle to one span minted by the collaborating tracer.
///
/// Handles are cheap clones sharing one underlying span. A no-op span
/// (sampling disabled) flows through scoping identically for state
/// machine correctness; every annotation on it is already free, so
/// [`is_noop`](Self::is_noop) exists purely as a short-circuit to skip
/// the work of assembling annotations, never as a correctness check.
pub trait Span: Clone {
    /// The identifiers this span records under.
    fn context(&self) -> TraceContext;

    /// `true` when this span records nothing.
    fn is_noop(&self) -> bool;

    /// Sets the transport role.
    fn set_kind(&self, kind: SpanKind);

    /// Sets the operation name.
    fn set_name(&self, name: &str);

    /// Marks the start of the recorded interval.
    fn start(&self);

    /// Attaches one key/value annotation.
    fn tag(&self, key: &str, value: &str);

    /// Marks the span finished. Finishing is irrevocable and idempotent:
    /// a second call is a no-op, not a fault.
    fn finish(&self);
}

/// Span-creation capability consumed from the collaborating tracer.
pub trait Tracer {
    /// The tracer's span handle.
    type Span: Span;

    /// Creates the next span: a child when `extracted` carries a parent
    /// context, otherwise a root honoring any out-of-band sampling hint.
    fn next_span(&self, extracted: &Extracted) -> Self::Span;

    /// Shares `context`'s identifiers instead of creating a child. Only
    /// for transports guaranteeing an at-most-once causal join.
    fn join_span(&self, context: &TraceContext) -> Self::Span;

    /// The span the tracer itself considers current, if any.
    fn current_span(&self) -> Option<Self::Span>;
}
