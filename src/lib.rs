//! Tracewire: trace-context propagation and scoping for messaging and
//! RPC transports.
//!
//! # Overview
//!
//! Distributed tracing only works when every hop can read the identifiers
//! the previous hop wrote and every callback runs under the right
//! "current span". Tracewire is the engine for both halves: bit-exact
//! codecs that move trace identifiers through arbitrary transport
//! carriers, and per-role scope stacks that keep producer and consumer
//! span lifecycles correctly nested when a transport interleaves them on
//! one thread.
//!
//! # Core Guarantees
//!
//! - **Total decoding**: malformed input from an untrusted peer degrades
//!   to "no context" with a debug-level diagnostic; codecs never fail
//!   loudly
//! - **Symmetric codecs**: `decode(encode(x)) == x` for the text and
//!   binary identifier formats, independently
//! - **Vendor state preserved**: third-party entries in the shared state
//!   list round-trip byte-for-byte, uninterpreted
//! - **Thread-confined scoping**: scope state is an explicit `!Send`
//!   value, never ambient thread-local storage, so the design ports to
//!   runtimes where "thread" is not the unit of isolation
//! - **Role isolation**: producer and consumer stacks never interfere
//!
//! # Module Structure
//!
//! - [`context`]: trace identifiers, sampling hints, extraction results
//! - [`format`]: the wire codecs (single-hop text, vendor state list,
//!   binary identifier, binary tag map)
//! - [`propagation`]: carrier contracts, the text propagation, the
//!   tiered binary propagation, and the extra-fields side channel
//! - [`scope`]: per-role scoped current-span stacks and the span/tracer
//!   collaborator seams
//! - [`correlation`]: the external diagnostic-store bridge
//!
//! The concrete transport adapters (channel interceptors, RPC
//! interceptors) and the tracer that creates spans and decides sampling
//! are external collaborators: they supply [`Setter`]/[`Getter`]
//! implementations per carrier type and a [`Tracer`] implementation, and
//! call into the scope stack at their fixed extension points.

#![deny(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod context;
pub mod correlation;
pub mod format;
pub mod propagation;
pub mod scope;
pub(crate) mod util;

pub use context::{ContextError, Extracted, SamplingFlags, TraceContext, TraceContextBuilder};
pub use correlation::{CorrelationScope, CorrelationStore};
pub use propagation::binary::{BinaryGetter, BinaryPropagation, BinarySetter};
pub use propagation::extra::{
    ExtraField, ExtraFieldFactory, ExtraFieldKind, TagFields, TagFieldsFactory, VendorState,
};
pub use propagation::{
    FallbackSetter, Getter, KeyFactory, Setter, StringKeyFactory, TraceContextPropagation,
    TrySetter,
};
pub use scope::{finish_span, ScopeRole, Span, SpanKind, SpanScopeStack, Tracer};
