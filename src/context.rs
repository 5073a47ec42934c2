//! Trace identifiers, sampling hints, and extraction results.
//!
//! A [`TraceContext`] names one position in a distributed call tree. It is
//! immutable once constructed; [`TraceContextBuilder`] produces new
//! instances, and [`to_builder`](TraceContext::to_builder) copies an
//! existing one for derivation. An [`Extracted`] is the total outcome of
//! reading a carrier: a parent context, a bare sampling hint, or nothing
//! at all. Absence of an upstream context is a normal outcome, never an
//! error.

use crate::propagation::extra::{ExtraField, ExtraFieldKind};
use crate::util::hex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;

/// Ordered list of extra fields riding alongside the core identifiers.
///
/// Almost always empty or holding one or two entries, so the storage is
/// inline until it spills.
pub(crate) type ExtraList = SmallVec<[ExtraField; 2]>;

/// Why a [`TraceContext`] could not be built.
///
/// This is the caller-contract class of failure: it comes from code
/// assembling a context by hand, not from untrusted peer input. Codecs
/// never surface it; they degrade to "no context" instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ContextError {
    /// The 128-bit trace id was all zero.
    #[error("trace ID must be non-zero")]
    ZeroTraceId,
    /// The span id was zero.
    #[error("span ID must be non-zero")]
    ZeroSpanId,
}

/// Identifiers for one span: 128-bit trace id, 64-bit span id, optional
/// parent span id, and a tri-state sampling decision.
///
/// The 128-bit trace id is `trace_id_high` concatenated with `trace_id`.
/// A valid context never has an all-zero trace id or a zero span id;
/// [`TraceContextBuilder::build`] enforces this.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceContext {
    trace_id_high: u64,
    trace_id: u64,
    span_id: u64,
    parent_id: Option<u64>,
    sampled: Option<bool>,
    extra: ExtraList,
}

impl TraceContext {
    /// Starts building a new context.
    #[must_use]
    pub fn builder() -> TraceContextBuilder {
        TraceContextBuilder::default()
    }

    /// Copies this context into a builder for derivation.
    #[must_use]
    pub fn to_builder(&self) -> TraceContextBuilder {
        TraceContextBuilder {
            trace_id_high: self.trace_id_high,
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_id: self.parent_id,
            sampled: self.sampled,
            extra: self.extra.clone(),
        }
    }

    /// High 64 bits of the trace id.
    #[must_use]
    pub const fn trace_id_high(&self) -> u64 {
        self.trace_id_high
    }

    /// Low 64 bits of the trace id.
    #[must_use]
    pub const fn trace_id(&self) -> u64 {
        self.trace_id
    }

    /// The span id.
    #[must_use]
    pub const fn span_id(&self) -> u64 {
        self.span_id
    }

    /// The parent span id, absent for a root span.
    #[must_use]
    pub const fn parent_id(&self) -> Option<u64> {
        self.parent_id
    }

    /// The sampling decision; `None` means no decision was made upstream.
    #[must_use]
    pub const fn sampled(&self) -> Option<bool> {
        self.sampled
    }

    /// Extra fields attached to this context, in insertion order.
    #[must_use]
    pub fn extra(&self) -> &[ExtraField] {
        &self.extra
    }

    /// Finds the extra field of the given kind, if one is attached.
    #[must_use]
    pub fn find_extra(&self, kind: ExtraFieldKind) -> Option<&ExtraField> {
        self.extra.iter().find(|field| field.kind() == kind)
    }

    /// Returns a copy of this context with `field` appended.
    ///
    /// Identifiers were already validated, so this cannot fail.
    #[must_use]
    pub(crate) fn with_extra_field(&self, field: ExtraField) -> Self {
        let mut copy = self.clone();
        copy.extra.push(field);
        copy
    }

    /// The trace id in canonical lower-hex: 32 characters when the high
    /// bits are set, 16 otherwise.
    #[must_use]
    pub fn trace_id_string(&self) -> String {
        let mut out = String::with_capacity(if self.trace_id_high == 0 { 16 } else { 32 });
        if self.trace_id_high != 0 {
            hex::push_lower_hex_u64(&mut out, self.trace_id_high);
        }
        hex::push_lower_hex_u64(&mut out, self.trace_id);
        out
    }
}

impl fmt::Debug for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceContext")
            .field("trace_id", &self.trace_id_string())
            .field("span_id", &hex::to_lower_hex(self.span_id))
            .field("parent_id", &self.parent_id.map(hex::to_lower_hex))
            .field("sampled", &self.sampled)
            .field("extra", &self.extra)
            .finish()
    }
}

impl fmt::Display for TraceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.trace_id_string(), hex::to_lower_hex(self.span_id))
    }
}

/// Builder for [`TraceContext`].
#[derive(Debug, Clone, Default)]
pub struct TraceContextBuilder {
    trace_id_high: u64,
    trace_id: u64,
    span_id: u64,
    parent_id: Option<u64>,
    sampled: Option<bool>,
    extra: ExtraList,
}

impl TraceContextBuilder {
    /// Sets the high 64 bits of the trace id.
    #[must_use]
    pub const fn with_trace_id_high(mut self, v: u64) -> Self {
        self.trace_id_high = v;
        self
    }

    /// Sets the low 64 bits of the trace id.
    #[must_use]
    pub const fn with_trace_id(mut self, v: u64) -> Self {
        self.trace_id = v;
        self
    }

    /// Sets the span id.
    #[must_use]
    pub const fn with_span_id(mut self, v: u64) -> Self {
        self.span_id = v;
        self
    }

    /// Sets the parent span id.
    #[must_use]
    pub const fn with_parent_id(mut self, v: u64) -> Self {
        self.parent_id = Some(v);
        self
    }

    /// Sets (or clears) the sampling decision.
    #[must_use]
    pub fn with_sampled(mut self, sampled: impl Into<Option<bool>>) -> Self {
        self.sampled = sampled.into();
        self
    }

    /// Appends an extra field.
    #[must_use]
    pub fn with_extra(mut self, field: ExtraField) -> Self {
        self.extra.push(field);
        self
    }

    /// Builds the context, enforcing the non-zero identifier invariant.
    pub fn build(self) -> Result<TraceContext, ContextError> {
        if self.trace_id_high == 0 && self.trace_id == 0 {
            return Err(ContextError::ZeroTraceId);
        }
        if self.span_id == 0 {
            return Err(ContextError::ZeroSpanId);
        }
        Ok(TraceContext {
            trace_id_high: self.trace_id_high,
            trace_id: self.trace_id,
            span_id: self.span_id,
            parent_id: self.parent_id,
            sampled: self.sampled,
            extra: self.extra,
        })
    }
}

/// Out-of-band sampling state that can apply even without a parent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SamplingFlags {
    sampled: Option<bool>,
}

impl SamplingFlags {
    /// No decision.
    pub const EMPTY: Self = Self { sampled: None };
    /// Record this trace.
    pub const SAMPLED: Self = Self { sampled: Some(true) };
    /// Do not record this trace.
    pub const NOT_SAMPLED: Self = Self { sampled: Some(false) };

    /// Wraps a tri-state decision.
    #[must_use]
    pub const fn new(sampled: Option<bool>) -> Self {
        Self { sampled }
    }

    /// The decision, if one was made.
    #[must_use]
    pub const fn sampled(self) -> Option<bool> {
        self.sampled
    }
}

/// Total outcome of extracting a carrier.
///
/// One of: a parent context (plus extra fields), out-of-band sampling
/// flags (plus extra fields), or nothing. Construction cannot fail and
/// extraction never returns an error; malformed input from an untrusted
/// peer degrades to the empty outcome.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extracted {
    context: Option<TraceContext>,
    flags: SamplingFlags,
    extra: ExtraList,
}

impl Extracted {
    /// Nothing was found in the carrier.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A parent context was found.
    #[must_use]
    pub fn from_context(context: TraceContext) -> Self {
        Self {
            context: Some(context),
            flags: SamplingFlags::EMPTY,
            extra: ExtraList::new(),
        }
    }

    /// No parent, but out-of-band sampling state applies.
    #[must_use]
    pub fn from_flags(flags: SamplingFlags) -> Self {
        Self {
            context: None,
            flags,
            extra: ExtraList::new(),
        }
    }

    /// The extracted parent context, if one was found.
    #[must_use]
    pub const fn context(&self) -> Option<&TraceContext> {
        self.context.as_ref()
    }

    /// The effective sampling state: the context's decision when a parent
    /// was found, the out-of-band flags otherwise.
    #[must_use]
    pub fn flags(&self) -> SamplingFlags {
        match &self.context {
            Some(context) => SamplingFlags::new(context.sampled()),
            None => self.flags,
        }
    }

    /// Extra fields recovered from the carrier, in discovery order.
    #[must_use]
    pub fn extra(&self) -> &[ExtraField] {
        &self.extra
    }

    /// Appends an extra field recovered from the carrier.
    pub fn push_extra(&mut self, field: ExtraField) {
        self.extra.push(field);
    }

    /// Appends an extra field, builder-style.
    #[must_use]
    pub fn with_extra(mut self, field: ExtraField) -> Self {
        self.extra.push(field);
        self
    }

    /// `true` when nothing at all was recovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.context.is_none() && self.flags == SamplingFlags::EMPTY && self.extra.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::propagation::extra::VendorState;

    fn base() -> TraceContextBuilder {
        TraceContext::builder()
            .with_trace_id_high(0x6789_1233_abcd_ef01)
            .with_trace_id(0x2345_6789_1234_5678)
            .with_span_id(0x463a_c35c_9f64_13ad)
    }

    #[test]
    fn builder_rejects_zero_identifiers() {
        let err = TraceContext::builder().with_span_id(1).build();
        assert_eq!(err, Err(ContextError::ZeroTraceId));

        let err = TraceContext::builder().with_trace_id(1).build();
        assert_eq!(err, Err(ContextError::ZeroSpanId));
    }

    #[test]
    fn high_bits_alone_make_the_trace_id_non_zero() {
        let context = TraceContext::builder()
            .with_trace_id_high(1)
            .with_span_id(2)
            .build()
            .unwrap();
        assert_eq!(context.trace_id_string(), "00000000000000010000000000000002");
    }

    #[test]
    fn trace_id_string_width_tracks_high_bits() {
        let wide = base().build().unwrap();
        assert_eq!(wide.trace_id_string(), "67891233abcdef012345678912345678");

        let narrow = TraceContext::builder()
            .with_trace_id(0x2345_6789_1234_5678)
            .with_span_id(1)
            .build()
            .unwrap();
        assert_eq!(narrow.trace_id_string(), "2345678912345678");
    }

    #[test]
    fn to_builder_round_trips() {
        let context = base().with_sampled(true).with_parent_id(7).build().unwrap();
        assert_eq!(context.to_builder().build().unwrap(), context);
    }

    #[test]
    fn display_is_trace_slash_span() {
        let context = base().build().unwrap();
        assert_eq!(
            context.to_string(),
            "67891233abcdef012345678912345678/463ac35c9f6413ad"
        );
    }

    #[test]
    fn extracted_empty_is_empty() {
        assert!(Extracted::empty().is_empty());
        assert!(!Extracted::from_flags(SamplingFlags::SAMPLED).is_empty());
        assert!(
            !Extracted::empty()
                .with_extra(ExtraField::VendorState(VendorState::new("a=1")))
                .is_empty()
        );
    }

    #[test]
    fn extracted_flags_prefer_the_context_decision() {
        let context = base().with_sampled(false).build().unwrap();
        let extracted = Extracted::from_context(context);
        assert_eq!(extracted.flags(), SamplingFlags::NOT_SAMPLED);

        assert_eq!(
            Extracted::from_flags(SamplingFlags::SAMPLED).flags(),
            SamplingFlags::SAMPLED
        );
    }

    #[test]
    fn find_extra_looks_up_by_kind() {
        let context = base()
            .with_extra(ExtraField::VendorState(VendorState::new("congo=t61rcWkgMzE")))
            .build()
            .unwrap();
        assert!(context.find_extra(ExtraFieldKind::VendorState).is_some());
        assert!(context.find_extra(ExtraFieldKind::Tags).is_none());
    }
}
