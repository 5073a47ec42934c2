//! Carrier contracts and context propagation over them.
//!
//! Codecs never touch a transport's container type directly. A carrier —
//! a header map, a typed metadata map — is reached only through the
//! [`Setter`] and [`Getter`] contracts, and header names are turned into
//! whatever key representation the carrier wants exactly once, through a
//! [`KeyFactory`]. Both contracts are total: writing replaces any prior
//! value, and reading a missing key yields `None`, never an error.
//!
//! [`TraceContextPropagation`] is the universal text propagation over two
//! header slots; [`binary::BinaryPropagation`] layers the transport-native
//! binary slots on top of it.

pub mod binary;
pub mod extra;

use crate::context::{Extracted, TraceContext};
use crate::format::{traceparent, tracestate};
use crate::propagation::extra::{ExtraField, ExtraFieldKind, VendorState};
use std::marker::PhantomData;

/// Header slot carrying the 55-character single-hop identifier.
pub const TRACEPARENT: &str = "traceparent";
/// Header slot carrying the multi-vendor state list.
pub const TRACESTATE: &str = "tracestate";
/// Default reserved vendor key inside the state list.
pub const DEFAULT_STATE_NAME: &str = "tc";

/// Writes one string value under a key, replacing any prior value.
pub trait Setter<C: ?Sized, K> {
    /// Writes `value` under `key` in `carrier`.
    fn put(&self, carrier: &mut C, key: &K, value: &str);
}

impl<C: ?Sized, K, F> Setter<C, K> for F
where
    F: Fn(&mut C, &K, &str),
{
    fn put(&self, carrier: &mut C, key: &K, value: &str) {
        self(carrier, key, value);
    }
}

/// Reads the value under a key.
pub trait Getter<C: ?Sized, K> {
    /// Reads `key` from `carrier`; a missing key is `None`.
    fn get(&self, carrier: &C, key: &K) -> Option<String>;
}

impl<C: ?Sized, K, F> Getter<C, K> for F
where
    F: Fn(&C, &K) -> Option<String>,
{
    fn get(&self, carrier: &C, key: &K) -> Option<String> {
        self(carrier, key)
    }
}

/// A write strategy that may decline.
///
/// Some carrier types expose the same logical header through more than
/// one physical storage — a native list-valued header next to a flat
/// single-valued one. The native strategy implements this trait and
/// returns `false` when the carrier has no native slot to write.
pub trait TrySetter<C: ?Sized, K> {
    /// Attempts the write; `false` means this strategy does not apply.
    fn try_put(&self, carrier: &mut C, key: &K, value: &str) -> bool;
}

impl<C: ?Sized, K, F> TrySetter<C, K> for F
where
    F: Fn(&mut C, &K, &str) -> bool,
{
    fn try_put(&self, carrier: &mut C, key: &K, value: &str) -> bool {
        self(carrier, key, value)
    }
}

/// Composes a native [`TrySetter`] with a fallback [`Setter`], preferring
/// the native strategy whenever it accepts the write.
#[derive(Debug, Clone, Copy)]
pub struct FallbackSetter<P, S> {
    native: P,
    fallback: S,
}

impl<P, S> FallbackSetter<P, S> {
    /// Composes the two strategies.
    pub const fn new(native: P, fallback: S) -> Self {
        Self { native, fallback }
    }
}

impl<C: ?Sized, K, P, S> Setter<C, K> for FallbackSetter<P, S>
where
    P: TrySetter<C, K>,
    S: Setter<C, K>,
{
    fn put(&self, carrier: &mut C, key: &K, value: &str) {
        if !self.native.try_put(carrier, key, value) {
            self.fallback.put(carrier, key, value);
        }
    }
}

/// Creates per-carrier key representations from header names, once per
/// carrier kind.
pub trait KeyFactory {
    /// The carrier's key representation.
    type Key;

    /// Creates the key for `name`.
    fn create(&self, name: &str) -> Self::Key;
}

/// Key factory for carriers keyed by plain strings.
#[derive(Debug, Clone, Copy, Default)]
pub struct StringKeyFactory;

impl KeyFactory for StringKeyFactory {
    type Key = String;

    fn create(&self, name: &str) -> String {
        name.to_owned()
    }
}

/// The universal text propagation.
///
/// Injection writes both header slots: the single-hop value under the
/// traceparent key and the state list under the tracestate key, our
/// vendor entry first and any preserved [`VendorState`] blob after it.
/// Extraction reads the state list only and never fails — malformed
/// input degrades to an empty [`Extracted`].
#[derive(Debug, Clone)]
pub struct TraceContextPropagation<K> {
    state_name: String,
    keys: [K; 2],
}

impl<K> TraceContextPropagation<K> {
    /// Builds the propagation with the default vendor key.
    pub fn new<F>(keys: &F) -> Self
    where
        F: KeyFactory<Key = K>,
    {
        Self::with_state_name(keys, DEFAULT_STATE_NAME)
    }

    /// Builds the propagation with a custom reserved vendor key.
    pub fn with_state_name<F>(keys: &F, state_name: &str) -> Self
    where
        F: KeyFactory<Key = K>,
    {
        Self {
            state_name: state_name.to_owned(),
            keys: [keys.create(TRACEPARENT), keys.create(TRACESTATE)],
        }
    }

    /// The keys this propagation writes. Transport adapters clear these
    /// from a carrier before re-injecting.
    pub fn keys(&self) -> &[K] {
        &self.keys
    }

    /// The reserved vendor key inside the state list.
    #[must_use]
    pub fn state_name(&self) -> &str {
        &self.state_name
    }

    /// Builds an injector over one concrete carrier type.
    pub fn injector<C, S>(&self, setter: S) -> Injector<'_, C, K, S>
    where
        C: ?Sized,
        S: Setter<C, K>,
    {
        Injector {
            propagation: self,
            setter,
            _carrier: PhantomData,
        }
    }

    /// Builds an extractor over one concrete carrier type.
    pub fn extractor<C, G>(&self, getter: G) -> Extractor<'_, C, K, G>
    where
        C: ?Sized,
        G: Getter<C, K>,
    {
        Extractor {
            propagation: self,
            getter,
            _carrier: PhantomData,
        }
    }

    pub(crate) fn inject_with<C, S>(&self, setter: &S, context: &TraceContext, carrier: &mut C)
    where
        C: ?Sized,
        S: Setter<C, K>,
    {
        let this_state = traceparent::encode(context);
        setter.put(carrier, &self.keys[0], &this_state);

        let other = extra::find(context.extra(), ExtraFieldKind::VendorState)
            .and_then(ExtraField::as_vendor_state)
            .map(VendorState::as_str);
        let state_list = tracestate::write(&self.state_name, &this_state, other);
        setter.put(carrier, &self.keys[1], &state_list);
    }

    pub(crate) fn extract_with<C, G>(&self, getter: &G, carrier: &C) -> Extracted
    where
        C: ?Sized,
        G: Getter<C, K>,
    {
        let Some(state_list) = getter.get(carrier, &self.keys[1]) else {
            return Extracted::empty();
        };
        let parsed = tracestate::parse(&self.state_name, &state_list);
        let mut result = match parsed.context {
            Some(context) => Extracted::from_context(context),
            None => Extracted::empty(),
        };
        if let Some(other) = parsed.other_state {
            result.push_extra(ExtraField::VendorState(VendorState::new(other)));
        }
        result
    }
}

/// Writes contexts into carriers of one concrete type.
pub struct Injector<'p, C: ?Sized, K, S> {
    propagation: &'p TraceContextPropagation<K>,
    setter: S,
    _carrier: PhantomData<fn(&mut C)>,
}

impl<C: ?Sized, K, S: Setter<C, K>> Injector<'_, C, K, S> {
    /// Serializes `context` into `carrier` through both header slots.
    pub fn inject(&self, context: &TraceContext, carrier: &mut C) {
        self.propagation.inject_with(&self.setter, context, carrier);
    }
}

/// Reads contexts out of carriers of one concrete type.
pub struct Extractor<'p, C: ?Sized, K, G> {
    propagation: &'p TraceContextPropagation<K>,
    getter: G,
    _carrier: PhantomData<fn(&C)>,
}

impl<C: ?Sized, K, G: Getter<C, K>> Extractor<'_, C, K, G> {
    /// Parses `carrier`; absence of a usable upstream context is a normal
    /// outcome, not a failure.
    pub fn extract(&self, carrier: &C) -> Extracted {
        self.propagation.extract_with(&self.getter, carrier)
    }
}
