//! Transport-native binary propagation layered over the text codec.
//!
//! Some transports offer typed binary metadata slots next to their ASCII
//! headers. Propagation there is tiered: the compact binary encoding is
//! written and consulted first, and the universal text encoding rides
//! along as the fallback every peer understands. Binary slots also carry
//! the tag map, whose contents merge into the extraction result whichever
//! tier produced the context.

use crate::context::{Extracted, TraceContext};
use crate::format::{tag_bin, trace_bin};
use crate::propagation::extra::{
    self, ExtraField, ExtraFieldFactory, ExtraFieldKind, TagFields, TagFieldsFactory,
};
use crate::propagation::{Getter, KeyFactory, Setter, TraceContextPropagation};
use std::marker::PhantomData;

/// Metadata slot carrying the binary trace identifier.
pub const TRACE_BIN: &str = "trace-bin";
/// Metadata slot carrying the binary tag map.
pub const TAGS_BIN: &str = "tags-bin";

/// Writes one opaque byte payload under a key, replacing any prior value.
pub trait BinarySetter<C: ?Sized, K> {
    /// Writes `value` under `key` in `carrier`.
    fn put_bytes(&self, carrier: &mut C, key: &K, value: &[u8]);
}

impl<C: ?Sized, K, F> BinarySetter<C, K> for F
where
    F: Fn(&mut C, &K, &[u8]),
{
    fn put_bytes(&self, carrier: &mut C, key: &K, value: &[u8]) {
        self(carrier, key, value);
    }
}

/// Reads the byte payload under a key.
pub trait BinaryGetter<C: ?Sized, K> {
    /// Reads `key` from `carrier`; a missing key is `None`.
    fn get_bytes(&self, carrier: &C, key: &K) -> Option<Vec<u8>>;
}

impl<C: ?Sized, K, F> BinaryGetter<C, K> for F
where
    F: Fn(&C, &K) -> Option<Vec<u8>>,
{
    fn get_bytes(&self, carrier: &C, key: &K) -> Option<Vec<u8>> {
        self(carrier, key)
    }
}

/// Tiered propagation: binary slots first, text slots as the universal
/// fallback.
#[derive(Debug, Clone)]
pub struct BinaryPropagation<K> {
    delegate: TraceContextPropagation<K>,
    trace_bin_key: K,
    tags_bin_key: K,
    tags_factory: TagFieldsFactory,
}

impl<K> BinaryPropagation<K> {
    /// Builds the tiered propagation over a fresh text delegate.
    pub fn new<F>(keys: &F) -> Self
    where
        F: KeyFactory<Key = K>,
    {
        Self::wrap(TraceContextPropagation::new(keys), keys)
    }

    /// Layers the binary slots over an existing text delegate.
    pub fn wrap<F>(delegate: TraceContextPropagation<K>, keys: &F) -> Self
    where
        F: KeyFactory<Key = K>,
    {
        Self {
            delegate,
            trace_bin_key: keys.create(TRACE_BIN),
            tags_bin_key: keys.create(TAGS_BIN),
            tags_factory: TagFieldsFactory,
        }
    }

    /// The text delegate's keys. The binary slots are typed transport
    /// metadata, not clearable headers, so they are not listed.
    pub fn keys(&self) -> &[K] {
        self.delegate.keys()
    }

    /// Ensures `context` carries a [`TagFields`] instance, so tags
    /// survive parent-to-child span creation.
    #[must_use]
    pub fn decorate(&self, context: TraceContext) -> TraceContext {
        self.tags_factory.decorate(context)
    }

    /// Builds an injector from the two write capabilities of one carrier
    /// type.
    pub fn injector<C, S, B>(&self, setter: S, binary: B) -> BinaryInjector<'_, C, K, S, B>
    where
        C: ?Sized,
        S: Setter<C, K>,
        B: BinarySetter<C, K>,
    {
        BinaryInjector {
            propagation: self,
            setter,
            binary,
            _carrier: PhantomData,
        }
    }

    /// Builds an extractor from the two read capabilities of one carrier
    /// type.
    pub fn extractor<C, G, B>(&self, getter: G, binary: B) -> BinaryExtractor<'_, C, K, G, B>
    where
        C: ?Sized,
        G: Getter<C, K>,
        B: BinaryGetter<C, K>,
    {
        BinaryExtractor {
            propagation: self,
            getter,
            binary,
            _carrier: PhantomData,
        }
    }
}

/// Writes contexts into carriers exposing both text and binary slots.
pub struct BinaryInjector<'p, C: ?Sized, K, S, B> {
    propagation: &'p BinaryPropagation<K>,
    setter: S,
    binary: B,
    _carrier: PhantomData<fn(&mut C)>,
}

impl<C: ?Sized, K, S, B> BinaryInjector<'_, C, K, S, B>
where
    S: Setter<C, K>,
    B: BinarySetter<C, K>,
{
    /// Writes the binary slots, then delegates to the text codec so any
    /// peer can read the carrier.
    pub fn inject(&self, context: &TraceContext, carrier: &mut C) {
        self.binary
            .put_bytes(carrier, &self.propagation.trace_bin_key, &trace_bin::encode(context));
        if let Some(tags) =
            extra::find(context.extra(), ExtraFieldKind::Tags).and_then(ExtraField::as_tags)
        {
            self.binary.put_bytes(
                carrier,
                &self.propagation.tags_bin_key,
                &tag_bin::encode(tags.entries()),
            );
        }
        self.propagation
            .delegate
            .inject_with(&self.setter, context, carrier);
    }
}

/// Reads contexts out of carriers exposing both text and binary slots.
pub struct BinaryExtractor<'p, C: ?Sized, K, G, B> {
    propagation: &'p BinaryPropagation<K>,
    getter: G,
    binary: B,
    _carrier: PhantomData<fn(&C)>,
}

impl<C: ?Sized, K, G, B> BinaryExtractor<'_, C, K, G, B>
where
    G: Getter<C, K>,
    B: BinaryGetter<C, K>,
{
    /// Tries the binary trace slot first and falls back to the text
    /// extractor. A decoded tag map merges into either outcome.
    pub fn extract(&self, carrier: &C) -> Extracted {
        let tags = self
            .binary
            .get_bytes(carrier, &self.propagation.tags_bin_key)
            .and_then(|bytes| tag_bin::decode(&bytes))
            .map(TagFields::from_extracted);

        if let Some(context) = self
            .binary
            .get_bytes(carrier, &self.propagation.trace_bin_key)
            .and_then(|bytes| trace_bin::decode(&bytes))
        {
            let mut result = Extracted::from_context(context);
            if let Some(tags) = tags {
                result.push_extra(ExtraField::Tags(tags));
            }
            return result;
        }

        let mut result = self.propagation.delegate.extract_with(&self.getter, carrier);
        if let Some(tags) = tags {
            result.push_extra(ExtraField::Tags(tags));
        }
        result
    }
}
