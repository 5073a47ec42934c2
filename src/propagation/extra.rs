//! Typed, inheritable extra fields carried alongside trace identifiers.
//!
//! Extra fields ride through extraction, injection, and parent-to-child
//! span creation without the core codecs understanding their content.
//! Each kind is a variant of [`ExtraField`], keyed by [`ExtraFieldKind`]
//! so unrelated kinds coexist in one ordered list and are found by tag
//! rather than by scanning names.
//!
//! Inheritance is copy-on-inherit: a child instance is an independent
//! copy, so mutating it never affects the parent's.

use crate::context::TraceContext;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Reserved tag key lifted into [`TagFields::parent_operation`] when a
/// tag map is extracted from a carrier.
pub const PARENT_OPERATION_KEY: &str = "method";

/// Discriminant identifying one extra-field kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExtraFieldKind {
    /// Out-of-band key/value metadata (a [`TagFields`]).
    Tags,
    /// Opaque third-party vendor state (a [`VendorState`]).
    VendorState,
}

/// One extra field attached to a trace context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExtraField {
    /// Key/value metadata carried next to the identifiers on transports
    /// with a binary side channel.
    Tags(TagFields),
    /// Other vendors' state multiplexed into the same wire slot as ours;
    /// preserved but never interpreted.
    VendorState(VendorState),
}

impl ExtraField {
    /// The kind tag for this field.
    #[must_use]
    pub const fn kind(&self) -> ExtraFieldKind {
        match self {
            Self::Tags(_) => ExtraFieldKind::Tags,
            Self::VendorState(_) => ExtraFieldKind::VendorState,
        }
    }

    /// Builds the instance a child context inherits from this one.
    #[must_use]
    pub fn make_child(&self) -> Self {
        match self {
            Self::Tags(tags) => Self::Tags(tags.child()),
            Self::VendorState(state) => Self::VendorState(state.clone()),
        }
    }

    /// The tag fields, when this is the [`Tags`](Self::Tags) variant.
    #[must_use]
    pub const fn as_tags(&self) -> Option<&TagFields> {
        match self {
            Self::Tags(tags) => Some(tags),
            Self::VendorState(_) => None,
        }
    }

    /// The vendor blob, when this is the
    /// [`VendorState`](Self::VendorState) variant.
    #[must_use]
    pub const fn as_vendor_state(&self) -> Option<&VendorState> {
        match self {
            Self::VendorState(state) => Some(state),
            Self::Tags(_) => None,
        }
    }
}

/// Finds the field of the given kind in an ordered extra list.
#[must_use]
pub fn find(extra: &[ExtraField], kind: ExtraFieldKind) -> Option<&ExtraField> {
    extra.iter().find(|field| field.kind() == kind)
}

/// String-keyed metadata propagated alongside the trace identifiers.
///
/// The reserved `"method"` key is not kept in the generic map: extraction
/// lifts it into [`parent_operation`](Self::parent_operation) so
/// downstream consumers see it as a first-class attribute. It is consumed,
/// not re-serialized.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagFields {
    entries: BTreeMap<String, String>,
    parent_operation: Option<String>,
}

impl TagFields {
    /// An empty instance.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds from a map decoded off a carrier, lifting the reserved key.
    #[must_use]
    pub fn from_extracted(mut entries: BTreeMap<String, String>) -> Self {
        let parent_operation = entries.remove(PARENT_OPERATION_KEY);
        Self {
            entries,
            parent_operation,
        }
    }

    /// The instance a child context inherits: the entries are copied, the
    /// parent operation is not.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            entries: self.entries.clone(),
            parent_operation: None,
        }
    }

    /// The operation name of the calling side, if the peer supplied one.
    #[must_use]
    pub fn parent_operation(&self) -> Option<&str> {
        self.parent_operation.as_deref()
    }

    /// Reads one tag.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Writes one tag, replacing any prior value.
    pub fn put(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.insert(key.into(), value.into());
    }

    /// The generic entries, reserved key excluded.
    #[must_use]
    pub const fn entries(&self) -> &BTreeMap<String, String> {
        &self.entries
    }

    /// `true` when there are no generic entries to serialize.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Opaque third-party tracing state, preserved byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VendorState(String);

impl VendorState {
    /// Wraps a preserved blob.
    #[must_use]
    pub fn new(blob: impl Into<String>) -> Self {
        Self(blob.into())
    }

    /// The blob as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Unwraps the blob.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl From<String> for VendorState {
    fn from(blob: String) -> Self {
        Self(blob)
    }
}

impl From<&str> for VendorState {
    fn from(blob: &str) -> Self {
        Self(blob.to_owned())
    }
}

impl fmt::Display for VendorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Factory for one extra-field kind: how to build an empty instance, how
/// a child inherits from a parent, and the tag used to find an existing
/// instance inside a context.
pub trait ExtraFieldFactory {
    /// The kind this factory builds.
    fn kind(&self) -> ExtraFieldKind;

    /// An empty instance.
    fn create(&self) -> ExtraField;

    /// The instance a child inherits from `parent`.
    fn create_child(&self, parent: &ExtraField) -> ExtraField {
        parent.make_child()
    }

    /// Ensures `context` carries an instance of this kind, attaching an
    /// empty one when absent.
    fn decorate(&self, context: TraceContext) -> TraceContext {
        if context.find_extra(self.kind()).is_some() {
            context
        } else {
            context.with_extra_field(self.create())
        }
    }
}

/// Factory for [`TagFields`].
#[derive(Debug, Clone, Copy, Default)]
pub struct TagFieldsFactory;

impl ExtraFieldFactory for TagFieldsFactory {
    fn kind(&self) -> ExtraFieldKind {
        ExtraFieldKind::Tags
    }

    fn create(&self) -> ExtraField {
        ExtraField::Tags(TagFields::new())
    }
}
