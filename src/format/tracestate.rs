//! The multi-vendor state list format.
//!
//! A comma-separated list of `key=value` vendor entries sharing one wire
//! slot. This module owns exactly one reserved key (the vendor name,
//! `tc` by default). On write, our entry goes first with a freshly
//! encoded [`traceparent`] value; every other vendor's entry follows
//! verbatim in its original relative order. On read, the first entry
//! carrying the reserved key is decoded and everything else is preserved
//! byte-for-byte as one opaque blob — including later duplicates of the
//! reserved key placed by a misbehaving peer.

use crate::context::TraceContext;
use crate::format::traceparent;
use memchr::memchr;
use tracing::debug;

/// Outcome of scanning a state list.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedState {
    /// Context decoded from the first reserved-key entry, if that entry
    /// was present and well formed.
    pub context: Option<TraceContext>,
    /// Every other entry, comma-joined in original order.
    pub other_state: Option<String>,
}

/// Writes the state list: our entry first, `other_state` after.
///
/// Round-trip law: a blob recovered by [`parse`] reappears byte-for-byte,
/// only prefixed by the freshly re-encoded own entry.
#[must_use]
pub fn write(state_name: &str, this_state: &str, other_state: Option<&str>) -> String {
    let extra = other_state.map_or(0, str::len);
    let mut out = String::with_capacity(state_name.len() + 1 + this_state.len() + extra + 1);
    out.push_str(state_name);
    out.push('=');
    out.push_str(this_state);
    if let Some(other) = other_state {
        if !other.is_empty() {
            out.push(',');
            out.push_str(other);
        }
    }
    out
}

/// Scans `text` left to right, trimming insignificant whitespace around
/// entries.
///
/// The first entry whose key equals `state_name` is decoded as a
/// [`traceparent`] value; a malformed own entry still yields no context
/// without aborting the scan, so the other-vendor blob survives either
/// way. Empty entries are dropped.
#[must_use]
pub fn parse(state_name: &str, text: &str) -> ParsedState {
    let mut parsed = ParsedState::default();
    let mut own_seen = false;
    let mut rest = text;

    loop {
        let (entry, tail) = match memchr(b',', rest.as_bytes()) {
            Some(pos) => (&rest[..pos], Some(&rest[pos + 1..])),
            None => (rest, None),
        };
        let entry = entry.trim();
        if !entry.is_empty() {
            if !own_seen && entry_key(entry) == Some(state_name) {
                own_seen = true;
                parsed.context = traceparent::decode(&entry[state_name.len() + 1..]);
                if parsed.context.is_none() {
                    debug!("reserved state entry did not decode");
                }
            } else {
                match &mut parsed.other_state {
                    Some(other) => {
                        other.push(',');
                        other.push_str(entry);
                    }
                    None => parsed.other_state = Some(entry.to_owned()),
                }
            }
        }
        match tail {
            Some(t) => rest = t,
            None => break,
        }
    }
    parsed
}

/// The key of one entry, `None` when the entry has no `=` at all.
fn entry_key(entry: &str) -> Option<&str> {
    memchr(b'=', entry.as_bytes()).map(|pos| &entry[..pos])
}
