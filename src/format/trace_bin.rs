//! The fixed-layout binary trace identifier format.
//!
//! Layout (big-endian longs):
//!
//! ```text
//! [version=0][field=0][trace_id_high: 8][trace_id: 8][field=1][span_id: 8]([field=2][sampled: 1])
//! ```
//!
//! 29 bytes with the sampling field, 27 without. The trailing field is
//! omitted on encode when no sampling decision was made, and absence on
//! decode means unset, not false — so `decode(encode(x)) == x` for every
//! valid context.

use crate::context::TraceContext;
use tracing::debug;

const VERSION: u8 = 0;
const TRACE_ID_FIELD: u8 = 0;
const SPAN_ID_FIELD: u8 = 1;
const SAMPLED_FIELD: u8 = 2;

/// Encoded length with the sampling field present.
pub const FORMAT_LENGTH: usize = 29;
/// Length of the mandatory prefix (version, trace id, span id).
pub const REQUIRED_LENGTH: usize = 27;

/// Encodes `context` into its binary form.
#[must_use]
pub fn encode(context: &TraceContext) -> Vec<u8> {
    let mut out = Vec::with_capacity(FORMAT_LENGTH);
    out.push(VERSION);
    out.push(TRACE_ID_FIELD);
    out.extend_from_slice(&context.trace_id_high().to_be_bytes());
    out.extend_from_slice(&context.trace_id().to_be_bytes());
    out.push(SPAN_ID_FIELD);
    out.extend_from_slice(&context.span_id().to_be_bytes());
    if let Some(sampled) = context.sampled() {
        out.push(SAMPLED_FIELD);
        out.push(u8::from(sampled));
    }
    out
}

/// Decodes a binary trace identifier.
///
/// Zero-length input is a legitimate empty case and returns `None`
/// without diagnostic noise. Anything else that fails to parse — an
/// unsupported version, a truncated buffer, a field id out of place —
/// also returns `None`, with a debug-level line. Never panics on any
/// byte sequence.
#[must_use]
pub fn decode(bytes: &[u8]) -> Option<TraceContext> {
    if bytes.is_empty() {
        return None;
    }
    if bytes[0] != VERSION {
        debug!(version = bytes[0], "unsupported binary trace version");
        return None;
    }
    if bytes.len() < REQUIRED_LENGTH {
        debug!(len = bytes.len(), "binary trace value truncated");
        return None;
    }
    if bytes[1] != TRACE_ID_FIELD {
        debug!("expected trace ID field at offset 1");
        return None;
    }
    let trace_id_high = read_u64(bytes, 2);
    let trace_id = read_u64(bytes, 10);
    if bytes[18] != SPAN_ID_FIELD {
        debug!("expected span ID field at offset 18");
        return None;
    }
    let span_id = read_u64(bytes, 19);

    // The sampling field is optional; when present it must be complete.
    let mut sampled = None;
    if bytes.len() > REQUIRED_LENGTH && bytes[27] == SAMPLED_FIELD {
        if bytes.len() < FORMAT_LENGTH {
            debug!("binary trace value truncated");
            return None;
        }
        sampled = Some(bytes[28] == 1);
    }

    TraceContext::builder()
        .with_trace_id_high(trace_id_high)
        .with_trace_id(trace_id)
        .with_span_id(span_id)
        .with_sampled(sampled)
        .build()
        .ok()
}

fn read_u64(bytes: &[u8], pos: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&bytes[pos..pos + 8]);
    u64::from_be_bytes(buf)
}
