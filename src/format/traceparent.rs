//! The single-hop text trace identifier format.
//!
//! Fixed 55 characters: `00-` version, 32 lower-hex characters of 128-bit
//! trace id, `-`, 16 lower-hex characters of span id, `-`, two hex flag
//! characters. Example:
//!
//! ```text
//! 00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01
//! ```
//!
//! The parent span id is not representable; the receiver of an encoded
//! value becomes the new parent.

use crate::context::TraceContext;
use crate::util::hex;
use tracing::debug;

/// Encoded length in characters.
pub const FORMAT_LENGTH: usize = 55;

/// Encodes `context` into the fixed 55-character form.
///
/// Pure function of the identifiers; always succeeds. The flags pair is
/// `01` only for an affirmative sampling decision, `00` otherwise.
#[must_use]
pub fn encode(context: &TraceContext) -> String {
    let mut out = String::with_capacity(FORMAT_LENGTH);
    out.push_str("00-");
    hex::push_lower_hex_u64(&mut out, context.trace_id_high());
    hex::push_lower_hex_u64(&mut out, context.trace_id());
    out.push('-');
    hex::push_lower_hex_u64(&mut out, context.span_id());
    out.push_str(if context.sampled() == Some(true) {
        "-01"
    } else {
        "-00"
    });
    out
}

/// Decodes the leading 55-character window of `text`.
///
/// Returns `None` on any malformed input: too short, misplaced
/// delimiters, non-lower-hex characters, an unsupported version pair, an
/// all-zero trace id, or a zero span id. Failures log at debug level
/// only; callers never observe an error.
#[must_use]
pub fn decode(text: &str) -> Option<TraceContext> {
    let bytes = text.as_bytes();
    if bytes.len() < FORMAT_LENGTH {
        debug!(len = bytes.len(), "traceparent value too short");
        return None;
    }
    if !validate(&bytes[..FORMAT_LENGTH]) {
        return None;
    }
    if &bytes[..2] != b"00" {
        debug!("unsupported traceparent version");
        return None;
    }

    let trace_id_high = hex::parse_lower_hex_u64(&bytes[3..19])?;
    let trace_id = hex::parse_lower_hex_u64(&bytes[19..35])?;
    if trace_id_high == 0 && trace_id == 0 {
        debug!("expected non-zero trace ID");
        return None;
    }

    let span_id = hex::parse_lower_hex_u64(&bytes[36..52])?;
    if span_id == 0 {
        debug!("expected non-zero span ID");
        return None;
    }

    let flags = (hex::hex_value(bytes[53])? << 4) | hex::hex_value(bytes[54])?;
    TraceContext::builder()
        .with_trace_id_high(trace_id_high)
        .with_trace_id(trace_id)
        .with_span_id(span_id)
        .with_sampled((flags & 1) == 1)
        .build()
        .ok()
}

/// Checks delimiters at offsets 2, 35 and 52 and lower-hex everywhere
/// else in the window.
fn validate(window: &[u8]) -> bool {
    for (i, &b) in window.iter().enumerate() {
        if b == b'-' {
            if i != 2 && i != 35 && i != 52 {
                debug!(offset = i, "unexpected hyphen in traceparent value");
                return false;
            }
        } else if !hex::is_lower_hex(b) {
            debug!(offset = i, "expected lower hex in traceparent value");
            return false;
        }
    }
    true
}
