//! Wire codecs for trace identifiers and companion metadata.
//!
//! Two families: the text formats ([`traceparent`] single-hop value and
//! the [`tracestate`] multi-vendor list that wraps it) and the binary
//! formats ([`trace_bin`] fixed-layout identifier and [`tag_bin`] tag
//! map). All decoders are total: any malformed byte sequence from an
//! untrusted peer yields "no context", optionally with a low-severity
//! diagnostic, never an error.

pub mod tag_bin;
pub mod trace_bin;
pub mod traceparent;
pub mod tracestate;
