//! The binary tag map format.
//!
//! An independent codec carrying an arbitrary string-to-string map in the
//! same transport message as the trace identifier. Layout: a version
//! byte, then one field per entry:
//!
//! ```text
//! [version=0]([field=0][varint key-len][key][varint value-len][value])*
//! ```
//!
//! Lengths are unsigned LEB128. Encoding iterates the map in key order,
//! so equal maps encode to equal bytes and `decode(encode(m)) == m`.

use std::collections::BTreeMap;
use tracing::debug;

const VERSION: u8 = 0;
const TAG_FIELD: u8 = 0;

/// Encodes a tag map into its binary form.
#[must_use]
pub fn encode(tags: &BTreeMap<String, String>) -> Vec<u8> {
    let size: usize = 1 + tags.iter().map(|(k, v)| 3 + k.len() + v.len()).sum::<usize>();
    let mut out = Vec::with_capacity(size);
    out.push(VERSION);
    for (key, value) in tags {
        out.push(TAG_FIELD);
        push_varint(&mut out, key.len());
        out.extend_from_slice(key.as_bytes());
        push_varint(&mut out, value.len());
        out.extend_from_slice(value.as_bytes());
    }
    out
}

/// Decodes a binary tag map.
///
/// Total over all byte sequences: zero-length input, an unsupported
/// version, an unknown field id, a truncated length or payload, and
/// non-UTF-8 text all yield `None`.
#[must_use]
pub fn decode(bytes: &[u8]) -> Option<BTreeMap<String, String>> {
    if bytes.is_empty() {
        return None;
    }
    if bytes[0] != VERSION {
        debug!(version = bytes[0], "unsupported binary tag map version");
        return None;
    }
    let mut tags = BTreeMap::new();
    let mut pos = 1;
    while pos < bytes.len() {
        if bytes[pos] != TAG_FIELD {
            debug!(offset = pos, "unexpected field in binary tag map");
            return None;
        }
        let (key, next) = read_string(bytes, pos + 1)?;
        let (value, next) = read_string(bytes, next)?;
        tags.insert(key, value);
        pos = next;
    }
    Some(tags)
}

fn push_varint(out: &mut Vec<u8>, mut v: usize) {
    loop {
        let b = (v & 0x7f) as u8;
        v >>= 7;
        if v == 0 {
            out.push(b);
            return;
        }
        out.push(b | 0x80);
    }
}

/// Reads an unsigned LEB128 length, capped at four bytes. The cap bounds
/// attacker-controlled allocation well above any real tag payload.
fn read_varint(bytes: &[u8], mut pos: usize) -> Option<(usize, usize)> {
    let mut value = 0usize;
    let mut shift = 0u32;
    loop {
        let &b = bytes.get(pos)?;
        if shift >= 28 {
            debug!("binary tag map length varint too long");
            return None;
        }
        value |= usize::from(b & 0x7f) << shift;
        pos += 1;
        if (b & 0x80) == 0 {
            return Some((value, pos));
        }
        shift += 7;
    }
}

fn read_string(bytes: &[u8], pos: usize) -> Option<(String, usize)> {
    let (len, pos) = read_varint(bytes, pos)?;
    let end = pos.checked_add(len)?;
    let slice = bytes.get(pos..end)?;
    match std::str::from_utf8(slice) {
        Ok(s) => Some((s.to_owned(), end)),
        Err(_) => {
            debug!("binary tag map entry is not UTF-8");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|&(k, v)| (k.to_owned(), v.to_owned()))
            .collect()
    }

    #[test]
    fn round_trips() {
        for tags in [
            map(&[]),
            map(&[("method", "helloworld.Greeter/SayHello")]),
            map(&[("a", "1"), ("b", ""), ("c", "three")]),
        ] {
            assert_eq!(decode(&encode(&tags)), Some(tags));
        }
    }

    #[test]
    fn encodes_the_documented_layout() {
        let bytes = encode(&map(&[("k1", "v1")]));
        assert_eq!(bytes, [0, 0, 2, b'k', b'1', 2, b'v', b'1']);
    }

    #[test]
    fn equal_maps_encode_to_equal_bytes() {
        let mut forward = BTreeMap::new();
        forward.insert("a".to_owned(), "1".to_owned());
        forward.insert("b".to_owned(), "2".to_owned());

        let mut backward = BTreeMap::new();
        backward.insert("b".to_owned(), "2".to_owned());
        backward.insert("a".to_owned(), "1".to_owned());

        assert_eq!(encode(&forward), encode(&backward));
    }

    #[test]
    fn round_trips_values_needing_multi_byte_lengths() {
        let big = "x".repeat(300);
        let tags = map(&[("big", big.as_str())]);
        assert_eq!(decode(&encode(&tags)), Some(tags));
    }

    #[test]
    fn zero_length_input_is_no_map() {
        assert_eq!(decode(&[]), None);
    }

    #[test]
    fn rejects_unsupported_version() {
        assert_eq!(decode(&[1]), None);
    }

    #[test]
    fn rejects_unknown_field_ids() {
        assert_eq!(decode(&[0, 7, 1, b'k', 1, b'v']), None);
    }

    #[test]
    fn rejects_truncation() {
        let bytes = encode(&map(&[("key", "value")]));
        // Cutting after the bare version byte leaves a valid empty map,
        // so truncation starts inside the first field.
        for cut in 2..bytes.len() {
            assert_eq!(decode(&bytes[..cut]), None, "cut at {cut}");
        }
    }

    #[test]
    fn rejects_unterminated_varints() {
        assert_eq!(decode(&[0, 0, 0x80]), None);
        assert_eq!(decode(&[0, 0, 0x80, 0x80, 0x80, 0x80, 0x80]), None);
    }

    #[test]
    fn rejects_non_utf8_payloads() {
        assert_eq!(decode(&[0, 0, 1, 0xff, 1, b'v']), None);
    }
}
