//! Storage key codec
//!
//! Logical keys are `:`-joined segments (`backend:db`). Hierarchical
//! backends store them as `/`-joined paths with every segment
//! percent-encoded, so arbitrary resource names — including ones that
//! contain separators — land on distinct paths. Recovering the logical
//! key reverses the encoding and re-joins with `:`.

use crate::error::{Result, StateError};

const LOGICAL_SEPARATOR: char = ':';
const PATH_SEPARATOR: char = '/';

/// RFC 3986 unreserved characters pass through unencoded.
fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~')
}

/// Percent-encode a single key or prefix segment.
pub fn encode_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if is_unreserved(byte) {
            encoded.push(byte as char);
        } else {
            encoded.push('%');
            encoded.push_str(&format!("{byte:02X}"));
        }
    }
    encoded
}

/// Reverse [`encode_segment`].
pub fn decode_segment(segment: &str) -> Result<String> {
    let bytes = segment.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = bytes
                .get(i + 1..i + 3)
                .and_then(|pair| std::str::from_utf8(pair).ok())
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| {
                    StateError::InvalidKey(format!("truncated percent escape in '{segment}'"))
                })?;
            decoded.push(hex);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded)
        .map_err(|_| StateError::InvalidKey(format!("segment '{segment}' is not valid UTF-8")))
}

/// Map a logical `:`-key onto a storage path.
pub fn key_to_path(key: &str) -> String {
    key.split(LOGICAL_SEPARATOR)
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join(&PATH_SEPARATOR.to_string())
}

/// Recover a logical key from a storage path.
pub fn path_to_key(path: &str) -> Result<String> {
    let segments = path
        .split(PATH_SEPARATOR)
        .map(decode_segment)
        .collect::<Result<Vec<_>>>()?;
    Ok(segments.join(&LOGICAL_SEPARATOR.to_string()))
}

/// Map a slash-joined scope prefix onto a storage path, encoding each
/// scope name but keeping the hierarchy.
pub fn prefix_to_path(prefix: &str) -> String {
    prefix
        .split(PATH_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .map(encode_segment)
        .collect::<Vec<_>>()
        .join(&PATH_SEPARATOR.to_string())
}
