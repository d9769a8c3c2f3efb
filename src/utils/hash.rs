//! Content hashing utilities.

use xxhash_rust::xxh3::xxh3_64;

/// Compute a content hash for arbitrary bytes.
#[must_use]
pub fn content_hash(data: &[u8]) -> u64 {
    xxh3_64(data)
}

/// Short hexadecimal token derived from the given parts, used for session
/// and transient version names.
#[must_use]
pub(crate) fn short_token(parts: &[&str]) -> String {
    let joined = parts.join("\u{1f}");
    format!("{:08x}", content_hash(joined.as_bytes()) >> 32)
}
