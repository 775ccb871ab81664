//! Slot indexing for dynamically named inputs (`input`, `input_7`, `image_3`).
//!
//! The occurrence number is the integer after the last underscore. Keys without a
//! parseable suffix degrade to slot 1; this includes negative-looking suffixes such as
//! `x_-1`, which fail the unsigned parse rather than being rejected by a separate check.
//! Reserved keys (leading `_`) are never slots and must be filtered by the caller.

use std::cmp::Ordering;

/// Slot assigned to keys without a numeric suffix.
pub const DEFAULT_SLOT: usize = 1;

/// Split a key into its prefix and optional positional suffix.
pub fn split_slot_key(key: &str) -> (&str, Option<usize>) {
    if let Some((prefix, tail)) = key.rsplit_once('_') {
        if let Ok(idx) = tail.parse::<usize>() {
            return (prefix, Some(idx));
        }
    }
    (key, None)
}

/// 1-based slot index of `key`, [`DEFAULT_SLOT`] when no suffix parses.
pub fn parse_index(key: &str) -> usize {
    parse_index_or(key, DEFAULT_SLOT)
}

pub fn parse_index_or(key: &str, default: usize) -> usize {
    split_slot_key(key).1.unwrap_or(default)
}

/// Hidden or host-internal keyword (`_slot_types`, `_output_hints`, ...).
#[inline]
pub fn is_reserved(key: &str) -> bool {
    key.starts_with('_')
}

/// Slot index for a key belonging to the `prefix` family, `None` for reserved keys and
/// keys from other families.
pub fn family_index(key: &str, prefix: &str) -> Option<usize> {
    if is_reserved(key) || !key.starts_with(prefix) {
        return None;
    }
    Some(parse_index(key))
}

/// Order keys by slot index, then lexicographically so ties stay deterministic.
pub fn compare_slot_keys(a: &str, b: &str) -> Ordering {
    parse_index(a).cmp(&parse_index(b)).then_with(|| a.cmp(b))
}

/// Sort `(key, value)` pairs into canonical slot order.
pub fn sort_by_slot<K: AsRef<str>, V>(items: &mut [(K, V)]) {
    items.sort_by(|(a, _), (b, _)| compare_slot_keys(a.as_ref(), b.as_ref()));
}
