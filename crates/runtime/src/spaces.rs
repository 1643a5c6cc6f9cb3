//! Space-name normalization.
//!
//! `join`/`leave` accept `"home, work"`, `"home work"`, or any
//! iterable of names; normalization trims, drops empties, and
//! deduplicates. The ordered set keeps `join` commands deterministic.

use std::collections::BTreeSet;

/// Splits a comma- or space-separated list into a normalized set.
pub(crate) fn normalize_str(input: &str) -> BTreeSet<String> {
    normalize_iter(input.split([',', ' ']))
}

/// Normalizes any iterable of space names.
pub(crate) fn normalize_iter<I, S>(input: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    input
        .into_iter()
        .map(|s| s.as_ref().trim().to_owned())
        .filter(|s| !s.is_empty())
        .collect()
}
