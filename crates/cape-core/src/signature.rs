//! Canonical signatures for content-addressing sets of ids.
//!
//! A signature is the comma-joined, ascending-sorted member ids. It is
//! computed at write time and stored alongside the row, so structural
//! equality is a single indexed lookup, never a runtime aggregation,
//! whose ordering some backends refuse to guarantee.

/// Canonical signature of a set of ids.
///
/// The input may arrive in any order and with duplicates; both are
/// normalized away. The empty set yields the empty string.
pub fn signature_of<I, T>(ids: I) -> String
where
    I: IntoIterator<Item = T>,
    T: Into<i64>,
{
    let mut raw: Vec<i64> = ids.into_iter().map(Into::into).collect();
    raw.sort_unstable();
    raw.dedup();
    raw.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
