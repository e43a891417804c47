//! Effective-set computation.
//!
//! The effective permission set of a level is the union of its own
//! token-set with the token-set of every group it references. Groups never
//! nest groups, so the traversal is one level deep by construction.

use std::collections::BTreeSet;

/// Union of a level's own membership with every referenced group's
/// membership. Works over token ids and token values alike.
pub fn effective_set<T: Ord>(
    own: BTreeSet<T>,
    groups: impl IntoIterator<Item = BTreeSet<T>>,
) -> BTreeSet<T> {
    groups.into_iter().fold(own, |mut acc, members| {
        acc.extend(members);
        acc
    })
}
