//! Entity types mirroring the five persisted relations.
//!
//! These are plain rows, not an object graph: entities reference each
//! other by id only, and membership (token ∈ set, group ∈ level) lives in
//! junction relations owned by the persistence layer.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::id::{GroupId, LevelId, ObjectId, TokenId, TokenSetId};
use crate::signature::signature_of;

/// An atomic label. Tokens carry no meaning beyond whatever the policy
/// designer assigns to them; the value is globally unique and immutable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub value: String,
}

/// A content-addressed set of tokens. Two sets with identical membership
/// are the same stored row; the set's identity survives in-place updates
/// to its membership.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub id: TokenSetId,
    pub members: BTreeSet<TokenId>,
}

impl TokenSet {
    /// Canonical signature of the current membership.
    pub fn signature(&self) -> String {
        signature_of(self.members.iter().copied())
    }
}

impl fmt::Display for TokenSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}}}", self.signature())
    }
}

/// A named, mutable, shared token-set. Updating a group mutates its set in
/// place, so every level referencing the group observes the new membership
/// without being touched itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityGroup {
    pub id: GroupId,
    pub name: String,
    pub token_set: TokenSetId,
}

/// A composed label: one owned token-set plus a set of referenced groups.
/// Levels are deduplicated by the group-set signature alone; the token-set
/// only matters when a new level row has to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityLevel {
    pub id: LevelId,
    pub token_set: TokenSetId,
    pub groups: BTreeSet<GroupId>,
}

impl SecurityLevel {
    /// Canonical signature of the referenced group ids, the level's
    /// dedup key.
    pub fn group_signature(&self) -> String {
        signature_of(self.groups.iter().copied())
    }
}

/// An identified resource carrying exactly one security level. Many
/// objects may share a level; deleting an object leaves the level intact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityObject {
    pub id: ObjectId,
    pub uuid: String,
    pub level: LevelId,
}
