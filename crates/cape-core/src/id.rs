//! Identifier newtypes for the five entity kinds.
//!
//! Every entity lives in an id-indexed relation; references between
//! entities are always by id, never by embedding. The newtypes keep a
//! token id from being handed to an operation expecting a group id.

use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! entity_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<i64> for $name {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$name> for i64 {
            fn from(id: $name) -> i64 {
                id.0
            }
        }
    };
}

entity_id! {
    /// Id of an interned token.
    TokenId
}

entity_id! {
    /// Id of a content-addressed token-set.
    TokenSetId
}

entity_id! {
    /// Id of a named security group.
    GroupId
}

entity_id! {
    /// Id of a composed security level.
    LevelId
}

entity_id! {
    /// Row id of a security object (its public identity is the uuid).
    ObjectId
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_is_raw_integer() {
        assert_eq!(TokenId(7).to_string(), "7");
        assert_eq!(LevelId(-1).to_string(), "-1");
    }

    #[test]
    fn ordering_follows_raw_value() {
        let mut ids = vec![TokenId(3), TokenId(1), TokenId(2)];
        ids.sort();
        assert_eq!(ids, vec![TokenId(1), TokenId(2), TokenId(3)]);
    }

    #[test]
    fn serde_transparent() {
        let json = serde_json::to_string(&GroupId(42)).unwrap();
        assert_eq!(json, "42");
        let back: GroupId = serde_json::from_str("42").unwrap();
        assert_eq!(back, GroupId(42));
    }
}
