//! Public wire resources exchanged with callers.
//!
//! These are the externally visible shapes: names and values, never
//! internal row ids. The API layer translates between resources and store
//! operations.

use serde::{Deserialize, Serialize};

/// A security group as callers see it: a unique name and the token values
/// currently assigned to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupResource {
    pub name: String,
    pub tokens: Vec<String>,
}

/// A security level as callers see it: individually assigned token values
/// plus referenced group names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LevelResource {
    pub tokens: Vec<String>,
    pub groups: Vec<String>,
}

/// A labeled object: its caller-opaque uuid and its level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectResource {
    pub uuid: String,
    pub level: LevelResource,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn group_resource_roundtrip() {
        let group = GroupResource {
            name: "eng".to_string(),
            tokens: vec!["alpha".to_string(), "beta".to_string()],
        };
        let json = serde_json::to_string(&group).unwrap();
        let back: GroupResource = serde_json::from_str(&json).unwrap();
        assert_eq!(group, back);
    }

    #[test]
    fn object_resource_shape() {
        let json = r#"{"uuid":"abc","level":{"tokens":["a"],"groups":["eng"]}}"#;
        let obj: ObjectResource = serde_json::from_str(json).unwrap();
        assert_eq!(obj.uuid, "abc");
        assert_eq!(obj.level.tokens, vec!["a"]);
        assert_eq!(obj.level.groups, vec!["eng"]);
    }

    #[test]
    fn level_resource_allows_empty() {
        let level: LevelResource = serde_json::from_str(r#"{"tokens":[],"groups":[]}"#).unwrap();
        assert!(level.tokens.is_empty());
        assert!(level.groups.is_empty());
    }
}
