//! Node identifiers
//!
//! Fixed topology nodes are addressed by their 1-based index; ad hoc cubes
//! created over the API carry a string id (a UUIDv7 unless the caller picks one).

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::role::FIXED_TOPOLOGY;

/// Identifier of a node in the cube topology
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeId {
    /// Position in the fixed topology (1..=9)
    Index(u32),
    /// Ad hoc node created on demand
    Named(String),
}

impl NodeId {
    /// Generate a fresh id for an ad hoc node
    pub fn generate() -> Self {
        Self::Named(Uuid::now_v7().to_string())
    }

    /// Id for a fixed topology position; numbers outside 1..=9 become named ids
    pub fn from_index(index: u32) -> Self {
        if Self::fixed_range(index) {
            Self::Index(index)
        } else {
            Self::Named(index.to_string())
        }
    }

    /// Same id with out-of-range indices moved to the named form
    pub fn canonical(self) -> Self {
        match self {
            Self::Index(index) => Self::from_index(index),
            named => named,
        }
    }

    /// Whether this id addresses one of the nine fixed nodes
    pub fn is_fixed(&self) -> bool {
        matches!(self, Self::Index(index) if Self::fixed_range(*index))
    }

    fn fixed_range(index: u32) -> bool {
        (1..=FIXED_TOPOLOGY.len() as u32).contains(&index)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(index) => write!(f, "{}", index),
            Self::Named(name) => write!(f, "{}", name),
        }
    }
}

impl FromStr for NodeId {
    type Err = std::convert::Infallible;

    /// "1" through "9" address the fixed topology, anything else is a named node
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        Ok(match trimmed.parse::<u32>() {
            Ok(index) if Self::fixed_range(index) => Self::Index(index),
            _ => Self::Named(trimmed.to_string()),
        })
    }
}

impl From<u32> for NodeId {
    fn from(index: u32) -> Self {
        Self::from_index(index)
    }
}

impl From<&str> for NodeId {
    fn from(s: &str) -> Self {
        match s.parse() {
            Ok(id) => id,
            Err(never) => match never {},
        }
    }
}

impl From<String> for NodeId {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_string_parses_to_index() {
        assert_eq!(NodeId::from("7"), NodeId::Index(7));
        assert_eq!(NodeId::from(" 3 "), NodeId::Index(3));
    }

    #[test]
    fn test_numbers_outside_fixed_topology_are_named() {
        assert_eq!(NodeId::from("42"), NodeId::Named("42".to_string()));
        assert_eq!(NodeId::from("0"), NodeId::Named("0".to_string()));
        assert_eq!(NodeId::from(10u32), NodeId::Named("10".to_string()));
        assert_eq!(NodeId::Index(42).canonical(), NodeId::Named("42".to_string()));
        assert_eq!(NodeId::Index(9).canonical(), NodeId::Index(9));
        assert!(!NodeId::Index(42).is_fixed());
        assert!(NodeId::Index(1).is_fixed());
    }

    #[test]
    fn test_non_numeric_string_parses_to_named() {
        assert_eq!(NodeId::from("plant-a"), NodeId::Named("plant-a".to_string()));
    }

    #[test]
    fn test_generate_is_unique_and_named() {
        let a = NodeId::generate();
        let b = NodeId::generate();
        assert_ne!(a, b);
        assert!(!a.is_fixed());
    }

    #[test]
    fn test_serializes_untagged() {
        assert_eq!(serde_json::to_string(&NodeId::Index(4)).unwrap(), "4");
        assert_eq!(
            serde_json::to_string(&NodeId::Named("abc".to_string())).unwrap(),
            r#""abc""#
        );
        let parsed: NodeId = serde_json::from_str("9").unwrap();
        assert_eq!(parsed, NodeId::Index(9));
    }
}
