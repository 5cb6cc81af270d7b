//! Functional roles of cube nodes

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Role of a node in the supervisory system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    Scada,
    Hmi,
    Plc,
    Historian,
    Gateway,
    LoadBalancer,
    Training,
    Monitoring,
    Coordinator,
}

/// The fixed cube: eight vertices in document order, then the central coordinator
pub const FIXED_TOPOLOGY: [(&str, Role); 9] = [
    ("vertex_1", Role::Scada),
    ("vertex_2", Role::Hmi),
    ("vertex_3", Role::Plc),
    ("vertex_4", Role::Historian),
    ("vertex_5", Role::Gateway),
    ("vertex_6", Role::LoadBalancer),
    ("vertex_7", Role::Training),
    ("vertex_8", Role::Monitoring),
    ("central", Role::Coordinator),
];

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown role: {0}")]
pub struct UnknownRole(pub String);

impl Role {
    pub const ALL: [Role; 9] = [
        Role::Scada,
        Role::Hmi,
        Role::Plc,
        Role::Historian,
        Role::Gateway,
        Role::LoadBalancer,
        Role::Training,
        Role::Monitoring,
        Role::Coordinator,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Scada => "SCADA",
            Role::Hmi => "HMI",
            Role::Plc => "PLC",
            Role::Historian => "HISTORIAN",
            Role::Gateway => "GATEWAY",
            Role::LoadBalancer => "LOAD_BALANCER",
            Role::Training => "TRAINING",
            Role::Monitoring => "MONITORING",
            Role::Coordinator => "COORDINATOR",
        }
    }

    pub fn is_vertex(&self) -> bool {
        !matches!(self, Role::Coordinator)
    }

    /// Roles this role structurally depends on
    ///
    /// Every vertex hangs off the coordinator; the coordinator itself has no
    /// structural dependencies.
    pub fn structural_dependencies(&self) -> &'static [Role] {
        match self {
            Role::Scada => &[Role::Coordinator, Role::Plc],
            Role::Hmi => &[Role::Coordinator, Role::Scada],
            Role::Plc => &[Role::Coordinator],
            Role::Historian => &[Role::Coordinator, Role::Scada],
            Role::Gateway => &[Role::Coordinator, Role::Scada],
            Role::LoadBalancer => &[Role::Coordinator, Role::Gateway],
            Role::Training => &[Role::Coordinator, Role::Historian],
            Role::Monitoring => &[Role::Coordinator, Role::Scada, Role::Historian],
            Role::Coordinator => &[],
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = UnknownRole;

    /// Case-insensitive; accepts `-` or `_` separators
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase().replace('-', "_");
        Role::ALL
            .iter()
            .copied()
            .find(|role| role.as_str() == normalized)
            .ok_or_else(|| UnknownRole(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_topology_order() {
        let roles: Vec<Role> = FIXED_TOPOLOGY.iter().map(|(_, role)| *role).collect();
        assert_eq!(roles, Role::ALL.to_vec());
        assert_eq!(FIXED_TOPOLOGY[8], ("central", Role::Coordinator));
    }

    #[test]
    fn test_from_str_is_lenient() {
        assert_eq!("load-balancer".parse::<Role>().unwrap(), Role::LoadBalancer);
        assert_eq!("hmi".parse::<Role>().unwrap(), Role::Hmi);
        assert_eq!("standalone".parse::<Role>(), Err(UnknownRole("standalone".to_string())));
    }

    #[test]
    fn test_serde_uses_screaming_snake_case() {
        let json = serde_json::to_string(&Role::LoadBalancer).unwrap();
        assert_eq!(json, r#""LOAD_BALANCER""#);
    }

    #[test]
    fn test_structural_dependencies_never_self_referential() {
        for role in Role::ALL {
            assert!(!role.structural_dependencies().contains(&role), "{role} depends on itself");
        }
    }

    #[test]
    fn test_only_coordinator_is_not_vertex() {
        let vertices = Role::ALL.iter().filter(|r| r.is_vertex()).count();
        assert_eq!(vertices, 8);
    }
}
