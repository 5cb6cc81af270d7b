//! Topology manager configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use crate::domain::{DependencyPolicy, Role};

/// Topology manager configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Role given to ad hoc nodes whose requested type is not a known role
    #[serde(rename = "default-role")]
    pub default_role: Role,

    /// Upper bound on nodes held by the manager (fixed nine included)
    #[serde(rename = "max-nodes")]
    pub max_nodes: usize,

    /// Channel buffer size for manager commands
    #[serde(rename = "command-buffer")]
    pub command_buffer: usize,

    /// Task queue settings
    pub queue: QueueConfig,

    /// Dependency monitor settings
    pub dependencies: DependencyConfig,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        debug!("TopologyConfig::default: called");
        Self {
            default_role: Role::Coordinator,
            max_nodes: 64,
            command_buffer: 256,
            queue: QueueConfig::default(),
            dependencies: DependencyConfig::default(),
        }
    }
}

/// Task queue configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Bounded capacity; absent means unbounded
    pub capacity: Option<usize>,

    /// Pause between consumed items, in milliseconds (0 = just yield)
    #[serde(rename = "pacing-ms")]
    pub pacing_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: None,
            pacing_ms: 100,
        }
    }
}

impl QueueConfig {
    pub fn pacing(&self) -> Duration {
        Duration::from_millis(self.pacing_ms)
    }
}

/// Where the dependency monitor takes its sweep interval from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntervalSource {
    /// Dependency cache TTL (seconds)
    CacheTtl,
    /// Mesh synchronization interval (milliseconds)
    MeshSync,
    /// Explicit interval (milliseconds)
    Fixed,
}

/// Dependency monitor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DependencyConfig {
    #[serde(rename = "interval-source")]
    pub interval_source: IntervalSource,

    #[serde(rename = "cache-ttl-secs", default = "default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,

    #[serde(rename = "mesh-sync-interval-ms", default = "default_mesh_sync_interval_ms")]
    pub mesh_sync_interval_ms: u64,

    #[serde(rename = "fixed-interval-ms", default = "default_fixed_interval_ms")]
    pub fixed_interval_ms: u64,

    /// Follow dependencies of dependencies
    #[serde(rename = "auto-resolve")]
    pub auto_resolve: bool,

    /// Max hops followed when auto-resolving
    #[serde(rename = "max-depth")]
    pub max_depth: usize,
}

fn default_cache_ttl_secs() -> u64 {
    debug!("default_cache_ttl_secs: called");
    3600
}

fn default_mesh_sync_interval_ms() -> u64 {
    debug!("default_mesh_sync_interval_ms: called");
    5000
}

fn default_fixed_interval_ms() -> u64 {
    debug!("default_fixed_interval_ms: called");
    60_000
}

impl Default for DependencyConfig {
    fn default() -> Self {
        Self {
            interval_source: IntervalSource::CacheTtl,
            cache_ttl_secs: default_cache_ttl_secs(),
            mesh_sync_interval_ms: default_mesh_sync_interval_ms(),
            fixed_interval_ms: default_fixed_interval_ms(),
            auto_resolve: true,
            max_depth: 5,
        }
    }
}

impl DependencyConfig {
    /// Sweep interval for the configured source, never shorter than 1ms
    pub fn interval(&self) -> Duration {
        debug!(source = ?self.interval_source, "DependencyConfig::interval: called");
        let interval = match self.interval_source {
            IntervalSource::CacheTtl => Duration::from_secs(self.cache_ttl_secs),
            IntervalSource::MeshSync => Duration::from_millis(self.mesh_sync_interval_ms),
            IntervalSource::Fixed => Duration::from_millis(self.fixed_interval_ms),
        };
        interval.max(Duration::from_millis(1))
    }

    pub fn policy(&self) -> DependencyPolicy {
        DependencyPolicy {
            auto_resolve: self.auto_resolve,
            max_depth: self.max_depth,
        }
    }
}
