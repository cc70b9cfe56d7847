// File: testing-framework/src/orchestrator/mod.rs
//
// Orchestrator Module
//
// Resource ownership for a test run: ports, working directories and the
// external node processes. These are explicit objects handed to each
// environment instead of process-wide counters, so several environments can
// live in one process without racing.

/// Loopback port allocation
pub mod ports;
/// External process lifecycle (spawn, seed files, stop escalation)
pub mod supervisor;
/// Per-node working directories under a run root
pub mod workspace;

use std::sync::Arc;

pub use ports::PortAllocator;
pub use supervisor::{resolve_binary, NodeProcess, ProcessSpec, ProcessSupervisor};
pub use workspace::WorkspaceAllocator;

use crate::config::HarnessConfig;
use crate::error::Result;

/// Shared run-level resources
///
/// Cloning is cheap; every environment of a run holds the same allocators so
/// directory sequence numbers and ports keep increasing across scenarios.
#[derive(Debug, Clone)]
pub struct RunResources {
    /// Port allocator shared by all environments
    pub ports: Arc<PortAllocator>,
    /// Directory allocator shared by all environments
    pub workspace: Arc<WorkspaceAllocator>,
    /// Process launcher
    pub supervisor: ProcessSupervisor,
}

impl RunResources {
    /// Build allocators from configuration
    pub fn from_config(config: &HarnessConfig) -> Result<Self> {
        let ports = match config.base_port {
            Some(base) => PortAllocator::new(base),
            None => PortAllocator::random(),
        };
        let workspace = WorkspaceAllocator::new(config.tmp_root.as_deref())?;
        if config.keep_tmp {
            workspace.keep();
        }
        Ok(Self {
            ports: Arc::new(ports),
            workspace: Arc::new(workspace),
            supervisor: ProcessSupervisor::new(config.show_output, config.stop_step_timeout()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resources_follow_config() {
        let parent = tempfile::tempdir().unwrap();
        let config = HarnessConfig {
            tmp_root: Some(parent.path().to_path_buf()),
            base_port: Some(24_500),
            keep_tmp: true,
            ..HarnessConfig::default()
        };

        let resources = RunResources::from_config(&config).unwrap();
        assert!(resources.workspace.root().starts_with(parent.path()));
        assert!(resources.workspace.is_kept());
        assert!(resources.ports.next_port().unwrap() >= 24_500);

        let shared = resources.clone();
        let a = resources.workspace.node_dir("lit").unwrap();
        let b = shared.workspace.node_dir("lit").unwrap();
        assert_ne!(a, b);
    }
}
