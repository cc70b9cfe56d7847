//! EnvironmentBuilder - fluent construction of `TestEnvironment`

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;

use super::{EnvironmentFactory, TestEnvironment};
use crate::config::HarnessConfig;
use crate::error::Result;
use crate::orchestrator::RunResources;

/// Builder for a single environment
///
/// # Example
///
/// ```rust,ignore
/// let env = TestEnvironment::builder(Arc::new(HarnessConfig::from_env()))
///     .lit_nodes(2)
///     .oracle(1, 11)
///     .build()
///     .await?;
/// ```
pub struct EnvironmentBuilder {
    config: Arc<HarnessConfig>,
    resources: Option<RunResources>,
    lit_nodes: usize,
    oracles: Vec<(u64, u64)>,
}

impl EnvironmentBuilder {
    /// Builder with one payment node and no oracles
    pub fn new(config: Arc<HarnessConfig>) -> Self {
        Self {
            config,
            resources: None,
            lit_nodes: 1,
            oracles: Vec::new(),
        }
    }

    /// Number of payment nodes started up front
    pub fn lit_nodes(mut self, count: usize) -> Self {
        self.lit_nodes = count;
        self
    }

    /// Share allocators with other environments of the same run
    ///
    /// Without this, the environment gets allocators of its own built from
    /// the configuration.
    pub fn resources(mut self, resources: RunResources) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Also start an oracle publishing `value` every `interval` seconds
    pub fn oracle(mut self, interval: u64, value: u64) -> Self {
        self.oracles.push((interval, value));
        self
    }

    /// Start every node and wait for sync
    ///
    /// # Errors
    ///
    /// Returns the first failure of any node to start or sync; nodes that
    /// had already started are torn down first.
    pub async fn build(self) -> Result<TestEnvironment> {
        self.config.validate()?;
        let resources = match self.resources {
            Some(resources) => resources,
            None => RunResources::from_config(&self.config)?,
        };

        let mut env = TestEnvironment::new(self.config, resources, self.lit_nodes).await?;
        for (interval, value) in self.oracles {
            if let Err(e) = env.new_oracle(interval, value).await {
                super::shutdown_after_failure(&mut env, "oracle start").await;
                return Err(e);
            }
        }
        Ok(env)
    }
}

/// Factory handing the runner one fresh `TestEnvironment` per scenario
#[derive(Clone)]
pub struct LitEnvironmentFactory {
    config: Arc<HarnessConfig>,
    resources: RunResources,
}

impl LitEnvironmentFactory {
    /// Factory sharing `resources` across every environment it creates
    pub fn new(config: Arc<HarnessConfig>, resources: RunResources) -> Self {
        Self { config, resources }
    }

    /// Shared run resources
    pub fn resources(&self) -> &RunResources {
        &self.resources
    }
}

#[async_trait]
impl EnvironmentFactory for LitEnvironmentFactory {
    type Env = TestEnvironment;

    async fn create(&self, node_count: usize) -> Result<TestEnvironment> {
        EnvironmentBuilder::new(self.config.clone())
            .resources(self.resources.clone())
            .lit_nodes(node_count)
            .build()
            .await
    }

    fn workspace_root(&self) -> Option<PathBuf> {
        Some(self.resources.workspace.root().to_path_buf())
    }

    fn clean_workspace(&self) -> Result<()> {
        if self.resources.workspace.is_kept() {
            return Ok(());
        }
        self.resources.workspace.clean()
    }

    fn keep_workspace(&self) {
        self.resources.workspace.keep();
    }
}
