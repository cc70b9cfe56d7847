// File: testing-framework/src/environment/mod.rs
//
// Test environment
//
// One coin node plus N payment nodes (and, for contract scenarios, oracles)
// wired together and synced to the same height. `generate_block` is the only
// cross-node ordering primitive: it mines, then waits until every payment
// node reports the coin node's new height.

/// Fluent construction and the runner-facing factory
pub mod builder;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use log::{debug, info, warn};

pub use builder::{EnvironmentBuilder, LitEnvironmentFactory};

use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::nodes::{spawn_coin_node, CoinNode, LitNode, LitNodeOptions, OracleNode};
use crate::orchestrator::RunResources;
use crate::waiters::{wait_until, WaitPolicy};

/// What the scenario runner needs from an environment
#[async_trait]
pub trait ScenarioEnvironment: Send {
    /// Tear down every owned node; must be safe to call more than once
    async fn shutdown(&mut self) -> Result<()>;

    /// Node log files to dump on failure
    fn log_files(&self) -> Vec<PathBuf>;

    /// Working directories of every node
    fn node_dirs(&self) -> Vec<PathBuf>;
}

/// Creates one fresh environment per scenario
#[async_trait]
pub trait EnvironmentFactory: Send + Sync {
    /// Environment type handed to scenarios
    type Env: ScenarioEnvironment;

    /// Build an environment with `node_count` payment nodes
    async fn create(&self, node_count: usize) -> Result<Self::Env>;

    /// Run root, for artifacts and diagnostics
    fn workspace_root(&self) -> Option<PathBuf> {
        None
    }

    /// Remove node directories left behind by a passing scenario
    fn clean_workspace(&self) -> Result<()> {
        Ok(())
    }

    /// Keep the run root on disk after the run
    fn keep_workspace(&self) {}
}

/// A synced cluster of external nodes
pub struct TestEnvironment {
    config: Arc<HarnessConfig>,
    resources: RunResources,
    coin: Box<dyn CoinNode>,
    lits: Vec<LitNode>,
    oracles: Vec<OracleNode>,
}

impl TestEnvironment {
    /// Fluent builder
    pub fn builder(config: Arc<HarnessConfig>) -> EnvironmentBuilder {
        EnvironmentBuilder::new(config)
    }

    /// Start a coin node, activate segwit, start `lit_count` payment nodes
    /// and wait until all of them are synced
    ///
    /// Nodes started before a failure are torn down before the error is
    /// returned.
    pub async fn new(
        config: Arc<HarnessConfig>,
        resources: RunResources,
        lit_count: usize,
    ) -> Result<Self> {
        let coin = spawn_coin_node(&config, &resources).await?;
        let mut env = Self {
            config,
            resources,
            coin,
            lits: Vec::with_capacity(lit_count),
            oracles: Vec::new(),
        };

        if let Err(e) = env.bootstrap(lit_count).await {
            shutdown_after_failure(&mut env, "setup").await;
            return Err(e);
        }
        Ok(env)
    }

    /// Environment over nodes that are already running
    ///
    /// Nothing is mined and nothing waits for sync; the caller owns the
    /// state of the nodes handed in.
    pub fn from_parts(
        config: Arc<HarnessConfig>,
        resources: RunResources,
        coin: Box<dyn CoinNode>,
        lits: Vec<LitNode>,
    ) -> Self {
        Self {
            config,
            resources,
            coin,
            lits,
            oracles: Vec::new(),
        }
    }

    async fn bootstrap(&mut self, lit_count: usize) -> Result<()> {
        let activation = self.config.segwit_activation_blocks;
        info!("Mining {} blocks to activate segwit", activation);
        self.coin.generate(activation).await?;

        for _ in 0..lit_count {
            self.spawn_lit().await?;
        }
        self.generate_block(0).await?;
        info!(
            "Environment ready: {} with {} payment node(s) at height {}",
            self.coin.name(),
            self.lits.len(),
            self.get_height().await?
        );
        Ok(())
    }

    async fn spawn_lit(&mut self) -> Result<usize> {
        let index = u32::try_from(self.lits.len())
            .map_err(|_| HarnessError::Config("too many payment nodes".to_string()))?;
        let options = LitNodeOptions::from_config(&self.config, index, self.coin.p2p_port());
        let node = LitNode::spawn(options, &self.resources).await?;
        self.lits.push(node);
        Ok(self.lits.len() - 1)
    }

    /// Mine `count` blocks and wait until every payment node has synced
    ///
    /// `count == 0` mines nothing and only waits, which returns on the
    /// first poll when the environment is already synced.
    pub async fn generate_block(&self, count: u64) -> Result<u64> {
        if count > 0 {
            debug!("Generating {} block(s)", count);
            self.coin.generate(count).await?;
        }
        let height = self.get_height().await?;
        try_join_all(self.lits.iter().map(|lit| lit.resync(height))).await?;
        debug!("All payment nodes synced to {}", height);
        Ok(height)
    }

    /// Add a payment node to the running environment and sync it
    pub async fn new_lit_node(&mut self) -> Result<usize> {
        let idx = self.spawn_lit().await?;
        self.generate_block(0).await?;
        Ok(idx)
    }

    /// Start an oracle publishing `value` every `interval` seconds
    pub async fn new_oracle(&mut self, interval: u64, value: u64) -> Result<usize> {
        let oracle = OracleNode::start(&self.config, &self.resources, interval, value).await?;
        self.oracles.push(oracle);
        Ok(self.oracles.len() - 1)
    }

    /// Stop payment node `idx` and start it again with the same identity
    pub async fn restart_lit(&mut self, idx: usize) -> Result<()> {
        let height = self.get_height().await?;
        let lit = self.lit_mut(idx)?;
        lit.shutdown().await?;
        lit.start().await?;
        lit.resync(height).await
    }

    /// Wait until payment node `idx` has caught up with the coin node
    pub async fn resync_lit(&self, idx: usize) -> Result<()> {
        let height = self.get_height().await?;
        self.lit(idx)?.resync(height).await
    }

    /// Wait until the mempool holds at least `count` transactions
    pub async fn wait_for_mempool(&self, count: u64) -> Result<()> {
        let policy = WaitPolicy::with_timeout(self.config.sync_timeout())
            .interval(self.config.poll_interval())
            .message(format!("mempool never reached {} transaction(s)", count));
        let coin = self.coin.as_ref();
        wait_until(
            || async move { Ok(coin.get_mempool_size().await? >= count) },
            &policy,
        )
        .await
    }

    /// Coin node height
    pub async fn get_height(&self) -> Result<u64> {
        self.coin.get_block_count().await
    }

    /// The coin node
    pub fn coin(&self) -> &dyn CoinNode {
        self.coin.as_ref()
    }

    /// Payment nodes in start order
    pub fn lits(&self) -> &[LitNode] {
        &self.lits
    }

    /// Payment node `idx`
    pub fn lit(&self, idx: usize) -> Result<&LitNode> {
        let count = self.lits.len();
        self.lits
            .get(idx)
            .ok_or_else(|| out_of_range("payment node", idx, count))
    }

    /// Payment node `idx`, mutably (restart)
    pub fn lit_mut(&mut self, idx: usize) -> Result<&mut LitNode> {
        let count = self.lits.len();
        self.lits
            .get_mut(idx)
            .ok_or_else(|| out_of_range("payment node", idx, count))
    }

    /// Oracles in start order
    pub fn oracles(&self) -> &[OracleNode] {
        &self.oracles
    }

    /// Oracle `idx`
    pub fn oracle(&self, idx: usize) -> Result<&OracleNode> {
        let count = self.oracles.len();
        self.oracles
            .get(idx)
            .ok_or_else(|| out_of_range("oracle", idx, count))
    }

    /// Harness configuration
    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Coin type of the payment nodes' chain
    pub fn coin_type(&self) -> u32 {
        self.config.coin.coin_type()
    }

    /// Run root
    pub fn workspace_root(&self) -> &Path {
        self.resources.workspace.root()
    }
}

/// Tear `env` down after `stage` failed; the stage's error wins, so a
/// teardown error is only logged
pub(crate) async fn shutdown_after_failure<E: ScenarioEnvironment>(env: &mut E, stage: &str) {
    if let Err(teardown) = env.shutdown().await {
        warn!("Teardown after failed {} also failed: {}", stage, teardown);
    }
}

fn out_of_range(what: &str, idx: usize, count: usize) -> HarnessError {
    HarnessError::InvalidInvocation(format!(
        "{} {} requested but the environment has {}",
        what, idx, count
    ))
}

#[async_trait]
impl ScenarioEnvironment for TestEnvironment {
    /// Payment nodes first, then oracles, then the coin node they depend on
    async fn shutdown(&mut self) -> Result<()> {
        let mut first_error = None;

        for lit in self.lits.iter_mut() {
            if let Err(e) = lit.shutdown().await {
                warn!("Failed to stop {}: {}", lit.name(), e);
                first_error.get_or_insert(e);
            }
        }
        for oracle in self.oracles.iter_mut() {
            if let Err(e) = oracle.shutdown().await {
                warn!("Failed to stop {}: {}", oracle.name(), e);
                first_error.get_or_insert(e);
            }
        }
        if let Err(e) = self.coin.shutdown().await {
            warn!("Failed to stop {}: {}", self.coin.name(), e);
            first_error.get_or_insert(e);
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    fn log_files(&self) -> Vec<PathBuf> {
        let mut files = self.coin.log_files();
        files.extend(self.lits.iter().flat_map(|lit| lit.log_files()));
        files
    }

    fn node_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = vec![self.coin.data_dir().to_path_buf()];
        dirs.extend(self.lits.iter().map(|lit| lit.data_dir().to_path_buf()));
        dirs.extend(self.oracles.iter().map(|o| o.data_dir().to_path_buf()));
        dirs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Environment whose teardown always fails
    #[derive(Default)]
    struct StuckEnv {
        shutdowns: usize,
    }

    #[async_trait]
    impl ScenarioEnvironment for StuckEnv {
        async fn shutdown(&mut self) -> Result<()> {
            self.shutdowns += 1;
            Err(HarnessError::ProcessExited {
                name: "bcnode0".to_string(),
                status: "signal: 9".to_string(),
            })
        }

        fn log_files(&self) -> Vec<PathBuf> {
            Vec::new()
        }

        fn node_dirs(&self) -> Vec<PathBuf> {
            Vec::new()
        }
    }

    #[tokio::test]
    async fn test_failed_teardown_is_logged_not_returned() {
        let mut env = StuckEnv::default();
        shutdown_after_failure(&mut env, "oracle start").await;
        shutdown_after_failure(&mut env, "setup").await;
        assert_eq!(env.shutdowns, 2);
    }
}
