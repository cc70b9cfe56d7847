// Integration tests for the environment's sync barrier
// Coin and payment nodes are in-process fakes sharing one chain height, and
// time is paused, so every wait is measured in virtual time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::time::Instant;

use lit_testing_framework::config::HarnessConfig;
use lit_testing_framework::environment::ScenarioEnvironment;
use lit_testing_framework::nodes::coin::RPC_METHOD_NOT_FOUND;
use lit_testing_framework::nodes::{CoinKind, CoinNode, LitNode, LitNodeOptions};
use lit_testing_framework::orchestrator::RunResources;
use lit_testing_framework::rpc::{RpcParams, RpcTransport};
use lit_testing_framework::{HarnessError, Result, TestEnvironment};

const START_HEIGHT: u64 = 500;

/// Coin node mining onto a shared height
struct FakeCoin {
    chain: Arc<AtomicU64>,
    data_dir: PathBuf,
}

#[async_trait]
impl RpcTransport for FakeCoin {
    async fn call(&self, method: &str, params: RpcParams) -> Result<Value> {
        match (method, params) {
            ("getblockcount", _) => Ok(json!(self.chain.load(Ordering::SeqCst))),
            ("generate", RpcParams::Positional(args)) => {
                let count = args.first().and_then(Value::as_u64).unwrap_or(0);
                let top = self.chain.fetch_add(count, Ordering::SeqCst) + count;
                let hashes: Vec<String> = (top - count + 1..=top).map(|h| format!("{:064x}", h)).collect();
                Ok(json!(hashes))
            }
            (other, _) => Err(HarnessError::RemoteError {
                method: other.to_string(),
                code: Some(RPC_METHOD_NOT_FOUND),
                message: "Method not found".to_string(),
            }),
        }
    }

    fn endpoint(&self) -> String {
        "fake-coin".to_string()
    }
}

#[async_trait]
impl CoinNode for FakeCoin {
    fn kind(&self) -> CoinKind {
        CoinKind::Bitcoin
    }

    fn name(&self) -> &str {
        "bcnode0"
    }

    fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn rpc_port(&self) -> u16 {
        0
    }

    fn p2p_port(&self) -> u16 {
        0
    }

    fn rpc(&self) -> &dyn RpcTransport {
        self
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Payment node catching up one block per `Balance` poll
struct LaggingLit {
    chain: Arc<AtomicU64>,
    synced: AtomicU64,
    polls: Arc<AtomicUsize>,
}

#[async_trait]
impl RpcTransport for LaggingLit {
    async fn call(&self, method: &str, _params: RpcParams) -> Result<Value> {
        if method != "Balance" {
            return Err(HarnessError::Protocol(format!("unexpected call {}", method)));
        }
        self.polls.fetch_add(1, Ordering::SeqCst);
        let tip = self.chain.load(Ordering::SeqCst);
        let synced = self.synced.load(Ordering::SeqCst);
        let height = if synced < tip { synced + 1 } else { synced };
        self.synced.store(height, Ordering::SeqCst);
        Ok(json!({"Balances": [{
            "CoinType": 257,
            "SyncHeight": height,
            "ChanTotal": 0,
            "TxoTotal": 0,
            "MatureWitty": 0,
            "FeeRate": 80
        }]}))
    }

    fn endpoint(&self) -> String {
        "lagging-lit".to_string()
    }
}

struct Fixture {
    env: TestEnvironment,
    polls: Vec<Arc<AtomicUsize>>,
    poll_interval: Duration,
    _dir: tempfile::TempDir,
}

fn fixture(lit_count: u32) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let config = Arc::new(HarnessConfig {
        tmp_root: Some(dir.path().to_path_buf()),
        base_port: Some(26_000),
        poll_interval_ms: 250,
        sync_timeout_secs: 10,
        ..HarnessConfig::default()
    });
    let resources = RunResources::from_config(&config).unwrap();
    let chain = Arc::new(AtomicU64::new(START_HEIGHT));

    let coin = FakeCoin {
        chain: chain.clone(),
        data_dir: dir.path().join("bcnode0"),
    };
    let mut polls = Vec::new();
    let lits: Vec<LitNode> = (0..lit_count)
        .map(|index| {
            let counter = Arc::new(AtomicUsize::new(0));
            polls.push(counter.clone());
            let rpc = LaggingLit {
                chain: chain.clone(),
                synced: AtomicU64::new(START_HEIGHT),
                polls: counter,
            };
            LitNode::attach(
                LitNodeOptions::from_config(&config, index, 0),
                dir.path().join(format!("lit{}", index)),
                Box::new(rpc),
            )
        })
        .collect();

    Fixture {
        env: TestEnvironment::from_parts(config.clone(), resources, Box::new(coin), lits),
        polls,
        poll_interval: config.poll_interval(),
        _dir: dir,
    }
}

#[tokio::test(start_paused = true)]
async fn test_generate_zero_on_synced_environment_polls_once() {
    let fixture = fixture(2);
    let start = Instant::now();

    let height = fixture.env.generate_block(0).await.unwrap();

    assert_eq!(height, START_HEIGHT);
    assert_eq!(start.elapsed(), Duration::ZERO);
    for polls in &fixture.polls {
        assert_eq!(polls.load(Ordering::SeqCst), 1);
    }
}

#[tokio::test(start_paused = true)]
async fn test_generate_waits_for_every_lit_to_catch_up() {
    let fixture = fixture(2);
    let start = Instant::now();

    let height = fixture.env.generate_block(3).await.unwrap();

    assert_eq!(height, START_HEIGHT + 3);
    assert_eq!(fixture.env.get_height().await.unwrap(), START_HEIGHT + 3);
    // one block per poll: three polls, two intervals apart
    assert_eq!(start.elapsed(), fixture.poll_interval * 2);
    for polls in &fixture.polls {
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }
    assert_eq!(fixture.env.lit(1).unwrap().get_sync_height().await.unwrap(), 503);
}

#[tokio::test(start_paused = true)]
async fn test_attached_environment_shuts_down_without_processes() {
    let mut fixture = fixture(1);
    fixture.env.shutdown().await.unwrap();
    assert!(fixture.env.lit(0).unwrap().invoke("Balance", RpcParams::None).await.is_err());
    assert_eq!(fixture.env.node_dirs().len(), 2);
}
