// File: testing-framework/src/nodes/coin.rs
//
// Coin node handles
//
// bitcoind and litecoind speak the same RPC dialect and differ only in
// binary name, directory prefix and minimum version, so both handles wrap
// one `CoinDaemon` and share the `CoinNode` trait's default operations.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::CoinKind;
use crate::config::HarnessConfig;
use crate::error::{HarnessError, Result};
use crate::orchestrator::{NodeProcess, ProcessSpec, RunResources};
use crate::rpc::{HttpRpcClient, RpcParams, RpcTransport};
use crate::waiters::{wait_until, WaitPolicy};

/// bitcoind: RPC still warming up
pub const RPC_IN_WARMUP: i64 = -28;

/// bitcoind: method not found
pub const RPC_METHOD_NOT_FOUND: i64 = -32601;

/// Convert a coin amount as reported over RPC to satoshis
pub fn btc_to_sats(amount: f64) -> i64 {
    (amount * 100_000_000.0).round() as i64
}

/// Convert satoshis to the coin amount RPCs expect
pub fn sats_to_btc(sats: i64) -> f64 {
    sats as f64 / 100_000_000.0
}

/// Operations on a regtest coin node
///
/// Every operation is a direct RPC pass-through; nothing here waits for
/// payment nodes to notice the effect.
#[async_trait]
pub trait CoinNode: Send + Sync {
    /// Which daemon this is
    fn kind(&self) -> CoinKind;

    /// Display name (`bcnode0`, ...)
    fn name(&self) -> &str;

    /// Data directory
    fn data_dir(&self) -> &Path;

    /// JSON-RPC port
    fn rpc_port(&self) -> u16;

    /// P2P port payment nodes connect to
    fn p2p_port(&self) -> u16;

    /// Underlying transport
    fn rpc(&self) -> &dyn RpcTransport;

    /// Stop the daemon, escalating to signals if `stop` is ignored
    async fn shutdown(&mut self) -> Result<()>;

    /// Log files worth dumping on failure
    fn log_files(&self) -> Vec<PathBuf> {
        vec![self.data_dir().join("regtest").join("debug.log")]
    }

    /// Raw call for methods without a typed wrapper
    async fn invoke(&self, method: &str, params: RpcParams) -> Result<Value> {
        self.rpc().call(method, params).await
    }

    /// Mine `blocks` blocks, returning their hashes
    ///
    /// Daemons that dropped `generate` get `generatetoaddress` to a fresh
    /// wallet address instead.
    async fn generate(&self, blocks: u64) -> Result<Vec<String>> {
        let result = self
            .invoke("generate", RpcParams::positional(vec![json!(blocks)]))
            .await;
        let hashes = match result {
            Ok(value) => value,
            Err(e) if e.remote_code() == Some(RPC_METHOD_NOT_FOUND) => {
                debug!("{}: generate unavailable, using generatetoaddress", self.name());
                let address = self.get_new_address().await?;
                self.invoke(
                    "generatetoaddress",
                    RpcParams::positional(vec![json!(blocks), json!(address)]),
                )
                .await?
            }
            Err(e) => return Err(e),
        };
        decode("generate", hashes)
    }

    /// Send `amount` coins to `address`, returning the txid
    async fn send_to_address(&self, address: &str, amount: f64) -> Result<String> {
        let txid = self
            .invoke(
                "sendtoaddress",
                RpcParams::positional(vec![json!(address), json!(amount)]),
            )
            .await?;
        decode("sendtoaddress", txid)
    }

    /// `getblockchaininfo` as returned by the daemon
    async fn get_blockchain_info(&self) -> Result<Value> {
        self.invoke("getblockchaininfo", RpcParams::None).await
    }

    /// `getnetworkinfo` as returned by the daemon
    async fn get_network_info(&self) -> Result<Value> {
        self.invoke("getnetworkinfo", RpcParams::None).await
    }

    /// Fresh wallet address
    async fn get_new_address(&self) -> Result<String> {
        let address = self.invoke("getnewaddress", RpcParams::None).await?;
        decode("getnewaddress", address)
    }

    /// Spendable wallet balance in coins
    async fn get_balance(&self) -> Result<f64> {
        let balance = self.invoke("getbalance", RpcParams::None).await?;
        decode("getbalance", balance)
    }

    /// Total received by `address` with at least one confirmation, in coins
    async fn get_received_by_address(&self, address: &str) -> Result<f64> {
        let received = self
            .invoke(
                "getreceivedbyaddress",
                RpcParams::positional(vec![json!(address)]),
            )
            .await?;
        decode("getreceivedbyaddress", received)
    }

    /// Current chain height
    async fn get_block_count(&self) -> Result<u64> {
        let count = self.invoke("getblockcount", RpcParams::None).await?;
        decode("getblockcount", count)
    }

    /// Hash of the block at `height`
    async fn get_block_hash(&self, height: u64) -> Result<String> {
        let hash = self
            .invoke("getblockhash", RpcParams::positional(vec![json!(height)]))
            .await?;
        decode("getblockhash", hash)
    }

    /// Mark a block invalid, rewinding the chain below it
    async fn invalidate_block(&self, hash: &str) -> Result<()> {
        self.invoke("invalidateblock", RpcParams::positional(vec![json!(hash)]))
            .await?;
        Ok(())
    }

    /// Number of transactions waiting in the mempool
    async fn get_mempool_size(&self) -> Result<u64> {
        let info = self.invoke("getmempoolinfo", RpcParams::None).await?;
        info.get("size").and_then(Value::as_u64).ok_or_else(|| {
            HarnessError::Protocol(format!("getmempoolinfo without size: {}", info))
        })
    }

    /// Ask the daemon to exit
    async fn stop(&self) -> Result<()> {
        self.invoke("stop", RpcParams::None).await?;
        Ok(())
    }
}

fn decode<T: DeserializeOwned>(method: &str, value: Value) -> Result<T> {
    serde_json::from_value(value)
        .map_err(|e| HarnessError::Protocol(format!("unexpected result shape for {}: {}", method, e)))
}

/// Classify one `getnetworkinfo` answer while a daemon starts
///
/// Warm-up replies and refused connections mean "not yet"; rejected
/// credentials and anything else the daemon says are final.
fn readiness(kind: CoinKind, answer: Result<Value>) -> Result<bool> {
    match answer {
        Ok(info) => {
            let found = info.get("version").and_then(Value::as_u64).unwrap_or(0);
            if found < kind.min_version() {
                return Err(HarnessError::VersionTooOld {
                    binary: kind.binary_name().to_string(),
                    found,
                    required: kind.min_version(),
                });
            }
            Ok(true)
        }
        Err(e) if e.remote_code() == Some(RPC_IN_WARMUP) => {
            debug!("{} warming up", kind.binary_name());
            Ok(false)
        }
        Err(e) if e.is_transport() => Ok(false),
        Err(e) => Err(e),
    }
}

/// Process and RPC state shared by both daemon kinds
struct CoinDaemon {
    kind: CoinKind,
    name: String,
    process: NodeProcess,
    rpc: HttpRpcClient,
    rpc_port: u16,
    p2p_port: u16,
    step_timeout: Duration,
}

impl CoinDaemon {
    async fn launch(
        kind: CoinKind,
        binary: PathBuf,
        config: &HarnessConfig,
        resources: &RunResources,
    ) -> Result<Self> {
        let data_dir = resources.workspace.node_dir(kind.short_name())?;
        let name = data_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| kind.short_name().to_string());
        let rpc_port = resources.ports.next_port()?;
        let p2p_port = resources.ports.next_port()?;

        let spec = ProcessSpec::new(name.clone(), binary, &data_dir).args([
            "-regtest".to_string(),
            format!("-datadir={}", data_dir.display()),
            format!("-rpcuser={}", config.rpc_user),
            format!("-rpcpassword={}", config.rpc_password),
            format!("-rpcport={}", rpc_port),
            format!("-port={}", p2p_port),
            "-logtimemicros".to_string(),
        ]);
        let process = resources.supervisor.start(&spec)?;
        let rpc = HttpRpcClient::coin_node(
            "127.0.0.1",
            rpc_port,
            &config.rpc_user,
            &config.rpc_password,
            config.rpc_timeout(),
        )?;

        let mut daemon = Self {
            kind,
            name,
            process,
            rpc,
            rpc_port,
            p2p_port,
            step_timeout: resources.supervisor.step_timeout(),
        };
        let policy = WaitPolicy::with_timeout(config.startup_timeout())
            .interval(config.poll_interval())
            .message(format!("{} never answered getnetworkinfo", daemon.name));
        daemon.wait_ready(&policy).await?;
        Ok(daemon)
    }

    /// Poll `getnetworkinfo` until the daemon answers with a usable version
    async fn wait_ready(&mut self, policy: &WaitPolicy) -> Result<()> {
        let kind = self.kind;
        let rpc = &self.rpc;
        let process = &mut self.process;

        wait_until(
            || {
                let alive = process.ensure_alive();
                async move {
                    alive?;
                    readiness(kind, rpc.call("getnetworkinfo", RpcParams::None).await)
                }
            },
            policy,
        )
        .await?;

        info!("{} started (rpc {}, p2p {})", self.name, self.rpc_port, self.p2p_port);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        let rpc = &self.rpc;
        let graceful = async move {
            rpc.call("stop", RpcParams::None).await?;
            Ok(())
        };
        self.process.stop(graceful, self.step_timeout).await?;
        Ok(())
    }
}

macro_rules! coin_node_handle {
    ($handle:ident, $kind:expr, $doc:literal) => {
        #[doc = $doc]
        pub struct $handle {
            daemon: CoinDaemon,
        }

        impl $handle {
            /// Spawn the daemon and wait until its RPC answers
            pub async fn start(config: &HarnessConfig, resources: &RunResources) -> Result<Self> {
                let binary = if config.coin == $kind {
                    config.coin_binary()
                } else {
                    PathBuf::from($kind.binary_name())
                };
                let daemon = CoinDaemon::launch($kind, binary, config, resources).await?;
                Ok(Self { daemon })
            }
        }

        #[async_trait]
        impl CoinNode for $handle {
            fn kind(&self) -> CoinKind {
                self.daemon.kind
            }

            fn name(&self) -> &str {
                &self.daemon.name
            }

            fn data_dir(&self) -> &Path {
                self.daemon.process.data_dir()
            }

            fn rpc_port(&self) -> u16 {
                self.daemon.rpc_port
            }

            fn p2p_port(&self) -> u16 {
                self.daemon.p2p_port
            }

            fn rpc(&self) -> &dyn RpcTransport {
                &self.daemon.rpc
            }

            async fn shutdown(&mut self) -> Result<()> {
                self.daemon.shutdown().await
            }
        }
    };
}

coin_node_handle!(BitcoinNode, CoinKind::Bitcoin, "A bitcoind regtest node");
coin_node_handle!(LitecoinNode, CoinKind::Litecoin, "A litecoind regtest node");

/// Start the coin node selected by `config.coin`
pub async fn spawn_coin_node(
    config: &HarnessConfig,
    resources: &RunResources,
) -> Result<Box<dyn CoinNode>> {
    Ok(match config.coin {
        CoinKind::Bitcoin => Box::new(BitcoinNode::start(config, resources).await?),
        CoinKind::Litecoin => Box::new(LitecoinNode::start(config, resources).await?),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    /// Scripted coin node answering from a queue of results
    struct ScriptedCoin {
        calls: Mutex<Vec<(String, RpcParams)>>,
        replies: Mutex<VecDeque<Result<Value>>>,
    }

    impl ScriptedCoin {
        fn new(replies: Vec<Result<Value>>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                replies: Mutex::new(replies.into()),
            }
        }
    }

    #[async_trait]
    impl RpcTransport for ScriptedCoin {
        async fn call(&self, method: &str, params: RpcParams) -> Result<Value> {
            self.calls.lock().push((method.to_string(), params));
            self.replies
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(HarnessError::Protocol("script exhausted".into())))
        }

        fn endpoint(&self) -> String {
            "scripted".to_string()
        }
    }

    #[async_trait]
    impl CoinNode for ScriptedCoin {
        fn kind(&self) -> CoinKind {
            CoinKind::Bitcoin
        }
        fn name(&self) -> &str {
            "bcnode0"
        }
        fn data_dir(&self) -> &Path {
            Path::new("/tmp/bcnode0")
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

    fn method_not_found() -> HarnessError {
        HarnessError::RemoteError {
            method: "generate".into(),
            code: Some(RPC_METHOD_NOT_FOUND),
            message: "Method not found".into(),
        }
    }

    #[tokio::test]
    async fn test_generate_falls_back_to_generatetoaddress() {
        let node = ScriptedCoin::new(vec![
            Err(method_not_found()),
            Ok(json!("bcrt1qxyz")),
            Ok(json!(["aa", "bb"])),
        ]);

        let hashes = node.generate(2).await.unwrap();
        assert_eq!(hashes, vec!["aa".to_string(), "bb".to_string()]);

        let calls = node.calls.lock();
        let methods: Vec<&str> = calls.iter().map(|(m, _)| m.as_str()).collect();
        assert_eq!(methods, vec!["generate", "getnewaddress", "generatetoaddress"]);
        assert_eq!(
            calls[2].1,
            RpcParams::Positional(vec![json!(2), json!("bcrt1qxyz")])
        );
    }

    #[tokio::test]
    async fn test_generate_other_errors_propagate() {
        let node = ScriptedCoin::new(vec![Err(HarnessError::RemoteError {
            method: "generate".into(),
            code: Some(-1),
            message: "boom".into(),
        })]);
        let err = node.generate(1).await.unwrap_err();
        assert_eq!(err.remote_code(), Some(-1));
    }

    #[tokio::test]
    async fn test_pass_through_decoding() {
        let node = ScriptedCoin::new(vec![
            Ok(json!(512)),
            Ok(json!({"size": 3, "bytes": 700})),
            Ok(json!("not a number")),
        ]);
        assert_eq!(node.get_block_count().await.unwrap(), 512);
        assert_eq!(node.get_mempool_size().await.unwrap(), 3);
        assert!(matches!(
            node.get_balance().await,
            Err(HarnessError::Protocol(_))
        ));
    }

    #[test]
    fn test_readiness_classification() {
        let kind = CoinKind::Bitcoin;
        assert!(readiness(kind, Ok(json!({"version": 210_000}))).unwrap());

        let warming = Err(HarnessError::RemoteError {
            method: "getnetworkinfo".into(),
            code: Some(RPC_IN_WARMUP),
            message: "Loading block index...".into(),
        });
        assert!(!readiness(kind, warming).unwrap());
        let refused = Err(HarnessError::transport("http://127.0.0.1:1/", "connection refused"));
        assert!(!readiness(kind, refused).unwrap());

        // wrong credentials never heal, so waiting on them is pointless
        let rejected = Err(HarnessError::Unauthorized {
            endpoint: "http://127.0.0.1:1/".into(),
            status: 401,
        });
        assert!(matches!(
            readiness(kind, rejected),
            Err(HarnessError::Unauthorized { status: 401, .. })
        ));
        assert!(matches!(
            readiness(kind, Ok(json!({"version": 130_000}))),
            Err(HarnessError::VersionTooOld { found: 130_000, .. })
        ));
    }

    #[test]
    fn test_amount_conversion() {
        assert_eq!(btc_to_sats(0.5), 50_000_000);
        assert_eq!(btc_to_sats(1.0), 100_000_000);
        assert_eq!(btc_to_sats(0.1 + 0.2), 30_000_000);
        assert_eq!(sats_to_btc(25_000_000), 0.25);
    }
}
