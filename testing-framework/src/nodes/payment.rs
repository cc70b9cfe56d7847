// File: testing-framework/src/nodes/payment.rs
//
// Payment node handle
//
// A `LitNode` owns one lit process, its RPC transport and the mapping from
// remote lightning addresses to the local peer indices lit assigned them.
// The process can be stopped and started again with the same directory,
// key and ports, which is what the reconnect scenarios rely on.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use log::{debug, info};
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};

use super::types::*;
use super::CoinKind;
use crate::config::{HarnessConfig, LitTransport};
use crate::error::{HarnessError, Result};
use crate::orchestrator::{NodeProcess, ProcessSpec, ProcessSupervisor, RunResources};
use crate::rpc::{call_typed, HttpRpcClient, RpcParams, RpcTransport, WebSocketRpcClient};
use crate::waiters::{wait_until, wait_until_port_open, WaitPolicy};

/// Host every node binds to
pub const LOCALHOST: &str = "127.0.0.1";

/// Contents of `privkey.hex` for the node with environment index `index`
pub fn privkey_seed(index: u32) -> Result<String> {
    if index > 0xff {
        return Err(HarnessError::Config(format!(
            "at most 256 payment nodes per environment, got index {}",
            index
        )));
    }
    Ok(format!("{}{:02x}\n", "1".repeat(62), index))
}

/// Lightning address to local peer index
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerMapping {
    by_address: HashMap<String, u32>,
}

impl PeerMapping {
    /// Mapping as reported by `ListConnections`
    pub fn from_connections(reply: &ListConnectionsReply) -> Self {
        let by_address = reply
            .connections
            .iter()
            .filter(|peer| !peer.lit_adr.is_empty())
            .map(|peer| (peer.lit_adr.clone(), peer.peer_number))
            .collect();
        Self { by_address }
    }

    /// Peer index assigned to `address`
    pub fn get(&self, address: &str) -> Option<u32> {
        self.by_address.get(address).copied()
    }

    /// Whether `address` is connected
    pub fn contains(&self, address: &str) -> bool {
        self.by_address.contains_key(address)
    }

    /// Number of connected peers
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    /// No peers connected
    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }
}

/// Static parameters of a payment node
#[derive(Debug, Clone)]
pub struct LitNodeOptions {
    /// Index within the environment, selects the key seed
    pub index: u32,
    /// lit binary
    pub binary: PathBuf,
    /// Coin the node tracks
    pub coin: CoinKind,
    /// Coin node P2P port
    pub coin_p2p_port: u16,
    /// RPC transport kind
    pub transport: LitTransport,
    /// Per-call RPC timeout
    pub rpc_timeout: Duration,
    /// Budget for the RPC port to open after spawning
    pub startup_timeout: Duration,
    /// Budget for sync and peer waits
    pub sync_timeout: Duration,
    /// Polling interval
    pub poll_interval: Duration,
}

impl LitNodeOptions {
    /// Options for node `index` of an environment built from `config`
    pub fn from_config(config: &HarnessConfig, index: u32, coin_p2p_port: u16) -> Self {
        Self {
            index,
            binary: config.lit_bin.clone(),
            coin: config.coin,
            coin_p2p_port,
            transport: config.lit_transport,
            rpc_timeout: config.rpc_timeout(),
            startup_timeout: config.startup_timeout(),
            sync_timeout: config.sync_timeout(),
            poll_interval: config.poll_interval(),
        }
    }

    fn sync_policy(&self, message: String) -> WaitPolicy {
        WaitPolicy::with_timeout(self.sync_timeout)
            .interval(self.poll_interval)
            .message(message)
    }
}

/// A lit node driven over RPC
pub struct LitNode {
    name: String,
    data_dir: PathBuf,
    rpc_port: u16,
    p2p_port: u16,
    options: LitNodeOptions,
    supervisor: ProcessSupervisor,
    process: Option<NodeProcess>,
    rpc: Option<Box<dyn RpcTransport>>,
    lit_adr: Option<String>,
    peers: Mutex<PeerMapping>,
}

impl LitNode {
    /// Allocate directory and ports, then start the node
    pub async fn spawn(options: LitNodeOptions, resources: &RunResources) -> Result<Self> {
        let data_dir = resources.workspace.node_dir("lit")?;
        let name = data_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("lit{}", options.index));
        let rpc_port = resources.ports.next_port()?;
        let p2p_port = resources.ports.next_port()?;

        let mut node = Self {
            name,
            data_dir,
            rpc_port,
            p2p_port,
            options,
            supervisor: resources.supervisor.clone(),
            process: None,
            rpc: None,
            lit_adr: None,
            peers: Mutex::new(PeerMapping::default()),
        };
        node.start().await?;
        Ok(node)
    }

    /// Handle over an already-open transport, with no process behind it
    ///
    /// The node has no lightning address until [`LitNode::listen`] succeeds.
    /// Shutting it down only closes the transport.
    pub fn attach(options: LitNodeOptions, data_dir: PathBuf, rpc: Box<dyn RpcTransport>) -> Self {
        Self {
            name: format!("lit{}", options.index),
            data_dir,
            rpc_port: 0,
            p2p_port: 0,
            supervisor: ProcessSupervisor::new(false, options.startup_timeout),
            options,
            process: None,
            rpc: Some(rpc),
            lit_adr: None,
            peers: Mutex::new(PeerMapping::default()),
        }
    }

    fn process_spec(&self) -> Result<ProcessSpec> {
        Ok(
            ProcessSpec::new(self.name.clone(), &self.options.binary, &self.data_dir)
                .seed_file("privkey.hex", privkey_seed(self.options.index)?)
                .args(launch_args(
                    &self.data_dir,
                    self.rpc_port,
                    self.p2p_port,
                    self.options.coin,
                    self.options.coin_p2p_port,
                )),
        )
    }

    /// Spawn the process, open the RPC transport and start listening
    ///
    /// Reuses directory, key and ports, so a restarted node keeps its identity.
    pub async fn start(&mut self) -> Result<()> {
        if self.process.is_some() {
            return Err(HarnessError::InvalidInvocation(format!(
                "{} is already running",
                self.name
            )));
        }

        let spec = self.process_spec()?;
        self.process = Some(self.supervisor.start(&spec)?);

        let policy = WaitPolicy::with_timeout(self.options.startup_timeout)
            .interval(self.options.poll_interval)
            .message(format!("{} never opened rpc port {}", self.name, self.rpc_port));
        wait_until_port_open(LOCALHOST, self.rpc_port, &policy).await?;
        if let Some(process) = self.process.as_mut() {
            process.ensure_alive()?;
        }

        self.rpc = Some(self.open_transport().await?);
        let adr = self.listen(self.p2p_port).await?;
        info!(
            "{} started as {} (rpc {}, p2p {})",
            self.name, adr, self.rpc_port, self.p2p_port
        );
        Ok(())
    }

    async fn open_transport(&self) -> Result<Box<dyn RpcTransport>> {
        Ok(match self.options.transport {
            LitTransport::WebSocket => Box::new(
                WebSocketRpcClient::lit(LOCALHOST, self.rpc_port, self.options.rpc_timeout).await?,
            ),
            LitTransport::OneOff => Box::new(HttpRpcClient::lit_oneoff(
                LOCALHOST,
                self.rpc_port,
                self.options.rpc_timeout,
            )?),
        })
    }

    /// Stop the process and drop the transport
    ///
    /// Directory, ports and identity are kept for a later `start`.
    pub async fn shutdown(&mut self) -> Result<()> {
        let rpc = self.rpc.take();
        if let Some(mut process) = self.process.take() {
            let graceful = async {
                match &rpc {
                    Some(rpc) => rpc.call("Stop", RpcParams::None).await.map(|_| ()),
                    None => Err(HarnessError::transport(&self.name, "no rpc connection")),
                }
            };
            process.stop(graceful, self.supervisor.step_timeout()).await?;
        }
        if let Some(rpc) = rpc {
            rpc.close().await;
        }
        self.peers.lock().by_address.clear();
        Ok(())
    }

    /// Whether the process is running
    pub fn is_running(&mut self) -> bool {
        self.process.as_mut().is_some_and(|p| p.is_alive())
    }

    /// Display name (`lit0`, ...)
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Index within the environment
    pub fn index(&self) -> u32 {
        self.options.index
    }

    /// Data directory
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// RPC port
    pub fn rpc_port(&self) -> u16 {
        self.rpc_port
    }

    /// P2P port
    pub fn p2p_port(&self) -> u16 {
        self.p2p_port
    }

    /// Coin type of the coin node this node tracks
    pub fn coin_type(&self) -> u32 {
        self.options.coin.coin_type()
    }

    /// Log files worth dumping on failure
    pub fn log_files(&self) -> Vec<PathBuf> {
        vec![self.data_dir.join("lit.log")]
    }

    /// Lightning address, known once the node listens
    pub fn lit_adr(&self) -> Result<&str> {
        self.lit_adr
            .as_deref()
            .ok_or_else(|| HarnessError::InvalidInvocation(format!("{} is not listening", self.name)))
    }

    /// `adr@host:port` other nodes connect to
    pub fn ln_address(&self) -> Result<String> {
        Ok(format!("{}@{}:{}", self.lit_adr()?, LOCALHOST, self.p2p_port))
    }

    fn rpc(&self) -> Result<&dyn RpcTransport> {
        self.rpc
            .as_deref()
            .ok_or_else(|| HarnessError::transport(&self.name, "node is not running"))
    }

    /// Raw call for methods without a typed wrapper
    pub async fn invoke(&self, method: &str, params: RpcParams) -> Result<Value> {
        self.rpc()?.call(method, params).await
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, params: Value) -> Result<T> {
        call_typed(self.rpc()?, method, RpcParams::named(params)?).await
    }

    async fn call_success(&self, method: &str, params: Value) -> Result<()> {
        let reply: SuccessReply = self.call(method, params).await?;
        if reply.success {
            Ok(())
        } else {
            Err(HarnessError::RemoteError {
                method: method.to_string(),
                code: None,
                message: "node reported Success: false".to_string(),
            })
        }
    }

    /// Bind a P2P listener on `port` and return the node's lightning address
    ///
    /// Nodes launched with `--autoListenPort` may already listen there, in
    /// which case the existing listener is reported instead.
    pub async fn listen(&mut self, port: u16) -> Result<String> {
        let reply: ListeningPortsReply = match self
            .call("Listen", json!({ "Port": format!(":{}", port) }))
            .await
        {
            Ok(reply) => reply,
            Err(HarnessError::RemoteError { message, .. }) => {
                debug!("{}: Listen refused ({}), asking for listeners", self.name, message);
                self.call("GetListeningPorts", json!({})).await?
            }
            Err(e) => return Err(e),
        };
        if reply.adr.is_empty() {
            return Err(HarnessError::Protocol(format!(
                "{} reported an empty address",
                self.name
            )));
        }
        self.lit_adr = Some(reply.adr.clone());
        self.p2p_port = port;
        Ok(reply.adr)
    }

    /// Connect to `other` and wait until both sides list each other
    pub async fn connect_to_peer(&self, other: &LitNode) -> Result<()> {
        let address = other.ln_address()?;
        debug!("{} connecting to {}", self.name, address);
        let connected: Result<StatusReply> =
            self.call("Connect", json!({ "LNAddr": address })).await;
        if let Err(e) = connected {
            return Err(match e {
                HarnessError::RemoteError { message, .. } => HarnessError::PeerConnect {
                    peer: address,
                    message,
                },
                other => other,
            });
        }

        let my_adr = self.lit_adr()?.to_string();
        let their_adr = other.lit_adr()?.to_string();
        self.wait_for_peer(&their_adr).await?;
        other.wait_for_peer(&my_adr).await?;
        Ok(())
    }

    /// Poll `ListConnections` until `address` shows up
    pub async fn wait_for_peer(&self, address: &str) -> Result<()> {
        let policy = self
            .options
            .sync_policy(format!("{} never listed peer {}", self.name, address));
        wait_until(
            || async move { Ok(self.update_peers().await?.contains(address)) },
            &policy,
        )
        .await
    }

    /// Refresh the peer mapping from `ListConnections`
    pub async fn update_peers(&self) -> Result<PeerMapping> {
        let reply = self.list_connections().await?;
        let mapping = PeerMapping::from_connections(&reply);
        *self.peers.lock() = mapping.clone();
        Ok(mapping)
    }

    /// Local peer index of `other`
    pub fn get_peer_id(&self, other: &LitNode) -> Result<u32> {
        let address = other.lit_adr()?;
        self.peers
            .lock()
            .get(address)
            .ok_or_else(|| HarnessError::UnknownPeer(address.to_string()))
    }

    /// Snapshot of the peer mapping
    pub fn peer_mapping(&self) -> PeerMapping {
        self.peers.lock().clone()
    }

    /// `ListConnections`
    pub async fn list_connections(&self) -> Result<ListConnectionsReply> {
        self.call("ListConnections", json!({})).await
    }

    /// Fresh witness address for `coin_type`
    pub async fn make_new_address(&self, coin_type: u32) -> Result<String> {
        let reply: AddressReply = self
            .call("Address", json!({ "NumToMake": 1, "CoinType": coin_type }))
            .await?;
        reply
            .wit_addresses
            .into_iter()
            .next()
            .ok_or_else(|| HarnessError::Protocol(format!("{} returned no address", self.name)))
    }

    /// Balance entry for `coin_type`
    pub async fn get_balance_info(&self, coin_type: u32) -> Result<BalanceInfo> {
        let reply: BalanceReply = self.call("Balance", json!({})).await?;
        reply
            .balances
            .into_iter()
            .find(|b| b.coin_type == coin_type)
            .ok_or(HarnessError::UnknownCoinType(coin_type))
    }

    /// Height the node has processed for its own coin
    pub async fn get_sync_height(&self) -> Result<i32> {
        Ok(self.get_balance_info(self.coin_type()).await?.sync_height)
    }

    /// Wait until the node has processed `height`
    pub async fn resync(&self, height: u64) -> Result<()> {
        let policy = self
            .options
            .sync_policy(format!("{} failed to sync to height {}", self.name, height));
        wait_until(
            || async move {
                match self.get_sync_height().await {
                    Ok(synced) => Ok(u64::try_from(synced).is_ok_and(|s| s == height)),
                    // the balance entry appears once the wallet attached to the chain
                    Err(HarnessError::UnknownCoinType(_)) => Ok(false),
                    Err(e) => Err(e),
                }
            },
            &policy,
        )
        .await
    }

    /// Fund a channel to `peer`, returning the local channel index
    pub async fn open_channel(
        &self,
        peer: &LitNode,
        capacity: i64,
        initial_send: i64,
        coin_type: u32,
    ) -> Result<u32> {
        let reply: FundReply = self
            .call(
                "FundChannel",
                json!({
                    "Peer": self.get_peer_id(peer)?,
                    "CoinType": coin_type,
                    "Capacity": capacity,
                    "InitialSend": initial_send,
                    "Data": null,
                }),
            )
            .await?;
        debug!("{} funded channel {} ({})", self.name, reply.chan_idx, reply.status);
        Ok(reply.chan_idx)
    }

    /// Push `amount` through channel `chan_idx`
    pub async fn push(&self, chan_idx: u32, amount: i64) -> Result<PushReply> {
        self.call(
            "Push",
            json!({ "ChanIdx": chan_idx, "Amt": amount, "Data": null }),
        )
        .await
    }

    /// Cooperatively close channel `chan_idx`
    pub async fn close_channel(&self, chan_idx: u32) -> Result<StatusReply> {
        self.call("CloseChannel", json!({ "ChanIdx": chan_idx })).await
    }

    /// Unilaterally close channel `chan_idx`
    pub async fn break_channel(&self, chan_idx: u32) -> Result<StatusReply> {
        self.call("BreakChannel", json!({ "ChanIdx": chan_idx })).await
    }

    /// Channels, all of them when `chan_idx` is `None`
    pub async fn channel_list(&self, chan_idx: Option<u32>) -> Result<Vec<ChannelInfo>> {
        let reply: ChannelListReply = self
            .call("ChannelList", json!({ "ChanIdx": chan_idx.unwrap_or(0) }))
            .await?;
        Ok(reply.channels)
    }

    /// Set the fee per byte for `coin_type`
    pub async fn set_fee(&self, fee: i64, coin_type: u32) -> Result<i64> {
        let reply: FeeReply = self
            .call("SetFee", json!({ "Fee": fee, "CoinType": coin_type }))
            .await?;
        Ok(reply.current_fee)
    }

    /// Current fee per byte for `coin_type`
    pub async fn get_fee(&self, coin_type: u32) -> Result<i64> {
        let reply: FeeReply = self.call("GetFee", json!({ "CoinType": coin_type })).await?;
        Ok(reply.current_fee)
    }

    /// On-chain send to one or more addresses
    pub async fn send(&self, addresses: &[String], amounts: &[i64]) -> Result<Vec<String>> {
        if addresses.len() != amounts.len() {
            return Err(HarnessError::InvalidInvocation(format!(
                "{} addresses but {} amounts",
                addresses.len(),
                amounts.len()
            )));
        }
        let reply: TxidsReply = self
            .call("Send", json!({ "DestAddrs": addresses, "Amts": amounts }))
            .await?;
        Ok(reply.txids)
    }

    /// Send a chat message to peer `peer_idx`
    pub async fn say(&self, peer_idx: u32, message: &str) -> Result<()> {
        let _: StatusReply = self
            .call("Say", json!({ "Peer": peer_idx, "Message": message }))
            .await?;
        Ok(())
    }

    /// Round-trip a message through peer `peer_idx`
    pub async fn ping_peer(&self, peer_idx: u32, message: &str) -> Result<PingPeerReply> {
        self.call("PingPeer", json!({ "PeerIdx": peer_idx, "Msg": message }))
            .await
    }

    /// Ask the node to exit; the process is not awaited
    pub async fn stop(&self) -> Result<()> {
        let _: StatusReply = self.call("Stop", json!({})).await?;
        Ok(())
    }

    /// Register an oracle by public key
    pub async fn add_oracle(&self, key: &str, name: &str) -> Result<OracleInfo> {
        let reply: AddOracleReply = self
            .call("AddOracle", json!({ "Key": key, "Name": name }))
            .await?;
        Ok(reply.oracle)
    }

    /// Known oracles
    pub async fn list_oracles(&self) -> Result<Vec<OracleInfo>> {
        let reply: ListOraclesReply = self.call("ListOracles", json!({})).await?;
        Ok(reply.oracles)
    }

    /// Create an empty contract draft
    pub async fn new_contract(&self) -> Result<ContractInfo> {
        let reply: ContractReply = self.call("NewContract", json!({})).await?;
        Ok(reply.contract)
    }

    /// All contracts
    pub async fn list_contracts(&self) -> Result<Vec<ContractInfo>> {
        let reply: ListContractsReply = self.call("ListContracts", json!({})).await?;
        Ok(reply.contracts)
    }

    /// One contract
    pub async fn get_contract(&self, idx: u64) -> Result<ContractInfo> {
        let reply: ContractReply = self.call("GetContract", json!({ "Idx": idx })).await?;
        Ok(reply.contract)
    }

    /// Number of oracles the contract settles on
    pub async fn set_contract_oracles_number(&self, cidx: u64, count: u32) -> Result<()> {
        self.call_success(
            "SetContractOraclesNumber",
            json!({ "CIdx": cidx, "OraclesNumber": count }),
        )
        .await
    }

    /// Oracles the contract settles on
    pub async fn set_contract_oracle(&self, cidx: u64, oracle_idxs: &[u64]) -> Result<()> {
        self.call_success("SetContractOracle", json!({ "CIdx": cidx, "OIdx": oracle_idxs }))
            .await
    }

    /// Time the oracles publish the settlement value
    pub async fn set_contract_settlement_time(&self, cidx: u64, time: u64) -> Result<()> {
        self.call_success(
            "SetContractSettlementTime",
            json!({ "CIdx": cidx, "Time": time }),
        )
        .await
    }

    /// Time after which the refund transaction is valid
    pub async fn set_contract_refund_time(&self, cidx: u64, time: u64) -> Result<()> {
        self.call_success("SetContractRefundTime", json!({ "CIdx": cidx, "Time": time }))
            .await
    }

    /// R points the oracles committed to, one per oracle
    pub async fn set_contract_rpoint(&self, cidx: u64, rpoints: &[Vec<u8>]) -> Result<()> {
        self.call_success("SetContractRPoint", json!({ "CIdx": cidx, "RPoint": rpoints }))
            .await
    }

    /// Coin type of the contract
    pub async fn set_contract_coin_type(&self, cidx: u64, coin_type: u32) -> Result<()> {
        self.call_success(
            "SetContractCoinType",
            json!({ "CIdx": cidx, "CoinType": coin_type }),
        )
        .await
    }

    /// Fee per byte for contract transactions
    pub async fn set_contract_fee_per_byte(&self, cidx: u64, fee_per_byte: u32) -> Result<()> {
        self.call_success(
            "SetContractFeePerByte",
            json!({ "CIdx": cidx, "FeePerByte": fee_per_byte }),
        )
        .await
    }

    /// Funding contributed by each side
    pub async fn set_contract_funding(&self, cidx: u64, ours: i64, theirs: i64) -> Result<()> {
        self.call_success(
            "SetContractFunding",
            json!({ "CIdx": cidx, "OurAmount": ours, "TheirAmount": theirs }),
        )
        .await
    }

    /// Oracle values at which the whole pot goes to one side
    pub async fn set_contract_division(
        &self,
        cidx: u64,
        value_fully_ours: i64,
        value_fully_theirs: i64,
    ) -> Result<()> {
        self.call_success(
            "SetContractDivision",
            json!({
                "CIdx": cidx,
                "ValueFullyOurs": value_fully_ours,
                "ValueFullyTheirs": value_fully_theirs,
            }),
        )
        .await
    }

    /// Offer contract `cidx` to peer `peer_idx`
    pub async fn offer_contract(&self, cidx: u64, peer_idx: u32) -> Result<()> {
        self.call_success("OfferContract", json!({ "CIdx": cidx, "PeerIdx": peer_idx }))
            .await
    }

    /// Accept or decline a received offer
    pub async fn contract_respond(&self, cidx: u64, accept: bool) -> Result<()> {
        self.call_success(
            "ContractRespond",
            json!({ "AcceptOrDecline": accept, "CIdx": cidx }),
        )
        .await
    }

    /// Settle with the oracles' published value and signatures
    pub async fn settle_contract(
        &self,
        cidx: u64,
        oracle_value: u64,
        oracle_sigs: &[Vec<u8>],
    ) -> Result<()> {
        self.call_success(
            "SettleContract",
            json!({ "CIdx": cidx, "OracleValue": oracle_value, "OracleSig": oracle_sigs }),
        )
        .await
    }

    /// Publish the refund transaction of contract `cidx`
    ///
    /// Valid once the contract's refund time has passed.
    pub async fn refund_contract(&self, cidx: u64) -> Result<()> {
        self.call_success("RefundContract", json!({ "CIdx": cidx })).await
    }

    /// Propose settling contract `cidx` early as if the oracles had
    /// published `desired_value`
    pub async fn negotiate_contract(&self, cidx: u64, desired_value: i64) -> Result<()> {
        self.call_success(
            "DlcNegotiateContract",
            json!({ "CIdx": cidx, "DesiredOracleValue": desired_value }),
        )
        .await
    }

    /// Accept or decline a received negotiation proposal
    pub async fn negotiate_contract_respond(&self, cidx: u64, accept: bool) -> Result<()> {
        self.call_success(
            "NegotiateContractRespond",
            json!({ "AcceptOrDecline": accept, "CIdx": cidx }),
        )
        .await
    }

    /// Our payout if the oracles publish `oracle_value`
    pub async fn get_contract_division(&self, cidx: u64, oracle_value: u64) -> Result<i64> {
        let reply: ContractDivisionReply = self
            .call(
                "GetContractDivision",
                json!({ "CIdx": cidx, "OracleValue": oracle_value }),
            )
            .await?;
        Ok(reply.value_ours)
    }

    /// Whether two signatures over one R point prove the oracle equivocated
    pub async fn different_results_fraud(&self, evidence: &FraudEvidence) -> Result<bool> {
        let reply: FraudReply = self
            .call("DifferentResultsFraud", serde_json::to_value(evidence)?)
            .await?;
        Ok(reply.fraud)
    }
}

fn launch_args(
    data_dir: &Path,
    rpc_port: u16,
    p2p_port: u16,
    coin: CoinKind,
    coin_p2p_port: u16,
) -> Vec<String> {
    vec![
        "-v".to_string(),
        "--dir".to_string(),
        data_dir.display().to_string(),
        format!("--rpcport={}", rpc_port),
        // empty hosts keep lit off testnet3 and litetest4
        "--tn3".to_string(),
        String::new(),
        "--lt4".to_string(),
        String::new(),
        coin.lit_flag().to_string(),
        format!("{}:{}", LOCALHOST, coin_p2p_port),
        "--autoReconnect".to_string(),
        format!("--autoListenPort={}", p2p_port),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_privkey_seed_is_distinct_per_index() {
        let first = privkey_seed(0).unwrap();
        let last = privkey_seed(255).unwrap();
        assert_eq!(first.trim().len(), 64);
        assert!(first.starts_with(&"1".repeat(62)));
        assert!(first.ends_with("00\n"));
        assert!(last.ends_with("ff\n"));
        assert_ne!(privkey_seed(16).unwrap(), privkey_seed(1).unwrap());
        assert!(matches!(privkey_seed(256), Err(HarnessError::Config(_))));
    }

    #[test]
    fn test_launch_args_point_at_coin_node() {
        let args = launch_args(Path::new("/tmp/lit0"), 12001, 12002, CoinKind::Bitcoin, 12000);
        assert_eq!(
            args,
            vec![
                "-v",
                "--dir",
                "/tmp/lit0",
                "--rpcport=12001",
                "--tn3",
                "",
                "--lt4",
                "",
                "--reg",
                "127.0.0.1:12000",
                "--autoReconnect",
                "--autoListenPort=12002",
            ]
        );

        let ltc = launch_args(Path::new("/tmp/lit1"), 1, 2, CoinKind::Litecoin, 3);
        assert!(ltc.contains(&"--ltr".to_string()));
    }

    #[test]
    fn test_peer_mapping_from_connections() {
        let reply: ListConnectionsReply = serde_json::from_value(json!({
            "Connections": [
                {"PeerNumber": 1, "RemoteHost": "127.0.0.1:5", "LitAdr": "ln1bob"},
                {"PeerNumber": 2, "RemoteHost": "127.0.0.1:6", "LitAdr": "ln1carol"},
                {"PeerNumber": 3, "RemoteHost": "127.0.0.1:7", "LitAdr": ""}
            ],
            "MyPKH": "ln1alice"
        }))
        .unwrap();

        let mapping = PeerMapping::from_connections(&reply);
        assert_eq!(mapping.len(), 2);
        assert_eq!(mapping.get("ln1carol"), Some(2));
        assert_eq!(mapping.get("ln1dave"), None);
    }
}
