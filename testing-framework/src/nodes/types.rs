// File: testing-framework/src/nodes/types.rs
//
// Typed replies of the payment node RPCs. Field names follow the node's
// Go structs, so everything is PascalCase on the wire. Go encodes nil slices
// as `null`, which `nullable` turns into an empty Vec.

use serde::{Deserialize, Deserializer, Serialize};

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Reply to `Listen`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListeningPortsReply {
    /// Listening `ip:port` pairs
    #[serde(default, deserialize_with = "nullable")]
    pub lis_ip_ports: Vec<String>,
    /// The node's own lightning address
    pub adr: String,
}

/// Generic `{Status}` reply
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct StatusReply {
    /// Human readable status
    #[serde(default)]
    pub status: String,
}

/// One connected peer
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PeerInfo {
    /// Local peer index
    pub peer_number: u32,
    /// Remote `host:port`
    #[serde(default)]
    pub remote_host: String,
    /// Remote lightning address
    #[serde(default)]
    pub lit_adr: String,
    /// Remote nickname, if set
    #[serde(default)]
    pub nickname: String,
}

/// Reply to `ListConnections`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListConnectionsReply {
    /// Currently connected peers
    #[serde(default, deserialize_with = "nullable")]
    pub connections: Vec<PeerInfo>,
    /// Our own pubkey hash address
    #[serde(rename = "MyPKH", default)]
    pub my_pkh: String,
}

/// Balance of one coin type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BalanceInfo {
    /// Coin type this entry refers to
    pub coin_type: u32,
    /// Height the wallet has processed
    pub sync_height: i32,
    /// Funds locked in channels
    pub chan_total: i64,
    /// All unspent outputs
    pub txo_total: i64,
    /// Confirmed, spendable witness outputs
    pub mature_witty: i64,
    /// Fee rate per byte
    #[serde(default)]
    pub fee_rate: i64,
}

impl BalanceInfo {
    /// Funds that are not yet spendable
    pub fn immature(&self) -> i64 {
        self.txo_total - self.mature_witty
    }

    /// Total funds held on-chain and in channels
    pub fn total(&self) -> i64 {
        self.txo_total + self.chan_total
    }
}

/// Reply to `Balance`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct BalanceReply {
    /// One entry per coin type the node tracks
    #[serde(default, deserialize_with = "nullable")]
    pub balances: Vec<BalanceInfo>,
}

/// Reply to `Address`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddressReply {
    /// Bech32 addresses
    #[serde(default, deserialize_with = "nullable")]
    pub wit_addresses: Vec<String>,
    /// Base58 addresses
    #[serde(default, deserialize_with = "nullable")]
    pub legacy_addresses: Vec<String>,
}

/// Reply to `FundChannel`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FundReply {
    /// Human readable status
    #[serde(default)]
    pub status: String,
    /// Index of the new channel
    pub chan_idx: u32,
    /// Height the funding transaction was broadcast at
    #[serde(default)]
    pub fund_height: i32,
}

/// One channel as reported by `ChannelList`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChannelInfo {
    /// Funding outpoint
    #[serde(default)]
    pub out_point: String,
    /// Coin type
    #[serde(default)]
    pub coin_type: u32,
    /// Whether the channel has been closed
    #[serde(default)]
    pub closed: bool,
    /// Channel capacity
    #[serde(default)]
    pub capacity: i64,
    /// Our side of the channel
    #[serde(default)]
    pub my_balance: i64,
    /// Confirmation height of the funding transaction
    #[serde(default)]
    pub height: i32,
    /// Latest commitment number
    #[serde(default)]
    pub state_num: u64,
    /// Peer index
    #[serde(default)]
    pub peer_idx: u32,
    /// Channel index
    #[serde(default)]
    pub c_idx: u32,
    /// Remote peer id
    #[serde(rename = "PeerID", default)]
    pub peer_id: String,
}

/// Reply to `ChannelList`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChannelListReply {
    /// Matching channels
    #[serde(default, deserialize_with = "nullable")]
    pub channels: Vec<ChannelInfo>,
}

/// Reply to `Push`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PushReply {
    /// Commitment number after the push
    #[serde(default)]
    pub state_index: u64,
}

/// Reply to `GetFee`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FeeReply {
    /// Fee per byte
    pub current_fee: i64,
}

/// Reply to `Send`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct TxidsReply {
    /// Broadcast transaction ids
    #[serde(default, deserialize_with = "nullable")]
    pub txids: Vec<String>,
}

/// Reply to `PingPeer`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PingPeerReply {
    /// Echoed message
    #[serde(default)]
    pub resp: String,
    /// Error reported by the remote, empty on success
    #[serde(default)]
    pub err: String,
}

/// `{Success}` reply of the contract RPCs
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct SuccessReply {
    /// Whether the operation succeeded
    #[serde(default)]
    pub success: bool,
}

/// An oracle known to the node
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OracleInfo {
    /// Local oracle index
    pub idx: u64,
    /// Oracle name
    #[serde(default)]
    pub name: String,
}

/// Reply to `AddOracle`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AddOracleReply {
    /// The stored oracle
    pub oracle: OracleInfo,
}

/// Reply to `ListOracles`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListOraclesReply {
    /// Known oracles
    #[serde(default, deserialize_with = "nullable")]
    pub oracles: Vec<OracleInfo>,
}

/// The contract fields the harness inspects
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContractInfo {
    /// Local contract index
    pub idx: u64,
    /// Peer the contract was offered to or received from
    #[serde(default)]
    pub peer_idx: u32,
    /// Coin type
    #[serde(default)]
    pub coin_type: u32,
    /// Fee per byte for contract transactions
    #[serde(default)]
    pub fee_per_byte: u32,
    /// Number of oracles the contract uses
    #[serde(default)]
    pub oracles_number: u32,
    /// Expected oracle publication time
    #[serde(default)]
    pub oracle_timestamp: u64,
    /// Refund time
    #[serde(default)]
    pub refund_timestamp: u64,
    /// Our funding
    #[serde(default)]
    pub our_funding_amount: i64,
    /// Their funding
    #[serde(default)]
    pub their_funding_amount: i64,
}

/// Reply to `NewContract` / `GetContract`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContractReply {
    /// The contract
    pub contract: ContractInfo,
}

/// Reply to `ListContracts`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ListContractsReply {
    /// All contracts
    #[serde(default, deserialize_with = "nullable")]
    pub contracts: Vec<ContractInfo>,
}

/// Reply to `GetContractDivision`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContractDivisionReply {
    /// Our payout for the oracle value
    pub value_ours: i64,
}

/// Reply to `DifferentResultsFraud`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct FraudReply {
    /// Whether the two signatures prove the oracle equivocated
    #[serde(default)]
    pub fraud: bool,
}

/// Signatures of an oracle that published two results for one R point
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FraudEvidence {
    /// First signature
    pub sfirst: String,
    /// First message hash
    pub hfirst: String,
    /// Second signature
    pub ssecond: String,
    /// Second message hash
    pub hsecond: String,
    /// R point both signatures commit to
    pub rpoint: String,
    /// Oracle public key
    pub apoint: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_list_connections_null_slice() {
        let reply: ListConnectionsReply =
            serde_json::from_value(json!({"Connections": null, "MyPKH": "ln1abc"})).unwrap();
        assert!(reply.connections.is_empty());
        assert_eq!(reply.my_pkh, "ln1abc");
    }

    #[test]
    fn test_balance_reply_fields() {
        let reply: BalanceReply = serde_json::from_value(json!({
            "Balances": [{
                "CoinType": 257,
                "SyncHeight": 501,
                "ChanTotal": 800000,
                "TxoTotal": 99190000,
                "MatureWitty": 99000000,
                "FeeRate": 80
            }]
        }))
        .unwrap();
        let bal = reply.balances[0];
        assert_eq!(bal.coin_type, 257);
        assert_eq!(bal.sync_height, 501);
        assert_eq!(bal.immature(), 190000);
        assert_eq!(bal.total(), 99990000);
    }

    #[test]
    fn test_channel_info_go_field_names() {
        let info: ChannelInfo = serde_json::from_value(json!({
            "OutPoint": "ab:0",
            "CoinType": 257,
            "Closed": false,
            "Capacity": 1000000,
            "MyBalance": 799640,
            "Height": 502,
            "StateNum": 1,
            "PeerIdx": 1,
            "CIdx": 1,
            "PeerID": "ln1xyz",
            "Data": [0, 0],
            "Pkh": [1, 2]
        }))
        .unwrap();
        assert_eq!(info.c_idx, 1);
        assert_eq!(info.peer_id, "ln1xyz");
        assert_eq!(info.height, 502);
    }

    #[test]
    fn test_fraud_evidence_wire_names() {
        let evidence = FraudEvidence {
            sfirst: "s1".into(),
            hfirst: "h1".into(),
            ssecond: "s2".into(),
            hsecond: "h2".into(),
            rpoint: "r".into(),
            apoint: "a".into(),
        };
        let encoded = serde_json::to_value(&evidence).unwrap();
        assert_eq!(encoded["Sfirst"], "s1");
        assert_eq!(encoded["Apoint"], "a");
    }
}
