// File: testing-framework/src/nodes/mod.rs
//
// Node handles
//
// Each handle owns one external process and the RPC transport pointing at
// it, and exposes domain operations as thin compositions of RPC calls. None
// of these operations wait for their effects; callers poll postconditions
// through the waiters.

/// Coin full node (bitcoind / litecoind)
pub mod coin;
/// DLC oracle REST service
pub mod oracle;
/// Payment channel node (lit)
pub mod payment;
/// Typed RPC replies of the payment node
pub mod types;

use serde::{Deserialize, Serialize};

pub use coin::{spawn_coin_node, BitcoinNode, CoinNode, LitecoinNode};
pub use oracle::OracleNode;
pub use payment::{LitNode, LitNodeOptions, PeerMapping};
pub use types::*;

/// Coin type the payment node uses for bitcoin regtest
pub const REGTEST_COINTYPE: u32 = 257;

/// Coin type the payment node uses for litecoin regtest
pub const LITECOIN_REGTEST_COINTYPE: u32 = 258;

/// Satoshis per coin
pub const COIN: i64 = 100_000_000;

/// Which coin daemon backs an environment
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoinKind {
    /// bitcoind in regtest mode
    #[default]
    Bitcoin,
    /// litecoind in regtest mode
    Litecoin,
}

impl CoinKind {
    /// Executable name looked up in PATH
    pub fn binary_name(&self) -> &'static str {
        match self {
            Self::Bitcoin => "bitcoind",
            Self::Litecoin => "litecoind",
        }
    }

    /// Prefix of the node's working directory
    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Bitcoin => "bcnode",
            Self::Litecoin => "lcnode",
        }
    }

    /// Oldest daemon version the harness talks to
    pub fn min_version(&self) -> u64 {
        match self {
            Self::Bitcoin => 140_000,
            Self::Litecoin => 130_200,
        }
    }

    /// Payment node coin type
    pub fn coin_type(&self) -> u32 {
        match self {
            Self::Bitcoin => REGTEST_COINTYPE,
            Self::Litecoin => LITECOIN_REGTEST_COINTYPE,
        }
    }

    /// Default fee rate per byte on the payment node
    pub fn fee_rate(&self) -> i64 {
        match self {
            Self::Bitcoin => 80,
            Self::Litecoin => 800,
        }
    }

    /// Payment node flag naming the regtest host for this coin
    pub fn lit_flag(&self) -> &'static str {
        match self {
            Self::Bitcoin => "--reg",
            Self::Litecoin => "--ltr",
        }
    }
}

impl std::fmt::Display for CoinKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bitcoin => write!(f, "bitcoin"),
            Self::Litecoin => write!(f, "litecoin"),
        }
    }
}

impl std::str::FromStr for CoinKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bitcoin" | "btc" | "reg" => Ok(Self::Bitcoin),
            "litecoin" | "ltc" | "ltr" => Ok(Self::Litecoin),
            other => Err(format!(
                "unknown coin '{}', expected bitcoin or litecoin",
                other
            )),
        }
    }
}
