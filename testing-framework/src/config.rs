// File: testing-framework/src/config.rs
//
// Harness configuration
//
// Defaults live in `defaults`, environment variables overlay them in
// `HarnessConfig::from_env`, and the `lit-itest` CLI overlays both.

use std::path::PathBuf;
use std::time::Duration;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::{HarnessError, Result};
use crate::nodes::CoinKind;

/// Default values for configuration
pub mod defaults {
    /// Payment node binary
    pub const LIT_BIN: &str = "lit";
    /// Oracle binary
    pub const ORACLE_BIN: &str = "dlcoracle";
    /// Coin node RPC credentials
    pub const RPC_USER: &str = "regtestuser";
    /// Coin node RPC credentials
    pub const RPC_PASSWORD: &str = "regtestpass";
    /// Blocks generated at startup so segwit is active on regtest
    pub const SEGWIT_ACTIVATION_BLOCKS: u64 = 500;
    /// Budget for the block sync barrier
    pub const SYNC_TIMEOUT_SECS: u64 = 60;
    /// Interval between polling attempts
    pub const POLL_INTERVAL_MS: u64 = 100;
    /// Budget for a node to open its RPC listener
    pub const STARTUP_TIMEOUT_SECS: u64 = 30;
    /// Per-call transport timeout
    pub const RPC_TIMEOUT_SECS: u64 = 30;
    /// Each stop escalation step (RPC stop, terminate, kill) gets this long
    pub const STOP_STEP_TIMEOUT_SECS: u64 = 5;
    /// Lines of each node log printed on failure
    pub const LOG_TAIL_LINES: usize = 500;

    /// Environment variable overriding the temp root
    pub const ENV_TMP_ROOT: &str = "LIT_ITEST_ROOT";
    /// Environment variable overriding the lit binary
    pub const ENV_LIT_BIN: &str = "LIT_BIN";
    /// Environment variable overriding bitcoind
    pub const ENV_BITCOIND_BIN: &str = "BITCOIND_BIN";
    /// Environment variable overriding litecoind
    pub const ENV_LITECOIND_BIN: &str = "LITECOIND_BIN";
    /// Environment variable overriding the oracle binary
    pub const ENV_ORACLE_BIN: &str = "DLCORACLE_BIN";
    /// Environment variable enabling subprocess output
    pub const ENV_SHOW_OUTPUT: &str = "LIT_ITEST_SHOW_OUTPUT";
    /// Environment variable keeping temp dirs
    pub const ENV_KEEP_TMP: &str = "LIT_ITEST_KEEP_TMP";
}

/// How the harness talks to payment nodes
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LitTransport {
    /// Persistent `/ws` websocket, one frame per call
    #[default]
    WebSocket,
    /// One HTTP POST per call against `/oneoff`
    OneOff,
}

/// Complete harness configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HarnessConfig {
    /// Payment node binary
    #[serde(default = "default_lit_bin")]
    pub lit_bin: PathBuf,

    /// Which coin node backs the environment
    #[serde(default)]
    pub coin: CoinKind,

    /// Explicit coin node binary, otherwise the kind's default name
    #[serde(default)]
    pub coin_bin: Option<PathBuf>,

    /// Oracle binary
    #[serde(default = "default_oracle_bin")]
    pub oracle_bin: PathBuf,

    /// Root for per-node directories, a fresh temp dir when unset
    #[serde(default)]
    pub tmp_root: Option<PathBuf>,

    /// First port handed out, random when unset
    #[serde(default)]
    pub base_port: Option<u16>,

    /// Coin node RPC user
    #[serde(default = "default_rpc_user")]
    pub rpc_user: String,

    /// Coin node RPC password
    #[serde(default = "default_rpc_password")]
    pub rpc_password: String,

    /// Blocks mined before payment nodes start
    #[serde(default = "default_segwit_blocks")]
    pub segwit_activation_blocks: u64,

    /// Budget for every sync barrier, in seconds
    #[serde(default = "default_sync_timeout")]
    pub sync_timeout_secs: u64,

    /// Polling interval, in milliseconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Budget for a node to become reachable, in seconds
    #[serde(default = "default_startup_timeout")]
    pub startup_timeout_secs: u64,

    /// Per-call transport timeout, in seconds
    #[serde(default = "default_rpc_timeout")]
    pub rpc_timeout_secs: u64,

    /// Timeout of each stop escalation step, in seconds
    #[serde(default = "default_stop_step_timeout")]
    pub stop_step_timeout_secs: u64,

    /// Keep temp directories after the run
    #[serde(default)]
    pub keep_tmp: bool,

    /// Forward subprocess stdout/stderr to the log
    #[serde(default)]
    pub show_output: bool,

    /// Print node log tails on failure
    #[serde(default)]
    pub dump_logs: bool,

    /// Pause before teardown when a scenario fails
    #[serde(default)]
    pub debugger: bool,

    /// Payment node RPC transport
    #[serde(default)]
    pub lit_transport: LitTransport,
}

fn default_lit_bin() -> PathBuf {
    PathBuf::from(defaults::LIT_BIN)
}

fn default_oracle_bin() -> PathBuf {
    PathBuf::from(defaults::ORACLE_BIN)
}

fn default_rpc_user() -> String {
    defaults::RPC_USER.to_string()
}

fn default_rpc_password() -> String {
    defaults::RPC_PASSWORD.to_string()
}

fn default_segwit_blocks() -> u64 {
    defaults::SEGWIT_ACTIVATION_BLOCKS
}

fn default_sync_timeout() -> u64 {
    defaults::SYNC_TIMEOUT_SECS
}

fn default_poll_interval() -> u64 {
    defaults::POLL_INTERVAL_MS
}

fn default_startup_timeout() -> u64 {
    defaults::STARTUP_TIMEOUT_SECS
}

fn default_rpc_timeout() -> u64 {
    defaults::RPC_TIMEOUT_SECS
}

fn default_stop_step_timeout() -> u64 {
    defaults::STOP_STEP_TIMEOUT_SECS
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            lit_bin: default_lit_bin(),
            coin: CoinKind::default(),
            coin_bin: None,
            oracle_bin: default_oracle_bin(),
            tmp_root: None,
            base_port: None,
            rpc_user: default_rpc_user(),
            rpc_password: default_rpc_password(),
            segwit_activation_blocks: default_segwit_blocks(),
            sync_timeout_secs: default_sync_timeout(),
            poll_interval_ms: default_poll_interval(),
            startup_timeout_secs: default_startup_timeout(),
            rpc_timeout_secs: default_rpc_timeout(),
            stop_step_timeout_secs: default_stop_step_timeout(),
            keep_tmp: false,
            show_output: false,
            dump_logs: false,
            debugger: false,
            lit_transport: LitTransport::default(),
        }
    }
}

impl HarnessConfig {
    /// Defaults overlaid with the `LIT_ITEST_*` / `*_BIN` environment variables
    pub fn from_env() -> Self {
        Self::default().with_env(|key| std::env::var(key).ok())
    }

    /// Overlay values from an arbitrary lookup, used by `from_env`
    pub fn with_env<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = lookup(defaults::ENV_TMP_ROOT).filter(|v| !v.is_empty()) {
            debug!("Using temp root override {}", root);
            self.tmp_root = Some(PathBuf::from(root));
        }
        if let Some(bin) = lookup(defaults::ENV_LIT_BIN) {
            self.lit_bin = PathBuf::from(bin);
        }
        let coin_env = match self.coin {
            CoinKind::Bitcoin => defaults::ENV_BITCOIND_BIN,
            CoinKind::Litecoin => defaults::ENV_LITECOIND_BIN,
        };
        if let Some(bin) = lookup(coin_env) {
            self.coin_bin = Some(PathBuf::from(bin));
        }
        if let Some(bin) = lookup(defaults::ENV_ORACLE_BIN) {
            self.oracle_bin = PathBuf::from(bin);
        }
        if let Some(flag) = lookup(defaults::ENV_SHOW_OUTPUT) {
            self.show_output = parse_flag(&flag);
        }
        if let Some(flag) = lookup(defaults::ENV_KEEP_TMP) {
            self.keep_tmp = parse_flag(&flag);
        }
        self
    }

    /// Reject values that would make every wait fail or hang
    pub fn validate(&self) -> Result<()> {
        if self.sync_timeout_secs == 0 {
            return Err(HarnessError::Config(
                "sync_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.poll_interval_ms == 0 {
            return Err(HarnessError::Config(
                "poll_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.startup_timeout_secs == 0 || self.rpc_timeout_secs == 0 {
            return Err(HarnessError::Config(
                "startup and rpc timeouts must be greater than zero".to_string(),
            ));
        }
        if self.rpc_user.is_empty() {
            return Err(HarnessError::Config("rpc_user must not be empty".to_string()));
        }
        Ok(())
    }

    /// Binary for the configured coin node
    pub fn coin_binary(&self) -> PathBuf {
        self.coin_bin
            .clone()
            .unwrap_or_else(|| PathBuf::from(self.coin.binary_name()))
    }

    /// Sync barrier budget
    pub fn sync_timeout(&self) -> Duration {
        Duration::from_secs(self.sync_timeout_secs)
    }

    /// Polling interval
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Startup budget
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_secs(self.startup_timeout_secs)
    }

    /// Per-call transport timeout
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_secs(self.rpc_timeout_secs)
    }

    /// Stop escalation step timeout
    pub fn stop_step_timeout(&self) -> Duration {
        Duration::from_secs(self.stop_step_timeout_secs)
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
