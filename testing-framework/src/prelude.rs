//! Convenient re-exports for writing scenarios
//!
//! ```rust,ignore
//! use lit_testing_framework::prelude::*;
//!
//! async fn my_scenario(env: &mut TestEnvironment) -> anyhow::Result<()> {
//!     let lit = env.lit(0)?;
//!     let address = lit.make_new_address(REGTEST_COINTYPE).await?;
//!     env.coin().send_to_address(&address, 1.0).await?;
//!     env.generate_block(1).await?;
//!     assert_txo_total(lit, REGTEST_COINTYPE, COIN).await
//! }
//! ```

pub use crate::config::{HarnessConfig, LitTransport};
pub use crate::environment::{
    EnvironmentBuilder, EnvironmentFactory, LitEnvironmentFactory, ScenarioEnvironment,
    TestEnvironment,
};
pub use crate::error::{HarnessError, Result};
pub use crate::invariants::{check_all_mature, check_conservation, check_settled_and_mature};
pub use crate::nodes::{
    BalanceInfo, CoinKind, CoinNode, LitNode, OracleNode, COIN, REGTEST_COINTYPE,
};
pub use crate::orchestrator::RunResources;
pub use crate::rpc_helpers::{
    assert_chan_total, assert_channel_height, assert_txo_total, balance_of, wait_for_balance,
};
pub use crate::scenarios::{
    RunReport, RunnerOptions, Scenario, ScenarioFn, ScenarioRegistry, ScenarioRunner,
};
pub use crate::waiters::{wait_until, WaitPolicy};
