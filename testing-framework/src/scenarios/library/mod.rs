//! Built-in scenario library
//!
//! Every scenario drives real nodes through a [`TestEnvironment`] and fails
//! with an `anyhow` error naming the broken expectation. Waiting is always
//! on a postcondition (sync height, balance, peer listing), never on a
//! fixed sleep.

/// Wallet, fee and peer messaging scenarios
pub mod basic;
/// Payment channel scenarios
pub mod channels;
/// Discreet log contract and oracle scenarios
pub mod dlc;
/// Peer identity across restarts
pub mod reconnect;
/// Payment node behaviour across a chain reorganisation
pub mod reorg;

use anyhow::Result;
use futures::future::BoxFuture;

use super::registry::ScenarioRegistry;
use super::runner::ScenarioFn;
use crate::environment::TestEnvironment;
use crate::nodes::LitNode;
use crate::rpc_helpers::{balance_of, wait_for_balance};
use crate::waiters::WaitPolicy;

/// Wrap an `async fn(&mut TestEnvironment) -> Result<()>` as a [`ScenarioFn`]
macro_rules! scenario {
    ($body:path) => {{
        fn run(env: &mut TestEnvironment) -> BoxFuture<'_, Result<()>> {
            Box::pin($body(env))
        }
        run as ScenarioFn<TestEnvironment>
    }};
}

/// Register every built-in scenario
pub fn register_all(registry: &mut ScenarioRegistry<TestEnvironment>) {
    registry
        .register("testlib", "run_test", 1, scenario!(basic::testlib))
        .register("connect", "run_test", 2, scenario!(basic::connect))
        .register("receive", "run_test", 1, scenario!(basic::receive))
        .register("send", "run_test", 1, scenario!(basic::send))
        .register("send2", "run_test", 2, scenario!(basic::send2))
        .register("setgetfee", "run_test", 1, scenario!(basic::setgetfee))
        .register("peercall", "succeed", 2, scenario!(basic::peercall_succeed))
        .register("peercall", "fail", 2, scenario!(basic::peercall_fail))
        .register("fund", "run_test", 2, scenario!(channels::fund))
        .register("push", "run_test", 2, scenario!(channels::push))
        .register("close", "run_test", 2, scenario!(channels::close))
        .register("break", "run_test", 2, scenario!(channels::break_channel))
        .register("pushclose", "run_test", 2, scenario!(channels::pushclose))
        .register(
            "pushclose_reverse",
            "run_test",
            2,
            scenario!(channels::pushclose_reverse),
        )
        .register(
            "pushclose",
            "roundtrip",
            2,
            scenario!(channels::pushclose_roundtrip),
        )
        .register("pushbreak", "forward", 2, scenario!(channels::pushbreak_forward))
        .register("pushbreak", "reverse", 2, scenario!(channels::pushbreak_reverse))
        .register("reconnect", "run_test", 0, scenario!(reconnect::run_test))
        .register(
            "reconnect",
            "run_test_unordered",
            0,
            scenario!(reconnect::run_test_unordered),
        )
        .register("autoreconn", "run_test", 2, scenario!(reconnect::autoreconn))
        .register("checkoraclefraud", "run_test", 1, scenario!(dlc::checkoraclefraud))
        .register("dlc", "t_11_0", 2, scenario!(dlc::t_11_0))
        .register("dlc", "t_1300_1", 2, scenario!(dlc::t_1300_1))
        .register("dlc", "t_10_0", 2, scenario!(dlc::t_10_0))
        .register("dlc", "t_10_1", 2, scenario!(dlc::t_10_1))
        .register("dlc", "t_20_0", 2, scenario!(dlc::t_20_0))
        .register("dlc", "t_20_1", 2, scenario!(dlc::t_20_1))
        .register("dlcrefund", "forward", 2, scenario!(dlc::dlcrefund_forward))
        .register("dlcrefund", "reverse", 2, scenario!(dlc::dlcrefund_reverse))
        .register(
            "negotiatecontract",
            "accept",
            2,
            scenario!(dlc::negotiate_accept),
        )
        .register(
            "negotiatecontract",
            "decline",
            2,
            scenario!(dlc::negotiate_decline),
        )
        .register("testreorg", "run_test", 1, scenario!(reorg::run_test));
}

/// Policy for waits bounded by the environment's sync budget
pub(crate) fn sync_policy(env: &TestEnvironment, message: impl Into<String>) -> WaitPolicy {
    WaitPolicy::with_timeout(env.config().sync_timeout())
        .interval(env.config().poll_interval())
        .message(message)
}

/// Send one coin from the coin node to a fresh address of `node`, confirm
/// it and return the node's `TxoTotal`
pub(crate) async fn fund_wallet(env: &TestEnvironment, node: &LitNode) -> Result<i64> {
    let coin_type = env.coin_type();
    let address = node.make_new_address(coin_type).await?;
    log::info!("Got {} address: {}", node.name(), address);
    env.coin().send_to_address(&address, 1.0).await?;
    env.generate_block(1).await?;
    let total = balance_of(node, coin_type).await?.txo_total;
    log::info!("Initial {} balance: {}", node.name(), total);
    Ok(total)
}

/// Wait until `TxoTotal + ChanTotal` of `node` equals `expected`
///
/// On timeout the error carries the last observed total.
pub(crate) async fn wait_for_total(env: &TestEnvironment, node: &LitNode, expected: i64) -> Result<()> {
    let coin_type = env.coin_type();
    let policy = sync_policy(env, format!("{} total never reached {}", node.name(), expected));
    if let Err(e) = wait_for_balance(node, coin_type, &policy, |b| b.total() == expected).await {
        let actual = balance_of(node, coin_type).await?.total();
        return Err(e.context(format!(
            "{} holds {} in total, expected {}",
            node.name(),
            actual,
            expected
        )));
    }
    Ok(())
}
