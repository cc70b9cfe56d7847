// File: testing-framework/src/scenarios/library/channels.rs
//
// Payment channel scenarios
//
// Every scenario funds `lit0` with one coin, connects it to `lit1` and has
// `lit0` open a channel of `CAPACITY` handing `INITIAL_SEND` to `lit1`.
// Pushes move funds inside the channel without touching the chain, so
// they are checked by polling balances. Closes and breaks are checked after
// the sync barrier.

use anyhow::{bail, ensure, Result};
use log::info;

use super::{fund_wallet, sync_policy};
use crate::environment::TestEnvironment;
use crate::invariants::{check_all_mature, check_conservation, check_settled_and_mature};
use crate::nodes::{BalanceInfo, LitNode};
use crate::rpc_helpers::{assert_channel_height, balance_of, log_balances, wait_for_balance};

/// Fee per byte both nodes use
pub const FEE: i64 = 20;

/// Amount handed to the other side when the channel opens
pub const INITIAL_SEND: i64 = 200_000;

/// Channel capacity
pub const CAPACITY: i64 = 1_000_000;

/// Amount pushed before a close or break
pub const PUSH_SEND: i64 = 250_000;

/// Amount the target pushes back before a round-trip close
pub const PUSH_BACK: i64 = 50_000;

/// What the receiving side gives up to fees when a pushed channel closes
pub const CLOSE_TOLERANCE: i64 = 20_000;

/// Fee of a cooperative close at `FEE` per byte
const CLOSE_FEE: i64 = 3_560;

/// Blocks mined after a close or break before balances are compared
const SETTLE_BLOCKS: u64 = 20;

/// Rounds of 5 blocks a broken channel gets to mature
const MATURITY_ROUNDS: u32 = 30;

struct OpenChannel {
    /// Channel index on the initiator
    chan_idx: u32,
    /// Initiator `TxoTotal` before the channel was funded
    wallet_before: i64,
    /// Balances of initiator and target after the wallet was funded
    snapshot: Vec<BalanceInfo>,
}

/// Connect, fund the initiator, set fees and open a channel confirmed by
/// `confirmations` blocks
async fn open_channel(
    env: &TestEnvironment,
    initiator: &LitNode,
    target: &LitNode,
    confirmations: u64,
) -> Result<OpenChannel> {
    let coin_type = env.coin_type();
    initiator.connect_to_peer(target).await?;

    let wallet_before = fund_wallet(env, initiator).await?;
    let snapshot = vec![
        balance_of(initiator, coin_type).await?,
        balance_of(target, coin_type).await?,
    ];

    initiator.set_fee(FEE, coin_type).await?;
    target.set_fee(FEE, coin_type).await?;
    info!("Fees set to {} (per byte)", FEE);

    let chan_idx = initiator
        .open_channel(target, CAPACITY, INITIAL_SEND, coin_type)
        .await?;
    info!("Created channel {}", chan_idx);

    let height = env.generate_block(confirmations).await?;
    if confirmations == 1 {
        assert_channel_height(initiator, chan_idx, height).await?;
    }

    Ok(OpenChannel {
        chan_idx,
        wallet_before,
        snapshot,
    })
}

/// Index of the most recent open channel as seen by `node`
async fn latest_channel(node: &LitNode) -> Result<u32> {
    let channels = node.channel_list(None).await?;
    match channels.iter().filter(|c| !c.closed).map(|c| c.c_idx).max() {
        Some(idx) => Ok(idx),
        None => bail!("{} has no open channel", node.name()),
    }
}

/// Push `amount` from `from` and wait until both sides reflect it
async fn push_and_wait(
    env: &TestEnvironment,
    from: &LitNode,
    to: &LitNode,
    chan_idx: u32,
    amount: i64,
) -> Result<()> {
    let coin_type = env.coin_type();
    let from_before = balance_of(from, coin_type).await?.chan_total;
    let to_before = balance_of(to, coin_type).await?.chan_total;

    let reply = from.push(chan_idx, amount).await?;
    info!(
        "{} pushed {} through channel {} (state {})",
        from.name(),
        amount,
        chan_idx,
        reply.state_index
    );

    let policy = sync_policy(env, format!("{} never saw the push of {}", from.name(), amount));
    wait_for_balance(from, coin_type, &policy, |b| b.chan_total == from_before - amount).await?;
    let policy = sync_policy(env, format!("{} never saw the push of {}", to.name(), amount));
    wait_for_balance(to, coin_type, &policy, |b| b.chan_total == to_before + amount).await?;
    Ok(())
}

/// The funded channel is confirmed at the tip and holds funds
pub async fn fund(env: &mut TestEnvironment) -> Result<()> {
    let lit1 = env.lit(0)?;
    let lit2 = env.lit(1)?;
    let coin_type = env.coin_type();

    let channel = open_channel(env, lit1, lit2, 1).await?;

    let b = balance_of(lit1, coin_type).await?;
    info!(
        "New {} balance: {} in txos, {} in chans",
        lit1.name(),
        b.txo_total,
        b.chan_total
    );
    info!(
        "Funding diff {}, fee {}",
        channel.wallet_before - b.total(),
        channel.wallet_before - b.total() - INITIAL_SEND
    );
    ensure!(b.chan_total > 0, "channel balance of {} is zero", lit1.name());
    Ok(())
}

/// Pushes in both directions move the initiator's channel balance
pub async fn push(env: &mut TestEnvironment) -> Result<()> {
    let lit1 = env.lit(0)?;
    let lit2 = env.lit(1)?;

    let channel = open_channel(env, lit1, lit2, 1).await?;
    let their_idx = latest_channel(lit2).await?;

    push_and_wait(env, lit1, lit2, channel.chan_idx, 1_000).await?;
    push_and_wait(env, lit1, lit2, channel.chan_idx, 10_000).await?;
    push_and_wait(env, lit2, lit1, their_idx, 5_000).await?;
    push_and_wait(env, lit1, lit2, channel.chan_idx, 250).await?;
    log_balances(env.lits(), env.coin_type()).await
}

/// A cooperative close empties the initiator's channel balance
pub async fn close(env: &mut TestEnvironment) -> Result<()> {
    let lit1 = env.lit(0)?;
    let lit2 = env.lit(1)?;
    let coin_type = env.coin_type();

    let channel = open_channel(env, lit1, lit2, 1).await?;

    info!("Now closing...");
    let reply = lit1.close_channel(channel.chan_idx).await?;
    info!("Status: {}", reply.status);
    env.generate_block(1).await?;

    let b = balance_of(lit1, coin_type).await?;
    let expected = channel.wallet_before - INITIAL_SEND - CLOSE_FEE;
    info!(
        "Final balance {}, expected {} (diff {})",
        b.txo_total,
        expected,
        expected - b.txo_total
    );
    ensure!(b.chan_total == 0, "channel balance of {} is {}", lit1.name(), b.chan_total);
    Ok(())
}

/// Breaking a channel locks the breaker's funds until the dispute window
/// passes
pub async fn break_channel(env: &mut TestEnvironment) -> Result<()> {
    let lit1 = env.lit(0)?;
    let lit2 = env.lit(1)?;
    let coin_type = env.coin_type();

    let channel = open_channel(env, lit1, lit2, 5).await?;

    info!("Now breaking channel...");
    lit1.break_channel(channel.chan_idx).await?;
    env.generate_block(1).await?;

    let b = balance_of(lit1, coin_type).await?;
    info!("After break: {:?}", b);
    ensure!(
        b.immature() > 0,
        "{} has nothing immature right after the break",
        lit1.name()
    );

    env.generate_block(4).await?;
    let mut b = balance_of(lit1, coin_type).await?;
    ensure!(b.chan_total == 0, "channel balance of {} is {}", lit1.name(), b.chan_total);

    for _ in 0..MATURITY_ROUNDS {
        if b.immature() == 0 {
            break;
        }
        env.generate_block(5).await?;
        b = balance_of(lit1, coin_type).await?;
    }
    check_all_mature(&b)
}

/// Push, optionally push `push_back` the other way, then close from
/// `closer` and check the target's payout
async fn run_pushclose(env: &TestEnvironment, closer_idx: usize, push_back: i64) -> Result<()> {
    let initiator = env.lit(0)?;
    let target = env.lit(1)?;
    let closer = env.lit(closer_idx)?;
    let coin_type = env.coin_type();

    let channel = open_channel(env, initiator, target, 1).await?;
    push_and_wait(env, initiator, target, channel.chan_idx, PUSH_SEND).await?;
    let their_idx = latest_channel(target).await?;
    if push_back > 0 {
        push_and_wait(env, target, initiator, their_idx, push_back).await?;
    }

    let chan_idx = if closer_idx == 0 {
        channel.chan_idx
    } else {
        their_idx
    };
    info!("Closing channel... (with {})", closer.name());
    let tt0 = balance_of(target, coin_type).await?.txo_total;
    let reply = closer.close_channel(chan_idx).await?;
    info!("Status: {}", reply.status);
    env.generate_block(SETTLE_BLOCKS).await?;

    check_target_payout(env, target, tt0, PUSH_SEND - push_back).await?;
    check_closed(env, &channel).await
}

/// Push, then break from `breaker`, and check the target's payout
async fn run_pushbreak(env: &TestEnvironment, breaker_idx: usize) -> Result<()> {
    let initiator = env.lit(0)?;
    let target = env.lit(1)?;
    let breaker = env.lit(breaker_idx)?;
    let coin_type = env.coin_type();

    let channel = open_channel(env, initiator, target, 1).await?;
    push_and_wait(env, initiator, target, channel.chan_idx, PUSH_SEND).await?;

    let chan_idx = if breaker_idx == 0 {
        channel.chan_idx
    } else {
        latest_channel(breaker).await?
    };
    info!("Breaking channel... (with {})", breaker.name());
    let tt0 = balance_of(target, coin_type).await?.txo_total;
    breaker.break_channel(chan_idx).await?;
    env.generate_block(SETTLE_BLOCKS).await?;

    check_target_payout(env, target, tt0, PUSH_SEND).await?;
    check_settled(env, &channel).await
}

/// `pushed` is what the initiator pushed to the target net of push-backs
async fn check_target_payout(
    env: &TestEnvironment,
    target: &LitNode,
    tt0: i64,
    pushed: i64,
) -> Result<()> {
    let tt1 = balance_of(target, env.coin_type()).await?.txo_total;
    let expected = tt0 + INITIAL_SEND + pushed - CLOSE_TOLERANCE;
    info!("{}: {} -> {} (expected {})", target.name(), tt0, tt1, expected);
    ensure!(
        tt1 == expected,
        "final balance of {} is {}, expected {}",
        target.name(),
        tt1,
        expected
    );
    Ok(())
}

/// No funds appeared and at most two closes' worth went to fees
async fn check_settled(env: &TestEnvironment, channel: &OpenChannel) -> Result<()> {
    let coin_type = env.coin_type();
    let after = vec![
        balance_of(env.lit(0)?, coin_type).await?,
        balance_of(env.lit(1)?, coin_type).await?,
    ];
    log_balances(env.lits(), coin_type).await?;
    check_conservation(&channel.snapshot, &after, 2 * CLOSE_TOLERANCE)
}

/// A cooperative close leaves nothing immature on either side
async fn check_closed(env: &TestEnvironment, channel: &OpenChannel) -> Result<()> {
    let coin_type = env.coin_type();
    let after = vec![
        balance_of(env.lit(0)?, coin_type).await?,
        balance_of(env.lit(1)?, coin_type).await?,
    ];
    log_balances(env.lits(), coin_type).await?;
    check_settled_and_mature(&channel.snapshot, &after, 2 * CLOSE_TOLERANCE)
}

/// Push, then the target closes
pub async fn pushclose(env: &mut TestEnvironment) -> Result<()> {
    run_pushclose(env, 1, 0).await
}

/// Push, then the initiator closes
pub async fn pushclose_reverse(env: &mut TestEnvironment) -> Result<()> {
    run_pushclose(env, 0, 0).await
}

/// Push, push part of it back, then the initiator closes
pub async fn pushclose_roundtrip(env: &mut TestEnvironment) -> Result<()> {
    run_pushclose(env, 0, PUSH_BACK).await
}

/// Push, then the initiator breaks
pub async fn pushbreak_forward(env: &mut TestEnvironment) -> Result<()> {
    run_pushbreak(env, 0).await
}

/// Push, then the target breaks
pub async fn pushbreak_reverse(env: &mut TestEnvironment) -> Result<()> {
    run_pushbreak(env, 1).await
}
