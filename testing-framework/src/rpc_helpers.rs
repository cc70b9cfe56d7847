//! RPC assertion helpers for scenarios
//!
//! Thin wrappers over the payment node balance and channel RPCs that turn a
//! mismatch into an error naming the node, the field and both values.

use anyhow::{bail, Context, Result};

use crate::nodes::{BalanceInfo, LitNode};
use crate::waiters::{wait_until, WaitPolicy};

/// Fetch the balance entry for `coin_type`, with the node named in the error
pub async fn balance_of(node: &LitNode, coin_type: u32) -> Result<BalanceInfo> {
    node.get_balance_info(coin_type)
        .await
        .with_context(|| format!("Failed to get balance of {}", node.name()))
}

/// Assert that a node holds exactly `expected` in unspent outputs
///
/// # Arguments
///
/// * `node` - Payment node to query
/// * `coin_type` - Coin type of the balance entry
/// * `expected` - Expected `TxoTotal` in satoshis
///
/// # Errors
///
/// Returns an error if:
/// - The Balance RPC fails
/// - No entry exists for `coin_type`
/// - `TxoTotal` differs from `expected`
///
/// # Example
///
/// ```rust,ignore
/// assert_txo_total(env.lit(0)?, REGTEST_COINTYPE, 100_000_000).await?;
/// ```
pub async fn assert_txo_total(node: &LitNode, coin_type: u32, expected: i64) -> Result<()> {
    let actual = balance_of(node, coin_type).await?.txo_total;
    if actual != expected {
        bail!(
            "TxoTotal mismatch on {}: expected {}, got {}",
            node.name(),
            expected,
            actual
        );
    }
    Ok(())
}

/// Assert that a node's channel funds equal `expected`
///
/// # Errors
///
/// Returns an error if the RPC fails or `ChanTotal` differs.
pub async fn assert_chan_total(node: &LitNode, coin_type: u32, expected: i64) -> Result<()> {
    let actual = balance_of(node, coin_type).await?.chan_total;
    if actual != expected {
        bail!(
            "ChanTotal mismatch on {}: expected {}, got {}",
            node.name(),
            expected,
            actual
        );
    }
    Ok(())
}

/// Assert that channel `chan_idx` confirmed at `height`
///
/// # Example
///
/// ```rust,ignore
/// let height = env.generate_block(1).await?;
/// assert_channel_height(lit1, chan_idx, height).await?;
/// ```
pub async fn assert_channel_height(node: &LitNode, chan_idx: u32, height: u64) -> Result<()> {
    let channels = node
        .channel_list(Some(chan_idx))
        .await
        .with_context(|| format!("Failed to list channel {} on {}", chan_idx, node.name()))?;
    let Some(channel) = channels.first() else {
        bail!("{} reports no channel {}", node.name(), chan_idx);
    };
    if u64::try_from(channel.height).ok() != Some(height) {
        bail!(
            "Channel {} on {} confirmed at {}, expected {}",
            chan_idx,
            node.name(),
            channel.height,
            height
        );
    }
    Ok(())
}

/// Poll until the node's balance satisfies `check`
///
/// For effects that are not tied to a block (pushes, peer-to-peer
/// messages), where the sync barrier does not help.
///
/// # Example
///
/// ```rust,ignore
/// wait_for_balance(lit2, 257, &policy, |b| b.chan_total == before + 250_000).await?;
/// ```
pub async fn wait_for_balance<F>(
    node: &LitNode,
    coin_type: u32,
    policy: &WaitPolicy,
    check: F,
) -> Result<BalanceInfo>
where
    F: Fn(&BalanceInfo) -> bool + Sync,
{
    let check = &check;
    wait_until(
        || async move { Ok(check(&node.get_balance_info(coin_type).await?)) },
        policy,
    )
    .await
    .with_context(|| format!("Balance of {} never reached the expected state", node.name()))?;
    balance_of(node, coin_type).await
}

/// Log `MatureWitty/TxoTotal/ChanTotal` of every node on one line
pub async fn log_balances(nodes: &[LitNode], coin_type: u32) -> Result<()> {
    let mut line = String::from("Balances:");
    for node in nodes {
        let b = balance_of(node, coin_type).await?;
        line.push_str(&format!(
            " {}: {}/{}/{}",
            node.name(),
            b.mature_witty,
            b.txo_total,
            b.chan_total
        ));
    }
    log::info!("{}", line);
    Ok(())
}
