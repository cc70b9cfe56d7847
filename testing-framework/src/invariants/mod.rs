//! Balance invariant checkers
//!
//! Checks that hold for payment node balances whatever the scenario did:
//! - Conservation: funds only leave through fees, bounded by a tolerance
//! - Maturity: once enough blocks passed, nothing is left immature
//! - Settlement: both of the above for every node after a close

use anyhow::{bail, ensure, Context, Result};

use crate::nodes::BalanceInfo;

/// Check that total funds did not grow and shrank by at most `fees_tolerance`
///
/// `before` and `after` hold one balance entry per node, in the same order.
///
/// # Errors
///
/// Returns an error if:
/// - The snapshots cover a different number of nodes
/// - Funds were created
/// - More than `fees_tolerance` went missing
///
/// # Example
///
/// ```rust,ignore
/// let before = vec![lit0.get_balance_info(257).await?, lit1.get_balance_info(257).await?];
/// // ... fund, push, close ...
/// let after = vec![lit0.get_balance_info(257).await?, lit1.get_balance_info(257).await?];
/// check_conservation(&before, &after, 20_000)?;
/// ```
pub fn check_conservation(
    before: &[BalanceInfo],
    after: &[BalanceInfo],
    fees_tolerance: i64,
) -> Result<()> {
    ensure!(
        before.len() == after.len(),
        "balance snapshots cover {} and {} nodes",
        before.len(),
        after.len()
    );

    let total_before: i64 = before.iter().map(BalanceInfo::total).sum();
    let total_after: i64 = after.iter().map(BalanceInfo::total).sum();

    if total_after > total_before {
        bail!(
            "funds created: total went from {} to {}",
            total_before,
            total_after
        );
    }
    let spent = total_before - total_after;
    if spent > fees_tolerance {
        bail!(
            "funds lost: total went from {} to {} ({} spent, tolerance {})",
            total_before,
            total_after,
            spent,
            fees_tolerance
        );
    }
    Ok(())
}

/// Check that no funds are waiting for confirmations (`TxoTotal == MatureWitty`)
pub fn check_all_mature(balance: &BalanceInfo) -> Result<()> {
    if balance.txo_total != balance.mature_witty {
        bail!(
            "{} of {} still immature (MatureWitty {})",
            balance.immature(),
            balance.txo_total,
            balance.mature_witty
        );
    }
    Ok(())
}

/// Check conservation across a settled close, and that every node's
/// payout has matured
///
/// # Errors
///
/// Returns the conservation error first, otherwise the first node (by
/// position in `after`) still holding immature funds.
pub fn check_settled_and_mature(
    before: &[BalanceInfo],
    after: &[BalanceInfo],
    fees_tolerance: i64,
) -> Result<()> {
    check_conservation(before, after, fees_tolerance)?;
    for (idx, balance) in after.iter().enumerate() {
        check_all_mature(balance).with_context(|| format!("node {} after settlement", idx))?;
    }
    Ok(())
}
