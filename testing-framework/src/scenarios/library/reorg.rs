// File: testing-framework/src/scenarios/library/reorg.rs
//
// Chain reorganisation
//
// The coin node rewinds the chain below a block the payment node already
// processed. The payment node keeps its height until the replacement chain
// grows past it, then follows the new tip without losing confirmed funds.

use anyhow::{ensure, Result};
use log::info;

use super::{fund_wallet, wait_for_total};
use crate::environment::TestEnvironment;

/// Blocks mined on top of the funding block before the rewind
const BLOCKS_BEFORE_REORG: u64 = 10;

/// Depth below the tip of the first block invalidated
const REORG_DEPTH: u64 = 9;

/// Blocks the replacement chain needs to overtake the old tip
const REPLACEMENT_BLOCKS: u64 = 11;

/// Height the payment node reports, as an unsigned height
async fn sync_height(env: &TestEnvironment) -> Result<u64> {
    Ok(u64::try_from(env.lit(0)?.get_sync_height().await?)?)
}

/// Rewind ten blocks under a restarted node and let a longer chain replace them
pub async fn run_test(env: &mut TestEnvironment) -> Result<()> {
    let funded = {
        let env: &TestEnvironment = env;
        let lit = env.lit(0)?;
        let funded = fund_wallet(env, lit).await?;
        env.generate_block(BLOCKS_BEFORE_REORG).await?;
        funded
    };

    let tip = env.get_height().await?;
    let target = env.coin().get_block_hash(tip - REORG_DEPTH).await?;
    info!("Tip {}, invalidating {} at height {}", tip, target, tip - REORG_DEPTH);

    env.restart_lit(0).await?;
    let env: &TestEnvironment = env;
    env.coin().invalidate_block(&target).await?;

    let rewound = env.get_height().await?;
    ensure!(
        rewound == tip - REORG_DEPTH - 1,
        "coin node is at {} after invalidating height {}",
        rewound,
        tip - REORG_DEPTH
    );
    let height = sync_height(env).await?;
    ensure!(height == tip, "payment node went from {} to {} on a shorter chain", tip, height);

    // one block is still less work than the old chain
    env.coin().generate(1).await?;
    let height = sync_height(env).await?;
    ensure!(height == tip, "payment node moved to {} on a shorter chain", height);

    env.coin().generate(REPLACEMENT_BLOCKS).await?;
    let new_tip = env.generate_block(0).await?;
    info!("Payment node followed the replacement chain to {}", new_tip);
    ensure!(new_tip > tip, "replacement chain tip {} is not above {}", new_tip, tip);

    // the funding block sits below the rewind
    wait_for_total(env, env.lit(0)?, funded).await
}
