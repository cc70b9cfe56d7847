// File: testing-framework/src/scenarios/library/reconnect.rs
//
// Peer identity across restarts
//
// A node keeps the peer index it assigned to a remote identity when it
// restarts, whichever order it reconnects in.

use anyhow::{ensure, Result};
use log::info;

use super::sync_policy;
use crate::environment::TestEnvironment;
use crate::waiters::wait_until;

/// Connect `from` to `to` and return the index `from` assigned
async fn connect_and_get_id(env: &TestEnvironment, from: usize, to: usize) -> Result<u32> {
    let a = env.lit(from)?;
    let b = env.lit(to)?;
    info!("Connecting {} to {}", a.name(), b.name());
    a.connect_to_peer(b).await?;
    Ok(a.get_peer_id(b)?)
}

/// Reconnect after a restart and get the same index back
pub async fn run_test(env: &mut TestEnvironment) -> Result<()> {
    let lit1 = env.new_lit_node().await?;
    let lit2 = env.new_lit_node().await?;

    let before = connect_and_get_id(env, lit1, lit2).await?;

    info!("Restarting {}", env.lit(lit1)?.name());
    env.restart_lit(lit1).await?;

    let after = connect_and_get_id(env, lit1, lit2).await?;
    info!("Peer index {} -> {}", before, after);
    ensure!(
        before == after,
        "peer index on {} changed across restart: {} -> {}",
        env.lit(lit1)?.name(),
        before,
        after
    );
    Ok(())
}

/// Reconnect in the opposite order and get the same indices back
pub async fn run_test_unordered(env: &mut TestEnvironment) -> Result<()> {
    let lit1 = env.new_lit_node().await?;
    let lit2 = env.new_lit_node().await?;
    let lit3 = env.new_lit_node().await?;

    info!("Connecting nodes... (2 then 3)");
    let l2_before = connect_and_get_id(env, lit1, lit2).await?;
    let l3_before = connect_and_get_id(env, lit1, lit3).await?;

    env.restart_lit(lit1).await?;
    env.resync_lit(lit1).await?;

    info!("Connecting nodes again... (3 then 2)");
    let l3_after = connect_and_get_id(env, lit1, lit3).await?;
    let l2_after = connect_and_get_id(env, lit1, lit2).await?;

    info!("Node 2: {} -> {}", l2_before, l2_after);
    info!("Node 3: {} -> {}", l3_before, l3_after);
    ensure!(
        l2_before == l2_after,
        "peer index of node 2 changed across restart: {} -> {}",
        l2_before,
        l2_after
    );
    ensure!(
        l3_before == l3_after,
        "peer index of node 3 changed across restart: {} -> {}",
        l3_before,
        l3_after
    );
    Ok(())
}

/// A restarted node reconnects to its peers on its own
pub async fn autoreconn(env: &mut TestEnvironment) -> Result<()> {
    let before = connect_and_get_id(env, 0, 1).await?;
    info!("Peer ID: {}", before);

    info!("Shutting down and restarting...");
    env.restart_lit(0).await?;

    let lit1 = env.lit(0)?;
    let lit2 = env.lit(1)?;
    let address = lit2.lit_adr()?;
    let policy = sync_policy(env, format!("{} never reconnected to {}", lit1.name(), address));
    wait_until(
        || async move { Ok(lit1.update_peers().await?.contains(address)) },
        &policy,
    )
    .await?;

    let after = lit1.get_peer_id(lit2)?;
    ensure!(
        before == after,
        "peer index changed across restart: {} -> {}",
        before,
        after
    );
    Ok(())
}
