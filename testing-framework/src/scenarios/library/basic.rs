// File: testing-framework/src/scenarios/library/basic.rs
//
// Wallet, fee and peer messaging scenarios

use anyhow::{ensure, Result};
use log::info;

use super::fund_wallet;
use crate::environment::TestEnvironment;
use crate::nodes::coin::sats_to_btc;
use crate::nodes::COIN;
use crate::rpc_helpers::{assert_txo_total, balance_of};

/// Fee per byte set before checking it reads back
pub const FEE: i64 = 20;

/// Amount sent from a payment node, in satoshis
pub const SEND_AMOUNT: i64 = 50_000_000;

/// Message echoed by a successful `PingPeer`
pub const PING_MESSAGE: &str = "Hello, world!";

/// The environment holds exactly the one node it was asked for
pub async fn testlib(env: &mut TestEnvironment) -> Result<()> {
    let count = env.lits().len();
    info!("Found {} lit node(s)", count);
    ensure!(count == 1, "expected 1 lit node, found {}", count);
    Ok(())
}

/// Two nodes connect and exchange chat messages
pub async fn connect(env: &mut TestEnvironment) -> Result<()> {
    let alice = env.lit(0)?;
    let bob = env.lit(1)?;

    info!("Connecting {} to {}", alice.name(), bob.name());
    alice.connect_to_peer(bob).await?;

    alice.say(alice.get_peer_id(bob)?, "hello!").await?;
    info!("{} said hello to {}", alice.name(), bob.name());
    bob.say(bob.get_peer_id(alice)?, "world!").await?;
    info!("{} said hello to {}", bob.name(), alice.name());
    Ok(())
}

/// One coin sent to a fresh address shows up as exactly `COIN` satoshis
pub async fn receive(env: &mut TestEnvironment) -> Result<()> {
    let lit = env.lit(0)?;
    let coin_type = env.coin_type();

    let address = lit.make_new_address(coin_type).await?;
    info!("Got address: {}", address);
    info!("Chain: {}", env.coin().get_blockchain_info().await?);

    env.coin().send_to_address(&address, 1.0).await?;
    env.generate_block(1).await?;
    info!("Sent and mined");

    assert_txo_total(lit, coin_type, COIN).await
}

/// A payment node pays the coin node's wallet
pub async fn send(env: &mut TestEnvironment) -> Result<()> {
    let coin = env.coin();
    let lit = env.lit(0)?;
    let coin_type = env.coin_type();

    let address = lit.make_new_address(coin_type).await?;
    coin.send_to_address(&address, 1.0).await?;
    env.generate_block(5).await?;
    info!("{} balance: {}", lit.name(), balance_of(lit, coin_type).await?.txo_total);

    let coin_address = coin.get_new_address().await?;
    info!("Got {} address: {}", coin.name(), coin_address);
    let balance_before = coin.get_balance().await?;

    let txids = lit.send(&[coin_address.clone()], &[SEND_AMOUNT]).await?;
    info!("Sent {} in {:?}", SEND_AMOUNT, txids);
    env.generate_block(5).await?;

    let balance_after = coin.get_balance().await?;
    info!(
        "{} balance: {} -> {} ({:+})",
        coin.name(),
        balance_before,
        balance_after,
        balance_after - balance_before
    );

    // getbalance also moves with maturing coinbase outputs
    let received = coin.get_received_by_address(&coin_address).await?;
    let expected = sats_to_btc(SEND_AMOUNT);
    ensure!(
        (received - expected).abs() < 1e-8,
        "{} received {} on {}, expected {}",
        coin.name(),
        received,
        coin_address,
        expected
    );
    Ok(())
}

/// One payment node pays another on chain
pub async fn send2(env: &mut TestEnvironment) -> Result<()> {
    let lit1 = env.lit(0)?;
    let lit2 = env.lit(1)?;
    let coin_type = env.coin_type();

    fund_wallet(env, lit1).await?;

    let address = lit2.make_new_address(coin_type).await?;
    info!("Got {} address: {}", lit2.name(), address);
    lit1.send(&[address], &[SEND_AMOUNT]).await?;
    env.generate_block(1).await?;
    info!("Sent and mined again");

    info!("{} balance: {}", lit1.name(), balance_of(lit1, coin_type).await?.txo_total);
    assert_txo_total(lit2, coin_type, SEND_AMOUNT).await
}

/// The fee per byte reads back as set
pub async fn setgetfee(env: &mut TestEnvironment) -> Result<()> {
    let lit = env.lit(0)?;
    let coin_type = env.coin_type();

    info!("Starting fee is {} (per byte)", lit.get_fee(coin_type).await?);
    lit.set_fee(FEE, coin_type).await?;
    let got = lit.get_fee(coin_type).await?;
    info!("Checked fee, got {}", got);
    ensure!(got == FEE, "set fee {} but GetFee returned {}", FEE, got);
    Ok(())
}

/// `PingPeer` echoes a short message
pub async fn peercall_succeed(env: &mut TestEnvironment) -> Result<()> {
    let lit1 = env.lit(0)?;
    let lit2 = env.lit(1)?;

    lit1.connect_to_peer(lit2).await?;
    let reply = lit1.ping_peer(lit1.get_peer_id(lit2)?, PING_MESSAGE).await?;
    ensure!(
        reply.resp == PING_MESSAGE,
        "response '{}' differs from the call message",
        reply.resp
    );
    ensure!(reply.err.is_empty(), "response Err field set: {}", reply.err);
    Ok(())
}

/// `PingPeer` reports an error for an oversized message
pub async fn peercall_fail(env: &mut TestEnvironment) -> Result<()> {
    let lit1 = env.lit(0)?;
    let lit2 = env.lit(1)?;

    lit1.connect_to_peer(lit2).await?;
    let message = "something".repeat(256);
    let reply = lit1.ping_peer(lit1.get_peer_id(lit2)?, &message).await?;
    ensure!(
        !reply.err.is_empty(),
        "oversized message of {} bytes was accepted",
        message.len()
    );
    Ok(())
}
