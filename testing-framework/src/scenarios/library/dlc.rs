// File: testing-framework/src/scenarios/library/dlc.rs
//
// Discreet log contract scenarios
//
// `lit0` builds a contract against one or more oracles, offers it to `lit1`,
// and one side settles it once the oracles publish. Final balances are
// predicted from the contract division and the per-transaction fees each
// case lists.

use std::time::Duration;

use anyhow::{anyhow, ensure, Result};
use log::info;

use super::wait_for_total;
use crate::environment::TestEnvironment;
use crate::error::HarnessError;
use crate::nodes::coin::btc_to_sats;
use crate::nodes::{FraudEvidence, LitNode};
use crate::waiters::{wait_until, WaitPolicy};

/// Virtual size of the contract funding transaction share each side pays for
const FUNDING_VSIZE_SHARE: i64 = 126;

/// Virtual size share of a refund or negotiated payout each side pays for
const PAYOUT_VSIZE_SHARE: i64 = 169;

/// Fee of sweeping a refunded wallet in one transaction
const SWEEP_FEE: i64 = 16_160;

/// Oracle value both sides settle on when a negotiation is accepted
const NEGOTIATED_VALUE: u64 = 11;

/// Seconds between settlement time and now when the contract is built
const SETTLEMENT_DELAY_SECS: u64 = 3;

/// Oracle publishing interval, in seconds
const ORACLE_INTERVAL_SECS: u64 = 1;

/// One contract case
#[derive(Debug, Clone, Copy)]
struct ContractCase {
    /// Coins sent to each payment node
    lit_funding_btc: f64,
    /// Satoshis each side puts into the contract
    contract_funding: i64,
    oracles: usize,
    oracle_value: u64,
    /// Payment node that settles (0 or 1)
    node_to_settle: usize,
    value_fully_ours: i64,
    value_fully_theirs: i64,
    fee_per_byte: u32,
    settle_fee_ours: i64,
    settle_fee_theirs: i64,
    claim_fee_ours: i64,
    claim_fee_theirs: i64,
}

impl ContractCase {
    fn new(oracles: usize, oracle_value: u64, node_to_settle: usize) -> Self {
        Self {
            lit_funding_btc: 1.0,
            contract_funding: 10_000_000,
            oracles,
            oracle_value,
            node_to_settle,
            value_fully_ours: 10,
            value_fully_theirs: 20,
            fee_per_byte: 80,
            settle_fee_ours: 7_200,
            settle_fee_theirs: 7_200,
            claim_fee_ours: 121 * 80,
            claim_fee_theirs: 110 * 80,
        }
    }

    fn fee(&self) -> i64 {
        i64::from(self.fee_per_byte)
    }

    fn division(mut self, ours: i64, theirs: i64) -> Self {
        self.value_fully_ours = ours;
        self.value_fully_theirs = theirs;
        self
    }

    fn fees(mut self, settle: (i64, i64), claim: (i64, i64)) -> Self {
        self.settle_fee_ours = settle.0;
        self.settle_fee_theirs = settle.1;
        self.claim_fee_ours = claim.0;
        self.claim_fee_theirs = claim.1;
        self
    }
}

/// Index of the newest contract `node` knows about, once one shows up
async fn wait_for_contract(env: &TestEnvironment, node: &LitNode) -> Result<u64> {
    let policy = super::sync_policy(env, format!("{} never received the offer", node.name()));
    wait_until(
        || async move { Ok(!node.list_contracts().await?.is_empty()) },
        &policy,
    )
    .await?;
    node.list_contracts()
        .await?
        .iter()
        .map(|c| c.idx)
        .max()
        .ok_or_else(|| anyhow!("{} lists no contract", node.name()))
}

/// A contract both sides have funded
struct Established {
    /// Contract index on `lit0`
    cidx: u64,
    /// Contract index on `lit1`
    their_cidx: u64,
    /// Hex R points, one per oracle
    rpoints: Vec<String>,
    /// Each side's wallet total once the funding transaction confirmed
    after_accept: i64,
}

/// Fund both nodes, build the contract on `lit0`, offer it to `lit1` and
/// wait until the accepted funding transaction has confirmed
async fn establish(env: &mut TestEnvironment, case: ContractCase) -> Result<Established> {
    for _ in 0..case.oracles {
        env.new_oracle(ORACLE_INTERVAL_SECS, case.oracle_value).await?;
    }
    let env: &TestEnvironment = env;
    let lit1 = env.lit(0)?;
    let lit2 = env.lit(1)?;
    let coin_type = env.coin_type();

    lit1.connect_to_peer(lit2).await?;
    info!("Connected {} to {}", lit1.name(), lit2.name());

    for lit in [lit1, lit2] {
        let address = lit.make_new_address(coin_type).await?;
        let txid = env
            .coin()
            .send_to_address(&address, case.lit_funding_btc)
            .await?;
        info!("Funding {} in {}", lit.name(), txid);
    }
    env.generate_block(1).await?;

    let lit_funding = btc_to_sats(case.lit_funding_btc);
    wait_for_total(env, lit1, lit_funding).await?;
    wait_for_total(env, lit2, lit_funding).await?;

    // oracles
    let mut oracle_idxs = Vec::with_capacity(case.oracles);
    let mut datasources = Vec::with_capacity(case.oracles);
    for oracle in env.oracles() {
        let key = oracle.get_pubkey().await?.a;
        oracle_idxs.push(lit1.add_oracle(&key, &key).await?.idx);
        lit2.add_oracle(&key, &key).await?;
        let sources = oracle.get_datasources().await?;
        let first = sources
            .first()
            .ok_or_else(|| anyhow!("{} has no datasources", oracle.name()))?;
        datasources.push(first.id);
    }
    let known = lit1.list_oracles().await?;
    ensure!(
        known.len() == case.oracles,
        "{} lists {} oracle(s), expected {}",
        lit1.name(),
        known.len(),
        case.oracles
    );

    // contract
    let cidx = lit1.new_contract().await?.idx;
    let listed = lit1.list_contracts().await?;
    ensure!(listed.len() == 1, "ListContracts returned {} contracts", listed.len());
    let contract = lit1.get_contract(cidx).await?;
    ensure!(contract.idx == cidx, "GetContract({}) returned {}", cidx, contract.idx);

    lit1.set_contract_oracles_number(cidx, u32::try_from(case.oracles)?)
        .await?;
    lit1.set_contract_oracle(cidx, &oracle_idxs).await?;

    let now = u64::try_from(chrono::Utc::now().timestamp())?;
    let settlement_time = now + SETTLEMENT_DELAY_SECS;
    lit1.set_contract_settlement_time(cidx, settlement_time).await?;
    // refund at settlement time, so the refund transaction is valid too
    lit1.set_contract_refund_time(cidx, settlement_time).await?;
    let listed = lit1.list_contracts().await?;
    let timestamp = listed
        .iter()
        .find(|c| c.idx == cidx)
        .map(|c| c.oracle_timestamp);
    ensure!(
        timestamp == Some(settlement_time),
        "OracleTimestamp {:?} does not match settlement time {}",
        timestamp,
        settlement_time
    );

    let mut rpoints = Vec::with_capacity(case.oracles);
    let mut rpoint_bytes = Vec::with_capacity(case.oracles);
    for (oracle, datasource) in env.oracles().iter().zip(&datasources) {
        let rpoint = oracle.get_rpoint(*datasource, settlement_time).await?;
        rpoint_bytes.push(rpoint.bytes()?);
        rpoints.push(rpoint.r);
    }
    lit1.set_contract_rpoint(cidx, &rpoint_bytes).await?;

    lit1.set_contract_coin_type(cidx, coin_type).await?;
    let got = lit1.get_contract(cidx).await?.coin_type;
    ensure!(got == coin_type, "contract coin type is {}, expected {}", got, coin_type);

    lit1.set_contract_fee_per_byte(cidx, case.fee_per_byte).await?;
    let got = lit1.get_contract(cidx).await?.fee_per_byte;
    ensure!(
        got == case.fee_per_byte,
        "contract fee per byte is {}, expected {}",
        got,
        case.fee_per_byte
    );

    lit1.set_contract_funding(cidx, case.contract_funding, case.contract_funding)
        .await?;
    let contract = lit1.get_contract(cidx).await?;
    ensure!(
        contract.our_funding_amount == case.contract_funding
            && contract.their_funding_amount == case.contract_funding,
        "contract funding is {}/{}, expected {} each",
        contract.our_funding_amount,
        contract.their_funding_amount,
        case.contract_funding
    );

    lit1.set_contract_division(cidx, case.value_fully_ours, case.value_fully_theirs)
        .await?;

    // offer and accept
    lit1.offer_contract(cidx, lit1.get_peer_id(lit2)?).await?;
    let their_cidx = wait_for_contract(env, lit2).await?;
    lit2.contract_respond(their_cidx, true).await?;
    env.wait_for_mempool(1).await?;
    env.generate_block(1).await?;

    let after_accept = lit_funding - case.contract_funding - FUNDING_VSIZE_SHARE * case.fee();
    info!("Contract accepted, expecting {} on each side", after_accept);
    wait_for_total(env, lit1, after_accept).await?;
    wait_for_total(env, lit2, after_accept).await?;

    Ok(Established {
        cidx,
        their_cidx,
        rpoints,
        after_accept,
    })
}

/// Wait until every oracle signed its R point, then return the common
/// value and the signatures in oracle order
async fn await_publications(env: &TestEnvironment, rpoints: &[String]) -> Result<(u64, Vec<Vec<u8>>)> {
    let oracles = env.oracles();
    let policy = WaitPolicy::with_attempts(5)
        .interval(Duration::from_secs(5))
        .message("oracles never published");
    wait_until(
        || async move {
            for (oracle, rpoint) in oracles.iter().zip(rpoints) {
                match oracle.get_publication(rpoint).await {
                    Ok(_) => {}
                    // not signed yet
                    Err(HarnessError::RemoteError { .. }) => return Ok(false),
                    Err(e) => return Err(e),
                }
            }
            Ok(true)
        },
        &policy,
    )
    .await?;

    let mut values = Vec::with_capacity(rpoints.len());
    let mut signatures = Vec::with_capacity(rpoints.len());
    for (oracle, rpoint) in oracles.iter().zip(rpoints) {
        let publication = oracle.get_publication(rpoint).await?;
        signatures.push(publication.signature_bytes()?);
        values.push(publication.value);
    }
    let value = *values
        .first()
        .ok_or_else(|| anyhow!("no oracle publications"))?;
    ensure!(
        values.iter().all(|v| *v == value),
        "oracles published different values: {:?}",
        values
    );
    Ok((value, signatures))
}

async fn run_case(env: &mut TestEnvironment, case: ContractCase) -> Result<()> {
    let contract = establish(env, case).await?;
    let env: &TestEnvironment = env;
    let lit1 = env.lit(0)?;
    let lit2 = env.lit(1)?;

    let (value, signatures) = await_publications(env, &contract.rpoints).await?;

    // settle
    let (settler, settler_cidx) = if case.node_to_settle == 0 {
        (lit1, contract.cidx)
    } else {
        (lit2, contract.their_cidx)
    };
    settler.settle_contract(settler_cidx, value, &signatures).await?;
    info!("{} settled with oracle value {}", settler.name(), value);
    for _ in 0..3 {
        env.generate_block(1).await?;
    }

    let value_ours = settler.get_contract_division(settler_cidx, value).await?;
    let value_theirs = case.contract_funding * 2 - value_ours;
    info!("valueOurs: {}; valueTheirs: {}", value_ours, value_theirs);

    let ours_result =
        value_ours - case.settle_fee_ours - case.claim_fee_ours + contract.after_accept;
    let theirs_result =
        value_theirs - case.settle_fee_theirs - case.claim_fee_theirs + contract.after_accept;
    let (lit1_expected, lit2_expected) = if case.node_to_settle == 0 {
        (ours_result, theirs_result)
    } else {
        (theirs_result, ours_result)
    };
    info!("Expecting {} on {} and {} on {}", lit1_expected, lit1.name(), lit2_expected, lit2.name());

    wait_for_total(env, lit1, lit1_expected).await?;
    wait_for_total(env, lit2, lit2_expected).await
}

/// Refund from `node_to_refund` once the refund time passed, then sweep
/// `lit0`'s wallet into `lit1`
async fn run_refund(env: &mut TestEnvironment, node_to_refund: usize) -> Result<()> {
    let case = ContractCase::new(1, 10, node_to_refund);
    let contract = establish(env, case).await?;
    let env: &TestEnvironment = env;
    let lit1 = env.lit(0)?;
    let lit2 = env.lit(1)?;
    let coin_type = env.coin_type();

    // refund time equals settlement time, which has passed once the oracle signed
    await_publications(env, &contract.rpoints).await?;

    let (refunder, refund_cidx) = if node_to_refund == 0 {
        (lit1, contract.cidx)
    } else {
        (lit2, contract.their_cidx)
    };
    refunder.refund_contract(refund_cidx).await?;
    info!("{} refunded contract {}", refunder.name(), refund_cidx);
    env.wait_for_mempool(1).await?;
    env.generate_block(1).await?;
    env.generate_block(1).await?;

    let after_refund = contract.after_accept + case.contract_funding - PAYOUT_VSIZE_SHARE * case.fee();
    wait_for_total(env, lit1, after_refund).await?;
    wait_for_total(env, lit2, after_refund).await?;

    // refunded outputs are spendable
    let address = lit2.make_new_address(coin_type).await?;
    let amount = after_refund - SWEEP_FEE;
    let txids = lit1.send(&[address.clone()], &[amount]).await?;
    info!("{} sent {} to {} in {:?}", lit1.name(), amount, address, txids);
    env.wait_for_mempool(1).await?;
    env.generate_block(1).await?;

    wait_for_total(env, lit1, 0).await?;
    wait_for_total(env, lit2, after_refund + amount).await
}

/// `lit0` proposes settling at `NEGOTIATED_VALUE` before the oracles
/// publish; `lit1` accepts or declines
async fn run_negotiation(env: &mut TestEnvironment, oracle_value: u64, accept: bool) -> Result<()> {
    let case = ContractCase::new(3, oracle_value, 0);
    let contract = establish(env, case).await?;
    let env: &TestEnvironment = env;
    let lit1 = env.lit(0)?;
    let lit2 = env.lit(1)?;

    let value_ours = lit1
        .get_contract_division(contract.cidx, NEGOTIATED_VALUE)
        .await?;
    lit1.negotiate_contract(contract.cidx, i64::try_from(NEGOTIATED_VALUE)?)
        .await?;
    info!(
        "{} proposed settling at {} ({} for itself)",
        lit1.name(),
        NEGOTIATED_VALUE,
        value_ours
    );

    // the respond call is refused until the proposal reached lit1's peer
    let their_cidx = contract.their_cidx;
    let policy = super::sync_policy(env, format!("{} never received the proposal", lit2.name()));
    wait_until(
        || async move {
            match lit2.negotiate_contract_respond(their_cidx, accept).await {
                Ok(()) => Ok(true),
                Err(HarnessError::RemoteError { .. }) => Ok(false),
                Err(e) => Err(e),
            }
        },
        &policy,
    )
    .await?;
    info!("{} {} the proposal", lit2.name(), if accept { "accepted" } else { "declined" });

    let (lit1_expected, lit2_expected) = if accept {
        env.wait_for_mempool(1).await?;
        let payout_fee = PAYOUT_VSIZE_SHARE * case.fee();
        (
            contract.after_accept + value_ours - payout_fee,
            contract.after_accept + case.contract_funding * 2 - value_ours - payout_fee,
        )
    } else {
        (contract.after_accept, contract.after_accept)
    };
    env.generate_block(1).await?;

    wait_for_total(env, lit1, lit1_expected).await?;
    wait_for_total(env, lit2, lit2_expected).await
}

/// One oracle, value 11, settled by `lit0`
pub async fn t_11_0(env: &mut TestEnvironment) -> Result<()> {
    run_case(env, ContractCase::new(1, 11, 0)).await
}

/// Three oracles, value 1300, settled by `lit1`
pub async fn t_1300_1(env: &mut TestEnvironment) -> Result<()> {
    run_case(env, ContractCase::new(3, 1300, 1).division(1000, 2000)).await
}

/// Value at the fully-ours end, settled by `lit0`
pub async fn t_10_0(env: &mut TestEnvironment) -> Result<()> {
    let case = ContractCase::new(3, 10, 0).fees((150 * 80, 0), (121 * 80, 0));
    run_case(env, case).await
}

/// Value at the fully-ours end, settled by `lit1`
pub async fn t_10_1(env: &mut TestEnvironment) -> Result<()> {
    let case = ContractCase::new(3, 10, 1).fees((0, 137 * 80), (0, 110 * 80));
    run_case(env, case).await
}

/// Value at the fully-theirs end, settled by `lit0`
pub async fn t_20_0(env: &mut TestEnvironment) -> Result<()> {
    let case = ContractCase::new(3, 20, 0).fees((0, 137 * 80), (0, 110 * 80));
    run_case(env, case).await
}

/// Value at the fully-theirs end, settled by `lit1`
pub async fn t_20_1(env: &mut TestEnvironment) -> Result<()> {
    let case = ContractCase::new(3, 20, 1).fees((150 * 80, 0), (121 * 80, 0));
    run_case(env, case).await
}

/// `lit0` takes the refund path
pub async fn dlcrefund_forward(env: &mut TestEnvironment) -> Result<()> {
    run_refund(env, 0).await
}

/// `lit1` takes the refund path
pub async fn dlcrefund_reverse(env: &mut TestEnvironment) -> Result<()> {
    run_refund(env, 1).await
}

/// Oracles would publish 20; both sides settle early at 11
pub async fn negotiate_accept(env: &mut TestEnvironment) -> Result<()> {
    run_negotiation(env, 20, true).await
}

/// A declined proposal leaves the contract and both wallets untouched
pub async fn negotiate_decline(env: &mut TestEnvironment) -> Result<()> {
    run_negotiation(env, 11, false).await
}

/// Two signatures over one R point expose the oracle's private key
pub async fn checkoraclefraud(env: &mut TestEnvironment) -> Result<()> {
    let lit = env.lit(0)?;
    let evidence = FraudEvidence {
        sfirst: "424b62134ec5ff7f8ff25de43917a03582e253283575b8f815d26bbdc27d17f8".to_string(),
        hfirst: "9bd6e409476804596c2793eb722fd23479f2a1a8a439e8cb47faed68dc660535".to_string(),
        ssecond: "4a61ef074997f0f0039c71e9dd91d15263c6f98bc54034336491d5e8a5445f4c".to_string(),
        hsecond: "dc2b6ce71bb4099ca53c70eadcd1d9d4be46b65c1e0b540528e619fd236ae09a".to_string(),
        rpoint: "02f8460e855b091cec11ccf4a85064d4a8a7d3a2970b957a2165564b537d510bb4".to_string(),
        apoint: "029bc17aed9a0a5821b5b0425d8260d66f0529eb357a0b036765d68904152f618a".to_string(),
    };
    let fraud = lit.different_results_fraud(&evidence).await?;
    info!("Oracle published two different results: {}", fraud);
    ensure!(fraud, "two signatures over one R point were not flagged as fraud");
    Ok(())
}
