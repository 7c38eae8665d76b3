//! Deposit Correlator: attaches the funding address of each validator's deposit.

use crate::config::known::{DEPOSIT_CONTRACT, DEPOSIT_CONTRACT_GENESIS_BLOCK};
use crate::model::{BlsPubkey, DepositRecord, ValidatorRecord};
use crate::utils::hex::address_param;
use crate::warehouse::queries::{convert_rows, DepositRow, ValidatorRow, DEPOSITS, VALIDATORS};
use crate::warehouse::{fetch_typed, QueryExecutor, QueryParams};
use alloy::primitives::{Address, B256};
use std::collections::HashMap;

pub async fn fetch_validators(
    executor: &dyn QueryExecutor,
    network: &str,
) -> crate::Result<Vec<ValidatorRecord>> {
    let params = QueryParams::new().with_str("network", network);
    let rows = fetch_typed::<ValidatorRow>(executor, &VALIDATORS, &params).await?;
    let (records, dropped) = convert_rows(&rows, ValidatorRow::to_record);
    if dropped > 0 {
        tracing::warn!("[PIPELINE] dropped {} validator rows with malformed pubkeys", dropped);
    }
    Ok(records)
}

pub async fn fetch_deposits(
    executor: &dyn QueryExecutor,
    network: &str,
) -> crate::Result<Vec<DepositRecord>> {
    let params = QueryParams::new()
        .with_str("network", network)
        .with_str("deposit_contract", address_param(&DEPOSIT_CONTRACT))
        .with_u64("genesis_block", DEPOSIT_CONTRACT_GENESIS_BLOCK);
    let rows = fetch_typed::<DepositRow>(executor, &DEPOSITS, &params).await?;
    let (records, dropped) = convert_rows(&rows, DepositRow::to_record);
    if dropped > 0 {
        tracing::warn!("[PIPELINE] dropped {} malformed deposit rows", dropped);
    }
    Ok(records)
}

/// Left join of `validators` onto `deposits` by pubkey.
///
/// A pubkey with several deposits (top-ups) takes the depositor of its earliest one, ordered
/// by block, then transaction hash, then depositor address. Validators without a deposit keep `depositor_address =
/// None`. The result is ordered by validator index, one record per index.
pub fn correlate(deposits: &[DepositRecord], validators: &[ValidatorRecord]) -> Vec<ValidatorRecord> {
    let mut first_deposit: HashMap<BlsPubkey, (u64, B256, Address)> = HashMap::new();
    for deposit in deposits {
        let candidate = (deposit.block_number, deposit.tx_hash, deposit.depositor_address);
        first_deposit
            .entry(deposit.pubkey)
            .and_modify(|current| {
                if candidate < *current {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }

    let mut out: Vec<ValidatorRecord> = validators
        .iter()
        .map(|validator| {
            let mut record = validator.clone();
            record.depositor_address = first_deposit
                .get(&validator.pubkey)
                .map(|(_, _, depositor)| *depositor);
            record
        })
        .collect();
    out.sort_by_key(|r| r.validator_index);
    out.dedup_by_key(|r| r.validator_index);

    let matched = out.iter().filter(|r| r.depositor_address.is_some()).count();
    tracing::info!(
        "[PIPELINE] correlated {} of {} validators with a deposit",
        matched,
        out.len()
    );
    out
}
