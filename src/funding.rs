//! Indirect Funding Resolver.
//!
//! Batch deposits are traced one hop past the aggregator contract to whoever funded it.
//! Exchange sender sets collect every address that ever paid into an exchange's known deposit
//! addresses; they are a weaker signal and only fill labels nothing stronger produced.

use crate::config::known::{
    batch_fund_origin, AGGREGATOR_FALLBACK_ENTITY, DEPOSIT_CONTRACT, DEPOSIT_CONTRACT_GENESIS_BLOCK,
};
use crate::directory::EntityDirectory;
use crate::model::{BlsPubkey, FundingTrace};
use crate::utils::hex::address_param;
use crate::warehouse::queries::{
    convert_rows, BatchFundingRow, SenderRow, BATCH_FUNDING, EXCHANGE_SENDERS,
};
use crate::warehouse::{fetch_typed, QueryExecutor, QueryParams};
use alloy::primitives::Address;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};

pub async fn resolve_batch_funding(
    executor: &dyn QueryExecutor,
    network: &str,
    batch_contracts: &[Address],
) -> crate::Result<Vec<FundingTrace>> {
    if batch_contracts.is_empty() {
        return Ok(Vec::new());
    }
    let params = QueryParams::new()
        .with_str("network", network)
        .with_str("deposit_contract", address_param(&DEPOSIT_CONTRACT))
        .with_str_list("batch_contracts", batch_contracts.iter().map(address_param))
        .with_u64("genesis_block", DEPOSIT_CONTRACT_GENESIS_BLOCK);
    let rows = fetch_typed::<BatchFundingRow>(executor, &BATCH_FUNDING, &params).await?;
    let (nested, dropped) = convert_rows(&rows, BatchFundingRow::to_traces);
    if dropped > 0 {
        tracing::warn!("[FUNDING] dropped {} malformed batch trace rows", dropped);
    }
    let mut traces: Vec<FundingTrace> = nested.into_iter().flatten().collect();
    traces.sort();
    traces.dedup();
    tracing::info!("[FUNDING] {} batch funding traces", traces.len());
    Ok(traces)
}

pub async fn resolve_exchange_senders(
    executor: &dyn QueryExecutor,
    network: &str,
    exchange_addresses: &BTreeSet<Address>,
) -> crate::Result<BTreeSet<Address>> {
    if exchange_addresses.is_empty() {
        return Ok(BTreeSet::new());
    }
    let params = QueryParams::new()
        .with_str("network", network)
        .with_str_list("addresses", exchange_addresses.iter().map(address_param))
        .with_u64("genesis_block", DEPOSIT_CONTRACT_GENESIS_BLOCK);
    let rows = fetch_typed::<SenderRow>(executor, &EXCHANGE_SENDERS, &params).await?;
    let (senders, dropped) = convert_rows(&rows, SenderRow::to_address);
    if dropped > 0 {
        tracing::warn!("[FUNDING] dropped {} malformed sender rows", dropped);
    }
    Ok(senders.into_iter().collect())
}

/// Ultimate funders per deposited pubkey, kept sorted so resolution never depends on row order.
#[derive(Debug, Clone, Default)]
pub struct BatchFundingIndex {
    funders: HashMap<BlsPubkey, Vec<Address>>,
}

impl BatchFundingIndex {
    pub fn new(traces: &[FundingTrace]) -> Self {
        let mut funders: HashMap<BlsPubkey, Vec<Address>> = HashMap::new();
        for trace in traces {
            funders
                .entry(trace.pubkey)
                .or_default()
                .push(trace.ultimate_funder);
        }
        for list in funders.values_mut() {
            list.sort();
            list.dedup();
        }
        Self { funders }
    }

    /// Fixed fund-origin table first, then the directory, then the aggregator's own name.
    /// Returns `None` for a pubkey with no trace.
    pub fn entity_for(&self, pubkey: &BlsPubkey, directory: &EntityDirectory) -> Option<String> {
        let funders = self.funders.get(pubkey)?;
        if let Some((name, _)) = funders.iter().find_map(batch_fund_origin) {
            return Some(name.to_string());
        }
        if let Some(name) = funders.iter().find_map(|f| directory.entity_for(f)) {
            return Some(name.to_string());
        }
        Some(AGGREGATOR_FALLBACK_ENTITY.to_string())
    }
}

/// Sender sets per exchange, in precedence order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSenders {
    pub exchanges: Vec<ExchangeSenderSet>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExchangeSenderSet {
    pub entity: String,
    pub senders: BTreeSet<Address>,
}

impl ExchangeSenders {
    pub fn entity_for(&self, depositor: &Address) -> Option<&str> {
        self.exchanges
            .iter()
            .find(|set| set.senders.contains(depositor))
            .map(|set| set.entity.as_str())
    }

    pub fn sender_count(&self) -> usize {
        self.exchanges.iter().map(|set| set.senders.len()).sum()
    }
}
