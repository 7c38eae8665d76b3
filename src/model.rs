//! Records shared by every stage of a labelling cycle.

use alloy::primitives::{Address, Bytes, FixedBytes, B256};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// 48-byte BLS public key identifying a validator.
pub type BlsPubkey = FixedBytes<48>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitType {
    Voluntary,
    AttesterSlashing,
    ProposerSlashing,
}

impl ExitType {
    pub fn as_str(self) -> &'static str {
        match self {
            ExitType::Voluntary => "voluntary",
            ExitType::AttesterSlashing => "attester_slashing",
            ExitType::ProposerSlashing => "proposer_slashing",
        }
    }
}

/// Which assignment step produced a validator's current label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelSource {
    Directory,
    ContractTable,
    BatchFunding,
    ExchangeSender,
    OperatorRefinement,
}

impl LabelSource {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelSource::Directory => "directory",
            LabelSource::ContractTable => "contract_table",
            LabelSource::BatchFunding => "batch_funding",
            LabelSource::ExchangeSender => "exchange_sender",
            LabelSource::OperatorRefinement => "operator_refinement",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorRecord {
    pub validator_index: u64,
    pub pubkey: BlsPubkey,
    pub depositor_address: Option<Address>,
    pub entity: Option<String>,
    #[serde(default)]
    pub label_source: Option<LabelSource>,
    pub exited: bool,
    pub exit_type: Option<ExitType>,
    pub exit_epoch: Option<u64>,
}

impl ValidatorRecord {
    pub fn new(validator_index: u64, pubkey: BlsPubkey) -> Self {
        Self {
            validator_index,
            pubkey,
            depositor_address: None,
            entity: None,
            label_source: None,
            exited: false,
            exit_type: None,
            exit_epoch: None,
        }
    }

    pub fn is_labeled(&self) -> bool {
        self.entity.as_deref().is_some_and(|e| !e.is_empty())
    }

    /// Sets the label only when none is present. Returns whether it was applied.
    pub fn label_if_empty(&mut self, entity: &str, source: LabelSource) -> bool {
        if self.is_labeled() {
            return false;
        }
        self.entity = Some(entity.to_string());
        self.label_source = Some(source);
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EntityCategory {
    #[serde(rename = "CEX")]
    Cex,
    LiquidStaking,
    StakingPool,
    Institution,
    Other,
}

impl EntityCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            EntityCategory::Cex => "CEX",
            EntityCategory::LiquidStaking => "Liquid Staking",
            EntityCategory::StakingPool => "Staking Pool",
            EntityCategory::Institution => "Institution",
            EntityCategory::Other => "Other",
        }
    }

    /// Parses a registry category column. Unknown or empty values return `None`.
    pub fn parse(raw: &str) -> Option<Self> {
        let normalized: String = raw
            .trim()
            .to_ascii_lowercase()
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect();
        match normalized.as_str() {
            "cex" | "exchange" | "centralizedexchange" => Some(Self::Cex),
            "liquidstaking" | "lst" | "liquidrestaking" => Some(Self::LiquidStaking),
            "stakingpool" | "stakingpools" | "pool" => Some(Self::StakingPool),
            "institution" | "institutional" | "custodian" => Some(Self::Institution),
            "other" => Some(Self::Other),
            _ => None,
        }
    }

    /// Name-based fallback used when a registry row carries no usable category.
    pub fn from_entity_name(name: &str) -> Self {
        let lower = name.to_ascii_lowercase();
        const LIQUID: &[&str] = &["liquid", "staked", "rocket", "lido", "stader"];
        const EXCHANGES: &[&str] = &[
            "binance", "coinbase", "kraken", "huobi", "okx", "gemini", "bitpanda",
        ];
        if LIQUID.iter().any(|needle| lower.contains(needle)) {
            Self::LiquidStaking
        } else if EXCHANGES.iter().any(|needle| lower.contains(needle)) {
            Self::Cex
        } else if lower.contains("pool") {
            Self::StakingPool
        } else {
            Self::Other
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDefinition {
    pub name: String,
    pub category: EntityCategory,
    pub addresses: BTreeSet<Address>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub pubkey: BlsPubkey,
    pub depositor_address: Address,
    pub amount: u64,
    pub block_number: u64,
    pub tx_hash: B256,
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FundingTrace {
    pub tx_hash: B256,
    pub pubkey: BlsPubkey,
    pub intermediate_funder: Address,
    pub ultimate_funder: Address,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperatorRecord {
    pub operator_id: u64,
    pub name: String,
    pub source_block: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeyRecord {
    pub operator_id: u64,
    pub pubkey: BlsPubkey,
    pub source_block: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitRecord {
    pub validator_index: u64,
    pub epoch: u64,
    pub exit_type: ExitType,
}

/// An execution-layer log row as returned by the warehouse.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub address: Address,
    pub topics: Vec<B256>,
    pub data: Bytes,
    pub block_number: u64,
}
