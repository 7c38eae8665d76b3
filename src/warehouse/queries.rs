//! Query catalogue and the row struct each query binds to.
//!
//! Row structs keep the warehouse's text representation. Converting a row into a domain record
//! is a separate, row-level step: a value that fails to parse drops that row only.

use super::{FromRow, Query, Row};
use crate::error::SchemaMismatchError;
use crate::model::{
    BlsPubkey, DepositRecord, ExitRecord, ExitType, FundingTrace, RawLog, ValidatorRecord,
};
use crate::utils::hex::{parse_address, parse_b256, parse_bytes, parse_fixed};
use alloy::primitives::{Address, B256};

pub const VALIDATORS: Query = Query {
    name: "validators",
    sql: r#"
SELECT
    validator_index,
    pubkey
FROM canonical_beacon_validators_pubkeys FINAL
WHERE meta_network_name = {network:String}
ORDER BY validator_index"#,
};

// Deposit calldata: selector, four head words, the pubkey length word, then 48 pubkey bytes.
// In the 0x-prefixed hex text that puts the pubkey at character 331 (1-based).
pub const DEPOSITS: Query = Query {
    name: "deposits",
    sql: r#"
SELECT
    concat('0x', lower(substring(action_input, 331, 96))) AS pubkey,
    lower(action_from) AS depositor_address,
    toUInt64(intDiv(toUInt256(action_value), 1000000000)) AS amount_gwei,
    block_number,
    transaction_hash AS tx_hash
FROM canonical_execution_traces
WHERE meta_network_name = {network:String}
  AND lower(action_to) = {deposit_contract:String}
  AND startsWith(action_input, '0x22895118')
  AND block_number >= {genesis_block:UInt64}
  AND error IS NULL
ORDER BY block_number, transaction_hash"#,
};

// d: deposit call made by a batch contract
// i: value flowing into that batch contract within the same transaction
// u: value flowing into i's sender within the same transaction, when there is one
pub const BATCH_FUNDING: Query = Query {
    name: "batch_funding",
    sql: r#"
SELECT
    d.transaction_hash AS tx_hash,
    concat('0x', lower(substring(d.action_input, 331, 96))) AS pubkey,
    lower(i.action_from) AS intermediate_funder,
    groupUniqArray(lower(if(u.action_from = '', i.action_from, u.action_from))) AS ultimate_funders
FROM canonical_execution_traces AS d
INNER JOIN canonical_execution_traces AS i
    ON i.transaction_hash = d.transaction_hash
   AND lower(i.action_to) = lower(d.action_from)
LEFT JOIN canonical_execution_traces AS u
    ON u.transaction_hash = i.transaction_hash
   AND lower(u.action_to) = lower(i.action_from)
WHERE d.meta_network_name = {network:String}
  AND lower(d.action_to) = {deposit_contract:String}
  AND lower(d.action_from) IN {batch_contracts:Array(String)}
  AND startsWith(d.action_input, '0x22895118')
  AND toUInt256(i.action_value) > 0
  AND d.block_number >= {genesis_block:UInt64}
GROUP BY tx_hash, pubkey, intermediate_funder
ORDER BY tx_hash, pubkey"#,
};

pub const EXCHANGE_SENDERS: Query = Query {
    name: "exchange_senders",
    sql: r#"
SELECT DISTINCT sender
FROM (
    SELECT lower(from_address) AS sender
    FROM canonical_execution_transaction
    WHERE meta_network_name = {network:String}
      AND lower(to_address) IN {addresses:Array(String)}
      AND block_number >= {genesis_block:UInt64}
    UNION ALL
    SELECT lower(action_from) AS sender
    FROM canonical_execution_traces
    WHERE meta_network_name = {network:String}
      AND lower(action_to) IN {addresses:Array(String)}
      AND block_number >= {genesis_block:UInt64}
)
ORDER BY sender"#,
};

pub const OPERATOR_LOGS: Query = Query {
    name: "operator_logs",
    sql: r#"
SELECT
    lower(address) AS address,
    topic_0,
    topic_1,
    data,
    block_number
FROM canonical_execution_logs
WHERE meta_network_name = {network:String}
  AND lower(address) = {contract:String}
  AND topic_0 = {topic0:String}
ORDER BY block_number, log_index"#,
};

pub const VOLUNTARY_EXITS: Query = Query {
    name: "voluntary_exits",
    sql: r#"
SELECT
    voluntary_exit_message_validator_index AS validator_index,
    min(voluntary_exit_message_epoch) AS epoch
FROM canonical_beacon_block_voluntary_exit FINAL
WHERE meta_network_name = {network:String}
GROUP BY validator_index
ORDER BY validator_index"#,
};

// A slashed attester is one whose index appears in both conflicting attestations.
pub const ATTESTER_SLASHINGS: Query = Query {
    name: "attester_slashings",
    sql: r#"
SELECT
    arrayJoin(arrayIntersect(attestation_1_attesting_indices, attestation_2_attesting_indices)) AS validator_index,
    min(epoch) AS epoch
FROM canonical_beacon_block_attester_slashing FINAL
WHERE meta_network_name = {network:String}
GROUP BY validator_index
ORDER BY validator_index"#,
};

pub const PROPOSER_SLASHINGS: Query = Query {
    name: "proposer_slashings",
    sql: r#"
SELECT
    signed_header_1_message_proposer_index AS validator_index,
    min(epoch) AS epoch
FROM canonical_beacon_block_proposer_slashing FINAL
WHERE meta_network_name = {network:String}
GROUP BY validator_index
ORDER BY validator_index"#,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatorRow {
    pub validator_index: u64,
    pub pubkey: String,
}

impl FromRow for ValidatorRow {
    fn from_row(query: &'static str, row: &Row) -> Result<Self, SchemaMismatchError> {
        Ok(Self {
            validator_index: row.u64_col(query, "validator_index")?,
            pubkey: row.str_col(query, "pubkey")?,
        })
    }
}

impl ValidatorRow {
    pub fn to_record(&self) -> Option<ValidatorRecord> {
        let pubkey = parse_fixed::<48>(&self.pubkey)?;
        Some(ValidatorRecord::new(self.validator_index, pubkey))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositRow {
    pub pubkey: String,
    pub depositor_address: String,
    pub amount_gwei: u64,
    pub block_number: u64,
    pub tx_hash: String,
}

impl FromRow for DepositRow {
    fn from_row(query: &'static str, row: &Row) -> Result<Self, SchemaMismatchError> {
        Ok(Self {
            pubkey: row.str_col(query, "pubkey")?,
            depositor_address: row.str_col(query, "depositor_address")?,
            amount_gwei: row.u64_col(query, "amount_gwei")?,
            block_number: row.u64_col(query, "block_number")?,
            tx_hash: row.str_col(query, "tx_hash")?,
        })
    }
}

impl DepositRow {
    pub fn to_record(&self) -> Option<DepositRecord> {
        Some(DepositRecord {
            pubkey: parse_fixed::<48>(&self.pubkey)?,
            depositor_address: parse_address(&self.depositor_address)?,
            amount: self.amount_gwei,
            block_number: self.block_number,
            tx_hash: parse_b256(&self.tx_hash)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFundingRow {
    pub tx_hash: String,
    pub pubkey: String,
    pub intermediate_funder: String,
    pub ultimate_funders: Vec<String>,
}

impl FromRow for BatchFundingRow {
    fn from_row(query: &'static str, row: &Row) -> Result<Self, SchemaMismatchError> {
        Ok(Self {
            tx_hash: row.str_col(query, "tx_hash")?,
            pubkey: row.str_col(query, "pubkey")?,
            intermediate_funder: row.str_col(query, "intermediate_funder")?,
            ultimate_funders: row.str_array_col(query, "ultimate_funders")?,
        })
    }
}

impl BatchFundingRow {
    /// One trace per distinct ultimate funder. Funders that do not parse are dropped; a row
    /// left with none falls back to the intermediate funder.
    pub fn to_traces(&self) -> Option<Vec<FundingTrace>> {
        let tx_hash: B256 = parse_b256(&self.tx_hash)?;
        let pubkey: BlsPubkey = parse_fixed::<48>(&self.pubkey)?;
        let intermediate_funder = parse_address(&self.intermediate_funder)?;
        let mut ultimate: Vec<Address> = self
            .ultimate_funders
            .iter()
            .filter_map(|raw| parse_address(raw))
            .collect();
        if ultimate.is_empty() {
            ultimate.push(intermediate_funder);
        }
        ultimate.sort();
        ultimate.dedup();
        Some(
            ultimate
                .into_iter()
                .map(|ultimate_funder| FundingTrace {
                    tx_hash,
                    pubkey,
                    intermediate_funder,
                    ultimate_funder,
                })
                .collect(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderRow {
    pub sender: String,
}

impl FromRow for SenderRow {
    fn from_row(query: &'static str, row: &Row) -> Result<Self, SchemaMismatchError> {
        Ok(Self {
            sender: row.str_col(query, "sender")?,
        })
    }
}

impl SenderRow {
    pub fn to_address(&self) -> Option<Address> {
        parse_address(&self.sender)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRow {
    pub address: String,
    pub topic_0: String,
    pub topic_1: Option<String>,
    pub data: String,
    pub block_number: u64,
}

impl FromRow for LogRow {
    fn from_row(query: &'static str, row: &Row) -> Result<Self, SchemaMismatchError> {
        Ok(Self {
            address: row.str_col(query, "address")?,
            topic_0: row.str_col(query, "topic_0")?,
            topic_1: row.opt_str_col(query, "topic_1")?,
            data: row.str_col(query, "data")?,
            block_number: row.u64_col(query, "block_number")?,
        })
    }
}

impl LogRow {
    pub fn to_raw_log(&self) -> Option<RawLog> {
        let mut topics = vec![parse_b256(&self.topic_0)?];
        if let Some(topic_1) = self.topic_1.as_deref().filter(|t| !t.trim().is_empty()) {
            topics.push(parse_b256(topic_1)?);
        }
        Some(RawLog {
            address: parse_address(&self.address)?,
            topics,
            data: parse_bytes(&self.data)?,
            block_number: self.block_number,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitRow {
    pub validator_index: u64,
    pub epoch: u64,
}

impl FromRow for ExitRow {
    fn from_row(query: &'static str, row: &Row) -> Result<Self, SchemaMismatchError> {
        Ok(Self {
            validator_index: row.u64_col(query, "validator_index")?,
            epoch: row.u64_col(query, "epoch")?,
        })
    }
}

impl ExitRow {
    pub fn to_record(self, exit_type: ExitType) -> ExitRecord {
        ExitRecord {
            validator_index: self.validator_index,
            epoch: self.epoch,
            exit_type,
        }
    }
}

/// Convert bound rows into records, returning how many rows were dropped.
pub fn convert_rows<R, T, F>(rows: &[R], convert: F) -> (Vec<T>, usize)
where
    F: Fn(&R) -> Option<T>,
{
    let mut out = Vec::with_capacity(rows.len());
    let mut dropped = 0usize;
    for row in rows {
        match convert(row) {
            Some(value) => out.push(value),
            None => dropped += 1,
        }
    }
    (out, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::bind_rows;
    use serde_json::json;

    fn hex_of(byte: u8, len: usize) -> String {
        format!("0x{}", format!("{byte:02x}").repeat(len))
    }

    #[test]
    fn test_deposit_row_binds_and_converts() {
        let row = Row::from_value(json!({
            "pubkey": hex_of(0xaa, 48),
            "depositor_address": hex_of(0x11, 20),
            "amount_gwei": "32000000000",
            "block_number": 11_200_000u64,
            "tx_hash": hex_of(0x01, 32),
        }))
        .expect("object");
        let bound = bind_rows::<DepositRow>(&DEPOSITS, &[row]).expect("schema");
        let record = bound[0].to_record().expect("values parse");
        assert_eq!(record.amount, 32_000_000_000);
        assert_eq!(record.depositor_address, Address::repeat_byte(0x11));
    }

    #[test]
    fn test_bad_pubkey_is_row_level_not_schema() {
        let row = Row::from_value(json!({"validator_index": 3, "pubkey": "0xdead"}))
            .expect("object");
        let bound = bind_rows::<ValidatorRow>(&VALIDATORS, &[row]).expect("schema still binds");
        let (records, dropped) = convert_rows(&bound, ValidatorRow::to_record);
        assert!(records.is_empty());
        assert_eq!(dropped, 1);
    }

    #[test]
    fn test_batch_row_expands_one_trace_per_funder() {
        let row = BatchFundingRow {
            tx_hash: hex_of(0x02, 32),
            pubkey: hex_of(0xbb, 48),
            intermediate_funder: hex_of(0x33, 20),
            ultimate_funders: vec![hex_of(0x55, 20), "garbage".into(), hex_of(0x44, 20)],
        };
        let traces = row.to_traces().expect("row parses");
        let funders: Vec<Address> = traces.iter().map(|t| t.ultimate_funder).collect();
        assert_eq!(
            funders,
            vec![Address::repeat_byte(0x44), Address::repeat_byte(0x55)]
        );
    }

    #[test]
    fn test_log_row_without_topic_1() {
        let row = LogRow {
            address: hex_of(0x55, 20),
            topic_0: hex_of(0x99, 32),
            topic_1: None,
            data: "0x".into(),
            block_number: 1,
        };
        let log = row.to_raw_log().expect("parses");
        assert_eq!(log.topics.len(), 1);
        assert!(log.data.is_empty());
    }
}
