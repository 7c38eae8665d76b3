//! Fixed-layout decoders for the liquid-staking operator registry's two events.
//!
//! Both events are selected by comparing topic 0 with the keccak hash of the exact signature
//! text. Payloads are read as 32-byte big-endian words with every offset bounds-checked; a log
//! that fails any check is reported and skipped without affecting its neighbours.

use crate::config::known::{
    LIDO_OPERATOR_REGISTRY, NODE_OPERATOR_ADDED_EVENT, SIGNING_KEY_ADDED_EVENT,
};
use crate::error::LogDecodeError;
use crate::model::{BlsPubkey, OperatorRecord, RawLog, SigningKeyRecord};
use crate::utils::hex::address_param;
use crate::warehouse::queries::{convert_rows, LogRow, OPERATOR_LOGS};
use crate::warehouse::{fetch_typed, QueryExecutor, QueryParams};
use alloy::primitives::{keccak256, B256};
use std::sync::OnceLock;

const WORD: usize = 32;
const PUBKEY_LEN: usize = 48;

pub fn node_operator_added_topic() -> B256 {
    static TOPIC: OnceLock<B256> = OnceLock::new();
    *TOPIC.get_or_init(|| keccak256(NODE_OPERATOR_ADDED_EVENT))
}

pub fn signing_key_added_topic() -> B256 {
    static TOPIC: OnceLock<B256> = OnceLock::new();
    *TOPIC.get_or_init(|| keccak256(SIGNING_KEY_ADDED_EVENT))
}

#[derive(Debug, Clone, Default)]
pub struct Decoded<T> {
    pub records: Vec<T>,
    pub errors: Vec<LogDecodeError>,
    /// Logs from another contract or with another selector.
    pub ignored: usize,
}

impl<T> Decoded<T> {
    fn warn_if_errors(&self, event: &str) {
        if let Some(first) = self.errors.first() {
            tracing::warn!(
                "[EVENTS] skipped {} malformed {} logs (first: {})",
                self.errors.len(),
                event,
                first
            );
        }
    }
}

// Integer word that must fit in u64: the upper 24 bytes are zero.
fn word_u64(word: &[u8]) -> Option<u64> {
    if word.len() != WORD || word[..WORD - 8].iter().any(|b| *b != 0) {
        return None;
    }
    let mut tail = [0u8; 8];
    tail.copy_from_slice(&word[WORD - 8..]);
    Some(u64::from_be_bytes(tail))
}

fn data_word_u64(data: &[u8], offset: usize) -> Option<u64> {
    word_u64(data.get(offset..offset.checked_add(WORD)?)?)
}

fn data_word_usize(data: &[u8], offset: usize) -> Option<usize> {
    usize::try_from(data_word_u64(data, offset)?).ok()
}

/// `string` / `bytes` payload whose head slot sits at `head_offset`: the slot holds the byte
/// offset of a length word, which is followed by that many content bytes.
fn dynamic_bytes(data: &[u8], head_offset: usize) -> Result<&[u8], String> {
    let start = data_word_usize(data, head_offset)
        .ok_or_else(|| format!("head word at {head_offset} missing or oversized"))?;
    let len = data_word_usize(data, start)
        .ok_or_else(|| format!("length word at {start} out of bounds"))?;
    let content_start = start
        .checked_add(WORD)
        .ok_or_else(|| "content offset overflows".to_string())?;
    let content_end = content_start
        .checked_add(len)
        .ok_or_else(|| "content length overflows".to_string())?;
    data.get(content_start..content_end).ok_or_else(|| {
        format!(
            "content {content_start}..{content_end} exceeds payload of {} bytes",
            data.len()
        )
    })
}

fn is_registry_log(log: &RawLog, topic0: B256) -> bool {
    log.address == LIDO_OPERATOR_REGISTRY && log.topics.first() == Some(&topic0)
}

fn operator_id_from_topic(log: &RawLog) -> Option<u64> {
    log.topics.get(1).and_then(|t| word_u64(t.as_slice()))
}

fn decode_operator(log: &RawLog) -> Result<OperatorRecord, String> {
    let data = log.data.as_ref();
    // Indexed id: data is (name head, reward address, staking limit, ...name).
    // Unindexed id: data is (id, name head, reward address, staking limit, ...name).
    let (operator_id, name_head) = if log.topics.len() >= 2 {
        let id = operator_id_from_topic(log).ok_or("operator id topic exceeds u64")?;
        (id, 0)
    } else {
        let id = data_word_u64(data, 0).ok_or("operator id word missing or exceeds u64")?;
        (id, WORD)
    };
    let raw_name = dynamic_bytes(data, name_head)?;
    let name = std::str::from_utf8(raw_name)
        .map_err(|e| format!("operator name is not UTF-8: {e}"))?
        .trim()
        .to_string();
    if name.is_empty() {
        return Err("operator name is empty".to_string());
    }
    Ok(OperatorRecord {
        operator_id,
        name,
        source_block: log.block_number,
    })
}

fn decode_signing_key(log: &RawLog) -> Result<SigningKeyRecord, String> {
    let data = log.data.as_ref();
    let operator_id = operator_id_from_topic(log).ok_or("operator id topic missing or exceeds u64")?;
    // (bytes head, length word, 48 key bytes)
    let len = data_word_usize(data, WORD).ok_or("pubkey length word out of bounds")?;
    if len != PUBKEY_LEN {
        return Err(format!("pubkey length {len}, expected {PUBKEY_LEN}"));
    }
    let key = data
        .get(2 * WORD..2 * WORD + PUBKEY_LEN)
        .ok_or("pubkey bytes truncated")?;
    Ok(SigningKeyRecord {
        operator_id,
        pubkey: BlsPubkey::from_slice(key),
        source_block: log.block_number,
    })
}

fn decode_all<T>(
    logs: &[RawLog],
    event: &'static str,
    topic0: B256,
    decode: fn(&RawLog) -> Result<T, String>,
) -> Decoded<T> {
    let mut out = Decoded {
        records: Vec::new(),
        errors: Vec::new(),
        ignored: 0,
    };
    for log in logs {
        if !is_registry_log(log, topic0) {
            out.ignored += 1;
            continue;
        }
        match decode(log) {
            Ok(record) => out.records.push(record),
            Err(reason) => out.errors.push(LogDecodeError {
                event,
                block_number: log.block_number,
                reason,
            }),
        }
    }
    out.warn_if_errors(event);
    out
}

pub fn decode_operators(logs: &[RawLog]) -> Decoded<OperatorRecord> {
    decode_all(
        logs,
        "NodeOperatorAdded",
        node_operator_added_topic(),
        decode_operator,
    )
}

pub fn decode_signing_keys(logs: &[RawLog]) -> Decoded<SigningKeyRecord> {
    decode_all(
        logs,
        "SigningKeyAdded",
        signing_key_added_topic(),
        decode_signing_key,
    )
}

/// Raw registry logs carrying `topic0`, in block order.
pub async fn fetch_registry_logs(
    executor: &dyn QueryExecutor,
    network: &str,
    topic0: B256,
) -> crate::Result<Vec<RawLog>> {
    let params = QueryParams::new()
        .with_str("network", network)
        .with_str("contract", address_param(&LIDO_OPERATOR_REGISTRY))
        .with_str("topic0", format!("{topic0:#x}"));
    let rows = fetch_typed::<LogRow>(executor, &OPERATOR_LOGS, &params).await?;
    let (logs, dropped) = convert_rows(&rows, LogRow::to_raw_log);
    if dropped > 0 {
        tracing::warn!("[EVENTS] dropped {} log rows with malformed hex", dropped);
    }
    Ok(logs)
}

pub async fn fetch_operators(
    executor: &dyn QueryExecutor,
    network: &str,
) -> crate::Result<Vec<OperatorRecord>> {
    let logs = fetch_registry_logs(executor, network, node_operator_added_topic()).await?;
    let decoded = decode_operators(&logs);
    tracing::info!("[EVENTS] decoded {} operators", decoded.records.len());
    Ok(decoded.records)
}

pub async fn fetch_signing_keys(
    executor: &dyn QueryExecutor,
    network: &str,
) -> crate::Result<Vec<SigningKeyRecord>> {
    let logs = fetch_registry_logs(executor, network, signing_key_added_topic()).await?;
    let decoded = decode_signing_keys(&logs);
    tracing::info!("[EVENTS] decoded {} signing keys", decoded.records.len());
    Ok(decoded.records)
}
