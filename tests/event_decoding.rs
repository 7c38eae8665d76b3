
use alloy::primitives::{Address, Bytes, B256};
use label_fixtures::*;
use serde_json::json;
use std::sync::Arc;
use validator_labels::cache::{ManualClock, MemoryCacheStore};
use validator_labels::config::known::LIDO_OPERATOR_REGISTRY;
use validator_labels::events::{
    decode_operators, decode_signing_keys, fetch_operators, node_operator_added_topic,
    signing_key_added_topic,
};
use validator_labels::model::{BlsPubkey, RawLog};

fn registry_log(topics: Vec<B256>, data: Vec<u8>, block: u64) -> RawLog {
    RawLog {
        address: LIDO_OPERATOR_REGISTRY,
        topics,
        data: Bytes::from(data),
        block_number: block,
    }
}

fn id_topic(id: u64) -> B256 {
    B256::from(word(id))
}

#[test]
fn test_operator_name_decodes_from_indexed_layout() {
    let log = registry_log(
        vec![node_operator_added_topic(), id_topic(7)],
        operator_added_data("OperatorX"),
        11_000_000,
    );
    let decoded = decode_operators(&[log]);
    assert!(decoded.errors.is_empty());
    assert_eq!(decoded.records.len(), 1);
    assert_eq!(decoded.records[0].operator_id, 7);
    assert_eq!(decoded.records[0].name, "OperatorX");
    assert_eq!(decoded.records[0].source_block, 11_000_000);
}

#[test]
fn test_operator_id_in_data_when_not_indexed() {
    let mut data = word(12).to_vec();
    // Every offset in the unindexed payload is shifted by the leading id word.
    let mut rest = operator_added_data("Chorus One");
    rest[..32].copy_from_slice(&word(128));
    data.extend_from_slice(&rest);

    let decoded = decode_operators(&[registry_log(vec![node_operator_added_topic()], data, 5)]);
    assert!(decoded.errors.is_empty(), "{:?}", decoded.errors);
    assert_eq!(decoded.records[0].operator_id, 12);
    assert_eq!(decoded.records[0].name, "Chorus One");
}

#[test]
fn test_out_of_bounds_offset_skips_only_that_log() {
    let mut truncated = operator_added_data("Ghost");
    truncated[..32].copy_from_slice(&word(4_096));
    let mut short_name = operator_added_data("Staking Facilities");
    short_name.truncate(32 * 4 + 4);

    let logs = vec![
        registry_log(vec![node_operator_added_topic(), id_topic(1)], truncated, 10),
        registry_log(vec![node_operator_added_topic(), id_topic(2)], short_name, 11),
        registry_log(
            vec![node_operator_added_topic(), id_topic(3)],
            operator_added_data("P2P.ORG"),
            12,
        ),
    ];
    let decoded = decode_operators(&logs);
    assert_eq!(decoded.errors.len(), 2);
    assert_eq!(decoded.errors[0].block_number, 10);
    assert_eq!(decoded.records.len(), 1);
    assert_eq!(decoded.records[0].name, "P2P.ORG");
}

#[test]
fn test_foreign_logs_are_ignored_not_errors() {
    let mut foreign = registry_log(
        vec![node_operator_added_topic(), id_topic(1)],
        operator_added_data("Impostor"),
        1,
    );
    foreign.address = Address::repeat_byte(0x99);
    let other_event = registry_log(
        vec![signing_key_added_topic(), id_topic(1)],
        signing_key_data(0x42),
        2,
    );
    let decoded = decode_operators(&[foreign, other_event]);
    assert!(decoded.records.is_empty());
    assert!(decoded.errors.is_empty());
    assert_eq!(decoded.ignored, 2);
}

#[test]
fn test_signing_key_requires_48_byte_payload() {
    let good = registry_log(
        vec![signing_key_added_topic(), id_topic(4)],
        signing_key_data(0x42),
        20,
    );
    let mut wrong_len = signing_key_data(0x43);
    wrong_len[32..64].copy_from_slice(&word(47));
    let bad = registry_log(vec![signing_key_added_topic(), id_topic(4)], wrong_len, 21);
    let no_id = registry_log(vec![signing_key_added_topic()], signing_key_data(0x44), 22);

    let decoded = decode_signing_keys(&[good, bad, no_id]);
    assert_eq!(decoded.records.len(), 1);
    assert_eq!(decoded.records[0].operator_id, 4);
    assert_eq!(decoded.records[0].pubkey, BlsPubkey::repeat_byte(0x42));
    assert_eq!(decoded.errors.len(), 2);
}

#[tokio::test]
async fn test_fetch_operators_tolerates_malformed_rows() {
    let warehouse = Arc::new(FakeWarehouse::default());
    warehouse.rows_when(
        "operator_logs",
        "topic0",
        operator_topic_param(),
        vec![
            operator_log_row(1, "Figment", 100),
            json!({
                "address": addr_hex(&LIDO_OPERATOR_REGISTRY),
                "topic_0": operator_topic_param(),
                "topic_1": null,
                "data": "0xabc",
                "block_number": 101,
            }),
            operator_log_row(2, "Kiln", 102),
        ],
    );
    let operators = fetch_operators(warehouse.as_ref(), "mainnet")
        .await
        .expect("fetch succeeds");
    let names: Vec<&str> = operators.iter().map(|o| o.name.as_str()).collect();
    assert_eq!(names, vec!["Figment", "Kiln"]);
}

#[tokio::test]
async fn test_malformed_registry_log_does_not_block_refinement() {
    let lido = Address::repeat_byte(0xa1);
    let warehouse = Arc::new(FakeWarehouse::default());
    warehouse.rows("validators", vec![validator_row(1, 1), validator_row(2, 2)]);
    warehouse.rows(
        "deposits",
        vec![deposit_row(1, &lido, 100, 1), deposit_row(2, &lido, 101, 2)],
    );
    let mut broken = operator_log_row(9, "Broken", 5);
    broken["data"] = json!(format!("0x{}", hex::encode(word(4_096))));
    warehouse.rows_when(
        "operator_logs",
        "topic0",
        operator_topic_param(),
        vec![broken, operator_log_row(3, "Everstake", 6)],
    );
    warehouse.rows_when(
        "operator_logs",
        "topic0",
        signing_key_topic_param(),
        vec![signing_key_log_row(3, 1, 7), signing_key_log_row(9, 2, 8)],
    );

    let registry = Arc::new(FakeRegistry::default());
    registry.serve(
        REGISTRY_URL,
        &format!("address,name\n{},lido\n", addr_hex(&lido)),
    );
    registry.serve(
        CEX_REGISTRY_URL,
        &format!("address,cex_name\n{},Kraken\n", hex_repeat(0xb1, 20)),
    );
    let engine = build_engine(
        warehouse,
        registry,
        Arc::new(MemoryCacheStore::default()),
        Arc::new(ManualClock::new(T0_MS)),
        test_config(),
    );

    let report = engine.refresh(false).await.expect("refresh succeeds");
    assert_eq!(report.steps.refined, 1);
    assert_eq!(engine.label_for(1).as_deref(), Some("lido - Everstake"));
    assert_eq!(engine.label_for(2).as_deref(), Some("lido"));
}
