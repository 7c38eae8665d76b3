
use alloy::primitives::Address;
use label_fixtures::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use validator_labels::cache::{
    ArtifactKey, CacheStore, FileCacheStore, ManualClock, SqliteCacheStore,
};

fn temp_path(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .ok()
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("{}_{}", prefix, nanos))
}

fn seeded_sources() -> (Arc<FakeWarehouse>, Arc<FakeRegistry>) {
    let warehouse = Arc::new(FakeWarehouse::default());
    warehouse.rows("validators", vec![validator_row(10, 10), validator_row(11, 11)]);
    warehouse.rows(
        "deposits",
        vec![deposit_row(10, &Address::repeat_byte(0xa1), 11_400_000, 7)],
    );
    warehouse.rows("proposer_slashings", vec![exit_row(10, 42)]);
    let registry = Arc::new(FakeRegistry::default());
    registry.serve(
        REGISTRY_URL,
        &format!("address,name\n{},Staked.us\n", hex_repeat(0xa1, 20)),
    );
    registry.serve(
        CEX_REGISTRY_URL,
        &format!("address,cex_name\n{},Kraken\n", hex_repeat(0xb1, 20)),
    );
    (warehouse, registry)
}

// A later process with every source down still answers from the persisted labels.
async fn survives_restart(store_a: Arc<dyn CacheStore>, store_b: Arc<dyn CacheStore>) {
    let clock = Arc::new(ManualClock::new(T0_MS));
    let (warehouse, registry) = seeded_sources();
    let first = build_engine(warehouse, registry, store_a, clock.clone(), test_config());
    first.refresh(false).await.expect("first process refreshes");

    let dead = Arc::new(FakeWarehouse::default());
    for query in ["validators", "deposits", "batch_funding", "operator_logs"] {
        dead.fail(query);
    }
    clock.advance(DAY);
    let second = build_engine(
        dead.clone(),
        Arc::new(FakeRegistry::default()),
        store_b,
        clock,
        test_config(),
    );
    let report = second.refresh(false).await.expect("served from disk");
    assert!(report.served_from_labels_artifact);
    assert_eq!(dead.calls(), 0);
    assert_eq!(second.label_for(10).as_deref(), Some("staked.us"));
    let record = second.snapshot().record(10).cloned().expect("record restored");
    assert!(record.exited);
    assert_eq!(record.exit_epoch, Some(42));
    assert_eq!(second.label_for(11), None);
}

#[tokio::test]
async fn test_file_store_survives_restart() {
    let dir = temp_path("labels_store_file");
    survives_restart(
        Arc::new(FileCacheStore::new(&dir)),
        Arc::new(FileCacheStore::new(&dir)),
    )
    .await;
    assert!(dir.join("validator_labels.json").exists());
    assert!(dir.join("entity_directory.json").exists());
    let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn test_sqlite_store_survives_restart() {
    let path = temp_path("labels_store_sqlite").with_extension("db");
    let first = SqliteCacheStore::open(&path).expect("open");
    let second = SqliteCacheStore::open(&path).expect("reopen");
    survives_restart(Arc::new(first), Arc::new(second.clone())).await;
    assert!(second
        .read(ArtifactKey::RawDeposits)
        .expect("readable")
        .is_some());
    let _ = std::fs::remove_file(&path);
}
