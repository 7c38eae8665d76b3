use anyhow::Context;
use std::sync::Arc;
use validator_labels::cache::{
    CacheManager, CacheStore, FileCacheStore, SqliteCacheStore, SystemClock,
};
use validator_labels::engine::LabelEngine;
use validator_labels::http::ReqwestFetcher;
use validator_labels::runtime::parse_runtime_args;
use validator_labels::utils::config::{CacheBackend, LabelConfig};
use validator_labels::warehouse::ClickHouseExecutor;

const TOP_ENTITIES_LOGGED: usize = 20;

fn explain_config(config: &LabelConfig) {
    let warehouse = config
        .warehouse
        .as_ref()
        .map(|w| {
            let password = if w.password.is_some() { "set" } else { "unset" };
            format!("{} (user={}, password={})", w.url, w.user, password)
        })
        .unwrap_or_else(|| "UNSET".to_string());
    tracing::info!("[STARTUP] warehouse: {}", warehouse);
    tracing::info!("[STARTUP] network: {}", config.network);
    tracing::info!(
        "[STARTUP] cache: {:?} at {}",
        config.cache_backend,
        config.cache_dir.display()
    );
    for key in validator_labels::cache::ArtifactKey::ALL {
        tracing::info!(
            "[STARTUP] ttl {}: {}s",
            key.as_str(),
            config.ttls.get(key).as_secs()
        );
    }
    tracing::info!(
        "[STARTUP] registries: {} | {}",
        config.registry_url,
        config.cex_registry_url
    );
    tracing::info!(
        "[STARTUP] http timeout {}ms, retries {} (base {}ms, cap {}ms)",
        config.http_timeout.as_millis(),
        config.retry.max_attempts,
        config.retry.base_ms,
        config.retry.cap_ms
    );
}

fn open_store(config: &LabelConfig) -> anyhow::Result<Arc<dyn CacheStore>> {
    Ok(match config.cache_backend {
        CacheBackend::File => Arc::new(FileCacheStore::new(&config.cache_dir)),
        CacheBackend::Sqlite => Arc::new(
            SqliteCacheStore::open(config.cache_dir.join("artifacts.db"))
                .context("failed to open sqlite artifact store")?,
        ),
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let runtime_args = parse_runtime_args()?;

    // Default to `info` when `RUST_LOG` is unset or invalid to avoid silent startup.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let config = LabelConfig::from_env().context("invalid configuration")?;
    if runtime_args.explain_config {
        explain_config(&config);
        return Ok(());
    }

    let store = open_store(&config)?;
    let cache = CacheManager::new(store, Arc::new(SystemClock), config.ttls);
    let warehouse = config
        .warehouse
        .clone()
        .ok_or_else(|| anyhow::anyhow!("CLICKHOUSE_URL must be set"))?;
    let executor = ClickHouseExecutor::new(&warehouse, config.http_timeout, config.retry)?;
    let http_client = reqwest::Client::builder()
        .build()
        .context("failed to build http client")?;
    let fetcher = ReqwestFetcher::new(http_client, config.http_timeout, config.retry);
    let engine = LabelEngine::new(Arc::new(executor), Arc::new(fetcher), cache, config);

    if runtime_args.cache_only {
        let loaded = engine.load_cached().ok_or_else(|| {
            anyhow::anyhow!("LABELS_CACHE_ONLY set but no labels artifact exists")
        })?;
        tracing::info!("[STARTUP] serving {} cached labels", loaded);
    } else {
        let report = engine
            .refresh(runtime_args.force_refresh)
            .await
            .context("label refresh failed")?;
        for stage in &report.stages {
            tracing::info!(
                "[ENGINE] stage {} {:?} records={}",
                stage.stage,
                stage.status,
                stage.records
            );
        }
    }

    let stats = engine.entity_statistics();
    for row in stats.iter().take(TOP_ENTITIES_LOGGED) {
        tracing::info!(
            "[ENGINE] {:<32} count={:>7} share={:>6.2}% active={:>7} exit_rate={:.2}%",
            row.entity,
            row.count,
            row.percentage,
            row.active_count,
            row.exit_rate
        );
    }
    let summary = serde_json::json!({
        "entities": stats,
        "exits": engine.exit_statistics(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}
