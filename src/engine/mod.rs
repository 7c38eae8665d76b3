//! Orchestration of a labelling cycle and the read-only query surface over its result.

pub mod report;
pub mod table;

use crate::cache::{ArtifactKey, CacheManager};
use crate::config::known::{BATCH_CONTRACTS, EXCHANGE_SENDER_ENTITIES};
use crate::deposits::{correlate, fetch_deposits, fetch_validators};
use crate::directory::{refresh_directory, EntityDirectory};
use crate::error::SeedCorrelationError;
use crate::events::{fetch_operators, fetch_signing_keys};
use crate::exits::{apply_exits, fetch_exits, ExitStatistics};
use crate::funding::{
    resolve_batch_funding, resolve_exchange_senders, ExchangeSenderSet, ExchangeSenders,
};
use crate::http::HttpFetcher;
use crate::model::{EntityDefinition, ExitType, ValidatorRecord};
use crate::pipeline::{assign, PipelineInputs, StepCounts};
use crate::utils::config::LabelConfig;
use crate::utils::error::compact_error_message;
use crate::warehouse::QueryExecutor;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Instant;

pub use report::{RefreshReport, StageReport, StageStatus};
pub use table::{EntityStatistics, LabelTable};

const STAGE_ERR_MAX_LEN: usize = 240;

type PendingWrite = (ArtifactKey, serde_json::Value);

struct Stage<T> {
    value: Option<T>,
    report: StageReport,
    pending: Option<PendingWrite>,
}

impl<T> Stage<T> {
    /// Keep the value for this cycle but never persist it. A freshly fetched value is then
    /// reported degraded; a value served from a fresh artifact stays cached.
    fn in_memory_only(mut self, reason: &str) -> Self {
        self.pending = None;
        if self.report.status == StageStatus::Fetched {
            self.report.status = StageStatus::Degraded;
            self.report.error = Some(reason.to_string());
        }
        self
    }
}

pub struct LabelEngine {
    executor: Arc<dyn QueryExecutor>,
    fetcher: Arc<dyn HttpFetcher>,
    cache: CacheManager,
    config: LabelConfig,
    table: RwLock<Arc<LabelTable>>,
}

impl LabelEngine {
    pub fn new(
        executor: Arc<dyn QueryExecutor>,
        fetcher: Arc<dyn HttpFetcher>,
        cache: CacheManager,
        config: LabelConfig,
    ) -> Self {
        Self {
            executor,
            fetcher,
            cache,
            config,
            table: RwLock::new(Arc::new(LabelTable::default())),
        }
    }

    /// Current snapshot. Cheap to clone and unaffected by later refreshes.
    pub fn snapshot(&self) -> Arc<LabelTable> {
        let guard = match self.table.read() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        Arc::clone(&guard)
    }

    fn install(&self, table: LabelTable) {
        let mut guard = match self.table.write() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        *guard = Arc::new(table);
    }

    /// Serve the persisted labels artifact, stale or not, without touching the network.
    /// Returns the number of validators loaded, or `None` when there is no usable artifact.
    pub fn load_cached(&self) -> Option<usize> {
        let cached = self
            .cache
            .read::<Vec<ValidatorRecord>>(ArtifactKey::ValidatorLabels)?;
        let count = cached.value.len();
        tracing::info!(
            "[ENGINE] loaded {} labels from artifact (fresh={})",
            count,
            cached.fresh
        );
        self.install(LabelTable::new(cached.value));
        Some(count)
    }

    async fn run_stage<T, Fut>(
        &self,
        stage: &'static str,
        key: Option<ArtifactKey>,
        force: bool,
        count: fn(&T) -> usize,
        fetch: Fut,
    ) -> Stage<T>
    where
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = crate::Result<T>>,
    {
        if let (Some(key), false) = (key, force) {
            if let Some(value) = self.cache.read_fresh::<T>(key) {
                let records = count(&value);
                tracing::info!(
                    "[CACHE] {} served from fresh artifact ({} records)",
                    stage,
                    records
                );
                return Stage {
                    value: Some(value),
                    report: StageReport::new(stage, StageStatus::Cached, records, None),
                    pending: None,
                };
            }
        }

        match fetch.await {
            Ok(value) => {
                let records = count(&value);
                let pending = key.and_then(|key| match serde_json::to_value(&value) {
                    Ok(payload) => Some((key, payload)),
                    Err(err) => {
                        tracing::warn!("[CACHE] {} not persisted: {}", stage, err);
                        None
                    }
                });
                Stage {
                    value: Some(value),
                    report: StageReport::new(stage, StageStatus::Fetched, records, None),
                    pending,
                }
            }
            Err(err) => {
                let message = compact_error_message(&err.to_string(), STAGE_ERR_MAX_LEN);
                tracing::warn!("[ENGINE] {} degraded, no data this cycle: {}", stage, message);
                Stage {
                    value: None,
                    report: StageReport::new(stage, StageStatus::Degraded, 0, Some(message)),
                    pending: None,
                }
            }
        }
    }

    async fn directory_stage(&self, force: bool) -> Stage<EntityDirectory> {
        const STAGE: &str = "entity_directory";
        if !force {
            if let Some(definitions) = self
                .cache
                .read_fresh::<Vec<EntityDefinition>>(ArtifactKey::EntityDirectory)
            {
                let directory = EntityDirectory::from_definitions(definitions);
                tracing::info!("[CACHE] {} served from fresh artifact", STAGE);
                return Stage {
                    report: StageReport::new(STAGE, StageStatus::Cached, directory.len(), None),
                    value: Some(directory),
                    pending: None,
                };
            }
        }

        let refreshed = refresh_directory(
            self.fetcher.as_ref(),
            &self.config.registry_url,
            &self.config.cex_registry_url,
        )
        .await;
        let records = refreshed.directory.len();
        // A partial directory is used for this cycle but never persisted.
        let (report, pending) = if refreshed.is_complete() {
            let pending = serde_json::to_value(refreshed.directory.definitions())
                .ok()
                .map(|payload| (ArtifactKey::EntityDirectory, payload));
            (
                StageReport::new(STAGE, StageStatus::Fetched, records, None),
                pending,
            )
        } else {
            let message = format!("degraded sources: {}", refreshed.degraded.join(", "));
            (
                StageReport::new(STAGE, StageStatus::Degraded, records, Some(message)),
                None,
            )
        };
        Stage {
            value: Some(refreshed.directory),
            report,
            pending,
        }
    }

    async fn exchange_stage(
        &self,
        force: bool,
        directory: &EntityDirectory,
    ) -> Stage<ExchangeSenders> {
        let executor = self.executor.as_ref();
        let network = self.config.network.as_str();
        self.run_stage(
            "exchange_senders",
            Some(ArtifactKey::ExchangeSenders),
            force,
            ExchangeSenders::sender_count,
            async move {
                let mut out = ExchangeSenders::default();
                for entity in EXCHANGE_SENDER_ENTITIES {
                    let addresses = directory.addresses_for(entity);
                    let senders = resolve_exchange_senders(executor, network, &addresses).await?;
                    tracing::info!(
                        "[FUNDING] {} senders for {} ({} deposit addresses)",
                        senders.len(),
                        entity,
                        addresses.len()
                    );
                    out.exchanges.push(ExchangeSenderSet {
                        entity: (*entity).to_string(),
                        senders,
                    });
                }
                Ok(out)
            },
        )
        .await
    }

    // The persisted labels stay authoritative. A process that has not loaded them yet
    // installs them, stale or not, so queries keep answering.
    fn seed_failed(&self, err: SeedCorrelationError) -> crate::LabelError {
        tracing::error!("[ENGINE] seed failed, keeping previous labels: {}", err);
        if self.snapshot().is_empty() {
            match self.load_cached() {
                Some(count) => {
                    tracing::warn!("[ENGINE] serving {} persisted labels after seed failure", count)
                }
                None => tracing::warn!("[ENGINE] no persisted labels to fall back on"),
            }
        }
        err.into()
    }

    /// Rebuild the label table.
    ///
    /// Without `force`, a fresh labels artifact short-circuits the whole cycle and every
    /// other stage reuses its own artifact while it is fresh. Any stage except the seed
    /// (validators and deposits) may fail and only loses its contribution. A seed failure is
    /// returned and leaves every persisted artifact unchanged. The loaded table is kept, or
    /// when nothing is loaded yet, replaced by the persisted labels artifact.
    pub async fn refresh(&self, force: bool) -> crate::Result<RefreshReport> {
        let started = Instant::now();
        if !force {
            if let Some(records) = self
                .cache
                .read_fresh::<Vec<ValidatorRecord>>(ArtifactKey::ValidatorLabels)
            {
                let table = LabelTable::new(records);
                let report = RefreshReport {
                    served_from_labels_artifact: true,
                    validators: table.len(),
                    stages: Vec::new(),
                    steps: StepCounts::default(),
                    exits: table.exit_statistics(),
                    elapsed_ms: started.elapsed().as_millis() as u64,
                };
                tracing::info!("[ENGINE] labels artifact fresh, {} validators", report.validators);
                self.install(table);
                return Ok(report);
            }
        }

        let executor = self.executor.as_ref();
        let network = self.config.network.as_str();
        let directory_then_exchange = async {
            let directory = self.directory_stage(force).await;
            let fallback = EntityDirectory::with_static_contracts();
            let exchange = self
                .exchange_stage(force, directory.value.as_ref().unwrap_or(&fallback))
                .await;
            // Senders are derived from the directory's exchange addresses, so an incomplete
            // directory yields an incomplete sender set.
            let exchange = if directory.report.status == StageStatus::Degraded {
                exchange.in_memory_only("entity directory incomplete")
            } else {
                exchange
            };
            (directory, exchange)
        };

        let (
            (directory, exchange),
            validators,
            deposits,
            funding,
            operators,
            signing_keys,
            voluntary,
            attester,
            proposer,
        ) = tokio::join!(
            directory_then_exchange,
            self.run_stage(
                "raw_validators",
                Some(ArtifactKey::RawValidators),
                force,
                Vec::len,
                fetch_validators(executor, network),
            ),
            self.run_stage(
                "raw_deposits",
                Some(ArtifactKey::RawDeposits),
                force,
                Vec::len,
                fetch_deposits(executor, network),
            ),
            self.run_stage(
                "batch_funding_traces",
                Some(ArtifactKey::BatchFundingTraces),
                force,
                Vec::len,
                resolve_batch_funding(executor, network, BATCH_CONTRACTS),
            ),
            self.run_stage(
                "operator_registry",
                Some(ArtifactKey::OperatorRegistry),
                force,
                Vec::len,
                fetch_operators(executor, network),
            ),
            self.run_stage(
                "operator_signing_keys",
                Some(ArtifactKey::OperatorSigningKeys),
                force,
                Vec::len,
                fetch_signing_keys(executor, network),
            ),
            self.run_stage(
                "voluntary_exits",
                None,
                force,
                Vec::len,
                fetch_exits(executor, network, ExitType::Voluntary),
            ),
            self.run_stage(
                "attester_slashings",
                None,
                force,
                Vec::len,
                fetch_exits(executor, network, ExitType::AttesterSlashing),
            ),
            self.run_stage(
                "proposer_slashings",
                None,
                force,
                Vec::len,
                fetch_exits(executor, network, ExitType::ProposerSlashing),
            ),
        );

        let Some(validator_records) = validators.value else {
            let reason = validators.report.error.unwrap_or_default();
            return Err(self.seed_failed(SeedCorrelationError::Validators(reason)));
        };
        let Some(deposit_records) = deposits.value else {
            let reason = deposits.report.error.unwrap_or_default();
            return Err(self.seed_failed(SeedCorrelationError::Deposits(reason)));
        };

        let correlated = correlate(&deposit_records, &validator_records);
        let directory_value = directory
            .value
            .unwrap_or_else(EntityDirectory::with_static_contracts);
        let exchange_value = exchange.value.unwrap_or_default();
        let funding_value = funding.value.unwrap_or_default();
        let operators_value = operators.value.unwrap_or_default();
        let signing_keys_value = signing_keys.value.unwrap_or_default();
        let (labeled, steps) = assign(
            correlated,
            &PipelineInputs {
                directory: &directory_value,
                funding_traces: &funding_value,
                exchange_senders: &exchange_value,
                operators: &operators_value,
                signing_keys: &signing_keys_value,
            },
        );
        let labeled = apply_exits(
            labeled,
            &voluntary.value.unwrap_or_default(),
            &attester.value.unwrap_or_default(),
            &proposer.value.unwrap_or_default(),
        );

        let pending = [
            directory.pending,
            exchange.pending,
            validators.pending,
            deposits.pending,
            funding.pending,
            operators.pending,
            signing_keys.pending,
        ];
        for (key, payload) in pending.into_iter().flatten() {
            self.cache.write_or_warn(key, &payload);
        }
        self.cache
            .write_or_warn(ArtifactKey::ValidatorLabels, &labeled);

        let stages = vec![
            directory.report,
            exchange.report,
            validators.report,
            deposits.report,
            funding.report,
            operators.report,
            signing_keys.report,
            voluntary.report,
            attester.report,
            proposer.report,
        ];
        let table = LabelTable::new(labeled);
        let report = RefreshReport {
            served_from_labels_artifact: false,
            validators: table.len(),
            stages,
            steps,
            exits: table.exit_statistics(),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };
        self.install(table);

        let degraded = report.degraded_stages();
        if degraded.is_empty() {
            tracing::info!(
                "[ENGINE] refresh complete: {} validators in {}ms",
                report.validators,
                report.elapsed_ms
            );
        } else {
            tracing::warn!(
                "[ENGINE] refresh complete with degraded stages [{}]: {} validators in {}ms",
                degraded.join(", "),
                report.validators,
                report.elapsed_ms
            );
        }
        Ok(report)
    }

    pub fn label_for(&self, validator_index: u64) -> Option<String> {
        self.snapshot()
            .label_for(validator_index)
            .map(str::to_string)
    }

    pub fn labels_for(&self, validator_indices: &[u64]) -> BTreeMap<u64, Option<String>> {
        let table = self.snapshot();
        validator_indices
            .iter()
            .map(|index| (*index, table.label_for(*index).map(str::to_string)))
            .collect()
    }

    pub fn validators_of(&self, entity: &str) -> Vec<u64> {
        self.snapshot().validators_of(entity)
    }

    pub fn active_validators_of(&self, entity: &str) -> Vec<u64> {
        self.snapshot().active_validators_of(entity)
    }

    pub fn entity_statistics(&self) -> Vec<EntityStatistics> {
        self.snapshot().entity_statistics()
    }

    pub fn exit_statistics(&self) -> ExitStatistics {
        self.snapshot().exit_statistics()
    }

    /// Pair each caller row with the label of the validator it refers to. Rows without an
    /// index, or whose validator is unknown, get `None`.
    pub fn annotate<R, F>(&self, rows: Vec<R>, index_of: F) -> Vec<(R, Option<String>)>
    where
        F: Fn(&R) -> Option<u64>,
    {
        let table = self.snapshot();
        rows.into_iter()
            .map(|row| {
                let label = index_of(&row)
                    .and_then(|index| table.label_for(index))
                    .map(str::to_string);
                (row, label)
            })
            .collect()
    }
}
