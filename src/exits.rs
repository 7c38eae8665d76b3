//! Exit Status Overlay.
//!
//! Sources are applied in the fixed order voluntary, attester slashing, proposer slashing.
//! A validator matched by several sources takes both its exit type and its exit epoch from
//! the last source applied, so the two fields always describe the same event.

use crate::model::{ExitRecord, ExitType, ValidatorRecord};
use crate::warehouse::queries::{
    ExitRow, ATTESTER_SLASHINGS, PROPOSER_SLASHINGS, VOLUNTARY_EXITS,
};
use crate::warehouse::{fetch_typed, QueryExecutor, QueryParams};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub async fn fetch_exits(
    executor: &dyn QueryExecutor,
    network: &str,
    exit_type: ExitType,
) -> crate::Result<Vec<ExitRecord>> {
    let query = match exit_type {
        ExitType::Voluntary => &VOLUNTARY_EXITS,
        ExitType::AttesterSlashing => &ATTESTER_SLASHINGS,
        ExitType::ProposerSlashing => &PROPOSER_SLASHINGS,
    };
    let params = QueryParams::new().with_str("network", network);
    let rows = fetch_typed::<ExitRow>(executor, query, &params).await?;
    Ok(rows.into_iter().map(|row| row.to_record(exit_type)).collect())
}

pub fn apply_exits(
    mut validators: Vec<ValidatorRecord>,
    voluntary: &[ExitRecord],
    attester_slashings: &[ExitRecord],
    proposer_slashings: &[ExitRecord],
) -> Vec<ValidatorRecord> {
    let positions: HashMap<u64, usize> = validators
        .iter()
        .enumerate()
        .map(|(pos, v)| (v.validator_index, pos))
        .collect();

    for (source, records) in [
        (ExitType::Voluntary, voluntary),
        (ExitType::AttesterSlashing, attester_slashings),
        (ExitType::ProposerSlashing, proposer_slashings),
    ] {
        // Within one source the earliest epoch per validator stands for that source.
        let mut earliest: HashMap<u64, u64> = HashMap::new();
        for record in records {
            earliest
                .entry(record.validator_index)
                .and_modify(|epoch| *epoch = (*epoch).min(record.epoch))
                .or_insert(record.epoch);
        }
        let mut matched = 0usize;
        for (index, epoch) in earliest {
            let Some(&pos) = positions.get(&index) else {
                continue;
            };
            let validator = &mut validators[pos];
            validator.exited = true;
            validator.exit_type = Some(source);
            validator.exit_epoch = Some(epoch);
            matched += 1;
        }
        tracing::info!(
            "[EXITS] {} matched {} of {} records",
            source.as_str(),
            matched,
            records.len()
        );
    }
    validators
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitStatistics {
    pub total: usize,
    pub active: usize,
    pub exited: usize,
    /// Percent of all validators that have exited, two decimals.
    pub exit_rate: f64,
    pub voluntary: usize,
    pub attester_slashings: usize,
    pub proposer_slashings: usize,
}

pub fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        return 0.0;
    }
    ((part as f64 / whole as f64) * 10_000.0).round() / 100.0
}

pub fn exit_statistics(validators: &[ValidatorRecord]) -> ExitStatistics {
    let mut stats = ExitStatistics {
        total: validators.len(),
        ..ExitStatistics::default()
    };
    for validator in validators {
        if !validator.exited {
            continue;
        }
        stats.exited += 1;
        match validator.exit_type {
            Some(ExitType::Voluntary) => stats.voluntary += 1,
            Some(ExitType::AttesterSlashing) => stats.attester_slashings += 1,
            Some(ExitType::ProposerSlashing) => stats.proposer_slashings += 1,
            None => {}
        }
    }
    stats.active = stats.total - stats.exited;
    stats.exit_rate = percent(stats.exited, stats.total);
    stats
}
