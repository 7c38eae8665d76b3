use crate::exits::{exit_statistics, percent, ExitStatistics};
use crate::model::ValidatorRecord;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityStatistics {
    pub entity: String,
    pub count: usize,
    pub exited_count: usize,
    pub active_count: usize,
    /// Percent of this entity's validators that have exited, two decimals.
    pub exit_rate: f64,
    /// This entity's share of all validators, two decimals.
    pub percentage: f64,
}

/// Immutable snapshot of one labelling cycle, indexed for the read-only query surface.
#[derive(Debug, Clone, Default)]
pub struct LabelTable {
    records: Vec<ValidatorRecord>,
    positions: HashMap<u64, usize>,
    by_entity: BTreeMap<String, Vec<u64>>,
    folded: HashMap<String, Vec<String>>,
}

impl LabelTable {
    pub fn new(mut records: Vec<ValidatorRecord>) -> Self {
        records.sort_by_key(|r| r.validator_index);
        records.dedup_by_key(|r| r.validator_index);

        let positions = records
            .iter()
            .enumerate()
            .map(|(pos, r)| (r.validator_index, pos))
            .collect();
        let mut by_entity: BTreeMap<String, Vec<u64>> = BTreeMap::new();
        for record in &records {
            if let Some(entity) = record.entity.as_deref().filter(|e| !e.is_empty()) {
                by_entity
                    .entry(entity.to_string())
                    .or_default()
                    .push(record.validator_index);
            }
        }
        let mut folded: HashMap<String, Vec<String>> = HashMap::new();
        for entity in by_entity.keys() {
            folded
                .entry(entity.to_lowercase())
                .or_default()
                .push(entity.clone());
        }
        Self {
            records,
            positions,
            by_entity,
            folded,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ValidatorRecord] {
        &self.records
    }

    pub fn record(&self, validator_index: u64) -> Option<&ValidatorRecord> {
        self.positions
            .get(&validator_index)
            .map(|pos| &self.records[*pos])
    }

    pub fn label_for(&self, validator_index: u64) -> Option<&str> {
        self.record(validator_index)
            .and_then(|r| r.entity.as_deref())
            .filter(|e| !e.is_empty())
    }

    /// Indices labelled `entity`, compared case-insensitively, ascending.
    pub fn validators_of(&self, entity: &str) -> Vec<u64> {
        let Some(spellings) = self.folded.get(&entity.trim().to_lowercase()) else {
            return Vec::new();
        };
        let mut out: Vec<u64> = spellings
            .iter()
            .filter_map(|label| self.by_entity.get(label))
            .flatten()
            .copied()
            .collect();
        out.sort_unstable();
        out
    }

    pub fn active_validators_of(&self, entity: &str) -> Vec<u64> {
        self.validators_of(entity)
            .into_iter()
            .filter(|index| self.record(*index).is_some_and(|r| !r.exited))
            .collect()
    }

    /// One row per entity, largest first, ties by name. Unlabelled validators only count
    /// toward the `percentage` denominator.
    pub fn entity_statistics(&self) -> Vec<EntityStatistics> {
        let total = self.records.len();
        let mut rows: Vec<EntityStatistics> = self
            .by_entity
            .iter()
            .map(|(entity, indices)| {
                let exited_count = indices
                    .iter()
                    .filter(|index| self.record(**index).is_some_and(|r| r.exited))
                    .count();
                let count = indices.len();
                EntityStatistics {
                    entity: entity.clone(),
                    count,
                    exited_count,
                    active_count: count - exited_count,
                    exit_rate: percent(exited_count, count),
                    percentage: percent(count, total),
                }
            })
            .collect();
        rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.entity.cmp(&b.entity)));
        rows
    }

    pub fn exit_statistics(&self) -> ExitStatistics {
        exit_statistics(&self.records)
    }
}
