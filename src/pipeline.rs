//! Label Assignment Pipeline.
//!
//! Steps run in strict precedence and each only fills an empty label. The one exception is
//! the final operator refinement, which rewrites the parent liquid-staking label into
//! `"<parent> - <operator name>"`. Every step is a keyed lookup, so the outcome never depends
//! on input row order.

use crate::config::known::{contract_entity, is_batch_contract, LIDO_ENTITY};
use crate::directory::EntityDirectory;
use crate::funding::{BatchFundingIndex, ExchangeSenders};
use crate::model::{
    BlsPubkey, FundingTrace, LabelSource, OperatorRecord, SigningKeyRecord, ValidatorRecord,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub struct PipelineInputs<'a> {
    pub directory: &'a EntityDirectory,
    pub funding_traces: &'a [FundingTrace],
    pub exchange_senders: &'a ExchangeSenders,
    pub operators: &'a [OperatorRecord],
    pub signing_keys: &'a [SigningKeyRecord],
}

/// Validators labelled by each step in one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepCounts {
    pub directory: usize,
    pub contract_table: usize,
    pub batch_funding: usize,
    pub exchange_sender: usize,
    pub refined: usize,
    pub unlabeled: usize,
}

/// Operator id to name. A re-registered id keeps its earliest name.
fn operator_names(operators: &[OperatorRecord]) -> HashMap<u64, &str> {
    let mut best: HashMap<u64, &OperatorRecord> = HashMap::new();
    for op in operators {
        best.entry(op.operator_id)
            .and_modify(|current| {
                if (op.source_block, op.name.as_str()) < (current.source_block, current.name.as_str())
                {
                    *current = op;
                }
            })
            .or_insert(op);
    }
    best.into_iter()
        .map(|(id, op)| (id, op.name.as_str()))
        .collect()
}

/// Pubkey to operator id. A key registered twice keeps its earliest registration.
fn key_owners(signing_keys: &[SigningKeyRecord]) -> HashMap<BlsPubkey, u64> {
    let mut best: HashMap<BlsPubkey, (u64, u64)> = HashMap::new();
    for key in signing_keys {
        let candidate = (key.source_block, key.operator_id);
        best.entry(key.pubkey)
            .and_modify(|current| {
                if candidate < *current {
                    *current = candidate;
                }
            })
            .or_insert(candidate);
    }
    best.into_iter()
        .map(|(pubkey, (_, operator_id))| (pubkey, operator_id))
        .collect()
}

pub fn refined_label(parent: &str, operator_name: &str) -> String {
    format!("{parent} - {operator_name}")
}

pub fn assign(
    mut validators: Vec<ValidatorRecord>,
    inputs: &PipelineInputs<'_>,
) -> (Vec<ValidatorRecord>, StepCounts) {
    let mut counts = StepCounts::default();
    let batch_index = BatchFundingIndex::new(inputs.funding_traces);

    for validator in validators.iter_mut() {
        let Some(depositor) = validator.depositor_address else {
            continue;
        };

        if let Some(name) = inputs.directory.entity_for(&depositor) {
            if validator.label_if_empty(name, LabelSource::Directory) {
                counts.directory += 1;
            }
        }
        if let Some((name, _)) = contract_entity(&depositor) {
            if validator.label_if_empty(name, LabelSource::ContractTable) {
                counts.contract_table += 1;
            }
        }
        if !validator.is_labeled() && is_batch_contract(&depositor) {
            if let Some(name) = batch_index.entity_for(&validator.pubkey, inputs.directory) {
                if validator.label_if_empty(&name, LabelSource::BatchFunding) {
                    counts.batch_funding += 1;
                }
            }
        }
        if let Some(name) = inputs.exchange_senders.entity_for(&depositor) {
            if validator.label_if_empty(name, LabelSource::ExchangeSender) {
                counts.exchange_sender += 1;
            }
        }
    }

    let names = operator_names(inputs.operators);
    let owners = key_owners(inputs.signing_keys);
    for validator in validators.iter_mut() {
        if validator.entity.as_deref() != Some(LIDO_ENTITY) {
            continue;
        }
        let Some(name) = owners
            .get(&validator.pubkey)
            .and_then(|id| names.get(id))
        else {
            continue;
        };
        validator.entity = Some(refined_label(LIDO_ENTITY, name));
        validator.label_source = Some(LabelSource::OperatorRefinement);
        counts.refined += 1;
    }

    counts.unlabeled = validators.iter().filter(|v| !v.is_labeled()).count();
    tracing::info!(
        "[PIPELINE] directory={} contract_table={} batch_funding={} exchange_sender={} refined={} unlabeled={}",
        counts.directory,
        counts.contract_table,
        counts.batch_funding,
        counts.exchange_sender,
        counts.refined,
        counts.unlabeled
    );
    (validators, counts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::known::BATCH_CONTRACTS;
    use crate::directory::registry::RegistryEntry;
    use crate::funding::ExchangeSenderSet;
    use crate::model::EntityCategory;
    use alloy::primitives::{Address, B256};

    fn funded(index: u64, key: u8, depositor: Address) -> ValidatorRecord {
        let mut record = ValidatorRecord::new(index, BlsPubkey::repeat_byte(key));
        record.depositor_address = Some(depositor);
        record
    }

    fn directory_with(entries: &[(Address, &str)]) -> EntityDirectory {
        let mut directory = EntityDirectory::default();
        directory.merge_entries(
            &entries
                .iter()
                .map(|(address, name)| RegistryEntry {
                    address: *address,
                    name: name.to_string(),
                    category: EntityCategory::Other,
                })
                .collect::<Vec<_>>(),
        );
        directory
    }

    #[test]
    fn test_directory_label_is_not_downgraded_by_exchange_heuristic() {
        let depositor = Address::repeat_byte(0x10);
        let directory = directory_with(&[(depositor, "figment")]);
        let senders = ExchangeSenders {
            exchanges: vec![ExchangeSenderSet {
                entity: "coinbase".into(),
                senders: [depositor].into_iter().collect(),
            }],
        };
        let (out, counts) = assign(
            vec![funded(1, 1, depositor)],
            &PipelineInputs {
                directory: &directory,
                funding_traces: &[],
                exchange_senders: &senders,
                operators: &[],
                signing_keys: &[],
            },
        );
        assert_eq!(out[0].entity.as_deref(), Some("figment"));
        assert_eq!(counts.directory, 1);
        assert_eq!(counts.exchange_sender, 0);
    }

    #[test]
    fn test_refinement_only_touches_parent_label() {
        let lido_depositor = Address::repeat_byte(0x20);
        let other_depositor = Address::repeat_byte(0x21);
        let directory = directory_with(&[(lido_depositor, "lido"), (other_depositor, "figment")]);
        let operators = [OperatorRecord {
            operator_id: 4,
            name: "Staking Facilities".into(),
            source_block: 10,
        }];
        let keys = [
            SigningKeyRecord {
                operator_id: 4,
                pubkey: BlsPubkey::repeat_byte(1),
                source_block: 11,
            },
            SigningKeyRecord {
                operator_id: 4,
                pubkey: BlsPubkey::repeat_byte(2),
                source_block: 11,
            },
        ];
        let inputs = PipelineInputs {
            directory: &directory,
            funding_traces: &[],
            exchange_senders: &ExchangeSenders::default(),
            operators: &operators,
            signing_keys: &keys,
        };
        let (out, counts) = assign(
            vec![funded(1, 1, lido_depositor), funded(2, 2, other_depositor)],
            &inputs,
        );
        assert_eq!(out[0].entity.as_deref(), Some("lido - Staking Facilities"));
        assert_eq!(out[0].label_source, Some(LabelSource::OperatorRefinement));
        assert_eq!(out[1].entity.as_deref(), Some("figment"));
        assert_eq!(counts.refined, 1);

        let (again, _) = assign(out.clone(), &inputs);
        assert_eq!(again, out);
    }

    #[test]
    fn test_batch_deposit_without_trace_stays_unlabeled() {
        let batch = BATCH_CONTRACTS[0];
        let traced = FundingTrace {
            tx_hash: B256::repeat_byte(9),
            pubkey: BlsPubkey::repeat_byte(9),
            intermediate_funder: Address::repeat_byte(0x30),
            ultimate_funder: Address::repeat_byte(0x31),
        };
        let (out, counts) = assign(
            vec![funded(1, 9, batch), funded(2, 8, batch)],
            &PipelineInputs {
                directory: &EntityDirectory::with_static_contracts(),
                funding_traces: &[traced],
                exchange_senders: &ExchangeSenders::default(),
                operators: &[],
                signing_keys: &[],
            },
        );
        assert_eq!(out[0].entity.as_deref(), Some("kiln"));
        assert_eq!(out[1].entity, None);
        assert_eq!(counts.batch_funding, 1);
        assert_eq!(counts.unlabeled, 1);
    }
}
