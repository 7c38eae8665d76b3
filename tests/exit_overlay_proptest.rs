use alloy::primitives::{Address, B256};
use proptest::prelude::*;
use proptest::test_runner::{Config as ProptestConfig, TestRunner};
use std::collections::HashMap;
use validator_labels::config::known::BATCH_CONTRACTS;
use validator_labels::deposits::correlate;
use validator_labels::directory::registry::RegistryEntry;
use validator_labels::directory::EntityDirectory;
use validator_labels::exits::apply_exits;
use validator_labels::funding::ExchangeSenders;
use validator_labels::model::{
    BlsPubkey, DepositRecord, EntityCategory, ExitRecord, ExitType, FundingTrace,
    ValidatorRecord,
};
use validator_labels::pipeline::{assign, PipelineInputs};

const CASES: u32 = 512;

fn validators(count: u64) -> Vec<ValidatorRecord> {
    (0..count)
        .map(|i| ValidatorRecord::new(i, BlsPubkey::repeat_byte(i as u8)))
        .collect()
}

fn exits(exit_type: ExitType, raw: &[(u64, u64)]) -> Vec<ExitRecord> {
    raw.iter()
        .map(|(validator_index, epoch)| ExitRecord {
            validator_index: *validator_index,
            epoch: *epoch,
            exit_type,
        })
        .collect()
}

#[test]
fn test_exit_precedence_example() {
    let out = apply_exits(
        validators(5),
        &exits(ExitType::Voluntary, &[(1, 10), (3, 20)]),
        &exits(ExitType::AttesterSlashing, &[(3, 25)]),
        &[],
    );
    assert_eq!(out[1].exit_type, Some(ExitType::Voluntary));
    assert_eq!(out[3].exit_type, Some(ExitType::AttesterSlashing));
    assert_eq!(out[3].exit_epoch, Some(25));
    assert!(!out[0].exited);
    assert_eq!(out[0].exit_epoch, None);
}

#[test]
fn test_exit_overlay_last_source_wins_proptest() {
    let mut runner = TestRunner::new(ProptestConfig {
        cases: CASES,
        ..ProptestConfig::default()
    });
    let source = prop::collection::vec((0u64..40, 0u64..1_000), 0..30);
    let strategy = (source.clone(), source.clone(), source);

    let result = runner.run(&strategy, |(voluntary, attester, proposer)| {
        let out = apply_exits(
            validators(32),
            &exits(ExitType::Voluntary, &voluntary),
            &exits(ExitType::AttesterSlashing, &attester),
            &exits(ExitType::ProposerSlashing, &proposer),
        );
        prop_assert_eq!(out.len(), 32);

        let earliest = |raw: &[(u64, u64)], index: u64| {
            raw.iter()
                .filter(|(i, _)| *i == index)
                .map(|(_, epoch)| *epoch)
                .min()
        };
        for record in &out {
            let index = record.validator_index;
            let expected = earliest(&proposer, index)
                .map(|e| (ExitType::ProposerSlashing, e))
                .or_else(|| earliest(&attester, index).map(|e| (ExitType::AttesterSlashing, e)))
                .or_else(|| earliest(&voluntary, index).map(|e| (ExitType::Voluntary, e)));
            match expected {
                Some((exit_type, epoch)) => {
                    prop_assert!(record.exited);
                    prop_assert_eq!(record.exit_type, Some(exit_type));
                    prop_assert_eq!(record.exit_epoch, Some(epoch));
                }
                None => {
                    prop_assert!(!record.exited);
                    prop_assert_eq!(record.exit_type, None);
                    prop_assert_eq!(record.exit_epoch, None);
                }
            }
        }
        Ok(())
    });

    if let Err(err) = result {
        panic!("exit overlay proptest failed: {err}");
    }
}

fn deposit(key: u8, depositor: Address, block: u64, tx: u8) -> DepositRecord {
    DepositRecord {
        pubkey: BlsPubkey::repeat_byte(key),
        depositor_address: depositor,
        amount: 32_000_000_000,
        block_number: block,
        tx_hash: B256::repeat_byte(tx),
    }
}

fn depositor_pool() -> Vec<Address> {
    vec![
        Address::repeat_byte(0xa1),
        Address::repeat_byte(0xa2),
        Address::repeat_byte(0xa3),
        BATCH_CONTRACTS[0],
        BATCH_CONTRACTS[1],
    ]
}

fn directory() -> EntityDirectory {
    let mut directory = EntityDirectory::with_static_contracts();
    directory.merge_entries(&[
        RegistryEntry {
            address: Address::repeat_byte(0xa1),
            name: "figment".into(),
            category: EntityCategory::StakingPool,
        },
        RegistryEntry {
            address: Address::repeat_byte(0xa2),
            name: "lido".into(),
            category: EntityCategory::LiquidStaking,
        },
    ]);
    directory
}

fn run_pipeline(deposits: &[DepositRecord], traces: &[FundingTrace]) -> Vec<ValidatorRecord> {
    let directory = directory();
    let senders = ExchangeSenders::default();
    let (out, _) = assign(
        correlate(deposits, &validators(24)),
        &PipelineInputs {
            directory: &directory,
            funding_traces: traces,
            exchange_senders: &senders,
            operators: &[],
            signing_keys: &[],
        },
    );
    out
}

#[test]
fn test_labels_independent_of_row_order_proptest() {
    let mut runner = TestRunner::new(ProptestConfig {
        cases: CASES,
        ..ProptestConfig::default()
    });
    let deposits = prop::collection::vec((0u8..24, 0usize..5, 0u64..50, any::<u8>()), 0..48);
    let funders = prop::collection::vec((0u8..24, 0usize..5), 0..24);
    let strategy = (deposits, funders, any::<u64>());

    let result = runner.run(&strategy, |(raw_deposits, raw_traces, seed)| {
        let pool = depositor_pool();
        let deposits: Vec<DepositRecord> = raw_deposits
            .iter()
            .map(|(key, who, block, tx)| deposit(*key, pool[*who], *block, *tx))
            .collect();
        let traces: Vec<FundingTrace> = raw_traces
            .iter()
            .map(|(key, who)| FundingTrace {
                tx_hash: B256::repeat_byte(*key),
                pubkey: BlsPubkey::repeat_byte(*key),
                intermediate_funder: BATCH_CONTRACTS[0],
                ultimate_funder: pool[*who],
            })
            .collect();

        let baseline = run_pipeline(&deposits, &traces);

        // Deterministic shuffle driven by the generated seed.
        let mut order: Vec<(u64, usize)> = (0..deposits.len())
            .map(|i| (seed.rotate_left(i as u32) ^ (i as u64).wrapping_mul(0x9e37_79b9), i))
            .collect();
        order.sort();
        let shuffled_deposits: Vec<DepositRecord> =
            order.iter().map(|(_, i)| deposits[*i].clone()).collect();
        let mut reversed_traces = traces.clone();
        reversed_traces.reverse();

        let shuffled = run_pipeline(&shuffled_deposits, &reversed_traces);
        prop_assert_eq!(&baseline, &shuffled);

        let labels: HashMap<u64, Option<String>> = baseline
            .iter()
            .map(|r| (r.validator_index, r.entity.clone()))
            .collect();
        prop_assert_eq!(labels.len(), 24);
        for record in &baseline {
            if record.depositor_address.is_none() {
                prop_assert!(record.entity.is_none());
            }
        }
        Ok(())
    });

    if let Err(err) = result {
        panic!("pipeline determinism proptest failed: {err}");
    }
}

#[test]
fn test_batch_deposit_without_trace_stays_unlabeled() {
    let out = run_pipeline(&[deposit(5, BATCH_CONTRACTS[1], 10, 1)], &[]);
    assert_eq!(out[5].depositor_address, Some(BATCH_CONTRACTS[1]));
    assert_eq!(out[5].entity, None);
}
