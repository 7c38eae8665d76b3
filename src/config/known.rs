use crate::model::EntityCategory;
use alloy::primitives::{address, Address};

/// Beacon chain deposit contract on mainnet.
pub const DEPOSIT_CONTRACT: Address = address!("00000000219ab540356cbb839cbe05303d7705fa");
/// Block the deposit contract was deployed in; nothing before it can fund a validator.
pub const DEPOSIT_CONTRACT_GENESIS_BLOCK: u64 = 11_184_524;

/// Aggregator contracts that deposit on behalf of many funders in one transaction.
pub const BATCH_CONTRACTS: &[Address] = &[
    address!("9b8c989ff27e948f55b53bb19b3cc1947852e394"), // Kiln 1
    address!("1e68238ce926dec62b3fbc99ab06eb1d85ce0270"), // Kiln 2
    address!("1bdc639eabf1c5ebc020bb79e2dd069a8b6fe865"), // BatchDeposit
    address!("e8239b17034c372cdf8a5f8d3ccb7cf1795c4572"), // Batch Deposit
];

/// Applied to batch deposits none of the more specific funder mappings recognise.
pub const AGGREGATOR_FALLBACK_ENTITY: &str = "kiln";

/// Depositor contracts that identify their entity directly.
pub const CONTRACT_ENTITIES: &[(Address, &str, EntityCategory)] = &[
    (address!("dcd51fc5cd918e0461b9b7fb75967fdfd10dae2f"), "rocket pool", EntityCategory::LiquidStaking),
    (address!("1cc9cf5586522c6f483e84a19c3c2b0b6d027bf0"), "rocket pool", EntityCategory::LiquidStaking),
    (address!("2fb42ffe2d7df8381853e96304300c6a5e846905"), "rocket pool", EntityCategory::LiquidStaking),
    (address!("9304b4ebfbe68932cf9af8de4d21d7e7621f701a"), "rocket pool", EntityCategory::LiquidStaking),
    (address!("672335b91b4f2096d897ca1b12ef4ec9346a5ff4"), "rocket pool", EntityCategory::LiquidStaking),
    (address!("2421a0af8badfae12e1c1700e369747d3db47b09"), "senseinode", EntityCategory::StakingPool),
    (address!("10e02a656b5f9de2c44c687787c36a2c4801cc40"), "tranchess", EntityCategory::LiquidStaking),
    (address!("447c3ee829a3b506ad0a66ff1089f30181c42637"), "hashking", EntityCategory::LiquidStaking),
    (address!("a8f50a6c41d67685b820b4fe6bed7e549e54a949"), "eth2stake", EntityCategory::StakingPool),
    (address!("f243a92eb7d4b4f6a00a57888b887bd01ec6fd12"), "myetherwallet", EntityCategory::StakingPool),
    (address!("73fd39ba4fb23c9b080fca0fcbe4c8c7a2d630d0"), "myetherwallet", EntityCategory::StakingPool),
    (address!("e7b385fb5d81259280b7d639df81513ab8b005e4"), "myetherwallet", EntityCategory::StakingPool),
    (address!("82ce843130ff0ae069c54118dfbfa6a5ea17158e"), "gemini", EntityCategory::Cex),
    (address!("24d729aae93a05a729e68504e5ccdfa3bb876491"), "gemini", EntityCategory::Cex),
    (address!("cf5ea1b38380f6af39068375516daf40ed70d299"), "stader", EntityCategory::LiquidStaking),
    (address!("4f4bfa0861f62309934a5551e0b2541ee82fdcf1"), "stader", EntityCategory::LiquidStaking),
    (address!("09134c643a6b95d342bdaf081fa473338f066572"), "stader", EntityCategory::LiquidStaking),
    (address!("d1a72bd052e0d65b7c26d3dd97a98b74acbbb6c5"), "stader", EntityCategory::LiquidStaking),
];

/// Senders known to fund a batch contract on behalf of a specific entity.
pub const BATCH_FUND_ORIGINS: &[(Address, &str, EntityCategory)] = &[
    (address!("617c8de5bde54ffbb8d92716cc947858ca38f582"), "mev protocol", EntityCategory::LiquidStaking),
    (address!("cdbf58a9a9b54a2c43800c50c7192946de858321"), "bitpanda", EntityCategory::Cex),
    (address!("b10edd6fa6067dba8d4326f1c8f0d1c791594f13"), "bitpanda", EntityCategory::Cex),
    (address!("f197c6f2ac14d25ee2789a73e4847732c7f16bc9"), "bitpanda", EntityCategory::Cex),
    (address!("ba1951df0c0a52af23857c5ab48b4c43a57e7ed1"), "golem foundation", EntityCategory::StakingPool),
    (address!("70d5ccc14a1a264c05ff48b3ec6751b0959541aa"), "binance us", EntityCategory::Cex),
];

/// Custodians whose deposit-address senders are treated as belonging to them.
/// Order matters: the first exchange whose sender set matches wins.
pub const EXCHANGE_SENDER_ENTITIES: &[&str] = &["coinbase", "binance"];

/// Liquid-staking operator registry emitting the decoded operator events.
pub const LIDO_OPERATOR_REGISTRY: Address = address!("55032650b14df07b85bf18a3a3ec8e0af2e028d5");
/// Canonical entity name the operator refinement applies to.
pub const LIDO_ENTITY: &str = "lido";
pub const NODE_OPERATOR_ADDED_EVENT: &str = "NodeOperatorAdded(uint256,string,address,uint64)";
pub const SIGNING_KEY_ADDED_EVENT: &str = "SigningKeyAdded(uint256,bytes)";

/// Staking depositor entities, one `('0x..', 'Entity')` tuple per depositor address.
pub const DEFAULT_REGISTRY_URL: &str = "https://raw.githubusercontent.com/duneanalytics/spellbook/main/dbt_subprojects/hourly_spellbook/models/_sector/staking/ethereum/entities/staking_ethereum_entities_depositor_addresses.sql";
/// Exchange wallets as `('ethereum', 'Exchange', '0x..', 'Label')` tuples.
pub const DEFAULT_CEX_REGISTRY_URL: &str = "https://raw.githubusercontent.com/duneanalytics/spellbook/main/dbt_subprojects/hourly_spellbook/models/_sector/cex/addresses/chains/cex_evms_addresses.sql";

pub fn contract_entity(address: &Address) -> Option<(&'static str, EntityCategory)> {
    CONTRACT_ENTITIES
        .iter()
        .find(|(candidate, _, _)| candidate == address)
        .map(|(_, name, category)| (*name, *category))
}

pub fn batch_fund_origin(address: &Address) -> Option<(&'static str, EntityCategory)> {
    BATCH_FUND_ORIGINS
        .iter()
        .find(|(candidate, _, _)| candidate == address)
        .map(|(_, name, category)| (*name, *category))
}

pub fn is_batch_contract(address: &Address) -> bool {
    BATCH_CONTRACTS.contains(address)
}
