//! Entity Directory: address to entity name, merged from the curated registries and the
//! static contract table.

pub mod registry;

use crate::config::known::CONTRACT_ENTITIES;
use crate::error::RegistryParseError;
use crate::http::HttpFetcher;
use crate::model::EntityDefinition;
use crate::utils::error::compact_error_message;
use alloy::primitives::Address;
use registry::{normalize_name, parse_registry, RegistryEntry, RegistryKind};
use std::collections::{BTreeMap, BTreeSet, HashMap};

pub use registry::ParsedRegistry;

const LOG_ERR_MAX_LEN: usize = 240;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityDirectory {
    entities: BTreeMap<String, EntityDefinition>,
    by_address: HashMap<Address, String>,
}

impl EntityDirectory {
    /// Directory holding only the static contract table.
    pub fn with_static_contracts() -> Self {
        let mut directory = Self::default();
        directory.merge_static_contracts();
        directory
    }

    /// Rebuild from persisted definitions. The static table is merged back in so an artifact
    /// written by an older table never hides a newer static mapping.
    pub fn from_definitions(definitions: Vec<EntityDefinition>) -> Self {
        let mut directory = Self::default();
        for definition in definitions {
            let name = normalize_name(&definition.name);
            if name.is_empty() {
                continue;
            }
            let entry = directory
                .entities
                .entry(name.clone())
                .or_insert_with(|| EntityDefinition {
                    name,
                    category: definition.category,
                    addresses: BTreeSet::new(),
                });
            entry.addresses.extend(definition.addresses);
        }
        directory.merge_static_contracts();
        directory
    }

    /// Union registry entries into per-name address sets. The first category seen for a name
    /// is kept.
    pub fn merge_entries(&mut self, entries: &[RegistryEntry]) {
        for entry in entries {
            self.entities
                .entry(entry.name.clone())
                .or_insert_with(|| EntityDefinition {
                    name: entry.name.clone(),
                    category: entry.category,
                    addresses: BTreeSet::new(),
                })
                .addresses
                .insert(entry.address);
        }
        self.rebuild_index();
    }

    fn merge_static_contracts(&mut self) {
        for (address, name, category) in CONTRACT_ENTITIES {
            self.entities
                .entry((*name).to_string())
                .or_insert_with(|| EntityDefinition {
                    name: (*name).to_string(),
                    category: *category,
                    addresses: BTreeSet::new(),
                })
                .addresses
                .insert(*address);
        }
        self.rebuild_index();
    }

    // An address claimed by several names resolves to the static table's name if it has
    // one, otherwise to the lexicographically first name.
    fn rebuild_index(&mut self) {
        let mut by_address: HashMap<Address, String> = CONTRACT_ENTITIES
            .iter()
            .map(|(address, name, _)| (*address, (*name).to_string()))
            .collect();
        for (name, definition) in &self.entities {
            for address in &definition.addresses {
                by_address
                    .entry(*address)
                    .or_insert_with(|| name.clone());
            }
        }
        self.by_address = by_address;
    }

    pub fn entity_for(&self, address: &Address) -> Option<&str> {
        self.by_address.get(address).map(String::as_str)
    }

    pub fn addresses_for(&self, name: &str) -> BTreeSet<Address> {
        self.entities
            .get(&normalize_name(name))
            .map(|d| d.addresses.clone())
            .unwrap_or_default()
    }

    pub fn definitions(&self) -> Vec<EntityDefinition> {
        self.entities.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    pub fn address_count(&self) -> usize {
        self.by_address.len()
    }
}

#[derive(Debug, Clone)]
pub struct DirectoryRefresh {
    pub directory: EntityDirectory,
    /// Names of sources that contributed nothing this cycle.
    pub degraded: Vec<String>,
}

impl DirectoryRefresh {
    pub fn is_complete(&self) -> bool {
        self.degraded.is_empty()
    }
}

async fn load_source(
    fetcher: &dyn HttpFetcher,
    source_name: &str,
    kind: RegistryKind,
    url: &str,
) -> Result<ParsedRegistry, RegistryParseError> {
    let text = fetcher
        .get_text(url)
        .await
        .map_err(|err| RegistryParseError {
            source_name: source_name.to_string(),
            reason: err.to_string(),
        })?;
    parse_registry(source_name, kind, &text)
}

fn log_contribution(source_name: &str, parsed: &ParsedRegistry) {
    if parsed.skipped > 0 {
        tracing::warn!(
            "[DIRECTORY] {} skipped {} malformed rows",
            source_name,
            parsed.skipped
        );
    }
    tracing::info!(
        "[DIRECTORY] {} contributed {} address rows",
        source_name,
        parsed.entries.len()
    );
}

fn log_degraded(source_name: &str, err: &RegistryParseError) -> String {
    tracing::warn!(
        "[DIRECTORY] {} degraded, continuing without it: {}",
        source_name,
        compact_error_message(&err.to_string(), LOG_ERR_MAX_LEN)
    );
    source_name.to_string()
}

/// Exchange rows only add addresses to entities the general registry already names.
/// Returns the kept rows and how many were dropped.
fn exchange_entries_for_known(
    known_names: &BTreeSet<String>,
    entries: Vec<RegistryEntry>,
) -> (Vec<RegistryEntry>, usize) {
    let total = entries.len();
    let kept: Vec<RegistryEntry> = entries
        .into_iter()
        .filter(|entry| known_names.contains(&entry.name))
        .collect();
    let dropped = total - kept.len();
    (kept, dropped)
}

/// Fetch both registries concurrently and merge them over the static table. Exchange rows
/// extend general-registry entities and never introduce new ones. A source that cannot be
/// fetched or parsed is dropped for this cycle only.
pub async fn refresh_directory(
    fetcher: &dyn HttpFetcher,
    registry_url: &str,
    cex_registry_url: &str,
) -> DirectoryRefresh {
    let (general, exchange) = tokio::join!(
        load_source(fetcher, "general_registry", RegistryKind::General, registry_url),
        load_source(fetcher, "cex_registry", RegistryKind::Exchange, cex_registry_url),
    );

    let mut directory = EntityDirectory::with_static_contracts();
    let mut degraded = Vec::new();
    let mut known_names = BTreeSet::new();
    match general {
        Ok(parsed) => {
            log_contribution("general_registry", &parsed);
            known_names.extend(parsed.entries.iter().map(|e| e.name.clone()));
            directory.merge_entries(&parsed.entries);
        }
        Err(err) => degraded.push(log_degraded("general_registry", &err)),
    }
    match exchange {
        Ok(parsed) => {
            log_contribution("cex_registry", &parsed);
            let (kept, unknown) = exchange_entries_for_known(&known_names, parsed.entries);
            if unknown > 0 {
                tracing::debug!(
                    "[DIRECTORY] cex_registry: {} rows name exchanges without depositor entries",
                    unknown
                );
            }
            directory.merge_entries(&kept);
        }
        Err(err) => degraded.push(log_degraded("cex_registry", &err)),
    }
    tracing::info!(
        "[DIRECTORY] {} entities, {} addresses",
        directory.len(),
        directory.address_count()
    );
    DirectoryRefresh {
        directory,
        degraded,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EntityCategory;
    use alloy::primitives::address;

    fn entry(addr: Address, name: &str) -> RegistryEntry {
        RegistryEntry {
            address: addr,
            name: name.to_string(),
            category: EntityCategory::from_entity_name(name),
        }
    }

    #[test]
    fn test_static_contracts_always_present() {
        let directory = EntityDirectory::with_static_contracts();
        let rocket = address!("dcd51fc5cd918e0461b9b7fb75967fdfd10dae2f");
        assert_eq!(directory.entity_for(&rocket), Some("rocket pool"));
        assert!(directory.addresses_for("Rocket Pool").contains(&rocket));
    }

    #[test]
    fn test_merge_unions_addresses_per_name() {
        let mut directory = EntityDirectory::default();
        let a = Address::repeat_byte(0x0a);
        let b = Address::repeat_byte(0x0b);
        directory.merge_entries(&[entry(a, "lido"), entry(b, "lido")]);
        assert_eq!(directory.addresses_for("LIDO").len(), 2);
        assert_eq!(directory.entity_for(&b), Some("lido"));
        let lido = directory
            .definitions()
            .into_iter()
            .find(|d| d.name == "lido")
            .expect("lido defined");
        assert_eq!(lido.category, EntityCategory::LiquidStaking);
    }

    #[test]
    fn test_conflicting_address_resolves_to_first_name() {
        let mut directory = EntityDirectory::default();
        let shared = Address::repeat_byte(0x0c);
        directory.merge_entries(&[entry(shared, "zeta"), entry(shared, "alpha")]);
        assert_eq!(directory.entity_for(&shared), Some("alpha"));
    }

    #[test]
    fn test_static_table_wins_address_conflicts() {
        let rocket = address!("dcd51fc5cd918e0461b9b7fb75967fdfd10dae2f");
        let mut directory = EntityDirectory::with_static_contracts();
        directory.merge_entries(&[entry(rocket, "aardvark")]);
        assert_eq!(directory.entity_for(&rocket), Some("rocket pool"));
    }

    #[test]
    fn test_definitions_round_trip_through_artifact_shape() {
        let mut directory = EntityDirectory::with_static_contracts();
        directory.merge_entries(&[entry(Address::repeat_byte(0x0d), "figment")]);
        let rebuilt = EntityDirectory::from_definitions(directory.definitions());
        assert_eq!(rebuilt, directory);
    }

    struct StaticFetcher(HashMap<&'static str, String>);

    #[async_trait::async_trait]
    impl HttpFetcher for StaticFetcher {
        async fn get_text(&self, url: &str) -> Result<String, crate::error::NetError> {
            self.0
                .get(url)
                .cloned()
                .ok_or_else(|| crate::error::NetError::permanent(url, "HTTP 404"))
        }
    }

    #[test]
    fn test_exchange_rows_need_a_general_entity() {
        let known: BTreeSet<String> = ["coinbase".to_string()].into_iter().collect();
        let (kept, dropped) = exchange_entries_for_known(
            &known,
            vec![
                entry(Address::repeat_byte(0x01), "coinbase"),
                entry(Address::repeat_byte(0x02), "binance"),
            ],
        );
        assert_eq!(dropped, 1);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].name, "coinbase");
    }

    #[tokio::test]
    async fn test_refresh_extends_known_exchanges_only() {
        let depositor = Address::repeat_byte(0x21);
        let hot_wallet = Address::repeat_byte(0x22);
        let stray = Address::repeat_byte(0x23);
        let fetcher = StaticFetcher(HashMap::from([
            (
                "https://registry.test/general",
                format!("('{depositor}', 'Coinbase')"),
            ),
            (
                "https://registry.test/cex",
                format!(
                    "('ethereum', 'Coinbase', '{hot_wallet}', 'Coinbase 10'),\n\
                     ('ethereum', 'Binance', '{stray}', 'Binance 14')"
                ),
            ),
        ]));

        let refreshed = refresh_directory(
            &fetcher,
            "https://registry.test/general",
            "https://registry.test/cex",
        )
        .await;
        assert!(refreshed.is_complete());
        let coinbase = refreshed.directory.addresses_for("coinbase");
        assert!(coinbase.contains(&depositor));
        assert!(coinbase.contains(&hot_wallet));
        assert_eq!(refreshed.directory.entity_for(&stray), None);
        assert!(refreshed.directory.addresses_for("binance").is_empty());
    }

    #[tokio::test]
    async fn test_exchange_registry_alone_adds_nothing() {
        let fetcher = StaticFetcher(HashMap::from([(
            "https://registry.test/cex",
            format!("('ethereum', 'Kraken', '{}', 'Kraken 2')", Address::repeat_byte(0x31)),
        )]));
        let refreshed = refresh_directory(
            &fetcher,
            "https://registry.test/general",
            "https://registry.test/cex",
        )
        .await;
        assert_eq!(refreshed.degraded, vec!["general_registry".to_string()]);
        assert_eq!(
            refreshed.directory,
            EntityDirectory::with_static_contracts()
        );
    }
}
