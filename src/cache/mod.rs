//! Persisted artifacts and their freshness.
//!
//! Every derived dataset the engine builds is stored as one whole artifact under an
//! [`ArtifactKey`]. Writes replace the artifact atomically; reads report whether the stored
//! copy is still younger than its TTL. A store that cannot be read is treated as a miss.

pub mod file;
pub mod memory;
pub mod sqlite;

use crate::error::CacheIoError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub use file::FileCacheStore;
pub use memory::MemoryCacheStore;
pub use sqlite::SqliteCacheStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ArtifactKey {
    EntityDirectory,
    RawDeposits,
    RawValidators,
    BatchFundingTraces,
    OperatorRegistry,
    OperatorSigningKeys,
    ExchangeSenders,
    ValidatorLabels,
}

impl ArtifactKey {
    pub const ALL: [ArtifactKey; 8] = [
        ArtifactKey::EntityDirectory,
        ArtifactKey::RawDeposits,
        ArtifactKey::RawValidators,
        ArtifactKey::BatchFundingTraces,
        ArtifactKey::OperatorRegistry,
        ArtifactKey::OperatorSigningKeys,
        ArtifactKey::ExchangeSenders,
        ArtifactKey::ValidatorLabels,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ArtifactKey::EntityDirectory => "entity_directory",
            ArtifactKey::RawDeposits => "raw_deposits",
            ArtifactKey::RawValidators => "raw_validators",
            ArtifactKey::BatchFundingTraces => "batch_funding_traces",
            ArtifactKey::OperatorRegistry => "operator_registry",
            ArtifactKey::OperatorSigningKeys => "operator_signing_keys",
            ArtifactKey::ExchangeSenders => "exchange_senders",
            ArtifactKey::ValidatorLabels => "validator_labels",
        }
    }

    fn slot(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArtifactTtls {
    ttls: [Duration; 8],
}

impl ArtifactTtls {
    pub fn uniform(ttl: Duration) -> Self {
        Self { ttls: [ttl; 8] }
    }

    pub fn get(&self, key: ArtifactKey) -> Duration {
        self.ttls[key.slot()]
    }

    pub fn set(&mut self, key: ArtifactKey, ttl: Duration) {
        self.ttls[key.slot()] = ttl;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredArtifact {
    pub payload: serde_json::Value,
    pub written_at_ms: u64,
}

/// Backing storage for artifacts. `write` must replace the whole artifact or nothing.
pub trait CacheStore: Send + Sync {
    fn read(&self, key: ArtifactKey) -> Result<Option<StoredArtifact>, CacheIoError>;
    fn write(
        &self,
        key: ArtifactKey,
        payload: &serde_json::Value,
        written_at_ms: u64,
    ) -> Result<(), CacheIoError>;
}

pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

/// Settable clock for freshness tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now_ms: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now_ms: AtomicU64::new(now_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now_ms.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now_ms
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now_ms.load(Ordering::SeqCst)
    }
}

pub fn is_fresh(written_at_ms: u64, now_ms: u64, ttl: Duration) -> bool {
    let age_ms = now_ms.saturating_sub(written_at_ms);
    u128::from(age_ms) < ttl.as_millis()
}

#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub written_at_ms: u64,
    pub fresh: bool,
}

#[derive(Clone)]
pub struct CacheManager {
    store: Arc<dyn CacheStore>,
    clock: Arc<dyn Clock>,
    ttls: ArtifactTtls,
}

impl CacheManager {
    pub fn new(store: Arc<dyn CacheStore>, clock: Arc<dyn Clock>, ttls: ArtifactTtls) -> Self {
        Self { store, clock, ttls }
    }

    pub fn ttl(&self, key: ArtifactKey) -> Duration {
        self.ttls.get(key)
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Load an artifact regardless of age. I/O and decode failures degrade to `None`.
    pub fn read<T: DeserializeOwned>(&self, key: ArtifactKey) -> Option<Cached<T>> {
        let stored = match self.store.read(key) {
            Ok(Some(stored)) => stored,
            Ok(None) => return None,
            Err(err) => {
                tracing::warn!("[CACHE] {} treated as miss: {}", key.as_str(), err);
                return None;
            }
        };
        let value = match serde_json::from_value::<T>(stored.payload) {
            Ok(value) => value,
            Err(err) => {
                let err = CacheIoError::Decode {
                    key: key.as_str().to_string(),
                    reason: err.to_string(),
                };
                tracing::warn!("[CACHE] {} treated as miss: {}", key.as_str(), err);
                return None;
            }
        };
        let fresh = is_fresh(stored.written_at_ms, self.clock.now_ms(), self.ttl(key));
        Some(Cached {
            value,
            written_at_ms: stored.written_at_ms,
            fresh,
        })
    }

    /// Load an artifact only if it is still within its TTL.
    pub fn read_fresh<T: DeserializeOwned>(&self, key: ArtifactKey) -> Option<T> {
        self.read(key)
            .filter(|cached| cached.fresh)
            .map(|cached| cached.value)
    }

    pub fn write<T: Serialize>(&self, key: ArtifactKey, value: &T) -> Result<(), CacheIoError> {
        let payload = serde_json::to_value(value).map_err(|err| CacheIoError::Write {
            key: key.as_str().to_string(),
            reason: err.to_string(),
        })?;
        self.store.write(key, &payload, self.clock.now_ms())
    }

    /// Write and log on failure; a lost artifact only costs a rebuild next cycle.
    pub fn write_or_warn<T: Serialize>(&self, key: ArtifactKey, value: &T) {
        if let Err(err) = self.write(key, value) {
            tracing::warn!("[CACHE] failed to persist {}: {}", key.as_str(), err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DAY: Duration = Duration::from_secs(24 * 60 * 60);

    #[test]
    fn test_freshness_boundary_around_seven_days() {
        let t0 = 1_700_000_000_000u64;
        let ttl = 7 * DAY;
        let almost = t0 + (6 * DAY + Duration::from_secs(23 * 3600)).as_millis() as u64;
        let past = t0 + (7 * DAY + Duration::from_secs(1)).as_millis() as u64;
        assert!(is_fresh(t0, almost, ttl));
        assert!(!is_fresh(t0, past, ttl));
        assert!(!is_fresh(t0, t0 + ttl.as_millis() as u64, ttl));
    }

    #[test]
    fn test_manager_reports_staleness_and_keeps_value() {
        let clock = Arc::new(ManualClock::new(1_000));
        let manager = CacheManager::new(
            Arc::new(MemoryCacheStore::default()),
            clock.clone(),
            ArtifactTtls::uniform(Duration::from_secs(10)),
        );
        manager
            .write(ArtifactKey::ExchangeSenders, &vec![1u64, 2, 3])
            .expect("write");
        assert_eq!(
            manager.read_fresh::<Vec<u64>>(ArtifactKey::ExchangeSenders),
            Some(vec![1, 2, 3])
        );

        clock.advance(Duration::from_secs(11));
        assert!(manager
            .read_fresh::<Vec<u64>>(ArtifactKey::ExchangeSenders)
            .is_none());
        let stale = manager
            .read::<Vec<u64>>(ArtifactKey::ExchangeSenders)
            .expect("stale copy still readable");
        assert!(!stale.fresh);
        assert_eq!(stale.value, vec![1, 2, 3]);
    }

    #[test]
    fn test_undecodable_payload_is_a_miss() {
        let manager = CacheManager::new(
            Arc::new(MemoryCacheStore::default()),
            Arc::new(ManualClock::new(0)),
            ArtifactTtls::uniform(DAY),
        );
        manager
            .write(ArtifactKey::RawValidators, &"not a list")
            .expect("write");
        assert!(manager
            .read::<Vec<u64>>(ArtifactKey::RawValidators)
            .is_none());
    }
}
