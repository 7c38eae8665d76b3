use super::{ArtifactKey, CacheStore, StoredArtifact};
use crate::error::CacheIoError;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

/// Process-local store for tests and dry runs. Can be told to fail writes.
#[derive(Debug, Default)]
pub struct MemoryCacheStore {
    artifacts: Mutex<HashMap<ArtifactKey, StoredArtifact>>,
    writes: AtomicU64,
    fail_writes: AtomicBool,
}

impl MemoryCacheStore {
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn contains(&self, key: ArtifactKey) -> bool {
        let guard = match self.artifacts.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        guard.contains_key(&key)
    }
}

impl CacheStore for MemoryCacheStore {
    fn read(&self, key: ArtifactKey) -> Result<Option<StoredArtifact>, CacheIoError> {
        let guard = match self.artifacts.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        Ok(guard.get(&key).cloned())
    }

    fn write(
        &self,
        key: ArtifactKey,
        payload: &serde_json::Value,
        written_at_ms: u64,
    ) -> Result<(), CacheIoError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CacheIoError::Write {
                key: key.as_str().to_string(),
                reason: "writes disabled".to_string(),
            });
        }
        let mut guard = match self.artifacts.lock() {
            Ok(g) => g,
            Err(p) => p.into_inner(),
        };
        guard.insert(
            key,
            StoredArtifact {
                payload: payload.clone(),
                written_at_ms,
            },
        );
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
