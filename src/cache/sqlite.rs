use super::{ArtifactKey, CacheStore, StoredArtifact};
use crate::error::CacheIoError;
use rusqlite::ffi::ErrorCode;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::time::Duration;

const MAX_LOCK_ATTEMPTS: u32 = 6;
const BUSY_TIMEOUT: Duration = Duration::from_millis(2_000);
const LOCK_RETRY_STEP: Duration = Duration::from_millis(25);
const SCHEMA_KEY: &str = "schema";

/// Artifacts kept as rows of a single `artifacts` table keyed by artifact name.
#[derive(Debug, Clone)]
pub struct SqliteCacheStore {
    path: PathBuf,
}

impl SqliteCacheStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, CacheIoError> {
        let store = Self {
            path: path.as_ref().to_path_buf(),
        };
        if let Some(parent) = store.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|err| CacheIoError::Write {
                    key: SCHEMA_KEY.to_string(),
                    reason: format!("{}: {err}", parent.display()),
                })?;
            }
        }
        store.ensure_schema()?;
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn ensure_schema(&self) -> Result<(), CacheIoError> {
        self.with_connection(SCHEMA_KEY, Access::Write, |conn| {
            conn.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS artifacts (
                    artifact_key TEXT PRIMARY KEY NOT NULL,
                    written_at_ms INTEGER NOT NULL,
                    payload TEXT NOT NULL
                );
                "#,
            )?;
            if let Err(err) = conn.execute_batch(
                r#"
                PRAGMA journal_mode = WAL;
                PRAGMA synchronous = NORMAL;
                "#,
            ) {
                tracing::debug!(
                    "[CACHE] {} keeps default journal mode: {}",
                    self.path.display(),
                    err
                );
            }
            Ok(())
        })
    }

    /// Runs `op` on a fresh connection, retrying while another process holds the artifact
    /// table. Any other failure is reported against `key` immediately.
    fn with_connection<T, F>(&self, key: &str, access: Access, op: F) -> Result<T, CacheIoError>
    where
        F: Fn(&Connection) -> rusqlite::Result<T>,
    {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let conn = Connection::open(&self.path).map_err(|err| {
                access.error(key, format!("cannot open {}: {err}", self.path.display()))
            })?;
            conn.busy_timeout(BUSY_TIMEOUT)
                .map_err(|err| access.error(key, format!("busy timeout rejected: {err}")))?;

            match op(&conn) {
                Ok(value) => return Ok(value),
                Err(err) if artifact_table_busy(&err) && attempt < MAX_LOCK_ATTEMPTS => {
                    tracing::debug!(
                        "[CACHE] {} busy on attempt {}/{}, retrying",
                        key,
                        attempt,
                        MAX_LOCK_ATTEMPTS
                    );
                    std::thread::sleep(LOCK_RETRY_STEP * attempt);
                }
                Err(err) if artifact_table_busy(&err) => {
                    return Err(access.error(
                        key,
                        format!("still locked after {attempt} attempts: {err}"),
                    ));
                }
                Err(err) => return Err(access.error(key, err.to_string())),
            }
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Access {
    Read,
    Write,
}

impl Access {
    fn error(self, key: &str, reason: String) -> CacheIoError {
        let key = key.to_string();
        match self {
            Access::Read => CacheIoError::Read { key, reason },
            Access::Write => CacheIoError::Write { key, reason },
        }
    }
}

fn artifact_table_busy(err: &rusqlite::Error) -> bool {
    matches!(
        err.sqlite_error_code(),
        Some(ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked)
    )
}

impl CacheStore for SqliteCacheStore {
    fn read(&self, key: ArtifactKey) -> Result<Option<StoredArtifact>, CacheIoError> {
        let row = self
            .with_connection(key.as_str(), Access::Read, |conn| {
                conn.query_row(
                    "SELECT written_at_ms, payload FROM artifacts WHERE artifact_key = ?1",
                    params![key.as_str()],
                    |row| Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?)),
                )
                .optional()
            })?;

        let Some((written_at_ms, raw)) = row else {
            return Ok(None);
        };
        let payload = serde_json::from_str(&raw).map_err(|err| CacheIoError::Decode {
            key: key.as_str().to_string(),
            reason: err.to_string(),
        })?;
        Ok(Some(StoredArtifact {
            payload,
            written_at_ms: written_at_ms.max(0) as u64,
        }))
    }

    fn write(
        &self,
        key: ArtifactKey,
        payload: &serde_json::Value,
        written_at_ms: u64,
    ) -> Result<(), CacheIoError> {
        let raw = serde_json::to_string(payload).map_err(|err| CacheIoError::Write {
            key: key.as_str().to_string(),
            reason: err.to_string(),
        })?;
        let written_at = i64::try_from(written_at_ms).unwrap_or(i64::MAX);
        self.with_connection(key.as_str(), Access::Write, |conn| {
            conn.execute(
                r#"
                INSERT INTO artifacts (artifact_key, written_at_ms, payload)
                VALUES (?1, ?2, ?3)
                ON CONFLICT(artifact_key) DO UPDATE SET
                    written_at_ms = excluded.written_at_ms,
                    payload = excluded.payload
                "#,
                params![key.as_str(), written_at, raw],
            )
        })
        .map(|_| ())
    }
}
