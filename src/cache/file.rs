use super::{ArtifactKey, CacheStore, StoredArtifact};
use crate::error::CacheIoError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct CacheEnvelope {
    written_at_ms: u64,
    data: serde_json::Value,
}

/// One JSON file per artifact, replaced through a sibling temp file and `rename`.
#[derive(Debug, Clone)]
pub struct FileCacheStore {
    dir: PathBuf,
}

impl FileCacheStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: ArtifactKey) -> PathBuf {
        self.dir.join(format!("{}.json", key.as_str()))
    }
}

impl CacheStore for FileCacheStore {
    fn read(&self, key: ArtifactKey) -> Result<Option<StoredArtifact>, CacheIoError> {
        let path = self.path_for(key);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(CacheIoError::Read {
                    key: key.as_str().to_string(),
                    reason: format!("{}: {err}", path.display()),
                })
            }
        };
        let envelope =
            serde_json::from_str::<CacheEnvelope>(&raw).map_err(|err| CacheIoError::Decode {
                key: key.as_str().to_string(),
                reason: err.to_string(),
            })?;
        Ok(Some(StoredArtifact {
            payload: envelope.data,
            written_at_ms: envelope.written_at_ms,
        }))
    }

    fn write(
        &self,
        key: ArtifactKey,
        payload: &serde_json::Value,
        written_at_ms: u64,
    ) -> Result<(), CacheIoError> {
        let write_err = |reason: String| CacheIoError::Write {
            key: key.as_str().to_string(),
            reason,
        };
        fs::create_dir_all(&self.dir)
            .map_err(|err| write_err(format!("{}: {err}", self.dir.display())))?;

        let envelope = CacheEnvelope {
            written_at_ms,
            data: payload.clone(),
        };
        let raw = serde_json::to_vec(&envelope).map_err(|err| write_err(err.to_string()))?;

        let path = self.path_for(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, raw).map_err(|err| write_err(format!("{}: {err}", tmp.display())))?;
        if let Err(err) = fs::rename(&tmp, &path) {
            let _ = fs::remove_file(&tmp);
            return Err(write_err(format!("{}: {err}", path.display())));
        }
        Ok(())
    }
}
