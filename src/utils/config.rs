use crate::cache::{ArtifactKey, ArtifactTtls};
use crate::config::known::{DEFAULT_CEX_REGISTRY_URL, DEFAULT_REGISTRY_URL};
use crate::error::ConfigError;
use crate::utils::retry::RetryPolicy;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_CACHE_TTL_SECS: u64 = 7 * 24 * 60 * 60;
const DEFAULT_HTTP_TIMEOUT_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheBackend {
    File,
    Sqlite,
}

impl CacheBackend {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "file" | "json" => Some(Self::File),
            "sqlite" | "db" => Some(Self::Sqlite),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct WarehouseConfig {
    pub url: String,
    pub user: String,
    pub password: Option<String>,
    pub network: String,
}

#[derive(Debug, Clone)]
pub struct LabelConfig {
    pub warehouse: Option<WarehouseConfig>,
    pub network: String,
    pub cache_dir: PathBuf,
    pub cache_backend: CacheBackend,
    pub ttls: ArtifactTtls,
    pub registry_url: String,
    pub cex_registry_url: String,
    pub http_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            warehouse: None,
            network: "mainnet".to_string(),
            cache_dir: PathBuf::from("artifacts/validator_labels"),
            cache_backend: CacheBackend::File,
            ttls: ArtifactTtls::uniform(Duration::from_secs(DEFAULT_CACHE_TTL_SECS)),
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            cex_registry_url: DEFAULT_CEX_REGISTRY_URL.to_string(),
            http_timeout: Duration::from_millis(DEFAULT_HTTP_TIMEOUT_MS),
            retry: RetryPolicy::default(),
        }
    }
}

fn env_trimmed(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
    match env_trimmed(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<u64>().map(Some).map_err(|_| {
            ConfigError::Invalid(format!("{name} must be a non-negative integer, got `{raw}`"))
        }),
    }
}

fn validate_http_url(name: &str, raw: &str) -> Result<(), ConfigError> {
    let parsed = raw.parse::<reqwest::Url>().map_err(|e| {
        ConfigError::Invalid(format!("{name} must be a valid URL, got `{raw}`: {e}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "{name} must use http(s) scheme, got `{other}`"
        ))),
    }
}

impl LabelConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let network = env_trimmed("LABELS_NETWORK").unwrap_or(defaults.network);

        let warehouse = match env_trimmed("CLICKHOUSE_URL") {
            Some(url) => {
                validate_http_url("CLICKHOUSE_URL", &url)?;
                Some(WarehouseConfig {
                    url,
                    user: env_trimmed("CLICKHOUSE_USER").unwrap_or_else(|| "default".to_string()),
                    password: env_trimmed("CLICKHOUSE_PASSWORD"),
                    network: network.clone(),
                })
            }
            None => None,
        };

        let cache_backend = match env_trimmed("LABELS_CACHE_BACKEND") {
            Some(raw) => CacheBackend::parse(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "LABELS_CACHE_BACKEND must be `file` or `sqlite`, got `{raw}`"
                ))
            })?,
            None => defaults.cache_backend,
        };

        let default_ttl = env_u64("LABELS_CACHE_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_CACHE_TTL_SECS));
        let mut ttls = ArtifactTtls::uniform(default_ttl);
        for key in ArtifactKey::ALL {
            let var = format!("LABELS_TTL_{}_SECS", key.as_str().to_ascii_uppercase());
            if let Some(secs) = env_u64(&var)? {
                ttls.set(key, Duration::from_secs(secs));
            }
        }

        let registry_url = env_trimmed("LABELS_REGISTRY_URL").unwrap_or(defaults.registry_url);
        validate_http_url("LABELS_REGISTRY_URL", &registry_url)?;
        let cex_registry_url =
            env_trimmed("LABELS_CEX_REGISTRY_URL").unwrap_or(defaults.cex_registry_url);
        validate_http_url("LABELS_CEX_REGISTRY_URL", &cex_registry_url)?;

        let http_timeout = Duration::from_millis(
            env_u64("LABELS_HTTP_TIMEOUT_MS")?
                .map(|v| v.clamp(1_000, 600_000))
                .unwrap_or(DEFAULT_HTTP_TIMEOUT_MS),
        );
        let retry = RetryPolicy {
            max_attempts: env_u64("LABELS_MAX_RETRIES")?
                .map(|v| v.clamp(1, 10) as u32)
                .unwrap_or(defaults.retry.max_attempts),
            base_ms: env_u64("LABELS_RETRY_BASE_MS")?
                .map(|v| v.min(60_000))
                .unwrap_or(defaults.retry.base_ms),
            cap_ms: env_u64("LABELS_RETRY_CAP_MS")?
                .map(|v| v.min(300_000))
                .unwrap_or(defaults.retry.cap_ms),
        };

        Ok(Self {
            warehouse,
            network,
            cache_dir: env_trimmed("LABELS_CACHE_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.cache_dir),
            cache_backend,
            ttls,
            registry_url,
            cex_registry_url,
            http_timeout,
            retry,
        })
    }
}
