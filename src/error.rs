use thiserror::Error;

pub type Result<T> = std::result::Result<T, LabelError>;

#[derive(Debug, Error)]
pub enum LabelError {
    #[error("network error: {0}")]
    Net(#[from] NetError),
    #[error("seed correlation failed: {0}")]
    Seed(#[from] SeedCorrelationError),
    #[error("cache error: {0}")]
    Cache(#[from] CacheIoError),
    #[error("schema mismatch: {0}")]
    Schema(#[from] SchemaMismatchError),
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Error)]
pub enum NetError {
    #[error("transient failure in {context}: {message}")]
    Transient { context: String, message: String },
    #[error("permanent failure in {context}: {message}")]
    Permanent { context: String, message: String },
}

impl NetError {
    pub fn transient(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn permanent(context: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Permanent {
            context: context.into(),
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

#[derive(Debug, Clone, Error)]
#[error("registry source `{source_name}` malformed: {reason}")]
pub struct RegistryParseError {
    pub source_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Error)]
#[error("{event} log at block {block_number}: {reason}")]
pub struct LogDecodeError {
    pub event: &'static str,
    pub block_number: u64,
    pub reason: String,
}

#[derive(Debug, Error)]
pub enum SeedCorrelationError {
    #[error("validator query failed: {0}")]
    Validators(String),
    #[error("deposit query failed: {0}")]
    Deposits(String),
}

#[derive(Debug, Error)]
pub enum CacheIoError {
    #[error("artifact `{key}` unreadable: {reason}")]
    Read { key: String, reason: String },
    #[error("artifact `{key}` unwritable: {reason}")]
    Write { key: String, reason: String },
    #[error("artifact `{key}` payload undecodable: {reason}")]
    Decode { key: String, reason: String },
}

#[derive(Debug, Clone, Error)]
#[error("query `{query}` column `{column}`: expected {expected}")]
pub struct SchemaMismatchError {
    pub query: &'static str,
    pub column: String,
    pub expected: &'static str,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
