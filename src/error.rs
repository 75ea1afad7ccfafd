use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Boxed cause for storage failures from any backend
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Errors surfaced by the order registry and its adapters
#[derive(Debug, Error)]
pub enum Error {
    /// Market is not one of the supported identifiers
    #[error("Invalid market: {0}")]
    InvalidMarket(String),

    /// Non-positive or non-finite threshold/size
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// Price sample that is non-numeric, non-finite or negative
    #[error("Invalid price sample: {0}")]
    InvalidPriceSample(String),

    /// Backing medium could not be read or written
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] BoxError),

    /// Persisted content does not decode into orders
    #[error("Corrupt order data: {0}")]
    CorruptData(#[source] serde_json::Error),

    /// Settings could not be loaded
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::StorageUnavailable(Box::new(err))
    }
}

impl From<redis::RedisError> for Error {
    fn from(err: redis::RedisError) -> Self {
        Error::StorageUnavailable(Box::new(err))
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl Error {
    /// Caller-side validation failures, as opposed to storage failures
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidMarket(_) | Error::InvalidParameter(_) | Error::InvalidPriceSample(_)
        )
    }
}
