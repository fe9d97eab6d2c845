//! Error types for selekt

use thiserror::Error;

/// Errors surfaced synchronously by the select service
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SelectError {
    /// A model value could not be mapped through the configured `as` slots
    #[error("expected non-primitive value: {0}")]
    ExpectedNonPrimitive(String),

    /// A validation expression names a validator that is not registered
    #[error("unknown validator: {0}")]
    UnknownValidator(String),

    /// A validator received an argument it cannot interpret
    #[error("invalid argument {argument:?} for validator {validator}")]
    InvalidValidatorArgument { validator: String, argument: String },

    /// The service was built outside a tokio runtime
    #[error("no tokio runtime available")]
    NoRuntime,

    /// A previous commit of the model value is still pending
    #[error("model value is busy")]
    Busy,

    /// Defaults could not be loaded
    #[error("configuration error: {0}")]
    Config(String),
}

impl From<toml::de::Error> for SelectError {
    fn from(err: toml::de::Error) -> Self {
        SelectError::Config(err.to_string())
    }
}

/// Failures of source fetches and poor value resolution
///
/// These never escape the async boundary; they are stored in reactive state.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    /// The server answered with a non-success status
    #[error("request failed with status {0}")]
    Status(u16),

    /// The request could not be performed
    #[error("network error: {0}")]
    Network(String),

    /// The response body is not usable JSON
    #[error("failed to decode response: {0}")]
    Decode(String),

    /// The poor value resolver failed
    #[error("resolver failed: {0}")]
    Resolver(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for FetchError {
    fn from(err: serde_json::Error) -> Self {
        FetchError::Decode(err.to_string())
    }
}

#[cfg(feature = "http")]
impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => FetchError::Status(status.as_u16()),
            None if err.is_decode() => FetchError::Decode(err.to_string()),
            None => FetchError::Network(err.to_string()),
        }
    }
}

/// Result type for selekt operations
pub type Result<T> = std::result::Result<T, SelectError>;
