//! Configuration error types.

use thiserror::Error;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable could not be parsed as an integer.
    #[error("failed to parse {name}='{value}' as an integer: {source}")]
    InvalidInteger {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    /// A namespace configuration failed validation.
    #[error("invalid namespace '{namespace}': {reason}")]
    InvalidNamespace { namespace: String, reason: String },

    /// The same namespace was registered twice.
    #[error("duplicate namespace '{namespace}'")]
    DuplicateNamespace { namespace: String },

    /// A refresh-ahead namespace was registered without a source loader.
    #[error("refresh-ahead namespace '{namespace}' requires a source loader")]
    MissingLoader { namespace: String },
}
