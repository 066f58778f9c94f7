//! # Shared Error Types
//!
//! Errors raised by the shared data model and the configuration providers.

use thiserror::Error;

/// Failure to parse a `ModuleUniqueId` from its `type:instance` form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    /// The separator between type and instance is missing.
    #[error("missing ':' separator in module id '{0}'")]
    MissingSeparator(String),

    /// The type component is not a valid `u16`.
    #[error("invalid module type in '{0}'")]
    InvalidType(String),

    /// The instance component is not a valid `u64`.
    #[error("invalid module instance in '{0}'")]
    InvalidInstance(String),
}

/// Topic construction errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopicError {
    /// The topic would exceed the maximum length.
    #[error("topic length {len} exceeds maximum of {max} bytes")]
    TooLong { len: usize, max: usize },
}

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The configuration file is not valid TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value has a type that cannot be represented as a config entry.
    #[error("unsupported value for key '{key}': {kind}")]
    UnsupportedValue { key: String, kind: &'static str },
}
