//! # Configuration Providers
//!
//! The framework reads tunables through the `ConfigProvider` port. Values are
//! stored as strings and converted on read; a missing or unparsable value
//! yields `None` so callers can fall back to their documented default.
//!
//! ## Providers
//!
//! - `StaticConfigProvider` - In-memory key/value map, for tests and embedding
//! - `TomlConfigProvider` - Loads a TOML file; nested tables flatten to
//!   dotted keys (`[discovery] port = 1` becomes `discovery.port`)

use std::collections::HashMap;
use std::path::Path;

use tracing::{debug, warn};

use crate::errors::ConfigError;

/// Read access to configuration values.
pub trait ConfigProvider: Send + Sync {
    /// Raw string value for `key`.
    fn get_as_string(&self, key: &str) -> Option<String>;

    /// Boolean value for `key` (`true`/`false`/`1`/`0`, case-insensitive).
    fn get_as_bool(&self, key: &str) -> Option<bool> {
        let raw = self.get_as_string(key)?;
        match raw.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" => Some(true),
            "false" | "0" | "no" => Some(false),
            _ => None,
        }
    }

    /// Integer value for `key`.
    fn get_as_long(&self, key: &str) -> Option<i64> {
        self.get_as_string(key)?.trim().parse().ok()
    }

    /// Floating point value for `key`.
    fn get_as_double(&self, key: &str) -> Option<f64> {
        self.get_as_string(key)?.trim().parse().ok()
    }
}

// ============================================================================
// StaticConfigProvider
// ============================================================================

/// Configuration held in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    values: HashMap<String, String>,
}

impl StaticConfigProvider {
    /// Create an empty provider; every lookup falls back to defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a value.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.values.insert(key.into(), value.to_string());
        self
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn get_as_string(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }
}

// ============================================================================
// TomlConfigProvider
// ============================================================================

/// TOML-based configuration provider.
///
/// # Config File Format
///
/// ```toml
/// MF_INMSG_BUFFER_SIZE = 5000
/// MF_INMSG_BUFFER_MODE = "drop"
///
/// [discovery]
/// broadcast_ms = 500
/// ```
#[derive(Debug, Clone, Default)]
pub struct TomlConfigProvider {
    values: StaticConfigProvider,
}

impl TomlConfigProvider {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let provider = Self::parse(&content)?;
        debug!(
            path = %path.as_ref().display(),
            entries = provider.values.len(),
            "Loaded configuration"
        );
        Ok(provider)
    }

    /// Parse configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is not valid TOML.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let table: toml::Table = content.parse()?;
        let mut values = StaticConfigProvider::new();
        flatten("", &table, &mut values);
        Ok(Self { values })
    }
}

fn flatten(prefix: &str, table: &toml::Table, out: &mut StaticConfigProvider) {
    for (key, value) in table {
        let full_key = if prefix.is_empty() {
            key.clone()
        } else {
            format!("{prefix}.{key}")
        };
        let rendered = match value {
            toml::Value::String(s) => s.clone(),
            toml::Value::Integer(i) => i.to_string(),
            toml::Value::Float(f) => f.to_string(),
            toml::Value::Boolean(b) => b.to_string(),
            toml::Value::Table(nested) => {
                flatten(&full_key, nested, out);
                continue;
            }
            other => {
                let err = ConfigError::UnsupportedValue {
                    key: full_key,
                    kind: other.type_str(),
                };
                warn!(error = %err, "Skipping config entry");
                continue;
            }
        };
        out.values.insert(full_key, rendered);
    }
}

impl ConfigProvider for TomlConfigProvider {
    fn get_as_string(&self, key: &str) -> Option<String> {
        self.values.get_as_string(key)
    }
}
