//! Telemetry configuration from environment variables.

use std::env;

/// Logging configuration for a Module-Fabric process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Service name attached to the startup log line
    pub service_name: String,

    /// `EnvFilter` directive, e.g. `info` or `mf_01_peer_discovery=debug,info`
    pub log_level: String,

    /// Emit one JSON object per line instead of human-readable text
    pub json_logs: bool,

    /// Include thread names (`mf-coordinator`, `mf-delivery`, ...) in each line
    pub thread_names: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "module-fabric".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            thread_names: true,
        }
    }
}

impl TelemetryConfig {
    /// Create configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `MF_SERVICE_NAME`: Service name (default: module-fabric)
    /// - `MF_LOG_LEVEL` or `RUST_LOG`: Filter directive (default: info)
    /// - `MF_JSON_LOGS`: `true`/`1` for JSON lines (default: false)
    /// - `MF_THREAD_NAMES`: `false`/`0` to omit thread names (default: true)
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Configuration for a process hosting the named module.
    #[must_use]
    pub fn for_module(module_name: &str) -> Self {
        let mut config = Self::from_env();
        config.service_name = format!("mf-{}", module_name.to_lowercase());
        config
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            service_name: lookup("MF_SERVICE_NAME").unwrap_or(defaults.service_name),

            log_level: lookup("MF_LOG_LEVEL")
                .or_else(|| lookup("RUST_LOG"))
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.log_level),

            json_logs: lookup("MF_JSON_LOGS")
                .map(|v| v.eq_ignore_ascii_case("true") || v == "1")
                .unwrap_or(defaults.json_logs),

            thread_names: lookup("MF_THREAD_NAMES")
                .map(|v| !v.eq_ignore_ascii_case("false") && v != "0")
                .unwrap_or(defaults.thread_names),
        }
    }
}
