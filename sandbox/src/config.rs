//! Bridge configuration.

use serde::{Deserialize, Serialize};

use crate::error::BridgeError;

/// Configuration for a bridge instance.
///
/// Controls memory limits, instruction fuel, diagnostics, and the names the
/// bridge uses to find things in the guest module.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Maximum linear memory pages (1 page = 64 KiB).
    /// Default: 256 pages = 16 MiB.
    pub max_memory_pages: u32,

    /// Wasmtime fuel limit (instruction metering).
    /// Prevents infinite loops in guest code.
    pub fuel_limit: u64,

    /// Recursion bound for `debug_string`.
    pub debug_max_depth: usize,

    /// Import module name under which user host operations are linked.
    pub host_module: String,

    /// Names of the guest exports the bridge relies on.
    pub exports: ExportNames,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            max_memory_pages: 256, // 16 MiB
            fuel_limit: 100_000_000,
            debug_max_depth: heapbridge_hostapi::DEFAULT_MAX_DEPTH,
            host_module: "host".to_string(),
            exports: ExportNames::default(),
        }
    }
}

impl BridgeConfig {
    /// Load a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, BridgeError> {
        serde_json::from_str(json)
            .map_err(|e| BridgeError::ValidationError(format!("invalid config: {}", e)))
    }
}

/// Guest export names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportNames {
    pub memory: String,
    /// `(size) -> ptr`
    pub malloc: String,
    /// `(ptr, old_size, new_size) -> ptr`
    pub realloc: String,
    /// `(ptr, size)`, optional.
    pub free: String,
    /// Function table holding callback invoke/finalize entries, optional.
    pub table: String,
    /// `()`, optional.
    pub start: String,
}

impl Default for ExportNames {
    fn default() -> Self {
        Self {
            memory: "memory".to_string(),
            malloc: "bridge_malloc".to_string(),
            realloc: "bridge_realloc".to_string(),
            free: "bridge_free".to_string(),
            table: "bridge_table".to_string(),
            start: "bridge_start".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = BridgeConfig::default();
        assert_eq!(config.max_memory_pages, 256);
        assert_eq!(config.fuel_limit, 100_000_000);
        assert_eq!(config.debug_max_depth, 16);
        assert_eq!(config.host_module, "host");
        assert_eq!(config.exports.malloc, "bridge_malloc");
    }

    #[test]
    fn test_from_json_partial() {
        let config = BridgeConfig::from_json(
            r#"{ "fuel_limit": 5000, "exports": { "malloc": "__wbindgen_malloc" } }"#,
        )
        .unwrap();
        assert_eq!(config.fuel_limit, 5000);
        assert_eq!(config.max_memory_pages, 256);
        assert_eq!(config.exports.malloc, "__wbindgen_malloc");
        assert_eq!(config.exports.realloc, "bridge_realloc");
    }

    #[test]
    fn test_from_json_rejects_garbage() {
        let err = BridgeConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, BridgeError::ValidationError(_)));
    }

    #[test]
    fn test_json_round_trip() {
        let config = BridgeConfig {
            host_module: "env_host".into(),
            ..BridgeConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(BridgeConfig::from_json(&json).unwrap(), config);
    }
}
