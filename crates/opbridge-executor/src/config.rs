//! Config - Bridge Configuration
//!
//! Settings read from a TOML file:
//!
//! ```toml
//! log_filter = "opbridge_executor=debug"
//! coerce_int64_bool = true
//! accept_float64_scalars = true
//! max_pending_contexts = 1024
//! ```
//!
//! Every key is optional.
//!
//! @version 0.1.0
//! @author `OpBridge` Development Team

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::BridgeResult;

/// Environment variable naming a configuration file.
pub const CONFIG_ENV: &str = "OPBRIDGE_CONFIG";

// =============================================================================
// Bridge Configuration
// =============================================================================

/// Runtime settings for a [`Bridge`](crate::Bridge).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Tracing filter used when no `RUST_LOG` is set.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,

    /// Accept int64 data for boolean arguments (nonzero is true). Some
    /// exporters emit boolean constants as int64.
    #[serde(default = "default_true")]
    pub coerce_int64_bool: bool,

    /// Accept float64 data for float arguments in addition to float32.
    #[serde(default = "default_true")]
    pub accept_float64_scalars: bool,

    /// Pending autograd contexts above which a warning is logged.
    #[serde(default = "default_max_pending")]
    pub max_pending_contexts: usize,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            log_filter: default_log_filter(),
            coerce_int64_bool: true,
            accept_float64_scalars: true,
            max_pending_contexts: default_max_pending(),
        }
    }
}

fn default_log_filter() -> String {
    "warn".to_string()
}
fn default_true() -> bool {
    true
}
fn default_max_pending() -> usize {
    1024
}

impl BridgeConfig {
    /// Loads configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> BridgeResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: BridgeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Saves configuration to a TOML file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> BridgeResult<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Loads the file named by `OPBRIDGE_CONFIG`, or the defaults if it is unset.
    pub fn from_env() -> BridgeResult<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = BridgeConfig::default();
        assert_eq!(config.log_filter, "warn");
        assert!(config.coerce_int64_bool);
        assert!(config.accept_float64_scalars);
        assert_eq!(config.max_pending_contexts, 1024);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: BridgeConfig = toml::from_str("coerce_int64_bool = false").unwrap();
        assert!(!config.coerce_int64_bool);
        assert_eq!(config.log_filter, "warn");
        assert_eq!(config.max_pending_contexts, 1024);
    }

    #[test]
    fn test_bad_toml_is_config_error() {
        let err: crate::BridgeError = toml::from_str::<BridgeConfig>("max_pending_contexts = \"many\"")
            .unwrap_err()
            .into();
        assert!(matches!(err, crate::BridgeError::Config(_)));
    }
}
