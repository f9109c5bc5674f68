//! # Custody Configuration & Constants
//!
//! Named constants live here, next to [`CustodyConfig`], the file-loadable
//! bootstrap description a host hands to
//! [`CustodyEngine::from_config`](crate::CustodyEngine::from_config).

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::logging::LogFormat;
use crate::types::{AssetId, ObjectKind};

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Leading field of every snapshot. Bump when the encoded state changes
/// shape; [`CustodyEngine::restore`](crate::CustodyEngine::restore) refuses
/// any other version.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

/// Log filter used when neither the config nor `RUST_LOG` sets one.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// BLAKE3 `derive_key` context for [`Address::derive`](crate::Address::derive).
pub const ADDRESS_DERIVATION_CONTEXT: &str = "quorum-custody 2026 address derivation v1";

// ---------------------------------------------------------------------------
// CustodyConfig
// ---------------------------------------------------------------------------

/// Errors from loading a [`CustodyConfig`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not a valid config document.
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Engine bootstrap and logging settings.
///
/// Every field has a default, so an empty JSON object is a valid config:
///
/// ```json
/// {
///   "enabled_assets": ["USD"],
///   "enabled_object_kinds": ["deed"],
///   "log_level": "debug",
///   "log_format": "json"
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    /// Fungible asset types enabled at bootstrap.
    pub enabled_assets: Vec<AssetId>,

    /// Object kinds enabled at bootstrap.
    pub enabled_object_kinds: Vec<ObjectKind>,

    /// Default `tracing` filter directive.
    pub log_level: String,

    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            enabled_assets: Vec::new(),
            enabled_object_kinds: Vec::new(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::Pretty,
        }
    }
}

impl CustodyConfig {
    /// Reads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    /// Parses a JSON config document.
    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn empty_document_uses_defaults() {
        let config = CustodyConfig::from_json("{}").unwrap();
        assert_eq!(config, CustodyConfig::default());
        assert_eq!(config.log_level, DEFAULT_LOG_LEVEL);
    }

    #[test]
    fn load_reads_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"enabled_assets":["USD","EUR"],"enabled_object_kinds":["deed"],"log_format":"json"}}"#
        )
        .unwrap();

        let config = CustodyConfig::load(file.path()).unwrap();
        assert_eq!(config.enabled_assets, vec![AssetId::new("USD"), AssetId::new("EUR")]);
        assert_eq!(config.enabled_object_kinds, vec![ObjectKind::new("deed")]);
        assert_eq!(config.log_format, LogFormat::Json);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = CustodyConfig::load(dir.path().join("absent.json"));
        assert!(matches!(result, Err(ConfigError::Io(_))));
    }

    #[test]
    fn malformed_file_is_json_error() {
        let result = CustodyConfig::from_json("{ not json");
        assert!(matches!(result, Err(ConfigError::Json(_))));
    }
}
