//! Indexer configuration.
//!
//! Usually embedded in the host application's own settings; can also be
//! loaded from a standalone TOML file.
//!
//! # Example Configuration
//!
//! ```toml
//! enabled = true
//! temp = false
//! schema = "tiles"
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when loading indexer configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Read(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Settings for a [`DataTileIndexer`](crate::DataTileIndexer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// Master switch. When off, `index()` always reports "not indexable".
    pub enabled: bool,

    /// Create tile tables as session-scoped temporary tables.
    /// Ignored when `schema` is set.
    pub temp: bool,

    /// Create tile tables as persistent tables in this schema.
    pub schema: Option<String>,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            temp: true,
            schema: None,
        }
    }
}

impl IndexerConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(schema) = &self.schema {
            let mut chars = schema.chars();
            let valid_start = chars
                .next()
                .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
            if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
                return Err(ConfigError::Validation(format!(
                    "schema name '{schema}' must be a plain identifier"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
