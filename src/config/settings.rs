//! Settings loading from config.toml
//!
//! Every section is optional; a missing file yields the defaults below.
//!
//! ```toml
//! [catalog]
//! entity_types = ["product", "product_variation"]
//! alternate_storage_types = []
//!
//! [migration]
//! batch_size = 50
//! clean_legacy_data = true
//! ```

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::{debug, info};

/// Configuration structure representing the entire config.toml file
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Which entities the compatibility layer handles
    pub catalog: CatalogSettings,
    /// Migration batch behaviour
    pub migration: MigrationSettings,
}

/// Recognized catalog entities
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogSettings {
    /// Post types that are catalog entities
    pub entity_types: Vec<String>,
    /// Product types served by a different data store; their metadata is never
    /// synthesized from the structured tables
    pub alternate_storage_types: Vec<String>,
}

impl Default for CatalogSettings {
    fn default() -> Self {
        Self {
            entity_types: vec!["product".to_string(), "product_variation".to_string()],
            alternate_storage_types: Vec::new(),
        }
    }
}

impl CatalogSettings {
    /// Whether `post_type` names a catalog entity.
    #[must_use]
    pub fn is_catalog_type(&self, post_type: &str) -> bool {
        self.entity_types.iter().any(|t| t == post_type)
    }

    /// Whether entities of `product_type` live in another data store.
    #[must_use]
    pub fn uses_alternate_storage(&self, product_type: &str) -> bool {
        self.alternate_storage_types.iter().any(|t| t == product_type)
    }
}

/// Migration settings
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MigrationSettings {
    /// Entities fetched per batch
    pub batch_size: u64,
    /// Delete migrated legacy rows inside each entity's transaction
    pub clean_legacy_data: bool,
}

impl Default for MigrationSettings {
    fn default() -> Self {
        Self {
            batch_size: 50,
            clean_legacy_data: true,
        }
    }
}

/// Loads settings from a TOML file.
///
/// # Errors
/// Returns an error if the file cannot be read or the TOML is invalid.
pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    debug!("Loading settings from {:?}", path);
    let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
        message: format!("Failed to read config file {}: {e}", path.display()),
    })?;

    parse_settings(&contents)
}

/// Loads settings from `path` when it exists, otherwise returns the defaults.
pub fn load_settings_or_default<P: AsRef<Path>>(path: P) -> Result<Settings> {
    let path = path.as_ref();
    if path.exists() {
        load_settings(path)
    } else {
        info!("No config file at {}, using defaults", path.display());
        Ok(Settings::default())
    }
}

/// Parses settings from TOML text.
pub fn parse_settings(contents: &str) -> Result<Settings> {
    toml::from_str(contents).map_err(|e| Error::Config {
        message: format!("Failed to parse config.toml: {e}"),
    })
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;

    #[test]
    fn test_parse_settings() {
        let settings = parse_settings(
            r#"
            [catalog]
            entity_types = ["product"]
            alternate_storage_types = ["bundle"]

            [migration]
            batch_size = 10
            clean_legacy_data = false
        "#,
        )
        .unwrap();

        assert!(settings.catalog.is_catalog_type("product"));
        assert!(!settings.catalog.is_catalog_type("product_variation"));
        assert!(settings.catalog.uses_alternate_storage("bundle"));
        assert_eq!(settings.migration.batch_size, 10);
        assert!(!settings.migration.clean_legacy_data);
    }

    #[test]
    fn test_missing_sections_use_defaults() {
        let settings = parse_settings("[migration]\nbatch_size = 5\n").unwrap();
        assert!(settings.catalog.is_catalog_type("product_variation"));
        assert!(settings.migration.clean_legacy_data);
        assert_eq!(settings.migration.batch_size, 5);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = parse_settings("[migration\nbatch_size = ");
        assert!(matches!(result, Err(Error::Config { .. })));
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let settings = load_settings_or_default("does/not/exist.toml").unwrap();
        assert_eq!(settings.migration.batch_size, 50);
    }
}
