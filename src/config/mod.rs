//! Configuration Management
//!
//! Enumerator settings and the loaders for metadata resources.
//!
//! # Configuration Locations
//! - Explicit: a path passed with `--config`
//! - Local: `.urnquery/config.json` (per-project)
//! - Global: `~/.config/urnquery/config.json` (per-user)
//!
//! # Resolution Precedence
//! 1. Explicit path (must exist)
//! 2. Local config file
//! 3. Global config file
//! 4. Built-in defaults
//!
//! # Metadata Resources
//! The level hierarchy (`config.xml`) and the per-level definitions
//! (`levels/*.xml`) are compiled into the binary. A `metadata_dir` setting
//! switches to reading the same names from a directory instead.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::cache::CACHE_CAPACITY;
use crate::enumerator::ResultType;
use crate::error::{EnumError, Result};

/// Name of the hierarchy resource
pub const HIERARCHY_RESOURCE: &str = "config.xml";

const BUNDLED: &[(&str, &str)] = &[
    (HIERARCHY_RESOURCE, include_str!("../../resources/config.xml")),
    ("levels/server.xml", include_str!("../../resources/levels/server.xml")),
    ("levels/database.xml", include_str!("../../resources/levels/database.xml")),
    ("levels/table.xml", include_str!("../../resources/levels/table.xml")),
    ("levels/column.xml", include_str!("../../resources/levels/column.xml")),
    ("levels/login.xml", include_str!("../../resources/levels/login.xml")),
];

/// Settings file contents (`config.json`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EnumeratorSettings {
    /// Read metadata from this directory instead of the bundled copy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata_dir: Option<PathBuf>,

    /// Maximum number of idle level objects kept for reuse
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Literal prefix override for string constants (`N` for unicode literals)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub string_prefix: Option<String>,

    /// Bind filter constants as statement parameters
    #[serde(default)]
    pub parameterize: bool,

    /// Result shape used when a request does not name one
    #[serde(default)]
    pub result_type: ResultType,
}

const fn default_cache_capacity() -> usize {
    CACHE_CAPACITY
}

impl Default for EnumeratorSettings {
    fn default() -> Self {
        Self {
            metadata_dir: None,
            cache_capacity: CACHE_CAPACITY,
            string_prefix: None,
            parameterize: false,
            result_type: ResultType::default(),
        }
    }
}

impl EnumeratorSettings {
    /// Resource loader matching `metadata_dir`
    #[must_use]
    pub fn resources(&self) -> Arc<dyn ResourceLoader> {
        match &self.metadata_dir {
            Some(dir) => Arc::new(DirectoryResources::new(dir.clone())),
            None => Arc::new(BundledResources),
        }
    }
}

/// Get path to local config file (`.urnquery/config.json`)
pub fn local_config_path() -> Result<PathBuf> {
    let current_dir = std::env::current_dir().map_err(|e| {
        EnumError::config_error(format!("Could not determine current directory: {e}"))
    })?;

    Ok(current_dir.join(".urnquery").join("config.json"))
}

/// Get path to global config file (`~/.config/urnquery/config.json`)
pub fn global_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| EnumError::config_error("Could not determine user config directory"))?;

    Ok(config_dir.join("urnquery").join("config.json"))
}

/// Load settings from one file
pub fn load_settings_file(path: &Path) -> Result<EnumeratorSettings> {
    let contents = fs::read_to_string(path).map_err(|e| {
        EnumError::config_error(format!("Could not read config file {}: {e}", path.display()))
    })?;

    serde_json::from_str(&contents).map_err(|e| {
        EnumError::config_error(format!("Invalid config file format in {}: {e}", path.display()))
    })
}

/// Load settings with precedence (explicit, local, global, defaults)
pub fn load_settings(explicit: Option<&Path>) -> Result<EnumeratorSettings> {
    if let Some(path) = explicit {
        return load_settings_file(path);
    }

    let local_path = local_config_path()?;
    if local_path.exists() {
        debug!(path = %local_path.display(), "using local settings");
        return load_settings_file(&local_path);
    }

    // No user config directory is not an error, only a missing layer
    if let Ok(global_path) = global_config_path() {
        if global_path.exists() {
            debug!(path = %global_path.display(), "using global settings");
            return load_settings_file(&global_path);
        }
    }

    Ok(EnumeratorSettings::default())
}

/// Source of metadata resources
pub trait ResourceLoader: Send + Sync {
    /// Text of the named resource
    fn load(&self, name: &str) -> Result<String>;
}

/// Resources compiled into the crate
#[derive(Debug, Clone, Copy, Default)]
pub struct BundledResources;

impl BundledResources {
    /// Names of every bundled resource
    #[must_use]
    pub fn names() -> Vec<&'static str> {
        BUNDLED.iter().map(|(name, _)| *name).collect()
    }
}

impl ResourceLoader for BundledResources {
    fn load(&self, name: &str) -> Result<String> {
        BUNDLED
            .iter()
            .find(|(candidate, _)| *candidate == name)
            .map(|(_, text)| (*text).to_string())
            .ok_or_else(|| EnumError::config_error(format!("resource '{name}' not found")))
    }
}

/// Resources read from a directory tree
#[derive(Debug, Clone)]
pub struct DirectoryResources {
    root: PathBuf,
}

impl DirectoryResources {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceLoader for DirectoryResources {
    fn load(&self, name: &str) -> Result<String> {
        let path = self.root.join(name);
        fs::read_to_string(&path).map_err(|e| {
            EnumError::config_error(format!(
                "resource '{name}' not readable at {}: {e}",
                path.display()
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn temp_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir()
            .join(format!("urnquery_config_{tag}_{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_settings_defaults() {
        let settings: EnumeratorSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, EnumeratorSettings::default());
        assert_eq!(settings.cache_capacity, 15);
        assert!(!settings.parameterize);
        assert_eq!(settings.result_type, ResultType::Default);
    }

    #[test]
    fn test_settings_serialization_skips_unset() {
        let json = serde_json::to_value(EnumeratorSettings::default()).unwrap();
        assert!(json.get("metadata_dir").is_none());
        assert!(json.get("string_prefix").is_none());
        assert_eq!(json["cache_capacity"], 15);
    }

    #[test]
    fn test_load_settings_explicit() {
        let dir = temp_dir("explicit");
        let path = dir.join("config.json");
        fs::write(
            &path,
            r#"{"cache_capacity": 4, "parameterize": true, "result_type": "data_set"}"#,
        )
        .unwrap();

        let settings = load_settings(Some(&path)).unwrap();
        assert_eq!(settings.cache_capacity, 4);
        assert!(settings.parameterize);
        assert_eq!(settings.result_type, ResultType::DataSet);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_load_settings_errors() {
        let dir = temp_dir("errors");
        let missing = dir.join("missing.json");
        assert_eq!(
            load_settings(Some(&missing)).unwrap_err().error_code(),
            "CONFIG_ERROR"
        );

        let malformed = dir.join("bad.json");
        fs::write(&malformed, "{ not json").unwrap();
        let err = load_settings(Some(&malformed)).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_ERROR");
        assert!(err.message().contains("Invalid config file format"));
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_bundled_resources() {
        let resources = BundledResources;
        assert!(resources.load(HIERARCHY_RESOURCE).unwrap().contains("<object"));
        assert!(BundledResources::names().contains(&"levels/table.xml"));
        assert_eq!(
            resources.load("levels/nope.xml").unwrap_err().error_code(),
            "CONFIG_ERROR"
        );
    }

    #[test]
    fn test_directory_resources() {
        let dir = temp_dir("resources");
        fs::create_dir_all(dir.join("levels")).unwrap();
        fs::write(dir.join("levels").join("x.xml"), "<level name=\"X\"/>").unwrap();

        let settings = EnumeratorSettings {
            metadata_dir: Some(dir.clone()),
            ..Default::default()
        };
        let resources = settings.resources();
        assert_eq!(
            resources.load("levels/x.xml").unwrap(),
            "<level name=\"X\"/>"
        );
        assert_eq!(
            resources.load("config.xml").unwrap_err().error_code(),
            "CONFIG_ERROR"
        );
        let _ = fs::remove_dir_all(&dir);
    }
}
