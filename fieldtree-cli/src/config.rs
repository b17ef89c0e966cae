//! Editor settings.
//!
//! Settings live in an optional TOML file, `.fieldtree.toml` by default:
//!
//! ```toml
//! debounce_ms = 500
//! autosave = true
//! backup = true
//! strict_schema = false
//! ```

use std::{path::Path, time::Duration};

use anyhow::Context;
use fieldtree::SessionOptions;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default settings file name, looked up in the working directory.
pub const DEFAULT_CONFIG_PATH: &str = ".fieldtree.toml";

/// Settings for editing sessions.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(default)]
pub struct EditorConfig {
    /// Milliseconds a leaf edit waits for a newer edit to the same field
    /// before it is committed.
    pub debounce_ms: u64,
    /// Save automatically once debounced edits are committed.
    pub autosave: bool,
    /// Keep a timestamped copy of the previous document on every save.
    pub backup: bool,
    /// Refuse schemas whose fields overlap or use unknown types.
    pub strict_schema: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        EditorConfig {
            debounce_ms: 500,
            autosave: true,
            backup: true,
            strict_schema: false,
        }
    }
}

impl EditorConfig {
    /// Parse settings from TOML text. Missing keys take their defaults.
    pub fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Load settings from `path`, or `None` if the file does not exist.
    pub async fn load(path: &Path) -> anyhow::Result<Option<Self>> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(None);
        }
        let content = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config = Self::from_toml(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(config))
    }

    /// Session options for these settings.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            debounce: Duration::from_millis(self.debounce_ms),
            autosave: self.autosave,
            strict_schema: self.strict_schema,
        }
    }

    /// JSON Schema of the settings file.
    pub fn json_schema() -> anyhow::Result<serde_json::Value> {
        let schema = schemars::schema_for!(EditorConfig);
        Ok(serde_json::to_value(&schema)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EditorConfig::from_toml("debounce_ms = 50\nbackup = false\n").unwrap();
        assert_eq!(
            config,
            EditorConfig {
                debounce_ms: 50,
                backup: false,
                ..Default::default()
            }
        );
        assert_eq!(config.session_options().debounce, Duration::from_millis(50));
    }

    #[test]
    fn test_json_schema_lists_fields() {
        let schema = EditorConfig::json_schema().unwrap();
        let props = schema["properties"].as_object().unwrap();
        for key in ["debounce_ms", "autosave", "backup", "strict_schema"] {
            assert!(props.contains_key(key), "missing {key}");
        }
    }

    #[tokio::test]
    async fn test_load_missing_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(EditorConfig::load(&dir.path().join("nope.toml")).await.unwrap().is_none());

        let path = dir.path().join(DEFAULT_CONFIG_PATH);
        std::fs::write(&path, "strict_schema = true\n").unwrap();
        let loaded = EditorConfig::load(&path).await.unwrap().unwrap();
        assert!(loaded.strict_schema);
        assert!(loaded.autosave);
    }
}
