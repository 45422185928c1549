use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Registry configuration.
///
/// Every field has a default, so an empty YAML document is a valid config.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RegistryConfig {
    /// Name of the synthetic local that carries captured return values.
    #[serde(default = "default_return_values_binding")]
    pub return_values_binding: String,
    /// Frame id meaning "any currently executing frame".
    #[serde(default = "default_wildcard_frame_id")]
    pub wildcard_frame_id: String,
    /// Type names rendered with the `rawString` presentation attribute.
    #[serde(default = "default_raw_string_types")]
    pub raw_string_types: Vec<String>,
    #[serde(default)]
    pub formatting: FormattingConfig,
    #[serde(default)]
    pub diagnostics: DiagnosticsConfig,
}

/// Limits applied by the default formatter.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct FormattingConfig {
    /// Maximum characters of a rendered value unless `rawString` is requested.
    #[serde(default = "default_max_string_len")]
    pub max_string_len: usize,
    /// Maximum items shown in a container preview.
    #[serde(default = "default_max_items")]
    pub max_items: usize,
}

impl Default for FormattingConfig {
    fn default() -> Self {
        Self {
            max_string_len: default_max_string_len(),
            max_items: default_max_items(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct DiagnosticsConfig {
    /// Directory for the structured `events.jsonl` log. Disabled when unset.
    #[serde(default)]
    pub events_dir: Option<PathBuf>,
}

fn default_return_values_binding() -> String {
    "__return_values__".to_string()
}

fn default_wildcard_frame_id() -> String {
    "*".to_string()
}

fn default_raw_string_types() -> Vec<String> {
    ["str", "unicode", "bytes", "bytearray"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_max_string_len() -> usize {
    256
}

fn default_max_items() -> usize {
    10
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            return_values_binding: default_return_values_binding(),
            wildcard_frame_id: default_wildcard_frame_id(),
            raw_string_types: default_raw_string_types(),
            formatting: FormattingConfig::default(),
            diagnostics: DiagnosticsConfig::default(),
        }
    }
}

impl RegistryConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::from_yaml_str(&content)
            .with_context(|| format!("Invalid config file: {}", path.display()))
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        // serde_yaml treats an empty document as null, not as an empty mapping
        let config: Self = if yaml.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(yaml).context("Failed to parse config as YAML")?
        };
        config.validate()?;
        Ok(config)
    }

    /// Whether values of this type get the `rawString` presentation attribute.
    pub fn is_raw_string_type(&self, type_name: &str) -> bool {
        self.raw_string_types.iter().any(|t| t == type_name)
    }

    fn validate(&self) -> Result<()> {
        if self.return_values_binding.is_empty() {
            anyhow::bail!("return_values_binding must not be empty");
        }
        if self.wildcard_frame_id.is_empty() {
            anyhow::bail!("wildcard_frame_id must not be empty");
        }
        if self.wildcard_frame_id.parse::<i64>().is_ok() {
            anyhow::bail!(
                "wildcard_frame_id '{}' would shadow a numeric frame id",
                self.wildcard_frame_id
            );
        }
        if self.formatting.max_string_len == 0 {
            anyhow::bail!("formatting.max_string_len must be greater than zero");
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
