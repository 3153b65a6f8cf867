//! Configuration for the MARCI ISIS pipeline.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration for the processing pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// External ISIS tool locations
    #[serde(default)]
    pub tools: ToolConfig,

    /// SPICE initialization behaviour
    #[serde(default)]
    pub spice: SpiceConfig,

    /// Pipeline behaviour
    #[serde(default)]
    pub pipeline: PipelineConfig,
}

/// Names of the ISIS programs invoked by each stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolConfig {
    /// Directory holding the ISIS binaries (e.g. `$ISISROOT/bin`).
    /// When unset, tools are resolved through `PATH`.
    #[serde(default)]
    pub isis_bin: Option<PathBuf>,

    #[serde(default = "default_marci2isis")]
    pub marci2isis: String,

    #[serde(default = "default_spiceinit")]
    pub spiceinit: String,

    #[serde(default = "default_marcical")]
    pub marcical: String,

    #[serde(default = "default_explode")]
    pub explode: String,

    #[serde(default = "default_cam2map")]
    pub cam2map: String,

    #[serde(default = "default_isis2std")]
    pub isis2std: String,
}

impl ToolConfig {
    /// Resolve a tool name to the program that should be spawned.
    pub fn program(&self, name: &str) -> String {
        match &self.isis_bin {
            Some(bin) => bin.join(name).display().to_string(),
            None => name.to_string(),
        }
    }
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            isis_bin: None,
            marci2isis: default_marci2isis(),
            spiceinit: default_spiceinit(),
            marcical: default_marcical(),
            explode: default_explode(),
            cam2map: default_cam2map(),
            isis2std: default_isis2std(),
        }
    }
}

/// SPICE kernel initialization settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpiceConfig {
    /// Retry a failed local spiceinit once with `web=true`
    #[serde(default = "default_true")]
    pub web_fallback: bool,
}

impl Default for SpiceConfig {
    fn default() -> Self {
        Self { web_fallback: true }
    }
}

/// Pipeline run settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Delete each stage's input once its output is in place
    #[serde(default)]
    pub delete_intermediate: bool,

    /// Require at least one exploded band on disk before deleting a
    /// level-1 cube. Off by default: explode deletes on success alone.
    #[serde(default)]
    pub verify_band_outputs: bool,

    /// Optional path to save the run summary as JSON
    #[serde(default)]
    pub summary_output_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a YAML or JSON file.
    /// Format is auto-detected from file extension (.yaml, .yml, or .json).
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let config: Config = match ext {
            "json" => serde_json::from_str(&contents)?,
            // YAML is a superset of JSON
            _ => serde_yaml::from_str(&contents)?,
        };
        Ok(config)
    }

    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        Ok(config)
    }

    /// Serialize configuration to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        let tools = [
            ("marci2isis", &self.tools.marci2isis),
            ("spiceinit", &self.tools.spiceinit),
            ("marcical", &self.tools.marcical),
            ("explode", &self.tools.explode),
            ("cam2map", &self.tools.cam2map),
            ("isis2std", &self.tools.isis2std),
        ];
        for (key, value) in tools {
            if value.trim().is_empty() {
                anyhow::bail!("Tool name for '{}' must not be empty", key);
            }
        }

        if let Some(bin) = &self.tools.isis_bin {
            if !bin.is_dir() {
                anyhow::bail!("ISIS bin directory not found: {}", bin.display());
            }
        }
        Ok(())
    }
}

// Default value functions for serde
fn default_marci2isis() -> String { "marci2isis".to_string() }
fn default_spiceinit() -> String { "spiceinit".to_string() }
fn default_marcical() -> String { "marcical".to_string() }
fn default_explode() -> String { "explode".to_string() }
fn default_cam2map() -> String { "cam2map".to_string() }
fn default_isis2std() -> String { "isis2std".to_string() }
fn default_true() -> bool { true }
