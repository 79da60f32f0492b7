use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration for tagit.
///
/// Controls where modified files and JSON exports are written and whether
/// anything is written at all.
///
/// # Loading
///
/// ```rust,no_run
/// use tagit::config::Config;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.output.dry_run = true;
/// config.export.write_json = true;
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Where and whether modified files are written.
    pub output: OutputConfig,
    /// JSON export of extracted metadata.
    pub export: ExportConfig,
}

/// Output and behavior configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Directory for `modified_<name>` and `<name>_metadata.json`. `None`
    /// writes beside the input file.
    pub directory: Option<PathBuf>,
    /// If `true`, run apply and verification but write nothing.
    pub dry_run: bool,
    /// If `true`, replace an existing output file instead of failing.
    pub overwrite: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// Write `<name>_metadata.json` after every extraction.
    pub write_json: bool,
}

impl Config {
    /// Resolve the config file path. Defaults to the executable's directory.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::warn!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse config file {}", config_path.display()))
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<PathBuf> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(config_path)
    }

    /// Directory that outputs for `input` are written to.
    pub fn output_dir_for(&self, input: &Path) -> PathBuf {
        match &self.output.directory {
            Some(dir) => dir.clone(),
            None => input
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(".")),
        }
    }
}
