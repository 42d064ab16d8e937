//! Application configuration for Pagebinder.
//!
//! User config lives at `~/.pagebinder/pagebinder.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{PagebinderError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "pagebinder.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".pagebinder";

// ---------------------------------------------------------------------------
// Config structs (matching pagebinder.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Image loading settings.
    #[serde(default)]
    pub images: ImagesConfig,

    /// Document cleaning settings.
    #[serde(default)]
    pub clean: CleanConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Directory books are written to.
    #[serde(default = "default_output_dir")]
    pub output_dir: String,

    /// Book language when the document does not declare one.
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            language: default_language(),
        }
    }
}

fn default_output_dir() -> String {
    "books".into()
}
fn default_language() -> String {
    "en".into()
}

/// `[images]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagesConfig {
    /// Whether images are downloaded and embedded at all.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Maximum concurrent image downloads.
    #[serde(default = "default_image_concurrency")]
    pub concurrency: u32,

    /// Per-image request timeout.
    #[serde(default = "default_image_timeout")]
    pub timeout_secs: u64,

    /// Images larger than this are skipped.
    #[serde(default = "default_image_max_bytes")]
    pub max_bytes: u64,
}

impl Default for ImagesConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: default_image_concurrency(),
            timeout_secs: default_image_timeout(),
            max_bytes: default_image_max_bytes(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_image_concurrency() -> u32 {
    4
}
fn default_image_timeout() -> u64 {
    20
}
fn default_image_max_bytes() -> u64 {
    10 * 1024 * 1024
}

/// `[clean]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CleanConfig {
    /// Extra element names removed on top of the built-in list.
    #[serde(default)]
    pub remove_tags: Vec<String>,

    /// Extra attribute names kept on top of the built-in allow-list.
    #[serde(default)]
    pub keep_attributes: Vec<String>,
}

// ---------------------------------------------------------------------------
// Image options (runtime, merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Runtime image loading options.
#[derive(Debug, Clone)]
pub struct ImageOptions {
    pub enabled: bool,
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub max_bytes: u64,
}

impl From<&ImagesConfig> for ImageOptions {
    fn from(config: &ImagesConfig) -> Self {
        Self {
            enabled: config.enabled,
            concurrency: config.concurrency.max(1) as usize,
            timeout_secs: config.timeout_secs,
            max_bytes: config.max_bytes,
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.pagebinder/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| PagebinderError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.pagebinder/pagebinder.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| PagebinderError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        PagebinderError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| PagebinderError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| PagebinderError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| PagebinderError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("output_dir"));
        assert!(toml_str.contains("max_bytes"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.defaults.language, "en");
        assert_eq!(parsed.images.concurrency, 4);
        assert!(parsed.images.enabled);
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[images]
enabled = false

[clean]
remove_tags = ["figure"]
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert!(!config.images.enabled);
        assert_eq!(config.images.timeout_secs, 20);
        assert_eq!(config.clean.remove_tags, vec!["figure"]);
        assert_eq!(config.defaults.output_dir, "books");
    }

    #[test]
    fn image_options_clamp_concurrency() {
        let mut images = ImagesConfig::default();
        images.concurrency = 0;
        let opts = ImageOptions::from(&images);
        assert_eq!(opts.concurrency, 1);
    }

    #[test]
    fn load_config_from_reports_parse_errors() {
        let path = std::env::temp_dir().join(format!("pb-config-{}.toml", uuid::Uuid::now_v7()));
        std::fs::write(&path, "[images\nenabled = ").unwrap();

        let err = load_config_from(&path).unwrap_err();
        assert!(err.to_string().contains("failed to parse"));

        let _ = std::fs::remove_file(&path);
    }
}
