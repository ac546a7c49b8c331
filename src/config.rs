use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub photos: PhotoConfig,

    #[serde(default)]
    pub extraction: ExtractionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,

    /// How long a statement waits on a locked database before giving up.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Upper bound for a single store operation. Unset means no deadline.
    #[serde(default)]
    pub transaction_timeout_ms: Option<u64>,
}

fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("recipebox")
        .join("recipebox.db")
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            transaction_timeout_ms: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_page_size")]
    pub default_page_size: u32,

    #[serde(default = "default_max_page_size")]
    pub max_page_size: u32,

    #[serde(default = "default_autocomplete_limit")]
    pub autocomplete_limit: usize,
}

fn default_page_size() -> u32 {
    25
}

fn default_max_page_size() -> u32 {
    100
}

fn default_autocomplete_limit() -> usize {
    10
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_page_size: default_page_size(),
            max_page_size: default_max_page_size(),
            autocomplete_limit: default_autocomplete_limit(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum PhotoProviderType {
    #[default]
    None,
    Pexels,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhotoConfig {
    #[serde(default)]
    pub provider: PhotoProviderType,

    #[serde(default = "default_photo_endpoint")]
    pub endpoint: String,

    #[serde(default)]
    pub api_key: Option<String>,

    /// Stored when a configured lookup fails.
    #[serde(default = "default_placeholder")]
    pub placeholder: String,

    #[serde(default = "default_photo_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_photo_endpoint() -> String {
    "https://api.pexels.com/v1".to_string()
}

fn default_placeholder() -> String {
    "placeholder.jpg".to_string()
}

fn default_photo_timeout_secs() -> u64 {
    15
}

impl Default for PhotoConfig {
    fn default() -> Self {
        Self {
            provider: PhotoProviderType::default(),
            endpoint: default_photo_endpoint(),
            api_key: None,
            placeholder: default_placeholder(),
            timeout_secs: default_photo_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    #[serde(default)]
    pub enabled: bool,

    /// OpenAI-compatible base URL.
    #[serde(default = "default_extraction_endpoint")]
    pub endpoint: String,

    #[serde(default = "default_extraction_model")]
    pub model: String,

    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_extraction_endpoint() -> String {
    "http://127.0.0.1:1234/v1".to_string()
}

fn default_extraction_model() -> String {
    "gemma-3-4b".to_string()
}

fn default_max_tokens() -> u32 {
    1500
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: default_extraction_endpoint(),
            model: default_extraction_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            search: SearchConfig::default(),
            photos: PhotoConfig::default(),
            extraction: ExtractionConfig::default(),
        }
    }
}

impl Config {
    /// Loads the user config, writing the defaults on first run.
    pub fn load() -> Result<Self> {
        let config_path = Self::config_path();

        if config_path.exists() {
            Self::load_from(&config_path)
        } else {
            let config = Config::default();
            config.save()?;
            Ok(config)
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid config {:?}", path))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        let config_path = Self::config_path();

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&config_path, content)?;

        Ok(())
    }

    /// `RECIPEBOX_CONFIG` overrides the platform config directory.
    pub fn config_path() -> PathBuf {
        if let Some(path) = std::env::var_os("RECIPEBOX_CONFIG") {
            return PathBuf::from(path);
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("recipebox")
            .join("config.toml")
    }

    /// Directory holding the config file; logs go under it.
    pub fn config_dir() -> PathBuf {
        Self::config_path()
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn db_path(&self) -> &Path {
        &self.database.path
    }
}
