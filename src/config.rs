//! Configuration loaded from `config.toml`, with defaults for every key.

use crate::models::{StorageManager, ValidationPolicy};
use crate::search::SearchOptions;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const API_KEY_ENV: &str = "DEVMIND_API_KEY";
pub const FALLBACK_API_KEY_ENV: &str = "OPENAI_API_KEY";

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Data file; resolved to the Documents folder when unset.
    pub data_file: Option<PathBuf>,
    pub store: StoreConfig,
    pub search: SearchConfig,
    pub ai: AiConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub require_non_empty_code: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub include_code: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AiConfig {
    pub base_url: String,
    pub model: String,
    pub temperature: f32,
    pub timeout_secs: u64,
    /// Falls back to `DEVMIND_API_KEY`, then `OPENAI_API_KEY`.
    pub api_key: Option<String>,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            require_non_empty_code: true,
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { include_code: true }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            temperature: 0.2,
            timeout_secs: 60,
            api_key: None,
        }
    }
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("devmind").join("config.toml"))
    }

    /// Loads the config file, then fills the API key from the environment.
    /// A missing file at the default location yields defaults; an explicitly
    /// given path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) if !path.exists() => {
                bail!("Config file {} does not exist", path.display())
            }
            Some(path) => Some(path.to_path_buf()),
            None => Self::default_path(),
        };

        let mut config = match path {
            Some(path) if path.exists() => {
                let content = fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read config file {}", path.display()))?;
                let config: Config = toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file {}", path.display()))?;
                tracing::debug!(path = %path.display(), "config file loaded");
                config
            }
            _ => Config::default(),
        };

        if config.ai.api_key.is_none() {
            config.ai.api_key = api_key_from_env();
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if !(0.0..=2.0).contains(&self.ai.temperature) {
            bail!(
                "ai.temperature must be between 0.0 and 2.0, got {}",
                self.ai.temperature
            );
        }

        if self.ai.timeout_secs == 0 {
            bail!("ai.timeout_secs cannot be 0");
        }

        if self.ai.base_url.trim().is_empty() {
            bail!("ai.base_url cannot be empty");
        }

        if self.ai.model.trim().is_empty() {
            bail!("ai.model cannot be empty");
        }

        Ok(())
    }

    pub fn data_file(&self) -> Result<PathBuf> {
        match &self.data_file {
            Some(path) => Ok(path.clone()),
            None => StorageManager::default_database_file(),
        }
    }

    pub fn validation_policy(&self) -> ValidationPolicy {
        ValidationPolicy {
            require_non_empty_code: self.store.require_non_empty_code,
        }
    }

    pub fn search_options(&self) -> SearchOptions {
        SearchOptions {
            include_code: self.search.include_code,
        }
    }
}

fn api_key_from_env() -> Option<String> {
    [API_KEY_ENV, FALLBACK_API_KEY_ENV]
        .iter()
        .filter_map(|name| std::env::var(name).ok())
        .map(|key| key.trim().to_string())
        .find(|key| !key.is_empty())
}
