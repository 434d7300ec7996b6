//! Configuration management for Tsumugi CLI
//!
//! Stores API key, server URL and default thread in ~/.config/tsumugi/config.toml

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

const CONFIG_DIR: &str = "tsumugi";
const CONFIG_FILE: &str = "config.toml";

/// CLI Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Thread used when `--thread` is not given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_thread: Option<String>,
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_base_url(),
            default_thread: None,
        }
    }
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?
            .join(CONFIG_DIR);
        Ok(config_dir)
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join(CONFIG_FILE))
    }

    /// Load config from file, or create default
    pub fn load() -> Result<Self> {
        let path = Self::config_path()?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config from {:?}", path))?;

        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse config file")
    }

    /// Save config to file
    pub fn save(&self) -> Result<()> {
        let dir = Self::config_dir()?;
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create config directory {:?}", dir))?;

        let path = Self::config_path()?;
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(&path, content)
            .with_context(|| format!("Failed to write config to {:?}", path))?;

        Ok(())
    }

    pub fn set_api_key(&mut self, key: String) {
        self.api_key = Some(key);
    }

    pub fn api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .context("Not logged in. Run 'tsumugi login' first.")
    }

    /// Explicit thread, else the configured default
    pub fn thread(&self, explicit: Option<String>) -> Option<String> {
        explicit.or_else(|| self.default_thread.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_fields_use_defaults() {
        let config = Config::parse("api_key = \"tsk_1\"").unwrap();
        assert_eq!(config.api_key.as_deref(), Some("tsk_1"));
        assert_eq!(config.base_url, "http://localhost:8000");
        assert!(config.default_thread.is_none());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config {
            api_key: Some("tsk_1".to_string()),
            base_url: "https://tsumugi.example".to_string(),
            default_thread: Some("t1".to_string()),
        };
        let text = toml::to_string_pretty(&config).unwrap();
        assert_eq!(Config::parse(&text).unwrap(), config);
    }

    #[test]
    fn test_thread_prefers_explicit() {
        let config = Config {
            default_thread: Some("default".to_string()),
            ..Config::default()
        };
        assert_eq!(config.thread(Some("t9".to_string())).as_deref(), Some("t9"));
        assert_eq!(config.thread(None).as_deref(), Some("default"));
        assert!(config.api_key().is_err());
    }
}
