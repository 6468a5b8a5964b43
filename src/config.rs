//! TOML configuration.
//!
//! Looked up at `$MINDHUB_CONFIG`, else `<config dir>/mindhub/config.toml`.
//! A missing file means defaults. `MINDHUB_DB`, `MINDHUB_API_KEY` (or
//! `API_KEY`) and `MINDHUB_MODEL` override what the file says.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::resolve::AmbiguityPolicy;

pub const APP_DIR: &str = "mindhub";
const DEFAULT_DB_NAME: &str = "mindhub.db";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// How many past chat messages are sent with each request.
    #[serde(default = "default_history_window")]
    pub history_window: usize,
    #[serde(default)]
    pub api_key: Option<String>,
}

fn default_model() -> String {
    "gemini-3-flash-preview".to_string()
}

fn default_base_url() -> String {
    "https://generativelanguage.googleapis.com".to_string()
}

fn default_temperature() -> f32 {
    0.7
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_history_window() -> usize {
    10
}

impl Default for CompletionConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            base_url: default_base_url(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            history_window: default_history_window(),
            api_key: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub ambiguity: AmbiguityPolicy,
    #[serde(default)]
    pub completion: CompletionConfig,
}

pub fn app_dir() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

impl Config {
    pub fn path() -> PathBuf {
        match non_empty_env("MINDHUB_CONFIG") {
            Some(path) => PathBuf::from(path),
            None => app_dir().join(CONFIG_FILE),
        }
    }

    pub fn load() -> Result<Self> {
        let mut cfg = Self::load_from(&Self::path())?;
        cfg.apply_env();
        Ok(cfg)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                Ok(Self::default())
            }
            Err(e) => Err(e.into()),
        }
    }

    fn apply_env(&mut self) {
        if let Some(db) = non_empty_env("MINDHUB_DB") {
            self.database_path = Some(PathBuf::from(db));
        }
        if let Some(key) = non_empty_env("MINDHUB_API_KEY").or_else(|| non_empty_env("API_KEY")) {
            self.completion.api_key = Some(key);
        }
        if let Some(model) = non_empty_env("MINDHUB_MODEL") {
            self.completion.model = model;
        }
    }

    /// Configured database path, or the default under the app directory.
    pub fn db_path(&self) -> PathBuf {
        if let Some(path) = &self.database_path {
            return path.clone();
        }

        let dir = app_dir();
        std::fs::create_dir_all(&dir).ok();
        dir.join(DEFAULT_DB_NAME)
    }
}
