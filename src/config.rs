//! Engine configuration: a TOML file with environment overrides.
//!
//! Lookup order, later wins:
//! 1. built-in defaults
//! 2. `<config_dir>/corpus-search/config.toml` (or `--config`)
//! 3. `CORPUS_SEARCH_*` variables, including those from a `.env` file

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::search::query::PageLimits;
use crate::search::tantivy::TextSearchSettings;

pub const ENV_DATA_DIR: &str = "CORPUS_SEARCH_DATA_DIR";
pub const ENV_PAGE_SIZE: &str = "CORPUS_SEARCH_PAGE_SIZE";
pub const ENV_MAX_PAGE_SIZE: &str = "CORPUS_SEARCH_MAX_PAGE_SIZE";
pub const ENV_ENABLEMENT_TTL_SECS: &str = "CORPUS_SEARCH_ENABLEMENT_TTL_SECS";

const REGISTRY_FILE: &str = "corpora.db";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config {path}: {source}")]
    Toml {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid value {value:?} for {key}")]
    InvalidOverride { key: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Root for indexes and the corpus registry. Platform data dir when unset.
    pub data_dir: Option<PathBuf>,
    pub default_page_size: usize,
    pub max_page_size: usize,
    /// Metadata free-text matching.
    pub text: TextSearchSettings,
    /// How long enablement records are reused before the registry is re-read.
    pub enablement_ttl_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        let limits = PageLimits::default();
        Self {
            data_dir: None,
            default_page_size: limits.default_page_size,
            max_page_size: limits.max_page_size,
            text: TextSearchSettings::default(),
            enablement_ttl_secs: 30,
        }
    }
}

impl EngineConfig {
    /// Load from the default location and apply environment overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match default_config_path() {
            Some(path) => Self::load_from(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides()?;
        Ok(config)
    }

    /// A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "no config file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&content).map_err(|source| ConfigError::Toml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|key| dotenvy::var(key).ok())
    }

    /// Apply `CORPUS_SEARCH_*` overrides from an arbitrary lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup(ENV_DATA_DIR).filter(|d| !d.trim().is_empty()) {
            self.data_dir = Some(PathBuf::from(dir));
        }
        if let Some(v) = lookup(ENV_PAGE_SIZE) {
            self.default_page_size = parse_override(ENV_PAGE_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_MAX_PAGE_SIZE) {
            self.max_page_size = parse_override(ENV_MAX_PAGE_SIZE, &v)?;
        }
        if let Some(v) = lookup(ENV_ENABLEMENT_TTL_SECS) {
            self.enablement_ttl_secs = parse_override(ENV_ENABLEMENT_TTL_SECS, &v)?;
        }
        Ok(())
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(crate::default_data_dir)
    }

    pub fn registry_path(&self) -> PathBuf {
        self.data_dir().join(REGISTRY_FILE)
    }

    /// Page limits with the default clamped into `1..=max`.
    pub fn page_limits(&self) -> PageLimits {
        let max_page_size = self.max_page_size.max(1);
        PageLimits {
            default_page_size: self.default_page_size.clamp(1, max_page_size),
            max_page_size,
        }
    }

    pub fn text_search(&self) -> TextSearchSettings {
        self.text
    }

    pub fn enablement_ttl(&self) -> Duration {
        Duration::from_secs(self.enablement_ttl_secs)
    }
}

fn parse_override<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidOverride {
            key,
            value: value.to_string(),
        })
}

/// `<config_dir>/corpus-search/config.toml`, when the platform has a config dir.
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "corpus-search", "corpus-search")
        .map(|dirs| dirs.config_dir().join("config.toml"))
}
