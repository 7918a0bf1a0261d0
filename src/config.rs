// CLI configuration file

use crate::sort::{SortDir, SortKey, SortSpec};
use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Settings read from `config.yaml`; every key is optional
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the `.userview` store
    pub store_path: Option<PathBuf>,
    pub sort_key: SortKey,
    pub sort_dir: SortDir,
    /// Where `export` writes CSV files
    pub export_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: None,
            sort_key: SortKey::default(),
            sort_dir: SortDir::default(),
            export_dir: PathBuf::from("."),
        }
    }
}

impl Config {
    /// `<config_dir>/userview/config.yaml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("userview").join("config.yaml"))
    }

    /// Load an explicit config file; it must exist
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config =
            serde_yaml::from_str(&content).with_context(|| format!("Failed to parse config file {:?}", path))?;
        debug!(path = ?path, "Loaded config");
        Ok(config)
    }

    /// Load `path` if given, else the default location if present, else defaults
    pub fn resolve(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => match Self::default_path() {
                Some(default) if default.exists() => Self::load(&default),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Store location: the configured path, else `<data_local_dir>/userview`, else `.`
    pub fn store_path(&self) -> PathBuf {
        self.store_path
            .clone()
            .or_else(|| dirs::data_local_dir().map(|dir| dir.join("userview")))
            .unwrap_or_else(|| PathBuf::from("."))
    }

    pub fn sort_spec(&self) -> SortSpec {
        SortSpec::new(self.sort_key, self.sort_dir)
    }
}
