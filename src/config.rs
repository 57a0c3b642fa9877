use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::bookmarks::StoreKind;

/// en-US `toLocaleString` layout, e.g. `3/7/2024, 9:05:01 PM`.
pub const DEFAULT_DATE_FORMAT: &str = "%-m/%-d/%Y, %-I:%M:%S %p";

/// Settings from `~/.bookmark-domains.json`, overridable from the command line.
///
/// Store-specific values left unset fall back to the store kind's defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub store: StoreKind,
    /// Bookmark file; discovered under the usual profile folders when unset.
    pub path: Option<PathBuf>,
    /// Folders always listed in folder statistics.
    pub root_folder_ids: Option<Vec<String>>,
    /// Parent for folders created by `move`.
    pub default_parent_id: Option<String>,
    /// chrono format string for export dates, in local time.
    pub date_format: String,
    /// Rows in the `stats` top-domain table.
    pub top_domains: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreKind::Chromium,
            path: None,
            root_folder_ids: None,
            default_parent_id: None,
            date_format: DEFAULT_DATE_FORMAT.to_string(),
            top_domains: 20,
        }
    }
}

impl Config {
    /// Load `path`, or the default config file if it exists, or defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => match Self::default_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Invalid config file {:?}", path))?;
        debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    fn default_path() -> Option<PathBuf> {
        let home = std::env::var("HOME").ok()?;
        Some(PathBuf::from(home).join(".bookmark-domains.json"))
    }

    pub fn root_folder_ids(&self) -> Vec<String> {
        self.root_folder_ids
            .clone()
            .unwrap_or_else(|| self.store.default_root_folder_ids())
    }

    pub fn default_parent_id(&self) -> String {
        self.default_parent_id
            .clone()
            .unwrap_or_else(|| self.store.default_parent_id().to_string())
    }
}
