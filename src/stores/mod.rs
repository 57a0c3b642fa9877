//! Bookmark store adapters.

pub mod chromium;
pub mod firefox;
pub mod memory;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::bookmarks::{BookmarkStore, StoreKind};

pub use chromium::ChromiumStore;
pub use firefox::FirefoxStore;
pub use memory::MemoryStore;

/// Open the store of `kind` at `path`.
pub async fn open_store(kind: StoreKind, path: &Path) -> Result<Box<dyn BookmarkStore>> {
    let store: Box<dyn BookmarkStore> = match kind {
        StoreKind::Chromium => Box::new(ChromiumStore::open(path).await?),
        StoreKind::Firefox => Box::new(FirefoxStore::open(path)?),
        StoreKind::Memory => anyhow::bail!("The memory store cannot be opened from a file"),
    };
    debug!("Opened {} store at {:?}", kind.name(), path);
    Ok(store)
}

/// Find a bookmark file for `kind` under the usual profile locations.
pub fn detect_bookmark_path(kind: StoreKind) -> Result<PathBuf> {
    let home = PathBuf::from(std::env::var("HOME").context("HOME is not set")?);
    let (roots, file_name) = match kind {
        StoreKind::Chromium => (chromium_profile_roots(&home), "Bookmarks"),
        StoreKind::Firefox => (firefox_profile_roots(&home), "places.sqlite"),
        StoreKind::Memory => anyhow::bail!("The memory store has no bookmark file"),
    };

    for root in roots.iter().filter(|r| r.exists()) {
        let found = WalkDir::new(root)
            .max_depth(3)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .find(|entry| entry.file_type().is_file() && entry.file_name() == file_name);
        if let Some(entry) = found {
            debug!("Found {} bookmarks at: {:?}", kind.name(), entry.path());
            return Ok(entry.into_path());
        }
    }

    anyhow::bail!(
        "{} bookmarks file not found, pass --path explicitly",
        kind.name()
    )
}

fn chromium_profile_roots(home: &Path) -> Vec<PathBuf> {
    [
        "Library/Application Support/Google/Chrome",
        "Library/Application Support/BraveSoftware/Brave-Browser",
        "Library/Application Support/Microsoft Edge",
        ".config/google-chrome",
        ".config/chromium",
        ".config/BraveSoftware/Brave-Browser",
        ".config/microsoft-edge",
        "AppData/Local/Google/Chrome/User Data",
    ]
    .iter()
    .map(|p| home.join(p))
    .collect()
}

fn firefox_profile_roots(home: &Path) -> Vec<PathBuf> {
    [
        "Library/Application Support/Firefox/Profiles",
        "Library/Application Support/Waterfox/Profiles",
        ".mozilla/firefox",
        ".waterfox",
        "AppData/Roaming/Mozilla/Firefox/Profiles",
    ]
    .iter()
    .map(|p| home.join(p))
    .collect()
}
