//! Chromium `Bookmarks` JSON file (Chrome, Brave, Edge, Vivaldi).
//!
//! The file is loaded once into a [`MemoryStore`]; every mutation is applied
//! to the tree and then written back, so each call is durable on return.
//! Fields this tool does not model (`guid`, `meta_info`, `date_last_used`...)
//! are kept per node id and written back untouched.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

use super::memory::MemoryStore;
use crate::bookmarks::{BookmarkNode, BookmarkStore, StoreKind};

/// Microseconds between 1601-01-01 (WebKit epoch) and 1970-01-01.
const WEBKIT_EPOCH_OFFSET_MICROS: i64 = 11_644_473_600_000_000;

/// Id of the synthetic folder holding the `roots` entries.
const SYNTHETIC_ROOT_ID: &str = "0";

pub struct ChromiumStore {
    path: PathBuf,
    tree: MemoryStore,
    /// Unmodelled fields per node id.
    extras: Mutex<HashMap<String, Map<String, Value>>>,
    /// `roots` key for each top-level folder id, in file order.
    root_keys: Vec<(String, String)>,
    /// Top-level document fields other than `roots` and `checksum`.
    header: Map<String, Value>,
    backed_up: AtomicBool,
}

impl ChromiumStore {
    pub async fn open(path: &Path) -> Result<Self> {
        let data = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read Chromium bookmarks at {:?}", path))?;
        let document: Value = serde_json::from_str(&data)
            .with_context(|| format!("Invalid Chromium bookmarks JSON at {:?}", path))?;

        let store = Self::from_document(path.to_path_buf(), document)?;
        debug!("Loaded Chromium bookmarks from {:?}", path);
        Ok(store)
    }

    fn from_document(path: PathBuf, document: Value) -> Result<Self> {
        let roots = document
            .get("roots")
            .and_then(|v| v.as_object())
            .context("Chromium bookmarks file has no 'roots' object")?;

        let mut extras = HashMap::new();
        let mut root_keys = Vec::new();
        let mut top_level = Vec::new();

        for (key, root) in roots {
            if !root.is_object() {
                continue;
            }
            if let Some(node) = parse_chromium_node(root, &mut extras) {
                root_keys.push((node.id().to_string(), key.clone()));
                top_level.push(node);
            }
        }

        let mut header = document.as_object().cloned().unwrap_or_default();
        header.remove("roots");
        header.remove("checksum");

        let root = BookmarkNode::folder(SYNTHETIC_ROOT_ID, "", top_level);
        Ok(Self {
            path,
            tree: MemoryStore::new(StoreKind::Chromium, root),
            extras: Mutex::new(extras),
            root_keys,
            header,
            backed_up: AtomicBool::new(false),
        })
    }

    /// Copy the original file aside before the first write of this session.
    async fn backup_bookmarks(&self) -> Result<PathBuf> {
        let backup_path = self.path.with_extension("json.backup");
        tokio::fs::copy(&self.path, &backup_path)
            .await
            .with_context(|| format!("Failed to back up {:?}", self.path))?;
        Ok(backup_path)
    }

    async fn persist(&self) -> Result<()> {
        if !self.backed_up.swap(true, Ordering::SeqCst) {
            match self.backup_bookmarks().await {
                Ok(backup_path) => info!("💾 Backup created: {:?}", backup_path),
                Err(e) => warn!("⚠️  Failed to create backup: {}", e),
            }
        }

        let document = self.to_document()?;
        let data = serde_json::to_string_pretty(&document)?;
        tokio::fs::write(&self.path, data)
            .await
            .with_context(|| format!("Failed to write Chromium bookmarks to {:?}", self.path))?;
        Ok(())
    }

    fn to_document(&self) -> Result<Value> {
        let tree = self.tree.snapshot()?;
        let extras = self
            .extras
            .lock()
            .map_err(|_| anyhow::anyhow!("extras lock poisoned"))?;

        let mut roots = Map::new();
        for child in tree.children() {
            let key = self
                .root_keys
                .iter()
                .find(|(id, _)| id == child.id())
                .map(|(_, key)| key.clone())
                .unwrap_or_else(|| format!("folder_{}", child.id()));
            roots.insert(key, node_to_json(child, &extras));
        }

        let mut document = self.header.clone();
        document.insert("roots".to_string(), Value::Object(roots));
        document
            .entry("version".to_string())
            .or_insert_with(|| json!(1));
        Ok(Value::Object(document))
    }
}

#[async_trait]
impl BookmarkStore for ChromiumStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Chromium
    }

    async fn get_tree(&self) -> Result<BookmarkNode> {
        self.tree.get_tree().await
    }

    async fn search_by_title(&self, title: &str) -> Result<Vec<BookmarkNode>> {
        self.tree.search_by_title(title).await
    }

    async fn create_folder(&self, parent_id: &str, title: &str, index: usize) -> Result<BookmarkNode> {
        if parent_id == SYNTHETIC_ROOT_ID {
            anyhow::bail!("Chromium does not allow folders next to the permanent roots");
        }
        let folder = self.tree.create_folder(parent_id, title, index).await?;

        let mut fields = Map::new();
        fields.insert("guid".to_string(), json!(uuid::Uuid::new_v4().to_string()));
        fields.insert("date_modified".to_string(), json!("0"));
        self.extras
            .lock()
            .map_err(|_| anyhow::anyhow!("extras lock poisoned"))?
            .insert(folder.id().to_string(), fields);

        self.persist().await?;
        Ok(folder)
    }

    async fn move_node(&self, id: &str, parent_id: &str) -> Result<()> {
        if parent_id == SYNTHETIC_ROOT_ID {
            anyhow::bail!("Chromium does not allow bookmarks next to the permanent roots");
        }
        self.tree.move_node(id, parent_id).await?;
        self.persist().await
    }

    async fn remove_node(&self, id: &str) -> Result<()> {
        if self.root_keys.iter().any(|(root_id, _)| root_id == id) {
            anyhow::bail!("Cannot remove permanent folder {}", id);
        }
        self.tree.remove_node(id).await?;
        self.extras
            .lock()
            .map_err(|_| anyhow::anyhow!("extras lock poisoned"))?
            .remove(id);
        self.persist().await
    }
}

/// Convert one Chromium JSON node; separators and unknown types are dropped.
fn parse_chromium_node(
    node: &Value,
    extras: &mut HashMap<String, Map<String, Value>>,
) -> Option<BookmarkNode> {
    let object = node.as_object()?;
    let id = object.get("id").and_then(json_id)?;
    let title = object
        .get("name")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    let date_added = object.get("date_added").and_then(webkit_to_millis);

    let mut fields = object.clone();
    for key in ["id", "name", "type", "url", "children"] {
        fields.remove(key);
    }
    extras.insert(id.clone(), fields);

    match object.get("type").and_then(|v| v.as_str()) {
        Some("folder") => {
            let children = object
                .get("children")
                .and_then(|v| v.as_array())
                .map(|children| {
                    children
                        .iter()
                        .filter_map(|child| parse_chromium_node(child, extras))
                        .collect()
                })
                .unwrap_or_default();
            Some(BookmarkNode::Folder {
                id,
                title,
                date_added,
                children,
            })
        }
        Some("url") => {
            let url = object.get("url").and_then(|v| v.as_str())?.to_string();
            Some(BookmarkNode::Bookmark {
                id,
                title,
                url,
                date_added,
            })
        }
        _ => None,
    }
}

fn node_to_json(node: &BookmarkNode, extras: &HashMap<String, Map<String, Value>>) -> Value {
    let mut object = extras.get(node.id()).cloned().unwrap_or_default();
    object.insert("id".to_string(), json!(node.id()));
    object.insert("name".to_string(), json!(node.title()));

    let date_added = match node {
        BookmarkNode::Folder { date_added, .. } | BookmarkNode::Bookmark { date_added, .. } => *date_added,
    };
    if !object.contains_key("date_added") {
        object.insert(
            "date_added".to_string(),
            json!(millis_to_webkit(date_added.unwrap_or(0)).to_string()),
        );
    }

    match node {
        BookmarkNode::Folder { children, .. } => {
            object.insert("type".to_string(), json!("folder"));
            let children: Vec<Value> = children.iter().map(|c| node_to_json(c, extras)).collect();
            object.insert("children".to_string(), Value::Array(children));
        }
        BookmarkNode::Bookmark { url, .. } => {
            object.insert("type".to_string(), json!("url"));
            object.insert("url".to_string(), json!(url));
        }
    }
    Value::Object(object)
}

fn json_id(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Chromium stores timestamps as WebKit microseconds, usually as a string.
fn webkit_to_millis(value: &Value) -> Option<i64> {
    let micros = match value {
        Value::String(s) => s.parse::<i64>().ok()?,
        Value::Number(n) => n.as_i64()?,
        _ => return None,
    };
    if micros <= 0 {
        return None;
    }
    Some((micros - WEBKIT_EPOCH_OFFSET_MICROS) / 1000)
}

fn millis_to_webkit(millis: i64) -> i64 {
    millis * 1000 + WEBKIT_EPOCH_OFFSET_MICROS
}
