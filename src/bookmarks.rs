use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// One node of a host bookmark tree.
///
/// Whether a host node is a folder or a bookmark is decided once, when the
/// store ingests it. Separators and other node kinds never get this far.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BookmarkNode {
    Folder {
        id: String,
        title: String,
        date_added: Option<i64>,
        children: Vec<BookmarkNode>,
    },
    Bookmark {
        id: String,
        title: String,
        url: String,
        date_added: Option<i64>,
    },
}

impl BookmarkNode {
    pub fn folder(id: impl Into<String>, title: impl Into<String>, children: Vec<BookmarkNode>) -> Self {
        BookmarkNode::Folder {
            id: id.into(),
            title: title.into(),
            date_added: None,
            children,
        }
    }

    pub fn bookmark(
        id: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
        date_added: Option<i64>,
    ) -> Self {
        BookmarkNode::Bookmark {
            id: id.into(),
            title: title.into(),
            url: url.into(),
            date_added,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            BookmarkNode::Folder { id, .. } | BookmarkNode::Bookmark { id, .. } => id,
        }
    }

    pub fn title(&self) -> &str {
        match self {
            BookmarkNode::Folder { title, .. } | BookmarkNode::Bookmark { title, .. } => title,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, BookmarkNode::Folder { .. })
    }

    pub fn url(&self) -> Option<&str> {
        match self {
            BookmarkNode::Bookmark { url, .. } => Some(url),
            BookmarkNode::Folder { .. } => None,
        }
    }

    pub fn children(&self) -> &[BookmarkNode] {
        match self {
            BookmarkNode::Folder { children, .. } => children,
            BookmarkNode::Bookmark { .. } => &[],
        }
    }

    /// Copy of this node without its subtree, as returned by title searches.
    pub fn shallow(&self) -> BookmarkNode {
        match self {
            BookmarkNode::Folder { id, title, date_added, .. } => BookmarkNode::Folder {
                id: id.clone(),
                title: title.clone(),
                date_added: *date_added,
                children: Vec::new(),
            },
            bookmark => bookmark.clone(),
        }
    }
}

/// Immutable snapshot of one host bookmark at index time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkRecord {
    pub id: String,
    pub title: String,
    pub url: String,
    /// Milliseconds since the Unix epoch, 0 when the host did not record it.
    pub date_added: i64,
}

/// The operations the domain tool needs from a browser's bookmark store.
///
/// Calls are awaited one at a time; implementations may assume no two calls
/// overlap.
#[async_trait]
pub trait BookmarkStore: Send + Sync {
    fn kind(&self) -> StoreKind;

    /// Fetch the whole tree as a single root folder.
    async fn get_tree(&self) -> Result<BookmarkNode>;

    /// Every node whose title equals `title`, at any depth, without children.
    async fn search_by_title(&self, title: &str) -> Result<Vec<BookmarkNode>>;

    /// Create an empty folder under `parent_id` at child position `index`.
    async fn create_folder(&self, parent_id: &str, title: &str, index: usize) -> Result<BookmarkNode>;

    /// Move a node to the end of `parent_id`'s children.
    async fn move_node(&self, id: &str, parent_id: &str) -> Result<()>;

    /// Remove a bookmark, or a folder that has no children.
    async fn remove_node(&self, id: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Chromium,
    Firefox,
    Memory,
}

impl StoreKind {
    pub fn name(&self) -> &'static str {
        match self {
            StoreKind::Chromium => "Chromium",
            StoreKind::Firefox => "Firefox",
            StoreKind::Memory => "Memory",
        }
    }

    /// Root folders reported in folder statistics even when they hold no
    /// direct bookmarks (bookmarks menu and toolbar, or their equivalents).
    pub fn default_root_folder_ids(&self) -> Vec<String> {
        match self {
            StoreKind::Firefox => vec!["menu________".to_string(), "toolbar_____".to_string()],
            StoreKind::Chromium => vec!["1".to_string(), "2".to_string()],
            StoreKind::Memory => vec!["menu".to_string(), "toolbar".to_string()],
        }
    }

    /// Where new folders go when no location is given.
    pub fn default_parent_id(&self) -> &'static str {
        match self {
            StoreKind::Firefox => "unfiled_____",
            StoreKind::Chromium => "2",
            StoreKind::Memory => "other",
        }
    }
}

impl std::str::FromStr for StoreKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "chromium" | "chrome" | "brave" | "edge" => Ok(StoreKind::Chromium),
            "firefox" | "waterfox" | "places" => Ok(StoreKind::Firefox),
            "memory" => Ok(StoreKind::Memory),
            other => anyhow::bail!("Unknown store kind: {}. Use 'chromium' or 'firefox'", other),
        }
    }
}
