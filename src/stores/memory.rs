use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::bookmarks::{BookmarkNode, BookmarkStore, StoreKind};

/// Bookmark tree held in memory.
///
/// Used directly by tests, and as the mutation engine underneath stores that
/// load a whole file up front.
pub struct MemoryStore {
    kind: StoreKind,
    tree: Mutex<BookmarkNode>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new(kind: StoreKind, root: BookmarkNode) -> Self {
        let next_id = max_numeric_id(&root) + 1;
        Self {
            kind,
            tree: Mutex::new(root),
            next_id: AtomicU64::new(next_id),
        }
    }

    /// Current tree, cloned.
    pub fn snapshot(&self) -> Result<BookmarkNode> {
        Ok(self.lock()?.clone())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BookmarkNode>> {
        self.tree
            .lock()
            .map_err(|_| anyhow!("bookmark tree lock poisoned"))
    }

    fn allocate_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }
}

#[async_trait]
impl BookmarkStore for MemoryStore {
    fn kind(&self) -> StoreKind {
        self.kind
    }

    async fn get_tree(&self) -> Result<BookmarkNode> {
        self.snapshot()
    }

    async fn search_by_title(&self, title: &str) -> Result<Vec<BookmarkNode>> {
        let tree = self.lock()?;
        let mut matches = Vec::new();
        collect_title_matches(&tree, title, &mut matches);
        Ok(matches)
    }

    async fn create_folder(&self, parent_id: &str, title: &str, index: usize) -> Result<BookmarkNode> {
        let id = self.allocate_id();
        let mut tree = self.lock()?;
        let siblings = children_mut(&mut tree, parent_id)
            .ok_or_else(|| anyhow!("Parent folder not found: {}", parent_id))?;

        let folder = BookmarkNode::Folder {
            id,
            title: title.to_string(),
            date_added: Some(chrono::Utc::now().timestamp_millis()),
            children: Vec::new(),
        };
        let position = index.min(siblings.len());
        siblings.insert(position, folder.clone());

        debug!("Created folder '{}' under {} at {}", title, parent_id, position);
        Ok(folder)
    }

    async fn move_node(&self, id: &str, parent_id: &str) -> Result<()> {
        let mut tree = self.lock()?;

        if tree.id() == id {
            bail!("Cannot move the root folder");
        }
        match find_node(&tree, id) {
            Some(node) if find_node(node, parent_id).is_some() => {
                bail!("Cannot move {} into its own subtree", id);
            }
            Some(_) => {}
            None => bail!("Bookmark not found: {}", id),
        }
        if children_mut(&mut tree, parent_id).is_none() {
            bail!("Destination folder not found: {}", parent_id);
        }

        let node = detach(&mut tree, id).ok_or_else(|| anyhow!("Bookmark not found: {}", id))?;
        children_mut(&mut tree, parent_id)
            .ok_or_else(|| anyhow!("Destination folder not found: {}", parent_id))?
            .push(node);
        Ok(())
    }

    async fn remove_node(&self, id: &str) -> Result<()> {
        let mut tree = self.lock()?;

        match find_node(&tree, id) {
            None => bail!("Bookmark not found: {}", id),
            Some(node) if !node.children().is_empty() => {
                bail!("Folder {} is not empty", id);
            }
            Some(_) if tree.id() == id => bail!("Cannot remove the root folder"),
            Some(_) => {}
        }

        detach(&mut tree, id);
        Ok(())
    }
}

pub fn find_node<'a>(node: &'a BookmarkNode, id: &str) -> Option<&'a BookmarkNode> {
    if node.id() == id {
        return Some(node);
    }
    node.children().iter().find_map(|child| find_node(child, id))
}

/// Children list of the folder `id`, if it exists and is a folder.
fn children_mut<'a>(node: &'a mut BookmarkNode, id: &str) -> Option<&'a mut Vec<BookmarkNode>> {
    match node {
        BookmarkNode::Folder { id: node_id, children, .. } => {
            if node_id == id {
                return Some(children);
            }
            children.iter_mut().find_map(|child| children_mut(child, id))
        }
        BookmarkNode::Bookmark { .. } => None,
    }
}

fn detach(node: &mut BookmarkNode, id: &str) -> Option<BookmarkNode> {
    let BookmarkNode::Folder { children, .. } = node else {
        return None;
    };
    if let Some(pos) = children.iter().position(|child| child.id() == id) {
        return Some(children.remove(pos));
    }
    children.iter_mut().find_map(|child| detach(child, id))
}

fn collect_title_matches(node: &BookmarkNode, title: &str, matches: &mut Vec<BookmarkNode>) {
    if node.title() == title {
        matches.push(node.shallow());
    }
    for child in node.children() {
        collect_title_matches(child, title, matches);
    }
}

fn max_numeric_id(node: &BookmarkNode) -> u64 {
    let own = node.id().parse::<u64>().unwrap_or(0);
    node.children()
        .iter()
        .map(max_numeric_id)
        .fold(own, u64::max)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_tree() -> BookmarkNode {
        BookmarkNode::folder(
            "0",
            "",
            vec![
                BookmarkNode::folder(
                    "1",
                    "Bookmarks bar",
                    vec![
                        BookmarkNode::bookmark("3", "Rust", "https://www.rust-lang.org/", Some(10)),
                        BookmarkNode::folder("4", "Reading", vec![]),
                    ],
                ),
                BookmarkNode::folder("2", "Other bookmarks", vec![]),
            ],
        )
    }

    #[tokio::test]
    async fn test_create_folder_inserts_at_position() {
        let store = MemoryStore::new(StoreKind::Chromium, sample_tree());
        let folder = store.create_folder("1", "Archive", 0).await.unwrap();

        assert_eq!(folder.id(), "5");
        let tree = store.get_tree().await.unwrap();
        let bar = find_node(&tree, "1").unwrap();
        assert_eq!(bar.children()[0].title(), "Archive");
    }

    #[tokio::test]
    async fn test_move_appends_to_destination() {
        let store = MemoryStore::new(StoreKind::Chromium, sample_tree());
        store.move_node("3", "2").await.unwrap();

        let tree = store.get_tree().await.unwrap();
        let other = find_node(&tree, "2").unwrap();
        assert_eq!(other.children().len(), 1);
        assert_eq!(other.children()[0].id(), "3");
        assert_eq!(find_node(&tree, "1").unwrap().children().len(), 1);
    }

    #[tokio::test]
    async fn test_move_rejects_unknown_or_cyclic_targets() {
        let store = MemoryStore::new(StoreKind::Chromium, sample_tree());
        assert!(store.move_node("99", "2").await.is_err());
        assert!(store.move_node("3", "99").await.is_err());
        assert!(store.move_node("1", "4").await.is_err());
        assert!(store.move_node("3", "3").await.is_err());
    }

    #[tokio::test]
    async fn test_remove_refuses_non_empty_folder() {
        let store = MemoryStore::new(StoreKind::Chromium, sample_tree());
        assert!(store.remove_node("1").await.is_err());
        store.remove_node("3").await.unwrap();
        store.remove_node("4").await.unwrap();
        store.remove_node("1").await.unwrap();

        let tree = store.get_tree().await.unwrap();
        assert!(find_node(&tree, "1").is_none());
    }

    #[tokio::test]
    async fn test_search_by_title_is_exact_and_shallow() {
        let store = MemoryStore::new(StoreKind::Chromium, sample_tree());
        let found = store.search_by_title("Bookmarks bar").await.unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].children().is_empty());
        assert!(store.search_by_title("bookmarks bar").await.unwrap().is_empty());
    }
}
