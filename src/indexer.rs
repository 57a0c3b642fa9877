//! Domain index built from one traversal of the bookmark tree.

use std::collections::BTreeMap;
use tracing::{debug, info};
use url::Url;

use crate::bookmarks::{BookmarkNode, BookmarkRecord, BookmarkStore};
use crate::error::DomainError;

/// Folder name shown for folders without a title.
pub const UNNAMED_FOLDER: &str = "[Root/Unnamed]";

/// Normalized domain -> bookmarks in traversal order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainIndex {
    domains: BTreeMap<String, Vec<BookmarkRecord>>,
}

impl DomainIndex {
    pub fn get(&self, domain: &str) -> Option<&[BookmarkRecord]> {
        self.domains.get(domain).map(|records| records.as_slice())
    }

    pub fn get_mut(&mut self, domain: &str) -> Option<&mut Vec<BookmarkRecord>> {
        self.domains.get_mut(domain)
    }

    pub fn count(&self, domain: &str) -> usize {
        self.domains.get(domain).map_or(0, |records| records.len())
    }

    pub fn contains(&self, domain: &str) -> bool {
        self.domains.contains_key(domain)
    }

    /// Domains with their bookmark counts, in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> + '_ {
        self.domains.iter().map(|(domain, records)| (domain.as_str(), records.len()))
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    pub fn bookmark_count(&self) -> usize {
        self.domains.values().map(|records| records.len()).sum()
    }

    pub fn remove(&mut self, domain: &str) -> Option<Vec<BookmarkRecord>> {
        self.domains.remove(domain)
    }

    fn push(&mut self, domain: String, record: BookmarkRecord) {
        self.domains.entry(domain).or_default().push(record);
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderStat {
    pub folder_name: String,
    pub direct_bookmark_count: usize,
}

/// Result of one full rebuild.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    pub index: DomainIndex,
    /// Sorted by count, descending; ties in traversal order.
    pub folder_stats: Vec<FolderStat>,
    /// Every URL-bearing node seen, indexed or not.
    pub total_bookmarks: usize,
    /// Bookmarks whose URL did not parse or had no host.
    pub unindexed_bookmarks: usize,
}

impl IndexSnapshot {
    /// `(domain, count)` sorted by count descending, then by domain.
    pub fn top_domains(&self, limit: usize) -> Vec<(String, usize)> {
        let mut domains: Vec<(String, usize)> = self
            .index
            .iter()
            .map(|(domain, count)| (domain.to_string(), count))
            .collect();
        domains.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        domains.truncate(limit);
        domains
    }
}

/// Fetch the whole tree and rebuild the index from scratch.
///
/// A store that cannot produce its tree is an error, never an empty index.
pub async fn rebuild_index(
    store: &dyn BookmarkStore,
    root_folder_ids: &[String],
) -> Result<IndexSnapshot, DomainError> {
    let tree = store
        .get_tree()
        .await
        .map_err(DomainError::StoreUnavailable)?;

    let snapshot = build_snapshot(&tree, root_folder_ids);
    info!(
        "📚 Indexed {} bookmarks across {} domains ({} skipped)",
        snapshot.index.bookmark_count(),
        snapshot.index.domain_count(),
        snapshot.unindexed_bookmarks
    );
    Ok(snapshot)
}

pub fn build_snapshot(tree: &BookmarkNode, root_folder_ids: &[String]) -> IndexSnapshot {
    let mut snapshot = IndexSnapshot::default();
    index_node(tree, &mut snapshot);
    snapshot.folder_stats = folder_stats(tree, root_folder_ids);
    snapshot
}

fn index_node(node: &BookmarkNode, snapshot: &mut IndexSnapshot) {
    match node {
        BookmarkNode::Bookmark { id, title, url, date_added } => {
            snapshot.total_bookmarks += 1;
            match domain_key(url) {
                Some(domain) => snapshot.index.push(
                    domain,
                    BookmarkRecord {
                        id: id.clone(),
                        title: title.clone(),
                        url: url.clone(),
                        date_added: date_added.unwrap_or(0),
                    },
                ),
                None => {
                    debug!("Skipping bookmark {} with unusable URL: {}", id, url);
                    snapshot.unindexed_bookmarks += 1;
                }
            }
        }
        BookmarkNode::Folder { children, .. } => {
            for child in children {
                index_node(child, snapshot);
            }
        }
    }
}

/// Hostname of `url` with one leading `www.` removed.
///
/// `None` when the URL does not parse or has no host (`javascript:`,
/// `file:///`, `about:blank`).
pub fn domain_key(url: &str) -> Option<String> {
    let parsed = Url::parse(url).ok()?;
    let host = parsed.host_str()?;
    let host = host.strip_prefix("www.").unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some(host.to_string())
}

/// Per-folder direct bookmark counts.
///
/// Folders without direct bookmarks are left out unless their id is one of
/// `root_folder_ids`.
pub fn folder_stats(tree: &BookmarkNode, root_folder_ids: &[String]) -> Vec<FolderStat> {
    let mut stats = Vec::new();
    collect_folder_stats(tree, root_folder_ids, &mut stats);
    stats.sort_by(|a, b| b.direct_bookmark_count.cmp(&a.direct_bookmark_count));
    stats
}

fn collect_folder_stats(node: &BookmarkNode, root_folder_ids: &[String], stats: &mut Vec<FolderStat>) {
    let BookmarkNode::Folder { id, title, children, .. } = node else {
        return;
    };

    let is_root = root_folder_ids.iter().any(|root| root == id);
    let direct = children.iter().filter(|child| child.url().is_some()).count();
    if direct > 0 || is_root {
        stats.push(FolderStat {
            folder_name: if title.is_empty() {
                UNNAMED_FOLDER.to_string()
            } else {
                title.clone()
            },
            direct_bookmark_count: direct,
        });
    }

    for child in children {
        collect_folder_stats(child, root_folder_ids, stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::StoreKind;
    use crate::stores::MemoryStore;
    use proptest::prelude::*;

    fn roots() -> Vec<String> {
        vec!["menu".to_string(), "toolbar".to_string()]
    }

    fn scenario_tree() -> BookmarkNode {
        BookmarkNode::folder(
            "root",
            "",
            vec![
                BookmarkNode::folder(
                    "toolbar",
                    "Bookmarks Toolbar",
                    vec![
                        BookmarkNode::bookmark("1", "A one", "http://www.a.com/1", Some(100)),
                        BookmarkNode::bookmark("2", "A two", "http://a.com/2", None),
                    ],
                ),
                BookmarkNode::folder("menu", "", vec![]),
                BookmarkNode::folder(
                    "other",
                    "Other",
                    vec![
                        BookmarkNode::folder(
                            "nested",
                            "Nested",
                            vec![BookmarkNode::bookmark("3", "B", "http://b.com/3", Some(5))],
                        ),
                        BookmarkNode::folder("empty", "Empty", vec![]),
                    ],
                ),
            ],
        )
    }

    #[test]
    fn test_domain_key_strips_one_www() {
        assert_eq!(domain_key("https://www.example.com/x").as_deref(), Some("example.com"));
        assert_eq!(domain_key("https://example.com").as_deref(), Some("example.com"));
        assert_eq!(domain_key("https://www.www.example.com").as_deref(), Some("www.example.com"));
        assert_eq!(domain_key("HTTPS://WWW.Example.COM/").as_deref(), Some("example.com"));
        assert_eq!(domain_key("https://wwwexample.com").as_deref(), Some("wwwexample.com"));
    }

    #[test]
    fn test_domain_key_rejects_unusable_urls() {
        assert_eq!(domain_key("not a url"), None);
        assert_eq!(domain_key("javascript:alert(1)"), None);
        assert_eq!(domain_key("file:///home/me/notes.html"), None);
        assert_eq!(domain_key("https://www."), None);
    }

    #[test]
    fn test_scenario_groups_by_domain() {
        let snapshot = build_snapshot(&scenario_tree(), &roots());

        assert_eq!(snapshot.index.domain_count(), 2);
        let a: Vec<&str> = snapshot.index.get("a.com").unwrap().iter().map(|r| r.id.as_str()).collect();
        assert_eq!(a, vec!["1", "2"]);
        assert_eq!(snapshot.index.count("b.com"), 1);
        assert_eq!(snapshot.index.get("a.com").unwrap()[1].date_added, 0);
        assert_eq!(snapshot.total_bookmarks, 3);
        assert_eq!(snapshot.unindexed_bookmarks, 0);
    }

    #[test]
    fn test_malformed_urls_only_counted() {
        let tree = BookmarkNode::folder(
            "root",
            "",
            vec![
                BookmarkNode::bookmark("1", "bad", "::::", None),
                BookmarkNode::bookmark("2", "bookmarklet", "javascript:void(0)", None),
                BookmarkNode::bookmark("3", "ok", "https://ok.org", None),
            ],
        );
        let snapshot = build_snapshot(&tree, &[]);
        assert_eq!(snapshot.total_bookmarks, 3);
        assert_eq!(snapshot.unindexed_bookmarks, 2);
        assert_eq!(snapshot.index.domain_count(), 1);
    }

    #[test]
    fn test_folder_stats_direct_counts_and_roots() {
        let stats = folder_stats(&scenario_tree(), &roots());
        let flat: Vec<(&str, usize)> = stats
            .iter()
            .map(|s| (s.folder_name.as_str(), s.direct_bookmark_count))
            .collect();
        // "Other" only has nested bookmarks; "Empty" has none; the unnamed menu root stays.
        assert_eq!(
            flat,
            vec![("Bookmarks Toolbar", 2), ("Nested", 1), (UNNAMED_FOLDER, 0)]
        );
    }

    #[test]
    fn test_folder_stats_ties_keep_traversal_order() {
        let tree = BookmarkNode::folder(
            "root",
            "",
            vec![
                BookmarkNode::folder("f1", "First", vec![BookmarkNode::bookmark("1", "", "https://x.io", None)]),
                BookmarkNode::folder("f2", "Second", vec![BookmarkNode::bookmark("2", "", "https://y.io", None)]),
            ],
        );
        let names: Vec<String> = folder_stats(&tree, &[]).into_iter().map(|s| s.folder_name).collect();
        assert_eq!(names, vec!["First", "Second"]);
    }

    #[test]
    fn test_top_domains_order() {
        let snapshot = build_snapshot(&scenario_tree(), &roots());
        assert_eq!(
            snapshot.top_domains(10),
            vec![("a.com".to_string(), 2), ("b.com".to_string(), 1)]
        );
        assert_eq!(snapshot.top_domains(1).len(), 1);
    }

    #[tokio::test]
    async fn test_rebuild_twice_is_identical() {
        let store = MemoryStore::new(StoreKind::Memory, scenario_tree());
        let first = rebuild_index(&store, &roots()).await.unwrap();
        let second = rebuild_index(&store, &roots()).await.unwrap();
        assert_eq!(first.index, second.index);
        assert_eq!(first.folder_stats, second.folder_stats);
    }

    proptest! {
        #[test]
        fn prop_www_and_bare_host_share_key(
            label in "[a-z][a-z0-9]{0,10}",
            tld in "(com|org|net|io)",
            path in "(/[a-z0-9]{0,8}){0,3}",
        ) {
            prop_assume!(label != "www");
            let bare = format!("https://{}.{}{}", label, tld, path);
            let www = format!("http://www.{}.{}{}", label, tld, path);
            let expected = format!("{}.{}", label, tld);
            prop_assert_eq!(domain_key(&bare), Some(expected.clone()));
            prop_assert_eq!(domain_key(&www), Some(expected));
        }
    }
}
