use std::error::Error as _;
use tracing::{info, warn};

use crate::bookmarks::BookmarkStore;
use crate::clipboard::Clipboard;
use crate::config::Config;
use crate::error::DomainError;
use crate::indexer::{self, IndexSnapshot};
use crate::mutator::{self, DeleteMode, Destination};
use crate::query::{self, CountPredicate, DomainFilter, DomainQuery, Selection, SortOrder};
use crate::report::Report;

/// Owns the store, the current index and the output collaborators; every
/// public command goes through here.
///
/// The index is `None` until the first successful build. Moves rebuild it
/// from the store; deletes update it in place.
pub struct DomainEngine {
    store: Box<dyn BookmarkStore>,
    config: Config,
    clipboard: Box<dyn Clipboard>,
    report: Box<dyn Report>,
    snapshot: Option<IndexSnapshot>,
}

impl DomainEngine {
    pub fn new(
        store: Box<dyn BookmarkStore>,
        config: Config,
        clipboard: Box<dyn Clipboard>,
        report: Box<dyn Report>,
    ) -> Self {
        Self {
            store,
            config,
            clipboard,
            report,
            snapshot: None,
        }
    }

    /// Replace the index with a fresh traversal of the store. A failed
    /// rebuild leaves the previous index in place.
    pub async fn reindex(&mut self) -> Result<&IndexSnapshot, DomainError> {
        let roots = self.config.root_folder_ids();
        info!("📚 Indexing {} bookmarks", self.store.kind().name());
        match indexer::rebuild_index(self.store.as_ref(), &roots).await {
            Ok(snapshot) => {
                self.report.info(&format!(
                    "📚 {} bookmarks, {} domains",
                    snapshot.total_bookmarks,
                    snapshot.index.domain_count()
                ));
                Ok(self.snapshot.insert(snapshot))
            }
            Err(e) => self.fail(e),
        }
    }

    pub fn snapshot(&self) -> Result<&IndexSnapshot, DomainError> {
        self.snapshot.as_ref().ok_or(DomainError::NoDataLoaded)
    }

    pub fn by_exact_count(
        &mut self,
        n: usize,
        filters: Vec<String>,
        strict: bool,
        order: SortOrder,
    ) -> Result<Vec<String>, DomainError> {
        self.run_query(DomainQuery {
            predicate: CountPredicate::Exact(n),
            filter: DomainFilter::new(filters, strict),
            order,
        })
    }

    pub fn by_range_count(
        &mut self,
        min: usize,
        max: usize,
        filters: Vec<String>,
        strict: bool,
        order: SortOrder,
    ) -> Result<Vec<String>, DomainError> {
        self.run_query(DomainQuery {
            predicate: CountPredicate::Range { min, max },
            filter: DomainFilter::new(filters, strict),
            order,
        })
    }

    fn run_query(&mut self, query: DomainQuery) -> Result<Vec<String>, DomainError> {
        let Some(snapshot) = self.snapshot.as_mut() else {
            return self.fail(DomainError::NoDataLoaded);
        };

        let domains = match query::select_domains(&snapshot.index, &query) {
            Selection::Matched(domains) => domains,
            Selection::NoCountMatch => {
                self.report.warn(&format!(
                    "No domains with {} bookmarks",
                    query.predicate.describe()
                ));
                return Ok(Vec::new());
            }
            Selection::NoFilterMatch { candidates } => {
                self.report.warn(&format!(
                    "{} domains have {} bookmarks, but none match the filters {:?}",
                    candidates,
                    query.predicate.describe(),
                    query.filter.patterns
                ));
                return Ok(Vec::new());
            }
        };

        query::sort_bookmarks(&mut snapshot.index, &domains, query.order);
        let export = query::format_export(&snapshot.index, &domains, &self.config.date_format);

        self.report.info(&format!(
            "🔎 {} domains with {} bookmarks",
            domains.len(),
            query.predicate.describe()
        ));
        for domain in &domains {
            let records = snapshot.index.get(domain).unwrap_or_default();
            let rows: Vec<Vec<String>> = records
                .iter()
                .map(|r| vec![r.title.clone(), r.url.clone()])
                .collect();
            self.report.group_start(&format!("{} ({})", domain, records.len()));
            self.report.table(&["title", "url"], &rows);
            self.report.group_end();
        }

        match self.clipboard.write_text(&export) {
            Ok(()) => self.report.info(&format!(
                "📋 Export of {} domains written to {}",
                domains.len(),
                self.clipboard.name()
            )),
            Err(e) => {
                warn!("Clipboard write failed: {:#}", e);
                self.report
                    .warn(&format!("Could not write export to {}: {:#}", self.clipboard.name(), e));
            }
        }

        Ok(domains)
    }

    /// Move every bookmark of `domains` into the folder titled `folder_name`,
    /// then rebuild the index. Returns the number of bookmarks moved.
    pub async fn move_domains_to_folder(
        &mut self,
        domains: &[String],
        folder_name: &str,
        dry_run: bool,
    ) -> Result<usize, DomainError> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return self.fail(DomainError::NoDataLoaded);
        };

        let known: Vec<String> = domains
            .iter()
            .filter(|d| snapshot.index.contains(d))
            .cloned()
            .collect();
        let total: usize = known.iter().map(|d| snapshot.index.count(d)).sum();
        if known.is_empty() {
            self.report
                .warn(&format!("None of the domains {:?} are in the index", domains));
            return Ok(0);
        }

        let default_parent = self.config.default_parent_id();
        let destination = match mutator::resolve_destination(
            self.store.as_ref(),
            folder_name,
            &default_parent,
            dry_run,
        )
        .await
        {
            Ok(destination) => destination,
            Err(e) => return self.fail(e),
        };

        let folder_id = match destination {
            Destination::Existing(id) | Destination::Created(id) => id,
            Destination::Missing => String::new(),
        };
        if dry_run {
            let target = if folder_id.is_empty() {
                format!("new folder '{}'", folder_name)
            } else {
                format!("folder '{}' ({})", folder_name, folder_id)
            };
            self.report.info(&format!(
                "🏃 Dry run: would move {} bookmarks from {} domains to {}",
                total,
                known.len(),
                target
            ));
            return Ok(total);
        }

        info!("🚚 Moving {} bookmarks from {} domains to '{}'", total, known.len(), folder_name);
        let moved = match mutator::move_domains(self.store.as_ref(), &snapshot.index, &known, &folder_id).await {
            Ok(moved) => moved,
            Err(e) => return self.fail(e),
        };

        self.reindex().await?;
        self.report.info(&format!(
            "✅ Moved {} bookmarks from {} domains to '{}'",
            moved,
            known.len(),
            folder_name
        ));
        Ok(moved)
    }

    /// Delete every bookmark of the domains `mode` selects for `domain_input`.
    /// Returns the number of bookmarks deleted.
    pub async fn delete_domain(
        &mut self,
        domain_input: &str,
        mode: &str,
        dry_run: bool,
    ) -> Result<usize, DomainError> {
        let mode: DeleteMode = match mode.parse() {
            Ok(mode) => mode,
            Err(e) => return self.fail(e),
        };
        let Some(snapshot) = self.snapshot.as_mut() else {
            return self.fail(DomainError::NoDataLoaded);
        };

        let targets = mutator::resolve_delete_targets(&snapshot.index, domain_input, mode);
        if targets.is_empty() {
            self.report.warn(&format!(
                "No domains match '{}' ({:?} mode)",
                domain_input, mode
            ));
            return Ok(0);
        }

        let total: usize = targets.iter().map(|d| snapshot.index.count(d)).sum();
        self.report.info(&format!(
            "🎯 {} bookmarks in {} domains: {}",
            total,
            targets.len(),
            targets.join(", ")
        ));
        if dry_run {
            self.report
                .info(&format!("🏃 Dry run: would delete {} bookmarks", total));
            return Ok(total);
        }

        let deleted =
            match mutator::delete_domains(self.store.as_ref(), &mut snapshot.index, &targets).await {
                Ok(deleted) => deleted,
                Err(e) => return self.fail(e),
            };
        self.report.info(&format!("🗑️  Deleted {} bookmarks", deleted));
        Ok(deleted)
    }

    /// Totals, folder statistics and the most bookmarked domains.
    pub fn print_stats(&mut self, top: Option<usize>) -> Result<(), DomainError> {
        let Some(snapshot) = self.snapshot.as_ref() else {
            return self.fail(DomainError::NoDataLoaded);
        };
        let top = top.unwrap_or(self.config.top_domains);

        self.report.group_start("📊 Bookmark statistics");
        self.report.info(&format!("Bookmarks: {}", snapshot.total_bookmarks));
        self.report.info(&format!("Domains:   {}", snapshot.index.domain_count()));
        if snapshot.unindexed_bookmarks > 0 {
            self.report.info(&format!(
                "Skipped:   {} (no usable host)",
                snapshot.unindexed_bookmarks
            ));
        }
        self.report.group_end();

        let folders: Vec<Vec<String>> = snapshot
            .folder_stats
            .iter()
            .map(|s| vec![s.folder_name.clone(), s.direct_bookmark_count.to_string()])
            .collect();
        self.report.group_start("📁 Folders");
        self.report.table(&["folder", "bookmarks"], &folders);
        self.report.group_end();

        let domains: Vec<Vec<String>> = snapshot
            .top_domains(top)
            .into_iter()
            .map(|(domain, count)| vec![domain, count.to_string()])
            .collect();
        self.report.group_start(&format!("🌐 Top {} domains", domains.len()));
        self.report.table(&["domain", "bookmarks"], &domains);
        self.report.group_end();
        Ok(())
    }

    fn fail<T>(&mut self, error: DomainError) -> Result<T, DomainError> {
        self.report.error(&error_chain(&error));
        Err(error)
    }
}

/// One-line rendering of an error and all of its causes.
pub fn error_chain(error: &DomainError) -> String {
    let mut message = error.to_string();
    let mut source = error.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bookmarks::{BookmarkNode, StoreKind};
    use crate::clipboard::MemoryClipboard;
    use crate::report::RecordingReport;
    use crate::stores::MemoryStore;
    use anyhow::{bail, Result};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Memory store whose tree fetch and removals can be made to fail.
    struct FlakyStore {
        inner: MemoryStore,
        fail_tree: Arc<AtomicBool>,
        removals_left: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl BookmarkStore for FlakyStore {
        fn kind(&self) -> StoreKind {
            self.inner.kind()
        }

        async fn get_tree(&self) -> Result<BookmarkNode> {
            if self.fail_tree.load(Ordering::SeqCst) {
                bail!("profile is locked");
            }
            self.inner.get_tree().await
        }

        async fn search_by_title(&self, title: &str) -> Result<Vec<BookmarkNode>> {
            self.inner.search_by_title(title).await
        }

        async fn create_folder(&self, parent_id: &str, title: &str, index: usize) -> Result<BookmarkNode> {
            self.inner.create_folder(parent_id, title, index).await
        }

        async fn move_node(&self, id: &str, parent_id: &str) -> Result<()> {
            self.inner.move_node(id, parent_id).await
        }

        async fn remove_node(&self, id: &str) -> Result<()> {
            let left = self.removals_left.load(Ordering::SeqCst);
            if left == 0 {
                bail!("quota exceeded");
            }
            self.removals_left.store(left - 1, Ordering::SeqCst);
            self.inner.remove_node(id).await
        }
    }

    fn tree() -> BookmarkNode {
        BookmarkNode::folder(
            "root",
            "",
            vec![
                BookmarkNode::folder(
                    "toolbar",
                    "Toolbar",
                    vec![
                        BookmarkNode::bookmark("1", "A one", "https://a.com/1", Some(2_000)),
                        BookmarkNode::bookmark("2", "A two", "https://www.a.com/2", Some(1_000)),
                        BookmarkNode::bookmark("3", "B", "https://b.com/", Some(3_000)),
                        BookmarkNode::bookmark("4", "Maps", "https://maps.google.com/", None),
                        BookmarkNode::bookmark("5", "Search", "https://google.com/", None),
                        BookmarkNode::bookmark("6", "Notes", "about:blank", None),
                    ],
                ),
                BookmarkNode::folder("menu", "Menu", vec![]),
                BookmarkNode::folder("other", "Other", vec![]),
            ],
        )
    }

    fn engine_with(store: Box<dyn BookmarkStore>) -> (DomainEngine, RecordingReport, MemoryClipboard) {
        let report = RecordingReport::new();
        let clipboard = MemoryClipboard::new();
        let config = Config {
            store: StoreKind::Memory,
            ..Default::default()
        };
        let engine = DomainEngine::new(
            store,
            config,
            Box::new(clipboard.clone()),
            Box::new(report.clone()),
        );
        (engine, report, clipboard)
    }

    fn engine() -> (DomainEngine, RecordingReport, MemoryClipboard) {
        engine_with(Box::new(MemoryStore::new(StoreKind::Memory, tree())))
    }

    #[tokio::test]
    async fn test_exact_count_exports_matching_domain() {
        let (mut engine, report, clipboard) = engine();
        engine.reindex().await.unwrap();

        let domains = engine.by_exact_count(2, vec![], false, SortOrder::Asc).unwrap();
        assert_eq!(domains, vec!["a.com"]);

        let export = clipboard.last().unwrap();
        assert!(export.starts_with("\n=== a.com (2) ===\n"));
        // Ascending by date: the www bookmark was added first.
        assert!(export.find("A two").unwrap() < export.find("A one").unwrap());
        assert!(report.contains("GROUP a.com (2)"));
    }

    #[tokio::test]
    async fn test_range_orders_by_count_then_name() {
        let (mut engine, _, _) = engine();
        engine.reindex().await.unwrap();

        let domains = engine.by_range_count(1, 5, vec![], false, SortOrder::Desc).unwrap();
        assert_eq!(domains, vec!["a.com", "b.com", "google.com", "maps.google.com"]);
    }

    #[tokio::test]
    async fn test_strict_filter_and_empty_results() {
        let (mut engine, report, clipboard) = engine();
        engine.reindex().await.unwrap();

        let strict = engine
            .by_exact_count(1, vec!["google.com".to_string()], true, SortOrder::Asc)
            .unwrap();
        assert_eq!(strict, vec!["google.com"]);

        let loose = engine
            .by_exact_count(1, vec!["google.com".to_string()], false, SortOrder::Asc)
            .unwrap();
        assert_eq!(loose, vec!["google.com", "maps.google.com"]);

        let none = engine.by_exact_count(9, vec![], false, SortOrder::Asc).unwrap();
        assert!(none.is_empty());
        assert!(report.contains("WARN No domains with exactly 9 bookmarks"));

        let filtered = engine
            .by_exact_count(1, vec!["example".to_string()], false, SortOrder::Asc)
            .unwrap();
        assert!(filtered.is_empty());
        assert!(report.contains("none match the filters"));
        assert!(!clipboard.last().unwrap().contains("example"));
    }

    #[tokio::test]
    async fn test_commands_need_an_index() {
        let (mut engine, report, clipboard) = engine();

        let err = engine.by_exact_count(1, vec![], false, SortOrder::Asc).unwrap_err();
        assert!(matches!(err, DomainError::NoDataLoaded));
        assert!(matches!(engine.print_stats(None), Err(DomainError::NoDataLoaded)));
        assert!(matches!(
            engine.delete_domain("a.com", "exact", false).await,
            Err(DomainError::NoDataLoaded)
        ));
        assert!(report.contains("ERROR no bookmark data loaded"));
        assert!(clipboard.last().is_none());
    }

    #[tokio::test]
    async fn test_delete_tree_mode_updates_index() {
        let (mut engine, _, _) = engine();
        engine.reindex().await.unwrap();

        let deleted = engine.delete_domain("google.com", "tree", false).await.unwrap();
        assert_eq!(deleted, 2);

        let index = &engine.snapshot().unwrap().index;
        assert!(!index.contains("google.com"));
        assert!(!index.contains("maps.google.com"));
        assert_eq!(index.count("a.com"), 2);

        let rebuilt = engine.reindex().await.unwrap();
        assert_eq!(rebuilt.total_bookmarks, 4);
    }

    #[tokio::test]
    async fn test_delete_rejects_unknown_mode_and_honours_dry_run() {
        let (mut engine, report, _) = engine();
        engine.reindex().await.unwrap();

        let err = engine.delete_domain("a.com", "subtree", false).await.unwrap_err();
        assert!(matches!(err, DomainError::InvalidMode(_)));
        assert!(report.contains("ERROR invalid delete mode 'subtree'"));

        assert_eq!(engine.delete_domain("a.com", "loose", true).await.unwrap(), 2);
        assert_eq!(engine.snapshot().unwrap().index.count("a.com"), 2);
        assert_eq!(engine.reindex().await.unwrap().total_bookmarks, 6);

        assert_eq!(engine.delete_domain("nothing.org", "exact", false).await.unwrap(), 0);
        assert!(report.contains("WARN No domains match 'nothing.org'"));
    }

    #[tokio::test]
    async fn test_move_creates_folder_and_rebuilds() {
        let (mut engine, report, _) = engine();
        engine.reindex().await.unwrap();

        let domains = vec!["a.com".to_string(), "b.com".to_string()];
        assert_eq!(engine.move_domains_to_folder(&domains, "Archive", true).await.unwrap(), 3);
        assert!(report.contains("new folder 'Archive'"));

        let moved = engine.move_domains_to_folder(&domains, "Archive", false).await.unwrap();
        assert_eq!(moved, 3);

        let snapshot = engine.snapshot().unwrap();
        assert_eq!(snapshot.total_bookmarks, 6);
        let archive = snapshot
            .folder_stats
            .iter()
            .find(|s| s.folder_name == "Archive")
            .unwrap();
        assert_eq!(archive.direct_bookmark_count, 3);

        // A second move reuses the folder.
        engine.move_domains_to_folder(&domains, "Archive", false).await.unwrap();
        let archives = engine
            .snapshot()
            .unwrap()
            .folder_stats
            .iter()
            .filter(|s| s.folder_name == "Archive")
            .count();
        assert_eq!(archives, 1);
    }

    #[tokio::test]
    async fn test_delete_after_move_leaves_nothing_after_reindex() {
        let (mut engine, _, _) = engine();
        engine.reindex().await.unwrap();

        let domains = vec!["a.com".to_string(), "b.com".to_string()];
        assert_eq!(engine.move_domains_to_folder(&domains, "Archive", false).await.unwrap(), 3);

        assert_eq!(engine.delete_domain("a.com", "exact", false).await.unwrap(), 2);
        assert_eq!(engine.delete_domain("b.com", "exact", false).await.unwrap(), 1);

        let snapshot = engine.reindex().await.unwrap();
        assert_eq!(snapshot.index.count("a.com"), 0);
        assert_eq!(snapshot.index.count("b.com"), 0);
        assert_eq!(snapshot.total_bookmarks, 3);
        assert!(snapshot
            .folder_stats
            .iter()
            .filter(|s| s.folder_name == "Archive")
            .all(|s| s.direct_bookmark_count == 0));
    }

    #[tokio::test]
    async fn test_move_of_unknown_domains_creates_nothing() {
        let (mut engine, report, _) = engine();
        engine.reindex().await.unwrap();

        let moved = engine
            .move_domains_to_folder(&["nope.example".to_string()], "Archive", false)
            .await
            .unwrap();
        assert_eq!(moved, 0);
        assert!(report.contains("WARN None of the domains"));
        assert!(engine
            .snapshot()
            .unwrap()
            .folder_stats
            .iter()
            .all(|s| s.folder_name != "Archive"));
    }

    #[tokio::test]
    async fn test_partial_delete_keeps_remaining_records() {
        let removals_left = Arc::new(AtomicUsize::new(1));
        let store = FlakyStore {
            inner: MemoryStore::new(StoreKind::Memory, tree()),
            fail_tree: Arc::new(AtomicBool::new(false)),
            removals_left: removals_left.clone(),
        };
        let (mut engine, report, _) = engine_with(Box::new(store));
        engine.reindex().await.unwrap();

        let err = engine.delete_domain("a.com", "exact", false).await.unwrap_err();
        assert!(matches!(err, DomainError::HostCall { .. }));
        assert!(report.contains("quota exceeded"));

        // The first record is gone, the second survives in store and index.
        let records = engine.snapshot().unwrap().index.get("a.com").unwrap().to_vec();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].id, "2");

        removals_left.store(10, Ordering::SeqCst);
        assert_eq!(engine.delete_domain("a.com", "exact", false).await.unwrap(), 1);
        assert_eq!(engine.reindex().await.unwrap().total_bookmarks, 4);
    }

    #[tokio::test]
    async fn test_failed_reindex_keeps_previous_index() {
        let fail_tree = Arc::new(AtomicBool::new(true));
        let store = FlakyStore {
            inner: MemoryStore::new(StoreKind::Memory, tree()),
            fail_tree: fail_tree.clone(),
            removals_left: Arc::new(AtomicUsize::new(0)),
        };
        let (mut engine, report, _) = engine_with(Box::new(store));

        assert!(matches!(engine.reindex().await, Err(DomainError::StoreUnavailable(_))));
        assert!(report.contains("ERROR bookmark store unavailable: profile is locked"));
        assert!(matches!(engine.snapshot(), Err(DomainError::NoDataLoaded)));

        fail_tree.store(false, Ordering::SeqCst);
        engine.reindex().await.unwrap();
        fail_tree.store(true, Ordering::SeqCst);
        assert!(engine.reindex().await.is_err());
        assert_eq!(engine.snapshot().unwrap().total_bookmarks, 6);
    }

    #[tokio::test]
    async fn test_stats_lists_roots_and_top_domains() {
        let (mut engine, report, _) = engine();
        engine.reindex().await.unwrap();
        engine.print_stats(Some(1)).unwrap();

        assert!(report.contains("Bookmarks: 6"));
        assert!(report.contains("Skipped:   1"));
        assert!(report.contains("GROUP 🌐 Top 1 domains"));
        // Empty configured roots are still listed.
        assert!(report.contains("Menu"));
    }
}
