//! Firefox/Waterfox `places.sqlite` store.
//!
//! Node ids are the 12-character bookmark guids (`menu________`,
//! `toolbar_____`...), matching what the WebExtension bookmarks API exposes.
//! Every call opens its own connection; writes run in one transaction each.

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::bookmarks::{BookmarkNode, BookmarkStore, StoreKind};
use crate::db_safety;

const TYPE_BOOKMARK: i64 = 1;
const TYPE_FOLDER: i64 = 2;

const ROOT_GUID: &str = "root________";
/// Tag folders are bookmarks-table rows but not part of the user's tree.
const TAGS_GUID: &str = "tags________";

pub struct FirefoxStore {
    path: PathBuf,
}

struct PlacesRow {
    id: i64,
    guid: String,
    kind: i64,
    title: String,
    url: Option<String>,
    date_added: Option<i64>,
}

impl FirefoxStore {
    pub fn open(path: &Path) -> Result<Self> {
        db_safety::check_compatibility(path)
            .with_context(|| format!("Cannot use {:?} as a Firefox bookmark store", path))?;
        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    fn connect(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path).context("Failed to open places.sqlite")?;
        conn.busy_timeout(Duration::from_secs(30))?;
        Ok(conn)
    }

    fn connect_for_write(&self) -> Result<Connection> {
        db_safety::ensure_writable(&self.path)?;
        self.connect()
    }
}

#[async_trait]
impl BookmarkStore for FirefoxStore {
    fn kind(&self) -> StoreKind {
        StoreKind::Firefox
    }

    async fn get_tree(&self) -> Result<BookmarkNode> {
        read_firefox_tree(&self.connect()?)
    }

    async fn search_by_title(&self, title: &str) -> Result<Vec<BookmarkNode>> {
        let conn = self.connect()?;
        let mut stmt = conn.prepare(
            "SELECT b.id, b.guid, b.type, b.title, p.url, b.dateAdded
             FROM moz_bookmarks b
             LEFT JOIN moz_places p ON b.fk = p.id
             WHERE b.title = ?1 AND b.type IN (1, 2)
               AND b.guid != ?2
               AND b.parent NOT IN (SELECT id FROM moz_bookmarks WHERE guid = ?2)
             ORDER BY b.parent, b.position",
        )?;
        let rows = stmt
            .query_map(params![title, TAGS_GUID], places_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(rows
            .into_iter()
            .filter_map(|row| to_node(row, Vec::new()))
            .collect())
    }

    async fn create_folder(&self, parent_id: &str, title: &str, index: usize) -> Result<BookmarkNode> {
        let mut conn = self.connect_for_write()?;
        let tx = conn.transaction()?;

        let parent = folder_row_id(&tx, parent_id)?;
        let count = child_count(&tx, parent)?;
        let position = (index as i64).min(count);
        let now = now_micros();
        let guid = new_guid();

        tx.execute(
            "UPDATE moz_bookmarks SET position = position + 1 WHERE parent = ?1 AND position >= ?2",
            params![parent, position],
        )?;
        tx.execute(
            "INSERT INTO moz_bookmarks (type, parent, position, title, dateAdded, lastModified, guid)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6)",
            params![TYPE_FOLDER, parent, position, title, now, guid],
        )?;
        tx.commit()?;

        debug!("Created folder '{}' ({}) under {}", title, guid, parent_id);
        Ok(BookmarkNode::Folder {
            id: guid,
            title: title.to_string(),
            date_added: Some(now / 1000),
            children: Vec::new(),
        })
    }

    async fn move_node(&self, id: &str, parent_id: &str) -> Result<()> {
        let mut conn = self.connect_for_write()?;
        let tx = conn.transaction()?;

        let (row_id, old_parent, old_position) = locate(&tx, id)?;
        if old_parent == 0 {
            bail!("Cannot move the root folder");
        }
        let new_parent = folder_row_id(&tx, parent_id)?;
        if is_ancestor_or_self(&tx, row_id, new_parent)? {
            bail!("Cannot move {} into its own subtree", id);
        }

        tx.execute(
            "UPDATE moz_bookmarks SET position = position - 1 WHERE parent = ?1 AND position > ?2",
            params![old_parent, old_position],
        )?;
        let position: i64 = tx.query_row(
            "SELECT COUNT(*) FROM moz_bookmarks WHERE parent = ?1 AND id != ?2",
            params![new_parent, row_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "UPDATE moz_bookmarks SET parent = ?1, position = ?2, lastModified = ?3 WHERE id = ?4",
            params![new_parent, position, now_micros(), row_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    async fn remove_node(&self, id: &str) -> Result<()> {
        let mut conn = self.connect_for_write()?;
        let tx = conn.transaction()?;

        let (row_id, parent, position) = locate(&tx, id)?;
        if parent == 0 || parent_is_root(&tx, parent)? {
            bail!("Cannot remove permanent folder {}", id);
        }
        if child_count(&tx, row_id)? > 0 {
            bail!("Folder {} is not empty", id);
        }

        tx.execute("DELETE FROM moz_bookmarks WHERE id = ?1", [row_id])?;
        tx.execute(
            "UPDATE moz_bookmarks SET position = position - 1 WHERE parent = ?1 AND position > ?2",
            params![parent, position],
        )?;
        if table_exists(&tx, "moz_bookmarks_deleted")? {
            // Tombstone so Firefox Sync does not bring the bookmark back.
            tx.execute(
                "INSERT OR REPLACE INTO moz_bookmarks_deleted (guid, dateRemoved) VALUES (?1, ?2)",
                params![id, now_micros()],
            )?;
        }
        tx.commit()?;
        Ok(())
    }
}

fn read_firefox_tree(conn: &Connection) -> Result<BookmarkNode> {
    let mut stmt = conn.prepare(
        "SELECT b.id, b.guid, b.type, b.title, p.url, b.dateAdded, b.parent
         FROM moz_bookmarks b
         LEFT JOIN moz_places p ON b.fk = p.id
         ORDER BY b.parent, b.position",
    )?;

    let mut by_parent: HashMap<i64, Vec<PlacesRow>> = HashMap::new();
    let mut root = None;
    let rows = stmt.query_map([], |row| Ok((places_row(row)?, row.get::<_, i64>(6)?)))?;
    for row in rows {
        let (row, parent) = row?;
        if row.guid == ROOT_GUID || (parent == 0 && root.is_none()) {
            root = Some(row);
        } else {
            by_parent.entry(parent).or_default().push(row);
        }
    }

    let root = root.ok_or_else(|| anyhow!("places database has no root folder"))?;
    debug!("Read {} folders with children from Firefox database", by_parent.len());
    build_subtree(root, &mut by_parent).ok_or_else(|| anyhow!("places root is not a folder"))
}

fn build_subtree(row: PlacesRow, by_parent: &mut HashMap<i64, Vec<PlacesRow>>) -> Option<BookmarkNode> {
    if row.guid == TAGS_GUID {
        return None;
    }
    let children = if row.kind == TYPE_FOLDER {
        by_parent
            .remove(&row.id)
            .unwrap_or_default()
            .into_iter()
            .filter_map(|child| build_subtree(child, by_parent))
            .collect()
    } else {
        Vec::new()
    };
    to_node(row, children)
}

fn to_node(row: PlacesRow, children: Vec<BookmarkNode>) -> Option<BookmarkNode> {
    // PRTime is microseconds since the epoch.
    let date_added = row.date_added.map(|micros| micros / 1000);
    match (row.kind, row.url) {
        (TYPE_FOLDER, _) => Some(BookmarkNode::Folder {
            id: row.guid,
            title: row.title,
            date_added,
            children,
        }),
        (TYPE_BOOKMARK, Some(url)) => Some(BookmarkNode::Bookmark {
            id: row.guid,
            title: row.title,
            url,
            date_added,
        }),
        _ => None,
    }
}

fn places_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PlacesRow> {
    Ok(PlacesRow {
        id: row.get(0)?,
        guid: row.get(1)?,
        kind: row.get(2)?,
        title: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
        url: row.get(4)?,
        date_added: row.get(5)?,
    })
}

/// `(row id, parent row id, position)` of the node with `guid`.
fn locate(tx: &Transaction<'_>, guid: &str) -> Result<(i64, i64, i64)> {
    tx.query_row(
        "SELECT id, parent, position FROM moz_bookmarks WHERE guid = ?1",
        [guid],
        |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
    )
    .optional()?
    .ok_or_else(|| anyhow!("Bookmark not found: {}", guid))
}

/// Row id of a bookmark folder. The tags root and tag folders do not count.
fn folder_row_id(tx: &Transaction<'_>, guid: &str) -> Result<i64> {
    tx.query_row(
        "SELECT id FROM moz_bookmarks
         WHERE guid = ?1 AND type = ?2 AND guid != ?3
           AND parent NOT IN (SELECT id FROM moz_bookmarks WHERE guid = ?3)",
        params![guid, TYPE_FOLDER, TAGS_GUID],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| anyhow!("Folder not found: {}", guid))
}

fn child_count(tx: &Transaction<'_>, parent: i64) -> Result<i64> {
    Ok(tx.query_row(
        "SELECT COUNT(*) FROM moz_bookmarks WHERE parent = ?1",
        [parent],
        |row| row.get(0),
    )?)
}

fn parent_is_root(tx: &Transaction<'_>, parent: i64) -> Result<bool> {
    let grandparent: Option<i64> = tx
        .query_row("SELECT parent FROM moz_bookmarks WHERE id = ?1", [parent], |row| row.get(0))
        .optional()?;
    Ok(grandparent == Some(0))
}

/// Whether `ancestor` is `node` itself or one of its parents.
fn is_ancestor_or_self(tx: &Transaction<'_>, ancestor: i64, node: i64) -> Result<bool> {
    let mut current = node;
    while current != 0 {
        if current == ancestor {
            return Ok(true);
        }
        current = tx
            .query_row("SELECT parent FROM moz_bookmarks WHERE id = ?1", [current], |row| row.get(0))
            .optional()?
            .unwrap_or(0);
    }
    Ok(false)
}

fn table_exists(tx: &Transaction<'_>, name: &str) -> Result<bool> {
    let count: i64 = tx.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Places guids are 12 characters from the base64url alphabet.
fn new_guid() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..12].to_string()
}
