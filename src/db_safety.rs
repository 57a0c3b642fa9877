//! Safety checks before touching a browser's places database.
//!
//! A running browser keeps its database locked; writing behind its back
//! either fails or gets overwritten on the next browser sync. These checks
//! refuse early instead.

use anyhow::{anyhow, Context, Result};
use rusqlite::{Connection, OpenFlags};
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Verify the database opens read-only and passes a quick integrity check.
pub fn check_compatibility(db_path: &Path) -> Result<()> {
    if !db_path.exists() {
        return Err(anyhow!("Database file does not exist: {:?}", db_path));
    }

    let conn = Connection::open_with_flags(
        db_path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_URI,
    )
    .context("Failed to open database for compatibility check")?;

    let version: String = conn
        .query_row("SELECT sqlite_version()", [], |row| row.get(0))
        .context("Failed to query SQLite version")?;
    debug!("Database SQLite version: {}", version);

    let integrity: String = conn
        .query_row("PRAGMA quick_check", [], |row| row.get(0))
        .context("Failed to run integrity check")?;
    if integrity != "ok" {
        return Err(anyhow!("Database integrity check failed: {}", integrity));
    }

    let has_bookmarks: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = 'moz_bookmarks'",
            [],
            |row| row.get(0),
        )
        .context("Failed to inspect database schema")?;
    if has_bookmarks == 0 {
        return Err(anyhow!("{:?} is not a places database (no moz_bookmarks table)", db_path));
    }

    Ok(())
}

/// Whether a browser currently holds the database.
///
/// Looks for the profile lock file first, then tries to take a write lock.
pub fn is_database_locked(db_path: &Path) -> bool {
    let file_name = db_path.file_name().and_then(|n| n.to_str()).unwrap_or("");
    if !file_name.is_empty() {
        let parent = db_path.parent().unwrap_or_else(|| Path::new("."));
        // `lock` only exists while Firefox runs; `.parentlock` outlives it.
        for lock_file in [format!("{}.lock", file_name), "lock".to_string()] {
            let lock_path = parent.join(lock_file);
            if lock_path.symlink_metadata().is_ok() {
                debug!("Found lock file: {:?}", lock_path);
                return true;
            }
        }
    }

    match Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_WRITE) {
        Ok(conn) => {
            let _ = conn.busy_timeout(Duration::ZERO);
            if let Err(e) = conn.execute_batch("BEGIN IMMEDIATE") {
                debug!("Failed to begin immediate transaction (db likely locked): {}", e);
                return true;
            }
            let _ = conn.execute_batch("ROLLBACK");
            false
        }
        Err(e) => {
            debug!("Failed to open database for locking check: {}", e);
            true
        }
    }
}

/// Fail unless the database can be written right now.
pub fn ensure_writable(db_path: &Path) -> Result<()> {
    if is_database_locked(db_path) {
        return Err(anyhow!(
            "Database is locked by running browser. Please close the browser and try again."
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn places_db(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("places.sqlite");
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch("CREATE TABLE moz_bookmarks (id INTEGER PRIMARY KEY, title TEXT);")
            .unwrap();
        path
    }

    #[test]
    fn test_compatibility_requires_places_schema() {
        let dir = TempDir::new().unwrap();
        let path = places_db(&dir);
        assert!(check_compatibility(&path).is_ok());

        let other = dir.path().join("other.sqlite");
        Connection::open(&other)
            .unwrap()
            .execute_batch("CREATE TABLE t (id INTEGER);")
            .unwrap();
        assert!(check_compatibility(&other).is_err());
        assert!(check_compatibility(&dir.path().join("missing.sqlite")).is_err());
    }

    #[test]
    fn test_lock_file_marks_database_locked() {
        let dir = TempDir::new().unwrap();
        let path = places_db(&dir);
        assert!(!is_database_locked(&path));
        assert!(ensure_writable(&path).is_ok());

        std::fs::write(dir.path().join("lock"), b"").unwrap();
        assert!(is_database_locked(&path));
        assert!(ensure_writable(&path).is_err());
    }

    #[test]
    fn test_open_write_transaction_marks_database_locked() {
        let dir = TempDir::new().unwrap();
        let path = places_db(&dir);

        let holder = Connection::open(&path).unwrap();
        holder.execute_batch("BEGIN IMMEDIATE").unwrap();
        assert!(is_database_locked(&path));
        holder.execute_batch("ROLLBACK").unwrap();
        assert!(!is_database_locked(&path));
    }
}
