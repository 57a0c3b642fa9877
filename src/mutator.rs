//! Bulk move/delete of indexed bookmarks against the store.
//!
//! Host calls are issued one at a time, domain by domain in the order given,
//! then record by record in index order. A failing call stops the batch;
//! whatever was already moved or deleted stays that way.

use std::str::FromStr;
use tracing::{debug, info};

use crate::bookmarks::BookmarkStore;
use crate::error::DomainError;
use crate::indexer::DomainIndex;
use crate::progress;

/// How `delete` matches its input against domain keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// The domain itself.
    Exact,
    /// The domain and its subdomains.
    Tree,
    /// Any domain containing the input.
    Loose,
}

impl DeleteMode {
    pub fn matches(&self, domain: &str, input: &str) -> bool {
        match self {
            DeleteMode::Exact => domain == input,
            DeleteMode::Tree => {
                domain == input
                    || domain
                        .strip_suffix(input)
                        .is_some_and(|prefix| prefix.ends_with('.'))
            }
            DeleteMode::Loose => domain.contains(input),
        }
    }
}

impl FromStr for DeleteMode {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(DeleteMode::Exact),
            "tree" => Ok(DeleteMode::Tree),
            "loose" => Ok(DeleteMode::Loose),
            other => Err(DomainError::InvalidMode(other.to_string())),
        }
    }
}

/// Domains in `index` that `mode` selects for `input`, in key order.
pub fn resolve_delete_targets(index: &DomainIndex, input: &str, mode: DeleteMode) -> Vec<String> {
    if input.is_empty() {
        return Vec::new();
    }
    index
        .iter()
        .filter(|(domain, _)| mode.matches(domain, input))
        .map(|(domain, _)| domain.to_string())
        .collect()
}

/// Destination folder for a move.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Destination {
    Existing(String),
    /// Only returned for dry runs: the folder would have to be created.
    Missing,
    Created(String),
}

/// First folder titled exactly `folder_name`, or a new one at position 0
/// under `default_parent_id`.
pub async fn resolve_destination(
    store: &dyn BookmarkStore,
    folder_name: &str,
    default_parent_id: &str,
    dry_run: bool,
) -> Result<Destination, DomainError> {
    let found = store
        .search_by_title(folder_name)
        .await
        .map_err(|e| DomainError::host_call(format!("search for folder '{}'", folder_name), e))?;

    if let Some(folder) = found
        .iter()
        .find(|node| node.is_folder() && node.title() == folder_name)
    {
        debug!("Using existing folder '{}' ({})", folder_name, folder.id());
        return Ok(Destination::Existing(folder.id().to_string()));
    }

    if dry_run {
        return Ok(Destination::Missing);
    }

    let folder = store
        .create_folder(default_parent_id, folder_name, 0)
        .await
        .map_err(|e| DomainError::host_call(format!("creation of folder '{}'", folder_name), e))?;
    info!("📁 Created folder '{}' ({})", folder_name, folder.id());
    Ok(Destination::Created(folder.id().to_string()))
}

/// Move every indexed bookmark of `domains` into `folder_id`.
///
/// Domains missing from the index are skipped.
pub async fn move_domains(
    store: &dyn BookmarkStore,
    index: &DomainIndex,
    domains: &[String],
    folder_id: &str,
) -> Result<usize, DomainError> {
    let total: usize = domains.iter().map(|d| index.count(d)).sum();
    let pb = progress::batch_bar(total as u64, "Moving");
    let mut moved = 0;

    for domain in domains {
        let Some(records) = index.get(domain) else {
            debug!("Skipping unknown domain: {}", domain);
            continue;
        };
        for record in records {
            if let Err(e) = store.move_node(&record.id, folder_id).await {
                progress::abandon_batch(&pb, "Move", moved);
                return Err(DomainError::host_call(
                    format!("move of bookmark {} ({} already moved)", record.id, moved),
                    e,
                ));
            }
            moved += 1;
            pb.inc(1);
        }
    }

    progress::finish_batch(&pb, "Moved", moved);
    Ok(moved)
}

/// Remove every bookmark of `domains` from the store, dropping each domain
/// from `index` once all of its bookmarks are gone.
pub async fn delete_domains(
    store: &dyn BookmarkStore,
    index: &mut DomainIndex,
    domains: &[String],
) -> Result<usize, DomainError> {
    let total: usize = domains.iter().map(|d| index.count(d)).sum();
    let pb = progress::batch_bar(total as u64, "Deleting");
    let mut deleted = 0;

    for domain in domains {
        let ids: Vec<String> = index
            .get(domain)
            .map(|records| records.iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default();

        for (done, id) in ids.iter().enumerate() {
            if let Err(e) = store.remove_node(id).await {
                if let Some(records) = index.get_mut(domain) {
                    records.drain(..done);
                }
                progress::abandon_batch(&pb, "Delete", deleted);
                return Err(DomainError::host_call(
                    format!("removal of bookmark {} ({} already deleted)", id, deleted),
                    e,
                ));
            }
            deleted += 1;
            pb.inc(1);
        }
        index.remove(domain);
        debug!("Deleted {} bookmarks of {}", ids.len(), domain);
    }

    progress::finish_batch(&pb, "Deleted", deleted);
    Ok(deleted)
}
