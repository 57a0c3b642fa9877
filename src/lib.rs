//! Group browser bookmarks by domain, query domains by bookmark count, and
//! bulk move or delete bookmarks by domain pattern.

pub mod bookmarks;
pub mod clipboard;
pub mod config;
pub mod db_safety;
pub mod engine;
pub mod error;
pub mod indexer;
pub mod mutator;
pub mod progress;
pub mod query;
pub mod report;
pub mod stores;

pub use bookmarks::{BookmarkNode, BookmarkRecord, BookmarkStore, StoreKind};
pub use engine::DomainEngine;
pub use error::DomainError;
