//! Document-store boundary. The real driver is an external collaborator
//! (out of scope); this trait captures exactly the operations the two board
//! flavors issue against it, modeled on the `DbAgent` calls in `rk/rank.go`
//! and `rk_instant/rank_save.go` (`FindAll`, `FindSortAll`, `Insert`,
//! `UpdateId`, `UpsertId`, `RemoveId`, `RemoveAll`).

use std::collections::HashMap;
use std::fmt;

use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum StoreError {
    Unavailable(String),
    NotFound(String),
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Unavailable(msg) => write!(f, "document store unavailable: {msg}"),
            StoreError::NotFound(key) => write!(f, "document not found: {key}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// A document-store collection scoped to one leaderboard's backing table.
pub trait DocumentStore<T>: Send + Sync {
    fn find_all(&self) -> Result<Vec<T>, StoreError>;

    /// Sorted by (value desc, update_time asc), the load order the instant
    /// board depends on to rebuild `sorted` without re-sorting.
    fn find_sorted_all(&self) -> Result<Vec<T>, StoreError>;

    fn insert(&self, item: &T) -> Result<(), StoreError>;

    fn update_fields(&self, key: &str, fields: &HashMap<String, Value>) -> Result<(), StoreError>;

    fn upsert(&self, item: &T) -> Result<(), StoreError>;

    fn remove_id(&self, key: &str) -> Result<(), StoreError>;

    fn remove_all(&self) -> Result<(), StoreError>;
}
