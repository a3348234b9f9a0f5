//! Versioned tree store.
//!
//! The configuration service persists everything as nodes in a hierarchical
//! store where each node holds an opaque payload and a version counter. Writes
//! may carry an expected version and fail atomically when the node has moved on
//! (optimistic concurrency). This module defines that capability surface as the
//! [`TreeStore`] trait and provides two implementations.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::{JonesError, Result};
use serde::{Deserialize, Serialize};

/// Per-node version token. New nodes start at 0 and every write adds one.
pub type Version = i64;

/// Metadata returned alongside node payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeStat {
    pub version: Version,
    /// Creation time in milliseconds since the epoch.
    pub created_at: i64,
    /// Last write time in milliseconds since the epoch.
    pub modified_at: i64,
}

/// Hierarchical store with per-node compare-and-set.
///
/// All calls are blocking round trips. Paths are absolute and `/`-separated;
/// `/` always exists.
pub trait TreeStore: Send + Sync {
    /// Create `path` and any missing ancestors with empty payloads.
    fn ensure_path(&self, path: &str) -> Result<()>;

    /// Read a node. Fails `NotFound` if absent.
    fn get(&self, path: &str) -> Result<(Vec<u8>, NodeStat)>;

    /// Overwrite a node's payload.
    ///
    /// With `Some(version)` the write only succeeds if the stored version still
    /// matches, otherwise `VersionConflict`. Fails `NotFound` if absent.
    fn set(&self, path: &str, data: &[u8], expected: Option<Version>) -> Result<NodeStat>;

    /// Create a node. Fails `AlreadyExists` if present and `NotFound` if its
    /// parent is missing.
    fn create(&self, path: &str, data: &[u8]) -> Result<NodeStat>;

    /// Delete a node, or the whole subtree when `recursive` is set.
    ///
    /// A non-recursive delete of a node with children fails `NotEmpty`.
    fn delete(&self, path: &str, expected: Option<Version>, recursive: bool) -> Result<()>;

    fn exists(&self, path: &str) -> Result<bool>;

    /// Names (not full paths) of the immediate children, sorted.
    fn children(&self, path: &str) -> Result<Vec<String>>;

    /// `path` followed by every descendant, pre-order.
    fn walk(&self, path: &str) -> Result<Vec<String>> {
        let mut out = Vec::new();
        let mut stack = vec![path.to_string()];
        while let Some(current) = stack.pop() {
            let children = self.children(&current)?;
            // Reverse so the lexically first child is visited next
            for child in children.iter().rev() {
                stack.push(join(&current, child));
            }
            out.push(current);
        }
        Ok(out)
    }
}

/// Check that `path` is absolute with no empty segments or trailing slash.
pub fn validate_path(path: &str) -> Result<()> {
    if path == "/" {
        return Ok(());
    }
    if !path.starts_with('/') {
        return Err(JonesError::invalid_path(path, "must be absolute"));
    }
    if path.ends_with('/') {
        return Err(JonesError::invalid_path(path, "trailing slash"));
    }
    if path[1..].split('/').any(str::is_empty) {
        return Err(JonesError::invalid_path(path, "empty segment"));
    }
    Ok(())
}

/// Join a child name (or relative path) onto a store path.
pub fn join(parent: &str, child: &str) -> String {
    if child.is_empty() {
        parent.to_string()
    } else if parent == "/" {
        format!("/{}", child)
    } else {
        format!("{}/{}", parent, child)
    }
}

/// Parent of a store path; `None` for `/`.
pub fn parent(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Final segment of a store path; empty for `/`.
pub fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or_default()
}

/// Every ancestor of `path` from the top down, excluding `/` and `path` itself.
pub fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = parent(path);
    while let Some(p) = current {
        if p == "/" {
            break;
        }
        out.push(p);
        current = parent(p);
    }
    out.reverse();
    out
}

/// Get the current timestamp in milliseconds.
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
