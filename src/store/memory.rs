//! In-process tree store.

use super::{NodeStat, TreeStore, Version, basename, now_ms, parent, validate_path};
use crate::error::{JonesError, Result};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone)]
struct Node {
    data: Vec<u8>,
    stat: NodeStat,
}

impl Node {
    fn new(data: &[u8]) -> Self {
        let now = now_ms();
        Self {
            data: data.to_vec(),
            stat: NodeStat {
                version: 0,
                created_at: now,
                modified_at: now,
            },
        }
    }
}

/// Tree store held entirely in memory, keyed by absolute path.
#[derive(Debug)]
pub struct MemoryStore {
    nodes: Mutex<BTreeMap<String, Node>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::new(&[]));
        Self {
            nodes: Mutex::new(nodes),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, BTreeMap<String, Node>>> {
        self.nodes
            .lock()
            .map_err(|_| JonesError::internal("memory store lock poisoned"))
    }

    /// Paths strictly below `path`, in key order.
    fn descendants(nodes: &BTreeMap<String, Node>, path: &str) -> Vec<String> {
        let prefix = if path == "/" {
            "/".to_string()
        } else {
            format!("{}/", path)
        };
        nodes
            .range(prefix.clone()..)
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(k, _)| k.as_str() != "/")
            .map(|(k, _)| k.clone())
            .collect()
    }

    fn check_version(path: &str, node: &Node, expected: Option<Version>) -> Result<()> {
        match expected {
            Some(v) if v != node.stat.version => {
                Err(JonesError::version_conflict(path, v, node.stat.version))
            }
            _ => Ok(()),
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TreeStore for MemoryStore {
    fn ensure_path(&self, path: &str) -> Result<()> {
        validate_path(path)?;
        let mut nodes = self.lock()?;
        let mut current = String::new();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current.push('/');
            current.push_str(segment);
            nodes
                .entry(current.clone())
                .or_insert_with(|| Node::new(&[]));
        }
        Ok(())
    }

    fn get(&self, path: &str) -> Result<(Vec<u8>, NodeStat)> {
        validate_path(path)?;
        let nodes = self.lock()?;
        let node = nodes.get(path).ok_or_else(|| JonesError::not_found(path))?;
        Ok((node.data.clone(), node.stat))
    }

    fn set(&self, path: &str, data: &[u8], expected: Option<Version>) -> Result<NodeStat> {
        validate_path(path)?;
        let mut nodes = self.lock()?;
        let node = nodes
            .get_mut(path)
            .ok_or_else(|| JonesError::not_found(path))?;
        Self::check_version(path, node, expected)?;
        node.data = data.to_vec();
        node.stat.version += 1;
        node.stat.modified_at = now_ms();
        Ok(node.stat)
    }

    fn create(&self, path: &str, data: &[u8]) -> Result<NodeStat> {
        validate_path(path)?;
        let mut nodes = self.lock()?;
        if nodes.contains_key(path) {
            return Err(JonesError::already_exists(path));
        }
        if let Some(p) = parent(path) {
            if !nodes.contains_key(p) {
                return Err(JonesError::not_found(p));
            }
        }
        let node = Node::new(data);
        let stat = node.stat;
        nodes.insert(path.to_string(), node);
        Ok(stat)
    }

    fn delete(&self, path: &str, expected: Option<Version>, recursive: bool) -> Result<()> {
        validate_path(path)?;
        let mut nodes = self.lock()?;
        let node = nodes.get(path).ok_or_else(|| JonesError::not_found(path))?;
        Self::check_version(path, node, expected)?;

        let below = Self::descendants(&nodes, path);
        if !below.is_empty() && !recursive {
            return Err(JonesError::not_empty(path));
        }
        for p in below {
            nodes.remove(&p);
        }
        if path != "/" {
            nodes.remove(path);
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        validate_path(path)?;
        Ok(self.lock()?.contains_key(path))
    }

    fn children(&self, path: &str) -> Result<Vec<String>> {
        validate_path(path)?;
        let nodes = self.lock()?;
        if !nodes.contains_key(path) {
            return Err(JonesError::not_found(path));
        }
        Ok(Self::descendants(&nodes, path)
            .into_iter()
            .filter(|p| parent(p) == Some(path))
            .map(|p| basename(&p).to_string())
            .collect())
    }
}
