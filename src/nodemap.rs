//! Name to destination associations stored in a single node.
//!
//! The whole map lives in one store node and is rewritten on every change, so
//! all edits share one version: concurrent `set`/`delete` calls race and the
//! loser gets `VersionConflict`.
//!
//! Two payload encodings are understood:
//! - JSON object of strings (current, always written)
//! - newline-separated `name -> destination` lines (legacy, read only)
//!
//! A legacy node is rewritten as JSON the first time it is modified.

use crate::error::{ErrorCode, JonesError, Result};
use crate::store::{TreeStore, Version};
use regex_lite::Regex;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};
use tracing::debug;

/// Separator used by the legacy line format.
pub const LEGACY_SEPARATOR: &str = " -> ";

/// One `name -> destination` pair per line, optional trailing newline.
static LEGACY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\n]+ -> [^\n]*(\n[^\n]+ -> [^\n]*)*\n?$").expect("legacy pattern is valid")
});

/// Snapshot of an association map.
pub type Associations = BTreeMap<String, String>;

/// Which encoding a payload was decoded from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Empty,
    Json,
    Legacy,
}

/// Decode a raw node payload.
pub fn decode(path: &str, raw: &[u8]) -> Result<(Associations, Encoding)> {
    if raw.is_empty() {
        return Ok((Associations::new(), Encoding::Empty));
    }

    let text =
        std::str::from_utf8(raw).map_err(|e| JonesError::malformed(path, e))?;

    match serde_json::from_str::<Associations>(text) {
        Ok(map) => Ok((map, Encoding::Json)),
        Err(json_err) => {
            if LEGACY_PATTERN.is_match(text) {
                Ok((decode_legacy(path, text)?, Encoding::Legacy))
            } else {
                Err(JonesError::malformed(path, json_err))
            }
        }
    }
}

fn decode_legacy(path: &str, text: &str) -> Result<Associations> {
    let mut map = Associations::new();
    for line in text.lines().filter(|l| !l.is_empty()) {
        let (name, dest) = line
            .split_once(LEGACY_SEPARATOR)
            .ok_or_else(|| JonesError::malformed(path, format!("bad legacy line: {}", line)))?;
        if dest.contains(LEGACY_SEPARATOR) {
            return Err(JonesError::malformed(
                path,
                format!("separator repeated in legacy line: {}", line),
            ));
        }
        map.insert(name.to_string(), dest.to_string());
    }
    Ok(map)
}

/// Encode for storage. Always JSON.
pub fn encode(map: &Associations) -> Result<Vec<u8>> {
    serde_json::to_vec(map).map_err(JonesError::internal)
}

/// Association map persisted at one store node.
#[derive(Clone)]
pub struct NodeMap {
    store: Arc<dyn TreeStore>,
    path: String,
}

impl NodeMap {
    /// Bind to `path`, creating the node if it does not exist yet.
    pub fn new(store: Arc<dyn TreeStore>, path: impl Into<String>) -> Result<Self> {
        let path = path.into();
        store.ensure_path(&path)?;
        Ok(Self { store, path })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Associate `name` with `dest`, replacing any previous destination.
    pub fn set(&self, name: &str, dest: &str) -> Result<()> {
        let (mut map, version) = self.read()?;
        map.insert(name.to_string(), dest.to_string());
        self.write(&map, version)?;
        debug!(map = %self.path, name = %name, dest = %dest, "association set");
        Ok(())
    }

    /// Destination for `name`.
    pub fn get(&self, name: &str) -> Result<String> {
        let (map, _) = self.read()?;
        map.get(name).cloned().ok_or_else(|| {
            JonesError::new(ErrorCode::NotFound, format!("No entry for {}", name))
                .with_path(&self.path)
        })
    }

    /// Snapshot of every association.
    pub fn get_all(&self) -> Result<Associations> {
        Ok(self.read()?.0)
    }

    /// Remove `name`. Fails `NotFound` if it has no entry.
    pub fn delete(&self, name: &str) -> Result<()> {
        let (mut map, version) = self.read()?;
        if map.remove(name).is_none() {
            return Err(
                JonesError::new(ErrorCode::NotFound, format!("No entry for {}", name))
                    .with_path(&self.path),
            );
        }
        self.write(&map, version)?;
        debug!(map = %self.path, name = %name, "association deleted");
        Ok(())
    }

    /// Encoding currently stored at the node.
    pub fn encoding(&self) -> Result<Encoding> {
        let (raw, _) = self.store.get(&self.path)?;
        Ok(decode(&self.path, &raw)?.1)
    }

    fn read(&self) -> Result<(Associations, Version)> {
        let (raw, stat) = self.store.get(&self.path)?;
        let (map, _) = decode(&self.path, &raw)?;
        Ok((map, stat.version))
    }

    fn write(&self, map: &Associations, version: Version) -> Result<()> {
        self.store.set(&self.path, &encode(map)?, Some(version))?;
        Ok(())
    }
}
