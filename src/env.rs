//! Environment paths.
//!
//! An environment is a node in a service's configuration tree, named by a
//! `/`-separated relative path such as `prod` or `prod/us`. The empty name is
//! the root environment.

use crate::error::{JonesError, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

/// Separator between environment components.
pub const SEPARATOR: char = '/';

/// Immutable, normalized environment path.
///
/// Equality, ordering and hashing use the string form only; `components` is
/// derived from it at construction.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EnvPath {
    name: String,
    components: Vec<String>,
}

impl EnvPath {
    /// The root environment.
    pub fn root() -> Self {
        Self::default()
    }

    /// Parse an environment name. The empty string is root.
    pub fn new(name: &str) -> Result<Self> {
        if name.is_empty() {
            return Ok(Self::root());
        }
        if name.starts_with(SEPARATOR) {
            return Err(JonesError::validation(format!(
                "Environment '{}' must not start with '{}'",
                name, SEPARATOR
            ))
            .with_path(name));
        }

        let components: Vec<String> = name.split(SEPARATOR).map(str::to_string).collect();
        if components.iter().any(String::is_empty) {
            return Err(JonesError::validation(format!(
                "Environment '{}' contains an empty component",
                name
            ))
            .with_path(name));
        }

        Ok(Self {
            name: name.to_string(),
            components,
        })
    }

    /// `None` means root, mirroring how callers pass "no environment".
    pub fn from_option(name: Option<&str>) -> Result<Self> {
        Self::new(name.unwrap_or_default())
    }

    pub fn is_root(&self) -> bool {
        self.components.is_empty()
    }

    /// Path components; empty for root.
    pub fn components(&self) -> &[String] {
        &self.components
    }

    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// Number of components below root.
    pub fn depth(&self) -> usize {
        self.components.len()
    }

    /// The prefix chain from root down to and including `self`.
    pub fn ancestors(&self) -> Vec<EnvPath> {
        (0..=self.components.len())
            .map(|n| Self::from_components(&self.components[..n]))
            .collect()
    }

    /// The parent environment, or `None` for root.
    pub fn parent(&self) -> Option<EnvPath> {
        if self.is_root() {
            return None;
        }
        Some(Self::from_components(
            &self.components[..self.components.len() - 1],
        ))
    }

    /// Append a relative environment name below `self`.
    pub fn join(&self, child: &str) -> Result<EnvPath> {
        let child = EnvPath::new(child)?;
        if self.is_root() {
            return Ok(child);
        }
        if child.is_root() {
            return Ok(self.clone());
        }
        Ok(Self::from_components(
            &[self.components.as_slice(), child.components()].concat(),
        ))
    }

    /// True if `self` is `other` or lies below it.
    pub fn starts_with(&self, other: &EnvPath) -> bool {
        self.components.starts_with(&other.components)
    }

    /// The part of `self` below `ancestor`, or `None` if `ancestor` is not a prefix.
    pub fn relative_to(&self, ancestor: &EnvPath) -> Option<EnvPath> {
        if !self.starts_with(ancestor) {
            return None;
        }
        Some(Self::from_components(
            &self.components[ancestor.components.len()..],
        ))
    }

    fn from_components(components: &[String]) -> Self {
        Self {
            name: components.join(&SEPARATOR.to_string()),
            components: components.to_vec(),
        }
    }
}

impl PartialEq for EnvPath {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for EnvPath {}

impl Hash for EnvPath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.name.hash(state);
    }
}

impl PartialOrd for EnvPath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EnvPath {
    fn cmp(&self, other: &Self) -> Ordering {
        self.name.cmp(&other.name)
    }
}

impl fmt::Display for EnvPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_root() {
            write!(f, "(root)")
        } else {
            write!(f, "{}", self.name)
        }
    }
}

impl FromStr for EnvPath {
    type Err = JonesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl TryFrom<String> for EnvPath {
    type Error = JonesError;

    fn try_from(s: String) -> Result<Self> {
        Self::new(&s)
    }
}

impl From<EnvPath> for String {
    fn from(env: EnvPath) -> Self {
        env.name
    }
}
