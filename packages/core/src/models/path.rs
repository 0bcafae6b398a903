//! Materialized Path Codec
//!
//! Converts between the stored path string and the ordered list of ancestor
//! identifiers it encodes.
//!
//! # Encoding
//!
//! A path lists the ancestors of a node from the root down to (but not
//! including) the node itself. Every component is delimited by the separator
//! on BOTH sides:
//!
//! - Root node: no path (`None`)
//! - Child of 3: `.3.`
//! - Child of 17 which is a child of 3: `.3.17.`
//!
//! Delimiting both sides means a prefix test can never confuse id `12` with
//! id `123`: the subtree prefix of node 12 is `.12.`, which `.123.` does not
//! start with.
//!
//! # Examples
//!
//! ```rust
//! use barshelf_core::models::{path, IngredientId};
//!
//! let encoded = path::encode(&[IngredientId(3), IngredientId(17)]).unwrap();
//! assert_eq!(encoded.as_str(), ".3.17.");
//! assert_eq!(
//!     path::decode(&encoded).unwrap(),
//!     vec![IngredientId(3), IngredientId(17)]
//! );
//! assert_eq!(path::append(Some(&encoded), IngredientId(4)).as_str(), ".3.17.4.");
//! ```

use crate::models::IngredientId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Component separator used on both sides of every id
pub const PATH_SEPARATOR: char = '.';

// One or more positive integers, each followed by a separator, after a leading separator
const PATH_PATTERN: &str = r"^\.(?:[1-9][0-9]*\.)+$";

/// Path parsing errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Malformed materialized path '{path}': {reason}")]
    Malformed { path: String, reason: String },
}

impl PathError {
    pub fn malformed(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// A validated, non-empty materialized path such as `.3.17.`
///
/// Construct through [`MaterializedPath::parse`], [`encode`] or [`append`];
/// the inner string always matches the delimited-integer grammar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MaterializedPath(String);

impl MaterializedPath {
    /// Parse and validate a stored path string
    ///
    /// An empty string is rejected: roots are represented by `None`, never by
    /// an empty or separator-only path.
    pub fn parse(raw: &str) -> Result<Self, PathError> {
        static PATH_REGEX: OnceLock<Regex> = OnceLock::new();
        let path_regex = PATH_REGEX.get_or_init(|| Regex::new(PATH_PATTERN).unwrap());

        if raw.is_empty() {
            return Err(PathError::malformed(raw, "empty path (roots have no path)"));
        }
        if !path_regex.is_match(raw) {
            return Err(PathError::malformed(
                raw,
                "expected separator-delimited positive integers, e.g. '.3.17.'",
            ));
        }

        // Grammar is fine; make sure every component fits in an id
        for component in components(raw) {
            component
                .parse::<i64>()
                .map_err(|e| PathError::malformed(raw, format!("component '{}': {}", component, e)))?;
        }

        Ok(Self(raw.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Number of ancestors encoded in this path
    pub fn depth(&self) -> usize {
        components(&self.0).count()
    }

    /// Whether `id` is one of the encoded ancestors
    pub fn contains(&self, id: IngredientId) -> bool {
        self.0.contains(&delimited(id))
    }

    /// Component-wise prefix test
    ///
    /// Because both strings start and end with the separator, a plain string
    /// prefix test is already component-aligned.
    pub fn starts_with(&self, prefix: &MaterializedPath) -> bool {
        self.0.starts_with(&prefix.0)
    }

    /// Replace the leading `old_prefix` components with `new_prefix`
    ///
    /// Returns `None` when `self` does not start with `old_prefix`.
    ///
    /// ```rust
    /// # use barshelf_core::models::MaterializedPath;
    /// let path = MaterializedPath::parse(".1.2.3.").unwrap();
    /// let old = MaterializedPath::parse(".1.2.").unwrap();
    /// let new = MaterializedPath::parse(".2.").unwrap();
    /// assert_eq!(path.rebase(&old, &new).unwrap().as_str(), ".2.3.");
    /// ```
    pub fn rebase(
        &self,
        old_prefix: &MaterializedPath,
        new_prefix: &MaterializedPath,
    ) -> Option<MaterializedPath> {
        let remainder = self.0.strip_prefix(&old_prefix.0)?;
        // remainder is either empty or "a.b." (components without the leading separator)
        let mut rebased = String::with_capacity(new_prefix.0.len() + remainder.len());
        rebased.push_str(&new_prefix.0);
        rebased.push_str(remainder);
        Some(Self(rebased))
    }

    /// Decode into ancestor ids, root-first
    pub fn ids(&self) -> Vec<IngredientId> {
        // Validated on construction, so every component parses
        components(&self.0)
            .filter_map(|c| c.parse::<i64>().ok())
            .map(IngredientId)
            .collect()
    }
}

impl fmt::Display for MaterializedPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for MaterializedPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for MaterializedPath {
    type Error = PathError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MaterializedPath> for String {
    fn from(path: MaterializedPath) -> Self {
        path.0
    }
}

fn components(raw: &str) -> impl Iterator<Item = &str> {
    raw.split(PATH_SEPARATOR).filter(|c| !c.is_empty())
}

fn delimited(id: IngredientId) -> String {
    format!("{sep}{id}{sep}", sep = PATH_SEPARATOR, id = id.0)
}

/// Encode ancestor ids (root-first) into a path
///
/// An empty slice encodes to `None`, the root representation.
pub fn encode(ids: &[IngredientId]) -> Option<MaterializedPath> {
    if ids.is_empty() {
        return None;
    }

    let mut encoded = String::from(PATH_SEPARATOR);
    for id in ids {
        encoded.push_str(&id.0.to_string());
        encoded.push(PATH_SEPARATOR);
    }
    Some(MaterializedPath(encoded))
}

/// Decode a path into ancestor ids, root-first
///
/// Accepts a raw string so corrupted stored values surface as
/// [`PathError::Malformed`] instead of being coerced to root.
pub fn decode(path: impl AsRef<str>) -> Result<Vec<IngredientId>, PathError> {
    MaterializedPath::parse(path.as_ref()).map(|p| p.ids())
}

/// Path one level deeper: `encode(decode(path) ++ [id])`
///
/// Plain concatenation, O(len(path)). `None` is the root path, so
/// `append(None, 7)` is `.7.`.
pub fn append(path: Option<&MaterializedPath>, id: IngredientId) -> MaterializedPath {
    let id_str = id.0.to_string();
    let mut appended = match path {
        Some(p) => {
            let mut s = String::with_capacity(p.0.len() + id_str.len() + 1);
            s.push_str(&p.0);
            s
        }
        None => String::from(PATH_SEPARATOR),
    };
    appended.push_str(&id_str);
    appended.push(PATH_SEPARATOR);
    MaterializedPath(appended)
}
