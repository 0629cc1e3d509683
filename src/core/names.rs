//! Bidirectional name↔index tables.
//!
//! States, events, and output channels are all integers at runtime; names
//! exist only for construction and for session records. `NameMap` keeps the
//! two directions consistent by construction: indices are assigned in
//! insertion order and never move.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use std::collections::HashMap;

/// Append-only bidirectional mapping between names and dense indices.
///
/// # Example
///
/// ```rust
/// use operant::core::NameMap;
///
/// let mut states = NameMap::new();
/// assert_eq!(states.insert("START"), 0);
/// assert_eq!(states.insert("wait"), 1);
/// assert_eq!(states.index_of("wait"), Some(1));
/// assert_eq!(states.name_of(0), Some("START"));
/// ```
#[derive(Clone, Debug, Default, PartialEq)]
pub struct NameMap {
    names: Vec<String>,
    indices: HashMap<String, usize>,
}

impl NameMap {
    /// Create an empty map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a name, returning its index. Inserting a name that already
    /// exists returns the existing index; indices are permanent.
    pub fn insert(&mut self, name: &str) -> usize {
        if let Some(&index) = self.indices.get(name) {
            return index;
        }
        let index = self.names.len();
        self.names.push(name.to_string());
        self.indices.insert(name.to_string(), index);
        index
    }

    /// Look up the index for a name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.indices.get(name).copied()
    }

    /// Look up the name at an index.
    pub fn name_of(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Whether the map contains a name.
    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.names.len()
    }

    /// Whether the map is empty.
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in index order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &str)> {
        self.names.iter().enumerate().map(|(i, n)| (i, n.as_str()))
    }
}

impl Serialize for NameMap {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.names.len()))?;
        for (index, name) in self.iter() {
            map.serialize_entry(name, &index)?;
        }
        map.end()
    }
}

/// The name tables behind a finalized matrix, in exportable form.
///
/// The binary matrix alone is not human-interpretable; a session record
/// needs these name→index tables next to it. Event indices are signed so
/// the `Forced` pseudo-event can keep its reserved value of -1.
#[derive(Clone, Debug, Serialize)]
pub struct LabelMaps {
    /// Event name → column index, including `Forced` → -1.
    pub events: Vec<(String, i32)>,
    /// Output channel name → channel index.
    pub outputs: Vec<(String, usize)>,
    /// State name → state index.
    pub states: Vec<(String, usize)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_assigns_dense_indices() {
        let mut map = NameMap::new();
        assert_eq!(map.insert("a"), 0);
        assert_eq!(map.insert("b"), 1);
        assert_eq!(map.insert("c"), 2);
        assert_eq!(map.len(), 3);
    }

    #[test]
    fn reinsert_returns_existing_index() {
        let mut map = NameMap::new();
        map.insert("a");
        map.insert("b");
        assert_eq!(map.insert("a"), 0);
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn both_directions_agree() {
        let mut map = NameMap::new();
        for name in ["START", "wait", "reward", "END"] {
            map.insert(name);
        }
        for (index, name) in map.iter() {
            assert_eq!(map.index_of(name), Some(index));
        }
        assert_eq!(map.name_of(map.len()), None);
    }

    #[test]
    fn serializes_as_plain_map() {
        let mut map = NameMap::new();
        map.insert("valve");
        map.insert("led");
        let json = serde_json::to_value(&map).unwrap();
        assert_eq!(json["valve"], 0);
        assert_eq!(json["led"], 1);
    }
}
