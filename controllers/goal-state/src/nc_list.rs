//! Set of network container IDs associated with one orchestrator context

use serde::{Deserialize, Serialize};

/// Insertion-ordered set of NC IDs. Persisted as a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NcList(Vec<String>);

impl NcList {
    /// Empty list
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `nc_id` unless it is already present.
    pub fn add(&mut self, nc_id: &str) {
        if !self.contains(nc_id) {
            self.0.push(nc_id.to_string());
        }
    }

    /// Remove `nc_id`; returns whether it was present.
    pub fn delete(&mut self, nc_id: &str) -> bool {
        let before = self.0.len();
        self.0.retain(|id| id != nc_id);
        self.0.len() != before
    }

    /// Whether `nc_id` is in the list
    pub fn contains(&self, nc_id: &str) -> bool {
        self.0.iter().any(|id| id == nc_id)
    }

    /// NC IDs in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    /// Number of NCs
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list holds no NC
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<'a> FromIterator<&'a str> for NcList {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut list = NcList::new();
        for id in iter {
            list.add(id);
        }
        list
    }
}
