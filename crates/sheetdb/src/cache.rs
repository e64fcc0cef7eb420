//! Per-database header cache

use parking_lot::RwLock;
use std::collections::HashMap;

/// Sheet name -> header row
///
/// Saves a round-trip on every insert. Reads always see the live header row
/// and refresh the entry, so a stale cache only lasts until the next read.
#[derive(Debug, Default)]
pub struct HeaderCache {
    entries: RwLock<HashMap<String, Vec<String>>>,
}

impl HeaderCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, sheet: &str) -> Option<Vec<String>> {
        self.entries.read().get(sheet).cloned()
    }

    pub fn insert(&self, sheet: &str, headers: Vec<String>) {
        self.entries.write().insert(sheet.to_string(), headers);
    }

    pub fn invalidate(&self, sheet: &str) {
        self.entries.write().remove(sheet);
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
