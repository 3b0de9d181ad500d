//! Host-provided store seams.
//!
//! The core never persists anything itself. Batch syncs write entries into
//! an [`EntryStore`]; cache validators and the pagination watermark live in
//! a small string-keyed [`MetaStore`]. Both are abstract so hosts can back
//! them with whatever they like; the in-memory implementations here serve
//! tests and hosts that do not need durability.

use std::collections::BTreeMap;

/// One stored entry: the normalized data plus an optional pre-rendered
/// HTML projection for consumers that display content directly.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    pub id: String,
    pub data: serde_json::Value,
    pub rendered_html: Option<String>,
}

/// The host's persisted entry store. Used only by batch synchronization;
/// live queries never touch it.
///
/// The batch orchestrator replaces the full contents on every successful
/// sync (`clear`, then repeated `set`). The core documents this as
/// clear-then-rewrite; hosts needing reader-visible atomicity must provide
/// it underneath this trait.
///
/// Implementations must be `Send`: sync futures hold the store across
/// await points and may run on spawned tasks.
pub trait EntryStore: Send {
    fn clear(&mut self);
    fn set(&mut self, entry: StoredEntry);
    fn get(&self, id: &str) -> Option<&StoredEntry>;
    fn has(&self, id: &str) -> bool;
    fn keys(&self) -> Vec<String>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The host's per-source metadata store, used to persist cache validators
/// and the pagination watermark across runs. Shared references are read
/// across await points, so implementations must be `Send + Sync`.
pub trait MetaStore: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: String);
    fn delete(&mut self, key: &str);
}

/// In-memory entry store. Iteration order follows the `BTreeMap` key
/// order; callers that care about delivery order keep their own sequence.
#[derive(Debug, Default)]
pub struct MemoryEntryStore {
    entries: BTreeMap<String, StoredEntry>,
}

impl MemoryEntryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl EntryStore for MemoryEntryStore {
    fn clear(&mut self) {
        self.entries.clear();
    }

    fn set(&mut self, entry: StoredEntry) {
        self.entries.insert(entry.id.clone(), entry);
    }

    fn get(&self, id: &str) -> Option<&StoredEntry> {
        self.entries.get(id)
    }

    fn has(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    fn keys(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// In-memory metadata store.
#[derive(Debug, Default)]
pub struct MemoryMetaStore {
    values: BTreeMap<String, String>,
}

impl MemoryMetaStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetaStore for MemoryMetaStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: String) {
        self.values.insert(key.to_string(), value);
    }

    fn delete(&mut self, key: &str) {
        self.values.remove(key);
    }
}
