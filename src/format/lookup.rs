//! Referenced-record cache for label computation
//!
//! Resolved once per batch, before rows are labelled in parallel, so label
//! computation never touches the store.

use std::collections::HashMap;

use uuid::Uuid;

use crate::store::{EntityStore, StoreResult};
use crate::value::Record;

/// Read-only map of every record a batch references
#[derive(Debug, Clone, Default)]
pub struct LookupCache {
    records: HashMap<(String, Uuid), Record>,
}

impl LookupCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetches every record referenced from `rows`. References to records
    /// that do not exist are left out.
    pub fn collect(store: &dyn EntityStore, rows: &[Record]) -> StoreResult<Self> {
        let mut cache = Self::new();
        for row in rows {
            for value in row.attributes.values() {
                for reference in value.references() {
                    let key = (reference.logical_name.clone(), reference.id);
                    if reference.id.is_nil() || cache.records.contains_key(&key) {
                        continue;
                    }
                    if !store.catalog().contains(&reference.logical_name) {
                        continue;
                    }
                    if let Some(record) = store.get(&reference.logical_name, reference.id)? {
                        cache.records.insert(key, record);
                    }
                }
            }
        }
        Ok(cache)
    }

    pub fn insert(&mut self, record: Record) {
        self.records
            .insert((record.logical_name.clone(), record.id), record);
    }

    pub fn get(&self, entity: &str, id: Uuid) -> Option<&Record> {
        self.records.get(&(entity.to_string(), id))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
