//! Upstream data source consulted on local cache misses

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use uuid::Uuid;

use super::errors::StoreResult;
use crate::query::QueryExpression;
use crate::value::Record;

/// Read-only provider of records the local store does not hold yet.
///
/// Calls are blocking and made at most once per missing record.
pub trait UpstreamSource: Send + Sync {
    /// Fetches a single record
    fn retrieve(&self, entity: &str, id: Uuid) -> StoreResult<Option<Record>>;

    /// Fetches candidate rows for a query's base table
    fn retrieve_multiple(&self, query: &QueryExpression) -> StoreResult<Vec<Record>>;
}

/// Fixed in-memory upstream, counting every call made against it
#[derive(Debug, Default)]
pub struct StaticUpstream {
    tables: HashMap<String, Vec<Record>>,
    calls: AtomicUsize,
}

impl StaticUpstream {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(mut self, record: Record) -> Self {
        self.tables
            .entry(record.logical_name.clone())
            .or_default()
            .push(record);
        self
    }

    /// Number of upstream calls served so far
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl UpstreamSource for StaticUpstream {
    fn retrieve(&self, entity: &str, id: Uuid) -> StoreResult<Option<Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .tables
            .get(entity)
            .and_then(|rows| rows.iter().find(|r| r.id == id))
            .cloned())
    }

    /// Returns every row of the base table; filtering happens locally.
    fn retrieve_multiple(&self, query: &QueryExpression) -> StoreResult<Vec<Record>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(query
            .entity_name
            .as_deref()
            .and_then(|name| self.tables.get(name))
            .cloned()
            .unwrap_or_default())
    }
}
