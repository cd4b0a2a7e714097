//! Authoritative in-memory backend

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use uuid::Uuid;

use super::backend::{not_found, prepare_record, EntityStore};
use super::errors::{StoreError, StoreResult};
use super::table::Table;
use super::trace_record;
use super::upstream::UpstreamSource;
use crate::metadata::MetadataCatalog;
use crate::observability::Event;
use crate::query::QueryExpression;
use crate::value::{EntityReference, Record};

/// Hash-indexed row arenas, one per declared table.
///
/// With an upstream source configured, strict retrievals and reference
/// checks fetch missing records once and cache them locally. A record
/// already present is never refreshed.
#[derive(Clone)]
pub struct MemoryStore {
    catalog: Arc<MetadataCatalog>,
    tables: HashMap<String, Table>,
    upstream: Option<Arc<dyn UpstreamSource>>,
    /// Tables as they were when the open batch began
    batch: Option<HashMap<String, Table>>,
}

impl fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryStore")
            .field("tables", &self.tables.len())
            .field("upstream", &self.upstream.is_some())
            .field("in_batch", &self.batch.is_some())
            .finish()
    }
}

impl MemoryStore {
    pub fn new(catalog: Arc<MetadataCatalog>) -> Self {
        let tables = catalog
            .tables()
            .map(|t| (t.logical_name.clone(), Table::new()))
            .collect();
        Self {
            catalog,
            tables,
            upstream: None,
            batch: None,
        }
    }

    pub fn with_upstream(mut self, upstream: Arc<dyn UpstreamSource>) -> Self {
        self.upstream = Some(upstream);
        self
    }

    /// Number of rows held for `entity`
    pub fn row_count(&self, entity: &str) -> usize {
        self.tables.get(entity).map_or(0, Table::len)
    }

    fn table(&self, entity: &str) -> StoreResult<&Table> {
        self.tables
            .get(entity)
            .ok_or_else(|| StoreError::unknown_entity(entity))
    }

    fn table_mut(&mut self, entity: &str) -> StoreResult<&mut Table> {
        self.tables
            .get_mut(entity)
            .ok_or_else(|| StoreError::unknown_entity(entity))
    }

    fn fetch_upstream(&mut self, entity: &str, id: Uuid) -> StoreResult<Option<Record>> {
        let upstream = match &self.upstream {
            Some(upstream) => Arc::clone(upstream),
            None => return Ok(None),
        };
        let record = match upstream.retrieve(entity, id)? {
            Some(record) => record,
            None => return Ok(None),
        };

        trace_record(Event::UpstreamFetch, entity, id);
        let record = prepare_record(&self.catalog, record)?;
        self.table_mut(entity)?
            .insert(record.clone())
            .map_err(|r| StoreError::duplicate_key(entity, r.id))?;
        Ok(Some(record))
    }
}

impl EntityStore for MemoryStore {
    fn catalog(&self) -> &Arc<MetadataCatalog> {
        &self.catalog
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn get(&self, entity: &str, id: Uuid) -> StoreResult<Option<Record>> {
        Ok(self.table(entity)?.get(&id).cloned())
    }

    fn add(&mut self, record: Record, with_reference_checks: bool) -> StoreResult<Uuid> {
        let record = prepare_record(&self.catalog, record)?;
        let entity = record.logical_name.clone();
        let id = record.id;

        if self.table(&entity)?.contains(&id) {
            return Err(StoreError::duplicate_key(&entity, id));
        }
        if with_reference_checks {
            self.check_references(&record)?;
        }

        self.table_mut(&entity)?
            .insert(record)
            .map_err(|r| StoreError::duplicate_key(&entity, r.id))?;
        trace_record(Event::RecordCreated, &entity, id);
        Ok(id)
    }

    fn update(&mut self, record: Record, with_reference_checks: bool) -> StoreResult<()> {
        if record.id.is_nil() {
            return Err(StoreError::missing_identification(&record.logical_name));
        }
        let record = prepare_record(&self.catalog, record)?;
        let entity = record.logical_name.clone();
        let id = record.id;

        if !self.table(&entity)?.contains(&id) {
            return Err(StoreError::record_not_found(&entity, id));
        }
        if with_reference_checks {
            self.check_references(&record)?;
        }

        self.table_mut(&entity)?
            .replace(record)
            .map_err(|r| StoreError::record_not_found(&entity, r.id))?;
        trace_record(Event::RecordUpdated, &entity, id);
        Ok(())
    }

    fn delete(&mut self, entity: &str, id: Uuid) -> StoreResult<()> {
        self.table_mut(entity)?
            .remove(&id)
            .ok_or_else(|| StoreError::record_not_found(entity, id))?;
        trace_record(Event::RecordDeleted, entity, id);
        Ok(())
    }

    fn scan(&self, entity: &str) -> StoreResult<Vec<Record>> {
        Ok(self.table(entity)?.iter().cloned().collect())
    }

    fn reset(&mut self) -> StoreResult<()> {
        for table in self.tables.values_mut() {
            table.clear();
        }
        Ok(())
    }

    fn snapshot(&self) -> StoreResult<Box<dyn EntityStore>> {
        let mut copy = self.clone();
        copy.batch = None;
        Ok(Box::new(copy))
    }

    fn begin_batch(&mut self) -> StoreResult<()> {
        if self.batch.is_some() {
            return Err(StoreError::backend_message("a batch is already open"));
        }
        self.batch = Some(self.tables.clone());
        Ok(())
    }

    fn commit_batch(&mut self) -> StoreResult<()> {
        self.batch
            .take()
            .map(|_| ())
            .ok_or_else(|| StoreError::backend_message("no batch is open"))
    }

    fn rollback_batch(&mut self) -> StoreResult<()> {
        self.tables = self
            .batch
            .take()
            .ok_or_else(|| StoreError::backend_message("no batch is open"))?;
        Ok(())
    }

    fn prefetch(&mut self, query: &QueryExpression) -> StoreResult<usize> {
        let upstream = match &self.upstream {
            Some(upstream) => Arc::clone(upstream),
            None => return Ok(0),
        };
        let entity = match query.entity_name.as_deref() {
            Some(entity) if self.row_count(entity) == 0 => entity.to_string(),
            _ => return Ok(0),
        };

        let mut added = 0;
        for record in upstream.retrieve_multiple(query)? {
            if record.logical_name != entity || self.table(&entity)?.contains(&record.id) {
                continue;
            }
            self.add(record, true)?;
            added += 1;
        }
        Ok(added)
    }

    fn retrieve(&mut self, reference: &EntityReference) -> StoreResult<Record> {
        if let Some(record) = self.resolve(reference)? {
            return Ok(record);
        }
        if !reference.id.is_nil() {
            if let Some(record) = self.fetch_upstream(&reference.logical_name, reference.id)? {
                return Ok(record);
            }
        }
        Err(not_found(reference))
    }
}
