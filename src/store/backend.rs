//! Storage capability shared by every backend

use std::collections::BTreeMap;
use std::sync::Arc;

use uuid::Uuid;

use super::errors::{StoreError, StoreErrorCode, StoreResult};
use crate::metadata::MetadataCatalog;
use crate::query::QueryExpression;
use crate::value::{coerce_record, values_equal, EntityReference, Record, Value};

/// Record storage contract.
///
/// Every read returns detached copies; mutation goes through `&mut self`.
pub trait EntityStore: Send {
    /// Catalog the store was provisioned from
    fn catalog(&self) -> &Arc<MetadataCatalog>;

    /// Short backend name for logging
    fn backend_name(&self) -> &'static str;

    /// Point lookup by id
    fn get(&self, entity: &str, id: Uuid) -> StoreResult<Option<Record>>;

    /// Inserts a record, assigning an id if it has none
    fn add(&mut self, record: Record, with_reference_checks: bool) -> StoreResult<Uuid>;

    /// Replaces the full attribute map of an existing record
    fn update(&mut self, record: Record, with_reference_checks: bool) -> StoreResult<()>;

    /// Removes a record; a missing id is `RecordNotFound`
    fn delete(&mut self, entity: &str, id: Uuid) -> StoreResult<()>;

    /// All rows of a table
    fn scan(&self, entity: &str) -> StoreResult<Vec<Record>>;

    /// Removes every row of every table
    fn reset(&mut self) -> StoreResult<()>;

    /// Independent deep copy of the whole store
    fn snapshot(&self) -> StoreResult<Box<dyn EntityStore>>;

    /// Starts a batch: later writes are kept by `commit_batch` or undone in
    /// place by `rollback_batch`. Batches do not nest.
    fn begin_batch(&mut self) -> StoreResult<()>;

    fn commit_batch(&mut self) -> StoreResult<()>;

    fn rollback_batch(&mut self) -> StoreResult<()>;

    /// Pulls upstream rows for the query's base table. Returns the number of
    /// rows added.
    fn prefetch(&mut self, _query: &QueryExpression) -> StoreResult<usize> {
        Ok(0)
    }

    /// Removes a record if present
    fn delete_if_exists(&mut self, entity: &str, id: Uuid) -> StoreResult<bool> {
        match self.delete(entity, id) {
            Ok(()) => Ok(true),
            Err(e) if e.code() == StoreErrorCode::RecordNotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// First row whose attributes match every key value
    fn find_by_keys(&self, entity: &str, keys: &BTreeMap<String, Value>) -> StoreResult<Option<Record>> {
        Ok(self.scan(entity)?.into_iter().find(|record| {
            keys.iter().all(|(name, expected)| {
                record.get(name).map_or(false, |actual| values_equal(actual, expected))
            })
        }))
    }

    /// Local resolution of a reference, by id or by natural key
    fn resolve(&self, reference: &EntityReference) -> StoreResult<Option<Record>> {
        if !reference.id.is_nil() {
            return self.get(&reference.logical_name, reference.id);
        }
        if reference.key_attributes.is_empty() {
            return Err(StoreError::missing_identification(&reference.logical_name));
        }
        self.find_by_keys(&reference.logical_name, &reference.key_attributes)
    }

    /// Whether the referenced record exists
    fn exists(&self, reference: &EntityReference) -> StoreResult<bool> {
        Ok(self.resolve(reference)?.is_some())
    }

    /// Strict lookup of the referenced record
    fn retrieve(&mut self, reference: &EntityReference) -> StoreResult<Record> {
        self.resolve(reference)?
            .ok_or_else(|| not_found(reference))
    }

    /// Every reference held by `record` must resolve
    fn check_references(&mut self, record: &Record) -> StoreResult<()> {
        for (attribute, value) in &record.attributes {
            for reference in value.references() {
                match self.retrieve(reference) {
                    Ok(_) => {}
                    Err(e)
                        if matches!(
                            e.code(),
                            StoreErrorCode::RecordNotFound | StoreErrorCode::MissingIdentification
                        ) =>
                    {
                        return Err(StoreError::missing_referenced_record(
                            attribute,
                            &reference.logical_name,
                            reference.id,
                        ));
                    }
                    Err(e) => return Err(e),
                }
            }
        }
        Ok(())
    }
}

/// Coerces a record against its table and assigns its id.
///
/// The primary id attribute always mirrors the record id afterwards.
pub(crate) fn prepare_record(catalog: &MetadataCatalog, record: Record) -> StoreResult<Record> {
    let table = catalog
        .get(&record.logical_name)
        .ok_or_else(|| StoreError::unknown_entity(&record.logical_name))?;

    let entity = record.logical_name.clone();
    let mut record =
        coerce_record(table, record).map_err(|e| StoreError::invalid_attribute_value(&entity, e))?;

    if record.id.is_nil() {
        record.id = Uuid::new_v4();
    }
    record.formatted_values.clear();
    record
        .attributes
        .insert(table.primary_id_attribute.clone(), Value::Guid(record.id));
    Ok(record)
}

pub(crate) fn not_found(reference: &EntityReference) -> StoreError {
    if reference.id.is_nil() {
        let keys = reference
            .key_attributes
            .keys()
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");
        StoreError::record_not_found_by_keys(&reference.logical_name, &keys)
    } else {
        StoreError::record_not_found(&reference.logical_name, reference.id)
    }
}
