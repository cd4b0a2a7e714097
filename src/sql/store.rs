//! SQLite-backed entity store
//!
//! Same contract as the in-memory backend; every operation is a blocking
//! round trip to the connection. Value encoding:
//! - ids and lookups: 16-byte blobs
//! - date-times: RFC 3339 text
//! - party lists: JSON text
//! - money and decimals: the 16-byte `Decimal` encoding, since NUMERIC
//!   affinity would turn decimal text into a lossy float
//!
//! Null columns are omitted from returned records.

use std::fmt;
use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use rust_decimal::Decimal;
use uuid::Uuid;

use super::ddl::{quote_ident, TableDdl};
use crate::metadata::{AttributeSchema, AttributeType, MetadataCatalog, TableSchema};
use crate::observability::Event;
use crate::store::{prepare_record, EntityStore, StoreError, StoreResult};
use crate::value::{EntityReference, Record, Value};

const BATCH_SAVEPOINT: &str = "mirror_batch";

/// Entity store over a SQLite connection
pub struct SqlStore {
    catalog: Arc<MetadataCatalog>,
    conn: Connection,
    in_batch: bool,
}

impl fmt::Debug for SqlStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqlStore")
            .field("tables", &self.catalog.len())
            .field("in_batch", &self.in_batch)
            .finish()
    }
}

impl SqlStore {
    /// Opens a database file and provisions every catalog table.
    ///
    /// With `recreate`, existing tables are dropped first.
    pub fn open(catalog: Arc<MetadataCatalog>, path: &Path, recreate: bool) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        Self::provision(catalog, conn, recreate)
    }

    /// Opens a private in-memory database
    pub fn open_in_memory(catalog: Arc<MetadataCatalog>) -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        Self::provision(catalog, conn, true)
    }

    fn provision(catalog: Arc<MetadataCatalog>, conn: Connection, recreate: bool) -> StoreResult<Self> {
        for table in catalog.tables() {
            let ddl = TableDdl::from_schema(table);
            if recreate {
                conn.execute_batch(&ddl.drop_sql())?;
            }
            conn.execute_batch(&ddl.create_sql(!recreate))?;
        }
        Ok(Self {
            catalog,
            conn,
            in_batch: false,
        })
    }

    fn schema(&self, entity: &str) -> StoreResult<&TableSchema> {
        self.catalog
            .get(entity)
            .ok_or_else(|| StoreError::unknown_entity(entity))
    }

    fn contains(&self, schema: &TableSchema, id: Uuid) -> StoreResult<bool> {
        let sql = format!(
            "SELECT 1 FROM {} WHERE {} = ?1",
            quote_ident(&schema.logical_name),
            quote_ident(&schema.primary_id_attribute)
        );
        let found = self
            .conn
            .query_row(&sql, params![id_blob(id)], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    fn select(&self, schema: &TableSchema, id: Option<Uuid>) -> StoreResult<Vec<Record>> {
        let ddl = TableDdl::from_schema(schema);
        let columns: Vec<&str> = ddl.column_names().collect();
        let mut sql = format!(
            "SELECT {} FROM {}",
            columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", "),
            quote_ident(&schema.logical_name)
        );
        let mut args = Vec::new();
        if let Some(id) = id {
            sql.push_str(&format!(" WHERE {} = ?1", quote_ident(&schema.primary_id_attribute)));
            args.push(id_blob(id));
        }

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), |row| {
            (0..columns.len())
                .map(|i| row.get::<_, SqlValue>(i))
                .collect::<rusqlite::Result<Vec<_>>>()
        })?;

        let mut raw_rows = Vec::new();
        for row in rows {
            raw_rows.push(row?);
        }
        drop(stmt);

        raw_rows
            .into_iter()
            .map(|raw| self.decode_row(schema, &columns, raw))
            .collect()
    }

    fn decode_row(&self, schema: &TableSchema, columns: &[&str], raw: Vec<SqlValue>) -> StoreResult<Record> {
        let mut record = Record::new(schema.logical_name.clone());
        for (column, sql_value) in columns.iter().zip(raw) {
            let attr = schema
                .attribute(column)
                .ok_or_else(|| StoreError::backend_message(format!("Column '{}' has no attribute", column)))?;
            let value = self.decode(attr, sql_value)?;
            if !value.is_null() {
                record.attributes.insert(attr.name.clone(), value);
            }
        }
        record.id = record
            .get(&schema.primary_id_attribute)
            .and_then(Value::as_guid)
            .ok_or_else(|| StoreError::backend_message(format!("Row of '{}' has no id", schema.logical_name)))?;
        Ok(record)
    }

    fn decode(&self, attr: &AttributeSchema, raw: SqlValue) -> StoreResult<Value> {
        let invalid = |raw: &SqlValue| {
            StoreError::backend_message(format!(
                "Column '{}' holds {:?}, expected {}",
                attr.name,
                raw.data_type(),
                attr.attribute_type.type_name()
            ))
        };

        if raw == SqlValue::Null {
            return Ok(Value::Null);
        }

        let value = match (attr.attribute_type, &raw) {
            (AttributeType::Uniqueidentifier, SqlValue::Blob(bytes)) => {
                Value::Guid(Uuid::from_slice(bytes).map_err(|_| invalid(&raw))?)
            }
            (AttributeType::Lookup, SqlValue::Blob(bytes)) => {
                let id = Uuid::from_slice(bytes).map_err(|_| invalid(&raw))?;
                Value::Reference(EntityReference::new(self.lookup_target(attr, id)?, id))
            }
            (AttributeType::Picklist, SqlValue::Integer(i)) => {
                Value::OptionSet(i32::try_from(*i).map_err(|_| invalid(&raw))?)
            }
            (AttributeType::Integer, SqlValue::Integer(i)) => {
                Value::Integer(i32::try_from(*i).map_err(|_| invalid(&raw))?)
            }
            (AttributeType::BigInt, SqlValue::Integer(i)) => Value::BigInt(*i),
            (AttributeType::Boolean, SqlValue::Integer(i)) => Value::Boolean(*i != 0),
            (AttributeType::Double, SqlValue::Real(f)) => Value::Double(*f),
            (AttributeType::Double, SqlValue::Integer(i)) => Value::Double(*i as f64),
            (AttributeType::Money | AttributeType::Decimal, _) => {
                let amount = decode_decimal(&raw).ok_or_else(|| invalid(&raw))?;
                if attr.attribute_type == AttributeType::Money {
                    Value::Money(amount)
                } else {
                    Value::Decimal(amount)
                }
            }
            (AttributeType::DateTime, SqlValue::Text(text)) => Value::DateTime(
                DateTime::parse_from_rfc3339(text)
                    .map_err(|_| invalid(&raw))?
                    .with_timezone(&Utc),
            ),
            (AttributeType::PartyList, SqlValue::Text(text)) => {
                Value::PartyList(serde_json::from_str(text).map_err(|e| StoreError::backend("Invalid party list", e))?)
            }
            (AttributeType::String | AttributeType::Memo, SqlValue::Text(text)) => Value::String(text.clone()),
            _ => return Err(invalid(&raw)),
        };
        Ok(value)
    }

    /// Target table of a stored lookup id. With several targets, the first
    /// table holding the id wins.
    fn lookup_target(&self, attr: &AttributeSchema, id: Uuid) -> StoreResult<String> {
        if let [target] = attr.targets.as_slice() {
            return Ok(target.clone());
        }
        for target in &attr.targets {
            if let Some(schema) = self.catalog.get(target) {
                if self.contains(schema, id)? {
                    return Ok(target.clone());
                }
            }
        }
        attr.targets
            .first()
            .cloned()
            .ok_or_else(|| StoreError::backend_message(format!("Lookup '{}' declares no targets", attr.name)))
    }

    fn encoded_columns(&self, schema: &TableSchema, record: &Record) -> StoreResult<Vec<(String, SqlValue)>> {
        TableDdl::from_schema(schema)
            .columns
            .into_iter()
            .map(|column| {
                let value = match record.get(&column.name) {
                    Some(value) => encode(value)?,
                    None => SqlValue::Null,
                };
                Ok((column.name, value))
            })
            .collect()
    }

    fn insert_row(&mut self, schema: &TableSchema, record: &Record) -> StoreResult<()> {
        let columns = self.encoded_columns(schema, record)?;
        let names: Vec<String> = columns.iter().map(|(n, _)| quote_ident(n)).collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_ident(&schema.logical_name),
            names.join(", "),
            placeholders.join(", ")
        );
        self.conn
            .execute(&sql, params_from_iter(columns.iter().map(|(_, v)| v)))?;
        Ok(())
    }
}

fn id_blob(id: Uuid) -> SqlValue {
    SqlValue::Blob(id.as_bytes().to_vec())
}

fn encode(value: &Value) -> StoreResult<SqlValue> {
    let encoded = match value {
        Value::Null => SqlValue::Null,
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Integer(i) | Value::OptionSet(i) => SqlValue::Integer(i64::from(*i)),
        Value::BigInt(i) => SqlValue::Integer(*i),
        Value::Boolean(b) => SqlValue::Integer(i64::from(*b)),
        Value::Double(f) => SqlValue::Real(*f),
        Value::Decimal(d) | Value::Money(d) => SqlValue::Blob(d.serialize().to_vec()),
        Value::DateTime(dt) => SqlValue::Text(dt.to_rfc3339_opts(SecondsFormat::AutoSi, true)),
        Value::Guid(id) => id_blob(*id),
        Value::Reference(r) => id_blob(r.id),
        Value::PartyList(list) => SqlValue::Text(
            serde_json::to_string(list).map_err(|e| StoreError::backend("Failed to encode party list", e))?,
        ),
    };
    Ok(encoded)
}

fn decode_decimal(raw: &SqlValue) -> Option<Decimal> {
    match raw {
        SqlValue::Blob(bytes) => Some(Decimal::deserialize(<[u8; 16]>::try_from(bytes.as_slice()).ok()?)),
        // Rows written by other tools
        SqlValue::Integer(i) => Some(Decimal::from(*i)),
        // Shortest float form, so 19.99 reads back as 19.99
        SqlValue::Real(f) => f.to_string().parse().ok(),
        SqlValue::Text(text) => text.parse().ok(),
        _ => None,
    }
}

impl EntityStore for SqlStore {
    fn catalog(&self) -> &Arc<MetadataCatalog> {
        &self.catalog
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }

    fn get(&self, entity: &str, id: Uuid) -> StoreResult<Option<Record>> {
        let schema = self.schema(entity)?;
        Ok(self.select(schema, Some(id))?.into_iter().next())
    }

    fn add(&mut self, record: Record, with_reference_checks: bool) -> StoreResult<Uuid> {
        let catalog = Arc::clone(&self.catalog);
        let record = prepare_record(&catalog, record)?;
        let schema = self.schema(&record.logical_name)?.clone();

        if self.contains(&schema, record.id)? {
            return Err(StoreError::duplicate_key(&schema.logical_name, record.id));
        }
        if with_reference_checks {
            self.check_references(&record)?;
        }

        self.insert_row(&schema, &record)?;
        crate::store::trace_record(Event::RecordCreated, &schema.logical_name, record.id);
        Ok(record.id)
    }

    fn update(&mut self, record: Record, with_reference_checks: bool) -> StoreResult<()> {
        if record.id.is_nil() {
            return Err(StoreError::missing_identification(&record.logical_name));
        }
        let catalog = Arc::clone(&self.catalog);
        let record = prepare_record(&catalog, record)?;
        let schema = self.schema(&record.logical_name)?.clone();

        if !self.contains(&schema, record.id)? {
            return Err(StoreError::record_not_found(&schema.logical_name, record.id));
        }
        if with_reference_checks {
            self.check_references(&record)?;
        }

        let columns: Vec<(String, SqlValue)> = self
            .encoded_columns(&schema, &record)?
            .into_iter()
            .filter(|(name, _)| name != &schema.primary_id_attribute)
            .collect();
        if columns.is_empty() {
            return Ok(());
        }

        let assignments: Vec<String> = columns
            .iter()
            .enumerate()
            .map(|(i, (name, _))| format!("{} = ?{}", quote_ident(name), i + 1))
            .collect();
        let sql = format!(
            "UPDATE {} SET {} WHERE {} = ?{}",
            quote_ident(&schema.logical_name),
            assignments.join(", "),
            quote_ident(&schema.primary_id_attribute),
            columns.len() + 1
        );
        let mut args: Vec<SqlValue> = columns.into_iter().map(|(_, v)| v).collect();
        args.push(id_blob(record.id));

        self.conn.execute(&sql, params_from_iter(args.iter()))?;
        crate::store::trace_record(Event::RecordUpdated, &schema.logical_name, record.id);
        Ok(())
    }

    fn delete(&mut self, entity: &str, id: Uuid) -> StoreResult<()> {
        let schema = self.schema(entity)?;
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_ident(&schema.logical_name),
            quote_ident(&schema.primary_id_attribute)
        );
        let removed = self.conn.execute(&sql, params![id_blob(id)])?;
        if removed == 0 {
            return Err(StoreError::record_not_found(entity, id));
        }
        crate::store::trace_record(Event::RecordDeleted, entity, id);
        Ok(())
    }

    fn scan(&self, entity: &str) -> StoreResult<Vec<Record>> {
        let schema = self.schema(entity)?;
        self.select(schema, None)
    }

    fn reset(&mut self) -> StoreResult<()> {
        for table in self.catalog.tables() {
            self.conn
                .execute_batch(&format!("DELETE FROM {};", quote_ident(&table.logical_name)))?;
        }
        Ok(())
    }

    /// Copies every row into a fresh in-memory database.
    fn snapshot(&self) -> StoreResult<Box<dyn EntityStore>> {
        let mut copy = SqlStore::open_in_memory(Arc::clone(&self.catalog))?;
        for table in self.catalog.tables() {
            for record in self.select(table, None)? {
                copy.insert_row(table, &record)?;
            }
        }
        Ok(Box::new(copy))
    }

    /// Batches are a savepoint on the same connection, so a rollback never
    /// touches rows written before the batch began.
    fn begin_batch(&mut self) -> StoreResult<()> {
        if self.in_batch {
            return Err(StoreError::backend_message("a batch is already open"));
        }
        self.conn.execute_batch(&format!("SAVEPOINT {};", BATCH_SAVEPOINT))?;
        self.in_batch = true;
        Ok(())
    }

    fn commit_batch(&mut self) -> StoreResult<()> {
        self.close_batch(&format!("RELEASE SAVEPOINT {};", BATCH_SAVEPOINT))
    }

    fn rollback_batch(&mut self) -> StoreResult<()> {
        self.close_batch(&format!(
            "ROLLBACK TO SAVEPOINT {0}; RELEASE SAVEPOINT {0};",
            BATCH_SAVEPOINT
        ))
    }
}

impl SqlStore {
    fn close_batch(&mut self, sql: &str) -> StoreResult<()> {
        if !self.in_batch {
            return Err(StoreError::backend_message("no batch is open"));
        }
        self.conn.execute_batch(sql)?;
        self.in_batch = false;
        Ok(())
    }
}
