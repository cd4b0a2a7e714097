//! Metadata catalog
//!
//! Maps logical table names to their schema. Built once (from disk or
//! programmatically), then shared read-only behind an `Arc`.
//!
//! On disk, one JSON `TableSchema` per file; non-JSON files are ignored.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use super::errors::{MetadataError, MetadataResult};
use super::types::{AttributeSchema, TableSchema};

/// In-memory registry of table schemas.
#[derive(Debug, Clone, Default)]
pub struct MetadataCatalog {
    tables: BTreeMap<String, TableSchema>,
}

impl MetadataCatalog {
    /// Creates an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog from table schemas
    pub fn from_tables(tables: impl IntoIterator<Item = TableSchema>) -> MetadataResult<Self> {
        let mut catalog = Self::new();
        for table in tables {
            catalog.register(table)?;
        }
        Ok(catalog)
    }

    /// Loads every `*.json` schema file in `dir`.
    ///
    /// Malformed files abort the load.
    pub fn load_dir(dir: &Path) -> MetadataResult<Self> {
        let entries = fs::read_dir(dir).map_err(|e| {
            MetadataError::malformed(
                dir.display().to_string(),
                format!("Failed to read metadata directory: {}", e),
            )
        })?;

        let mut paths = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                MetadataError::malformed(
                    dir.display().to_string(),
                    format!("Failed to read directory entry: {}", e),
                )
            })?;
            let path = entry.path();
            if path.extension().map_or(false, |ext| ext == "json") {
                paths.push(path);
            }
        }
        // Deterministic registration order
        paths.sort();

        let mut catalog = Self::new();
        for path in paths {
            catalog.load_file(&path)?;
        }
        Ok(catalog)
    }

    fn load_file(&mut self, path: &Path) -> MetadataResult<()> {
        let content = fs::read_to_string(path).map_err(|e| {
            MetadataError::malformed(path.display().to_string(), format!("Failed to read file: {}", e))
        })?;

        let table: TableSchema = serde_json::from_str(&content).map_err(|e| {
            MetadataError::malformed(path.display().to_string(), format!("Invalid JSON: {}", e))
        })?;

        table
            .validate_structure()
            .map_err(|e| MetadataError::malformed(path.display().to_string(), e))?;

        if self.tables.contains_key(&table.logical_name) {
            return Err(MetadataError::duplicate_entity(&table.logical_name));
        }
        self.tables.insert(table.logical_name.clone(), table);
        Ok(())
    }

    /// Registers a table schema directly.
    pub fn register(&mut self, table: TableSchema) -> MetadataResult<()> {
        table
            .validate_structure()
            .map_err(|e| MetadataError::malformed(format!("<{}>", table.logical_name), e))?;

        if self.tables.contains_key(&table.logical_name) {
            return Err(MetadataError::duplicate_entity(&table.logical_name));
        }

        self.tables.insert(table.logical_name.clone(), table);
        Ok(())
    }

    /// Writes a table schema to `dir/<logical_name>.json`.
    pub fn save_table(dir: &Path, table: &TableSchema) -> MetadataResult<PathBuf> {
        let path = dir.join(format!("{}.json", table.logical_name));

        fs::create_dir_all(dir).map_err(|e| {
            MetadataError::malformed(
                dir.display().to_string(),
                format!("Failed to create metadata directory: {}", e),
            )
        })?;

        let content = serde_json::to_string_pretty(table).map_err(|e| {
            MetadataError::malformed(path.display().to_string(), format!("Failed to serialize: {}", e))
        })?;

        fs::write(&path, content).map_err(|e| {
            MetadataError::malformed(path.display().to_string(), format!("Failed to write file: {}", e))
        })?;

        Ok(path)
    }

    /// Gets a table schema by logical name
    pub fn get(&self, logical_name: &str) -> Option<&TableSchema> {
        self.tables.get(logical_name)
    }

    /// Gets a table schema, failing on unknown names
    pub fn require(&self, logical_name: &str) -> MetadataResult<&TableSchema> {
        self.get(logical_name)
            .ok_or_else(|| MetadataError::unknown_entity(logical_name))
    }

    /// Gets an attribute of a table
    pub fn attribute(&self, logical_name: &str, attribute: &str) -> Option<&AttributeSchema> {
        self.get(logical_name).and_then(|t| t.attribute(attribute))
    }

    /// Checks if a table is declared
    pub fn contains(&self, logical_name: &str) -> bool {
        self.tables.contains_key(logical_name)
    }

    /// Returns all table schemas in name order
    pub fn tables(&self) -> impl Iterator<Item = &TableSchema> {
        self.tables.values()
    }

    /// Returns the number of table schemas
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    /// Returns true if no tables are registered
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::MetadataErrorCode;
    use tempfile::TempDir;

    fn account() -> TableSchema {
        TableSchema::new("account", "accountid")
            .with_attribute(AttributeSchema::primary_name("name", 160))
    }

    #[test]
    fn test_register_and_get() {
        let mut catalog = MetadataCatalog::new();
        catalog.register(account()).unwrap();

        assert!(catalog.contains("account"));
        assert_eq!(catalog.require("account").unwrap().primary_id_attribute, "accountid");
        assert!(catalog.attribute("account", "name").is_some());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut catalog = MetadataCatalog::new();
        catalog.register(account()).unwrap();

        let err = catalog.register(account()).unwrap_err();
        assert_eq!(err.code(), MetadataErrorCode::DuplicateEntity);
    }

    #[test]
    fn test_unknown_entity() {
        let catalog = MetadataCatalog::new();
        let err = catalog.require("lead").unwrap_err();
        assert_eq!(err.code().code(), "MIRROR_UNKNOWN_ENTITY");
    }

    #[test]
    fn test_save_and_load_dir() {
        let temp_dir = TempDir::new().unwrap();
        MetadataCatalog::save_table(temp_dir.path(), &account()).unwrap();
        std::fs::write(temp_dir.path().join("README.txt"), "ignored").unwrap();

        let catalog = MetadataCatalog::load_dir(temp_dir.path()).unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog.get("account").unwrap(), &account());
    }

    #[test]
    fn test_load_malformed_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("broken.json"), "{ not json").unwrap();

        let err = MetadataCatalog::load_dir(temp_dir.path()).unwrap_err();
        assert!(err.is_fatal());
    }
}
