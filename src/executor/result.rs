//! Result types for query execution

use serde::{Deserialize, Serialize};

use crate::value::Record;

/// Rows returned by a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCollection {
    /// Base entity of the query
    pub entity_name: String,
    /// Rows in result order, after paging
    pub records: Vec<Record>,
    /// Matching rows before paging; -1 when the count was not requested
    pub total_record_count: i64,
    /// Whether rows remain past the returned page
    pub more_records: bool,
}

impl EntityCollection {
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            records: Vec::new(),
            total_record_count: -1,
            more_records: false,
        }
    }

    /// Number of rows returned
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.records.iter()
    }
}

impl IntoIterator for EntityCollection {
    type Item = Record;
    type IntoIter = std::vec::IntoIter<Record>;

    fn into_iter(self) -> Self::IntoIter {
        self.records.into_iter()
    }
}
