//! Per-table row arena
//!
//! Rows live in a dense `Vec`; a hash index maps record ids to slots.
//! Removal swaps the last row into the freed slot and re-points its index
//! entry, so slots stay dense and lookups stay O(1).

use std::collections::HashMap;

use uuid::Uuid;

use crate::value::Record;

/// Rows of a single logical table
#[derive(Debug, Clone, Default)]
pub struct Table {
    rows: Vec<Record>,
    index: HashMap<Uuid, usize>,
}

impl Table {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a record. Returns the record back if its id is taken.
    pub fn insert(&mut self, record: Record) -> Result<(), Record> {
        if self.index.contains_key(&record.id) {
            return Err(record);
        }
        self.index.insert(record.id, self.rows.len());
        self.rows.push(record);
        Ok(())
    }

    /// Replaces the record with the same id. Returns the record back if absent.
    pub fn replace(&mut self, record: Record) -> Result<Record, Record> {
        match self.index.get(&record.id) {
            Some(&slot) => Ok(std::mem::replace(&mut self.rows[slot], record)),
            None => Err(record),
        }
    }

    pub fn remove(&mut self, id: &Uuid) -> Option<Record> {
        let slot = self.index.remove(id)?;
        let removed = self.rows.swap_remove(slot);
        if let Some(moved) = self.rows.get(slot) {
            self.index.insert(moved.id, slot);
        }
        Some(removed)
    }

    pub fn get(&self, id: &Uuid) -> Option<&Record> {
        self.index.get(id).map(|&slot| &self.rows[slot])
    }

    pub fn contains(&self, id: &Uuid) -> bool {
        self.index.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Record> {
        self.rows.iter()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
        self.index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: Uuid) -> Record {
        Record::with_id("account", id)
    }

    #[test]
    fn test_insert_rejects_duplicate() {
        let mut table = Table::new();
        let id = Uuid::new_v4();
        assert!(table.insert(record(id)).is_ok());
        assert!(table.insert(record(id)).is_err());
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_remove_keeps_index_consistent() {
        let mut table = Table::new();
        let ids: Vec<Uuid> = (0..4).map(|_| Uuid::new_v4()).collect();
        for id in &ids {
            table.insert(record(*id)).unwrap();
        }

        // Removing the first row moves the last row into slot 0
        assert!(table.remove(&ids[0]).is_some());
        assert!(table.remove(&ids[0]).is_none());
        for id in &ids[1..] {
            assert_eq!(table.get(id).map(|r| r.id), Some(*id));
        }
        assert_eq!(table.len(), 3);
    }

    #[test]
    fn test_replace_requires_existing() {
        let mut table = Table::new();
        let id = Uuid::new_v4();
        assert!(table.replace(record(id)).is_err());

        table.insert(record(id)).unwrap();
        let updated = record(id).with("name", "Fabrikam");
        let previous = table.replace(updated).unwrap();
        assert!(previous.attributes.is_empty());
        assert!(table.get(&id).unwrap().contains("name"));
    }

    #[test]
    fn test_clone_is_deep() {
        let mut table = Table::new();
        let id = Uuid::new_v4();
        table.insert(record(id)).unwrap();

        let mut copy = table.clone();
        copy.replace(record(id).with("name", "changed")).unwrap();
        assert!(!table.get(&id).unwrap().contains("name"));
    }
}
