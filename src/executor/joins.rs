//! Link-entity joins
//!
//! Every table a query touches is scanned once into a per-query arena. A
//! candidate row is a `Binding`: the base row index plus one row index per
//! link it has been joined through. Joined rows are only copied out when a
//! binding survives filtering.
//!
//! Links are applied in declaration order, each against the bindings the
//! previous one produced. Within a link, nested links are applied before
//! the link's own criteria, and left-outer fill-in happens last: a parent
//! with no surviving match is emitted once, unchanged.

use std::collections::HashMap;

use super::filters::{AttributeSource, FilterEvaluator};
use crate::query::{ColumnSet, JoinOperator, LinkEntity, QueryExpression};
use crate::store::{EntityStore, StoreResult};
use crate::value::{values_equal, Record, Value};

struct LinkSlot {
    alias: String,
    table: usize,
    columns: ColumnSet,
}

/// Candidate result row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Binding {
    base: usize,
    joined: Vec<(usize, usize)>,
}

impl Binding {
    fn extended(&self, link: usize, row: usize) -> Binding {
        let mut joined = self.joined.clone();
        joined.push((link, row));
        Binding {
            base: self.base,
            joined,
        }
    }

    fn row_for(&self, link: usize) -> Option<usize> {
        self.joined
            .iter()
            .find(|(l, _)| *l == link)
            .map(|(_, row)| *row)
    }
}

/// Rows of every table a query reads
pub struct JoinArena {
    tables: Vec<Vec<Record>>,
    table_of: HashMap<String, usize>,
    links: Vec<LinkSlot>,
    link_of: HashMap<String, usize>,
}

impl JoinArena {
    /// Scans the base table and every linked table
    pub fn load(store: &dyn EntityStore, query: &QueryExpression, entity: &str) -> StoreResult<Self> {
        let mut arena = Self {
            tables: vec![store.scan(entity)?],
            table_of: HashMap::from([(entity.to_string(), 0)]),
            links: Vec::new(),
            link_of: HashMap::new(),
        };
        for link in &query.links {
            arena.register(store, link)?;
        }
        Ok(arena)
    }

    fn register(&mut self, store: &dyn EntityStore, link: &LinkEntity) -> StoreResult<()> {
        let table = match self.table_of.get(&link.to_entity) {
            Some(&table) => table,
            None => {
                self.tables.push(store.scan(&link.to_entity)?);
                let table = self.tables.len() - 1;
                self.table_of.insert(link.to_entity.clone(), table);
                table
            }
        };

        let alias = link.effective_alias().to_string();
        self.link_of.insert(alias.clone(), self.links.len());
        self.links.push(LinkSlot {
            alias,
            table,
            columns: link.columns.clone(),
        });

        for nested in &link.links {
            self.register(store, nested)?;
        }
        Ok(())
    }

    /// One binding per base row, in scan order
    pub fn base_bindings(&self) -> Vec<Binding> {
        (0..self.tables[0].len())
            .map(|base| Binding {
                base,
                joined: Vec::new(),
            })
            .collect()
    }

    /// Applies top-level links in order
    pub fn join(&self, bindings: Vec<Binding>, links: &[LinkEntity], evaluator: &FilterEvaluator<'_>) -> Vec<Binding> {
        links.iter().fold(bindings, |bindings, link| {
            self.apply_link(bindings, None, link, evaluator)
        })
    }

    fn apply_link(
        &self,
        bindings: Vec<Binding>,
        parent: Option<usize>,
        link: &LinkEntity,
        evaluator: &FilterEvaluator<'_>,
    ) -> Vec<Binding> {
        let link_id = match self.link_of.get(link.effective_alias()) {
            Some(&id) => id,
            None => return bindings,
        };
        let targets = &self.tables[self.links[link_id].table];

        let mut out = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let mut matched: Vec<Binding> = match self.parent_value(&binding, parent, &link.from_attribute) {
                Some(key) => targets
                    .iter()
                    .enumerate()
                    .filter(|(_, target)| {
                        target
                            .get(&link.to_attribute)
                            .map_or(false, |value| values_equal(key, value))
                    })
                    .map(|(row, _)| binding.extended(link_id, row))
                    .collect(),
                None => Vec::new(),
            };

            for nested in &link.links {
                matched = self.apply_link(matched, Some(link_id), nested, evaluator);
            }
            matched.retain(|candidate| evaluator.matches(&self.row(candidate), &link.criteria));

            if matched.is_empty() && link.join == JoinOperator::LeftOuter {
                out.push(binding);
            } else {
                out.extend(matched);
            }
        }
        out
    }

    fn parent_value<'a>(&'a self, binding: &Binding, parent: Option<usize>, attribute: &str) -> Option<&'a Value> {
        let record = match parent {
            None => &self.tables[0][binding.base],
            Some(link) => &self.tables[self.links[link].table][binding.row_for(link)?],
        };
        record.get(attribute).filter(|v| !v.is_null())
    }

    /// View of a binding for condition evaluation
    pub fn row<'a>(&'a self, binding: &'a Binding) -> BoundRow<'a> {
        BoundRow {
            arena: self,
            binding,
        }
    }

    /// Copies a binding out as a flat record. Joined columns are keyed
    /// `alias.attribute` and limited to the link's column set.
    pub fn materialize(&self, binding: &Binding) -> Record {
        let mut record = self.tables[0][binding.base].clone();
        for &(link, row) in &binding.joined {
            let slot = &self.links[link];
            let joined = &self.tables[slot.table][row];
            for (attribute, value) in &joined.attributes {
                if slot.columns.contains(attribute) {
                    record
                        .attributes
                        .insert(format!("{}.{}", slot.alias, attribute), value.clone());
                }
            }
        }
        record
    }

    /// Logical name behind each link alias
    pub fn alias_entities(&self) -> HashMap<String, String> {
        let entity_of_table: HashMap<usize, &String> =
            self.table_of.iter().map(|(name, &table)| (table, name)).collect();
        self.links
            .iter()
            .filter_map(|slot| {
                let entity = entity_of_table.get(&slot.table)?;
                Some((slot.alias.clone(), (*entity).clone()))
            })
            .collect()
    }
}

/// Binding seen through the arena. Alias-qualified keys read the joined
/// row in full, regardless of the link's column set.
pub struct BoundRow<'a> {
    arena: &'a JoinArena,
    binding: &'a Binding,
}

impl AttributeSource for BoundRow<'_> {
    fn attribute(&self, key: &str) -> Option<&Value> {
        match key.split_once('.') {
            Some((alias, attribute)) => {
                let link = *self.arena.link_of.get(alias)?;
                let row = self.binding.row_for(link)?;
                self.arena.tables[self.arena.links[link].table][row].get(attribute)
            }
            None => self.arena.tables[0][self.binding.base].get(key),
        }
    }
}
