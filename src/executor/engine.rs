//! Query engine
//!
//! Execution flow (strict order):
//! 1. Normalize the input into a `QueryExpression`
//! 2. Validate its shape against the catalog
//! 3. Prefetch upstream rows for the base table
//! 4. Load the arena and apply links
//! 5. Apply the top-level filter
//! 6. Drop rows the caller cannot read
//! 7. Order
//! 8. Count
//! 9. Page
//! 10. Compute formatted values
//! 11. Project columns

use std::sync::Arc;

use super::context::EvaluationContext;
use super::filters::FilterEvaluator;
use super::joins::JoinArena;
use super::result::EntityCollection;
use super::security::{AccessRight, SecurityFilter};
use super::sorter::ResultSorter;
use crate::format::FormattedValueProjector;
use crate::observability::{log_event_with_fields, Event};
use crate::query::{normalize, validate, ColumnSet, PageInfo, QueryInput, QueryResult};
use crate::store::EntityStore;
use crate::value::Record;

/// Evaluates queries against a store
pub struct QueryEngine<'a> {
    store: &'a mut dyn EntityStore,
    security: &'a dyn SecurityFilter,
    ctx: &'a EvaluationContext,
}

impl<'a> QueryEngine<'a> {
    pub fn new(
        store: &'a mut dyn EntityStore,
        security: &'a dyn SecurityFilter,
        ctx: &'a EvaluationContext,
    ) -> Self {
        Self { store, security, ctx }
    }

    /// Executes a query. Structural failures abort the whole request.
    pub fn execute(&mut self, input: impl Into<QueryInput>) -> QueryResult<EntityCollection> {
        match self.run(input.into()) {
            Ok(collection) => {
                let rows = collection.len().to_string();
                let total = collection.total_record_count.to_string();
                log_event_with_fields(
                    Event::QueryExecuted,
                    &[
                        ("entity", collection.entity_name.as_str()),
                        ("rows", rows.as_str()),
                        ("total", total.as_str()),
                    ],
                );
                Ok(collection)
            }
            Err(err) => {
                log_event_with_fields(
                    Event::QueryRejected,
                    &[("code", err.code().code()), ("reason", err.message())],
                );
                Err(err)
            }
        }
    }

    fn run(&mut self, input: QueryInput) -> QueryResult<EntityCollection> {
        let query = normalize(input)?;
        let catalog = Arc::clone(self.store.catalog());
        let entity = validate(&query, &catalog)?.to_string();
        log_event_with_fields(Event::QueryReceived, &[("entity", entity.as_str())]);

        self.store.prefetch(&query)?;

        let evaluator = FilterEvaluator::new(self.ctx);
        let arena = JoinArena::load(&*self.store, &query, &entity)?;
        let bindings = arena.join(arena.base_bindings(), &query.links, &evaluator);

        let caller = self.ctx.caller();
        let mut records: Vec<Record> = bindings
            .iter()
            .filter(|binding| evaluator.matches(&arena.row(binding), &query.criteria))
            .map(|binding| arena.materialize(binding))
            .filter(|record| self.security.has_permission(record, AccessRight::Read, &caller))
            .collect();

        ResultSorter::sort(&mut records, &query.orders);

        let total = records.len();
        let (mut records, more_records) = paginate(records, &query.page_info);

        let aliases = arena.alias_entities();
        FormattedValueProjector::new(&catalog, &aliases).project(&*self.store, &mut records)?;

        for record in &mut records {
            project_columns(record, &query.columns);
        }

        Ok(EntityCollection {
            entity_name: entity,
            records,
            total_record_count: if query.page_info.return_total_count {
                total as i64
            } else {
                -1
            },
            more_records,
        })
    }
}

/// Slices the requested page. Returns the page and whether rows remain.
fn paginate(records: Vec<Record>, page_info: &PageInfo) -> (Vec<Record>, bool) {
    let count = match page_info.count {
        Some(count) if count > 0 => count,
        _ => return (records, false),
    };
    let page = page_info.page_number.unwrap_or(1).max(1);
    let start = (page - 1).saturating_mul(count);
    let more = records.len() > start.saturating_add(count);
    (records.into_iter().skip(start).take(count).collect(), more)
}

/// Keeps requested columns plus alias-qualified ones
pub(crate) fn project_columns(record: &mut Record, columns: &ColumnSet) {
    if let ColumnSet::All = columns {
        return;
    }
    record
        .attributes
        .retain(|key, _| key.contains('.') || columns.contains(key));
    let attributes = &record.attributes;
    record
        .formatted_values
        .retain(|key, _| attributes.contains_key(key));
}
