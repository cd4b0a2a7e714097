//! Query execution
//!
//! # Execution Flow (strict order)
//!
//! 1. Normalize and validate the query
//! 2. Prefetch upstream rows for the base table
//! 3. Join linked tables and filter
//! 4. Apply the security filter
//! 5. Order, count, page
//! 6. Compute formatted values
//! 7. Project columns
//!
//! No partially filtered or partially ordered result is ever returned: any
//! structural error aborts the request.

mod calendar;
mod context;
mod engine;
mod filters;
mod joins;
mod result;
mod security;
mod sorter;

pub use calendar::{DateRange, FiscalCalendar, FiscalPeriodType};
pub use context::{EvaluationContext, CALLER_ENTITY};
pub use engine::QueryEngine;
pub(crate) use engine::project_columns;
pub use filters::{AttributeSource, FilterEvaluator};
pub use joins::{Binding, BoundRow, JoinArena};
pub use result::EntityCollection;
pub use security::{AccessRight, AllowAll, SecurityFilter};
pub use sorter::ResultSorter;
