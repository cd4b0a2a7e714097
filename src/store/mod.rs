//! Entity Store subsystem
//!
//! The sole mutation path for records. Two backends implement the same
//! `EntityStore` contract:
//! - `MemoryStore`: hash-indexed row arenas, optionally backed by an upstream source
//! - `sql::SqlStore`: one SQLite table per entity
//!
//! # Invariants
//!
//! - Exactly one record per (table, id)
//! - Inserting an existing id fails with `DuplicateKey`
//! - Reads return detached copies

mod backend;
mod errors;
mod memory;
mod table;
mod upstream;

pub use backend::EntityStore;
pub(crate) use backend::prepare_record;
pub use errors::{Severity, StoreError, StoreErrorCode, StoreResult};
pub use memory::MemoryStore;
pub use table::Table;
pub use upstream::{StaticUpstream, UpstreamSource};

use uuid::Uuid;

use crate::observability::{log_event_with_fields, Event, Logger};

/// Logs a per-record event, skipping formatting when the level is off
pub(crate) fn trace_record(event: Event, entity: &str, id: Uuid) {
    if Logger::enabled(event.severity()) {
        let id = id.to_string();
        log_event_with_fields(event, &[("entity", entity), ("id", &id)]);
    }
}
