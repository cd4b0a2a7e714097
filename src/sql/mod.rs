//! SQL-backed storage variant
//!
//! Deterministic DDL from the metadata catalog and an `EntityStore`
//! implementation over SQLite.

pub mod ddl;
mod store;

pub use ddl::{ColumnDef, SqlType, TableDdl};
pub use store::SqlStore;
