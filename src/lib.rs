//! mirrordb - an in-process, metadata-driven entity store and query engine
//!
//! Records are typed by a runtime-loaded metadata catalog, held by an
//! in-memory or SQLite backend, and queried with filter trees, joins,
//! ordering, paging and formatted-value labels, without a server.

pub mod config;
pub mod executor;
pub mod format;
pub mod metadata;
pub mod observability;
pub mod query;
pub mod session;
pub mod sql;
pub mod store;
pub mod value;

pub use config::{BackendConfig, ConfigError, SessionConfig};
pub use executor::{AccessRight, EntityCollection, SecurityFilter};
pub use metadata::{AttributeSchema, AttributeType, MetadataCatalog, TableSchema};
pub use query::{ColumnSet, ConditionExpression, ConditionOperator, QueryExpression, QueryInput};
pub use session::{Session, SessionBuilder};
pub use store::{EntityStore, StoreError, StoreErrorCode};
pub use value::{EntityReference, Record, Value};
