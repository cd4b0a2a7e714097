//! Metadata Catalog subsystem
//!
//! Entity metadata dictates the shape of every record: which attributes a
//! table declares, their semantic types and their constraints.
//!
//! # Design Principles
//!
//! - Read-only after load
//! - Passed explicitly (`Arc<MetadataCatalog>`) to every component
//! - Structural validation at registration time

mod catalog;
mod errors;
mod types;

pub use catalog::MetadataCatalog;
pub use errors::{MetadataError, MetadataErrorCode, MetadataResult};
pub use types::{
    AttributeSchema, AttributeType, BooleanLabels, OptionMetadata, TableSchema,
    DEFAULT_DECIMAL_PRECISION, DEFAULT_STRING_LENGTH,
};
