//! Value Coercion Layer
//!
//! Generic attribute values, references and records, plus the conversions
//! between generic values and schema-declared semantic types.

pub mod coercion;
mod types;

pub use coercion::{align, coerce, coerce_record, compare, sort_compare, values_equal, CoercionError};
pub use types::{EntityReference, Record, Value};
