//! Formatted values
//!
//! Display labels derived from raw attribute values and their metadata:
//! option labels, boolean labels, money with its currency symbol, and
//! reference display names. Failures never abort a query; the row is
//! returned without the label.

mod errors;
mod lookup;
mod projector;

pub use errors::FormatError;
pub use lookup::LookupCache;
pub use projector::{
    FormattedValueProjector, RowLabels, CURRENCY_ATTRIBUTE, CURRENCY_ENTITY,
    CURRENCY_SYMBOL_ATTRIBUTE,
};
