//! Formatted-value errors
//!
//! Every variant is non-fatal: the row is returned without the label.

use thiserror::Error;
use uuid::Uuid;

/// Lookup resolution failures while computing labels
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormatError {
    #[error("Unknown option code {code} for {attribute}")]
    UnknownOptionCode { attribute: String, code: i32 },

    #[error("No currency for money attribute {attribute}")]
    MissingCurrency { attribute: String },

    #[error("Currency {id} for {attribute} not found")]
    UnresolvedCurrency { attribute: String, id: Uuid },
}

impl FormatError {
    /// Attribute key the label was for
    pub fn attribute(&self) -> &str {
        match self {
            FormatError::UnknownOptionCode { attribute, .. }
            | FormatError::MissingCurrency { attribute }
            | FormatError::UnresolvedCurrency { attribute, .. } => attribute,
        }
    }
}
