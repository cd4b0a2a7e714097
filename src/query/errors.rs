//! Query error types
//!
//! Error codes:
//! - MIRROR_UNSUPPORTED_QUERY_SHAPE (REJECT)
//! - MIRROR_MALFORMED_FETCHXML (REJECT)
//! - store error codes, propagated unchanged

use std::fmt;

use crate::store::{StoreError, StoreErrorCode};

/// Query-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryErrorCode {
    /// Missing entity, too many orders, or another shape the engine declines
    UnsupportedQueryShape,
    /// FetchXML could not be parsed
    MalformedFetchXml,
    /// Store failure while evaluating
    Store(StoreErrorCode),
}

impl QueryErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            QueryErrorCode::UnsupportedQueryShape => "MIRROR_UNSUPPORTED_QUERY_SHAPE",
            QueryErrorCode::MalformedFetchXml => "MIRROR_MALFORMED_FETCHXML",
            QueryErrorCode::Store(code) => code.code(),
        }
    }
}

impl fmt::Display for QueryErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Query error with context
#[derive(Debug)]
pub struct QueryError {
    code: QueryErrorCode,
    message: String,
    store: Option<StoreError>,
}

impl QueryError {
    /// Create an unsupported query shape error
    pub fn unsupported_shape(reason: impl Into<String>) -> Self {
        Self {
            code: QueryErrorCode::UnsupportedQueryShape,
            message: reason.into(),
            store: None,
        }
    }

    /// Create a malformed FetchXML error
    pub fn malformed_fetch_xml(reason: impl Into<String>) -> Self {
        Self {
            code: QueryErrorCode::MalformedFetchXml,
            message: format!("Malformed FetchXML: {}", reason.into()),
            store: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> QueryErrorCode {
        self.code
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the underlying store error, if any
    pub fn store_error(&self) -> Option<&StoreError> {
        self.store.as_ref()
    }
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.store {
            Some(store) => write!(f, "{}", store),
            None => write!(f, "[REJECT] {}: {}", self.code.code(), self.message),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.store
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        Self {
            code: QueryErrorCode::Store(err.code()),
            message: err.message().to_string(),
            store: Some(err),
        }
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_error_codes() {
        assert_eq!(
            QueryError::unsupported_shape("no entity").code().code(),
            "MIRROR_UNSUPPORTED_QUERY_SHAPE"
        );
        assert_eq!(
            QueryError::malformed_fetch_xml("eof").code(),
            QueryErrorCode::MalformedFetchXml
        );
    }

    #[test]
    fn test_store_error_passthrough() {
        let err: QueryError = StoreError::record_not_found("account", Uuid::nil()).into();
        assert_eq!(err.code(), QueryErrorCode::Store(StoreErrorCode::RecordNotFound));
        assert_eq!(err.code().code(), "MIRROR_RECORD_NOT_FOUND");
        assert!(err.store_error().is_some());
    }
}
