//! Entity store error types
//!
//! Error codes:
//! - MIRROR_DUPLICATE_KEY (REJECT)
//! - MIRROR_RECORD_NOT_FOUND (REJECT)
//! - MIRROR_MISSING_REFERENCED_RECORD (REJECT)
//! - MIRROR_MISSING_IDENTIFICATION (REJECT)
//! - MIRROR_UNKNOWN_ENTITY (REJECT)
//! - MIRROR_INVALID_ATTRIBUTE_VALUE (REJECT)
//! - MIRROR_BACKEND_FAILURE (ERROR)

use std::fmt;

use uuid::Uuid;

use crate::metadata::MetadataError;
use crate::value::CoercionError;

/// Severity levels for store errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Caller error, store state unchanged
    Reject,
    /// Backend failure
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Error => write!(f, "ERROR"),
        }
    }
}

/// Store-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreErrorCode {
    /// Insert of an id already present in the table
    DuplicateKey,
    /// Lookup, update or delete of a missing record
    RecordNotFound,
    /// Reference check failed during insert or update
    MissingReferencedRecord,
    /// Reference carries neither an id nor key attributes
    MissingIdentification,
    /// Table not declared in the catalog
    UnknownEntity,
    /// Attribute value rejected by coercion
    InvalidAttributeValue,
    /// Backend I/O or SQL failure
    Backend,
}

impl StoreErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            StoreErrorCode::DuplicateKey => "MIRROR_DUPLICATE_KEY",
            StoreErrorCode::RecordNotFound => "MIRROR_RECORD_NOT_FOUND",
            StoreErrorCode::MissingReferencedRecord => "MIRROR_MISSING_REFERENCED_RECORD",
            StoreErrorCode::MissingIdentification => "MIRROR_MISSING_IDENTIFICATION",
            StoreErrorCode::UnknownEntity => "MIRROR_UNKNOWN_ENTITY",
            StoreErrorCode::InvalidAttributeValue => "MIRROR_INVALID_ATTRIBUTE_VALUE",
            StoreErrorCode::Backend => "MIRROR_BACKEND_FAILURE",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            StoreErrorCode::Backend => Severity::Error,
            _ => Severity::Reject,
        }
    }
}

impl fmt::Display for StoreErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Store error with context
#[derive(Debug)]
pub struct StoreError {
    code: StoreErrorCode,
    message: String,
    entity: Option<String>,
    id: Option<Uuid>,
    source: Option<Box<dyn std::error::Error + Send + Sync + 'static>>,
}

impl StoreError {
    fn new(code: StoreErrorCode, message: String) -> Self {
        Self {
            code,
            message,
            entity: None,
            id: None,
            source: None,
        }
    }

    fn on(mut self, entity: &str, id: Option<Uuid>) -> Self {
        self.entity = Some(entity.to_string());
        self.id = id;
        self
    }

    /// Create a duplicate key error
    pub fn duplicate_key(entity: &str, id: Uuid) -> Self {
        Self::new(
            StoreErrorCode::DuplicateKey,
            format!("A record with id {} already exists in '{}'", id, entity),
        )
        .on(entity, Some(id))
    }

    /// Create a record not found error
    pub fn record_not_found(entity: &str, id: Uuid) -> Self {
        Self::new(
            StoreErrorCode::RecordNotFound,
            format!("'{}' with id {} does not exist", entity, id),
        )
        .on(entity, Some(id))
    }

    /// Create a not found error for a natural-key lookup
    pub fn record_not_found_by_keys(entity: &str, keys: &str) -> Self {
        Self::new(
            StoreErrorCode::RecordNotFound,
            format!("'{}' with keys [{}] does not exist", entity, keys),
        )
        .on(entity, None)
    }

    /// Create a missing referenced record error
    pub fn missing_referenced_record(attribute: &str, entity: &str, id: Uuid) -> Self {
        Self::new(
            StoreErrorCode::MissingReferencedRecord,
            format!(
                "Attribute '{}' references '{}' with id {} which does not exist",
                attribute, entity, id
            ),
        )
        .on(entity, Some(id))
    }

    /// Create a missing identification error
    pub fn missing_identification(entity: &str) -> Self {
        Self::new(
            StoreErrorCode::MissingIdentification,
            format!("Reference to '{}' has neither an id nor key attributes", entity),
        )
        .on(entity, None)
    }

    /// Create an unknown entity error
    pub fn unknown_entity(entity: &str) -> Self {
        Self::new(
            StoreErrorCode::UnknownEntity,
            format!("No entity metadata found for logical name '{}'", entity),
        )
        .on(entity, None)
    }

    /// Create an invalid attribute value error
    pub fn invalid_attribute_value(entity: &str, source: CoercionError) -> Self {
        let mut err = Self::new(StoreErrorCode::InvalidAttributeValue, source.to_string()).on(entity, None);
        err.source = Some(Box::new(source));
        err
    }

    /// Create a backend failure error
    pub fn backend(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        let mut err = Self::new(StoreErrorCode::Backend, message.into());
        err.source = Some(Box::new(source));
        err
    }

    /// Create a backend failure error without a source
    pub fn backend_message(message: impl Into<String>) -> Self {
        Self::new(StoreErrorCode::Backend, message.into())
    }

    /// Returns the error code
    pub fn code(&self) -> StoreErrorCode {
        self.code
    }

    /// Returns the severity level
    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    /// Returns the error message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns the entity involved, if any
    pub fn entity(&self) -> Option<&str> {
        self.entity.as_deref()
    }

    /// Returns the record id involved, if any
    pub fn id(&self) -> Option<Uuid> {
        self.id
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)?;
        if let Some(ref source) = self.source {
            if self.code == StoreErrorCode::Backend {
                write!(f, " (caused by: {})", source)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        StoreError::backend("SQLite operation failed", err)
    }
}

impl From<MetadataError> for StoreError {
    fn from(err: MetadataError) -> Self {
        match err.logical_name() {
            Some(name) => StoreError::unknown_entity(name),
            None => StoreError::backend_message(err.to_string()),
        }
    }
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(StoreErrorCode::DuplicateKey.code(), "MIRROR_DUPLICATE_KEY");
        assert_eq!(StoreErrorCode::RecordNotFound.code(), "MIRROR_RECORD_NOT_FOUND");
        assert_eq!(StoreErrorCode::Backend.severity(), Severity::Error);
        assert_eq!(StoreErrorCode::MissingReferencedRecord.severity(), Severity::Reject);
    }

    #[test]
    fn test_error_context() {
        let id = Uuid::new_v4();
        let err = StoreError::record_not_found("account", id);
        assert_eq!(err.entity(), Some("account"));
        assert_eq!(err.id(), Some(id));
        assert!(err.to_string().contains("MIRROR_RECORD_NOT_FOUND"));
    }

    #[test]
    fn test_coercion_error_is_source() {
        use std::error::Error;

        let err = StoreError::invalid_attribute_value(
            "account",
            CoercionError::TooLong {
                attribute: "name".into(),
                max_length: 5,
            },
        );
        assert_eq!(err.code(), StoreErrorCode::InvalidAttributeValue);
        assert!(err.source().is_some());
    }
}
