//! Metadata error types
//!
//! Error codes:
//! - MIRROR_UNKNOWN_ENTITY (REJECT)
//! - MIRROR_DUPLICATE_ENTITY (REJECT)
//! - MIRROR_MALFORMED_METADATA (FATAL)

use std::fmt;

/// Severity levels for metadata errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Caller request rejected
    Reject,
    /// Catalog cannot be built; the session must not start
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Reject => write!(f, "REJECT"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

/// Metadata-specific error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataErrorCode {
    /// Logical name not present in the catalog
    UnknownEntity,
    /// A table schema with the same logical name is already registered
    DuplicateEntity,
    /// Schema file or structure is invalid
    MalformedMetadata,
}

impl MetadataErrorCode {
    /// Returns the stable string code
    pub fn code(&self) -> &'static str {
        match self {
            MetadataErrorCode::UnknownEntity => "MIRROR_UNKNOWN_ENTITY",
            MetadataErrorCode::DuplicateEntity => "MIRROR_DUPLICATE_ENTITY",
            MetadataErrorCode::MalformedMetadata => "MIRROR_MALFORMED_METADATA",
        }
    }

    /// Returns the severity level for this error
    pub fn severity(&self) -> Severity {
        match self {
            MetadataErrorCode::MalformedMetadata => Severity::Fatal,
            _ => Severity::Reject,
        }
    }
}

impl fmt::Display for MetadataErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Metadata error with context
#[derive(Debug)]
pub struct MetadataError {
    code: MetadataErrorCode,
    message: String,
    logical_name: Option<String>,
}

impl MetadataError {
    /// Create an unknown entity error
    pub fn unknown_entity(logical_name: impl Into<String>) -> Self {
        let name = logical_name.into();
        Self {
            code: MetadataErrorCode::UnknownEntity,
            message: format!("No entity metadata found for logical name '{}'", name),
            logical_name: Some(name),
        }
    }

    /// Create a duplicate registration error
    pub fn duplicate_entity(logical_name: impl Into<String>) -> Self {
        let name = logical_name.into();
        Self {
            code: MetadataErrorCode::DuplicateEntity,
            message: format!("Entity metadata for '{}' is already registered", name),
            logical_name: Some(name),
        }
    }

    /// Create an error for a malformed schema file or structure
    pub fn malformed(source: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: MetadataErrorCode::MalformedMetadata,
            message: format!("Malformed metadata '{}': {}", source.into(), reason.into()),
            logical_name: None,
        }
    }

    /// Returns the error code
    pub fn code(&self) -> MetadataErrorCode {
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

    /// Returns the logical name involved, if any
    pub fn logical_name(&self) -> Option<&str> {
        self.logical_name.as_deref()
    }

    /// Returns whether this is a fatal error
    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for MetadataError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.code.severity(), self.code.code(), self.message)
    }
}

impl std::error::Error for MetadataError {}

/// Result type for metadata operations
pub type MetadataResult<T> = Result<T, MetadataError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(MetadataErrorCode::UnknownEntity.code(), "MIRROR_UNKNOWN_ENTITY");
        assert_eq!(MetadataErrorCode::DuplicateEntity.code(), "MIRROR_DUPLICATE_ENTITY");
        assert_eq!(MetadataErrorCode::MalformedMetadata.code(), "MIRROR_MALFORMED_METADATA");
    }

    #[test]
    fn test_malformed_is_fatal() {
        let err = MetadataError::malformed("account.json", "bad json");
        assert!(err.is_fatal());
        assert!(!MetadataError::unknown_entity("account").is_fatal());
    }

    #[test]
    fn test_display_carries_code() {
        let err = MetadataError::unknown_entity("lead");
        let display = format!("{}", err);
        assert!(display.contains("MIRROR_UNKNOWN_ENTITY"));
        assert!(display.contains("lead"));
        assert_eq!(err.logical_name(), Some("lead"));
    }
}
