//! Observable events
//!
//! Events are explicit and typed.

use std::fmt;

use super::logger::Severity;

/// Observable events in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    // Lifecycle
    /// Session configuration loaded
    ConfigLoaded,
    /// Metadata catalog loaded
    CatalogLoaded,
    /// Storage backend initialized
    BackendInitialized,
    /// Store snapshot taken
    SnapshotCreated,
    /// All rows cleared
    StoreReset,
    /// Access teams removed
    AccessTeamsReset,

    // Records
    /// Record inserted
    RecordCreated,
    /// Record replaced
    RecordUpdated,
    /// Record removed
    RecordDeleted,
    /// Record pulled from the upstream source
    UpstreamFetch,

    // Queries
    /// Query received
    QueryReceived,
    /// Query executed successfully
    QueryExecuted,
    /// Query rejected
    QueryRejected,
    /// A formatted value could not be computed
    FormatDegraded,
}

impl Event {
    /// Returns the event name for logging
    pub fn as_str(&self) -> &'static str {
        match self {
            Event::ConfigLoaded => "CONFIG_LOADED",
            Event::CatalogLoaded => "CATALOG_LOADED",
            Event::BackendInitialized => "BACKEND_INITIALIZED",
            Event::SnapshotCreated => "SNAPSHOT_CREATED",
            Event::StoreReset => "STORE_RESET",
            Event::AccessTeamsReset => "ACCESS_TEAMS_RESET",
            Event::RecordCreated => "RECORD_CREATED",
            Event::RecordUpdated => "RECORD_UPDATED",
            Event::RecordDeleted => "RECORD_DELETED",
            Event::UpstreamFetch => "UPSTREAM_FETCH",
            Event::QueryReceived => "QUERY_RECEIVED",
            Event::QueryExecuted => "QUERY_EXECUTED",
            Event::QueryRejected => "QUERY_REJECTED",
            Event::FormatDegraded => "FORMAT_DEGRADED",
        }
    }

    /// Returns the severity this event is logged at
    pub fn severity(&self) -> Severity {
        match self {
            Event::RecordCreated
            | Event::RecordUpdated
            | Event::RecordDeleted
            | Event::UpstreamFetch
            | Event::QueryReceived => Severity::Trace,
            Event::FormatDegraded => Severity::Warn,
            Event::QueryRejected => Severity::Error,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
