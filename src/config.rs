//! Session configuration
//!
//! A JSON document selecting the backend, the fiscal calendar and where
//! metadata is loaded from. Every field is optional.
//!
//! ```json
//! {
//!   "backend": { "kind": "sqlite", "path": "mirror.db", "recreate": true },
//!   "fiscal": { "start_month": 4, "period": "quarterly" },
//!   "metadata_dir": "metadata"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::executor::FiscalCalendar;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Storage backend selection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BackendConfig {
    Memory,
    Sqlite {
        /// Database file; in-memory when absent
        #[serde(default)]
        path: Option<PathBuf>,
        /// Drop and recreate every table at startup
        #[serde(default = "default_recreate")]
        recreate: bool,
    },
}

fn default_recreate() -> bool {
    true
}

impl Default for BackendConfig {
    fn default() -> Self {
        BackendConfig::Memory
    }
}

/// Session configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub backend: BackendConfig,

    #[serde(default)]
    pub fiscal: FiscalCalendar,

    /// Directory of table schema files
    #[serde(default)]
    pub metadata_dir: Option<PathBuf>,

    /// Caller for user-relative operators and security checks
    #[serde(default)]
    pub caller_id: Option<Uuid>,

    #[serde(default)]
    pub business_unit_id: Option<Uuid>,
}

impl SessionConfig {
    /// Parses and validates a JSON document
    pub fn from_json_str(json: &str) -> ConfigResult<Self> {
        let config: SessionConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from file
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    fn validate(&self) -> ConfigResult<()> {
        if !(1..=12).contains(&self.fiscal.start_month) {
            return Err(ConfigError::Invalid(format!(
                "fiscal.start_month must be 1-12, got {}",
                self.fiscal.start_month
            )));
        }
        if let Some(dir) = &self.metadata_dir {
            if dir.as_os_str().is_empty() {
                return Err(ConfigError::Invalid("metadata_dir must not be empty".into()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::FiscalPeriodType;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_defaults() {
        let config = SessionConfig::from_json_str("{}").unwrap();
        assert_eq!(config.backend, BackendConfig::Memory);
        assert_eq!(config.fiscal, FiscalCalendar::default());
        assert!(config.metadata_dir.is_none());
    }

    #[test]
    fn test_sqlite_backend() {
        let config = SessionConfig::from_json_str(
            r#"{"backend": {"kind": "sqlite", "path": "mirror.db"},
                "fiscal": {"start_month": 7, "period": "monthly"}}"#,
        )
        .unwrap();
        assert_eq!(
            config.backend,
            BackendConfig::Sqlite {
                path: Some(PathBuf::from("mirror.db")),
                recreate: true,
            }
        );
        assert_eq!(config.fiscal.start_month, 7);
        assert_eq!(config.fiscal.period, FiscalPeriodType::Monthly);
    }

    #[test]
    fn test_invalid_start_month() {
        let err = SessionConfig::from_json_str(r#"{"fiscal": {"start_month": 13}}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, r#"{{"backend": {{"kind": "memory"}}}}"#).unwrap();
        let config = SessionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.backend, BackendConfig::Memory);

        let err = SessionConfig::from_file(Path::new("/nonexistent/mirror.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
