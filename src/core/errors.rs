//! SEN-prefixed error types with structured error codes.

#![allow(missing_docs)]

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Shared `Result` alias for the project.
pub type Result<T> = std::result::Result<T, SentinelError>;

/// Top-level error type for the invariant sentinel.
#[derive(Debug, Error)]
pub enum SentinelError {
    #[error("[SEN-1001] invalid configuration: {details}")]
    InvalidConfig { details: String },

    #[error("[SEN-1002] missing configuration file: {path}")]
    MissingConfig { path: PathBuf },

    #[error("[SEN-1003] configuration parse failure in {context}: {details}")]
    ConfigParse {
        context: &'static str,
        details: String,
    },

    #[error("[SEN-2001] snapshot failure: {details}")]
    Snapshot { details: String },

    #[error("[SEN-2101] serialization failure in {context}: {details}")]
    Serialization {
        context: &'static str,
        details: String,
    },

    #[error("[SEN-2102] SQL failure in {context}: {details}")]
    Sql {
        context: &'static str,
        details: String,
    },

    #[error("[SEN-2103] store unavailable at {path}: {details}")]
    StoreUnavailable { path: PathBuf, details: String },

    #[error("[SEN-2201] invariant registration rejected for '{name}': {reason}")]
    Registration { name: String, reason: String },

    #[error("[SEN-2202] invariant '{invariant}' failed: {details}")]
    Predicate { invariant: String, details: String },

    #[error("[SEN-2301] invalid lifecycle transition: {details}")]
    Lifecycle { details: String },

    #[error("[SEN-3001] report sink '{sink}' failed: {details}")]
    Sink { sink: &'static str, details: String },

    #[error("[SEN-3002] IO failure at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("[SEN-3003] channel closed in component {component}")]
    ChannelClosed { component: &'static str },

    #[error("[SEN-3900] runtime failure: {details}")]
    Runtime { details: String },
}

impl SentinelError {
    /// Stable machine-parseable error code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::InvalidConfig { .. } => "SEN-1001",
            Self::MissingConfig { .. } => "SEN-1002",
            Self::ConfigParse { .. } => "SEN-1003",
            Self::Snapshot { .. } => "SEN-2001",
            Self::Serialization { .. } => "SEN-2101",
            Self::Sql { .. } => "SEN-2102",
            Self::StoreUnavailable { .. } => "SEN-2103",
            Self::Registration { .. } => "SEN-2201",
            Self::Predicate { .. } => "SEN-2202",
            Self::Lifecycle { .. } => "SEN-2301",
            Self::Sink { .. } => "SEN-3001",
            Self::Io { .. } => "SEN-3002",
            Self::ChannelClosed { .. } => "SEN-3003",
            Self::Runtime { .. } => "SEN-3900",
        }
    }

    /// Whether retrying might resolve the failure.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Io { .. }
                | Self::ChannelClosed { .. }
                | Self::Sql { .. }
                | Self::Sink { .. }
                | Self::Runtime { .. }
        )
    }

    /// Whether the failure means persisted data may be lost.
    ///
    /// These must be surfaced loudly instead of being absorbed like other
    /// harness-internal failures.
    #[must_use]
    pub const fn is_store_unavailable(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }

    /// Convenience constructor for IO errors with a known path.
    #[must_use]
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Convenience constructor for a predicate that reported its own failure.
    #[must_use]
    pub fn predicate(invariant: impl Into<String>, details: impl Into<String>) -> Self {
        Self::Predicate {
            invariant: invariant.into(),
            details: details.into(),
        }
    }
}

impl From<rusqlite::Error> for SentinelError {
    /// Storage-level failures (disk full, IO, corruption, permissions) become
    /// `StoreUnavailable` with an empty path; the store fills in its own path.
    fn from(value: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        if let rusqlite::Error::SqliteFailure(inner, _) = &value {
            if matches!(
                inner.code,
                ErrorCode::CannotOpen
                    | ErrorCode::ReadOnly
                    | ErrorCode::DiskFull
                    | ErrorCode::SystemIoFailure
                    | ErrorCode::DatabaseCorrupt
                    | ErrorCode::NotADatabase
                    | ErrorCode::PermissionDenied
            ) {
                return Self::StoreUnavailable {
                    path: PathBuf::new(),
                    details: value.to_string(),
                };
            }
        }
        Self::Sql {
            context: "rusqlite",
            details: value.to_string(),
        }
    }
}

impl From<serde_json::Error> for SentinelError {
    fn from(value: serde_json::Error) -> Self {
        Self::Serialization {
            context: "serde_json",
            details: value.to_string(),
        }
    }
}

impl From<toml::de::Error> for SentinelError {
    fn from(value: toml::de::Error) -> Self {
        Self::ConfigParse {
            context: "toml",
            details: value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_variants() -> Vec<SentinelError> {
        vec![
            SentinelError::InvalidConfig {
                details: String::new(),
            },
            SentinelError::MissingConfig {
                path: PathBuf::new(),
            },
            SentinelError::ConfigParse {
                context: "",
                details: String::new(),
            },
            SentinelError::Snapshot {
                details: String::new(),
            },
            SentinelError::Serialization {
                context: "",
                details: String::new(),
            },
            SentinelError::Sql {
                context: "",
                details: String::new(),
            },
            SentinelError::StoreUnavailable {
                path: PathBuf::new(),
                details: String::new(),
            },
            SentinelError::Registration {
                name: String::new(),
                reason: String::new(),
            },
            SentinelError::predicate("", ""),
            SentinelError::Lifecycle {
                details: String::new(),
            },
            SentinelError::Sink {
                sink: "",
                details: String::new(),
            },
            SentinelError::io("", std::io::Error::other("test")),
            SentinelError::ChannelClosed { component: "" },
            SentinelError::Runtime {
                details: String::new(),
            },
        ]
    }

    #[test]
    fn error_codes_are_unique() {
        let errors = all_variants();
        let codes: Vec<&str> = errors.iter().map(SentinelError::code).collect();
        let unique: std::collections::HashSet<&&str> = codes.iter().collect();
        assert_eq!(
            codes.len(),
            unique.len(),
            "error codes must be unique: {codes:?}"
        );
    }

    #[test]
    fn display_includes_code() {
        for err in all_variants() {
            let msg = err.to_string();
            assert!(
                msg.contains(err.code()),
                "display should contain error code {}: {msg}",
                err.code()
            );
        }
    }

    #[test]
    fn retryable_errors_are_correct() {
        assert!(SentinelError::ChannelClosed { component: "sync" }.is_retryable());
        assert!(
            SentinelError::Sink {
                sink: "webhook",
                details: String::new()
            }
            .is_retryable()
        );
        assert!(
            !SentinelError::InvalidConfig {
                details: String::new()
            }
            .is_retryable()
        );
        assert!(
            !SentinelError::Registration {
                name: "x".to_string(),
                reason: "dup".to_string()
            }
            .is_retryable()
        );
    }

    #[test]
    fn only_store_unavailable_is_flagged_as_data_loss() {
        for err in all_variants() {
            assert_eq!(
                err.is_store_unavailable(),
                err.code() == "SEN-2103",
                "unexpected data-loss flag for {}",
                err.code()
            );
        }
    }

    #[test]
    fn from_rusqlite_error() {
        let sql_err =
            rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(1), Some("test".to_string()));
        let err: SentinelError = sql_err.into();
        assert_eq!(err.code(), "SEN-2102");
    }

    #[test]
    fn storage_level_sqlite_failures_mean_store_unavailable() {
        // SQLITE_FULL
        let sql_err = rusqlite::Error::SqliteFailure(rusqlite::ffi::Error::new(13), None);
        let err: SentinelError = sql_err.into();
        assert_eq!(err.code(), "SEN-2103");
        assert!(err.is_store_unavailable());
    }

    #[test]
    fn from_serde_json_error() {
        let json_err = serde_json::from_str::<serde_json::Value>("not json").unwrap_err();
        let err: SentinelError = json_err.into();
        assert_eq!(err.code(), "SEN-2101");
    }

    #[test]
    fn from_toml_error() {
        let toml_err = toml::from_str::<toml::Value>("= invalid").unwrap_err();
        let err: SentinelError = toml_err.into();
        assert_eq!(err.code(), "SEN-1003");
    }
}
