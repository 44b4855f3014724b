// Error types for leveltree
// Every failure is surfaced to the caller as a typed error; nothing is retried

use std::error::Error;
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

/// Main error type for leveltree operations
#[derive(Debug)]
pub enum LevelTreeError {
    /// Operation attempted against a session that is not open
    StoreUnavailable {
        operation: &'static str,
        path: Option<PathBuf>,
    },

    /// Underlying store failed to open
    Open {
        path: PathBuf,
        source: io::Error,
    },

    /// Prefix could not be compiled into a match rule
    InvalidPattern {
        pattern: String,
        reason: String,
    },

    /// A single get/put/delete against the store failed.
    /// `committed` counts deletions already applied by a prune batch.
    PointOperation {
        operation: &'static str,
        key: String,
        committed: usize,
        source: io::Error,
    },

    /// Full-range iteration failed mid-pass
    Scan {
        source: io::Error,
    },

    /// Any other I/O failure
    Io {
        context: String,
        source: io::Error,
    },

    /// Router request could not be understood
    InvalidRequest {
        reason: String,
    },
}

impl fmt::Display for LevelTreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LevelTreeError::StoreUnavailable { operation, path: Some(path) } => {
                write!(f, "Cannot {}: database at '{}' is not open", operation, path.display())
            }

            LevelTreeError::StoreUnavailable { operation, path: None } => {
                write!(f, "Cannot {}: database is not open", operation)
            }

            LevelTreeError::Open { path, source } => {
                write!(f, "Failed to open database at '{}': {}", path.display(), source)
            }

            LevelTreeError::InvalidPattern { pattern, reason } => {
                write!(f, "Invalid prefix pattern '{}': {}", pattern, reason)
            }

            LevelTreeError::PointOperation { operation, key, committed: 0, source } => {
                write!(f, "Failed to {} key '{}': {}", operation, key, source)
            }

            LevelTreeError::PointOperation { operation, key, committed, source } => {
                write!(f, "Failed to {} key '{}' after {} deletions committed: {}",
                       operation, key, committed, source)
            }

            LevelTreeError::Scan { source } => {
                write!(f, "Database scan failed: {}", source)
            }

            LevelTreeError::Io { context, source } => {
                write!(f, "I/O error during {}: {}", context, source)
            }

            LevelTreeError::InvalidRequest { reason } => {
                write!(f, "Invalid request: {}", reason)
            }
        }
    }
}

impl Error for LevelTreeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            LevelTreeError::Open { source, .. }
            | LevelTreeError::PointOperation { source, .. }
            | LevelTreeError::Scan { source }
            | LevelTreeError::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl LevelTreeError {
    pub(crate) fn unavailable(operation: &'static str) -> Self {
        LevelTreeError::StoreUnavailable { operation, path: None }
    }

    /// Attach the storage path to a `StoreUnavailable` error
    pub(crate) fn at_path(self, at: &Path) -> Self {
        match self {
            LevelTreeError::StoreUnavailable { operation, path: None } => {
                LevelTreeError::StoreUnavailable { operation, path: Some(at.to_path_buf()) }
            }
            other => other,
        }
    }

    /// Record how many deletions a batch had committed before this failure
    pub(crate) fn with_committed(self, count: usize) -> Self {
        match self {
            LevelTreeError::PointOperation { operation, key, source, .. } => {
                LevelTreeError::PointOperation { operation, key, committed: count, source }
            }
            other => other,
        }
    }

    /// Deletions that were applied before the error, for partial prune failures
    pub fn committed(&self) -> usize {
        match self {
            LevelTreeError::PointOperation { committed, .. } => *committed,
            _ => 0,
        }
    }
}

/// Result type alias for leveltree operations
pub type Result<T> = std::result::Result<T, LevelTreeError>;

/// Helper trait for adding context to io::Errors
pub trait IoContext<T> {
    fn io_context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn io_context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| LevelTreeError::Io {
            context: context.into(),
            source: e,
        })
    }
}

/// Builder for point-operation failures
pub struct ErrorBuilder {
    error: LevelTreeError,
}

impl ErrorBuilder {
    pub fn point_failure(operation: &'static str, key: impl Into<String>, source: io::Error) -> Self {
        ErrorBuilder {
            error: LevelTreeError::PointOperation {
                operation,
                key: key.into(),
                committed: 0,
                source,
            },
        }
    }

    pub fn invalid_pattern(pattern: impl Into<String>) -> Self {
        ErrorBuilder {
            error: LevelTreeError::InvalidPattern {
                pattern: pattern.into(),
                reason: String::new(),
            },
        }
    }

    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        if let LevelTreeError::InvalidPattern { reason: r, .. } = &mut self.error {
            *r = reason.into();
        }
        self
    }

    pub fn build(self) -> LevelTreeError {
        self.error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LevelTreeError::StoreUnavailable {
            operation: "parse database",
            path: Some(PathBuf::from("/data/app.db")),
        };

        let msg = format!("{}", err);
        assert!(msg.contains("parse database"));
        assert!(msg.contains("/data/app.db"));
        assert!(msg.contains("not open"));
    }

    #[test]
    fn test_io_context() {
        let io_err = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let result: io::Result<()> = Err(io_err);

        let err = result.io_context("closing log").unwrap_err();
        let msg = format!("{}", err);
        assert!(msg.contains("closing log"));
        assert!(msg.contains("access denied"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_point_failure_with_committed() {
        let source = io::Error::new(io::ErrorKind::Other, "disk full");
        let err = ErrorBuilder::point_failure("delete", "users!bob", source)
            .build()
            .with_committed(3);

        assert_eq!(err.committed(), 3);
        let msg = format!("{}", err);
        assert!(msg.contains("users!bob"));
        assert!(msg.contains("3 deletions committed"));
        assert!(msg.contains("disk full"));
    }

    #[test]
    fn test_error_builder_pattern_reason() {
        let err = ErrorBuilder::invalid_pattern("(")
            .reason("unclosed group")
            .build();

        assert!(matches!(err, LevelTreeError::InvalidPattern { .. }));
        assert_eq!(format!("{}", err), "Invalid prefix pattern '(': unclosed group");
    }

    #[test]
    fn test_at_path_only_touches_unavailable() {
        let err = LevelTreeError::unavailable("get key").at_path(Path::new("db"));
        assert!(matches!(err, LevelTreeError::StoreUnavailable { path: Some(_), .. }));

        let other = LevelTreeError::InvalidRequest { reason: "x".into() }.at_path(Path::new("db"));
        assert!(matches!(other, LevelTreeError::InvalidRequest { .. }));
    }
}
