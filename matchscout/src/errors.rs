//! Error types for matchscout.
//!
//! Errors fall into two groups. Input-validation errors (empty root, empty
//! pattern, bad depth, bad regex, missing root) are returned synchronously by
//! [`ScanConfig::to_request`](crate::config::ScanConfig::to_request) and
//! [`ScanCoordinator::start`](crate::scan::ScanCoordinator::start) before any
//! worker exists. Everything that goes wrong while reading a single file is
//! still a `ScanError` inside the match task, but it is converted into a
//! [`FileOutcome::Failure`](crate::results::FileOutcome) and never reaches the
//! caller as an `Err`.
//!
//! ```rust,ignore
//! match coordinator.start(&config) {
//!     Ok(()) => { /* scan running */ }
//!     Err(e) if e.is_input_error() => eprintln!("{}", e),
//!     Err(e) => return Err(e),
//! }
//! ```
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for scan operations
pub type ScanResult<T> = Result<T, ScanError>;

/// Errors that can occur while configuring or running a scan
#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Path shouldn't be empty")]
    EmptyRoot,
    #[error("Regular expression shouldn't be empty")]
    EmptyPattern,
    #[error("Invalid max depth: {0}")]
    InvalidDepth(String),
    #[error("Invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("Root not found: {0}")]
    RootNotFound(PathBuf),
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
    #[error("Permission denied: {0}")]
    PermissionDenied(PathBuf),
    #[error("Configuration error: {0}")]
    ConfigError(String),
    #[error("Worker pool could not be started: {0}")]
    PoolStartup(String),
    #[error("Worker pool is shutting down")]
    PoolShutdown,
    #[error("Scan already started")]
    AlreadyStarted,
    #[error("Scan thread panicked")]
    ThreadPanicked,
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("Invalid UTF-8 in file {path}: {source}")]
    EncodingError {
        path: PathBuf,
        source: std::str::Utf8Error,
    },
}

impl ScanError {
    pub fn invalid_depth(msg: impl Into<String>) -> Self {
        Self::InvalidDepth(msg.into())
    }

    pub fn invalid_pattern(msg: impl Into<String>) -> Self {
        Self::InvalidPattern(msg.into())
    }

    pub fn root_not_found(path: impl Into<PathBuf>) -> Self {
        Self::RootNotFound(path.into())
    }

    pub fn not_a_directory(path: impl Into<PathBuf>) -> Self {
        Self::NotADirectory(path.into())
    }

    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound(path.into())
    }

    pub fn permission_denied(path: impl Into<PathBuf>) -> Self {
        Self::PermissionDenied(path.into())
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn pool_startup(msg: impl Into<String>) -> Self {
        Self::PoolStartup(msg.into())
    }

    pub fn encoding_error(path: impl Into<PathBuf>, source: std::str::Utf8Error) -> Self {
        Self::EncodingError {
            path: path.into(),
            source,
        }
    }

    /// Maps an I/O error raised while opening `path` to the most specific variant.
    pub fn from_io(path: &Path, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::file_not_found(path),
            std::io::ErrorKind::PermissionDenied => Self::permission_denied(path),
            _ => Self::IoError(err),
        }
    }

    /// Whether this error rejects a request before the scan starts.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            Self::ConfigError(_)
                | Self::EmptyRoot
                | Self::EmptyPattern
                | Self::InvalidDepth(_)
                | Self::InvalidPattern(_)
                | Self::RootNotFound(_)
                | Self::NotADirectory(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_error_creation() {
        let path = Path::new("test.txt");
        let err = ScanError::file_not_found(path);
        assert!(matches!(err, ScanError::FileNotFound(_)));

        let err = ScanError::permission_denied(path);
        assert!(matches!(err, ScanError::PermissionDenied(_)));

        let err = ScanError::invalid_pattern("unclosed group");
        assert!(matches!(err, ScanError::InvalidPattern(_)));

        let err = ScanError::invalid_depth("Depth is not a number");
        assert!(matches!(err, ScanError::InvalidDepth(_)));
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(ScanError::EmptyRoot.to_string(), "Path shouldn't be empty");
        assert_eq!(
            ScanError::EmptyPattern.to_string(),
            "Regular expression shouldn't be empty"
        );
        assert_eq!(
            ScanError::invalid_depth("Depth is not a number").to_string(),
            "Invalid max depth: Depth is not a number"
        );
        assert_eq!(
            ScanError::file_not_found("test.txt").to_string(),
            "File not found: test.txt"
        );
    }

    #[test]
    fn test_from_io_kind() {
        let path = Path::new("missing.txt");
        let err = ScanError::from_io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert!(matches!(err, ScanError::FileNotFound(_)));

        let err = ScanError::from_io(
            path,
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "nope"),
        );
        assert!(matches!(err, ScanError::PermissionDenied(_)));

        let err = ScanError::from_io(path, std::io::Error::new(std::io::ErrorKind::Other, "x"));
        assert!(matches!(err, ScanError::IoError(_)));
    }

    #[test]
    fn test_input_error_classification() {
        assert!(ScanError::EmptyRoot.is_input_error());
        assert!(ScanError::invalid_pattern("(").is_input_error());
        assert!(ScanError::not_a_directory("file.txt").is_input_error());
        assert!(!ScanError::file_not_found("a").is_input_error());
        assert!(!ScanError::PoolShutdown.is_input_error());
    }
}
