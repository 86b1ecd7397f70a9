//! Error types for filedrop.

use thiserror::Error;

/// Common error type for filedrop.
#[derive(Error, Debug)]
pub enum FiledropError {
    /// A client-supplied path is unusable (traversal, absolute, empty).
    #[error("invalid path: {0}")]
    InvalidPath(String),

    /// Validation error for user input or configuration values.
    #[error("validation error: {0}")]
    Validation(String),

    /// Resource not found.
    #[error("{0} not found")]
    NotFound(String),

    /// I/O error tied to a specific file or directory.
    #[error("I/O error on {path}: {source}")]
    File {
        /// Relative (or absolute, for startup errors) path of the offending entry.
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The metadata backing file could not be encoded or decoded.
    #[error("metadata error: {0}")]
    Metadata(String),

    /// Template error.
    #[error("template error: {0}")]
    Template(#[from] crate::template::TemplateError),

    /// Volume statistics could not be determined.
    #[error("storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

impl FiledropError {
    /// Wrap an I/O error with the path it happened on.
    pub fn file(path: impl Into<String>, source: std::io::Error) -> Self {
        FiledropError::File {
            path: path.into(),
            source,
        }
    }

    /// Whether this error was caused by the client's input rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            FiledropError::InvalidPath(_) | FiledropError::Validation(_)
        )
    }
}

impl From<serde_json::Error> for FiledropError {
    fn from(e: serde_json::Error) -> Self {
        FiledropError::Metadata(e.to_string())
    }
}

/// Result type alias for filedrop operations.
pub type Result<T> = std::result::Result<T, FiledropError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_path_display() {
        let err = FiledropError::InvalidPath("../etc/passwd".to_string());
        assert_eq!(err.to_string(), "invalid path: ../etc/passwd");
    }

    #[test]
    fn test_not_found_display() {
        let err = FiledropError::NotFound("notes.txt".to_string());
        assert_eq!(err.to_string(), "notes.txt not found");
    }

    #[test]
    fn test_file_error_mentions_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err = FiledropError::file("docs/a.txt", io_err);
        assert!(err.to_string().contains("docs/a.txt"));
        assert!(err.to_string().contains("denied"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: FiledropError = io_err.into();
        assert!(matches!(err, FiledropError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err: FiledropError = json_err.into();
        assert!(matches!(err, FiledropError::Metadata(_)));
    }

    #[test]
    fn test_is_client_error() {
        assert!(FiledropError::InvalidPath("x".into()).is_client_error());
        assert!(FiledropError::Validation("x".into()).is_client_error());
        assert!(!FiledropError::NotFound("x".into()).is_client_error());
        assert!(!FiledropError::Storage("x".into()).is_client_error());
    }
}
