use std::path::{Path, PathBuf};

use thiserror::Error;

/// Error types for the indicator outside the media service.
///
/// Covers configuration loading, parsing and imports.
#[derive(Error, Debug)]
pub enum IndicatorError {
    /// Configuration validation error
    #[error("configuration validation failed for '{component}': {details}")]
    ConfigValidation {
        /// Component that failed validation
        component: String,
        /// Validation error details
        details: String,
    },

    /// I/O operation error
    #[error("I/O error on '{path}': {details}")]
    IoError {
        /// Path where I/O error occurred
        path: PathBuf,
        /// I/O error details
        details: String,
    },

    /// Standard I/O operation error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parsing error with location context
    #[error("failed to parse TOML at '{location}': {details}")]
    TomlParseError {
        /// Location of TOML being parsed (file path or "string")
        location: String,
        /// Parse error details
        details: String,
    },

    /// Import operation error with file context
    #[error("failed to import '{path}': {details}")]
    ImportError {
        /// Path of file being imported
        path: PathBuf,
        /// Import error details
        details: String,
    },

    /// The media service failed
    #[error(transparent)]
    Media(#[from] crate::services::MediaError),
}

/// A specialized `Result` type for indicator operations.
pub type Result<T> = std::result::Result<T, IndicatorError>;

impl IndicatorError {
    /// Creates a TOML parsing error with optional file path context.
    pub fn toml_parse(error: impl std::fmt::Display, path: Option<&Path>) -> Self {
        let location = match path {
            Some(p) => p
                .canonicalize()
                .unwrap_or_else(|_| p.to_path_buf())
                .to_string_lossy()
                .to_string(),
            None => "string".to_string(),
        };

        IndicatorError::TomlParseError {
            location,
            details: error.to_string(),
        }
    }

    /// Creates an import error with file path context.
    pub fn import(error: impl std::fmt::Display, path: &Path) -> Self {
        IndicatorError::ImportError {
            path: path.canonicalize().unwrap_or_else(|_| path.to_path_buf()),
            details: error.to_string(),
        }
    }
}
