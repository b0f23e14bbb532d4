//! Error types for kvpersist

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for kvpersist operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for kvpersist
#[derive(Error, Debug)]
pub enum Error {
    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to create directory '{path}': {source}")]
    DirectoryCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // -------------------------------------------------------------------------
    // Serialization Errors
    // -------------------------------------------------------------------------
    #[error("Failed to serialize data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to parse store contents: {0}")]
    Parse(String),

    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    #[error("Failed to open store '{name}': {reason}")]
    StoreOpen { name: String, reason: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Migration failed for '{key}': {reason}")]
    Migration { key: String, reason: String },

    // -------------------------------------------------------------------------
    // Configuration Errors
    // -------------------------------------------------------------------------
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid cache strategy: {0}")]
    InvalidCacheStrategy(String),

    #[error("An async platform store requires a running tokio runtime")]
    NoRuntime,
}

impl Error {
    /// Check if this error came from the filesystem
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(
            self,
            Error::FileRead { .. }
                | Error::FileWrite { .. }
                | Error::DirectoryCreate { .. }
        )
    }

    /// Check if this error was raised by a value migration
    #[must_use]
    pub fn is_migration(&self) -> bool {
        matches!(self, Error::Migration { .. })
    }
}

// =============================================================================
// Filesystem Helper Functions
// =============================================================================
// These reduce repetitive map_err patterns in the file-backed stores.

use std::path::Path;

/// Create a directory (and parents) with proper error handling
pub fn create_dir(path: &Path) -> Result<()> {
    std::fs::create_dir_all(path).map_err(|e| Error::DirectoryCreate {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Read a file to string, mapping a missing file to `None`
pub fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(Error::FileRead {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
