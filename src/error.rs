// src/error.rs

use thiserror::Error;

/// Core error types for Prism
#[derive(Error, Debug)]
pub enum Error {
    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File extension is not one of the known archive kinds
    #[error("Unrecognized archive format: {0}")]
    UnrecognizedFormat(String),

    /// Recognized archive whose metadata could not be read
    #[error("Failed to extract metadata: {0}")]
    ExtractionError(String),

    /// A catalogued or leaf-recorded archive is no longer on disk
    #[error("Archive not found: {0}")]
    MissingFile(String),

    /// A catalog or leaf document could not be read or written
    #[error("Persistence error: {0}")]
    PersistenceError(String),

    /// Template rendering failed
    #[error("Render error: {0}")]
    RenderError(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Initialization of a service component failed
    #[error("Initialization error: {0}")]
    InitError(String),

    /// Path has no usable file name component
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Work was cancelled before it completed
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type alias using Prism's Error type
pub type Result<T> = std::result::Result<T, Error>;
