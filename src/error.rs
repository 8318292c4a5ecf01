//! Error handling for datavis-core
//!
//! This module defines the error type shared by the object model, the data
//! collections, the pipeline layer and the binary streams, plus a Result alias
//! for use throughout the crate.

use thiserror::Error;

/// Main error type for datavis-core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// A required data object is absent from a collection
    #[error("{}", missing_object_message(.type_name, .path))]
    MissingObject {
        type_name: String,
        path: Option<String>,
    },

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed stream contents
    #[error("Invalid file format at byte {position}: {message}")]
    Format { message: String, position: u64 },

    /// A chunk with a different id than the caller expected
    #[error(
        "Invalid file structure at byte {position}: expected chunk 0x{expected:X}, found chunk 0x{found:X}"
    )]
    UnexpectedChunk {
        expected: u32,
        found: u32,
        position: u64,
    },

    /// The reader consumed more bytes than the enclosing chunk holds
    #[error("Read past end of chunk 0x{chunk_id:X} (stream position {position}, chunk end {end})")]
    ReadPastChunkEnd { chunk_id: u32, position: u64, end: u64 },

    /// The file was written by a newer version of the format
    #[error("Unsupported file format version {found}; this build reads versions up to {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },

    /// The stream references a class that is not registered
    #[error("Unknown object class '{0}'")]
    UnknownClass(String),

    /// The stream references an object id with no table entry
    #[error("Unresolved object reference #{0}")]
    UnresolvedReference(u64),

    /// Misuse of a stream writer or reader state machine
    #[error("Stream error: {0}")]
    Stream(String),

    /// A data object failed a consistency check
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A pipeline stage failed
    #[error("Evaluation error: {0}")]
    Evaluation(String),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<CoreError>,
    },
}

fn missing_object_message(type_name: &str, path: &Option<String>) -> String {
    match path {
        Some(path) => format!("No '{type_name}' data object named '{path}' in data collection."),
        None => format!("The dataset does not contain an object of type: {type_name}"),
    }
}

impl CoreError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        CoreError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Error for a lookup by type that found nothing
    pub fn missing_object(type_name: impl Into<String>) -> Self {
        CoreError::MissingObject {
            type_name: type_name.into(),
            path: None,
        }
    }

    /// Error for a lookup by type and path that found nothing
    pub fn missing_object_at(type_name: impl Into<String>, path: impl Into<String>) -> Self {
        CoreError::MissingObject {
            type_name: type_name.into(),
            path: Some(path.into()),
        }
    }

    /// Create a format error at the given stream position
    pub fn format(message: impl Into<String>, position: u64) -> Self {
        CoreError::Format {
            message: message.into(),
            position,
        }
    }

    /// Returns true if this error (or the error it wraps) is a missing-object error
    pub fn is_missing_object(&self) -> bool {
        match self {
            CoreError::MissingObject { .. } => true,
            CoreError::WithContext { source, .. } => source.is_missing_object(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

/// Result type alias for datavis-core operations
pub type Result<T> = std::result::Result<T, CoreError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context lazily to an error result
    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| e.with_context(f()))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, std::io::Error> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| CoreError::Io(e).with_context(context))
    }

    fn with_context<F>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| CoreError::Io(e).with_context(f()))
    }
}
