//! # Scene Error Types
//!
//! All errors that can occur while building, loading, or relocating a scene.

use std::path::PathBuf;

use oroboros_memory::MemoryError;
use thiserror::Error;

use crate::gobj::SceneArray;

/// Errors that can occur in the scene system.
#[derive(Error, Debug)]
pub enum SceneError {
    /// The arena could not serve the scene block.
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    /// The JSON token stream is malformed.
    #[error("parse error at line {line}, column {column} (byte {offset}): {message}")]
    Parse {
        /// 1-based line.
        line: usize,
        /// 1-based column.
        column: usize,
        /// Byte offset into the JSON chunk.
        offset: usize,
        /// Parser message.
        message: String,
    },

    /// The binary container header or chunk tags are wrong.
    #[error("malformed container: {0}")]
    Container(String),

    /// A chunk's declared length disagrees with the bytes present.
    #[error("chunk size mismatch: declared {declared} bytes, found {actual}")]
    ChunkSizeMismatch {
        /// Length the header declares.
        declared: usize,
        /// Length actually available.
        actual: usize,
    },

    /// A referenced file could not be read.
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        /// Resolved path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// A push went past the reserved capacity of an array.
    #[error("{array} capacity of {capacity} exceeded")]
    CapacityExceeded {
        /// The full array.
        array: SceneArray,
        /// Its reserved capacity.
        capacity: usize,
    },

    /// An index in the document points outside its target array.
    #[error("{array} index {index} is out of range")]
    InvalidReference {
        /// Target array.
        array: SceneArray,
        /// Offending index.
        index: u64,
    },

    /// A value has the wrong type or range for its position.
    #[error("invalid value at {path}: {message}")]
    InvalidValue {
        /// Document path of the value.
        path: String,
        /// What was wrong.
        message: String,
    },

    /// An inline data URI is not valid base64.
    #[error("invalid data uri: {0}")]
    Base64(#[from] base64::DecodeError),

    /// A buffer has neither a uri nor an embedded binary chunk.
    #[error("buffer {index} has no data source")]
    MissingBufferData {
        /// Buffer index.
        index: usize,
    },

    /// Pass 2 filled a different number of entries than pass 1 counted.
    #[error("pass 2 produced {actual} {array} entries, pass 1 counted {expected}")]
    CountMismatch {
        /// Disagreeing array.
        array: SceneArray,
        /// Pass 1 count.
        expected: usize,
        /// Pass 2 count.
        actual: usize,
    },

    /// The object graph header or a reference inside it is corrupt.
    #[error("scene graph invariant violated: {0}")]
    Invariant(String),
}

/// Result type for scene operations.
pub type SceneResult<T> = Result<T, SceneError>;
