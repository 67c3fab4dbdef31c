//! # Memory Error Types
//!
//! All errors that can occur in the arena, the fixed-size pools, and the heap facade.

use thiserror::Error;

/// Errors that can occur in the memory system.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// No free block is large enough for the request, even after alignment.
    #[error("out of memory: requested {requested} bytes aligned to {align}")]
    OutOfMemory {
        /// Requested payload size.
        requested: usize,
        /// Requested payload alignment.
        align: usize,
    },

    /// A zero-byte allocation was requested.
    #[error("zero-sized allocation")]
    ZeroSized,

    /// The pointer does not refer to a live allocation.
    #[error("invalid pointer: offset {0}")]
    InvalidPointer(usize),

    /// A fixed-size sub-block was released twice.
    #[error("double free of sub-block at offset {0}")]
    DoubleFree(usize),

    /// Requested a byte range past the end of an allocation.
    #[error("access of {len} bytes at offset {offset} exceeds capacity {capacity}")]
    OutOfBounds {
        /// Payload offset.
        offset: usize,
        /// Requested length.
        len: usize,
        /// Capacity of the allocation.
        capacity: usize,
    },

    /// Operation is only valid on free blocks (or only on claimed ones).
    #[error("block at offset {offset} is in the wrong state: {reason}")]
    InvalidBlockState {
        /// Header offset of the block.
        offset: usize,
        /// What was expected.
        reason: &'static str,
    },

    /// The heap was entered again while its state was borrowed.
    #[error("heap re-entered while its bytes are borrowed")]
    Reentrant,

    /// Invalid configuration file.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Header or bookkeeping corruption detected.
    #[error("arena corrupted: {0}")]
    Corrupted(String),
}

/// Result type for memory operations.
pub type MemoryResult<T> = Result<T, MemoryError>;
