//! # OROBOROS Memory
//!
//! The engine's memory kernel: one buffer allocated at startup, subdivided into
//! headered blocks, with power-of-two pools for small objects.
//!
//! ## Architecture Rules
//!
//! 1. **One allocation at startup** - the arena is the only system allocation
//! 2. **Offsets, not addresses** - every handle is relative to the arena base
//! 3. **Single entry point** - callers go through [`Heap`], never the arena
//!
//! ## Example
//!
//! ```rust
//! use oroboros_memory::{Heap, MemoryConfig};
//!
//! let heap = Heap::new(MemoryConfig::new(4 * 1024 * 1024)).unwrap();
//! let small = heap.alloc(12).unwrap();
//! let large = heap.alloc(64 * 1024).unwrap();
//! heap.free(small).unwrap();
//! heap.free(large).unwrap();
//! heap.end_frame().unwrap();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod arena;
pub mod block;
pub mod config;
pub mod error;
pub mod fsa;
pub mod heap;

pub use arena::{AllocPolicy, ArenaStats, BlockArena, OwnedRegion};
pub use block::{align_down, align_up, BlockHeader, BlockInfo, BlockKind, BlockRef, Ptr, HEADER_SIZE};
pub use config::{FsaConfig, MemoryConfig};
pub use error::{MemoryError, MemoryResult};
pub use fsa::{class_index, class_size, FixedSizeAllocator, FsaClassStats, FSA_CLASS_COUNT};
pub use heap::{AllocOutcome, AllocRequest, AllocSource, Heap, HeapStats};
