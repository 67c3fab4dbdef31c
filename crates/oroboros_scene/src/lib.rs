//! # OROBOROS Scene
//!
//! Loads glTF 2.0 documents (`.gltf` text or `.glb` binary) into a single
//! arena block per scene.
//!
//! ## Architecture Rules
//!
//! 1. **Count, then fill** - pass 1 sizes every array, pass 2 writes into them
//! 2. **One block per scene** - a [`Gobj`] is relocatable bytes, never pointers
//! 3. **No document tree** - JSON is consumed as a token stream
//!
//! ## Example
//!
//! ```rust
//! use oroboros_memory::{Heap, MemoryConfig};
//! use oroboros_scene::{SceneArray, SceneLoader};
//!
//! let heap = Heap::new(MemoryConfig::new(1024 * 1024)).unwrap();
//! let loader = SceneLoader::new(&heap);
//! let scene = loader
//!     .load_bytes(br#"{"scenes": [{"nodes": [0]}], "nodes": [{"name": "root"}]}"#, None)
//!     .unwrap();
//! let nodes = scene.with(&heap, |gobj| gobj.used(SceneArray::Node)).unwrap();
//! assert_eq!(nodes, 1);
//! scene.release(&heap).unwrap();
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]

pub mod error;
pub mod gobj;
pub mod loader;
pub mod math;
pub mod scene;

pub use error::{SceneError, SceneResult};
pub use gobj::{Counts, Gobj, SceneArray};
pub use loader::{LoaderConfig, SceneLoader};
pub use scene::SceneHandle;
