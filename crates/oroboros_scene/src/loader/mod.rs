//! # Two-Pass Scene Loader
//!
//! ```text
//! bytes ──► container::split ──► pass 1 (Counter) ──► Counts
//!                                                       │ total_size
//!                                                       ▼
//!                                     Heap::alloc_region(SceneGraph)
//!                                                       │
//!                       Gobj::create ◄──────────────────┘
//!                            │
//!                  pass 2 (Scanner) ──► fixups ──► check_counts ──► validate
//! ```
//!
//! Pass 1 never writes; pass 2 never allocates. The block requested from the
//! heap is exactly what pass 2 fills.

pub mod container;
pub mod counter;
pub mod fixups;
pub mod rules;
pub mod scanner;
pub mod token;

use std::path::Path;

use oroboros_memory::{BlockKind, Heap};
use serde::{Deserialize, Serialize};

use crate::error::{SceneError, SceneResult};
use crate::gobj::{Counts, Gobj, SceneArray};
use crate::scene::SceneHandle;

pub use container::Container;
pub use counter::count;

/// Loader options.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Alignment of every Gobj region.
    pub gobj_align: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { gobj_align: 16 }
    }
}

/// Loads scene documents into arena blocks of one heap.
pub struct SceneLoader<'h> {
    heap: &'h Heap,
    config: LoaderConfig,
}

impl<'h> SceneLoader<'h> {
    /// Loader with default options.
    #[must_use]
    pub fn new(heap: &'h Heap) -> Self {
        Self::with_config(heap, LoaderConfig::default())
    }

    /// Loader with explicit options.
    #[must_use]
    pub const fn with_config(heap: &'h Heap, config: LoaderConfig) -> Self {
        Self { heap, config }
    }

    /// Options in use.
    #[must_use]
    pub const fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Runs pass 1 only.
    ///
    /// # Errors
    ///
    /// Returns container and parse errors.
    pub fn measure(&self, data: &[u8]) -> SceneResult<Counts> {
        count(container::split(data)?.json)
    }

    /// Loads a document from memory. External buffers resolve against
    /// `base_dir`, or the working directory when `None`.
    ///
    /// # Errors
    ///
    /// Returns the first container, parse, memory, I/O or validation error.
    /// The block is released before returning an error.
    pub fn load_bytes(&self, data: &[u8], base_dir: Option<&Path>) -> SceneResult<SceneHandle> {
        let container = container::split(data)?;
        let counts = count(container.json)?;
        let align = self.config.gobj_align;
        let size = counts.total_size(align)?;

        let region = self.heap.alloc_region(size, align, BlockKind::SceneGraph).map_err(|error| {
            tracing::warn!("no {} byte block for scene: {}", size, error);
            SceneError::from(error)
        })?;

        let built = self
            .heap
            .with_region_mut(&region, |bytes| materialize(bytes, &container, &counts, base_dir, align))
            .map_err(SceneError::from)
            .and_then(|result| result);

        match built {
            Ok(()) => {
                tracing::info!("scene loaded: {} bytes, {} nodes", size, counts.get(SceneArray::Node));
                Ok(SceneHandle::from_region(region))
            }
            Err(error) => {
                tracing::error!("scene load aborted: {}", error);
                if let Err(release) = self.heap.free_region(&region) {
                    tracing::error!("failed to release aborted scene block: {}", release);
                }
                Err(error)
            }
        }
    }

    /// Loads a file; external buffers resolve against its directory.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read, otherwise as [`Self::load_bytes`].
    pub fn load_file(&self, path: impl AsRef<Path>) -> SceneResult<SceneHandle> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|source| SceneError::Io { path: path.to_path_buf(), source })?;
        self.load_bytes(&data, path.parent())
    }
}

/// Pass 2 and everything after it, inside the scene block.
fn materialize(
    bytes: &mut [u8],
    container: &Container<'_>,
    counts: &Counts,
    base_dir: Option<&Path>,
    align: usize,
) -> SceneResult<()> {
    let mut gobj = Gobj::create(bytes, counts, align)?;
    token::drive(container.json, &mut scanner::Scanner::new(&mut gobj, container.bin, base_dir))?;
    fixups::apply(&mut gobj)?;
    gobj.check_counts(counts)?;
    gobj.validate()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gobj::{BufferView, Node, NodeId};
    use oroboros_memory::MemoryConfig;

    const TRIANGLE: &str = r#"{
        "asset": {"version": "2.0"},
        "scene": 0,
        "scenes": [{"nodes": [0]}],
        "nodes": [{"mesh": 0, "name": "tri"}],
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
        "accessors": [{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3"}],
        "bufferViews": [{"buffer": 0, "byteLength": 36}],
        "buffers": [{"byteLength": 36, "uri": "data:application/octet-stream;base64,AAAAAAAAAAAAAAAAAACAPwAAAAAAAAAAAAAAAAAAgD8AAAAA"}]
    }"#;

    #[test]
    fn test_load_triangle() {
        let heap = Heap::new(MemoryConfig::new(1 << 20)).unwrap();
        let loader = SceneLoader::new(&heap);
        let scene = loader.load_bytes(TRIANGLE.as_bytes(), None).unwrap();

        scene
            .with(&heap, |gobj| {
                let node: Node = gobj.get(NodeId(0)).unwrap();
                assert_eq!(gobj.name_of(node.name), "tri");
                assert!(node.has_mesh());
                assert_eq!(gobj.used(SceneArray::RawData), 36);
                let view: BufferView = gobj.element(0).unwrap();
                assert_eq!(view.byte_stride, 12);
            })
            .unwrap();
        scene.release(&heap).unwrap();
        heap.validate().unwrap();
    }

    #[test]
    fn test_failed_load_releases_block() {
        let heap = Heap::new(MemoryConfig::new(1 << 20)).unwrap();
        let before = heap.stats().unwrap();
        let loader = SceneLoader::new(&heap);
        let result = loader.load_bytes(br#"{"nodes": [{"mesh": 3}], "meshes": [{}]}"#, None);
        assert!(matches!(result, Err(SceneError::InvalidReference { .. })));
        let after = heap.stats().unwrap();
        assert_eq!(before.arena.claimed_bytes, after.arena.claimed_bytes);
        heap.validate().unwrap();
    }

    #[test]
    fn test_config_deserializes_with_defaults() {
        let config: LoaderConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, LoaderConfig::default());
        let config: LoaderConfig = serde_json::from_str(r#"{"gobj_align": 64}"#).unwrap();
        assert_eq!(config.gobj_align, 64);
    }
}
