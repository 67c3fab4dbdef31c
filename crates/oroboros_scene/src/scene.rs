//! # Scene Handles
//!
//! A [`SceneHandle`] owns one `SceneGraph` region of a [`Heap`]. All access
//! goes through the heap, so the handle itself is just an offset and a length.
//!
//! Relocation copies the graph into a new, independently sized region. Every
//! reference inside a Gobj is an index relative to its own base, so the copy
//! needs no rebasing; only references past a smaller destination are cleared.

use oroboros_memory::{BlockKind, Heap, OwnedRegion};

use crate::error::SceneResult;
use crate::gobj::{Counts, Gobj};

/// A scene graph living in an arena block.
#[derive(Debug, PartialEq, Eq)]
pub struct SceneHandle {
    region: OwnedRegion,
}

impl SceneHandle {
    pub(crate) const fn from_region(region: OwnedRegion) -> Self {
        Self { region }
    }

    /// Allocates an empty graph with `capacity`, for procedurally built scenes.
    ///
    /// # Errors
    ///
    /// Returns `Memory` when the heap has no room.
    pub fn create(heap: &Heap, capacity: &Counts, align: usize) -> SceneResult<Self> {
        let region = heap.alloc_region(capacity.total_size(align)?, align, BlockKind::SceneGraph)?;
        let built = heap.with_region_mut(&region, |bytes| Gobj::create(bytes, capacity, align).map(drop));
        match built {
            Ok(Ok(())) => Ok(Self { region }),
            Ok(Err(error)) => {
                heap.free_region(&region)?;
                Err(error)
            }
            Err(error) => {
                heap.free_region(&region)?;
                Err(error.into())
            }
        }
    }

    /// The arena region.
    #[inline]
    #[must_use]
    pub const fn region(&self) -> &OwnedRegion {
        &self.region
    }

    /// Bytes covered by the graph.
    #[inline]
    #[must_use]
    pub const fn size(&self) -> usize {
        self.region.len()
    }

    /// Runs `f` over the graph.
    ///
    /// # Errors
    ///
    /// Returns `Memory` for a stale handle and `Invariant` for a damaged header.
    pub fn with<R>(&self, heap: &Heap, f: impl FnOnce(&Gobj<&[u8]>) -> R) -> SceneResult<R> {
        heap.with_region(&self.region, |bytes| Gobj::open(bytes).map(|gobj| f(&gobj)))?
    }

    /// Runs `f` over the graph mutably.
    ///
    /// # Errors
    ///
    /// Returns `Memory` for a stale handle and `Invariant` for a damaged header.
    pub fn with_mut<R>(&self, heap: &Heap, f: impl FnOnce(&mut Gobj<&mut [u8]>) -> R) -> SceneResult<R> {
        heap.with_region_mut(&self.region, |bytes| Gobj::open(bytes).map(|mut gobj| f(&mut gobj)))?
    }

    /// Copies the graph into a new region with `capacity`. Elements past a
    /// smaller capacity are dropped and references to them cleared.
    ///
    /// # Errors
    ///
    /// Returns `Memory` when the heap has no room; the source is untouched.
    pub fn duplicate(&self, heap: &Heap, capacity: &Counts) -> SceneResult<Self> {
        let align = self.with(heap, |gobj| gobj.align())?;
        let region = heap.alloc_region(capacity.total_size(align)?, align, BlockKind::SceneGraph)?;

        let copied = heap.with_regions(&self.region, &region, |source, dest| {
            let source = Gobj::open(source)?;
            let mut dest = Gobj::create(dest, capacity, align)?;
            dest.copy_from(&source)?;
            dest.validate()
        });
        let result = match copied {
            Ok(inner) => inner,
            Err(error) => Err(error.into()),
        };
        if let Err(error) = result {
            tracing::error!("scene duplicate failed: {}", error);
            heap.free_region(&region)?;
            return Err(error);
        }

        tracing::debug!(
            "scene relocated: {} -> {} ({} bytes)",
            self.region.ptr().offset(),
            region.ptr().offset(),
            region.len()
        );
        Ok(Self { region })
    }

    /// Moves the graph into a region large enough for `capacity` (element-wise
    /// maximum with what it holds) and releases the old one.
    ///
    /// # Errors
    ///
    /// As [`SceneHandle::duplicate`]; on error `self` still owns the old graph.
    pub fn grow(&mut self, heap: &Heap, capacity: &Counts) -> SceneResult<()> {
        let current = self.with(heap, |gobj| gobj.capacity())?;
        let grown = self.duplicate(heap, &current.max(capacity))?;
        let old = std::mem::replace(self, grown);
        old.release(heap)
    }

    /// Releases the region.
    ///
    /// # Errors
    ///
    /// Returns `Memory` for a handle that was already released.
    pub fn release(self, heap: &Heap) -> SceneResult<()> {
        heap.free_region(&self.region)?;
        Ok(())
    }
}
