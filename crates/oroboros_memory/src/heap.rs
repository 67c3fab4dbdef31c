//! # Heap Facade
//!
//! The single entry point for alloc / realloc / free, whether memory ends up in
//! the fixed-size pools or in an arena block.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Heap                               │
//! │   ReentrantMutex<RefCell<HeapState>>                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │  request(size, ptr, align, kind)                            │
//! │      │                                                      │
//! │      ├── small & unaligned ──► FixedSizeAllocator (bitmaps) │
//! │      └── otherwise ──────────► BlockArena (headered blocks) │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Thread Safety
//!
//! `Heap` is `Send + Sync`; share it with `Arc`. Every call takes the lock, so
//! allocation order across threads is unspecified beyond lock serialization.
//! Calling back into the heap from inside a byte-access closure returns
//! [`MemoryError::Reentrant`].
//!
//! ## Example
//!
//! ```rust
//! use oroboros_memory::{Heap, MemoryConfig};
//!
//! let heap = Heap::new(MemoryConfig::new(1 << 20)).unwrap();
//! let ptr = heap.alloc(24).unwrap();
//! heap.with_bytes_mut(ptr, 24, |bytes| bytes.fill(7)).unwrap();
//! let ptr = heap.realloc(ptr, 300, 0).unwrap();
//! heap.free(ptr).unwrap();
//! ```

use std::cell::RefCell;

use parking_lot::ReentrantMutex;

use crate::arena::{AllocPolicy, ArenaStats, BlockArena, OwnedRegion};
use crate::block::{BlockKind, BlockRef, Ptr};
use crate::config::MemoryConfig;
use crate::error::{MemoryError, MemoryResult};
use crate::fsa::{FixedSizeAllocator, FsaClassStats, FSA_CLASS_COUNT};

/// The last request made to the heap.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AllocRequest {
    /// Requested size; 0 means free.
    pub size: usize,
    /// Existing allocation, if any.
    pub ptr: Option<Ptr>,
    /// Requested alignment; 0 means "don't care".
    pub align: usize,
    /// Block kind for block allocations.
    pub kind: BlockKind,
}

/// Where an allocation was served from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AllocSource {
    /// A fixed-size sub-block.
    Fsa,
    /// An arena block.
    Block,
}

/// The result of the last request made to the heap.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum AllocOutcome {
    /// Nothing was requested.
    #[default]
    Noop,
    /// A new allocation.
    Allocated {
        /// Payload pointer.
        ptr: Ptr,
        /// Where it lives.
        source: AllocSource,
    },
    /// An existing allocation was resized.
    Reallocated {
        /// Payload pointer after the resize.
        ptr: Ptr,
        /// Whether the payload changed address.
        moved: bool,
        /// Where it lives now.
        source: AllocSource,
    },
    /// An allocation was released.
    Freed,
    /// The request failed.
    Failed(MemoryError),
}

/// Heap-wide usage snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeapStats {
    /// Arena chain summary.
    pub arena: ArenaStats,
    /// Pool usage per class (all zero when the pools are disabled).
    pub fsa: [FsaClassStats; FSA_CLASS_COUNT],
}

/// Mutable heap state, only reachable through the lock.
struct HeapState {
    arena: BlockArena,
    fsa: Option<FixedSizeAllocator>,
    fsa_block: Option<BlockRef>,
    /// Reused for every call.
    request: AllocRequest,
    /// Reused for every call.
    outcome: AllocOutcome,
}

/// The general allocation facade.
pub struct Heap {
    state: ReentrantMutex<RefCell<HeapState>>,
}

impl Heap {
    /// Builds the arena and, when any class is enabled, the fixed-size pools.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the configuration does not validate and
    /// `OutOfMemory` if the pools do not fit.
    pub fn new(config: MemoryConfig) -> MemoryResult<Self> {
        config.validate()?;
        let mut arena = BlockArena::new(config.arena_size, config.scrub)?;

        let (fsa, fsa_block) = if config.fsa.is_enabled() {
            let fsa_config = config.fsa.normalized();
            let block = arena.create(
                fsa_config.data_size(),
                fsa_config.align,
                AllocPolicy::Low,
                BlockKind::SubAllocator,
                None,
            )?;
            let fsa =
                FixedSizeAllocator::init(arena.storage_mut(), block.data().offset(), &fsa_config, config.scrub)?;
            (Some(fsa), Some(block))
        } else {
            (None, None)
        };

        tracing::info!(
            "heap ready: {} byte arena, {} byte fixed-size pools",
            config.arena_size,
            if fsa.is_some() { config.fsa.data_size() } else { 0 }
        );

        Ok(Self {
            state: ReentrantMutex::new(RefCell::new(HeapState {
                arena,
                fsa,
                fsa_block,
                request: AllocRequest::default(),
                outcome: AllocOutcome::default(),
            })),
        })
    }

    /// The request/result protocol.
    ///
    /// | `ptr`  | `size` | action  |
    /// |--------|--------|---------|
    /// | `None` | `> 0`  | alloc   |
    /// | `Some` | `> 0`  | realloc |
    /// | `Some` | `0`    | free    |
    /// | `None` | `0`    | no-op   |
    ///
    /// Returns the resulting pointer (`None` after a free or a no-op).
    ///
    /// # Errors
    ///
    /// Capacity exhaustion, invalid pointers, or re-entrant use.
    pub fn request(
        &self,
        size: usize,
        ptr: Option<Ptr>,
        align: usize,
        kind: BlockKind,
    ) -> MemoryResult<Option<Ptr>> {
        self.lock(|state| {
            state.request = AllocRequest { size, ptr, align, kind };
            let result = match (ptr, size) {
                (None, 0) => {
                    state.outcome = AllocOutcome::Noop;
                    Ok(None)
                }
                (None, _) => state.alloc(size, align, kind).map(Some),
                (Some(ptr), 0) => state.free(ptr).map(|()| None),
                (Some(ptr), _) => state.realloc(ptr, size, align, kind).map(Some),
            };
            if let Err(error) = &result {
                tracing::warn!("heap request {:?} failed: {}", state.request, error);
                state.outcome = AllocOutcome::Failed(error.clone());
            }
            result
        })
    }

    /// Allocates `size` bytes, preferring the fixed-size pools.
    ///
    /// # Errors
    ///
    /// Returns `ZeroSized` for `size == 0` and `OutOfMemory` when nothing fits.
    pub fn alloc(&self, size: usize) -> MemoryResult<Ptr> {
        self.request(size, None, 0, BlockKind::Claimed)?.ok_or(MemoryError::ZeroSized)
    }

    /// Allocates an arena block of `kind`, bypassing the pools.
    ///
    /// # Errors
    ///
    /// Returns `ZeroSized` for `size == 0` and `OutOfMemory` when nothing fits.
    pub fn alloc_block(&self, size: usize, align: usize, kind: BlockKind) -> MemoryResult<Ptr> {
        if size == 0 {
            return Err(MemoryError::ZeroSized);
        }
        self.lock(|state| {
            state.request = AllocRequest { size, ptr: None, align, kind };
            state.alloc_block(size, align, kind).map_err(|error| {
                tracing::warn!("block request {:?} failed: {}", state.request, error);
                state.outcome = AllocOutcome::Failed(error.clone());
                error
            })
        })
    }

    /// Allocates an [`OwnedRegion`]: an arena block of `kind` whose usable
    /// bytes start at `align` without moving the block header.
    ///
    /// Release it with [`Heap::free_region`].
    ///
    /// # Errors
    ///
    /// Returns `ZeroSized` for `size == 0` and `OutOfMemory` when nothing fits.
    pub fn alloc_region(&self, size: usize, align: usize, kind: BlockKind) -> MemoryResult<OwnedRegion> {
        if size == 0 {
            return Err(MemoryError::ZeroSized);
        }
        self.lock(|state| {
            state.request = AllocRequest { size, ptr: None, align, kind };
            match state.arena.create_region(size, align, AllocPolicy::Low, kind) {
                Ok(region) => {
                    state.outcome = AllocOutcome::Allocated { ptr: region.ptr(), source: AllocSource::Block };
                    Ok(region)
                }
                Err(error) => {
                    tracing::warn!("region request {:?} failed: {}", state.request, error);
                    state.outcome = AllocOutcome::Failed(error.clone());
                    Err(error)
                }
            }
        })
    }

    /// Releases a region allocated by [`Heap::alloc_region`].
    ///
    /// # Errors
    ///
    /// Returns `InvalidPointer` when the region is no longer live.
    pub fn free_region(&self, region: &OwnedRegion) -> MemoryResult<()> {
        self.lock(|state| {
            state.arena.check_region(region)?;
            state.request = AllocRequest { size: 0, ptr: Some(region.ptr()), align: 0, kind: BlockKind::Claimed };
            state.arena.release(region.block())?;
            state.outcome = AllocOutcome::Freed;
            Ok(())
        })
    }

    /// Runs `f` over the bytes of a region.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPointer` when the region is no longer live.
    pub fn with_region<R>(&self, region: &OwnedRegion, f: impl FnOnce(&[u8]) -> R) -> MemoryResult<R> {
        self.lock(|state| {
            state.arena.check_region(region)?;
            let start = region.ptr().offset();
            Ok(f(&state.arena.storage()[start..start + region.len()]))
        })
    }

    /// Runs `f` over the mutable bytes of a region.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPointer` when the region is no longer live.
    pub fn with_region_mut<R>(
        &self,
        region: &OwnedRegion,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> MemoryResult<R> {
        self.lock(|state| {
            state.arena.check_region(region)?;
            let start = region.ptr().offset();
            Ok(f(&mut state.arena.storage_mut()[start..start + region.len()]))
        })
    }

    /// Runs `f` over two live regions at once: `source` read, `dest` written.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPointer` when either region is not live or they share a block.
    pub fn with_regions<R>(
        &self,
        source: &OwnedRegion,
        dest: &OwnedRegion,
        f: impl FnOnce(&[u8], &mut [u8]) -> R,
    ) -> MemoryResult<R> {
        self.lock(|state| {
            state.arena.check_region(source)?;
            state.arena.check_region(dest)?;
            if source.block() == dest.block() {
                return Err(MemoryError::InvalidPointer(dest.ptr().offset()));
            }
            let (src, dst) = (source.ptr().offset(), dest.ptr().offset());
            let storage = state.arena.storage_mut();
            if src < dst {
                let (low, high) = storage.split_at_mut(dst);
                Ok(f(&low[src..src + source.len()], &mut high[..dest.len()]))
            } else {
                let (low, high) = storage.split_at_mut(src);
                Ok(f(&high[..source.len()], &mut low[dst..dst + dest.len()]))
            }
        })
    }

    /// Resizes an allocation, preserving its bytes.
    ///
    /// # Errors
    ///
    /// Returns `ZeroSized` for `size == 0` (use [`Heap::free`]), otherwise the
    /// errors of [`Heap::request`].
    pub fn realloc(&self, ptr: Ptr, size: usize, align: usize) -> MemoryResult<Ptr> {
        if size == 0 {
            return Err(MemoryError::ZeroSized);
        }
        self.request(size, Some(ptr), align, BlockKind::Claimed)?.ok_or(MemoryError::ZeroSized)
    }

    /// Releases an allocation from either the pools or the arena.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPointer` or `DoubleFree` for pointers that are not live.
    pub fn free(&self, ptr: Ptr) -> MemoryResult<()> {
        self.request(0, Some(ptr), 0, BlockKind::Claimed).map(|_| ())
    }

    /// Realloc-style hook for external libraries: `(ptr, size, align) -> ptr`.
    ///
    /// `size == 0` frees. Failures are logged and reported as `None`.
    pub fn realloc_raw(&self, ptr: Option<Ptr>, size: usize, align: usize) -> Option<Ptr> {
        match self.request(size, ptr, align, BlockKind::Claimed) {
            Ok(result) => result,
            Err(error) => {
                tracing::error!("external allocation hook failed: {}", error);
                None
            }
        }
    }

    /// Usable bytes behind `ptr`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPointer` when `ptr` is not a live allocation.
    pub fn capacity_of(&self, ptr: Ptr) -> MemoryResult<usize> {
        self.lock(|state| state.capacity_of(ptr))
    }

    /// Runs `f` over `len` bytes of an allocation.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` when `len` exceeds the allocation.
    pub fn with_bytes<R>(&self, ptr: Ptr, len: usize, f: impl FnOnce(&[u8]) -> R) -> MemoryResult<R> {
        self.lock(|state| {
            state.check_range(ptr, len)?;
            Ok(f(&state.arena.storage()[ptr.offset()..ptr.offset() + len]))
        })
    }

    /// Runs `f` over `len` mutable bytes of an allocation.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` when `len` exceeds the allocation.
    pub fn with_bytes_mut<R>(
        &self,
        ptr: Ptr,
        len: usize,
        f: impl FnOnce(&mut [u8]) -> R,
    ) -> MemoryResult<R> {
        self.lock(|state| {
            state.check_range(ptr, len)?;
            Ok(f(&mut state.arena.storage_mut()[ptr.offset()..ptr.offset() + len]))
        })
    }

    /// Runs `f` over two distinct allocations at once: one read, one written.
    ///
    /// # Errors
    ///
    /// Returns `OutOfBounds` for bad lengths and `InvalidPointer` if the
    /// ranges overlap.
    pub fn with_disjoint_mut<R>(
        &self,
        source: Ptr,
        source_len: usize,
        dest: Ptr,
        dest_len: usize,
        f: impl FnOnce(&[u8], &mut [u8]) -> R,
    ) -> MemoryResult<R> {
        self.lock(|state| {
            state.check_range(source, source_len)?;
            state.check_range(dest, dest_len)?;
            let (src, dst) = (source.offset(), dest.offset());
            if src < dst + dest_len && dst < src + source_len {
                return Err(MemoryError::InvalidPointer(dst));
            }

            let storage = state.arena.storage_mut();
            if src < dst {
                let (low, high) = storage.split_at_mut(dst);
                Ok(f(&low[src..src + source_len], &mut high[..dest_len]))
            } else {
                let (low, high) = storage.split_at_mut(src);
                Ok(f(&high[..source_len], &mut low[dst..dst + dest_len]))
            }
        })
    }

    /// End-of-frame maintenance: coalesces adjacent free blocks.
    ///
    /// # Errors
    ///
    /// Returns `Reentrant` when called from inside a byte-access closure.
    pub fn end_frame(&self) -> MemoryResult<usize> {
        self.lock(|state| Ok(state.arena.merge_all_adjacent_free()))
    }

    /// Checks every arena invariant.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` on the first violation.
    pub fn validate(&self) -> MemoryResult<ArenaStats> {
        self.lock(|state| state.arena.validate())
    }

    /// Usage snapshot.
    ///
    /// # Errors
    ///
    /// Returns `Reentrant` when called from inside a byte-access closure.
    pub fn stats(&self) -> MemoryResult<HeapStats> {
        self.lock(|state| {
            Ok(HeapStats {
                arena: state.arena.stats(),
                fsa: state.fsa.as_ref().map(FixedSizeAllocator::stats).unwrap_or_default(),
            })
        })
    }

    /// The most recent request, for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns `Reentrant` when called from inside a byte-access closure.
    pub fn last_request(&self) -> MemoryResult<AllocRequest> {
        self.lock(|state| Ok(state.request))
    }

    /// The outcome of the most recent request, for diagnostics.
    ///
    /// # Errors
    ///
    /// Returns `Reentrant` when called from inside a byte-access closure.
    pub fn last_outcome(&self) -> MemoryResult<AllocOutcome> {
        self.lock(|state| Ok(state.outcome.clone()))
    }

    /// Arena size in bytes.
    ///
    /// # Errors
    ///
    /// Returns `Reentrant` when called from inside a byte-access closure.
    pub fn arena_size(&self) -> MemoryResult<usize> {
        self.lock(|state| Ok(state.arena.size()))
    }

    fn lock<R>(&self, f: impl FnOnce(&mut HeapState) -> MemoryResult<R>) -> MemoryResult<R> {
        let guard = self.state.lock();
        let mut state = guard.try_borrow_mut().map_err(|_| MemoryError::Reentrant)?;
        f(&mut state)
    }
}

impl HeapState {
    fn alloc(&mut self, size: usize, align: usize, kind: BlockKind) -> MemoryResult<Ptr> {
        if align == 0 {
            if let Some(fsa) = &mut self.fsa {
                if let Some(ptr) = fsa.alloc(self.arena.storage_mut(), size) {
                    self.outcome = AllocOutcome::Allocated { ptr, source: AllocSource::Fsa };
                    return Ok(ptr);
                }
            }
        }
        self.alloc_block(size, align, kind)
    }

    fn alloc_block(&mut self, size: usize, align: usize, kind: BlockKind) -> MemoryResult<Ptr> {
        let ptr = self.arena.create(size, align, AllocPolicy::Low, kind, None)?.data();
        self.outcome = AllocOutcome::Allocated { ptr, source: AllocSource::Block };
        Ok(ptr)
    }

    fn free(&mut self, ptr: Ptr) -> MemoryResult<()> {
        if let Some(fsa) = &mut self.fsa {
            if fsa.destroy(self.arena.storage_mut(), ptr)? {
                self.outcome = AllocOutcome::Freed;
                return Ok(());
            }
        }
        let block = self.user_block(ptr)?;
        self.arena.release(block)?;
        self.outcome = AllocOutcome::Freed;
        Ok(())
    }

    fn realloc(&mut self, ptr: Ptr, size: usize, align: usize, kind: BlockKind) -> MemoryResult<Ptr> {
        if let Some(fsa) = &mut self.fsa {
            if fsa.contains(ptr) {
                let current = fsa.class_size_of(ptr).ok_or(MemoryError::InvalidPointer(ptr.offset()))?;
                let aligned = align <= 1 || ptr.offset() % align == 0;
                if size <= current && aligned {
                    self.outcome = AllocOutcome::Reallocated { ptr, moved: false, source: AllocSource::Fsa };
                    return Ok(ptr);
                }

                let pooled = if align == 0 { fsa.alloc(self.arena.storage_mut(), size) } else { None };
                let (moved, source) = match pooled {
                    Some(moved) => (moved, AllocSource::Fsa),
                    None => {
                        let block = self.arena.create(size, align, AllocPolicy::Low, kind, None)?;
                        (block.data(), AllocSource::Block)
                    }
                };
                let keep = current.min(size);
                self.arena
                    .storage_mut()
                    .copy_within(ptr.offset()..ptr.offset() + keep, moved.offset());
                if let Some(fsa) = &mut self.fsa {
                    fsa.destroy(self.arena.storage_mut(), ptr)?;
                }
                self.outcome = AllocOutcome::Reallocated { ptr: moved, moved: true, source };
                return Ok(moved);
            }
        }

        let block = self.user_block(ptr)?;
        let grown = self.arena.grow(block, size, align)?.data();
        self.outcome = AllocOutcome::Reallocated { ptr: grown, moved: grown != ptr, source: AllocSource::Block };
        Ok(grown)
    }

    /// A claimed block that the caller is allowed to touch.
    fn user_block(&self, ptr: Ptr) -> MemoryResult<BlockRef> {
        let block = self.arena.block_from_data(ptr)?;
        if Some(block) == self.fsa_block {
            return Err(MemoryError::InvalidPointer(ptr.offset()));
        }
        Ok(block)
    }

    fn capacity_of(&self, ptr: Ptr) -> MemoryResult<usize> {
        if let Some(fsa) = &self.fsa {
            if fsa.contains(ptr) {
                return fsa.class_size_of(ptr).ok_or(MemoryError::InvalidPointer(ptr.offset()));
            }
        }
        let block = self.user_block(ptr)?;
        Ok(self.arena.header(block)?.data_len())
    }

    fn check_range(&self, ptr: Ptr, len: usize) -> MemoryResult<()> {
        let capacity = self.capacity_of(ptr)?;
        if len > capacity {
            return Err(MemoryError::OutOfBounds { offset: ptr.offset(), len, capacity });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FsaConfig;

    fn heap() -> Heap {
        Heap::new(MemoryConfig::new(1 << 20).with_scrub(true)).unwrap()
    }

    fn heap_without_pools() -> Heap {
        Heap::new(MemoryConfig::new(1 << 20).with_fsa(FsaConfig::disabled())).unwrap()
    }

    #[test]
    fn test_small_unaligned_alloc_uses_pools() {
        let heap = heap();
        let ptr = heap.alloc(24).unwrap();
        assert_eq!(heap.capacity_of(ptr).unwrap(), 32);
        assert!(matches!(
            heap.last_outcome().unwrap(),
            AllocOutcome::Allocated { source: AllocSource::Fsa, .. }
        ));
    }

    #[test]
    fn test_aligned_alloc_uses_block() {
        let heap = heap();
        let ptr = heap.request(24, None, 64, BlockKind::Claimed).unwrap().unwrap();
        assert_eq!(ptr.offset() % 64, 0);
        assert_eq!(heap.capacity_of(ptr).unwrap(), 24);
    }

    #[test]
    fn test_noop_request() {
        let heap = heap();
        assert_eq!(heap.request(0, None, 0, BlockKind::Claimed).unwrap(), None);
        assert_eq!(heap.last_outcome().unwrap(), AllocOutcome::Noop);
        assert_eq!(heap.alloc(0), Err(MemoryError::ZeroSized));
    }

    #[test]
    fn test_realloc_within_class_is_stable() {
        let heap = heap();
        let ptr = heap.alloc(20).unwrap();
        assert_eq!(heap.realloc(ptr, 30, 0).unwrap(), ptr);
    }

    #[test]
    fn test_realloc_moves_between_classes_and_keeps_bytes() {
        let heap = heap();
        let ptr = heap.alloc(16).unwrap();
        heap.with_bytes_mut(ptr, 16, |bytes| bytes.copy_from_slice(&[9u8; 16])).unwrap();
        let moved = heap.realloc(ptr, 100, 0).unwrap();
        assert_ne!(moved, ptr);
        assert_eq!(heap.capacity_of(moved).unwrap(), 128);
        let copied = heap.with_bytes(moved, 16, <[u8]>::to_vec).unwrap();
        assert_eq!(copied, vec![9u8; 16]);
    }

    #[test]
    fn test_realloc_pool_to_block() {
        let heap = heap();
        let ptr = heap.alloc(8).unwrap();
        heap.with_bytes_mut(ptr, 8, |bytes| bytes.copy_from_slice(b"oroboros")).unwrap();
        let moved = heap.realloc(ptr, 10_000, 0).unwrap();
        assert_eq!(heap.with_bytes(moved, 8, <[u8]>::to_vec).unwrap(), b"oroboros".to_vec());
        heap.validate().unwrap();
    }

    #[test]
    fn test_realloc_block_grows_and_keeps_bytes() {
        let heap = heap_without_pools();
        let ptr = heap.alloc(64).unwrap();
        let _wall = heap.alloc(64).unwrap();
        heap.with_bytes_mut(ptr, 64, |bytes| bytes.fill(3)).unwrap();
        let moved = heap.realloc(ptr, 512, 0).unwrap();
        assert_ne!(moved, ptr);
        assert!(heap.with_bytes(moved, 64, |bytes| bytes.iter().all(|&b| b == 3)).unwrap());
        heap.validate().unwrap();
    }

    #[test]
    fn test_free_routes_to_owner() {
        let heap = heap();
        let small = heap.alloc(4).unwrap();
        let big = heap.alloc(8192).unwrap();
        heap.free(small).unwrap();
        heap.free(big).unwrap();
        assert_eq!(heap.free(small), Err(MemoryError::DoubleFree(small.offset())));
        assert!(heap.free(big).is_err());
        heap.validate().unwrap();
    }

    #[test]
    fn test_pools_occupy_one_block() {
        let heap = heap();
        let stats = heap.stats().unwrap();
        assert!(stats.fsa.iter().any(|class| class.capacity > 0));
        assert_eq!(stats.fsa[0].capacity, 0);
        let arena = heap.validate().unwrap();
        assert_eq!(arena.block_count, 2);
        assert_eq!(arena.free_blocks, 1);
    }

    #[test]
    fn test_realloc_raw_hook() {
        let heap = heap();
        let ptr = heap.realloc_raw(None, 48, 16).unwrap();
        assert_eq!(ptr.offset() % 16, 0);
        let ptr = heap.realloc_raw(Some(ptr), 4096, 16).unwrap();
        assert_eq!(heap.realloc_raw(Some(ptr), 0, 0), None);
        assert_eq!(heap.realloc_raw(None, usize::MAX / 2, 0), None);
    }

    #[test]
    fn test_out_of_bounds_access() {
        let heap = heap_without_pools();
        let ptr = heap.alloc(16).unwrap();
        assert!(matches!(heap.with_bytes(ptr, 17, |_| ()), Err(MemoryError::OutOfBounds { .. })));
    }

    #[test]
    fn test_reentrant_call_is_rejected() {
        let heap = heap();
        let ptr = heap.alloc(16).unwrap();
        let nested = heap.with_bytes_mut(ptr, 16, |_| heap.alloc(16)).unwrap();
        assert_eq!(nested, Err(MemoryError::Reentrant));
    }

    #[test]
    fn test_disjoint_access() {
        let heap = heap_without_pools();
        let a = heap.alloc(32).unwrap();
        let b = heap.alloc(32).unwrap();
        heap.with_bytes_mut(a, 32, |bytes| bytes.fill(1)).unwrap();
        heap.with_disjoint_mut(a, 32, b, 32, |src, dst| dst.copy_from_slice(src)).unwrap();
        assert!(heap.with_bytes(b, 32, |bytes| bytes.iter().all(|&x| x == 1)).unwrap());
        // reversed direction
        heap.with_bytes_mut(b, 32, |bytes| bytes.fill(2)).unwrap();
        heap.with_disjoint_mut(b, 32, a, 32, |src, dst| dst.copy_from_slice(src)).unwrap();
        assert!(heap.with_bytes(a, 32, |bytes| bytes.iter().all(|&x| x == 2)).unwrap());
    }

    #[test]
    fn test_regions() {
        let heap = heap_without_pools();
        let _pad = heap.alloc(5).unwrap();
        let a = heap.alloc_region(100, 32, BlockKind::SceneGraph).unwrap();
        let b = heap.alloc_region(100, 32, BlockKind::SceneGraph).unwrap();
        assert_eq!(a.ptr().offset() % 32, 0);
        heap.with_region_mut(&a, |bytes| bytes.fill(4)).unwrap();
        heap.with_regions(&a, &b, |src, dst| dst.copy_from_slice(src)).unwrap();
        assert!(heap.with_region(&b, |bytes| bytes.iter().all(|&x| x == 4)).unwrap());
        assert!(heap.with_regions(&a, &a, |_, _| ()).is_err());

        heap.free_region(&a).unwrap();
        assert!(heap.with_region(&a, |_| ()).is_err());
        assert!(heap.free_region(&a).is_err());
        heap.validate().unwrap();
    }

    #[test]
    fn test_heap_is_shareable_across_threads() {
        let heap = std::sync::Arc::new(heap());
        let workers: Vec<_> = (0..4)
            .map(|_| {
                let heap = std::sync::Arc::clone(&heap);
                std::thread::spawn(move || {
                    for size in [8usize, 64, 700, 5000] {
                        let ptr = heap.alloc(size).unwrap();
                        heap.free(ptr).unwrap();
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }
        heap.end_frame().unwrap();
        heap.validate().unwrap();
    }
}
