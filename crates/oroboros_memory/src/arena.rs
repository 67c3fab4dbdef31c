//! # Block Arena
//!
//! One pre-allocated byte buffer subdivided into variable-size blocks.
//!
//! Blocks form a doubly-linked chain in address order. Every block carries an
//! inline [`BlockHeader`]; the arena owns the chain and no block owns another.
//!
//! ## Guarantees
//!
//! 1. **Conservation**: `Σ(padding + header + data_size)` equals the arena size
//! 2. **Free blocks are unpadded**: a released header slides back to its base
//! 3. **First-free never overshoots**: the cursor is the lowest free block
//!
//! ## Example
//!
//! ```rust
//! use oroboros_memory::{AllocPolicy, BlockArena, BlockKind};
//!
//! let mut arena = BlockArena::new(64 * 1024, true).unwrap();
//! let block = arena.create(100, 16, AllocPolicy::Low, BlockKind::Claimed, None).unwrap();
//! assert_eq!(block.data().offset() % 16, 0);
//! arena.release(block).unwrap();
//! assert!(arena.validate().is_ok());
//! ```

use crate::block::{
    align_down, align_up, link, to_link, BlockHeader, BlockInfo, BlockKind, BlockRef, Ptr,
    BLOCK_MAGIC, HEADER_SIZE, PADDING_FILL,
};
use crate::error::{MemoryError, MemoryResult};

/// Smallest payload a split-off remainder may have.
const MIN_SPLIT_PAYLOAD: usize = 1;

/// Where `create` looks for a free block.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AllocPolicy {
    /// Scan forward from the first-free cursor.
    #[default]
    Low,
    /// Scan backward from the tail and carve from the high end.
    High,
}

/// Summary of the arena chain, produced by [`BlockArena::validate`] and [`BlockArena::stats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArenaStats {
    /// Arena size in bytes.
    pub total_size: usize,
    /// Number of blocks in the chain.
    pub block_count: usize,
    /// Number of free blocks.
    pub free_blocks: usize,
    /// Payload bytes held by free blocks.
    pub free_bytes: usize,
    /// Largest free payload.
    pub largest_free: usize,
    /// Payload bytes held by claimed blocks.
    pub claimed_bytes: usize,
}

/// A claimed block whose payload start is aligned inside the block.
///
/// The block is reserved with worst-case padding up front, so its header never
/// moves. Used for allocations that must keep a fixed alignment across their
/// whole lifetime, such as scene graphs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct OwnedRegion {
    block: BlockRef,
    start: Ptr,
    len: usize,
    generation: u32,
}

impl OwnedRegion {
    /// The block holding the region.
    #[inline]
    #[must_use]
    pub const fn block(&self) -> BlockRef {
        self.block
    }

    /// Aligned start of the usable bytes.
    #[inline]
    #[must_use]
    pub const fn ptr(&self) -> Ptr {
        self.start
    }

    /// Usable bytes from [`OwnedRegion::ptr`].
    #[inline]
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Returns whether the region has no usable bytes.
    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Claim stamp of the block when the region was handed out.
    #[inline]
    #[must_use]
    pub const fn generation(&self) -> u32 {
        self.generation
    }
}

/// A block-based arena over one pre-allocated buffer.
///
/// # Thread Safety
///
/// This arena is NOT thread-safe. Route every call through [`crate::Heap`].
pub struct BlockArena {
    /// The backing storage. Headers live inside it.
    storage: Box<[u8]>,
    /// Header offset of the first block.
    head: usize,
    /// Header offset of the last block.
    tail: usize,
    /// Header offset of the lowest free block.
    first_free: Option<usize>,
    /// Display-only block count, exact after every operation.
    block_count: usize,
    /// Fill vacated padding and released payloads.
    scrub: bool,
    /// Stamp of the most recent claim.
    generation: u32,
}

impl BlockArena {
    /// Creates an arena of `size` bytes holding a single free block.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if `size` cannot hold one header and one byte.
    pub fn new(size: usize, scrub: bool) -> MemoryResult<Self> {
        if size < HEADER_SIZE + MIN_SPLIT_PAYLOAD {
            return Err(MemoryError::InvalidConfig(format!(
                "arena of {size} bytes cannot hold a block header"
            )));
        }

        let mut arena = Self {
            storage: vec![0u8; size].into_boxed_slice(),
            head: 0,
            tail: 0,
            first_free: Some(0),
            block_count: 1,
            scrub,
            generation: 0,
        };
        arena.write(0, &BlockHeader::free(size - HEADER_SIZE, to_link(None), to_link(None)));
        Ok(arena)
    }

    /// Returns the total size in bytes.
    #[inline]
    #[must_use]
    pub fn size(&self) -> usize {
        self.storage.len()
    }

    /// Returns the number of blocks in the chain.
    #[inline]
    #[must_use]
    pub const fn block_count(&self) -> usize {
        self.block_count
    }

    /// Returns the lowest free block, if any.
    #[inline]
    #[must_use]
    pub fn first_free(&self) -> Option<BlockRef> {
        self.first_free.map(BlockRef)
    }

    /// Returns whether released memory is scrubbed.
    #[inline]
    #[must_use]
    pub const fn scrubs(&self) -> bool {
        self.scrub
    }

    pub(crate) fn storage(&self) -> &[u8] {
        &self.storage
    }

    pub(crate) fn storage_mut(&mut self) -> &mut [u8] {
        &mut self.storage
    }

    /// Reads the header of a live or free block.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` if the offset is out of range or the magic is wrong.
    pub fn header(&self, block: BlockRef) -> MemoryResult<BlockHeader> {
        self.checked(block.0)
    }

    /// Maps a payload pointer back to its block.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPointer` if `ptr` is not the payload of a claimed block.
    pub fn block_from_data(&self, ptr: Ptr) -> MemoryResult<BlockRef> {
        let at = ptr
            .0
            .checked_sub(HEADER_SIZE)
            .ok_or(MemoryError::InvalidPointer(ptr.0))?;
        if at + HEADER_SIZE > self.storage.len() {
            return Err(MemoryError::InvalidPointer(ptr.0));
        }
        let header = self.read(at);
        if header.magic != BLOCK_MAGIC || header.is_free() || header.block_kind().is_none() {
            return Err(MemoryError::InvalidPointer(ptr.0));
        }
        Ok(BlockRef(at))
    }

    /// Claims a block of exactly `size` bytes whose payload is aligned to `align`.
    ///
    /// With `copy_from`, the source payload is copied into the new block and the
    /// source is released: this is how a relocating grow is done.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` when no free block is large enough after alignment.
    /// The failure is logged and never retried.
    pub fn create(
        &mut self,
        size: usize,
        align: usize,
        policy: AllocPolicy,
        kind: BlockKind,
        copy_from: Option<BlockRef>,
    ) -> MemoryResult<BlockRef> {
        if kind == BlockKind::Free {
            return Err(MemoryError::InvalidBlockState {
                offset: 0,
                reason: "cannot create a block of kind Free",
            });
        }
        if let Some(source) = copy_from {
            let header = self.checked(source.0)?;
            if header.is_free() {
                return Err(MemoryError::InvalidBlockState {
                    offset: source.0,
                    reason: "copy source is free",
                });
            }
        }

        let found = match policy {
            AllocPolicy::Low => self.find_low(size, align),
            AllocPolicy::High => self.find_high(size, align),
        };
        let Some(free_at) = found else {
            tracing::warn!(
                "arena exhausted: no free block for {} bytes aligned to {} ({} blocks)",
                size,
                align,
                self.block_count
            );
            return Err(MemoryError::OutOfMemory { requested: size, align });
        };

        let block = match policy {
            AllocPolicy::Low => self.claim_low(free_at, size, align, kind),
            AllocPolicy::High => self.claim_high(free_at, size, align, kind),
        };

        if let Some(source) = copy_from {
            let source_header = self.read(source.0);
            let len = source_header.data_len().min(size);
            let from = source.data().0;
            let to = block.data().0;
            self.storage.copy_within(from..from + len, to);
            self.release(source)?;
        }

        Ok(block)
    }

    /// Claims an [`OwnedRegion`] of `size` bytes aligned to `align`.
    ///
    /// The block is requested unaligned with `align - 1` spare bytes, and the
    /// aligned start is picked inside it.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` when no free block can hold the padded size.
    pub fn create_region(
        &mut self,
        size: usize,
        align: usize,
        policy: AllocPolicy,
        kind: BlockKind,
    ) -> MemoryResult<OwnedRegion> {
        let reserve = size
            .checked_add(align.saturating_sub(1))
            .ok_or(MemoryError::OutOfMemory { requested: size, align })?;
        let block = self.create(reserve, 0, policy, kind, None)?;
        let start = Ptr(align_up(block.data().0, align));
        let generation = self.read(block.0).generation;
        Ok(OwnedRegion { block, start, len: size, generation })
    }

    /// Checks that `region` still names the claim that produced it.
    ///
    /// A block released and claimed again at the same offset carries a new
    /// generation, so handles to the old claim are rejected.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPointer` for a released, reused or foreign region.
    pub fn check_region(&self, region: &OwnedRegion) -> MemoryResult<()> {
        let block = self.block_from_data(region.block.data())?;
        let header = self.read(block.0);
        let end = block.data().0 + header.data_len();
        if block != region.block
            || header.generation != region.generation
            || region.start.0 < block.data().0
            || region.start.0 + region.len > end
        {
            return Err(MemoryError::InvalidPointer(region.start.0));
        }
        Ok(())
    }

    /// Marks a block free and slides its header back over any alignment padding.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBlockState` for a block that is already free and
    /// `Corrupted` for a damaged header.
    pub fn release(&mut self, block: BlockRef) -> MemoryResult<()> {
        let at = block.0;
        let header = self.checked(at)?;
        if header.is_free() {
            tracing::error!("release of free block at offset {}", at);
            return Err(MemoryError::InvalidBlockState { offset: at, reason: "already free" });
        }

        let padding = header.padding_len();
        let base = at - padding;
        let mut freed = header;
        freed.kind = BlockKind::Free as u32;
        freed.padding = 0;
        freed.data_size += padding as u64;

        if padding > 0 {
            self.relink(at, base, &header);
        }
        self.write(base, &freed);

        if self.scrub {
            let start = base + HEADER_SIZE;
            self.storage[start..start + freed.data_len()].fill(0);
        }

        if self.first_free.map_or(true, |first| base < first) {
            self.first_free = Some(base);
        }
        Ok(())
    }

    /// Shrinks a claimed block, splitting off a trailing free block when the
    /// remainder can host a header plus one byte. Returns whether a split happened.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBlockState` when the block is free or `size` is larger
    /// than the current payload.
    pub fn shrink(&mut self, block: BlockRef, size: usize) -> MemoryResult<bool> {
        let header = self.checked(block.0)?;
        if header.is_free() {
            return Err(MemoryError::InvalidBlockState { offset: block.0, reason: "shrink of free block" });
        }
        if size > header.data_len() {
            return Err(MemoryError::InvalidBlockState {
                offset: block.0,
                reason: "shrink to a larger size",
            });
        }

        let Some(remainder) = self.split_after(block.0, size) else {
            return Ok(false);
        };
        if self.scrub {
            let rest = self.read(remainder);
            let start = remainder + HEADER_SIZE;
            self.storage[start..start + rest.data_len()].fill(0);
        }
        if self.first_free.map_or(true, |first| remainder < first) {
            self.first_free = Some(remainder);
        }
        Ok(true)
    }

    /// Grows a claimed block to `size` bytes.
    ///
    /// Absorbs a free successor in place when possible (O(1)); otherwise the
    /// block is relocated with `create` + copy + `release` (O(n)). Returns the
    /// block that now holds the payload.
    ///
    /// # Errors
    ///
    /// Returns `OutOfMemory` when relocation finds no room; the original block
    /// is left untouched in that case.
    pub fn grow(&mut self, block: BlockRef, size: usize, align: usize) -> MemoryResult<BlockRef> {
        let at = block.0;
        let header = self.checked(at)?;
        if header.is_free() {
            return Err(MemoryError::InvalidBlockState { offset: at, reason: "grow of free block" });
        }

        let aligned = align <= 1 || block.data().0 % align == 0;
        if aligned && size <= header.data_len() {
            self.shrink(block, size)?;
            return Ok(block);
        }

        if aligned {
            if let Some(next_at) = link(header.next) {
                let next = self.read(next_at);
                let combined = header.data_len() + HEADER_SIZE + next.data_len();
                if next.is_free() && combined >= size {
                    let was_first = self.first_free == Some(next_at);
                    let mut grown = header;
                    grown.data_size = combined as u64;
                    grown.next = next.next;
                    match link(next.next) {
                        Some(after) => self.set_prev(after, at),
                        None => self.tail = at,
                    }
                    self.write(at, &grown);
                    self.block_count -= 1;
                    if self.scrub {
                        self.storage[next_at..next_at + HEADER_SIZE].fill(0);
                    }

                    let remainder = self.split_after(at, size);
                    if was_first {
                        self.first_free = remainder.or_else(|| self.scan_free_from(link(self.read(at).next)));
                    }
                    tracing::debug!("grew block at {} in place to {} bytes", at, size);
                    return Ok(block);
                }
            }
        }

        let kind = header.block_kind().unwrap_or(BlockKind::Claimed);
        let moved = self.create(size, align, AllocPolicy::Low, kind, Some(block))?;
        tracing::debug!("relocated block {} -> {} ({} bytes)", at, moved.0, size);
        Ok(moved)
    }

    /// Merges a free block with its free successor.
    ///
    /// # Errors
    ///
    /// Returns `InvalidBlockState` unless both blocks are free.
    pub fn merge_with_next(&mut self, block: BlockRef) -> MemoryResult<()> {
        let header = self.checked(block.0)?;
        if !header.is_free() {
            return Err(MemoryError::InvalidBlockState { offset: block.0, reason: "merge of claimed block" });
        }
        let Some(next_at) = link(header.next) else {
            return Err(MemoryError::InvalidBlockState { offset: block.0, reason: "no successor to merge" });
        };
        if !self.checked(next_at)?.is_free() {
            return Err(MemoryError::InvalidBlockState { offset: next_at, reason: "successor is claimed" });
        }
        self.merge_raw(block.0);
        Ok(())
    }

    /// End-of-frame maintenance: coalesces every pair of adjacent free blocks
    /// and recomputes the block count. Returns the number of merges.
    pub fn merge_all_adjacent_free(&mut self) -> usize {
        let mut merges = 0;
        let mut count = 0;
        let mut cursor = Some(self.head);
        while let Some(at) = cursor {
            let header = self.read(at);
            if header.is_free() {
                if let Some(next_at) = link(header.next) {
                    if self.read(next_at).is_free() {
                        self.merge_raw(at);
                        merges += 1;
                        continue;
                    }
                }
            }
            count += 1;
            cursor = link(header.next);
        }
        self.block_count = count;
        if merges > 0 {
            tracing::debug!("frame merge coalesced {} block pairs, {} blocks remain", merges, count);
        }
        merges
    }

    /// Iterates over every block in address order.
    pub fn blocks(&self) -> impl Iterator<Item = BlockInfo> + '_ {
        let mut cursor = Some(self.head);
        std::iter::from_fn(move || {
            let at = cursor?;
            let header = self.checked(at).ok()?;
            let kind = header.block_kind()?;
            cursor = link(header.next);
            Some(BlockInfo {
                block: BlockRef(at),
                kind,
                padding: header.padding_len(),
                data_size: header.data_len(),
            })
        })
    }

    /// Summarizes the chain without checking invariants.
    #[must_use]
    pub fn stats(&self) -> ArenaStats {
        let mut stats = ArenaStats { total_size: self.size(), ..ArenaStats::default() };
        for info in self.blocks() {
            stats.block_count += 1;
            if info.kind == BlockKind::Free {
                stats.free_blocks += 1;
                stats.free_bytes += info.data_size;
                stats.largest_free = stats.largest_free.max(info.data_size);
            } else {
                stats.claimed_bytes += info.data_size;
            }
        }
        stats
    }

    /// Walks the whole chain and checks every arena invariant.
    ///
    /// # Errors
    ///
    /// Returns `Corrupted` describing the first violation found.
    pub fn validate(&self) -> MemoryResult<ArenaStats> {
        let len = self.storage.len();
        let mut stats = ArenaStats { total_size: len, ..ArenaStats::default() };
        let mut expected_start = 0usize;
        let mut previous: Option<usize> = None;
        let mut lowest_free: Option<usize> = None;
        let mut conserved = 0usize;
        let mut cursor = Some(self.head);

        while let Some(at) = cursor {
            if stats.block_count > len / HEADER_SIZE {
                return Err(corrupted("block chain does not terminate".to_string()));
            }
            let header = self.checked(at)?;
            let kind = header
                .block_kind()
                .ok_or_else(|| corrupted(format!("block {at} has unknown kind {}", header.kind)))?;
            if link(header.prev) != previous {
                return Err(corrupted(format!("block {at} has a broken prev link")));
            }
            let span_start = at
                .checked_sub(header.padding_len())
                .ok_or_else(|| corrupted(format!("block {at} padding underflows")))?;
            if span_start != expected_start {
                return Err(corrupted(format!(
                    "block {at} starts at {span_start}, expected {expected_start}"
                )));
            }
            if kind == BlockKind::Free {
                if header.padding != 0 {
                    return Err(corrupted(format!("free block {at} carries padding")));
                }
                lowest_free.get_or_insert(at);
                stats.free_blocks += 1;
                stats.free_bytes += header.data_len();
                stats.largest_free = stats.largest_free.max(header.data_len());
            } else {
                stats.claimed_bytes += header.data_len();
            }

            conserved += header.padding_len() + HEADER_SIZE + header.data_len();
            expected_start = at + HEADER_SIZE + header.data_len();
            if expected_start > len {
                return Err(corrupted(format!("block {at} runs past the arena end")));
            }
            stats.block_count += 1;
            previous = Some(at);
            cursor = link(header.next);
        }

        if conserved != len || expected_start != len {
            return Err(corrupted(format!("blocks cover {conserved} of {len} bytes")));
        }
        if previous != Some(self.tail) {
            return Err(corrupted("tail does not match the last block".to_string()));
        }
        if self.first_free != lowest_free {
            return Err(corrupted(format!(
                "first-free cursor {:?} but lowest free block is {:?}",
                self.first_free, lowest_free
            )));
        }
        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn read(&self, at: usize) -> BlockHeader {
        bytemuck::pod_read_unaligned(&self.storage[at..at + HEADER_SIZE])
    }

    fn write(&mut self, at: usize, header: &BlockHeader) {
        self.storage[at..at + HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(header));
    }

    fn checked(&self, at: usize) -> MemoryResult<BlockHeader> {
        if at + HEADER_SIZE > self.storage.len() {
            return Err(corrupted(format!("header offset {at} out of range")));
        }
        let header = self.read(at);
        if header.magic != BLOCK_MAGIC {
            tracing::error!("block header at {} has bad magic {:#x}", at, header.magic);
            return Err(corrupted(format!("bad magic at {at}")));
        }
        Ok(header)
    }

    fn set_prev(&mut self, at: usize, prev: usize) {
        let mut header = self.read(at);
        header.prev = prev as u64;
        self.write(at, &header);
    }

    fn set_next(&mut self, at: usize, next: usize) {
        let mut header = self.read(at);
        header.next = next as u64;
        self.write(at, &header);
    }

    /// Points the neighbours of a header that moved from `old` to `new`.
    fn relink(&mut self, old: usize, new: usize, header: &BlockHeader) {
        match link(header.prev) {
            Some(prev) => self.set_next(prev, new),
            None => self.head = new,
        }
        match link(header.next) {
            Some(next) => self.set_prev(next, new),
            None => self.tail = new,
        }
        if self.first_free == Some(old) {
            self.first_free = Some(new);
        }
    }

    /// Aligned payload offset a free block at `at` would hand out, if `size` fits.
    fn fit(at: usize, header: &BlockHeader, size: usize, align: usize) -> Option<usize> {
        let data = align_up(at + HEADER_SIZE, align);
        let padding = data - HEADER_SIZE - at;
        (padding + size <= header.data_len()).then_some(data)
    }

    fn find_low(&self, size: usize, align: usize) -> Option<usize> {
        let mut cursor = self.first_free;
        while let Some(at) = cursor {
            let header = self.read(at);
            if header.is_free() && Self::fit(at, &header, size, align).is_some() {
                return Some(at);
            }
            cursor = link(header.next);
        }
        None
    }

    fn find_high(&self, size: usize, align: usize) -> Option<usize> {
        let mut cursor = Some(self.tail);
        while let Some(at) = cursor {
            let header = self.read(at);
            if header.is_free() && Self::fit(at, &header, size, align).is_some() {
                return Some(at);
            }
            cursor = link(header.prev);
        }
        None
    }

    fn scan_free_from(&self, start: Option<usize>) -> Option<usize> {
        let mut cursor = start;
        while let Some(at) = cursor {
            let header = self.read(at);
            if header.is_free() {
                return Some(at);
            }
            cursor = link(header.next);
        }
        None
    }

    /// Stamps a new claim. Never 0, so free headers never match a live handle.
    fn next_generation(&mut self) -> u32 {
        self.generation = self.generation.checked_add(1).unwrap_or(1);
        self.generation
    }

    fn claim_low(&mut self, at: usize, size: usize, align: usize, kind: BlockKind) -> BlockRef {
        let header = self.read(at);
        let data = align_up(at + HEADER_SIZE, align);
        let new_at = data - HEADER_SIZE;
        let padding = new_at - at;

        let mut claimed = header;
        if padding > 0 {
            if self.scrub {
                self.storage[at..new_at].fill(PADDING_FILL);
            }
            claimed.padding = padding as u32;
            claimed.data_size -= padding as u64;
            self.relink(at, new_at, &header);
        }
        claimed.kind = kind as u32;
        claimed.generation = self.next_generation();
        self.write(new_at, &claimed);

        let was_first = self.first_free == Some(new_at);
        let remainder = self.split_after(new_at, size);
        if was_first {
            self.first_free = remainder.or_else(|| self.scan_free_from(link(self.read(new_at).next)));
        }
        BlockRef(new_at)
    }

    fn claim_high(&mut self, at: usize, size: usize, align: usize, kind: BlockKind) -> BlockRef {
        let header = self.read(at);
        let end = at + HEADER_SIZE + header.data_len();
        let data = align_down(end - size, align);

        if data >= at + 2 * HEADER_SIZE + MIN_SPLIT_PAYLOAD {
            let new_at = data - HEADER_SIZE;
            let claimed = BlockHeader {
                kind: kind as u32,
                generation: self.next_generation(),
                data_size: (end - data) as u64,
                prev: at as u64,
                next: header.next,
                ..BlockHeader::free(0, 0, 0)
            };
            match link(header.next) {
                Some(next) => self.set_prev(next, new_at),
                None => self.tail = new_at,
            }
            let mut front = header;
            front.data_size = (new_at - at - HEADER_SIZE) as u64;
            front.next = new_at as u64;
            self.write(at, &front);
            self.write(new_at, &claimed);
            self.block_count += 1;
            // Slack left by rounding down may still be worth a block.
            self.split_after(new_at, size);
            return BlockRef(new_at);
        }

        self.claim_low(at, size, align, kind)
    }

    /// Splits the tail of the block at `at` beyond `size` into a free block.
    /// The new free block is coalesced with a free successor.
    fn split_after(&mut self, at: usize, size: usize) -> Option<usize> {
        let mut header = self.read(at);
        if header.data_len() < size + HEADER_SIZE + MIN_SPLIT_PAYLOAD {
            return None;
        }

        let remainder = at + HEADER_SIZE + size;
        let rest = header.data_len() - size - HEADER_SIZE;
        self.write(remainder, &BlockHeader::free(rest, at as u64, header.next));
        match link(header.next) {
            Some(next) => self.set_prev(next, remainder),
            None => self.tail = remainder,
        }
        header.data_size = size as u64;
        header.next = remainder as u64;
        self.write(at, &header);
        self.block_count += 1;

        if let Some(next) = link(self.read(remainder).next) {
            if self.read(next).is_free() {
                self.merge_raw(remainder);
            }
        }
        Some(remainder)
    }

    /// Absorbs the (free) successor of the free block at `at`.
    fn merge_raw(&mut self, at: usize) {
        let mut header = self.read(at);
        let Some(next_at) = link(header.next) else {
            return;
        };
        let next = self.read(next_at);
        header.data_size += (HEADER_SIZE + next.padding_len() + next.data_len()) as u64;
        header.next = next.next;
        match link(next.next) {
            Some(after) => self.set_prev(after, at),
            None => self.tail = at,
        }
        self.write(at, &header);
        self.block_count -= 1;
        if self.first_free == Some(next_at) {
            self.first_free = Some(at);
        }
        if self.scrub {
            self.storage[next_at..next_at + HEADER_SIZE].fill(0);
        }
    }
}

fn corrupted(message: String) -> MemoryError {
    MemoryError::Corrupted(message)
}
