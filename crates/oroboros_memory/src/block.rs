//! # Block Headers
//!
//! Every block in the arena starts with a [`BlockHeader`] stored inline in the
//! arena bytes. Headers are plain old data and are read and written with
//! `bytemuck`, so they may sit at any byte offset.
//!
//! ```text
//! ┌─────────┬──────────────┬──────────────────────┐
//! │ padding │ BlockHeader  │ payload (data_size)  │
//! └─────────┴──────────────┴──────────────────────┘
//! ^ span start             ^ Ptr handed to the owner
//! ```

use bytemuck::{Pod, Zeroable};

/// Tag written into every header. A mismatch means the header was overwritten.
pub const BLOCK_MAGIC: u32 = u32::from_le_bytes(*b"OBLK");

/// Sentinel for "no neighbour".
pub const NIL: u64 = u64::MAX;

/// Size of the inline header in bytes.
pub const HEADER_SIZE: usize = std::mem::size_of::<BlockHeader>();

/// Byte written over padding vacated by a header moved forward (scrub mode).
pub const PADDING_FILL: u8 = 0xAB;

/// What a block is used for.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum BlockKind {
    /// Available for allocation.
    Free = 0,
    /// Generic owned allocation.
    #[default]
    Claimed = 1,
    /// Hosts the fixed-size sub-allocator.
    SubAllocator = 2,
    /// Per-frame scratch stack.
    FrameStack = 3,
    /// A materialized scene object graph.
    SceneGraph = 4,
}

impl BlockKind {
    /// Converts from the raw header tag.
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(Self::Free),
            1 => Some(Self::Claimed),
            2 => Some(Self::SubAllocator),
            3 => Some(Self::FrameStack),
            4 => Some(Self::SceneGraph),
            _ => None,
        }
    }
}

/// Inline block header.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct BlockHeader {
    /// Always [`BLOCK_MAGIC`].
    pub magic: u32,
    /// Raw [`BlockKind`].
    pub kind: u32,
    /// Bytes available to the owner.
    pub data_size: u64,
    /// Bytes between the span start and this header.
    pub padding: u32,
    /// Stamp of the claim that produced this block; 0 for blocks never claimed.
    pub generation: u32,
    /// Header offset of the previous block, or [`NIL`].
    pub prev: u64,
    /// Header offset of the next block, or [`NIL`].
    pub next: u64,
}

impl BlockHeader {
    /// Creates a free header with no padding.
    #[must_use]
    pub const fn free(data_size: usize, prev: u64, next: u64) -> Self {
        Self {
            magic: BLOCK_MAGIC,
            kind: BlockKind::Free as u32,
            data_size: data_size as u64,
            padding: 0,
            generation: 0,
            prev,
            next,
        }
    }

    /// Decoded kind, `None` if the tag is garbage.
    #[inline]
    #[must_use]
    pub const fn block_kind(&self) -> Option<BlockKind> {
        BlockKind::from_u32(self.kind)
    }

    /// Returns whether this block is free.
    #[inline]
    #[must_use]
    pub const fn is_free(&self) -> bool {
        self.kind == BlockKind::Free as u32
    }

    /// Payload size as `usize`.
    #[inline]
    #[must_use]
    pub const fn data_len(&self) -> usize {
        self.data_size as usize
    }

    /// Padding as `usize`.
    #[inline]
    #[must_use]
    pub const fn padding_len(&self) -> usize {
        self.padding as usize
    }
}

/// Converts a neighbour link to an offset.
#[inline]
#[must_use]
pub const fn link(value: u64) -> Option<usize> {
    if value == NIL {
        None
    } else {
        Some(value as usize)
    }
}

/// Converts an optional offset to a neighbour link.
#[inline]
#[must_use]
pub const fn to_link(value: Option<usize>) -> u64 {
    match value {
        Some(offset) => offset as u64,
        None => NIL,
    }
}

/// Handle to a block: the offset of its header inside the arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockRef(pub(crate) usize);

impl BlockRef {
    /// Header offset.
    #[inline]
    #[must_use]
    pub const fn header_offset(self) -> usize {
        self.0
    }

    /// Payload offset.
    #[inline]
    #[must_use]
    pub const fn data(self) -> Ptr {
        Ptr(self.0 + HEADER_SIZE)
    }
}

/// An arena-relative payload address.
///
/// Pointers are byte offsets from the arena base, so they stay valid for the
/// lifetime of the allocation no matter where the arena buffer itself lives.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ptr(pub usize);

impl Ptr {
    /// Byte offset from the arena base.
    #[inline]
    #[must_use]
    pub const fn offset(self) -> usize {
        self.0
    }
}

/// Snapshot of one block, as produced by [`crate::BlockArena::blocks`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BlockInfo {
    /// Handle of the block.
    pub block: BlockRef,
    /// Block kind.
    pub kind: BlockKind,
    /// Padding before the header.
    pub padding: usize,
    /// Payload size.
    pub data_size: usize,
}

impl BlockInfo {
    /// First byte owned by the block (including padding).
    #[must_use]
    pub const fn span_start(&self) -> usize {
        self.block.0 - self.padding
    }

    /// One past the last byte owned by the block.
    #[must_use]
    pub const fn span_end(&self) -> usize {
        self.block.0 + HEADER_SIZE + self.data_size
    }
}

/// Rounds `value` up to `align`. An alignment of 0 or 1 is a no-op.
#[inline]
#[must_use]
pub const fn align_up(value: usize, align: usize) -> usize {
    if align <= 1 {
        value
    } else {
        value.div_ceil(align) * align
    }
}

/// Rounds `value` down to `align`. An alignment of 0 or 1 is a no-op.
#[inline]
#[must_use]
pub const fn align_down(value: usize, align: usize) -> usize {
    if align <= 1 {
        value
    } else {
        value - value % align
    }
}
