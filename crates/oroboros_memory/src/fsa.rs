//! # Fixed-Size Sub-Allocator
//!
//! Power-of-two size classes (2..=4096 bytes) living inside one arena block.
//! Each class owns a bitmap free-list and a storage run; a sub-block is free
//! iff its bit is 0. No metadata is stored next to the sub-blocks themselves:
//! class and index are recovered from the address alone.
//!
//! ```text
//! FSA block payload:
//! ├── class 4B:  [bitmap count/8] [pad to align] [count × 4 bytes]
//! ├── class 8B:  [bitmap count/8] [pad to align] [count × 8 bytes]
//! └── ...
//! ```

use crate::block::{align_up, Ptr};
use crate::config::FsaConfig;
use crate::error::{MemoryError, MemoryResult};

/// Number of size classes: 2, 4, 8, ..., 4096 bytes.
pub const FSA_CLASS_COUNT: usize = 12;

/// Smallest class in bytes.
pub const FSA_MIN_CLASS: usize = 2;

/// Largest class in bytes.
pub const FSA_MAX_CLASS: usize = 4096;

/// Size in bytes of class `index`.
#[inline]
#[must_use]
pub const fn class_size(index: usize) -> usize {
    FSA_MIN_CLASS << index
}

/// Index of the smallest class that can hold `size` bytes.
#[inline]
#[must_use]
pub fn class_index(size: usize) -> Option<usize> {
    if size > FSA_MAX_CLASS {
        return None;
    }
    let rounded = size.max(1).next_power_of_two().max(FSA_MIN_CLASS);
    Some(rounded.trailing_zeros() as usize - 1)
}

/// Relative placement of every class inside the FSA region.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FsaLayout {
    /// Bitmap offset per class, relative to the region start.
    pub bitmaps: [usize; FSA_CLASS_COUNT],
    /// Storage offset per class, relative to the region start.
    pub storage: [usize; FSA_CLASS_COUNT],
    /// Region size in bytes.
    pub total: usize,
}

impl FsaLayout {
    /// Lays out a normalized configuration.
    #[must_use]
    pub fn compute(config: &FsaConfig) -> Self {
        let mut layout = Self::default();
        let mut cursor = 0usize;
        for (index, &count) in config.counts.iter().enumerate() {
            let count = count as usize;
            if count == 0 {
                continue;
            }
            layout.bitmaps[index] = cursor;
            cursor += count / 8;
            cursor = align_up(cursor, config.align);
            layout.storage[index] = cursor;
            cursor += count * class_size(index);
        }
        layout.total = cursor;
        layout
    }
}

/// One size class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct FsaGroup {
    /// Sub-block size.
    size: usize,
    /// Sub-block count (multiple of 8).
    count: usize,
    /// Arena offset of the bitmap.
    bitmap: usize,
    /// Arena offset of the first sub-block.
    data: usize,
    /// Claimed sub-blocks.
    used: usize,
}

impl FsaGroup {
    fn contains(&self, ptr: usize) -> bool {
        self.count > 0 && ptr >= self.data && ptr < self.data + self.count * self.size
    }
}

/// Usage of one size class.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FsaClassStats {
    /// Sub-block size in bytes.
    pub size: usize,
    /// Configured sub-block count.
    pub capacity: usize,
    /// Claimed sub-blocks.
    pub used: usize,
}

/// The fixed-size sub-allocator.
///
/// Operates on the arena bytes passed in by [`crate::Heap`]; it never owns memory.
#[derive(Clone, Debug)]
pub struct FixedSizeAllocator {
    /// Arena offset of the region start.
    base: usize,
    /// Region length in bytes.
    span: usize,
    /// Size classes.
    groups: [FsaGroup; FSA_CLASS_COUNT],
    /// Zero payloads on destroy.
    scrub: bool,
}

impl FixedSizeAllocator {
    /// Lays out the classes over `storage[base..]` and clears every bitmap.
    ///
    /// # Errors
    ///
    /// Returns `InvalidConfig` if the region does not fit in `storage`.
    pub fn init(storage: &mut [u8], base: usize, config: &FsaConfig, scrub: bool) -> MemoryResult<Self> {
        let config = config.normalized();
        let layout = FsaLayout::compute(&config);
        if base + layout.total > storage.len() {
            return Err(MemoryError::InvalidConfig(format!(
                "fsa region of {} bytes at {} exceeds arena",
                layout.total, base
            )));
        }

        let mut groups = [FsaGroup::default(); FSA_CLASS_COUNT];
        for (index, group) in groups.iter_mut().enumerate() {
            let count = config.counts[index] as usize;
            *group = FsaGroup {
                size: class_size(index),
                count,
                bitmap: base + layout.bitmaps[index],
                data: base + layout.storage[index],
                used: 0,
            };
            if count > 0 {
                storage[group.bitmap..group.bitmap + count / 8].fill(0);
            }
        }

        Ok(Self { base, span: layout.total, groups, scrub })
    }

    /// Returns whether `ptr` lies inside the FSA region.
    #[inline]
    #[must_use]
    pub fn contains(&self, ptr: Ptr) -> bool {
        ptr.0 >= self.base && ptr.0 < self.base + self.span
    }

    /// Class size serving `ptr`, if it is an FSA sub-block address.
    #[must_use]
    pub fn class_size_of(&self, ptr: Ptr) -> Option<usize> {
        self.groups.iter().find(|group| group.contains(ptr.0)).map(|group| group.size)
    }

    /// Claims the first free sub-block of the smallest class holding `size` bytes.
    ///
    /// Returns `None` when the class does not exist or is saturated.
    pub fn alloc(&mut self, storage: &mut [u8], size: usize) -> Option<Ptr> {
        let index = class_index(size)?;
        let group = &mut self.groups[index];
        if group.count == 0 {
            return None;
        }

        let bitmap = &mut storage[group.bitmap..group.bitmap + group.count / 8];
        for (byte_index, byte) in bitmap.iter_mut().enumerate() {
            if *byte == 0xFF {
                continue;
            }
            let bit = (!*byte).trailing_zeros() as usize;
            *byte |= 1 << bit;
            group.used += 1;
            return Some(Ptr(group.data + (byte_index * 8 + bit) * group.size));
        }

        tracing::debug!("fsa class {} saturated ({} sub-blocks)", group.size, group.count);
        None
    }

    /// Releases a sub-block.
    ///
    /// Returns `Ok(false)` when `ptr` is outside this allocator, so callers can
    /// fall back to treating it as a block pointer.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPointer` for an address inside the region that is not a
    /// sub-block start, and `DoubleFree` for a sub-block that is not claimed.
    pub fn destroy(&mut self, storage: &mut [u8], ptr: Ptr) -> MemoryResult<bool> {
        if !self.contains(ptr) {
            return Ok(false);
        }
        let scrub = self.scrub;
        let group = self
            .groups
            .iter_mut()
            .find(|group| group.contains(ptr.0))
            .ok_or(MemoryError::InvalidPointer(ptr.0))?;

        let relative = ptr.0 - group.data;
        if relative % group.size != 0 {
            tracing::error!("fsa free of misaligned pointer {} in class {}", ptr.0, group.size);
            return Err(MemoryError::InvalidPointer(ptr.0));
        }
        let index = relative / group.size;
        let byte = &mut storage[group.bitmap + index / 8];
        let mask = 1u8 << (index % 8);
        if *byte & mask == 0 {
            tracing::error!("fsa double free at {}", ptr.0);
            return Err(MemoryError::DoubleFree(ptr.0));
        }
        *byte &= !mask;
        group.used -= 1;

        if scrub {
            storage[ptr.0..ptr.0 + group.size].fill(0);
        }
        Ok(true)
    }

    /// Per-class usage.
    #[must_use]
    pub fn stats(&self) -> [FsaClassStats; FSA_CLASS_COUNT] {
        let mut stats = [FsaClassStats::default(); FSA_CLASS_COUNT];
        for (slot, group) in stats.iter_mut().zip(&self.groups) {
            *slot = FsaClassStats { size: group.size, capacity: group.count, used: group.used };
        }
        stats
    }

    /// Storage range `(start, len)` of class `index`.
    #[must_use]
    pub fn class_range(&self, index: usize) -> Option<(usize, usize)> {
        let group = self.groups.get(index)?;
        (group.count > 0).then_some((group.data, group.count * group.size))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fsa_with(counts: [u32; FSA_CLASS_COUNT]) -> (Vec<u8>, FixedSizeAllocator) {
        let config = FsaConfig { counts, align: 16 };
        let mut storage = vec![0xEEu8; config.data_size() + 64];
        let fsa = FixedSizeAllocator::init(&mut storage, 64, &config, true).unwrap();
        (storage, fsa)
    }

    #[test]
    fn test_class_index() {
        assert_eq!(class_index(0), Some(0));
        assert_eq!(class_index(1), Some(0));
        assert_eq!(class_index(2), Some(0));
        assert_eq!(class_index(3), Some(1));
        assert_eq!(class_index(4096), Some(11));
        assert_eq!(class_index(4097), None);
        assert_eq!(class_size(11), 4096);
    }

    #[test]
    fn test_layout_closed_form() {
        let config = FsaConfig { counts: [8, 0, 16, 0, 0, 0, 0, 0, 0, 0, 0, 0], align: 16 };
        let layout = FsaLayout::compute(&config);
        // class 2B: bitmap 1 byte, storage at 16, 16 bytes
        assert_eq!(layout.storage[0], 16);
        // class 8B: bitmap at 32 (2 bytes), storage at 48, 128 bytes
        assert_eq!(layout.bitmaps[2], 32);
        assert_eq!(layout.storage[2], 48);
        assert_eq!(layout.total, 176);
        assert_eq!(config.data_size(), 176);
    }

    #[test]
    fn test_alloc_picks_smallest_class() {
        let mut counts = [0; FSA_CLASS_COUNT];
        counts[2] = 8;
        counts[4] = 8;
        let (mut storage, mut fsa) = fsa_with(counts);
        let ptr = fsa.alloc(&mut storage, 5).unwrap();
        assert_eq!(fsa.class_size_of(ptr), Some(8));
        let ptr = fsa.alloc(&mut storage, 20).unwrap();
        assert_eq!(fsa.class_size_of(ptr), Some(32));
        assert!(fsa.alloc(&mut storage, 12).is_none());
    }

    #[test]
    fn test_saturation_and_reuse() {
        let mut counts = [0; FSA_CLASS_COUNT];
        counts[1] = 8;
        let (mut storage, mut fsa) = fsa_with(counts);
        let ptrs: Vec<_> = (0..8).map(|_| fsa.alloc(&mut storage, 4).unwrap()).collect();
        assert!(fsa.alloc(&mut storage, 4).is_none());

        assert!(fsa.destroy(&mut storage, ptrs[3]).unwrap());
        assert_eq!(fsa.alloc(&mut storage, 4), Some(ptrs[3]));
        assert_eq!(fsa.stats()[1].used, 8);
    }

    #[test]
    fn test_destroy_outside_region_is_not_ours() {
        let mut counts = [0; FSA_CLASS_COUNT];
        counts[0] = 8;
        let (mut storage, mut fsa) = fsa_with(counts);
        assert_eq!(fsa.destroy(&mut storage, Ptr(0)), Ok(false));
    }

    #[test]
    fn test_destroy_errors() {
        let mut counts = [0; FSA_CLASS_COUNT];
        counts[3] = 8;
        let (mut storage, mut fsa) = fsa_with(counts);
        let ptr = fsa.alloc(&mut storage, 16).unwrap();
        assert_eq!(fsa.destroy(&mut storage, Ptr(ptr.0 + 1)), Err(MemoryError::InvalidPointer(ptr.0 + 1)));
        assert!(fsa.destroy(&mut storage, ptr).unwrap());
        assert_eq!(fsa.destroy(&mut storage, ptr), Err(MemoryError::DoubleFree(ptr.0)));
    }

    #[test]
    fn test_destroy_scrubs_payload() {
        let mut counts = [0; FSA_CLASS_COUNT];
        counts[3] = 8;
        let (mut storage, mut fsa) = fsa_with(counts);
        let ptr = fsa.alloc(&mut storage, 16).unwrap();
        storage[ptr.0..ptr.0 + 16].fill(0x55);
        fsa.destroy(&mut storage, ptr).unwrap();
        assert!(storage[ptr.0..ptr.0 + 16].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_skips_full_bitmap_bytes() {
        let mut counts = [0; FSA_CLASS_COUNT];
        counts[0] = 24;
        let (mut storage, mut fsa) = fsa_with(counts);
        let ptrs: Vec<_> = (0..17).map(|_| fsa.alloc(&mut storage, 1).unwrap()).collect();
        let (start, _) = fsa.class_range(0).unwrap();
        assert_eq!(ptrs[16].0, start + 16 * 2);
    }
}
