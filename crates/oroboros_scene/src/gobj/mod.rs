//! # Scene Object Graph (Gobj)
//!
//! A loaded scene lives in one contiguous byte region:
//!
//! ```text
//! ┌─────────────┬───────────┬───────────┬─────┬─────────┬──────────┐
//! │ GobjHeader  │ accessors │ animations│ ... │ strings │ raw data │
//! └─────────────┴───────────┴───────────┴─────┴─────────┴──────────┘
//!  each region padded to the Gobj alignment
//! ```
//!
//! Capacities are fixed when the Gobj is created. Elements are appended with
//! [`Gobj::push`] and read back by id; every id is an index into a sibling
//! region, so moving the bytes never invalidates the graph.

mod counts;
mod elements;

pub use counts::{Counts, SceneArray, SCENE_ARRAY_COUNT};
pub use elements::*;

use std::mem::size_of;

use oroboros_memory::align_up;

use crate::error::{SceneError, SceneResult};

const HEADER_SIZE: usize = size_of::<GobjHeader>();

/// A scene object graph over a byte buffer.
///
/// `B` is `&[u8]` for read-only access and `&mut [u8]` (or `Vec<u8>`) for
/// building.
pub struct Gobj<B> {
    bytes: B,
    header: GobjHeader,
}

impl<B: AsRef<[u8]>> Gobj<B> {
    /// Opens an existing Gobj.
    ///
    /// # Errors
    ///
    /// Returns `Invariant` if the header is damaged or the buffer is too short.
    pub fn open(bytes: B) -> SceneResult<Self> {
        let data = bytes.as_ref();
        if data.len() < HEADER_SIZE {
            return Err(SceneError::Invariant(format!("{} bytes cannot hold a gobj header", data.len())));
        }
        let header: GobjHeader = bytemuck::pod_read_unaligned(&data[..HEADER_SIZE]);
        if header.magic != GOBJ_MAGIC || header.version != GOBJ_VERSION {
            return Err(SceneError::Invariant("bad gobj magic or version".to_string()));
        }
        if header.total_size as usize > data.len() {
            return Err(SceneError::Invariant(format!(
                "gobj declares {} bytes, buffer holds {}",
                header.total_size,
                data.len()
            )));
        }
        for array in SceneArray::ALL {
            let i = array.index();
            let end = header.offsets[i] as usize + array.element_size() * header.max[i] as usize;
            if header.used[i] > header.max[i] || end > header.total_size as usize {
                return Err(SceneError::Invariant(format!("{array} region is out of bounds")));
            }
        }
        Ok(Self { bytes, header })
    }

    /// The header.
    #[inline]
    #[must_use]
    pub const fn header(&self) -> &GobjHeader {
        &self.header
    }

    /// Region alignment.
    #[inline]
    #[must_use]
    pub const fn align(&self) -> usize {
        self.header.align as usize
    }

    /// Bytes covered by this Gobj.
    #[inline]
    #[must_use]
    pub const fn total_size(&self) -> usize {
        self.header.total_size as usize
    }

    /// Used slots (or bytes) of `array`.
    #[inline]
    #[must_use]
    pub const fn used(&self, array: SceneArray) -> usize {
        self.header.used[array.index()] as usize
    }

    /// Reserved capacity of `array`.
    #[inline]
    #[must_use]
    pub const fn max(&self, array: SceneArray) -> usize {
        self.header.max[array.index()] as usize
    }

    /// Used counts of every region.
    #[must_use]
    pub fn used_counts(&self) -> Counts {
        let mut counts = Counts::new();
        for array in SceneArray::ALL {
            counts.set(array, self.used(array));
        }
        counts
    }

    /// Capacities of every region.
    #[must_use]
    pub fn capacity(&self) -> Counts {
        let mut counts = Counts::new();
        for array in SceneArray::ALL {
            counts.set(array, self.max(array));
        }
        counts
    }

    /// Number of used elements of type `T`.
    #[inline]
    #[must_use]
    pub const fn len<T: Element>(&self) -> usize {
        self.used(T::ARRAY)
    }

    /// The element behind `id`, `None` when unset or not yet pushed.
    #[must_use]
    pub fn get<T: Element>(&self, id: T::Id) -> Option<T> {
        self.element(id.index()?)
    }

    /// The element at `index`, `None` past the used count.
    #[must_use]
    pub fn element<T: Element>(&self, index: usize) -> Option<T> {
        if index >= self.used(T::ARRAY) {
            return None;
        }
        let at = self.slot(T::ARRAY, index);
        Some(bytemuck::pod_read_unaligned(&self.bytes.as_ref()[at..at + size_of::<T>()]))
    }

    /// Iterates over every used element of type `T`.
    pub fn iter<T: Element>(&self) -> impl Iterator<Item = T> + '_ {
        (0..self.len::<T>()).filter_map(move |index| self.element(index))
    }

    /// Elements `span` covers, skipping anything past the used count.
    pub fn span<T: Element>(&self, span: Span) -> impl Iterator<Item = T> + '_ {
        span.indices().filter_map(move |index| self.element(index))
    }

    /// A pool string, `None` when unset or not valid UTF-8.
    #[must_use]
    pub fn str(&self, string: StrRef) -> Option<&str> {
        if !string.is_some() {
            return None;
        }
        let (offset, len) = (string.offset as usize, string.len as usize);
        if offset + len >= self.used(SceneArray::Strings) {
            return None;
        }
        let start = self.header.offsets[SceneArray::Strings.index()] as usize + offset;
        std::str::from_utf8(&self.bytes.as_ref()[start..start + len]).ok()
    }

    /// Name of an element, or `""`.
    #[must_use]
    pub fn name_of(&self, name: StrRef) -> &str {
        self.str(name).unwrap_or("")
    }

    /// Raw payload bytes.
    #[must_use]
    pub fn raw(&self, range: RawRange) -> Option<&[u8]> {
        let (offset, len) = (range.offset as usize, range.len as usize);
        if offset + len > self.used(SceneArray::RawData) {
            return None;
        }
        let start = self.header.offsets[SceneArray::RawData.index()] as usize + offset;
        Some(&self.bytes.as_ref()[start..start + len])
    }

    /// Payload of a buffer.
    #[must_use]
    pub fn buffer_data(&self, id: BufferId) -> Option<&[u8]> {
        self.raw(self.get::<Buffer>(id)?.data)
    }

    /// The default scene.
    #[inline]
    #[must_use]
    pub const fn default_scene(&self) -> SceneId {
        self.header.default_scene
    }

    /// An `asset` metadata string.
    #[must_use]
    pub fn asset(&self, field: AssetField) -> Option<&str> {
        self.str(self.header.asset[field as usize])
    }

    /// Checks the used counts against what pass 1 counted.
    ///
    /// # Errors
    ///
    /// Returns `CountMismatch` for the first disagreeing region.
    pub fn check_counts(&self, expected: &Counts) -> SceneResult<()> {
        for (array, count) in expected.iter() {
            let actual = self.used(array);
            if actual != count {
                return Err(SceneError::CountMismatch { array, expected: count, actual });
            }
        }
        Ok(())
    }

    /// Checks that every reference is unset or lands inside the used part of
    /// its target region, and that every string is NUL-terminated.
    ///
    /// # Errors
    ///
    /// Returns `Invariant` describing the first bad reference.
    pub fn validate(&self) -> SceneResult<()> {
        let used = self.used_counts();
        let strings = self.string_pool();
        let mut problem: Option<String> = None;
        let mut check = |owner: SceneArray, index: usize, reference: RefMut<'_>| {
            if problem.is_some() {
                return;
            }
            let ok = match reference {
                RefMut::Id(target, raw) => *raw == NONE_INDEX || (*raw as usize) < used.get(target),
                RefMut::Span(target, span) => span.count == 0 || span.indices().end <= used.get(target),
                RefMut::Str(string) => {
                    !string.is_some() || {
                        let end = string.offset as usize + string.len as usize;
                        strings.get(end) == Some(&0)
                    }
                }
                RefMut::Raw(range) => range.offset as usize + range.len as usize <= used.get(SceneArray::RawData),
            };
            if !ok {
                problem = Some(format!("{owner} {index} holds a dangling reference"));
            }
        };

        for_each_element(self, |owner, index, reference| check(owner, index, reference));
        if let Some(problem) = problem {
            return Err(SceneError::Invariant(problem));
        }

        let scene = self.header.default_scene;
        if scene.index().is_some_and(|index| index >= used.get(SceneArray::Scene)) {
            return Err(SceneError::Invariant(format!("default scene {} does not exist", scene.0)));
        }
        for string in self.header.asset {
            if string.is_some() && self.str(string).is_none() {
                return Err(SceneError::Invariant("asset metadata string is dangling".to_string()));
            }
        }
        Ok(())
    }

    fn slot(&self, array: SceneArray, index: usize) -> usize {
        self.header.offsets[array.index()] as usize + index * array.element_size()
    }

    fn string_pool(&self) -> &[u8] {
        let start = self.header.offsets[SceneArray::Strings.index()] as usize;
        &self.bytes.as_ref()[start..start + self.used(SceneArray::Strings)]
    }

    fn region(&self, array: SceneArray, count: usize) -> &[u8] {
        let start = self.header.offsets[array.index()] as usize;
        &self.bytes.as_ref()[start..start + count * array.element_size()]
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Gobj<B> {
    /// Lays out an empty Gobj with `counts` capacities in `bytes` and
    /// default-constructs every slot.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` if `bytes` is shorter than
    /// `counts.total_size(align)`, or `Invariant` if `align` is not a power of
    /// two or the layout does not fit in `u32`, and `InvalidValue` if the
    /// layout size overflows.
    pub fn create(mut bytes: B, counts: &Counts, align: usize) -> SceneResult<Self> {
        if !align.is_power_of_two() {
            return Err(SceneError::Invariant(format!("gobj alignment {align} is not a power of two")));
        }
        let total = counts.total_size(align)?;
        if bytes.as_ref().len() < total {
            return Err(SceneError::CapacityExceeded { array: SceneArray::RawData, capacity: bytes.as_ref().len() });
        }
        let total_u32 = u32::try_from(total)
            .map_err(|_| SceneError::Invariant(format!("gobj of {total} bytes exceeds the 4GB layout")))?;

        let mut header = GobjHeader {
            magic: GOBJ_MAGIC,
            version: GOBJ_VERSION,
            align: align as u32,
            total_size: total_u32,
            offsets: [0; SCENE_ARRAY_COUNT],
            max: [0; SCENE_ARRAY_COUNT],
            used: [0; SCENE_ARRAY_COUNT],
            default_scene: SceneId::NONE,
            asset: [StrRef::NONE; 4],
        };

        let mut cursor = align_up(HEADER_SIZE, align);
        for array in SceneArray::ALL {
            let i = array.index();
            header.offsets[i] = cursor as u32;
            header.max[i] = counts.get(array) as u32;
            cursor += counts.region_size(array, align)?;
        }

        let data = bytes.as_mut();
        data[..total].fill(0);
        data[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&header));

        let mut gobj = Self { bytes, header };
        gobj.fill_defaults::<Accessor>();
        gobj.fill_defaults::<Animation>();
        gobj.fill_defaults::<AnimationChannel>();
        gobj.fill_defaults::<AnimationSampler>();
        gobj.fill_defaults::<Buffer>();
        gobj.fill_defaults::<BufferView>();
        gobj.fill_defaults::<Camera>();
        gobj.fill_defaults::<Image>();
        gobj.fill_defaults::<Material>();
        gobj.fill_defaults::<Mesh>();
        gobj.fill_defaults::<MeshPrimitive>();
        gobj.fill_defaults::<MeshAttribute>();
        gobj.fill_defaults::<MeshTarget>();
        gobj.fill_defaults::<Node>();
        gobj.fill_defaults::<NodeRef>();
        gobj.fill_defaults::<Sampler>();
        gobj.fill_defaults::<Scene>();
        gobj.fill_defaults::<Skin>();
        gobj.fill_defaults::<Texture>();
        Ok(gobj)
    }

    /// Appends `value` and returns its id.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` when the region is full.
    pub fn push<T: Element>(&mut self, value: T) -> SceneResult<T::Id> {
        let index = self.used(T::ARRAY);
        if index >= self.max(T::ARRAY) {
            tracing::warn!("gobj {} region full at {} elements", T::ARRAY, index);
            return Err(SceneError::CapacityExceeded { array: T::ARRAY, capacity: self.max(T::ARRAY) });
        }
        self.write_slot(index, &value);
        self.header.used[T::ARRAY.index()] += 1;
        self.commit_header();
        Ok(<T::Id as ElementId>::from_raw(index as u32))
    }

    /// Overwrites the element behind `id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference` when `id` is unset or not yet pushed.
    pub fn set<T: Element>(&mut self, id: T::Id, value: T) -> SceneResult<()> {
        let index = self.checked_index::<T>(id)?;
        self.write_slot(index, &value);
        Ok(())
    }

    /// Read-modify-write of the element behind `id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidReference` when `id` is unset or not yet pushed.
    pub fn update<T: Element, R>(&mut self, id: T::Id, f: impl FnOnce(&mut T) -> R) -> SceneResult<R> {
        let index = self.checked_index::<T>(id)?;
        let mut value: T = self.element(index).unwrap_or_default();
        let result = f(&mut value);
        self.write_slot(index, &value);
        Ok(result)
    }

    /// Appends a NUL-terminated copy of `text` to the string pool.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` when the pool is full.
    pub fn push_str(&mut self, text: &str) -> SceneResult<StrRef> {
        let i = SceneArray::Strings.index();
        let offset = self.header.used[i] as usize;
        let needed = text.len() + 1;
        if offset + needed > self.header.max[i] as usize {
            tracing::warn!("gobj string pool full: {} + {} bytes", offset, needed);
            return Err(SceneError::CapacityExceeded { array: SceneArray::Strings, capacity: self.max(SceneArray::Strings) });
        }
        let start = self.header.offsets[i] as usize + offset;
        let data = self.bytes.as_mut();
        data[start..start + text.len()].copy_from_slice(text.as_bytes());
        data[start + text.len()] = 0;
        self.header.used[i] += needed as u32;
        self.commit_header();
        Ok(StrRef { offset: offset as u32, len: text.len() as u32 })
    }

    /// Reserves `len` zeroed bytes of the raw region.
    ///
    /// # Errors
    ///
    /// Returns `CapacityExceeded` when the region is full.
    pub fn reserve_raw(&mut self, len: usize) -> SceneResult<RawRange> {
        let i = SceneArray::RawData.index();
        let offset = self.header.used[i] as usize;
        if offset + len > self.header.max[i] as usize {
            tracing::warn!("gobj raw region full: {} + {} bytes", offset, len);
            return Err(SceneError::CapacityExceeded { array: SceneArray::RawData, capacity: self.max(SceneArray::RawData) });
        }
        self.header.used[i] += len as u32;
        self.commit_header();
        Ok(RawRange { offset: offset as u32, len: len as u32 })
    }

    /// Mutable raw payload bytes.
    pub fn raw_mut(&mut self, range: RawRange) -> Option<&mut [u8]> {
        let (offset, len) = (range.offset as usize, range.len as usize);
        if offset + len > self.used(SceneArray::RawData) {
            return None;
        }
        let start = self.header.offsets[SceneArray::RawData.index()] as usize + offset;
        Some(&mut self.bytes.as_mut()[start..start + len])
    }

    /// Sets the default scene.
    pub fn set_default_scene(&mut self, scene: SceneId) {
        self.header.default_scene = scene;
        self.commit_header();
    }

    /// Sets an `asset` metadata string.
    pub fn set_asset(&mut self, field: AssetField, value: StrRef) {
        self.header.asset[field as usize] = value;
        self.commit_header();
    }

    /// Copies `source` into this Gobj.
    ///
    /// Each region receives `min(source used, own capacity)` elements; own
    /// capacities are never changed. References that would point past what
    /// was copied are cleared. Since references are indices, nothing else
    /// needs rebasing.
    ///
    /// # Errors
    ///
    /// Returns `Invariant` if the source is damaged.
    pub fn copy_from<S: AsRef<[u8]>>(&mut self, source: &Gobj<S>) -> SceneResult<()> {
        let mut truncated = false;
        for array in SceneArray::ALL {
            let i = array.index();
            let count = source.used(array).min(self.max(array));
            truncated |= count < source.used(array);
            let start = self.header.offsets[i] as usize;
            let len = count * array.element_size();
            self.bytes.as_mut()[start..start + len].copy_from_slice(source.region(array, count));
            self.header.used[i] = count as u32;
        }
        self.header.default_scene = source.header.default_scene;
        self.header.asset = source.header.asset;
        self.commit_header();

        if truncated {
            tracing::warn!("gobj copy truncated to destination capacity, clearing dangling references");
            self.clear_dangling();
        }
        Ok(())
    }

    fn clear_dangling(&mut self) {
        let used = self.used_counts();
        let pool_used = used.get(SceneArray::Strings);
        let fits_string = |string: &StrRef| string.offset as usize + string.len as usize + 1 <= pool_used;

        let fix: &mut dyn FnMut(RefMut<'_>) = &mut |reference| match reference {
            RefMut::Id(target, raw) => {
                if *raw != NONE_INDEX && *raw as usize >= used.get(target) {
                    *raw = NONE_INDEX;
                }
            }
            RefMut::Span(target, span) => {
                let limit = used.get(target);
                if span.first as usize >= limit {
                    *span = Span::default();
                } else if span.indices().end > limit {
                    span.count = (limit - span.first as usize) as u32;
                }
            }
            RefMut::Str(string) => {
                if string.is_some() && !fits_string(string) {
                    *string = StrRef::NONE;
                }
            }
            RefMut::Raw(range) => {
                if range.offset as usize + range.len as usize > used.get(SceneArray::RawData) {
                    *range = RawRange::default();
                }
            }
        };

        self.fix_all::<Accessor>(fix);
        self.fix_all::<Animation>(fix);
        self.fix_all::<AnimationChannel>(fix);
        self.fix_all::<AnimationSampler>(fix);
        self.fix_all::<Buffer>(fix);
        self.fix_all::<BufferView>(fix);
        self.fix_all::<Camera>(fix);
        self.fix_all::<Image>(fix);
        self.fix_all::<Material>(fix);
        self.fix_all::<Mesh>(fix);
        self.fix_all::<MeshPrimitive>(fix);
        self.fix_all::<MeshAttribute>(fix);
        self.fix_all::<MeshTarget>(fix);
        self.fix_all::<Node>(fix);
        self.fix_all::<NodeRef>(fix);
        self.fix_all::<Sampler>(fix);
        self.fix_all::<Scene>(fix);
        self.fix_all::<Skin>(fix);
        self.fix_all::<Texture>(fix);

        let scene = self.header.default_scene;
        if scene.index().is_some_and(|index| index >= used.get(SceneArray::Scene)) {
            self.header.default_scene = SceneId::NONE;
        }
        for string in &mut self.header.asset {
            if string.is_some() && !fits_string(string) {
                *string = StrRef::NONE;
            }
        }
        self.commit_header();
    }

    fn fix_all<T: Element>(&mut self, fix: &mut dyn FnMut(RefMut<'_>)) {
        for index in 0..self.len::<T>() {
            if let Some(mut value) = self.element::<T>(index) {
                value.visit_refs(fix);
                self.write_slot(index, &value);
            }
        }
    }

    fn fill_defaults<T: Element>(&mut self) {
        let value = T::default();
        for index in 0..self.max(T::ARRAY) {
            self.write_slot(index, &value);
        }
    }

    fn checked_index<T: Element>(&self, id: T::Id) -> SceneResult<usize> {
        match id.index() {
            Some(index) if index < self.used(T::ARRAY) => Ok(index),
            _ => Err(SceneError::InvalidReference { array: T::ARRAY, index: u64::from(id.raw()) }),
        }
    }

    fn write_slot<T: Element>(&mut self, index: usize, value: &T) {
        let at = self.slot(T::ARRAY, index);
        self.bytes.as_mut()[at..at + size_of::<T>()].copy_from_slice(bytemuck::bytes_of(value));
    }

    fn commit_header(&mut self) {
        self.bytes.as_mut()[..HEADER_SIZE].copy_from_slice(bytemuck::bytes_of(&self.header));
    }
}

/// Hands every reference of every used element to `visit`, tagged with its owner.
fn for_each_element<B: AsRef<[u8]>>(gobj: &Gobj<B>, mut visit: impl FnMut(SceneArray, usize, RefMut<'_>)) {
    fn walk<T: Element, B: AsRef<[u8]>>(gobj: &Gobj<B>, visit: &mut dyn FnMut(SceneArray, usize, RefMut<'_>)) {
        for (index, mut value) in gobj.iter::<T>().enumerate() {
            value.visit_refs(&mut |reference| visit(T::ARRAY, index, reference));
        }
    }

    let visit: &mut dyn FnMut(SceneArray, usize, RefMut<'_>) = &mut visit;
    walk::<Accessor, B>(gobj, visit);
    walk::<Animation, B>(gobj, visit);
    walk::<AnimationChannel, B>(gobj, visit);
    walk::<AnimationSampler, B>(gobj, visit);
    walk::<Buffer, B>(gobj, visit);
    walk::<BufferView, B>(gobj, visit);
    walk::<Camera, B>(gobj, visit);
    walk::<Image, B>(gobj, visit);
    walk::<Material, B>(gobj, visit);
    walk::<Mesh, B>(gobj, visit);
    walk::<MeshPrimitive, B>(gobj, visit);
    walk::<MeshAttribute, B>(gobj, visit);
    walk::<MeshTarget, B>(gobj, visit);
    walk::<Node, B>(gobj, visit);
    walk::<NodeRef, B>(gobj, visit);
    walk::<Sampler, B>(gobj, visit);
    walk::<Scene, B>(gobj, visit);
    walk::<Skin, B>(gobj, visit);
    walk::<Texture, B>(gobj, visit);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small_counts() -> Counts {
        Counts::new()
            .with(SceneArray::Node, 3)
            .with(SceneArray::NodeRef, 2)
            .with(SceneArray::Mesh, 1)
            .with(SceneArray::Scene, 1)
            .with(SceneArray::Strings, 32)
            .with(SceneArray::RawData, 8)
    }

    fn build(counts: &Counts) -> Gobj<Vec<u8>> {
        let bytes = vec![0u8; counts.total_size(16).unwrap()];
        Gobj::create(bytes, counts, 16).unwrap()
    }

    #[test]
    fn test_create_lays_out_regions() {
        let counts = small_counts();
        let gobj = build(&counts);
        assert_eq!(gobj.total_size(), counts.total_size(16).unwrap());
        assert_eq!(gobj.capacity(), counts);
        assert_eq!(gobj.used_counts(), Counts::new());
        for array in SceneArray::ALL {
            assert_eq!(gobj.header().offsets[array.index()] % 16, 0);
        }
    }

    #[test]
    fn test_create_rejects_short_buffer() {
        let counts = small_counts();
        let bytes = vec![0u8; counts.total_size(16).unwrap() - 1];
        assert!(matches!(Gobj::create(bytes, &counts, 16), Err(SceneError::CapacityExceeded { .. })));
    }

    #[test]
    fn test_push_get_update() {
        let mut gobj = build(&small_counts());
        let name = gobj.push_str("root").unwrap();
        let root = gobj.push(Node { name, ..Node::default() }).unwrap();
        let child = gobj.push(Node::default()).unwrap();
        let link = gobj.push(NodeRef { node: child }).unwrap();

        gobj.update(root, |node: &mut Node| node.children.extend(link.0)).unwrap();
        let node: Node = gobj.get(root).unwrap();
        assert_eq!(gobj.str(node.name), Some("root"));
        let kids: Vec<NodeRef> = gobj.span(node.children).collect();
        assert_eq!(kids, vec![NodeRef { node: child }]);
        assert!(gobj.get::<Node>(NodeId::NONE).is_none());
        gobj.validate().unwrap();
    }

    #[test]
    fn test_push_past_capacity() {
        let mut gobj = build(&small_counts());
        gobj.push(Mesh::default()).unwrap();
        assert!(matches!(
            gobj.push(Mesh::default()),
            Err(SceneError::CapacityExceeded { array: SceneArray::Mesh, capacity: 1 })
        ));
        assert!(gobj.push_str(&"x".repeat(40)).is_err());
    }

    #[test]
    fn test_reopen_preserves_contents() {
        let mut gobj = build(&small_counts());
        let range = gobj.reserve_raw(4).unwrap();
        gobj.raw_mut(range).unwrap().copy_from_slice(&[1, 2, 3, 4]);
        let bytes = gobj.bytes;

        let reopened = Gobj::open(bytes.as_slice()).unwrap();
        assert_eq!(reopened.raw(range), Some(&[1u8, 2, 3, 4][..]));
        assert_eq!(reopened.used(SceneArray::RawData), 4);
    }

    #[test]
    fn test_open_rejects_garbage() {
        assert!(Gobj::open(vec![0u8; 8]).is_err());
        assert!(Gobj::open(vec![0u8; 1024]).is_err());
    }

    #[test]
    fn test_validate_catches_dangling_reference() {
        let mut gobj = build(&small_counts());
        gobj.push(Node { mesh: MeshId(0), ..Node::default() }).unwrap();
        assert!(matches!(gobj.validate(), Err(SceneError::Invariant(_))));
        gobj.push(Mesh::default()).unwrap();
        gobj.validate().unwrap();
    }

    #[test]
    fn test_check_counts() {
        let mut gobj = build(&small_counts());
        gobj.push(Node::default()).unwrap();
        let expected = Counts::new().with(SceneArray::Node, 1);
        gobj.check_counts(&expected).unwrap();
        let wrong = Counts::new().with(SceneArray::Node, 2);
        assert!(matches!(gobj.check_counts(&wrong), Err(SceneError::CountMismatch { .. })));
    }

    #[test]
    fn test_copy_into_larger_keeps_graph() {
        let mut source = build(&small_counts());
        let name = source.push_str("a").unwrap();
        let mesh = source.push(Mesh { name, ..Mesh::default() }).unwrap();
        let node = source.push(Node { mesh, ..Node::default() }).unwrap();
        let scene = source.push(Scene::default()).unwrap();
        source.set_default_scene(scene);

        let bigger = small_counts().with(SceneArray::Node, 10).with(SceneArray::Strings, 128);
        let mut dest = build(&bigger);
        dest.copy_from(&source).unwrap();

        assert_eq!(dest.capacity(), bigger);
        assert_eq!(dest.used_counts(), source.used_counts());
        let copied: Node = dest.get(node).unwrap();
        let copied_mesh: Mesh = dest.get(copied.mesh).unwrap();
        assert_eq!(dest.str(copied_mesh.name), Some("a"));
        assert_eq!(dest.default_scene(), scene);
        dest.validate().unwrap();
    }

    #[test]
    fn test_copy_into_smaller_clears_dangling() {
        let mut source = build(&small_counts());
        let mesh = source.push(Mesh::default()).unwrap();
        source.push(Node::default()).unwrap();
        let second = source.push(Node { mesh, ..Node::default() }).unwrap();
        let link = source.push(NodeRef { node: second }).unwrap();
        source.update(NodeId(0), |node: &mut Node| node.children.extend(link.0)).unwrap();

        let smaller = small_counts().with(SceneArray::Node, 1).with(SceneArray::Mesh, 0);
        let mut dest = build(&smaller);
        dest.copy_from(&source).unwrap();

        assert_eq!(dest.used(SceneArray::Node), 1);
        let link: NodeRef = dest.element(0).unwrap();
        assert!(link.node.is_none());
        dest.validate().unwrap();
    }
}
