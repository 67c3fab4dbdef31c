//! Per-array capacities and the exact byte size they imply.

use std::fmt;
use std::mem::size_of;

use crate::error::{SceneError, SceneResult};

use super::elements::{
    Accessor, Animation, AnimationChannel, AnimationSampler, Buffer, BufferView, Camera, GobjHeader,
    Image, Material, Mesh, MeshAttribute, MeshPrimitive, MeshTarget, Node, NodeRef, Sampler, Scene,
    Skin, Texture,
};

/// Number of regions in a Gobj, element arrays plus the string pool and raw data.
pub const SCENE_ARRAY_COUNT: usize = 21;

/// The regions of a Gobj, in layout order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u32)]
pub enum SceneArray {
    /// Typed views into buffer views.
    Accessor,
    /// Keyframe animations.
    Animation,
    /// Animation channels of every animation.
    AnimationChannel,
    /// Animation samplers of every animation.
    AnimationSampler,
    /// Binary buffers.
    Buffer,
    /// Byte ranges of buffers.
    BufferView,
    /// Cameras.
    Camera,
    /// Images.
    Image,
    /// Materials.
    Material,
    /// Meshes.
    Mesh,
    /// Primitives of every mesh.
    MeshPrimitive,
    /// Vertex attributes of every primitive.
    MeshAttribute,
    /// Morph targets of every primitive.
    MeshTarget,
    /// Nodes.
    Node,
    /// Node references: node children, scene roots, skin joints.
    NodeRef,
    /// Texture samplers.
    Sampler,
    /// Scenes.
    Scene,
    /// Skins.
    Skin,
    /// Textures.
    Texture,
    /// NUL-terminated string bytes.
    Strings,
    /// Raw buffer payload bytes.
    RawData,
}

impl SceneArray {
    /// Every region in layout order.
    pub const ALL: [Self; SCENE_ARRAY_COUNT] = [
        Self::Accessor,
        Self::Animation,
        Self::AnimationChannel,
        Self::AnimationSampler,
        Self::Buffer,
        Self::BufferView,
        Self::Camera,
        Self::Image,
        Self::Material,
        Self::Mesh,
        Self::MeshPrimitive,
        Self::MeshAttribute,
        Self::MeshTarget,
        Self::Node,
        Self::NodeRef,
        Self::Sampler,
        Self::Scene,
        Self::Skin,
        Self::Texture,
        Self::Strings,
        Self::RawData,
    ];

    /// Position in [`SceneArray::ALL`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self as usize
    }

    /// Bytes per slot (1 for the byte regions).
    #[must_use]
    pub const fn element_size(self) -> usize {
        match self {
            Self::Accessor => size_of::<Accessor>(),
            Self::Animation => size_of::<Animation>(),
            Self::AnimationChannel => size_of::<AnimationChannel>(),
            Self::AnimationSampler => size_of::<AnimationSampler>(),
            Self::Buffer => size_of::<Buffer>(),
            Self::BufferView => size_of::<BufferView>(),
            Self::Camera => size_of::<Camera>(),
            Self::Image => size_of::<Image>(),
            Self::Material => size_of::<Material>(),
            Self::Mesh => size_of::<Mesh>(),
            Self::MeshPrimitive => size_of::<MeshPrimitive>(),
            Self::MeshAttribute => size_of::<MeshAttribute>(),
            Self::MeshTarget => size_of::<MeshTarget>(),
            Self::Node => size_of::<Node>(),
            Self::NodeRef => size_of::<NodeRef>(),
            Self::Sampler => size_of::<Sampler>(),
            Self::Scene => size_of::<Scene>(),
            Self::Skin => size_of::<Skin>(),
            Self::Texture => size_of::<Texture>(),
            Self::Strings | Self::RawData => 1,
        }
    }

    /// Returns whether this region holds bytes rather than elements.
    #[inline]
    #[must_use]
    pub const fn is_bytes(self) -> bool {
        matches!(self, Self::Strings | Self::RawData)
    }
}

impl fmt::Display for SceneArray {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Element count (or byte count, for the byte regions) per [`SceneArray`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Counts {
    values: [usize; SCENE_ARRAY_COUNT],
}

impl Counts {
    /// All zero.
    #[must_use]
    pub const fn new() -> Self {
        Self { values: [0; SCENE_ARRAY_COUNT] }
    }

    /// Count for `array`.
    #[inline]
    #[must_use]
    pub const fn get(&self, array: SceneArray) -> usize {
        self.values[array.index()]
    }

    /// Sets the count for `array`.
    #[inline]
    pub fn set(&mut self, array: SceneArray, value: usize) {
        self.values[array.index()] = value;
    }

    /// Adds to the count for `array`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` when the count overflows.
    #[inline]
    pub fn add(&mut self, array: SceneArray, value: usize) -> SceneResult<()> {
        let slot = &mut self.values[array.index()];
        *slot = slot.checked_add(value).ok_or_else(|| overflow(array))?;
        Ok(())
    }

    /// Builder-style [`Counts::set`].
    #[must_use]
    pub fn with(mut self, array: SceneArray, value: usize) -> Self {
        self.values[array.index()] = value;
        self
    }

    /// Element-wise maximum, used to size a grown copy.
    #[must_use]
    pub fn max(&self, other: &Self) -> Self {
        let mut out = *self;
        for (slot, value) in out.values.iter_mut().zip(other.values) {
            *slot = (*slot).max(value);
        }
        out
    }

    /// `(array, count)` pairs in layout order.
    pub fn iter(&self) -> impl Iterator<Item = (SceneArray, usize)> + '_ {
        SceneArray::ALL.iter().map(|&array| (array, self.get(array)))
    }

    /// Bytes reserved for `array` including its trailing alignment padding.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` when the size overflows.
    pub fn region_size(&self, array: SceneArray, align: usize) -> SceneResult<usize> {
        array
            .element_size()
            .checked_mul(self.get(array))
            .and_then(|bytes| checked_align(bytes, align))
            .ok_or_else(|| overflow(array))
    }

    /// Exact size of a Gobj with these capacities: the aligned header plus
    /// every region padded to `align`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidValue` when the size overflows, which only absurd
    /// counts from a malformed document can cause.
    pub fn total_size(&self, align: usize) -> SceneResult<usize> {
        let header = checked_align(size_of::<GobjHeader>(), align).ok_or_else(|| overflow("header"))?;
        SceneArray::ALL.iter().try_fold(header, |total, &array| {
            total.checked_add(self.region_size(array, align)?).ok_or_else(|| overflow(array))
        })
    }
}

fn checked_align(value: usize, align: usize) -> Option<usize> {
    if align <= 1 {
        Some(value)
    } else {
        value.checked_next_multiple_of(align)
    }
}

fn overflow(path: impl fmt::Display) -> SceneError {
    SceneError::InvalidValue { path: path.to_string(), message: "size overflows the address space".to_string() }
}
