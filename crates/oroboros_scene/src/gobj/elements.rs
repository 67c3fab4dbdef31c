//! # Gobj Elements
//!
//! Plain-old-data records stored in the Gobj arrays. Cross references are
//! typed indices into sibling arrays of the same Gobj, so a byte copy of the
//! whole graph stays valid at any address.

use bytemuck::{Pod, Zeroable};

use super::counts::{SceneArray, SCENE_ARRAY_COUNT};
use crate::math::Mat4;

/// Raw sentinel stored in every unset reference.
pub const NONE_INDEX: u32 = u32::MAX;

/// A typed index into one Gobj array.
pub trait ElementId: Copy + Eq + std::fmt::Debug {
    /// The array this id indexes.
    const ARRAY: SceneArray;
    /// The unset id.
    const NONE: Self;

    /// Wraps a raw index.
    fn from_raw(raw: u32) -> Self;

    /// The raw index, [`NONE_INDEX`] when unset.
    fn raw(self) -> u32;

    /// Index as `usize`, `None` when unset.
    #[inline]
    fn index(self) -> Option<usize> {
        (self.raw() != NONE_INDEX).then_some(self.raw() as usize)
    }

    /// Returns whether the id is unset.
    #[inline]
    fn is_none(self) -> bool {
        self.raw() == NONE_INDEX
    }
}

macro_rules! element_ids {
    ($($(#[$meta:meta])* $name:ident => $array:ident;)*) => {
        $(
            $(#[$meta])*
            #[repr(transparent)]
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
            pub struct $name(pub u32);

            impl $name {
                /// The unset id.
                pub const NONE: Self = Self(NONE_INDEX);
            }

            impl Default for $name {
                fn default() -> Self {
                    Self::NONE
                }
            }

            impl ElementId for $name {
                const ARRAY: SceneArray = SceneArray::$array;
                const NONE: Self = Self(NONE_INDEX);

                #[inline]
                fn from_raw(raw: u32) -> Self {
                    Self(raw)
                }

                #[inline]
                fn raw(self) -> u32 {
                    self.0
                }
            }
        )*
    };
}

element_ids! {
    /// Index into the accessor array.
    AccessorId => Accessor;
    /// Index into the animation array.
    AnimationId => Animation;
    /// Index into the animation channel array.
    AnimationChannelId => AnimationChannel;
    /// Index into the animation sampler array.
    AnimationSamplerId => AnimationSampler;
    /// Index into the buffer array.
    BufferId => Buffer;
    /// Index into the buffer view array.
    BufferViewId => BufferView;
    /// Index into the camera array.
    CameraId => Camera;
    /// Index into the image array.
    ImageId => Image;
    /// Index into the material array.
    MaterialId => Material;
    /// Index into the mesh array.
    MeshId => Mesh;
    /// Index into the primitive array.
    MeshPrimitiveId => MeshPrimitive;
    /// Index into the attribute array.
    MeshAttributeId => MeshAttribute;
    /// Index into the morph target array.
    MeshTargetId => MeshTarget;
    /// Index into the node array.
    NodeId => Node;
    /// Index into the node reference array.
    NodeRefId => NodeRef;
    /// Index into the sampler array.
    SamplerId => Sampler;
    /// Index into the scene array.
    SceneId => Scene;
    /// Index into the skin array.
    SkinId => Skin;
    /// Index into the texture array.
    TextureId => Texture;
}

/// A string in the pool: `len` bytes at `offset`, followed by a NUL.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct StrRef {
    /// Pool offset, [`NONE_INDEX`] when unset.
    pub offset: u32,
    /// Length without the terminator.
    pub len: u32,
}

impl StrRef {
    /// No string.
    pub const NONE: Self = Self { offset: NONE_INDEX, len: 0 };

    /// Returns whether a string is set.
    #[inline]
    #[must_use]
    pub const fn is_some(self) -> bool {
        self.offset != NONE_INDEX
    }
}

impl Default for StrRef {
    fn default() -> Self {
        Self::NONE
    }
}

/// A byte range of the raw payload region.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct RawRange {
    /// Offset into the raw region.
    pub offset: u32,
    /// Length in bytes.
    pub len: u32,
}

/// A contiguous run of `count` elements starting at `first`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Pod, Zeroable)]
pub struct Span {
    /// First element.
    pub first: u32,
    /// Number of elements.
    pub count: u32,
}

impl Span {
    /// Indices covered by the span.
    #[must_use]
    pub fn indices(self) -> std::ops::Range<usize> {
        self.first as usize..self.first as usize + self.count as usize
    }

    /// Appends element `index`: starts the span on the first call.
    pub fn extend(&mut self, index: u32) {
        if self.count == 0 {
            self.first = index;
        }
        self.count += 1;
    }
}

/// One reference field inside an element, handed out by [`Element::visit_refs`].
pub enum RefMut<'a> {
    /// A single typed index.
    Id(SceneArray, &'a mut u32),
    /// A run of elements.
    Span(SceneArray, &'a mut Span),
    /// A pool string.
    Str(&'a mut StrRef),
    /// Raw payload bytes.
    Raw(&'a mut RawRange),
}

/// A record stored in one of the Gobj arrays.
pub trait Element: Pod + Default {
    /// The array holding this element.
    const ARRAY: SceneArray;
    /// Its id type.
    type Id: ElementId;

    /// Hands every reference field to `visit`.
    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>));
}

/// How to read an accessor's components.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum ComponentType {
    /// `i8`
    Byte = 5120,
    /// `u8`
    UnsignedByte = 5121,
    /// `i16`
    Short = 5122,
    /// `u16`
    UnsignedShort = 5123,
    /// `u32`
    UnsignedInt = 5125,
    /// `f32`
    Float = 5126,
}

impl ComponentType {
    /// Decodes the document's numeric code.
    #[must_use]
    pub const fn from_code(code: u32) -> Option<Self> {
        match code {
            5120 => Some(Self::Byte),
            5121 => Some(Self::UnsignedByte),
            5122 => Some(Self::Short),
            5123 => Some(Self::UnsignedShort),
            5125 => Some(Self::UnsignedInt),
            5126 => Some(Self::Float),
            _ => None,
        }
    }

    /// Bytes per component.
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            Self::Byte | Self::UnsignedByte => 1,
            Self::Short | Self::UnsignedShort => 2,
            Self::UnsignedInt | Self::Float => 4,
        }
    }
}

/// Shape of one accessor element.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum AccessorType {
    /// One component.
    Scalar = 1,
    /// Two components.
    Vec2 = 2,
    /// Three components.
    Vec3 = 3,
    /// Four components.
    Vec4 = 4,
    /// 2x2 matrix.
    Mat2 = 5,
    /// 3x3 matrix.
    Mat3 = 6,
    /// 4x4 matrix.
    Mat4 = 7,
}

impl AccessorType {
    /// Parses the document's type name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Some(match name {
            "SCALAR" => Self::Scalar,
            "VEC2" => Self::Vec2,
            "VEC3" => Self::Vec3,
            "VEC4" => Self::Vec4,
            "MAT2" => Self::Mat2,
            "MAT3" => Self::Mat3,
            "MAT4" => Self::Mat4,
            _ => return None,
        })
    }

    /// Decodes the stored tag.
    #[must_use]
    pub const fn from_u32(tag: u32) -> Option<Self> {
        match tag {
            1 => Some(Self::Scalar),
            2 => Some(Self::Vec2),
            3 => Some(Self::Vec3),
            4 => Some(Self::Vec4),
            5 => Some(Self::Mat2),
            6 => Some(Self::Mat3),
            7 => Some(Self::Mat4),
            _ => None,
        }
    }

    /// Components per element.
    #[must_use]
    pub const fn components(self) -> usize {
        match self {
            Self::Scalar => 1,
            Self::Vec2 => 2,
            Self::Vec3 => 3,
            Self::Vec4 | Self::Mat2 => 4,
            Self::Mat3 => 9,
            Self::Mat4 => 16,
        }
    }
}

/// Vertex attribute semantic.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Semantic {
    /// Anything not recognized, including application-specific names.
    Other = 0,
    /// `POSITION`
    Position = 1,
    /// `NORMAL`
    Normal = 2,
    /// `TANGENT`
    Tangent = 3,
    /// `TEXCOORD_n`
    TexCoord = 4,
    /// `COLOR_n`
    Color = 5,
    /// `JOINTS_n`
    Joints = 6,
    /// `WEIGHTS_n`
    Weights = 7,
}

impl Semantic {
    /// Splits an attribute name into semantic and set index.
    #[must_use]
    pub fn parse(name: &str) -> (Self, u32) {
        let (base, set) = match name.rsplit_once('_') {
            Some((base, digits)) if !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()) => {
                (base, digits.parse().unwrap_or(0))
            }
            _ => (name, 0),
        };
        let semantic = match base {
            "POSITION" => Self::Position,
            "NORMAL" => Self::Normal,
            "TANGENT" => Self::Tangent,
            "TEXCOORD" => Self::TexCoord,
            "COLOR" => Self::Color,
            "JOINTS" => Self::Joints,
            "WEIGHTS" => Self::Weights,
            _ => Self::Other,
        };
        (semantic, set)
    }

    /// Decodes the stored tag.
    #[must_use]
    pub const fn from_u32(tag: u32) -> Self {
        match tag {
            1 => Self::Position,
            2 => Self::Normal,
            3 => Self::Tangent,
            4 => Self::TexCoord,
            5 => Self::Color,
            6 => Self::Joints,
            7 => Self::Weights,
            _ => Self::Other,
        }
    }
}

/// Animated property of a node.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum TargetPath {
    /// Unrecognized path.
    Unknown = 0,
    /// `translation`
    Translation = 1,
    /// `rotation`
    Rotation = 2,
    /// `scale`
    Scale = 3,
    /// `weights`
    Weights = 4,
}

impl TargetPath {
    /// Parses the document's path name.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "translation" => Self::Translation,
            "rotation" => Self::Rotation,
            "scale" => Self::Scale,
            "weights" => Self::Weights,
            _ => Self::Unknown,
        }
    }
}

/// Keyframe interpolation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Interpolation {
    /// `LINEAR`, the default.
    Linear = 0,
    /// `STEP`
    Step = 1,
    /// `CUBICSPLINE`
    CubicSpline = 2,
}

impl Interpolation {
    /// Parses the document's interpolation name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "LINEAR" => Some(Self::Linear),
            "STEP" => Some(Self::Step),
            "CUBICSPLINE" => Some(Self::CubicSpline),
            _ => None,
        }
    }
}

/// Material alpha handling.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum AlphaMode {
    /// `OPAQUE`, the default.
    Opaque = 0,
    /// `MASK`
    Mask = 1,
    /// `BLEND`
    Blend = 2,
}

impl AlphaMode {
    /// Parses the document's alpha mode name.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "OPAQUE" => Some(Self::Opaque),
            "MASK" => Some(Self::Mask),
            "BLEND" => Some(Self::Blend),
            _ => None,
        }
    }
}

/// Camera projection.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum CameraKind {
    /// Not specified.
    Unknown = 0,
    /// `perspective`
    Perspective = 1,
    /// `orthographic`
    Orthographic = 2,
}

impl CameraKind {
    /// Parses the document's camera type.
    #[must_use]
    pub fn parse(name: &str) -> Self {
        match name {
            "perspective" => Self::Perspective,
            "orthographic" => Self::Orthographic,
            _ => Self::Unknown,
        }
    }
}

/// Maximum components recorded in an accessor's `min` / `max`.
pub const ACCESSOR_BOUNDS: usize = 16;

/// Maximum default morph weights recorded per mesh.
pub const MESH_WEIGHTS: usize = 8;

/// A typed view into a buffer view.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Accessor {
    /// Name.
    pub name: StrRef,
    /// Source view, unset for all-zero accessors.
    pub buffer_view: BufferViewId,
    /// Offset into the view.
    pub byte_offset: u32,
    /// [`ComponentType`] code.
    pub component_type: u32,
    /// Integer components are normalized to `[0, 1]` / `[-1, 1]`.
    pub normalized: u32,
    /// Element count.
    pub count: u32,
    /// [`AccessorType`] tag.
    pub kind: u32,
    /// Components present in `min`.
    pub min_len: u32,
    /// Components present in `max`.
    pub max_len: u32,
    /// Per-component minimum.
    pub min: [f32; ACCESSOR_BOUNDS],
    /// Per-component maximum.
    pub max: [f32; ACCESSOR_BOUNDS],
}

impl Accessor {
    /// Bytes per element assuming tightly packed components.
    #[must_use]
    pub fn element_size(&self) -> Option<usize> {
        let component = ComponentType::from_code(self.component_type)?;
        let kind = AccessorType::from_u32(self.kind)?;
        Some(component.size() * kind.components())
    }
}

impl Element for Accessor {
    const ARRAY: SceneArray = SceneArray::Accessor;
    type Id = AccessorId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
        visit(RefMut::Id(SceneArray::BufferView, &mut self.buffer_view.0));
    }
}

/// A keyframe animation: a run of channels and a run of samplers.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Animation {
    /// Name.
    pub name: StrRef,
    /// Channels in the channel array.
    pub channels: Span,
    /// Samplers in the animation sampler array.
    pub samplers: Span,
}

impl Element for Animation {
    const ARRAY: SceneArray = SceneArray::Animation;
    type Id = AnimationId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
        visit(RefMut::Span(SceneArray::AnimationChannel, &mut self.channels));
        visit(RefMut::Span(SceneArray::AnimationSampler, &mut self.samplers));
    }
}

/// Connects a sampler to a node property.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct AnimationChannel {
    /// Resolved sampler in the global sampler array.
    pub sampler: AnimationSamplerId,
    /// Sampler index local to the owning animation, as written in the document.
    pub local_sampler: u32,
    /// Animated node.
    pub target_node: NodeId,
    /// [`TargetPath`] tag.
    pub target_path: u32,
}

impl Default for AnimationChannel {
    fn default() -> Self {
        Self {
            sampler: AnimationSamplerId::NONE,
            local_sampler: NONE_INDEX,
            target_node: NodeId::NONE,
            target_path: TargetPath::Unknown as u32,
        }
    }
}

impl Element for AnimationChannel {
    const ARRAY: SceneArray = SceneArray::AnimationChannel;
    type Id = AnimationChannelId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Id(SceneArray::AnimationSampler, &mut self.sampler.0));
        visit(RefMut::Id(SceneArray::Node, &mut self.target_node.0));
    }
}

/// Keyframe input and output accessors.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct AnimationSampler {
    /// Keyframe times.
    pub input: AccessorId,
    /// Keyframe values.
    pub output: AccessorId,
    /// [`Interpolation`] tag.
    pub interpolation: u32,
}

impl Element for AnimationSampler {
    const ARRAY: SceneArray = SceneArray::AnimationSampler;
    type Id = AnimationSamplerId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Id(SceneArray::Accessor, &mut self.input.0));
        visit(RefMut::Id(SceneArray::Accessor, &mut self.output.0));
    }
}

/// A binary buffer whose payload lives in the raw region.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Buffer {
    /// Name.
    pub name: StrRef,
    /// Source uri, unset for the embedded binary chunk.
    pub uri: StrRef,
    /// Declared length.
    pub byte_length: u32,
    /// Payload bytes.
    pub data: RawRange,
}

impl Element for Buffer {
    const ARRAY: SceneArray = SceneArray::Buffer;
    type Id = BufferId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
        visit(RefMut::Str(&mut self.uri));
        visit(RefMut::Raw(&mut self.data));
    }
}

/// A byte range of a buffer.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct BufferView {
    /// Name.
    pub name: StrRef,
    /// Source buffer.
    pub buffer: BufferId,
    /// Offset into the buffer.
    pub byte_offset: u32,
    /// Length in bytes.
    pub byte_length: u32,
    /// Distance between elements; 0 means tightly packed.
    pub byte_stride: u32,
    /// GPU binding hint.
    pub target: u32,
}

impl Element for BufferView {
    const ARRAY: SceneArray = SceneArray::BufferView;
    type Id = BufferViewId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
        visit(RefMut::Id(SceneArray::Buffer, &mut self.buffer.0));
    }
}

/// A perspective or orthographic camera.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Camera {
    /// Name.
    pub name: StrRef,
    /// [`CameraKind`] tag.
    pub kind: u32,
    /// Perspective aspect ratio, 0 when unspecified.
    pub aspect_ratio: f32,
    /// Perspective vertical field of view in radians.
    pub yfov: f32,
    /// Orthographic horizontal magnification.
    pub xmag: f32,
    /// Orthographic vertical magnification.
    pub ymag: f32,
    /// Near plane.
    pub znear: f32,
    /// Far plane, 0 for infinite perspective.
    pub zfar: f32,
}

impl Element for Camera {
    const ARRAY: SceneArray = SceneArray::Camera;
    type Id = CameraId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
    }
}

/// An image, by uri or by buffer view.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Image {
    /// Name.
    pub name: StrRef,
    /// Source uri.
    pub uri: StrRef,
    /// MIME type for buffer-view images.
    pub mime_type: StrRef,
    /// Source view.
    pub buffer_view: BufferViewId,
}

impl Element for Image {
    const ARRAY: SceneArray = SceneArray::Image;
    type Id = ImageId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
        visit(RefMut::Str(&mut self.uri));
        visit(RefMut::Str(&mut self.mime_type));
        visit(RefMut::Id(SceneArray::BufferView, &mut self.buffer_view.0));
    }
}

/// Texture binding inside a material.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct TextureInfo {
    /// Bound texture.
    pub texture: TextureId,
    /// Texture coordinate set.
    pub tex_coord: u32,
}

/// Which texture slot of a material a value belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TextureSlot {
    /// `pbrMetallicRoughness.baseColorTexture`
    BaseColor,
    /// `pbrMetallicRoughness.metallicRoughnessTexture`
    MetallicRoughness,
    /// `normalTexture`
    Normal,
    /// `occlusionTexture`
    Occlusion,
    /// `emissiveTexture`
    Emissive,
}

/// A metallic-roughness material.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Material {
    /// Name.
    pub name: StrRef,
    /// Linear base color.
    pub base_color_factor: [f32; 4],
    /// Metalness.
    pub metallic_factor: f32,
    /// Roughness.
    pub roughness_factor: f32,
    /// Base color texture.
    pub base_color_texture: TextureInfo,
    /// Metallic-roughness texture.
    pub metallic_roughness_texture: TextureInfo,
    /// Normal map.
    pub normal_texture: TextureInfo,
    /// Normal map scale.
    pub normal_scale: f32,
    /// Occlusion map.
    pub occlusion_texture: TextureInfo,
    /// Occlusion strength.
    pub occlusion_strength: f32,
    /// Emissive map.
    pub emissive_texture: TextureInfo,
    /// Emissive color.
    pub emissive_factor: [f32; 3],
    /// [`AlphaMode`] tag.
    pub alpha_mode: u32,
    /// Mask cutoff.
    pub alpha_cutoff: f32,
    /// Back faces are rendered.
    pub double_sided: u32,
}

impl Material {
    /// The binding for `slot`.
    pub fn texture_mut(&mut self, slot: TextureSlot) -> &mut TextureInfo {
        match slot {
            TextureSlot::BaseColor => &mut self.base_color_texture,
            TextureSlot::MetallicRoughness => &mut self.metallic_roughness_texture,
            TextureSlot::Normal => &mut self.normal_texture,
            TextureSlot::Occlusion => &mut self.occlusion_texture,
            TextureSlot::Emissive => &mut self.emissive_texture,
        }
    }
}

impl Default for Material {
    fn default() -> Self {
        Self {
            name: StrRef::NONE,
            base_color_factor: [1.0; 4],
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            base_color_texture: TextureInfo::default(),
            metallic_roughness_texture: TextureInfo::default(),
            normal_texture: TextureInfo::default(),
            normal_scale: 1.0,
            occlusion_texture: TextureInfo::default(),
            occlusion_strength: 1.0,
            emissive_texture: TextureInfo::default(),
            emissive_factor: [0.0; 3],
            alpha_mode: AlphaMode::Opaque as u32,
            alpha_cutoff: 0.5,
            double_sided: 0,
        }
    }
}

impl Element for Material {
    const ARRAY: SceneArray = SceneArray::Material;
    type Id = MaterialId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
        for info in [
            &mut self.base_color_texture,
            &mut self.metallic_roughness_texture,
            &mut self.normal_texture,
            &mut self.occlusion_texture,
            &mut self.emissive_texture,
        ] {
            visit(RefMut::Id(SceneArray::Texture, &mut info.texture.0));
        }
    }
}

/// A mesh: a run of primitives.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct Mesh {
    /// Name.
    pub name: StrRef,
    /// Primitives in the primitive array.
    pub primitives: Span,
    /// Default morph weights present.
    pub weight_count: u32,
    /// Default morph weights.
    pub weights: [f32; MESH_WEIGHTS],
}

impl Element for Mesh {
    const ARRAY: SceneArray = SceneArray::Mesh;
    type Id = MeshId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
        visit(RefMut::Span(SceneArray::MeshPrimitive, &mut self.primitives));
    }
}

/// Default primitive topology (`TRIANGLES`).
pub const MODE_TRIANGLES: u32 = 4;

/// One draw call's worth of geometry.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshPrimitive {
    /// Vertex attributes in the attribute array.
    pub attributes: Span,
    /// Morph targets in the target array.
    pub targets: Span,
    /// Index accessor, unset for non-indexed geometry.
    pub indices: AccessorId,
    /// Material.
    pub material: MaterialId,
    /// Topology.
    pub mode: u32,
}

impl Default for MeshPrimitive {
    fn default() -> Self {
        Self {
            attributes: Span::default(),
            targets: Span::default(),
            indices: AccessorId::NONE,
            material: MaterialId::NONE,
            mode: MODE_TRIANGLES,
        }
    }
}

impl Element for MeshPrimitive {
    const ARRAY: SceneArray = SceneArray::MeshPrimitive;
    type Id = MeshPrimitiveId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Span(SceneArray::MeshAttribute, &mut self.attributes));
        visit(RefMut::Span(SceneArray::MeshTarget, &mut self.targets));
        visit(RefMut::Id(SceneArray::Accessor, &mut self.indices.0));
        visit(RefMut::Id(SceneArray::Material, &mut self.material.0));
    }
}

/// A named vertex stream of a primitive.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshAttribute {
    /// [`Semantic`] tag.
    pub semantic: u32,
    /// Set index (`TEXCOORD_1` → 1).
    pub set: u32,
    /// Data.
    pub accessor: AccessorId,
}

impl Element for MeshAttribute {
    const ARRAY: SceneArray = SceneArray::MeshAttribute;
    type Id = MeshAttributeId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Id(SceneArray::Accessor, &mut self.accessor.0));
    }
}

/// One morph target of a primitive.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct MeshTarget {
    /// Position displacements.
    pub position: AccessorId,
    /// Normal displacements.
    pub normal: AccessorId,
    /// Tangent displacements.
    pub tangent: AccessorId,
}

impl Element for MeshTarget {
    const ARRAY: SceneArray = SceneArray::MeshTarget;
    type Id = MeshTargetId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Id(SceneArray::Accessor, &mut self.position.0));
        visit(RefMut::Id(SceneArray::Accessor, &mut self.normal.0));
        visit(RefMut::Id(SceneArray::Accessor, &mut self.tangent.0));
    }
}

/// A node in the hierarchy.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Node {
    /// Name.
    pub name: StrRef,
    /// Mesh, if any.
    pub mesh: MeshId,
    /// Camera, if any.
    pub camera: CameraId,
    /// Skin, if any.
    pub skin: SkinId,
    /// Children in the node reference array.
    pub children: Span,
    /// Translation.
    pub translation: [f32; 3],
    /// Rotation quaternion `[x, y, z, w]`.
    pub rotation: [f32; 4],
    /// Scale.
    pub scale: [f32; 3],
    /// Column-major local matrix.
    pub matrix: [f32; 16],
    /// The document authored `matrix` rather than TRS.
    pub has_matrix: u32,
}

impl Node {
    /// Returns whether a mesh is attached.
    #[inline]
    #[must_use]
    pub fn has_mesh(&self) -> bool {
        !self.mesh.is_none()
    }
}

impl Default for Node {
    fn default() -> Self {
        Self {
            name: StrRef::NONE,
            mesh: MeshId::NONE,
            camera: CameraId::NONE,
            skin: SkinId::NONE,
            children: Span::default(),
            translation: [0.0; 3],
            rotation: [0.0, 0.0, 0.0, 1.0],
            scale: [1.0; 3],
            matrix: Mat4::IDENTITY.cols,
            has_matrix: 0,
        }
    }
}

impl Element for Node {
    const ARRAY: SceneArray = SceneArray::Node;
    type Id = NodeId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
        visit(RefMut::Id(SceneArray::Mesh, &mut self.mesh.0));
        visit(RefMut::Id(SceneArray::Camera, &mut self.camera.0));
        visit(RefMut::Id(SceneArray::Skin, &mut self.skin.0));
        visit(RefMut::Span(SceneArray::NodeRef, &mut self.children));
    }
}

/// One entry of a node list: a child, a scene root, or a skin joint.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct NodeRef {
    /// Referenced node.
    pub node: NodeId,
}

impl Element for NodeRef {
    const ARRAY: SceneArray = SceneArray::NodeRef;
    type Id = NodeRefId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Id(SceneArray::Node, &mut self.node.0));
    }
}

/// Texture filtering and wrapping.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct Sampler {
    /// Name.
    pub name: StrRef,
    /// Magnification filter code, 0 when unspecified.
    pub mag_filter: u32,
    /// Minification filter code, 0 when unspecified.
    pub min_filter: u32,
    /// S wrap mode.
    pub wrap_s: u32,
    /// T wrap mode.
    pub wrap_t: u32,
}

/// `REPEAT` wrap mode, the default.
pub const WRAP_REPEAT: u32 = 10497;

impl Default for Sampler {
    fn default() -> Self {
        Self { name: StrRef::NONE, mag_filter: 0, min_filter: 0, wrap_s: WRAP_REPEAT, wrap_t: WRAP_REPEAT }
    }
}

impl Element for Sampler {
    const ARRAY: SceneArray = SceneArray::Sampler;
    type Id = SamplerId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
    }
}

/// A scene: a run of root nodes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Scene {
    /// Name.
    pub name: StrRef,
    /// Roots in the node reference array.
    pub nodes: Span,
}

impl Element for Scene {
    const ARRAY: SceneArray = SceneArray::Scene;
    type Id = SceneId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
        visit(RefMut::Span(SceneArray::NodeRef, &mut self.nodes));
    }
}

/// Joints and bind matrices for skinning.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Skin {
    /// Name.
    pub name: StrRef,
    /// Inverse bind matrices.
    pub inverse_bind_matrices: AccessorId,
    /// Skeleton root.
    pub skeleton: NodeId,
    /// Joints in the node reference array.
    pub joints: Span,
}

impl Element for Skin {
    const ARRAY: SceneArray = SceneArray::Skin;
    type Id = SkinId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
        visit(RefMut::Id(SceneArray::Accessor, &mut self.inverse_bind_matrices.0));
        visit(RefMut::Id(SceneArray::Node, &mut self.skeleton.0));
        visit(RefMut::Span(SceneArray::NodeRef, &mut self.joints));
    }
}

/// An image paired with a sampler.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct Texture {
    /// Name.
    pub name: StrRef,
    /// Sampler, unset for the default sampler.
    pub sampler: SamplerId,
    /// Image.
    pub source: ImageId,
}

impl Element for Texture {
    const ARRAY: SceneArray = SceneArray::Texture;
    type Id = TextureId;

    fn visit_refs(&mut self, visit: &mut dyn FnMut(RefMut<'_>)) {
        visit(RefMut::Str(&mut self.name));
        visit(RefMut::Id(SceneArray::Sampler, &mut self.sampler.0));
        visit(RefMut::Id(SceneArray::Image, &mut self.source.0));
    }
}

/// Tag at the start of every Gobj.
pub const GOBJ_MAGIC: u32 = u32::from_le_bytes(*b"GOBJ");

/// Layout version.
pub const GOBJ_VERSION: u32 = 1;

/// `asset` metadata strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssetField {
    /// `asset.version`
    Version = 0,
    /// `asset.generator`
    Generator = 1,
    /// `asset.copyright`
    Copyright = 2,
    /// `asset.minVersion`
    MinVersion = 3,
}

/// Header at the base of every Gobj.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct GobjHeader {
    /// Always [`GOBJ_MAGIC`].
    pub magic: u32,
    /// Always [`GOBJ_VERSION`].
    pub version: u32,
    /// Region alignment.
    pub align: u32,
    /// Bytes covered by the header and every region.
    pub total_size: u32,
    /// Region offsets from the Gobj base.
    pub offsets: [u32; SCENE_ARRAY_COUNT],
    /// Reserved capacity per region.
    pub max: [u32; SCENE_ARRAY_COUNT],
    /// Used slots (or bytes) per region.
    pub used: [u32; SCENE_ARRAY_COUNT],
    /// Default scene.
    pub default_scene: SceneId,
    /// Asset metadata, indexed by [`AssetField`].
    pub asset: [StrRef; 4],
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_default_to_none() {
        assert!(NodeId::default().is_none());
        assert_eq!(MeshId::default().index(), None);
        assert_eq!(NodeId(3).index(), Some(3));
        assert_eq!(<NodeId as ElementId>::ARRAY, SceneArray::Node);
    }

    #[test]
    fn test_semantic_parse() {
        assert_eq!(Semantic::parse("POSITION"), (Semantic::Position, 0));
        assert_eq!(Semantic::parse("TEXCOORD_1"), (Semantic::TexCoord, 1));
        assert_eq!(Semantic::parse("_CUSTOM"), (Semantic::Other, 0));
    }

    #[test]
    fn test_span_extend() {
        let mut span = Span::default();
        span.extend(7);
        span.extend(8);
        assert_eq!(span, Span { first: 7, count: 2 });
        assert_eq!(span.indices(), 7..9);
    }

    #[test]
    fn test_accessor_element_size() {
        let accessor = Accessor {
            component_type: ComponentType::Float as u32,
            kind: AccessorType::Vec3 as u32,
            ..Accessor::default()
        };
        assert_eq!(accessor.element_size(), Some(12));
    }

    #[test]
    fn test_node_default_is_identity() {
        let node = Node::default();
        assert_eq!(node.rotation, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(node.matrix, Mat4::IDENTITY.cols);
        assert!(!node.has_mesh());
    }

    #[test]
    fn test_visit_refs_reaches_every_reference() {
        let mut node = Node { mesh: MeshId(1), ..Node::default() };
        let mut ids = 0;
        let mut spans = 0;
        node.visit_refs(&mut |reference| match reference {
            RefMut::Id(..) => ids += 1,
            RefMut::Span(..) => spans += 1,
            _ => {}
        });
        assert_eq!((ids, spans), (3, 1));
    }
}
