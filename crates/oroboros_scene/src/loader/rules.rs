//! # Path Rules
//!
//! The loader recognizes document positions by matching the breadcrumb stack
//! against the patterns below. Both passes consult the same table: the counter
//! sizes whatever the scanner will write, so a field can only be supported by
//! adding one row here.

use crate::gobj::{AssetField, SceneArray, TextureSlot};

use super::token::{Breadcrumbs, Segment};

/// One frame of a path pattern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Seg {
    /// An object member with this exact key.
    Key(&'static str),
    /// Any array position.
    Index,
    /// Any object member.
    AnyKey,
}

/// Token kind a rule reacts to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Object begin and end.
    Object,
    /// String value.
    Str,
    /// Number value.
    Num,
    /// Boolean value.
    Bool,
}

/// What a recognized position means.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum Field {
    /// The object at this position is a new element of the array.
    Element(SceneArray),
    /// `primitives[i].attributes.<SEMANTIC>`, creates an attribute.
    Attribute,
    /// `nodes[i].children[j]`, creates a node reference.
    NodeChild,
    /// `scenes[i].nodes[j]`, creates a node reference.
    SceneRoot,
    /// `skins[i].joints[j]`, creates a node reference.
    SkinJoint,
    /// `name` of an element.
    Name(SceneArray),
    /// `asset.*` metadata string.
    Asset(AssetField),
    /// Root `scene`.
    DefaultScene,

    AccessorBufferView,
    AccessorByteOffset,
    AccessorComponentType,
    AccessorNormalized,
    AccessorCount,
    AccessorType,
    AccessorMin,
    AccessorMax,

    ChannelSampler,
    ChannelNode,
    ChannelPath,
    SamplerInput,
    SamplerOutput,
    SamplerInterpolation,

    BufferUri,
    BufferByteLength,

    ViewBuffer,
    ViewByteOffset,
    ViewByteLength,
    ViewByteStride,
    ViewTarget,

    CameraType,
    CameraAspectRatio,
    CameraYfov,
    CameraXmag,
    CameraYmag,
    CameraZnear,
    CameraZfar,

    ImageUri,
    ImageMimeType,
    ImageBufferView,

    MaterialBaseColor,
    MaterialMetallic,
    MaterialRoughness,
    MaterialTexture(TextureSlot),
    MaterialTexCoord(TextureSlot),
    MaterialNormalScale,
    MaterialOcclusionStrength,
    MaterialEmissive,
    MaterialAlphaMode,
    MaterialAlphaCutoff,
    MaterialDoubleSided,

    MeshWeight,
    PrimitiveIndices,
    PrimitiveMaterial,
    PrimitiveMode,
    TargetPosition,
    TargetNormal,
    TargetTangent,

    NodeMesh,
    NodeCamera,
    NodeSkin,
    NodeTranslation,
    NodeRotation,
    NodeScale,
    NodeMatrix,

    SamplerMagFilter,
    SamplerMinFilter,
    SamplerWrapS,
    SamplerWrapT,

    SkinInverseBindMatrices,
    SkinSkeleton,

    TextureSampler,
    TextureSource,
}

impl Field {
    /// The array a token at this position adds an element to.
    #[must_use]
    pub const fn creates(self) -> Option<SceneArray> {
        match self {
            Self::Element(array) => Some(array),
            Self::Attribute => Some(SceneArray::MeshAttribute),
            Self::NodeChild | Self::SceneRoot | Self::SkinJoint => Some(SceneArray::NodeRef),
            _ => None,
        }
    }

    /// Returns whether the string value is copied into the string pool.
    #[must_use]
    pub const fn is_pooled(self) -> bool {
        matches!(self, Self::Name(_) | Self::Asset(_) | Self::BufferUri | Self::ImageUri | Self::ImageMimeType)
    }
}

/// A `(trigger, pattern) → field` row.
#[derive(Clone, Copy, Debug)]
pub struct Rule {
    /// Token kind.
    pub trigger: Trigger,
    /// Path pattern, outermost first.
    pub path: &'static [Seg],
    /// Meaning.
    pub field: Field,
}

const fn rule(trigger: Trigger, path: &'static [Seg], field: Field) -> Rule {
    Rule { trigger, path, field }
}

use Field as F;
use Seg::{AnyKey, Index, Key};
use Trigger::{Bool, Num, Object, Str};

const PBR: Seg = Key("pbrMetallicRoughness");

/// Every recognized position.
pub static RULES: &[Rule] = &[
    rule(Str, &[Key("asset"), Key("version")], F::Asset(AssetField::Version)),
    rule(Str, &[Key("asset"), Key("generator")], F::Asset(AssetField::Generator)),
    rule(Str, &[Key("asset"), Key("copyright")], F::Asset(AssetField::Copyright)),
    rule(Str, &[Key("asset"), Key("minVersion")], F::Asset(AssetField::MinVersion)),
    rule(Num, &[Key("scene")], F::DefaultScene),
    // accessors
    rule(Object, &[Key("accessors"), Index], F::Element(SceneArray::Accessor)),
    rule(Str, &[Key("accessors"), Index, Key("name")], F::Name(SceneArray::Accessor)),
    rule(Num, &[Key("accessors"), Index, Key("bufferView")], F::AccessorBufferView),
    rule(Num, &[Key("accessors"), Index, Key("byteOffset")], F::AccessorByteOffset),
    rule(Num, &[Key("accessors"), Index, Key("componentType")], F::AccessorComponentType),
    rule(Bool, &[Key("accessors"), Index, Key("normalized")], F::AccessorNormalized),
    rule(Num, &[Key("accessors"), Index, Key("count")], F::AccessorCount),
    rule(Str, &[Key("accessors"), Index, Key("type")], F::AccessorType),
    rule(Num, &[Key("accessors"), Index, Key("min"), Index], F::AccessorMin),
    rule(Num, &[Key("accessors"), Index, Key("max"), Index], F::AccessorMax),
    // animations
    rule(Object, &[Key("animations"), Index], F::Element(SceneArray::Animation)),
    rule(Str, &[Key("animations"), Index, Key("name")], F::Name(SceneArray::Animation)),
    rule(Object, &[Key("animations"), Index, Key("channels"), Index], F::Element(SceneArray::AnimationChannel)),
    rule(Num, &[Key("animations"), Index, Key("channels"), Index, Key("sampler")], F::ChannelSampler),
    rule(Num, &[Key("animations"), Index, Key("channels"), Index, Key("target"), Key("node")], F::ChannelNode),
    rule(Str, &[Key("animations"), Index, Key("channels"), Index, Key("target"), Key("path")], F::ChannelPath),
    rule(Object, &[Key("animations"), Index, Key("samplers"), Index], F::Element(SceneArray::AnimationSampler)),
    rule(Num, &[Key("animations"), Index, Key("samplers"), Index, Key("input")], F::SamplerInput),
    rule(Num, &[Key("animations"), Index, Key("samplers"), Index, Key("output")], F::SamplerOutput),
    rule(Str, &[Key("animations"), Index, Key("samplers"), Index, Key("interpolation")], F::SamplerInterpolation),
    // buffers
    rule(Object, &[Key("buffers"), Index], F::Element(SceneArray::Buffer)),
    rule(Str, &[Key("buffers"), Index, Key("name")], F::Name(SceneArray::Buffer)),
    rule(Str, &[Key("buffers"), Index, Key("uri")], F::BufferUri),
    rule(Num, &[Key("buffers"), Index, Key("byteLength")], F::BufferByteLength),
    // buffer views
    rule(Object, &[Key("bufferViews"), Index], F::Element(SceneArray::BufferView)),
    rule(Str, &[Key("bufferViews"), Index, Key("name")], F::Name(SceneArray::BufferView)),
    rule(Num, &[Key("bufferViews"), Index, Key("buffer")], F::ViewBuffer),
    rule(Num, &[Key("bufferViews"), Index, Key("byteOffset")], F::ViewByteOffset),
    rule(Num, &[Key("bufferViews"), Index, Key("byteLength")], F::ViewByteLength),
    rule(Num, &[Key("bufferViews"), Index, Key("byteStride")], F::ViewByteStride),
    rule(Num, &[Key("bufferViews"), Index, Key("target")], F::ViewTarget),
    // cameras
    rule(Object, &[Key("cameras"), Index], F::Element(SceneArray::Camera)),
    rule(Str, &[Key("cameras"), Index, Key("name")], F::Name(SceneArray::Camera)),
    rule(Str, &[Key("cameras"), Index, Key("type")], F::CameraType),
    rule(Num, &[Key("cameras"), Index, Key("perspective"), Key("aspectRatio")], F::CameraAspectRatio),
    rule(Num, &[Key("cameras"), Index, Key("perspective"), Key("yfov")], F::CameraYfov),
    rule(Num, &[Key("cameras"), Index, Key("perspective"), Key("znear")], F::CameraZnear),
    rule(Num, &[Key("cameras"), Index, Key("perspective"), Key("zfar")], F::CameraZfar),
    rule(Num, &[Key("cameras"), Index, Key("orthographic"), Key("xmag")], F::CameraXmag),
    rule(Num, &[Key("cameras"), Index, Key("orthographic"), Key("ymag")], F::CameraYmag),
    rule(Num, &[Key("cameras"), Index, Key("orthographic"), Key("znear")], F::CameraZnear),
    rule(Num, &[Key("cameras"), Index, Key("orthographic"), Key("zfar")], F::CameraZfar),
    // images
    rule(Object, &[Key("images"), Index], F::Element(SceneArray::Image)),
    rule(Str, &[Key("images"), Index, Key("name")], F::Name(SceneArray::Image)),
    rule(Str, &[Key("images"), Index, Key("uri")], F::ImageUri),
    rule(Str, &[Key("images"), Index, Key("mimeType")], F::ImageMimeType),
    rule(Num, &[Key("images"), Index, Key("bufferView")], F::ImageBufferView),
    // materials
    rule(Object, &[Key("materials"), Index], F::Element(SceneArray::Material)),
    rule(Str, &[Key("materials"), Index, Key("name")], F::Name(SceneArray::Material)),
    rule(Num, &[Key("materials"), Index, PBR, Key("baseColorFactor"), Index], F::MaterialBaseColor),
    rule(Num, &[Key("materials"), Index, PBR, Key("metallicFactor")], F::MaterialMetallic),
    rule(Num, &[Key("materials"), Index, PBR, Key("roughnessFactor")], F::MaterialRoughness),
    rule(Num, &[Key("materials"), Index, PBR, Key("baseColorTexture"), Key("index")], F::MaterialTexture(TextureSlot::BaseColor)),
    rule(Num, &[Key("materials"), Index, PBR, Key("baseColorTexture"), Key("texCoord")], F::MaterialTexCoord(TextureSlot::BaseColor)),
    rule(
        Num,
        &[Key("materials"), Index, PBR, Key("metallicRoughnessTexture"), Key("index")],
        F::MaterialTexture(TextureSlot::MetallicRoughness),
    ),
    rule(
        Num,
        &[Key("materials"), Index, PBR, Key("metallicRoughnessTexture"), Key("texCoord")],
        F::MaterialTexCoord(TextureSlot::MetallicRoughness),
    ),
    rule(Num, &[Key("materials"), Index, Key("normalTexture"), Key("index")], F::MaterialTexture(TextureSlot::Normal)),
    rule(Num, &[Key("materials"), Index, Key("normalTexture"), Key("texCoord")], F::MaterialTexCoord(TextureSlot::Normal)),
    rule(Num, &[Key("materials"), Index, Key("normalTexture"), Key("scale")], F::MaterialNormalScale),
    rule(Num, &[Key("materials"), Index, Key("occlusionTexture"), Key("index")], F::MaterialTexture(TextureSlot::Occlusion)),
    rule(Num, &[Key("materials"), Index, Key("occlusionTexture"), Key("texCoord")], F::MaterialTexCoord(TextureSlot::Occlusion)),
    rule(Num, &[Key("materials"), Index, Key("occlusionTexture"), Key("strength")], F::MaterialOcclusionStrength),
    rule(Num, &[Key("materials"), Index, Key("emissiveTexture"), Key("index")], F::MaterialTexture(TextureSlot::Emissive)),
    rule(Num, &[Key("materials"), Index, Key("emissiveTexture"), Key("texCoord")], F::MaterialTexCoord(TextureSlot::Emissive)),
    rule(Num, &[Key("materials"), Index, Key("emissiveFactor"), Index], F::MaterialEmissive),
    rule(Str, &[Key("materials"), Index, Key("alphaMode")], F::MaterialAlphaMode),
    rule(Num, &[Key("materials"), Index, Key("alphaCutoff")], F::MaterialAlphaCutoff),
    rule(Bool, &[Key("materials"), Index, Key("doubleSided")], F::MaterialDoubleSided),
    // meshes
    rule(Object, &[Key("meshes"), Index], F::Element(SceneArray::Mesh)),
    rule(Str, &[Key("meshes"), Index, Key("name")], F::Name(SceneArray::Mesh)),
    rule(Num, &[Key("meshes"), Index, Key("weights"), Index], F::MeshWeight),
    rule(Object, &[Key("meshes"), Index, Key("primitives"), Index], F::Element(SceneArray::MeshPrimitive)),
    rule(Num, &[Key("meshes"), Index, Key("primitives"), Index, Key("attributes"), AnyKey], F::Attribute),
    rule(Num, &[Key("meshes"), Index, Key("primitives"), Index, Key("indices")], F::PrimitiveIndices),
    rule(Num, &[Key("meshes"), Index, Key("primitives"), Index, Key("material")], F::PrimitiveMaterial),
    rule(Num, &[Key("meshes"), Index, Key("primitives"), Index, Key("mode")], F::PrimitiveMode),
    rule(Object, &[Key("meshes"), Index, Key("primitives"), Index, Key("targets"), Index], F::Element(SceneArray::MeshTarget)),
    rule(Num, &[Key("meshes"), Index, Key("primitives"), Index, Key("targets"), Index, Key("POSITION")], F::TargetPosition),
    rule(Num, &[Key("meshes"), Index, Key("primitives"), Index, Key("targets"), Index, Key("NORMAL")], F::TargetNormal),
    rule(Num, &[Key("meshes"), Index, Key("primitives"), Index, Key("targets"), Index, Key("TANGENT")], F::TargetTangent),
    // nodes
    rule(Object, &[Key("nodes"), Index], F::Element(SceneArray::Node)),
    rule(Str, &[Key("nodes"), Index, Key("name")], F::Name(SceneArray::Node)),
    rule(Num, &[Key("nodes"), Index, Key("mesh")], F::NodeMesh),
    rule(Num, &[Key("nodes"), Index, Key("camera")], F::NodeCamera),
    rule(Num, &[Key("nodes"), Index, Key("skin")], F::NodeSkin),
    rule(Num, &[Key("nodes"), Index, Key("children"), Index], F::NodeChild),
    rule(Num, &[Key("nodes"), Index, Key("translation"), Index], F::NodeTranslation),
    rule(Num, &[Key("nodes"), Index, Key("rotation"), Index], F::NodeRotation),
    rule(Num, &[Key("nodes"), Index, Key("scale"), Index], F::NodeScale),
    rule(Num, &[Key("nodes"), Index, Key("matrix"), Index], F::NodeMatrix),
    // samplers
    rule(Object, &[Key("samplers"), Index], F::Element(SceneArray::Sampler)),
    rule(Str, &[Key("samplers"), Index, Key("name")], F::Name(SceneArray::Sampler)),
    rule(Num, &[Key("samplers"), Index, Key("magFilter")], F::SamplerMagFilter),
    rule(Num, &[Key("samplers"), Index, Key("minFilter")], F::SamplerMinFilter),
    rule(Num, &[Key("samplers"), Index, Key("wrapS")], F::SamplerWrapS),
    rule(Num, &[Key("samplers"), Index, Key("wrapT")], F::SamplerWrapT),
    // scenes
    rule(Object, &[Key("scenes"), Index], F::Element(SceneArray::Scene)),
    rule(Str, &[Key("scenes"), Index, Key("name")], F::Name(SceneArray::Scene)),
    rule(Num, &[Key("scenes"), Index, Key("nodes"), Index], F::SceneRoot),
    // skins
    rule(Object, &[Key("skins"), Index], F::Element(SceneArray::Skin)),
    rule(Str, &[Key("skins"), Index, Key("name")], F::Name(SceneArray::Skin)),
    rule(Num, &[Key("skins"), Index, Key("inverseBindMatrices")], F::SkinInverseBindMatrices),
    rule(Num, &[Key("skins"), Index, Key("skeleton")], F::SkinSkeleton),
    rule(Num, &[Key("skins"), Index, Key("joints"), Index], F::SkinJoint),
    // textures
    rule(Object, &[Key("textures"), Index], F::Element(SceneArray::Texture)),
    rule(Str, &[Key("textures"), Index, Key("name")], F::Name(SceneArray::Texture)),
    rule(Num, &[Key("textures"), Index, Key("sampler")], F::TextureSampler),
    rule(Num, &[Key("textures"), Index, Key("source")], F::TextureSource),
];

fn segment_matches(pattern: Seg, segment: &Segment) -> bool {
    match pattern {
        Seg::Key(key) => segment.key() == Some(key),
        Seg::Index => segment.index().is_some(),
        Seg::AnyKey => segment.index().is_none(),
    }
}

fn matches(pattern: &[Seg], crumbs: &[Segment]) -> bool {
    pattern.len() == crumbs.len() && pattern.iter().zip(crumbs).all(|(&seg, segment)| segment_matches(seg, segment))
}

/// The field at `crumbs` for a token of kind `trigger`.
#[must_use]
pub fn find(trigger: Trigger, crumbs: &Breadcrumbs) -> Option<Field> {
    let crumbs = crumbs.segments();
    RULES
        .iter()
        .find(|rule| rule.trigger == trigger && matches(rule.path, crumbs))
        .map(|rule| rule.field)
}

/// The array whose elements are the direct children of the container at
/// `crumbs`, for counting on container end.
#[must_use]
pub fn child_element(crumbs: &Breadcrumbs) -> Option<SceneArray> {
    let crumbs = crumbs.segments();
    RULES.iter().find_map(|rule| {
        let (last, parent) = rule.path.split_last()?;
        if !matches!(last, Seg::Index | Seg::AnyKey) || !matches(parent, crumbs) {
            return None;
        }
        rule.field.creates()
    })
}
