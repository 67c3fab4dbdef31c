//! Pass 2: replays the document into a Gobj sized by pass 1.
//!
//! Elements are appended in document order, so the element currently being
//! filled is always the last used slot of its array. Nested runs (channels,
//! primitives, node lists) extend the span of that parent as they are pushed.

use std::borrow::Cow;
use std::path::Path;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use oroboros_memory::align_up;

use crate::error::{SceneError, SceneResult};
use crate::gobj::{
    Accessor, AccessorId, AccessorType, AlphaMode, Animation, AnimationChannel, AnimationSampler, Buffer, BufferView,
    Camera, CameraKind, ComponentType, Element, ElementId, Gobj, Image, Interpolation, Material, Mesh, MeshAttribute,
    MeshPrimitive, MeshTarget, Node, NodeRef, Sampler, Scene, SceneArray, SceneId, Semantic, Skin, StrRef, TargetPath,
    Texture, ACCESSOR_BOUNDS, MESH_WEIGHTS,
};

use super::rules::{self, Field, Trigger};
use super::token::{Breadcrumbs, Event, Number, Segment, Sink};

/// Writes recognized values into a Gobj.
pub struct Scanner<'g, 'a, B> {
    gobj: &'g mut Gobj<B>,
    bin: Option<&'a [u8]>,
    base_dir: Option<&'a Path>,
}

impl<'g, 'a, B: AsRef<[u8]> + AsMut<[u8]>> Scanner<'g, 'a, B> {
    /// Scanner over `gobj`, with the container's binary chunk and the
    /// directory external buffers are resolved against.
    pub fn new(gobj: &'g mut Gobj<B>, bin: Option<&'a [u8]>, base_dir: Option<&'a Path>) -> Self {
        Self { gobj, bin, base_dir }
    }

    fn current<T: Element>(&self) -> SceneResult<T::Id> {
        match self.gobj.len::<T>().checked_sub(1) {
            Some(index) => Ok(<T::Id as ElementId>::from_raw(index as u32)),
            None => Err(SceneError::Invariant(format!("no current {} element", T::ARRAY))),
        }
    }

    fn with_current<T: Element>(&mut self, f: impl FnOnce(&mut T)) -> SceneResult<()> {
        let id = self.current::<T>()?;
        self.gobj.update(id, f)
    }

    /// Appends a default element, linking it into the run of its parent.
    fn begin(&mut self, array: SceneArray) -> SceneResult<()> {
        match array {
            SceneArray::Accessor => self.push_default::<Accessor>(),
            SceneArray::Animation => self.push_default::<Animation>(),
            SceneArray::AnimationChannel => {
                let index = self.push_child::<AnimationChannel>()?;
                self.with_current(|animation: &mut Animation| animation.channels.extend(index))
            }
            SceneArray::AnimationSampler => {
                let index = self.push_child::<AnimationSampler>()?;
                self.with_current(|animation: &mut Animation| animation.samplers.extend(index))
            }
            SceneArray::Buffer => self.push_default::<Buffer>(),
            SceneArray::BufferView => self.push_default::<BufferView>(),
            SceneArray::Camera => self.push_default::<Camera>(),
            SceneArray::Image => self.push_default::<Image>(),
            SceneArray::Material => self.push_default::<Material>(),
            SceneArray::Mesh => self.push_default::<Mesh>(),
            SceneArray::MeshPrimitive => {
                let index = self.push_child::<MeshPrimitive>()?;
                self.with_current(|mesh: &mut Mesh| mesh.primitives.extend(index))
            }
            SceneArray::MeshTarget => {
                let index = self.push_child::<MeshTarget>()?;
                self.with_current(|primitive: &mut MeshPrimitive| primitive.targets.extend(index))
            }
            SceneArray::Node => self.push_default::<Node>(),
            SceneArray::Sampler => self.push_default::<Sampler>(),
            SceneArray::Scene => self.push_default::<Scene>(),
            SceneArray::Skin => self.push_default::<Skin>(),
            SceneArray::Texture => self.push_default::<Texture>(),
            SceneArray::MeshAttribute | SceneArray::NodeRef | SceneArray::Strings | SceneArray::RawData => {
                Err(SceneError::Invariant(format!("{array} is not created from an object")))
            }
        }
    }

    fn push_default<T: Element>(&mut self) -> SceneResult<()> {
        self.gobj.push(T::default()).map(drop)
    }

    fn push_child<T: Element>(&mut self) -> SceneResult<u32> {
        self.gobj.push(T::default()).map(ElementId::raw)
    }

    fn end(&mut self, array: SceneArray) -> SceneResult<()> {
        if array == SceneArray::Buffer {
            self.fill_buffer()?;
        }
        Ok(())
    }

    /// Reserves the raw bytes of the current buffer and copies its payload in.
    fn fill_buffer(&mut self) -> SceneResult<()> {
        let id = self.current::<Buffer>()?;
        let buffer: Buffer = self.gobj.get(id).unwrap_or_default();
        let len = buffer.byte_length as usize;
        let index = id.0 as usize;

        let payload: Cow<'a, [u8]> = match self.gobj.str(buffer.uri) {
            None if buffer.uri.is_some() => {
                return Err(SceneError::InvalidValue {
                    path: format!("buffers[{index}].uri"),
                    message: "uri is not valid UTF-8".to_string(),
                });
            }
            None => match self.bin {
                Some(bin) if index == 0 => {
                    if bin.len() < len || bin.len() > align_up(len, 4) {
                        return Err(SceneError::ChunkSizeMismatch { declared: len, actual: bin.len() });
                    }
                    Cow::Borrowed(bin)
                }
                _ => return Err(SceneError::MissingBufferData { index }),
            },
            Some(uri) if uri.starts_with("data:") => Cow::Owned(decode_data_uri(uri, index)?),
            Some(uri) => Cow::Owned(read_external(self.base_dir, uri)?),
        };
        if payload.len() < len {
            return Err(SceneError::ChunkSizeMismatch { declared: len, actual: payload.len() });
        }

        let range = self.gobj.reserve_raw(len)?;
        if let Some(bytes) = self.gobj.raw_mut(range) {
            bytes.copy_from_slice(&payload[..len]);
        }
        tracing::debug!("buffer {} filled with {} bytes", index, len);
        self.gobj.update(id, |buffer: &mut Buffer| buffer.data = range)
    }

    fn string(&mut self, field: Field, text: &str, crumbs: &Breadcrumbs) -> SceneResult<()> {
        if field.is_pooled() {
            let pooled = self.gobj.push_str(text)?;
            return match field {
                Field::Name(array) => self.set_name(array, pooled),
                Field::Asset(asset) => {
                    self.gobj.set_asset(asset, pooled);
                    Ok(())
                }
                Field::BufferUri => self.with_current(|buffer: &mut Buffer| buffer.uri = pooled),
                Field::ImageUri => self.with_current(|image: &mut Image| image.uri = pooled),
                Field::ImageMimeType => self.with_current(|image: &mut Image| image.mime_type = pooled),
                _ => Ok(()),
            };
        }

        let unknown = || invalid(crumbs, format!("unknown value {text:?}"));
        match field {
            Field::AccessorType => {
                let kind = AccessorType::parse(text).ok_or_else(unknown)?;
                self.with_current(|accessor: &mut Accessor| accessor.kind = kind as u32)
            }
            Field::ChannelPath => {
                let path = TargetPath::parse(text);
                self.with_current(|channel: &mut AnimationChannel| channel.target_path = path as u32)
            }
            Field::SamplerInterpolation => {
                let interpolation = Interpolation::parse(text).ok_or_else(unknown)?;
                self.with_current(|sampler: &mut AnimationSampler| sampler.interpolation = interpolation as u32)
            }
            Field::CameraType => {
                let kind = CameraKind::parse(text);
                self.with_current(|camera: &mut Camera| camera.kind = kind as u32)
            }
            Field::MaterialAlphaMode => {
                let mode = AlphaMode::parse(text).ok_or_else(unknown)?;
                self.with_current(|material: &mut Material| material.alpha_mode = mode as u32)
            }
            _ => Ok(()),
        }
    }

    fn set_name(&mut self, array: SceneArray, name: StrRef) -> SceneResult<()> {
        match array {
            SceneArray::Accessor => self.with_current(|e: &mut Accessor| e.name = name),
            SceneArray::Animation => self.with_current(|e: &mut Animation| e.name = name),
            SceneArray::Buffer => self.with_current(|e: &mut Buffer| e.name = name),
            SceneArray::BufferView => self.with_current(|e: &mut BufferView| e.name = name),
            SceneArray::Camera => self.with_current(|e: &mut Camera| e.name = name),
            SceneArray::Image => self.with_current(|e: &mut Image| e.name = name),
            SceneArray::Material => self.with_current(|e: &mut Material| e.name = name),
            SceneArray::Mesh => self.with_current(|e: &mut Mesh| e.name = name),
            SceneArray::Node => self.with_current(|e: &mut Node| e.name = name),
            SceneArray::Sampler => self.with_current(|e: &mut Sampler| e.name = name),
            SceneArray::Scene => self.with_current(|e: &mut Scene| e.name = name),
            SceneArray::Skin => self.with_current(|e: &mut Skin| e.name = name),
            SceneArray::Texture => self.with_current(|e: &mut Texture| e.name = name),
            _ => Err(SceneError::Invariant(format!("{array} elements have no name"))),
        }
    }

    fn number(&mut self, field: Field, number: Number, crumbs: &Breadcrumbs) -> SceneResult<()> {
        let float = number.as_f64() as f32;
        match field {
            Field::Attribute => {
                let name = crumbs.last().and_then(|segment| match segment {
                    Segment::Key(key) => Some(key.as_str()),
                    Segment::Index(_) => None,
                });
                let (semantic, set) = name.map_or((Semantic::Other, 0), Semantic::parse);
                let accessor: AccessorId = id(self.gobj, number, crumbs)?;
                let attribute = self.gobj.push(MeshAttribute { semantic: semantic as u32, set, accessor })?;
                self.with_current(|primitive: &mut MeshPrimitive| primitive.attributes.extend(attribute.0))
            }
            Field::NodeChild | Field::SceneRoot | Field::SkinJoint => {
                let node = id(self.gobj, number, crumbs)?;
                let link = self.gobj.push(NodeRef { node })?.0;
                match field {
                    Field::NodeChild => self.with_current(|parent: &mut Node| parent.children.extend(link)),
                    Field::SceneRoot => self.with_current(|scene: &mut Scene| scene.nodes.extend(link)),
                    _ => self.with_current(|skin: &mut Skin| skin.joints.extend(link)),
                }
            }
            Field::DefaultScene => {
                let scene: SceneId = id(self.gobj, number, crumbs)?;
                self.gobj.set_default_scene(scene);
                Ok(())
            }

            Field::AccessorBufferView => {
                let view = id(self.gobj, number, crumbs)?;
                self.with_current(|accessor: &mut Accessor| accessor.buffer_view = view)
            }
            Field::AccessorByteOffset => {
                let offset = uint(number, crumbs)?;
                self.with_current(|accessor: &mut Accessor| accessor.byte_offset = offset)
            }
            Field::AccessorComponentType => {
                let code = uint(number, crumbs)?;
                if ComponentType::from_code(code).is_none() {
                    return Err(invalid(crumbs, format!("unknown component type {code}")));
                }
                self.with_current(|accessor: &mut Accessor| accessor.component_type = code)
            }
            Field::AccessorCount => {
                let count = uint(number, crumbs)?;
                self.with_current(|accessor: &mut Accessor| accessor.count = count)
            }
            Field::AccessorMin | Field::AccessorMax => {
                let slot = slot(crumbs, ACCESSOR_BOUNDS)?;
                let is_min = field == Field::AccessorMin;
                self.with_current(|accessor: &mut Accessor| {
                    let (values, len) = if is_min {
                        (&mut accessor.min, &mut accessor.min_len)
                    } else {
                        (&mut accessor.max, &mut accessor.max_len)
                    };
                    values[slot] = float;
                    *len = (*len).max(slot as u32 + 1);
                })
            }

            Field::ChannelSampler => {
                let local = uint(number, crumbs)?;
                self.with_current(|channel: &mut AnimationChannel| channel.local_sampler = local)
            }
            Field::ChannelNode => {
                let node = id(self.gobj, number, crumbs)?;
                self.with_current(|channel: &mut AnimationChannel| channel.target_node = node)
            }
            Field::SamplerInput => {
                let input = id(self.gobj, number, crumbs)?;
                self.with_current(|sampler: &mut AnimationSampler| sampler.input = input)
            }
            Field::SamplerOutput => {
                let output = id(self.gobj, number, crumbs)?;
                self.with_current(|sampler: &mut AnimationSampler| sampler.output = output)
            }

            Field::BufferByteLength => {
                let len = uint(number, crumbs)?;
                self.with_current(|buffer: &mut Buffer| buffer.byte_length = len)
            }
            Field::ViewBuffer => {
                let buffer = id(self.gobj, number, crumbs)?;
                self.with_current(|view: &mut BufferView| view.buffer = buffer)
            }
            Field::ViewByteOffset => {
                let value = uint(number, crumbs)?;
                self.with_current(|view: &mut BufferView| view.byte_offset = value)
            }
            Field::ViewByteLength => {
                let value = uint(number, crumbs)?;
                self.with_current(|view: &mut BufferView| view.byte_length = value)
            }
            Field::ViewByteStride => {
                let value = uint(number, crumbs)?;
                self.with_current(|view: &mut BufferView| view.byte_stride = value)
            }
            Field::ViewTarget => {
                let value = uint(number, crumbs)?;
                self.with_current(|view: &mut BufferView| view.target = value)
            }

            Field::CameraAspectRatio => self.with_current(|camera: &mut Camera| camera.aspect_ratio = float),
            Field::CameraYfov => self.with_current(|camera: &mut Camera| camera.yfov = float),
            Field::CameraXmag => self.with_current(|camera: &mut Camera| camera.xmag = float),
            Field::CameraYmag => self.with_current(|camera: &mut Camera| camera.ymag = float),
            Field::CameraZnear => self.with_current(|camera: &mut Camera| camera.znear = float),
            Field::CameraZfar => self.with_current(|camera: &mut Camera| camera.zfar = float),

            Field::ImageBufferView => {
                let view = id(self.gobj, number, crumbs)?;
                self.with_current(|image: &mut Image| image.buffer_view = view)
            }

            Field::MaterialBaseColor => {
                let slot = slot(crumbs, 4)?;
                self.with_current(|material: &mut Material| material.base_color_factor[slot] = float)
            }
            Field::MaterialMetallic => self.with_current(|material: &mut Material| material.metallic_factor = float),
            Field::MaterialRoughness => self.with_current(|material: &mut Material| material.roughness_factor = float),
            Field::MaterialTexture(texture_slot) => {
                let texture = id(self.gobj, number, crumbs)?;
                self.with_current(|material: &mut Material| material.texture_mut(texture_slot).texture = texture)
            }
            Field::MaterialTexCoord(texture_slot) => {
                let set = uint(number, crumbs)?;
                self.with_current(|material: &mut Material| material.texture_mut(texture_slot).tex_coord = set)
            }
            Field::MaterialNormalScale => self.with_current(|material: &mut Material| material.normal_scale = float),
            Field::MaterialOcclusionStrength => {
                self.with_current(|material: &mut Material| material.occlusion_strength = float)
            }
            Field::MaterialEmissive => {
                let slot = slot(crumbs, 3)?;
                self.with_current(|material: &mut Material| material.emissive_factor[slot] = float)
            }
            Field::MaterialAlphaCutoff => self.with_current(|material: &mut Material| material.alpha_cutoff = float),

            Field::MeshWeight => {
                let Some(slot) = crumbs.last().and_then(|segment| segment.index()) else {
                    return Ok(());
                };
                if slot as usize >= MESH_WEIGHTS {
                    if slot as usize == MESH_WEIGHTS {
                        tracing::warn!("{}: morph weights past {} are dropped", crumbs, MESH_WEIGHTS);
                    }
                    return Ok(());
                }
                self.with_current(|mesh: &mut Mesh| {
                    mesh.weights[slot as usize] = float;
                    mesh.weight_count = mesh.weight_count.max(slot + 1);
                })
            }
            Field::PrimitiveIndices => {
                let indices = id(self.gobj, number, crumbs)?;
                self.with_current(|primitive: &mut MeshPrimitive| primitive.indices = indices)
            }
            Field::PrimitiveMaterial => {
                let material = id(self.gobj, number, crumbs)?;
                self.with_current(|primitive: &mut MeshPrimitive| primitive.material = material)
            }
            Field::PrimitiveMode => {
                let mode = uint(number, crumbs)?;
                if mode > 6 {
                    return Err(invalid(crumbs, format!("unknown primitive mode {mode}")));
                }
                self.with_current(|primitive: &mut MeshPrimitive| primitive.mode = mode)
            }
            Field::TargetPosition | Field::TargetNormal | Field::TargetTangent => {
                let accessor = id(self.gobj, number, crumbs)?;
                self.with_current(|target: &mut MeshTarget| match field {
                    Field::TargetPosition => target.position = accessor,
                    Field::TargetNormal => target.normal = accessor,
                    _ => target.tangent = accessor,
                })
            }

            Field::NodeMesh => {
                let mesh = id(self.gobj, number, crumbs)?;
                self.with_current(|node: &mut Node| node.mesh = mesh)
            }
            Field::NodeCamera => {
                let camera = id(self.gobj, number, crumbs)?;
                self.with_current(|node: &mut Node| node.camera = camera)
            }
            Field::NodeSkin => {
                let skin = id(self.gobj, number, crumbs)?;
                self.with_current(|node: &mut Node| node.skin = skin)
            }
            Field::NodeTranslation => {
                let slot = slot(crumbs, 3)?;
                self.with_current(|node: &mut Node| node.translation[slot] = float)
            }
            Field::NodeRotation => {
                let slot = slot(crumbs, 4)?;
                self.with_current(|node: &mut Node| node.rotation[slot] = float)
            }
            Field::NodeScale => {
                let slot = slot(crumbs, 3)?;
                self.with_current(|node: &mut Node| node.scale[slot] = float)
            }
            Field::NodeMatrix => {
                let slot = slot(crumbs, 16)?;
                self.with_current(|node: &mut Node| {
                    node.matrix[slot] = float;
                    node.has_matrix = 1;
                })
            }

            Field::SamplerMagFilter => {
                let value = uint(number, crumbs)?;
                self.with_current(|sampler: &mut Sampler| sampler.mag_filter = value)
            }
            Field::SamplerMinFilter => {
                let value = uint(number, crumbs)?;
                self.with_current(|sampler: &mut Sampler| sampler.min_filter = value)
            }
            Field::SamplerWrapS => {
                let value = uint(number, crumbs)?;
                self.with_current(|sampler: &mut Sampler| sampler.wrap_s = value)
            }
            Field::SamplerWrapT => {
                let value = uint(number, crumbs)?;
                self.with_current(|sampler: &mut Sampler| sampler.wrap_t = value)
            }

            Field::SkinInverseBindMatrices => {
                let accessor = id(self.gobj, number, crumbs)?;
                self.with_current(|skin: &mut Skin| skin.inverse_bind_matrices = accessor)
            }
            Field::SkinSkeleton => {
                let node = id(self.gobj, number, crumbs)?;
                self.with_current(|skin: &mut Skin| skin.skeleton = node)
            }

            Field::TextureSampler => {
                let sampler = id(self.gobj, number, crumbs)?;
                self.with_current(|texture: &mut Texture| texture.sampler = sampler)
            }
            Field::TextureSource => {
                let image = id(self.gobj, number, crumbs)?;
                self.with_current(|texture: &mut Texture| texture.source = image)
            }

            _ => Ok(()),
        }
    }

    fn boolean(&mut self, field: Field, value: bool) -> SceneResult<()> {
        match field {
            Field::AccessorNormalized => self.with_current(|accessor: &mut Accessor| accessor.normalized = u32::from(value)),
            Field::MaterialDoubleSided => {
                self.with_current(|material: &mut Material| material.double_sided = u32::from(value))
            }
            _ => Ok(()),
        }
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Sink for Scanner<'_, '_, B> {
    fn event(&mut self, event: Event<'_>, crumbs: &Breadcrumbs) -> SceneResult<()> {
        match event {
            Event::ObjectBegin => match rules::find(Trigger::Object, crumbs) {
                Some(Field::Element(array)) => self.begin(array),
                _ => Ok(()),
            },
            Event::ObjectEnd { .. } => match rules::find(Trigger::Object, crumbs) {
                Some(Field::Element(array)) => self.end(array),
                _ => Ok(()),
            },
            Event::Str(text) => match rules::find(Trigger::Str, crumbs) {
                Some(field) => self.string(field, text, crumbs),
                None => Ok(()),
            },
            Event::Number(number) => match rules::find(Trigger::Num, crumbs) {
                Some(field) => self.number(field, number, crumbs),
                None => Ok(()),
            },
            Event::Bool(value) => match rules::find(Trigger::Bool, crumbs) {
                Some(field) => self.boolean(field, value),
                None => Ok(()),
            },
            Event::ArrayBegin | Event::ArrayEnd { .. } | Event::Null => Ok(()),
        }
    }
}

fn invalid(crumbs: &Breadcrumbs, message: String) -> SceneError {
    SceneError::InvalidValue { path: crumbs.to_string(), message }
}

fn uint(number: Number, crumbs: &Breadcrumbs) -> SceneResult<u32> {
    number
        .as_u64()
        .and_then(|value| u32::try_from(value).ok())
        .ok_or_else(|| invalid(crumbs, format!("expected an unsigned integer, found {number:?}")))
}

/// A typed reference, checked against the capacity of its target array.
fn id<I: ElementId, B: AsRef<[u8]>>(gobj: &Gobj<B>, number: Number, crumbs: &Breadcrumbs) -> SceneResult<I> {
    let Some(raw) = number.as_u64() else {
        return Err(invalid(crumbs, format!("expected an index, found {number:?}")));
    };
    if raw >= gobj.max(I::ARRAY) as u64 {
        return Err(SceneError::InvalidReference { array: I::ARRAY, index: raw });
    }
    Ok(I::from_raw(raw as u32))
}

/// The array position of a component value, bounded by `len`.
fn slot(crumbs: &Breadcrumbs, len: usize) -> SceneResult<usize> {
    match crumbs.last().and_then(|segment| segment.index()) {
        Some(index) if (index as usize) < len => Ok(index as usize),
        _ => Err(invalid(crumbs, format!("expected at most {len} components"))),
    }
}

fn decode_data_uri(uri: &str, index: usize) -> SceneResult<Vec<u8>> {
    let Some((_, payload)) = uri.split_once(";base64,") else {
        return Err(SceneError::InvalidValue {
            path: format!("buffers[{index}].uri"),
            message: "only base64 data uris are supported".to_string(),
        });
    };
    Ok(STANDARD.decode(payload)?)
}

fn read_external(base_dir: Option<&Path>, uri: &str) -> SceneResult<Vec<u8>> {
    let path = base_dir.map_or_else(|| Path::new(uri).to_path_buf(), |dir| dir.join(uri));
    std::fs::read(&path).map_err(|source| {
        tracing::warn!("external buffer {} unreadable: {}", path.display(), source);
        SceneError::Io { path, source }
    })
}
