//! End-to-end loader scenarios against a real heap.

use oroboros_memory::{Heap, MemoryConfig};
use oroboros_scene::gobj::{
    Accessor, AccessorId, AccessorType, AlphaMode, Animation, AnimationChannel, AnimationId, AnimationSampler,
    AnimationSamplerId, AssetField, Buffer, BufferId, BufferView, BufferViewId, Camera, CameraId, CameraKind,
    ComponentType, ElementId, Image, ImageId, Interpolation, Material, MaterialId, Mesh, MeshAttribute, MeshId,
    MeshPrimitive, MeshTarget, Node, NodeId, NodeRef, Sampler, SamplerId, Scene, SceneId, Semantic, Skin, SkinId,
    TargetPath, Texture, TextureId,
};
use oroboros_scene::loader::container;
use oroboros_scene::{Counts, SceneArray, SceneError, SceneHandle, SceneLoader};
use proptest::prelude::*;

const VERTICES: [f32; 9] = [0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];

fn heap() -> Heap {
    Heap::new(MemoryConfig::new(4 * 1024 * 1024)).unwrap()
}

fn triangle_json(uri: Option<&str>) -> String {
    let uri = uri.map_or_else(String::new, |uri| format!(r#", "uri": "{uri}""#));
    format!(
        r#"{{
            "asset": {{"version": "2.0", "generator": "scenario"}},
            "scene": 0,
            "scenes": [{{"name": "main", "nodes": [0]}}],
            "nodes": [{{"name": "tri", "mesh": 0, "translation": [1, 2, 3]}}],
            "meshes": [{{"name": "triangle", "primitives": [{{"attributes": {{"POSITION": 0}}, "mode": 4}}]}}],
            "accessors": [{{"bufferView": 0, "componentType": 5126, "count": 3, "type": "VEC3",
                            "min": [0, 0, 0], "max": [1, 1, 0]}}],
            "bufferViews": [{{"buffer": 0, "byteLength": 36, "target": 34962}}],
            "buffers": [{{"byteLength": 36{uri}}}]
        }}"#
    )
}

/// Follows node 0 down to the vertex bytes it draws.
fn vertex_bytes(scene: &SceneHandle, heap: &Heap) -> Vec<u8> {
    scene
        .with(heap, |gobj| {
            let node: Node = gobj.get(NodeId(0)).unwrap();
            let mesh: Mesh = gobj.get(node.mesh).unwrap();
            let primitive: MeshPrimitive = gobj.span(mesh.primitives).next().unwrap();
            let attribute: MeshAttribute = gobj.span(primitive.attributes).next().unwrap();
            let accessor: Accessor = gobj.get(attribute.accessor).unwrap();
            let view: BufferView = gobj.get(accessor.buffer_view).unwrap();
            let buffer: Buffer = gobj.get(view.buffer).unwrap();
            let data = gobj.raw(buffer.data).unwrap();
            data[view.byte_offset as usize..(view.byte_offset + view.byte_length) as usize].to_vec()
        })
        .unwrap()
}

#[test]
fn test_glb_with_embedded_payload() {
    let heap = heap();
    let json = triangle_json(None);
    let glb = container::build(json.as_bytes(), Some(bytemuck::cast_slice(&VERTICES)));

    let scene = SceneLoader::new(&heap).load_bytes(&glb, None).unwrap();
    assert_eq!(vertex_bytes(&scene, &heap), bytemuck::cast_slice::<f32, u8>(&VERTICES));
    scene
        .with(&heap, |gobj| {
            assert_eq!(gobj.default_scene(), SceneId(0));
            let main: Scene = gobj.get(SceneId(0)).unwrap();
            assert_eq!(gobj.name_of(main.name), "main");
            let node: Node = gobj.get(NodeId(0)).unwrap();
            assert_eq!(&node.matrix[12..15], &[1.0, 2.0, 3.0]);
        })
        .unwrap();
    scene.release(&heap).unwrap();
    heap.validate().unwrap();
}

#[test]
fn test_glb_with_unpadded_json_length() {
    let heap = heap();
    let json = br#"{"buffers":[{"byteLength":10}]}"#;
    assert_ne!(json.len() % 4, 0);
    let payload = [7u8; 10];
    let mut glb = container::build(json, Some(&payload));
    glb[12..16].copy_from_slice(&(json.len() as u32).to_le_bytes());

    let scene = SceneLoader::new(&heap).load_bytes(&glb, None).unwrap();
    scene
        .with(&heap, |gobj| {
            assert_eq!(gobj.used(SceneArray::RawData), 10);
            assert_eq!(gobj.buffer_data(BufferId(0)), Some(&payload[..]));
        })
        .unwrap();
    scene.release(&heap).unwrap();
}

#[test]
fn test_node_without_mesh() {
    let heap = heap();
    let json = br#"{"asset": {"version": "2.0"}, "scenes": [{"nodes": [0]}], "nodes": [{"name": "lonely"}]}"#;
    let scene = SceneLoader::new(&heap).load_bytes(json, None).unwrap();
    scene
        .with(&heap, |gobj| {
            let used = gobj.used_counts();
            assert_eq!(used.get(SceneArray::Node), 1);
            assert_eq!(used.get(SceneArray::Mesh), 0);
            assert_eq!(used.get(SceneArray::Accessor), 0);
            assert_eq!(used.get(SceneArray::Buffer), 0);
            let node: Node = gobj.get(NodeId(0)).unwrap();
            assert_eq!(node.mesh, MeshId::NONE);
            assert!(!node.has_mesh());
            let scene: Scene = gobj.get(SceneId(0)).unwrap();
            assert_eq!(gobj.name_of(scene.name), "scene_0");
        })
        .unwrap();
    scene.release(&heap).unwrap();
}

#[test]
fn test_external_buffer_resolves_next_to_document() {
    let heap = heap();
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("tri.bin"), bytemuck::cast_slice::<f32, u8>(&VERTICES)).unwrap();
    let path = dir.path().join("tri.gltf");
    std::fs::write(&path, triangle_json(Some("tri.bin"))).unwrap();

    let scene = SceneLoader::new(&heap).load_file(&path).unwrap();
    assert_eq!(vertex_bytes(&scene, &heap), bytemuck::cast_slice::<f32, u8>(&VERTICES));
    scene.release(&heap).unwrap();
}

#[test]
fn test_missing_external_buffer_is_io_error() {
    let heap = heap();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("tri.gltf");
    std::fs::write(&path, triangle_json(Some("absent.bin"))).unwrap();

    let claimed = heap.stats().unwrap().arena.claimed_bytes;
    let error = SceneLoader::new(&heap).load_file(&path).unwrap_err();
    assert!(matches!(error, SceneError::Io { .. }));
    assert_eq!(heap.stats().unwrap().arena.claimed_bytes, claimed);
}

#[test]
fn test_container_errors() {
    let heap = heap();
    let loader = SceneLoader::new(&heap);
    let mut glb = container::build(b"{}", None);
    glb[4..8].copy_from_slice(&1u32.to_le_bytes());
    assert!(matches!(loader.load_bytes(&glb, None), Err(SceneError::Container(_))));

    let mut glb = container::build(b"{}", None);
    glb.extend_from_slice(&[0; 4]);
    assert!(matches!(loader.load_bytes(&glb, None), Err(SceneError::ChunkSizeMismatch { .. })));
}

#[test]
fn test_parse_error_reports_position() {
    let heap = heap();
    let error = SceneLoader::new(&heap).load_bytes(b"{\"nodes\": [}", None).unwrap_err();
    let SceneError::Parse { line, .. } = error else {
        panic!("expected a parse error, got {error}");
    };
    assert_eq!(line, 1);
}

#[test]
fn test_relocation_keeps_graph_intact() {
    let heap = heap();
    let json = triangle_json(None);
    let glb = container::build(json.as_bytes(), Some(bytemuck::cast_slice(&VERTICES)));
    let mut scene = SceneLoader::new(&heap).load_bytes(&glb, None).unwrap();
    let before = vertex_bytes(&scene, &heap);

    let copy = scene.duplicate(&heap, &scene.with(&heap, |gobj| gobj.capacity()).unwrap()).unwrap();
    assert_eq!(vertex_bytes(&copy, &heap), before);
    copy.release(&heap).unwrap();

    scene.grow(&heap, &Counts::new().with(SceneArray::Node, 32)).unwrap();
    assert_eq!(vertex_bytes(&scene, &heap), before);
    scene
        .with(&heap, |gobj| {
            assert_eq!(gobj.max(SceneArray::Node), 32);
            assert_eq!(gobj.asset(AssetField::Generator), Some("scenario"));
        })
        .unwrap();
    scene.release(&heap).unwrap();
    heap.validate().unwrap();
}

#[test]
fn test_oversized_byte_length_is_rejected() {
    let heap = heap();
    let loader = SceneLoader::new(&heap);
    let claimed = heap.stats().unwrap().arena.claimed_bytes;

    let huge = br#"{"buffers": [{"byteLength": 18446744073709551615}]}"#;
    assert!(matches!(loader.load_bytes(huge, None), Err(SceneError::InvalidValue { .. })));
    assert!(matches!(loader.measure(huge), Err(SceneError::InvalidValue { .. })));

    let past_32_bits = br#"{"buffers": [{"byteLength": 4294967296}]}"#;
    assert!(matches!(loader.load_bytes(past_32_bits, None), Err(SceneError::InvalidValue { .. })));

    // Each length is legal; together they cannot be placed.
    let many = br#"{"buffers": [
        {"byteLength": 4294967295}, {"byteLength": 4294967295}, {"byteLength": 4294967295}
    ]}"#;
    let error = loader.load_bytes(many, None).unwrap_err();
    assert!(matches!(error, SceneError::Memory(_) | SceneError::InvalidValue { .. }), "{error}");
    assert_eq!(heap.stats().unwrap().arena.claimed_bytes, claimed);
    heap.validate().unwrap();
}

const FULL_DOCUMENT: &str = r#"{
    "asset": {"version": "2.0", "generator": "scenario", "copyright": "nobody", "minVersion": "2.0"},
    "scene": 0,
    "scenes": [{"name": "stage", "nodes": [0]}],
    "nodes": [
        {"name": "root", "camera": 1, "children": [1, 2]},
        {"name": "hip", "mesh": 0, "skin": 0},
        {"name": "knee", "rotation": [0, 0, 0, 1]}
    ],
    "cameras": [
        {"name": "eye", "type": "perspective", "perspective": {"aspectRatio": 1.5, "yfov": 0.75, "znear": 0.25, "zfar": 100}},
        {"type": "orthographic", "orthographic": {"xmag": 2, "ymag": 3, "znear": 0.5, "zfar": 50}}
    ],
    "buffers": [{"name": "blob", "byteLength": 8, "uri": "data:application/octet-stream;base64,AAAAAAAAAAA="}],
    "bufferViews": [
        {"name": "floats", "buffer": 0, "byteOffset": 4, "byteLength": 4, "byteStride": 4, "target": 34962},
        {"buffer": 0, "byteLength": 4}
    ],
    "accessors": [
        {"name": "times", "bufferView": 0, "componentType": 5126, "count": 1, "type": "SCALAR", "min": [0], "max": [1]},
        {"bufferView": 0, "componentType": 5126, "count": 1, "type": "SCALAR"},
        {"bufferView": 1, "byteOffset": 0, "componentType": 5121, "normalized": true, "count": 4, "type": "SCALAR"}
    ],
    "images": [
        {"name": "albedo", "uri": "albedo.png"},
        {"bufferView": 1, "mimeType": "image/png"}
    ],
    "samplers": [
        {"name": "nearest", "magFilter": 9728, "minFilter": 9984, "wrapS": 33071, "wrapT": 33648},
        {}
    ],
    "textures": [
        {"name": "base", "sampler": 0, "source": 0},
        {"source": 1}
    ],
    "materials": [{
        "name": "cloth",
        "pbrMetallicRoughness": {
            "baseColorFactor": [0.5, 0.25, 1, 0.75],
            "metallicFactor": 0,
            "roughnessFactor": 0.5,
            "baseColorTexture": {"index": 0, "texCoord": 1},
            "metallicRoughnessTexture": {"index": 1}
        },
        "normalTexture": {"index": 1, "scale": 2},
        "occlusionTexture": {"index": 0, "strength": 0.5},
        "emissiveTexture": {"index": 1, "texCoord": 2},
        "emissiveFactor": [1, 0.5, 0],
        "alphaMode": "MASK",
        "alphaCutoff": 0.25,
        "doubleSided": true
    }],
    "meshes": [{
        "name": "leg",
        "weights": [0.5],
        "primitives": [{
            "attributes": {"POSITION": 1, "TEXCOORD_1": 0},
            "indices": 2,
            "material": 0,
            "mode": 0,
            "targets": [{"POSITION": 1, "NORMAL": 0, "TANGENT": 1}]
        }]
    }],
    "skins": [{"name": "rig", "inverseBindMatrices": 0, "skeleton": 1, "joints": [1, 2]}],
    "animations": [
        {
            "name": "idle",
            "samplers": [{"input": 0, "output": 1}],
            "channels": [{"sampler": 0, "target": {"node": 2, "path": "rotation"}}]
        },
        {
            "name": "walk",
            "samplers": [
                {"input": 0, "output": 1, "interpolation": "STEP"},
                {"input": 1, "output": 0, "interpolation": "CUBICSPLINE"}
            ],
            "channels": [
                {"sampler": 1, "target": {"node": 1, "path": "translation"}},
                {"sampler": 0, "target": {"node": 1, "path": "weights"}},
                {"sampler": 5, "target": {"node": 0, "path": "scale"}}
            ]
        }
    ]
}"#;

#[test]
fn test_every_collection_is_mapped() {
    let heap = heap();
    let loader = SceneLoader::new(&heap);
    let measured = loader.measure(FULL_DOCUMENT.as_bytes()).unwrap();
    let scene = loader.load_bytes(FULL_DOCUMENT.as_bytes(), None).unwrap();

    scene
        .with(&heap, |gobj| {
            assert_eq!(gobj.used_counts(), measured);
            assert_eq!(gobj.asset(AssetField::Copyright), Some("nobody"));
            assert_eq!(gobj.asset(AssetField::MinVersion), Some("2.0"));

            let eye: Camera = gobj.get(CameraId(0)).unwrap();
            assert_eq!(gobj.str(eye.name), Some("eye"));
            assert_eq!(eye.kind, CameraKind::Perspective as u32);
            assert_eq!((eye.aspect_ratio, eye.yfov, eye.znear, eye.zfar), (1.5, 0.75, 0.25, 100.0));
            let flat: Camera = gobj.get(CameraId(1)).unwrap();
            assert_eq!(flat.kind, CameraKind::Orthographic as u32);
            assert_eq!((flat.xmag, flat.ymag, flat.znear, flat.zfar), (2.0, 3.0, 0.5, 50.0));

            let root: Node = gobj.get(NodeId(0)).unwrap();
            assert_eq!(root.camera, CameraId(1));
            let children: Vec<NodeId> = gobj.span::<NodeRef>(root.children).map(|link| link.node).collect();
            assert_eq!(children, [NodeId(1), NodeId(2)]);
            let hip: Node = gobj.get(NodeId(1)).unwrap();
            assert_eq!((hip.mesh, hip.skin), (MeshId(0), SkinId(0)));

            let buffer: Buffer = gobj.get(BufferId(0)).unwrap();
            assert_eq!(gobj.str(buffer.name), Some("blob"));
            assert_eq!(buffer.byte_length, 8);
            assert_eq!(gobj.buffer_data(BufferId(0)), Some(&[0u8; 8][..]));
            let floats: BufferView = gobj.get(BufferViewId(0)).unwrap();
            assert_eq!(gobj.str(floats.name), Some("floats"));
            assert_eq!(
                (floats.buffer, floats.byte_offset, floats.byte_length, floats.byte_stride, floats.target),
                (BufferId(0), 4, 4, 4, 34962)
            );

            let times: Accessor = gobj.get(AccessorId(0)).unwrap();
            assert_eq!(gobj.str(times.name), Some("times"));
            assert_eq!(times.buffer_view, BufferViewId(0));
            assert_eq!(times.component_type, ComponentType::Float as u32);
            assert_eq!(times.kind, AccessorType::Scalar as u32);
            assert_eq!((times.min_len, times.min[0], times.max_len, times.max[0]), (1, 0.0, 1, 1.0));
            assert_eq!(times.normalized, 0);
            let indices: Accessor = gobj.get(AccessorId(2)).unwrap();
            assert_eq!(indices.buffer_view, BufferViewId(1));
            assert_eq!(indices.component_type, ComponentType::UnsignedByte as u32);
            assert_eq!((indices.normalized, indices.count), (1, 4));

            let albedo: Image = gobj.get(ImageId(0)).unwrap();
            assert_eq!(gobj.str(albedo.name), Some("albedo"));
            assert_eq!(gobj.str(albedo.uri), Some("albedo.png"));
            assert!(albedo.buffer_view.is_none());
            let packed: Image = gobj.get(ImageId(1)).unwrap();
            assert_eq!(packed.buffer_view, BufferViewId(1));
            assert_eq!(gobj.str(packed.mime_type), Some("image/png"));

            let nearest: Sampler = gobj.get(SamplerId(0)).unwrap();
            assert_eq!(gobj.str(nearest.name), Some("nearest"));
            assert_eq!(
                (nearest.mag_filter, nearest.min_filter, nearest.wrap_s, nearest.wrap_t),
                (9728, 9984, 33071, 33648)
            );
            assert_eq!(gobj.get::<Sampler>(SamplerId(1)), Some(Sampler::default()));

            let base: Texture = gobj.get(TextureId(0)).unwrap();
            assert_eq!(gobj.str(base.name), Some("base"));
            assert_eq!((base.sampler, base.source), (SamplerId(0), ImageId(0)));
            let other: Texture = gobj.get(TextureId(1)).unwrap();
            assert!(other.sampler.is_none());
            assert_eq!(other.source, ImageId(1));

            let cloth: Material = gobj.get(MaterialId(0)).unwrap();
            assert_eq!(gobj.str(cloth.name), Some("cloth"));
            assert_eq!(cloth.base_color_factor, [0.5, 0.25, 1.0, 0.75]);
            assert_eq!((cloth.metallic_factor, cloth.roughness_factor), (0.0, 0.5));
            assert_eq!((cloth.base_color_texture.texture, cloth.base_color_texture.tex_coord), (TextureId(0), 1));
            assert_eq!(cloth.metallic_roughness_texture.texture, TextureId(1));
            assert_eq!((cloth.normal_texture.texture, cloth.normal_scale), (TextureId(1), 2.0));
            assert_eq!((cloth.occlusion_texture.texture, cloth.occlusion_strength), (TextureId(0), 0.5));
            assert_eq!((cloth.emissive_texture.texture, cloth.emissive_texture.tex_coord), (TextureId(1), 2));
            assert_eq!(cloth.emissive_factor, [1.0, 0.5, 0.0]);
            assert_eq!((cloth.alpha_mode, cloth.alpha_cutoff), (AlphaMode::Mask as u32, 0.25));
            assert_eq!(cloth.double_sided, 1);

            let leg: Mesh = gobj.get(MeshId(0)).unwrap();
            assert_eq!(gobj.str(leg.name), Some("leg"));
            assert_eq!((leg.weight_count, leg.weights[0]), (1, 0.5));
            let primitive: MeshPrimitive = gobj.span(leg.primitives).next().unwrap();
            assert_eq!((primitive.indices, primitive.material, primitive.mode), (AccessorId(2), MaterialId(0), 0));
            let attributes: Vec<MeshAttribute> = gobj.span(primitive.attributes).collect();
            assert_eq!(attributes.len(), 2);
            assert_eq!(attributes[1].semantic, Semantic::TexCoord as u32);
            assert_eq!((attributes[1].set, attributes[1].accessor), (1, AccessorId(0)));
            let target: MeshTarget = gobj.span(primitive.targets).next().unwrap();
            assert_eq!((target.position, target.normal, target.tangent), (AccessorId(1), AccessorId(0), AccessorId(1)));

            let rig: Skin = gobj.get(SkinId(0)).unwrap();
            assert_eq!(gobj.str(rig.name), Some("rig"));
            assert_eq!((rig.inverse_bind_matrices, rig.skeleton), (AccessorId(0), NodeId(1)));
            let joints: Vec<NodeId> = gobj.span::<NodeRef>(rig.joints).map(|link| link.node).collect();
            assert_eq!(joints, [NodeId(1), NodeId(2)]);

            let idle: Animation = gobj.get(AnimationId(0)).unwrap();
            assert_eq!(gobj.str(idle.name), Some("idle"));
            let walk: Animation = gobj.get(AnimationId(1)).unwrap();
            assert_eq!(gobj.str(walk.name), Some("walk"));
            assert_eq!((walk.samplers.first, walk.samplers.count), (1, 2));
            assert_eq!((walk.channels.first, walk.channels.count), (1, 3));

            let linear: AnimationSampler = gobj.get(AnimationSamplerId(0)).unwrap();
            assert_eq!(linear.interpolation, Interpolation::Linear as u32);
            let spline: AnimationSampler = gobj.get(AnimationSamplerId(2)).unwrap();
            assert_eq!((spline.input, spline.output), (AccessorId(1), AccessorId(0)));
            assert_eq!(spline.interpolation, Interpolation::CubicSpline as u32);

            let channels: Vec<AnimationChannel> = gobj.span(walk.channels).collect();
            assert_eq!(channels[0].sampler, AnimationSamplerId(2));
            assert_eq!(channels[0].local_sampler, 1);
            assert_eq!((channels[0].target_node, channels[0].target_path), (NodeId(1), TargetPath::Translation as u32));
            assert_eq!(channels[1].sampler, AnimationSamplerId(1));
            assert_eq!(channels[1].target_path, TargetPath::Weights as u32);
            assert!(channels[2].sampler.is_none());
            let first: AnimationChannel = gobj.span(idle.channels).next().unwrap();
            assert_eq!((first.sampler, first.target_path), (AnimationSamplerId(0), TargetPath::Rotation as u32));
            gobj.validate().unwrap();
        })
        .unwrap();
    scene.release(&heap).unwrap();
}

#[derive(Clone, Debug)]
struct NodeShape {
    children: Vec<u32>,
    name: Option<String>,
    mesh: bool,
}

fn document_strategy() -> impl Strategy<Value = Vec<NodeShape>> {
    (1usize..12).prop_flat_map(|n| {
        proptest::collection::vec(
            (proptest::collection::vec(0..n as u32, 0..4), proptest::option::of("[a-z]{1,8}"), any::<bool>())
                .prop_map(|(children, name, mesh)| NodeShape { children, name, mesh }),
            n,
        )
    })
}

fn render(nodes: &[NodeShape]) -> Vec<u8> {
    let nodes: Vec<serde_json::Value> = nodes
        .iter()
        .map(|node| {
            let mut value = serde_json::json!({ "children": node.children });
            if let Some(name) = &node.name {
                value["name"] = serde_json::json!(name);
            }
            if node.mesh {
                value["mesh"] = serde_json::json!(0);
            }
            value
        })
        .collect();
    let document = serde_json::json!({
        "asset": {"version": "2.0"},
        "scenes": [{"nodes": [0]}, {"name": "other"}],
        "nodes": nodes,
        "meshes": [{"primitives": [{"attributes": {"POSITION": 0}}]}],
        "accessors": [{"componentType": 5126, "count": 0, "type": "VEC3"}]
    });
    serde_json::to_vec(&document).unwrap()
}

proptest! {
    #[test]
    fn passes_agree_on_random_documents(nodes in document_strategy()) {
        let heap = heap();
        let loader = SceneLoader::new(&heap);
        let json = render(&nodes);
        let measured = loader.measure(&json).unwrap();
        let scene = loader.load_bytes(&json, None).unwrap();

        let used = scene.with(&heap, |gobj| gobj.used_counts()).unwrap();
        prop_assert_eq!(used, measured);
        let expected_refs: usize = nodes.iter().map(|node| node.children.len()).sum::<usize>() + 1;
        prop_assert_eq!(used.get(SceneArray::NodeRef), expected_refs);
        prop_assert_eq!(scene.size(), measured.total_size(loader.config().gobj_align).unwrap());
        scene.release(&heap).unwrap();
    }
}
