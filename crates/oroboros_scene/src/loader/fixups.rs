//! Post-scan fixups: values the document leaves implicit.

use crate::error::SceneResult;
use crate::gobj::{
    Accessor, Animation, AnimationChannel, AnimationChannelId, AnimationSamplerId, BufferView, ElementId, Gobj,
    MeshAttribute, Node, NodeId, NodeRef, Scene, SceneId, Semantic, NONE_INDEX,
};
use crate::math::{Mat4, Quaternion, Vec3};

/// Name given to scene `index` when the document leaves it unnamed.
#[must_use]
pub fn placeholder_scene_name(index: usize) -> String {
    format!("scene_{index}")
}

/// Applies every fixup in order.
///
/// # Errors
///
/// Returns `CapacityExceeded` if the string pool cannot hold the placeholder
/// scene names, which pass 1 always reserves.
pub fn apply<B: AsRef<[u8]> + AsMut<[u8]>>(gobj: &mut Gobj<B>) -> SceneResult<()> {
    default_strides(gobj)?;
    default_scene(gobj);
    name_scenes(gobj)?;
    resolve_channel_samplers(gobj)?;
    sync_transforms(gobj)
}

/// Vertex buffer views without a stride get their attribute's packed size.
fn default_strides<B: AsRef<[u8]> + AsMut<[u8]>>(gobj: &mut Gobj<B>) -> SceneResult<()> {
    let attributes: Vec<MeshAttribute> = gobj.iter::<MeshAttribute>().collect();
    for attribute in attributes {
        let Some(accessor) = gobj.get::<Accessor>(attribute.accessor) else {
            continue;
        };
        let Some(size) = accessor.element_size() else {
            continue;
        };
        if gobj.get::<BufferView>(accessor.buffer_view).is_some_and(|view| view.byte_stride == 0) {
            gobj.update(accessor.buffer_view, |view: &mut BufferView| view.byte_stride = size as u32)?;
            tracing::debug!(
                "view {} stride defaults to {} ({:?})",
                accessor.buffer_view.0,
                size,
                Semantic::from_u32(attribute.semantic)
            );
        }
    }
    Ok(())
}

fn default_scene<B: AsRef<[u8]> + AsMut<[u8]>>(gobj: &mut Gobj<B>) {
    if gobj.default_scene().0 == NONE_INDEX && gobj.len::<Scene>() > 0 {
        gobj.set_default_scene(SceneId(0));
    }
}

fn name_scenes<B: AsRef<[u8]> + AsMut<[u8]>>(gobj: &mut Gobj<B>) -> SceneResult<()> {
    for index in 0..gobj.len::<Scene>() {
        let id = SceneId(index as u32);
        if gobj.get::<Scene>(id).is_some_and(|scene| !scene.name.is_some()) {
            let name = gobj.push_str(&placeholder_scene_name(index))?;
            gobj.update(id, |scene: &mut Scene| scene.name = name)?;
        }
    }
    Ok(())
}

/// Channels name their sampler relative to the owning animation.
fn resolve_channel_samplers<B: AsRef<[u8]> + AsMut<[u8]>>(gobj: &mut Gobj<B>) -> SceneResult<()> {
    let animations: Vec<Animation> = gobj.iter::<Animation>().collect();
    for (index, animation) in animations.iter().enumerate() {
        for slot in animation.channels.indices() {
            gobj.update(AnimationChannelId(slot as u32), |channel: &mut AnimationChannel| {
                channel.sampler = if channel.local_sampler < animation.samplers.count {
                    AnimationSamplerId(animation.samplers.first + channel.local_sampler)
                } else {
                    tracing::warn!("animation {} channel names missing sampler {}", index, channel.local_sampler);
                    AnimationSamplerId::NONE
                };
            })?;
        }
    }
    Ok(())
}

/// Fills `matrix` from TRS, or TRS from an authored `matrix`, for every node
/// reachable from the default scene.
fn sync_transforms<B: AsRef<[u8]> + AsMut<[u8]>>(gobj: &mut Gobj<B>) -> SceneResult<()> {
    let Some(scene) = gobj.get::<Scene>(gobj.default_scene()) else {
        return Ok(());
    };
    let mut visited = vec![false; gobj.len::<Node>()];
    let mut stack: Vec<NodeId> = gobj.span::<NodeRef>(scene.nodes).map(|link| link.node).collect();

    while let Some(id) = stack.pop() {
        let Some(index) = id.index() else {
            continue;
        };
        if index >= visited.len() || visited[index] {
            continue;
        }
        visited[index] = true;

        gobj.update(id, |node: &mut Node| {
            if node.has_matrix != 0 {
                let (translation, rotation, scale) = Mat4 { cols: node.matrix }.to_trs();
                node.translation = translation.to_array();
                node.rotation = rotation.to_array();
                node.scale = scale.to_array();
            } else {
                let matrix = Mat4::from_trs(
                    Vec3::from_array(node.translation),
                    Quaternion::from_array(node.rotation),
                    Vec3::from_array(node.scale),
                );
                node.matrix = matrix.cols;
            }
        })?;
        if let Some(node) = gobj.get::<Node>(id) {
            stack.extend(gobj.span::<NodeRef>(node.children).map(|link| link.node));
        }
    }
    Ok(())
}
