//! Per camera draw lists, rebuilt every frame.

use glam::Mat4;
use multimap::MultiMap;

use crate::core::device::GraphicsDevice;
use crate::pipeline::id::{ExtraPart, PipelineId};
use crate::scene::dirty::GpuBacked;
use crate::scene::{CameraKey, LightKey, MaterialKey, MeshKey, NodeKey, Scene, SkyboxKey};

/// One primitive set of a mesh, drawn for one node with its resolved material.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PrimitiveSetInstance {
    pub node: NodeKey,
    pub mesh: MeshKey,
    /// Index into the mesh's primitive sets.
    pub primitive_set: usize,
    pub material: MaterialKey,
    /// World transform of the node.
    pub transform: Mat4,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct LightInstance {
    pub node: NodeKey,
    pub light: LightKey,
    pub transform: Mat4,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct CameraInstance {
    pub camera: CameraKey,
    pub node: NodeKey,
    pub transform: Mat4,
}

/// Everything one camera draws in a frame, with draws grouped by the pipeline they use.
///
/// The queue only stores keys into the [`Scene`], so it never outlives a frame's worth of meaning. It is
/// cleared and refilled by [`Scene::update_queue()`] before every render.
#[derive(Debug)]
pub struct RenderQueue {
    primitive_sets: MultiMap<PipelineId, PrimitiveSetInstance>,
    lights: Vec<LightInstance>,
    max_lights: usize,
    skybox: Option<SkyboxKey>,
    camera: Option<CameraInstance>,
    extra: ExtraPart,
}

impl RenderQueue {
    /// Create an empty queue that holds at most `max_lights` lights.
    pub fn new(max_lights: usize) -> Self {
        Self {
            primitive_sets: MultiMap::new(),
            lights: Vec::with_capacity(max_lights),
            max_lights,
            skybox: None,
            camera: None,
            extra: ExtraPart::default(),
        }
    }

    /// Remove all draws, lights, the skybox and the camera.
    pub fn clear(&mut self) {
        self.primitive_sets.clear();
        self.lights.clear();
        self.skybox = None;
        self.camera = None;
    }

    /// Set the render settings part of pipeline ids computed by [`RenderQueue::add_mesh_instance()`].
    pub fn set_extra(&mut self, extra: ExtraPart) {
        self.extra = extra;
    }

    pub fn extra(&self) -> ExtraPart {
        self.extra
    }

    pub fn set_camera(&mut self, camera: CameraKey, node: NodeKey, transform: Mat4) {
        self.camera = Some(CameraInstance {
            camera,
            node,
            transform,
        });
    }

    pub fn camera(&self) -> Option<CameraInstance> {
        self.camera
    }

    /// Queue every primitive set of the node's mesh under its pipeline id.
    ///
    /// The node's material override wins over the primitive set's own material. Primitive sets without a
    /// material that exists in the scene are skipped with a warning. Returns the number of instances added.
    pub fn add_mesh_instance<D: GraphicsDevice>(&mut self, scene: &Scene<D>, node_key: NodeKey, transform: Mat4) -> usize {
        let Some(node) = scene.node(node_key) else {
            warn!("Node {:?} is not in the scene, skipping it", node_key);
            return 0;
        };
        let Some(mesh_key) = node.mesh() else {
            return 0;
        };
        let Some(mesh) = scene.mesh(mesh_key) else {
            warn!("Node {} references a mesh that is not in the scene", node.name());
            return 0;
        };

        let mut added = 0;
        for (index, primitive_set) in mesh.primitive_sets().iter().enumerate() {
            let resolved = node
                .material()
                .or(primitive_set.material())
                .and_then(|key| scene.material(key).map(|material| (key, material)));
            let Some((material_key, material)) = resolved else {
                warn!(
                    "Primitive set {} of mesh {} (node {}) has no material, skipping it",
                    index,
                    mesh.name(),
                    node.name()
                );
                continue;
            };
            let id = PipelineId::new(primitive_set.primitive_part(), material.material_part(), self.extra);
            self.primitive_sets.insert(
                id,
                PrimitiveSetInstance {
                    node: node_key,
                    mesh: mesh_key,
                    primitive_set: index,
                    material: material_key,
                    transform,
                },
            );
            added += 1;
        }
        added
    }

    /// Add a light. Returns false and drops the light if the queue already holds `max_lights` lights.
    pub fn add_light(&mut self, node: NodeKey, light: LightKey, transform: Mat4) -> bool {
        if self.lights.len() >= self.max_lights {
            warn!(
                "Render queue already holds {} lights, dropping light of node {:?}",
                self.max_lights, node
            );
            return false;
        }
        self.lights.push(LightInstance {
            node,
            light,
            transform,
        });
        true
    }

    /// Set the skybox. Only one skybox is kept, the last one added wins.
    pub fn add_skybox(&mut self, skybox: SkyboxKey) {
        self.skybox = Some(skybox);
    }

    /// Draws grouped by pipeline id.
    pub fn primitive_sets(&self) -> &MultiMap<PipelineId, PrimitiveSetInstance> {
        &self.primitive_sets
    }

    /// Draw buckets sorted by pipeline id, so the bind order is stable between frames.
    pub fn buckets(&self) -> Vec<(PipelineId, &[PrimitiveSetInstance])> {
        let mut buckets = self
            .primitive_sets
            .iter_all()
            .map(|(id, instances)| (*id, instances.as_slice()))
            .collect::<Vec<_>>();
        buckets.sort_by_key(|(id, _)| *id);
        buckets
    }

    /// Total number of queued primitive set instances.
    pub fn primitive_set_count(&self) -> usize {
        self.primitive_sets.iter_all().map(|(_, instances)| instances.len()).sum()
    }

    pub fn lights(&self) -> &[LightInstance] {
        &self.lights
    }

    pub fn lights_count(&self) -> usize {
        self.lights.len()
    }

    pub fn max_lights(&self) -> usize {
        self.max_lights
    }

    pub fn skybox(&self) -> Option<SkyboxKey> {
        self.skybox
    }

    /// Mark the camera, lights and materials of this queue as up to date for `image`.
    pub fn clear_dirty<D: GraphicsDevice>(&self, scene: &mut Scene<D>, image: u32) {
        if let Some(camera) = self.camera.and_then(|camera| scene.camera_mut(camera.camera)) {
            camera.clear_dirty(image);
        }
        for light in &self.lights {
            if let Some(light) = scene.light_mut(light.light) {
                light.clear_dirty(image);
            }
        }
        for (_, instances) in self.primitive_sets.iter_all() {
            for instance in instances {
                if let Some(material) = scene.material_mut(instance.material) {
                    material.clear_dirty(image);
                }
            }
        }
    }
}
