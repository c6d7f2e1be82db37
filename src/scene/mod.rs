//! The scene graph the renderer draws from.
//!
//! A [`Scene`] owns every renderable object in slot maps and hands out generational keys. Nodes form a tree,
//! each node can carry a mesh, a light, a camera or a skybox. Keys are stable for the lifetime of the object
//! and are never reused for a different object, which makes them suitable as pool hash keys.
//!
//! Filling a [`RenderQueue`](crate::render::queue::RenderQueue) for one camera is done with
//! [`Scene::update_queue()`].

use anyhow::Result;
use glam::Mat4;
use slotmap::{new_key_type, SlotMap};

use crate::core::device::GraphicsDevice;
use crate::core::error::Error;
use crate::pipeline::id::ExtraPart;
use crate::render::queue::RenderQueue;
use crate::scene::camera::Camera;
use crate::scene::dirty::GpuBacked;
use crate::scene::light::Light;
use crate::scene::material::Material;
use crate::scene::mesh::Mesh;
use crate::scene::node::{Node, Skybox};
use crate::scene::texture::Texture;

pub mod buffer;
pub mod camera;
pub mod dirty;
pub mod light;
pub mod material;
pub mod mesh;
pub mod node;
pub mod texture;

new_key_type! {
    pub struct NodeKey;
    pub struct MeshKey;
    pub struct MaterialKey;
    pub struct TextureKey;
    pub struct LightKey;
    pub struct CameraKey;
    pub struct SkyboxKey;
}

/// Owner of all scene objects.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Scene<D: GraphicsDevice> {
    nodes: SlotMap<NodeKey, Node>,
    roots: Vec<NodeKey>,
    meshes: SlotMap<MeshKey, Mesh<D>>,
    materials: SlotMap<MaterialKey, Material>,
    textures: SlotMap<TextureKey, Texture<D>>,
    lights: SlotMap<LightKey, Light>,
    cameras: SlotMap<CameraKey, Camera>,
    skyboxes: SlotMap<SkyboxKey, Skybox>,
}

impl<D: GraphicsDevice> Default for Scene<D> {
    fn default() -> Self {
        Self {
            nodes: SlotMap::with_key(),
            roots: Vec::new(),
            meshes: SlotMap::with_key(),
            materials: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            lights: SlotMap::with_key(),
            cameras: SlotMap::with_key(),
            skyboxes: SlotMap::with_key(),
        }
    }
}

impl<D: GraphicsDevice> Scene<D> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a node as a child of `parent`, or as a root node.
    /// # Errors
    /// Fails with [`Error::NoSuchObject`] if `parent` is not in the scene.
    pub fn add_node(&mut self, parent: Option<NodeKey>, mut node: Node) -> Result<NodeKey> {
        if let Some(parent) = parent {
            if !self.nodes.contains_key(parent) {
                return Err(Error::NoSuchObject("parent node").into());
            }
        }
        node.parent = parent;
        node.children.clear();
        let key = self.nodes.insert(node);
        match parent.and_then(|parent| self.nodes.get_mut(parent)) {
            Some(parent) => parent.children.push(key),
            None => self.roots.push(key),
        }
        Ok(key)
    }

    /// Remove a node and its whole subtree. Objects attached to the nodes stay in the scene.
    pub fn remove_node(&mut self, key: NodeKey) -> Option<Node> {
        let node = self.nodes.remove(key)?;
        match node.parent.and_then(|parent| self.nodes.get_mut(parent)) {
            Some(parent) => parent.children.retain(|child| *child != key),
            None => self.roots.retain(|root| *root != key),
        }
        let mut pending = node.children.clone();
        while let Some(child) = pending.pop() {
            if let Some(removed) = self.nodes.remove(child) {
                pending.extend(removed.children);
            }
        }
        Some(node)
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn roots(&self) -> &[NodeKey] {
        &self.roots
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Set the local transform of a node. Cameras and lights in the subtree move with it, so they are marked
    /// dirty.
    /// # Errors
    /// Fails with [`Error::NoSuchObject`] if the node is not in the scene.
    pub fn set_transform(&mut self, key: NodeKey, transform: Mat4) -> Result<()> {
        let node = self.nodes.get_mut(key).ok_or(Error::NoSuchObject("node"))?;
        node.transform = transform;
        let mut pending = vec![key];
        while let Some(key) = pending.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            if let Some(light) = node.light.and_then(|light| self.lights.get_mut(light)) {
                light.mark_dirty();
            }
            if let Some(camera) = node.camera.and_then(|camera| self.cameras.get_mut(camera)) {
                camera.mark_dirty();
            }
            pending.extend(node.children.iter().copied());
        }
        Ok(())
    }

    /// Show or hide a node with its subtree.
    pub fn set_visible(&mut self, key: NodeKey, visible: bool) -> Result<()> {
        let node = self.nodes.get_mut(key).ok_or(Error::NoSuchObject("node"))?;
        node.visible = visible;
        Ok(())
    }

    /// Replace the material override of a node.
    pub fn set_node_material(&mut self, key: NodeKey, material: Option<MaterialKey>) -> Result<()> {
        let node = self.nodes.get_mut(key).ok_or(Error::NoSuchObject("node"))?;
        node.material = material;
        Ok(())
    }

    /// Transform of a node relative to the scene root.
    pub fn world_transform(&self, key: NodeKey) -> Option<Mat4> {
        let mut node = self.nodes.get(key)?;
        let mut transform = node.transform;
        while let Some(parent) = node.parent {
            node = self.nodes.get(parent)?;
            transform = node.transform * transform;
        }
        Some(transform)
    }

    /// The first node the camera is attached to.
    pub fn camera_node(&self, camera: CameraKey) -> Option<NodeKey> {
        self.nodes
            .iter()
            .find(|(_, node)| node.camera == Some(camera))
            .map(|(key, _)| key)
    }

    pub fn add_mesh(&mut self, mesh: Mesh<D>) -> MeshKey {
        self.meshes.insert(mesh)
    }

    pub fn mesh(&self, key: MeshKey) -> Option<&Mesh<D>> {
        self.meshes.get(key)
    }

    pub fn mesh_mut(&mut self, key: MeshKey) -> Option<&mut Mesh<D>> {
        self.meshes.get_mut(key)
    }

    pub fn add_material(&mut self, material: Material) -> MaterialKey {
        self.materials.insert(material)
    }

    pub fn material(&self, key: MaterialKey) -> Option<&Material> {
        self.materials.get(key)
    }

    pub fn material_mut(&mut self, key: MaterialKey) -> Option<&mut Material> {
        self.materials.get_mut(key)
    }

    pub fn add_texture(&mut self, texture: Texture<D>) -> TextureKey {
        self.textures.insert(texture)
    }

    pub fn texture(&self, key: TextureKey) -> Option<&Texture<D>> {
        self.textures.get(key)
    }

    pub fn add_light(&mut self, light: Light) -> LightKey {
        self.lights.insert(light)
    }

    pub fn light(&self, key: LightKey) -> Option<&Light> {
        self.lights.get(key)
    }

    pub fn light_mut(&mut self, key: LightKey) -> Option<&mut Light> {
        self.lights.get_mut(key)
    }

    pub fn add_camera(&mut self, camera: Camera) -> CameraKey {
        self.cameras.insert(camera)
    }

    pub fn camera(&self, key: CameraKey) -> Option<&Camera> {
        self.cameras.get(key)
    }

    pub fn camera_mut(&mut self, key: CameraKey) -> Option<&mut Camera> {
        self.cameras.get_mut(key)
    }

    pub fn add_skybox(&mut self, skybox: Skybox) -> SkyboxKey {
        self.skyboxes.insert(skybox)
    }

    pub fn skybox(&self, key: SkyboxKey) -> Option<&Skybox> {
        self.skyboxes.get(key)
    }

    /// Visible nodes with their world transforms, parents before children.
    pub fn visible_nodes(&self) -> Vec<(NodeKey, Mat4)> {
        let mut visible = Vec::with_capacity(self.nodes.len());
        let mut pending = self
            .roots
            .iter()
            .rev()
            .map(|root| (*root, Mat4::IDENTITY))
            .collect::<Vec<_>>();
        while let Some((key, parent_transform)) = pending.pop() {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            if !node.visible {
                continue;
            }
            let world = parent_transform * node.transform;
            visible.push((key, world));
            pending.extend(node.children.iter().rev().map(|child| (*child, world)));
        }
        visible
    }

    /// Clear `queue` and fill it with everything `camera` sees this frame.
    ///
    /// The first visible skybox is used. Its image based lighting maps set the matching bits of `extra`
    /// before any mesh instance is added, so all pipeline ids of the frame agree on them.
    /// # Errors
    /// Fails with [`Error::NoSuchObject`] if the camera is not attached to any node.
    pub fn update_queue(&self, camera: CameraKey, queue: &mut RenderQueue, extra: ExtraPart) -> Result<()> {
        queue.clear();
        let camera_node = self.camera_node(camera).ok_or(Error::NoSuchObject("camera node"))?;
        let camera_transform = self
            .world_transform(camera_node)
            .ok_or(Error::NoSuchObject("camera node"))?;
        queue.set_camera(camera, camera_node, camera_transform);

        let visible = self.visible_nodes();
        let skybox = visible
            .iter()
            .find_map(|(key, _)| self.nodes.get(*key).and_then(|node| node.skybox))
            .filter(|skybox| self.skyboxes.contains_key(*skybox));
        let extra = match skybox.and_then(|key| self.skyboxes.get(key)) {
            Some(skybox) => extra
                .with_irradiance_map(skybox.irradiance.is_some())
                .with_prefiltered_map(skybox.prefiltered.is_some()),
            None => extra.with_irradiance_map(false).with_prefiltered_map(false),
        };
        queue.set_extra(extra);
        if let Some(skybox) = skybox {
            queue.add_skybox(skybox);
        }

        for (key, world) in visible {
            let Some(node) = self.nodes.get(key) else {
                continue;
            };
            if node.mesh.is_some() {
                queue.add_mesh_instance(self, key, world);
            }
            if let Some(light) = node.light {
                queue.add_light(key, light, world);
            }
        }
        Ok(())
    }
}
