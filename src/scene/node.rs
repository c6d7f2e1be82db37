use glam::Mat4;

use crate::scene::{CameraKey, LightKey, MaterialKey, MeshKey, NodeKey, SkyboxKey};

/// A scene graph node. Its transform is relative to its parent. Any combination of mesh, light, camera and skybox
/// can be attached.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) name: String,
    pub(crate) transform: Mat4,
    pub(crate) parent: Option<NodeKey>,
    pub(crate) children: Vec<NodeKey>,
    pub(crate) visible: bool,
    pub(crate) mesh: Option<MeshKey>,
    pub(crate) material: Option<MaterialKey>,
    pub(crate) light: Option<LightKey>,
    pub(crate) camera: Option<CameraKey>,
    pub(crate) skybox: Option<SkyboxKey>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Mat4::IDENTITY,
            parent: None,
            children: Vec::new(),
            visible: true,
            mesh: None,
            material: None,
            light: None,
            camera: None,
            skybox: None,
        }
    }

    pub fn with_transform(mut self, transform: Mat4) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_mesh(mut self, mesh: MeshKey) -> Self {
        self.mesh = Some(mesh);
        self
    }

    /// Material used for every primitive set of the mesh, instead of their own.
    pub fn with_material(mut self, material: MaterialKey) -> Self {
        self.material = Some(material);
        self
    }

    pub fn with_light(mut self, light: LightKey) -> Self {
        self.light = Some(light);
        self
    }

    pub fn with_camera(mut self, camera: CameraKey) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_skybox(mut self, skybox: SkyboxKey) -> Self {
        self.skybox = Some(skybox);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Transform relative to the parent node.
    pub fn transform(&self) -> Mat4 {
        self.transform
    }

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    pub fn children(&self) -> &[NodeKey] {
        &self.children
    }

    /// Invisible nodes and their children are skipped when filling render queues.
    pub fn is_visible(&self) -> bool {
        self.visible
    }

    pub fn mesh(&self) -> Option<MeshKey> {
        self.mesh
    }

    pub fn material(&self) -> Option<MaterialKey> {
        self.material
    }

    pub fn light(&self) -> Option<LightKey> {
        self.light
    }

    pub fn camera(&self) -> Option<CameraKey> {
        self.camera
    }

    pub fn skybox(&self) -> Option<SkyboxKey> {
        self.skybox
    }
}

/// Environment cube map drawn behind all geometry, with optional image based lighting maps.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Skybox {
    pub environment: crate::scene::TextureKey,
    pub irradiance: Option<crate::scene::TextureKey>,
    pub prefiltered: Option<crate::scene::TextureKey>,
}
