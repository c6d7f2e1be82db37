use anyhow::Result;
use glam::{Mat4, Vec3, Vec4};

use lugdunum::prelude::*;
use lugdunum::scene::dirty::GpuBacked;

use framework::{MockDevice, ObjectKind};

mod framework;

fn count_instances(queue: &RenderQueue) -> usize {
    queue.buckets().iter().map(|(_, instances)| instances.len()).sum()
}

#[test]
pub fn queue_holds_visible_scene() -> Result<()> {
    let device = MockDevice::new();
    let (scene, keys) = framework::make_scene(&device)?;
    let mut queue = RenderQueue::new(8);

    scene.update_queue(keys.camera, &mut queue, ExtraPart::default())?;
    assert_eq!(queue.primitive_set_count(), 1, "The triangle should be queued once.");
    assert_eq!(queue.lights_count(), 1, "The sun should be queued.");
    let camera = queue.camera().expect("Queue should have a camera.");
    assert_eq!(camera.node, keys.camera_node);
    assert_eq!(camera.transform, Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0)));

    let (id, instances) = queue.buckets()[0];
    assert_eq!(instances[0].mesh, keys.mesh);
    assert_eq!(instances[0].material, keys.material);
    assert!(id.primitive().has_position() && id.primitive().has_normal());
    assert_eq!(id.material(), MaterialPart::unbound());
    assert!(queue.skybox().is_none());
    Ok(())
}

#[test]
pub fn clear_empties_queue() -> Result<()> {
    let device = MockDevice::new();
    let (scene, keys) = framework::make_scene(&device)?;
    let mut queue = RenderQueue::new(8);
    scene.update_queue(keys.camera, &mut queue, ExtraPart::default())?;
    queue.add_skybox(SkyboxKey::default());

    queue.clear();
    assert_eq!(queue.primitive_set_count(), 0, "Queue should not hold primitive sets after clear.");
    assert_eq!(queue.lights_count(), 0, "Queue should not hold lights after clear.");
    assert!(queue.skybox().is_none());
    assert!(queue.camera().is_none());
    assert!(queue.buckets().is_empty());
    Ok(())
}

#[test]
pub fn update_queue_replaces_contents() -> Result<()> {
    let device = MockDevice::new();
    let (scene, keys) = framework::make_scene(&device)?;
    let mut queue = RenderQueue::new(8);
    scene.update_queue(keys.camera, &mut queue, ExtraPart::default())?;
    scene.update_queue(keys.camera, &mut queue, ExtraPart::default())?;
    assert_eq!(queue.primitive_set_count(), 1, "Refilling the queue should not duplicate instances.");
    assert_eq!(queue.lights_count(), 1);
    Ok(())
}

#[test]
pub fn node_material_overrides_mesh_material() -> Result<()> {
    let device = MockDevice::new();
    let (mut scene, keys) = framework::make_scene(&device)?;
    let textured = scene.add_material(
        MaterialBuilder::new("textured")
            .texture(TextureSlot::Emissive, TextureKey::default(), 0)
            .build(),
    );
    scene.add_node(None, Node::new("override").with_mesh(keys.mesh).with_material(textured))?;

    let mut queue = RenderQueue::new(8);
    scene.update_queue(keys.camera, &mut queue, ExtraPart::default())?;
    assert_eq!(queue.primitive_set_count(), 2);
    let buckets = queue.buckets();
    assert_eq!(buckets.len(), 2, "Different materials should give different pipelines.");
    let overridden = buckets
        .iter()
        .flat_map(|(_, instances)| instances.iter())
        .filter(|instance| instance.material == textured)
        .count();
    assert_eq!(overridden, 1, "Only the node with the override should use it.");

    scene.set_node_material(keys.mesh_node, Some(textured))?;
    scene.update_queue(keys.camera, &mut queue, ExtraPart::default())?;
    assert_eq!(queue.buckets().len(), 1, "Both instances should now share a pipeline.");
    Ok(())
}

#[test]
pub fn primitive_set_without_material_is_skipped() -> Result<()> {
    let device = MockDevice::new();
    let (mut scene, keys) = framework::make_scene(&device)?;
    let bare = scene.add_mesh(framework::triangle(&device, "bare", None)?);
    scene.add_node(None, Node::new("bare").with_mesh(bare))?;

    let mut queue = RenderQueue::new(8);
    scene.update_queue(keys.camera, &mut queue, ExtraPart::default())?;
    assert_eq!(queue.primitive_set_count(), 1, "The mesh without material should not be queued.");

    let node = scene.add_node(None, Node::new("dangling").with_mesh(bare).with_material(MaterialKey::default()))?;
    assert_eq!(queue.add_mesh_instance(&scene, node, Mat4::IDENTITY), 0, "Unknown materials should be skipped.");
    Ok(())
}

#[test]
pub fn lights_are_capped() -> Result<()> {
    let device = MockDevice::new();
    let (mut scene, keys) = framework::make_scene(&device)?;
    for i in 0..4 {
        let light = scene.add_light(Light::point(Vec3::ONE, 1.0, 10.0));
        scene.add_node(None, Node::new(format!("lamp {i}")).with_light(light))?;
    }

    let mut queue = RenderQueue::new(3);
    scene.update_queue(keys.camera, &mut queue, ExtraPart::default())?;
    assert_eq!(queue.lights_count(), 3, "Lights past the maximum should be dropped.");
    assert_eq!(queue.max_lights(), 3);
    assert_eq!(queue.lights()[0].light, keys.light, "Lights should be added in scene order.");
    assert!(!queue.add_light(keys.camera_node, keys.light, Mat4::IDENTITY));
    Ok(())
}

#[test]
pub fn last_skybox_wins() {
    let mut queue = RenderQueue::new(1);
    let mut skyboxes = slotmap::SlotMap::<SkyboxKey, ()>::with_key();
    let first = skyboxes.insert(());
    let second = skyboxes.insert(());
    queue.add_skybox(first);
    queue.add_skybox(second);
    assert_eq!(queue.skybox(), Some(second));
}

#[test]
pub fn skybox_sets_ibl_bits() -> Result<()> {
    let device = MockDevice::new();
    let (mut scene, keys) = framework::make_scene(&device)?;
    let extra = ExtraPart::new(DisplayMode::Full, Antialiasing::Msaa4x).with_prefiltered_map(true);

    let mut queue = RenderQueue::new(8);
    scene.update_queue(keys.camera, &mut queue, extra)?;
    assert!(!queue.extra().has_ibl(), "IBL bits should be cleared without a skybox.");
    assert_eq!(queue.extra().antialiasing(), Antialiasing::Msaa4x);

    let skybox = scene.add_skybox(Skybox {
        environment: TextureKey::default(),
        irradiance: Some(TextureKey::default()),
        prefiltered: None,
    });
    scene.add_node(None, Node::new("sky").with_skybox(skybox))?;
    scene.update_queue(keys.camera, &mut queue, extra)?;
    assert_eq!(queue.skybox(), Some(skybox));
    assert!(queue.extra().has_irradiance_map());
    assert!(!queue.extra().has_prefiltered_map());
    for (id, _) in queue.buckets() {
        assert_eq!(id.extra(), queue.extra(), "Every pipeline id should carry the frame's extra part.");
    }
    Ok(())
}

#[test]
pub fn invisible_subtrees_are_skipped() -> Result<()> {
    let device = MockDevice::new();
    let (mut scene, keys) = framework::make_scene(&device)?;
    let group = scene.add_node(None, Node::new("group"))?;
    scene.add_node(Some(group), Node::new("child").with_mesh(keys.mesh))?;
    scene.set_visible(keys.mesh_node, false)?;
    scene.set_visible(group, false)?;

    let mut queue = RenderQueue::new(8);
    scene.update_queue(keys.camera, &mut queue, ExtraPart::default())?;
    assert_eq!(queue.primitive_set_count(), 0, "Hidden nodes and their children should not be queued.");

    scene.set_visible(group, true)?;
    scene.update_queue(keys.camera, &mut queue, ExtraPart::default())?;
    assert_eq!(queue.primitive_set_count(), 1);
    Ok(())
}

#[test]
pub fn buckets_are_sorted_by_id() -> Result<()> {
    let device = MockDevice::new();
    let (mut scene, keys) = framework::make_scene(&device)?;
    for (i, slot) in TextureSlot::ALL.iter().enumerate() {
        let material = scene.add_material(MaterialBuilder::new(format!("m{i}")).texture(*slot, TextureKey::default(), 0).build());
        scene.add_node(None, Node::new(format!("n{i}")).with_mesh(keys.mesh).with_material(material))?;
    }

    let mut queue = RenderQueue::new(8);
    scene.update_queue(keys.camera, &mut queue, ExtraPart::default())?;
    let ids = queue.buckets().iter().map(|(id, _)| *id).collect::<Vec<_>>();
    assert_eq!(ids.len(), 6);
    assert!(ids.windows(2).all(|pair| pair[0] < pair[1]), "Buckets should be in ascending id order.");
    assert_eq!(count_instances(&queue), queue.primitive_set_count());
    Ok(())
}

#[test]
pub fn camera_without_node_is_an_error() -> Result<()> {
    let device = MockDevice::new();
    let (mut scene, _) = framework::make_scene(&device)?;
    let orphan = scene.add_camera(Camera::perspective("orphan"));
    let mut queue = RenderQueue::new(8);
    let err = scene
        .update_queue(orphan, &mut queue, ExtraPart::default())
        .expect_err("A camera that is not attached to a node cannot render.");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoSuchObject(_))));
    Ok(())
}

#[test]
pub fn clear_dirty_covers_queued_objects() -> Result<()> {
    let device = MockDevice::new();
    let (mut scene, keys) = framework::make_scene(&device)?;
    let mut queue = RenderQueue::new(8);
    scene.update_queue(keys.camera, &mut queue, ExtraPart::default())?;

    queue.clear_dirty(&mut scene, 1);
    let camera = scene.camera(keys.camera).expect("Camera should exist.");
    let light = scene.light(keys.light).expect("Light should exist.");
    let material = scene.material(keys.material).expect("Material should exist.");
    assert!(!camera.is_dirty(1) && !light.is_dirty(1) && !material.is_dirty(1));
    assert!(camera.is_dirty(0) && light.is_dirty(2), "Other images should stay dirty.");
    Ok(())
}

#[test]
pub fn transform_marks_subtree_dirty() -> Result<()> {
    let device = MockDevice::new();
    let (mut scene, keys) = framework::make_scene(&device)?;
    let rig = scene.add_node(None, Node::new("rig"))?;
    let lamp = scene.add_light(Light::spot(Vec3::ONE, 2.0, 5.0, 0.1, 0.5));
    scene.add_node(Some(rig), Node::new("lamp").with_light(lamp))?;
    for image in 0..3 {
        for light in [keys.light, lamp] {
            scene.light_mut(light).expect("Light should exist.").clear_dirty(image);
        }
        scene.material_mut(keys.material).expect("Material should exist.").clear_dirty(image);
    }

    scene.set_transform(rig, Mat4::from_translation(Vec3::X))?;
    assert!(scene.light(lamp).map(|light| light.dirty().is_dirty_any()).unwrap_or(false), "Lights below the node should be dirty.");
    assert!(!scene.light(keys.light).map(|light| light.dirty().is_dirty_any()).unwrap_or(true), "Other lights should stay clean.");
    assert!(!scene.material(keys.material).map(|material| material.is_dirty(0)).unwrap_or(true));

    scene.material_mut(keys.material).expect("Material should exist.").set_base_color(Vec4::ONE);
    assert!(scene.material(keys.material).map(|material| material.is_dirty(2)).unwrap_or(false));
    Ok(())
}

#[test]
pub fn world_transforms_compose() -> Result<()> {
    let device = MockDevice::new();
    let mut scene = Scene::<MockDevice>::new();
    let parent = scene.add_node(None, Node::new("parent").with_transform(Mat4::from_translation(Vec3::X)))?;
    let child = scene.add_node(Some(parent), Node::new("child").with_transform(Mat4::from_translation(Vec3::Y)))?;
    let world = scene.world_transform(child).expect("Child should be in the scene.");
    assert_eq!(world.transform_point3(Vec3::ZERO), Vec3::new(1.0, 1.0, 0.0));

    let removed = scene.remove_node(parent).expect("Parent should be removed.");
    assert_eq!(removed.children(), &[child]);
    assert_eq!(scene.node_count(), 0, "Removing a node should remove its subtree.");
    assert!(scene.roots().is_empty());
    assert!(scene.add_node(Some(parent), Node::new("late")).is_err(), "Removed nodes cannot be parents.");
    assert_eq!(device.live_count(ObjectKind::Buffer), 0);
    Ok(())
}

#[test]
pub fn mesh_requires_positions() -> Result<()> {
    let device = MockDevice::new();
    let err = MeshBuilder::new(device.clone(), "empty")
        .primitive_set(PrimitiveSetData::default())
        .build()
        .expect_err("A primitive set without positions is invalid.");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoPositions)));

    let mesh = MeshBuilder::new(device.clone(), "indexed")
        .primitive_set(PrimitiveSetData {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y, Vec3::ONE],
            texcoords: vec![vec![glam::Vec2::ZERO; 4]],
            indices: Some(vec![0, 1, 2, 2, 1, 3]),
            ..Default::default()
        })
        .build()?;
    let set = &mesh.primitive_sets()[0];
    assert_eq!(set.vertex_buffers().len(), 2, "Position and texcoord streams should get a buffer each.");
    assert!(set.index_buffer().is_some());
    assert_eq!(device.live_count(ObjectKind::Buffer), 3);
    drop(mesh);
    assert!(device.live_objects().is_empty(), "Mesh should release its buffers: {:?}", device.live_objects());
    Ok(())
}

#[test]
pub fn texture_upload() -> Result<()> {
    let device = MockDevice::new();
    let texels = [255u8; 4 * 4 * 4];
    let texture = TextureBuilder::new(device.clone(), "white").extent(4, 4).data(&texels).build()?;
    assert!(!texture.is_cube());
    assert_eq!(texture.extent().width, 4);
    assert_eq!(device.submission_count(), 1, "Upload should be a single submission.");
    assert_eq!(device.live_count(ObjectKind::Buffer), 0, "The staging buffer should be released after upload.");
    assert_eq!(device.live_count(ObjectKind::CommandBuffer), 0);
    assert_eq!(device.live_count(ObjectKind::Fence), 0);

    let face = [0u8; 4];
    let cube = TextureBuilder::new(device.clone(), "sky").cube_faces([&face; 6]).build()?;
    assert!(cube.is_cube());

    let err = TextureBuilder::new(device.clone(), "short")
        .extent(2, 2)
        .data(&texels[..3])
        .build()
        .expect_err("Too few texels should be rejected.");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::TextureSizeMismatch { expected: 16, actual: 3 })
    ));

    drop(texture);
    drop(cube);
    assert!(device.live_objects().is_empty(), "Textures should release everything: {:?}", device.live_objects());
    Ok(())
}
