use anyhow::Result;
use ash::vk;
use ash::vk::Handle;
use glam::{Mat4, Vec3};

use lugdunum::descriptor::descriptor_set::DescriptorResource;
use lugdunum::prelude::*;
use lugdunum::render::renderer::HeldResource;
use lugdunum::render::technique::forward::SKYBOX_VERTEX_COUNT;
use lugdunum::render::technique::{FrameContext, RenderTargets};

use framework::{Command, Failure, MockDevice, ObjectKind, SceneKeys};

mod framework;

const IMAGES: u32 = 3;

/// A forward technique driven by hand, without a window.
struct Harness {
    device: MockDevice,
    renderer: Renderer<MockDevice>,
    forward: Forward<MockDevice>,
    scene: Scene<MockDevice>,
    keys: SceneKeys,
    queue: RenderQueue,
    semaphores: Vec<Semaphore<MockDevice>>,
}

impl Harness {
    fn new() -> Result<Self> {
        let device = MockDevice::new();
        let mut renderer = framework::make_renderer(&device)?;
        renderer.pipelines_mut().set_target(RenderTargetFormat {
            color: vk::Format::B8G8R8A8_SRGB,
            depth: vk::Format::D32_SFLOAT,
        });
        let (scene, keys) = framework::make_scene(&device)?;
        let mut forward = Forward::new(device.clone());
        forward.init(&mut renderer, &targets())?;
        Ok(Self {
            device,
            renderer,
            forward,
            scene,
            keys,
            queue: RenderQueue::new(8),
            semaphores: Vec::new(),
        })
    }

    /// Fill the queue and render it into `image`, waiting on a freshly signaled semaphore.
    fn render(&mut self, image: u32) -> Result<vk::Semaphore> {
        self.renderer.begin_frame();
        self.scene
            .update_queue(self.keys.camera, &mut self.queue, self.renderer.extra_part())?;
        let wait = Semaphore::new(self.device.clone())?;
        // Stands in for swapchain acquisition, which signals the semaphore.
        self.device.acquire_next_image(vk::SwapchainKHR::null(), wait.handle())?;
        let frame = FrameContext {
            image_index: image,
            wait: wait.handle(),
            first_view: true,
            area: Viewport::FULL.area(framework::EXTENT),
        };
        self.semaphores.push(wait);
        self.forward.render(&mut self.renderer, &self.scene, &self.queue, &frame)
    }

    /// Render and present `image`, then mark the queued objects clean for it.
    fn frame(&mut self, image: u32) -> Result<()> {
        let signal = self.render(image)?;
        self.device.present(vk::SwapchainKHR::null(), image, signal)?;
        self.queue.clear_dirty(&mut self.scene, image);
        Ok(())
    }

    fn last_commands(&self) -> Vec<Command> {
        self.device.last_submission().map(|submission| submission.commands).unwrap_or_default()
    }
}

fn targets() -> RenderTargets {
    RenderTargets {
        format: vk::Format::B8G8R8A8_SRGB,
        extent: framework::EXTENT,
        images: (0..IMAGES).map(|i| vk::Image::from_raw(0xffff_0000 + i as u64)).collect(),
        views: (0..IMAGES).map(|i| vk::ImageView::from_raw(0xfffe_0000 + i as u64)).collect(),
    }
}

fn cube(device: &MockDevice, name: &str) -> Result<Texture<MockDevice>> {
    let face = [0u8; 4];
    TextureBuilder::new(device.clone(), name).cube_faces([&face; 6]).build()
}

#[test]
pub fn first_frame_uploads_everything() -> Result<()> {
    let mut harness = Harness::new()?;
    let signal = harness.render(0)?;

    let submission = harness.device.last_submission().expect("Frame should be submitted.");
    assert_eq!(submission.updates().len(), 3, "Camera, light list and material should be uploaded.");
    assert_eq!(submission.draws(), 1);
    assert_eq!(submission.bound_pipelines().len(), 1);
    assert_eq!(submission.signal, vec![signal]);
    assert_eq!(Some(signal), harness.forward.draw_complete_semaphore(0));
    assert!(submission.fence.is_some(), "Frame submission should be fenced.");

    let held = harness.forward.held_resources(0);
    assert_eq!(held.len(), 6, "A buffer and a descriptor set each for camera, lights and material.");
    assert!(held.iter().any(|held| matches!(held, HeldResource::CameraBuffer(_))));
    assert!(held.iter().any(|held| matches!(held, HeldResource::MaterialSet(_))));
    assert!(harness.device.sync_errors().is_empty(), "{:?}", harness.device.sync_errors());
    Ok(())
}

#[test]
pub fn uploads_are_fenced_by_barriers() -> Result<()> {
    let mut harness = Harness::new()?;
    harness.render(0)?;
    let commands = harness.last_commands();
    let first_update = commands
        .iter()
        .position(|cmd| matches!(cmd, Command::UpdateBuffer { .. }))
        .expect("Frame should contain uploads.");
    let begin = commands
        .iter()
        .position(|cmd| matches!(cmd, Command::BeginRendering(_)))
        .expect("Frame should begin rendering.");
    assert!(matches!(commands[first_update - 1], Command::MemoryBarrier(_)), "Uploads should follow a barrier.");
    assert!(first_update < begin, "Uploads must happen outside of rendering.");
    let last_update = commands
        .iter()
        .rposition(|cmd| matches!(cmd, Command::UpdateBuffer { .. }))
        .unwrap_or_default();
    assert!(matches!(commands[last_update + 1], Command::MemoryBarrier(_)), "Uploads should be made visible.");
    assert!(matches!(commands.last(), Some(Command::ImageBarrier(_))), "The image should be transitioned for present.");
    Ok(())
}

#[test]
pub fn clean_objects_are_not_uploaded_again() -> Result<()> {
    let mut harness = Harness::new()?;
    for image in 0..IMAGES {
        harness.frame(image)?;
    }
    harness.frame(0)?;
    let submission = harness.device.last_submission().expect("Frame should be submitted.");
    assert!(submission.updates().is_empty(), "Nothing changed, nothing should be uploaded.");
    assert_eq!(submission.draws(), 1, "The triangle should still be drawn.");

    harness
        .scene
        .set_transform(harness.keys.camera_node, Mat4::from_translation(Vec3::new(0.0, 1.0, 5.0)))?;
    harness.frame(1)?;
    let updates = harness.device.last_submission().map(|s| s.updates()).unwrap_or_default();
    assert_eq!(updates.len(), 1, "Only the moved camera should be uploaded.");
    assert_eq!(updates[0].2.len(), std::mem::size_of::<[Mat4; 2]>());
    assert!(harness.device.sync_errors().is_empty(), "{:?}", harness.device.sync_errors());
    Ok(())
}

#[test]
pub fn material_change_is_uploaded_for_every_image() -> Result<()> {
    let mut harness = Harness::new()?;
    for image in 0..IMAGES {
        harness.frame(image)?;
    }
    harness
        .scene
        .material_mut(harness.keys.material)
        .expect("Material should exist.")
        .set_base_color(glam::Vec4::ONE);
    for image in 0..IMAGES {
        harness.frame(image)?;
        let updates = harness.device.last_submission().map(|s| s.updates()).unwrap_or_default();
        assert_eq!(updates.len(), 1, "Image {image} holds a stale copy of the material.");
    }
    harness.frame(0)?;
    assert!(harness.device.last_submission().map(|s| s.updates().is_empty()).unwrap_or(false));
    Ok(())
}

#[test]
pub fn previous_references_are_released() -> Result<()> {
    let mut harness = Harness::new()?;
    harness.frame(0)?;
    let held = harness.forward.held_resources(0).to_vec();
    harness.frame(0)?;
    assert_eq!(harness.forward.held_resources(0), held.as_slice(), "The same resources should be reused.");
    let pools = harness.renderer.pools();
    assert_eq!(pools.camera_buffers.in_use_count(), 1, "The previous frame's reference should be dropped.");
    assert_eq!(pools.camera_sets.in_use_count(), 1);

    harness.frame(1)?;
    harness.frame(2)?;
    assert_eq!(harness.renderer.pools().camera_buffers.in_use_count(), 3, "Each image has its own camera copy.");

    harness.forward.destroy(&mut harness.renderer);
    let pools = harness.renderer.pools();
    assert_eq!(pools.camera_buffers.in_use_count(), 0);
    assert_eq!(pools.light_buffers.in_use_count(), 0);
    assert_eq!(pools.material_buffers.in_use_count(), 0);
    assert_eq!(pools.material_sets.in_use_count(), 0);
    assert!(harness.forward.held_resources(0).is_empty());
    Ok(())
}

#[test]
pub fn submit_failure_releases_references() -> Result<()> {
    let mut harness = Harness::new()?;
    harness.frame(0)?;
    let submissions = harness.device.submission_count();

    harness.device.fail_next(Failure::Submit);
    assert!(harness.render(1).is_err(), "Failed submission should be reported.");
    assert!(harness.forward.held_resources(1).is_empty());
    assert_eq!(
        harness.renderer.pools().camera_buffers.in_use_count(),
        1,
        "References of the failed frame should be dropped."
    );
    assert_eq!(harness.device.submission_count(), submissions);

    harness.frame(1)?;
    let submission = harness.device.last_submission().expect("Retry should be submitted.");
    assert_eq!(submission.updates().len(), 3, "The retry should upload everything again.");
    assert_eq!(harness.forward.held_resources(1).len(), 6);
    Ok(())
}

#[test]
pub fn pipeline_failure_submits_nothing() -> Result<()> {
    let mut harness = Harness::new()?;
    harness.device.fail_next(Failure::CreatePipeline);
    let submissions = harness.device.submission_count();
    assert!(harness.render(0).is_err());
    assert_eq!(harness.device.submission_count(), submissions, "Nothing should be submitted.");
    let pools = harness.renderer.pools();
    assert_eq!(pools.camera_buffers.in_use_count(), 0);
    assert_eq!(pools.light_sets.in_use_count(), 0);
    Ok(())
}

#[test]
pub fn missing_texture_skips_draws() -> Result<()> {
    let mut harness = Harness::new()?;
    let broken = harness.scene.add_material(
        MaterialBuilder::new("broken")
            .texture(TextureSlot::BaseColor, TextureKey::default(), 0)
            .build(),
    );
    harness
        .scene
        .add_node(None, Node::new("broken").with_mesh(harness.keys.mesh).with_material(broken))?;

    harness.render(0)?;
    let submission = harness.device.last_submission().expect("Frame should still be submitted.");
    assert_eq!(submission.draws(), 1, "Only the intact triangle should be drawn.");
    assert_eq!(harness.renderer.pools().material_sets.in_use_count(), 1);
    Ok(())
}

#[test]
pub fn textured_material_writes_samplers() -> Result<()> {
    let mut harness = Harness::new()?;
    let texels = [255u8; 4];
    let texture = TextureBuilder::new(harness.device.clone(), "white").data(&texels).build()?;
    let sampler = texture.sampler();
    let texture = harness.scene.add_texture(texture);
    let material = harness
        .scene
        .material_mut(harness.keys.material)
        .expect("Material should exist.");
    material.set_texture(
        TextureSlot::BaseColor,
        Some(lugdunum::scene::material::TextureBinding {
            texture,
            uv_channel: 0,
        }),
    );

    harness.render(0)?;
    let set = harness
        .last_commands()
        .iter()
        .filter_map(|cmd| match cmd {
            Command::BindDescriptorSets { first_set: 2, sets, .. } => sets.first().copied(),
            _ => None,
        })
        .next()
        .expect("Material set should be bound.");
    let writes = harness.device.descriptor_writes(set);
    assert_eq!(writes.len(), 2, "Uniform buffer and base color texture should be written.");
    assert!(
        writes.iter().any(|write| write.binding == TextureSlot::BaseColor.binding()
            && matches!(write.resource, DescriptorResource::CombinedImageSampler { sampler: written, .. } if written == sampler)),
        "The texture's sampler should be written."
    );
    Ok(())
}

#[test]
pub fn draws_follow_pipeline_order() -> Result<()> {
    let mut harness = Harness::new()?;
    for topology in [Topology::LineList, Topology::PointList] {
        let mesh = MeshBuilder::new(harness.device.clone(), format!("{topology:?}"))
            .primitive_set(PrimitiveSetData {
                topology,
                positions: vec![Vec3::ZERO, Vec3::X],
                material: Some(harness.keys.material),
                ..Default::default()
            })
            .build()?;
        let mesh = harness.scene.add_mesh(mesh);
        harness.scene.add_node(None, Node::new(format!("{topology:?}")).with_mesh(mesh))?;
    }

    harness.render(0)?;
    let expected = harness
        .queue
        .buckets()
        .iter()
        .filter_map(|(id, _)| harness.renderer.pipelines().get(*id))
        .map(|pipeline| pipeline.handle)
        .collect::<Vec<_>>();
    assert_eq!(expected.len(), 3);
    let submission = harness.device.last_submission().expect("Frame should be submitted.");
    assert_eq!(submission.bound_pipelines(), expected, "Pipelines should be bound in id order.");
    assert_eq!(submission.draws(), 3);
    Ok(())
}

#[test]
pub fn skybox_is_drawn_last() -> Result<()> {
    let mut harness = Harness::new()?;
    let environment = cube(&harness.device, "sky")?;
    let environment = harness.scene.add_texture(environment);
    let skybox = harness.scene.add_skybox(Skybox {
        environment,
        irradiance: None,
        prefiltered: None,
    });
    harness.scene.add_node(None, Node::new("sky").with_skybox(skybox))?;

    harness.render(0)?;
    let commands = harness.last_commands();
    let last_draw = commands
        .iter()
        .filter(|cmd| matches!(cmd, Command::Draw { .. } | Command::DrawIndexed { .. }))
        .last();
    assert!(
        matches!(last_draw, Some(Command::Draw { vertex_count }) if *vertex_count == SKYBOX_VERTEX_COUNT),
        "The skybox should be the last draw."
    );
    assert_eq!(harness.renderer.pools().skybox_sets.in_use_count(), 1);
    assert!(harness.renderer.pipelines().get(PipelineId::skybox(harness.renderer.extra_part())).is_some());
    Ok(())
}

#[test]
pub fn image_based_lighting_is_bound() -> Result<()> {
    let mut harness = Harness::new()?;
    let environment = cube(&harness.device, "sky")?;
    let irradiance = cube(&harness.device, "irradiance")?;
    let environment = harness.scene.add_texture(environment);
    let irradiance = harness.scene.add_texture(irradiance);
    let skybox = harness.scene.add_skybox(Skybox {
        environment,
        irradiance: Some(irradiance),
        prefiltered: None,
    });
    harness.scene.add_node(None, Node::new("sky").with_skybox(skybox))?;

    harness.render(0)?;
    assert_eq!(harness.renderer.pools().ibl_sets.in_use_count(), 1);
    let ibl_binds = harness
        .last_commands()
        .iter()
        .filter(|cmd| matches!(cmd, Command::BindDescriptorSets { first_set: 3, .. }))
        .count();
    assert_eq!(ibl_binds, 1, "The mesh pipeline should bind the IBL set.");
    Ok(())
}

#[test]
pub fn missing_ibl_map_fails_the_frame() -> Result<()> {
    let mut harness = Harness::new()?;
    let environment = cube(&harness.device, "sky")?;
    let environment = harness.scene.add_texture(environment);
    let skybox = harness.scene.add_skybox(Skybox {
        environment,
        irradiance: None,
        prefiltered: Some(TextureKey::default()),
    });
    harness.scene.add_node(None, Node::new("sky").with_skybox(skybox))?;

    let err = harness.render(0).expect_err("A missing IBL map cannot be bound.");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NoSuchObject(_))));
    assert_eq!(harness.renderer.pools().camera_buffers.in_use_count(), 0);
    Ok(())
}

#[test]
pub fn multisampling_resolves_into_swapchain() -> Result<()> {
    let mut harness = Harness::new()?;
    let images = harness.device.live_count(ObjectKind::Image);
    assert_eq!(harness.renderer.set_antialiasing(Antialiasing::Msaa16x), Antialiasing::Msaa8x);

    harness.render(0)?;
    assert_eq!(
        harness.device.live_count(ObjectKind::Image),
        images + IMAGES as usize,
        "Every image should get a multisampled color attachment."
    );
    let rendering = harness
        .last_commands()
        .into_iter()
        .find_map(|cmd| match cmd {
            Command::BeginRendering(info) => Some(info),
            _ => None,
        })
        .expect("Frame should begin rendering.");
    assert_eq!(
        rendering.color.resolve.map(|(view, _)| view),
        Some(targets().views[0]),
        "The multisampled image should resolve into the swapchain image."
    );
    let id = harness.queue.buckets()[0].0;
    assert_eq!(id.extra().antialiasing(), Antialiasing::Msaa8x);
    Ok(())
}

#[test]
pub fn destroyed_technique_leaks_nothing() -> Result<()> {
    let device;
    {
        let mut harness = Harness::new()?;
        device = harness.device.clone();
        for image in 0..IMAGES {
            harness.frame(image)?;
        }
        harness.forward.destroy(&mut harness.renderer);
        assert_eq!(device.live_count(ObjectKind::Fence), 0);
        assert_eq!(device.live_count(ObjectKind::CommandBuffer), 0);
    }
    assert!(device.live_objects().is_empty(), "Everything should be destroyed: {:?}", device.live_objects());
    Ok(())
}
