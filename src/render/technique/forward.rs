//! Forward rendering: every primitive set is shaded in a single pass with all lights of the queue.
//!
//! A frame for swapchain image `i` goes through these steps:
//!
//! 1. Wait for the fence of image `i`, so its command buffer and attachments are no longer in use.
//! 2. Take pool references for the camera, the light set, every material and the image based lighting maps.
//!    Objects whose pool slot is new or whose data changed are queued for upload.
//! 3. Compile any pipeline variant that is not cached yet.
//! 4. Record the uploads as inline buffer updates, fenced by barriers, then all draws sorted by pipeline id, then
//!    the skybox.
//! 5. Submit, waiting on the frame's wait semaphore and signaling the image's draw complete semaphore.
//! 6. Drop the pool references image `i` held from its previous frame.
//!
//! Nothing is submitted if any of steps 2 to 4 fails, and the references taken so far are dropped again.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;
use glam::Mat4;

use crate::core::app_info::Antialiasing;
use crate::core::commands::{
    AttachmentLoad, ImageBarrier, MemoryBarrier, RenderingAttachment, RenderingInfo, SubmitInfo, WaitSemaphore,
};
use crate::core::device::GraphicsDevice;
use crate::core::error::Error;
use crate::descriptor::descriptor_pool::DescriptorSetPool;
use crate::descriptor::descriptor_set::{DescriptorSetId, DescriptorWrite};
use crate::pipeline::cache::Pipeline;
use crate::pipeline::id::PipelineId;
use crate::pipeline::set_layout::{
    SetLayoutKey, CAMERA_SET, IBL_SET, IRRADIANCE_BINDING, LIGHT_SET, MATERIAL_SET, PREFILTERED_BINDING, SKYBOX_SET,
};
use crate::render::attachment::Attachment;
use crate::render::queue::{PrimitiveSetInstance, RenderQueue};
use crate::render::renderer::{HeldResource, Renderer};
use crate::render::technique::uniforms::{
    light_buffer_data, upload_if_dirty, CameraUniform, LightUniform, MaterialUniform, PendingUpload,
};
use crate::render::technique::{FrameContext, RenderTargets, Technique};
use crate::scene::camera::Camera;
use crate::scene::dirty::GpuBacked;
use crate::scene::mesh::DrawRange;
use crate::scene::{MaterialKey, Scene};
use crate::sync::fence::Fence;
use crate::sync::semaphore::Semaphore;
use crate::util::hash::pool_hash;

/// Vertices generated by the skybox vertex shader for its cube.
pub const SKYBOX_VERTEX_COUNT: u32 = 36;

/// Everything that belongs to one swapchain image.
#[derive(Derivative)]
#[derivative(Debug)]
struct FrameData<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    cmd: vk::CommandBuffer,
    fence: Fence<D>,
    draw_complete: Semaphore<D>,
    depth: Attachment<D>,
    msaa: Option<Attachment<D>>,
    /// Pool references of the last submission for this image.
    held: Vec<HeldResource>,
}

impl<D: GraphicsDevice> FrameData<D> {
    fn new(device: D, index: usize, targets: &RenderTargets, antialiasing: Antialiasing) -> Result<Self> {
        let fence = Fence::new(device.clone(), true)?;
        let draw_complete = Semaphore::new(device.clone())?;
        let (depth, msaa) = create_attachments(&device, index, targets, antialiasing)?;
        let cmd = device.allocate_command_buffer()?;
        Ok(Self {
            device,
            cmd,
            fence,
            draw_complete,
            depth,
            msaa,
            held: Vec::new(),
        })
    }
}

impl<D: GraphicsDevice> Drop for FrameData<D> {
    fn drop(&mut self) {
        self.device.free_command_buffer(self.cmd);
    }
}

fn create_attachments<D: GraphicsDevice>(
    device: &D,
    index: usize,
    targets: &RenderTargets,
    antialiasing: Antialiasing,
) -> Result<(Attachment<D>, Option<Attachment<D>>)> {
    let samples = antialiasing.sample_count();
    let depth = Attachment::depth(device.clone(), &format!("forward depth {index}"), targets.extent, samples)?;
    let msaa = if antialiasing.is_multisampled() {
        Some(Attachment::multisampled_color(
            device.clone(),
            &format!("forward msaa color {index}"),
            targets.extent,
            targets.format,
            samples,
        )?)
    } else {
        None
    };
    Ok((depth, msaa))
}

/// Descriptor sets and pipelines resolved for one frame, before anything is recorded.
struct PreparedFrame<'q> {
    uploads: Vec<PendingUpload>,
    camera_set: vk::DescriptorSet,
    light_set: vk::DescriptorSet,
    ibl_set: Option<vk::DescriptorSet>,
    material_sets: HashMap<MaterialKey, vk::DescriptorSet>,
    draws: Vec<(Pipeline, &'q [PrimitiveSetInstance])>,
    skybox: Option<(Pipeline, vk::DescriptorSet)>,
}

/// The forward technique.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Forward<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    frames: Vec<FrameData<D>>,
    targets: Option<RenderTargets>,
    /// Antialiasing mode the attachments were created for.
    antialiasing: Antialiasing,
}

impl<D: GraphicsDevice> Forward<D> {
    pub fn new(device: D) -> Self {
        Self {
            device,
            frames: Vec::new(),
            targets: None,
            antialiasing: Antialiasing::None,
        }
    }

    /// Pool references held by the last submission for swapchain image `image`.
    pub fn held_resources(&self, image: u32) -> &[HeldResource] {
        self.frames
            .get(image as usize)
            .map(|frame| frame.held.as_slice())
            .unwrap_or_default()
    }

    /// Semaphore signaled when the last submission for `image` completes.
    pub fn draw_complete_semaphore(&self, image: u32) -> Option<vk::Semaphore> {
        self.frames.get(image as usize).map(|frame| frame.draw_complete.handle())
    }

    fn wait_all(&self) -> Result<()> {
        self.frames.iter().try_for_each(|frame| frame.fence.wait())
    }

    fn recreate_attachments(&mut self, antialiasing: Antialiasing) -> Result<()> {
        let targets = self.targets.as_ref().ok_or(Error::InvalidState {
            expected: "initialized",
            found: "uninitialized",
        })?;
        self.wait_all()?;
        for (index, frame) in self.frames.iter_mut().enumerate() {
            let (depth, msaa) = create_attachments(&self.device, index, targets, antialiasing)?;
            frame.depth = depth;
            frame.msaa = msaa;
        }
        debug!("Recreated forward attachments for {:?}", antialiasing);
        self.antialiasing = antialiasing;
        Ok(())
    }

    fn prepare<'q>(
        &self,
        renderer: &mut Renderer<D>,
        scene: &Scene<D>,
        queue: &'q RenderQueue,
        frame: &FrameContext,
        held: &mut Vec<HeldResource>,
    ) -> Result<PreparedFrame<'q>> {
        let image = frame.image_index;
        let mut uploads = Vec::new();

        let camera_set = self.bind_camera(renderer, scene, queue, frame, &mut uploads, held)?;
        let light_set = self.bind_lights(renderer, scene, queue, image, &mut uploads, held)?;
        let ibl_set = self.bind_ibl(renderer, scene, queue, held)?;

        let buckets = queue.buckets();
        let mut material_sets = HashMap::new();
        for instance in buckets.iter().flat_map(|(_, instances)| instances.iter()) {
            if material_sets.contains_key(&instance.material) {
                continue;
            }
            if let Some(set) = self.bind_material(renderer, scene, instance.material, image, &mut uploads, held)? {
                material_sets.insert(instance.material, set);
            }
        }

        let mut draws = Vec::with_capacity(buckets.len());
        for (id, instances) in buckets {
            let pipeline = renderer.pipelines_mut().get_or_create(id)?;
            draws.push((pipeline, instances));
        }

        let skybox = match self.bind_skybox(renderer, scene, queue, held)? {
            Some(set) => Some((renderer.pipelines_mut().get_or_create(PipelineId::skybox(queue.extra()))?, set)),
            None => None,
        };

        Ok(PreparedFrame {
            uploads,
            camera_set,
            light_set,
            ibl_set,
            material_sets,
            draws,
            skybox,
        })
    }

    fn bind_camera(
        &self,
        renderer: &mut Renderer<D>,
        scene: &Scene<D>,
        queue: &RenderQueue,
        frame: &FrameContext,
        uploads: &mut Vec<PendingUpload>,
        held: &mut Vec<HeldResource>,
    ) -> Result<vk::DescriptorSet> {
        let instance = queue.camera().ok_or(Error::NoCamera)?;
        let camera = scene.camera(instance.camera).ok_or(Error::NoSuchObject("camera"))?;
        let image = frame.image_index;
        let aspect_ratio = frame.area.extent.width as f32 / frame.area.extent.height.max(1) as f32;
        // The projection depends on the view, so the aspect ratio is part of the identity.
        let hash = pool_hash(&(instance.camera, aspect_ratio.to_bits(), image));
        let dirty = camera.is_dirty(image) && !renderer.was_uploaded(hash);

        let (pools, pipelines) = renderer.split_mut();
        let (updated, sub_buffer) = upload_if_dirty(&mut pools.camera_buffers, hash, dirty, uploads, || {
            let uniform = CameraUniform {
                view: Camera::view_matrix(instance.transform),
                projection: camera.projection_matrix(aspect_ratio),
            };
            bytemuck::bytes_of(&uniform).to_vec()
        })?;
        held.push(HeldResource::CameraBuffer(sub_buffer.id()));
        let layout = pipelines.set_layout(SetLayoutKey::Camera)?;
        let set = allocate_set(
            &self.device,
            &mut pools.camera_sets,
            layout,
            &[DescriptorWrite::uniform_buffer(0, sub_buffer.descriptor_info())],
            HeldResource::CameraSet,
            held,
        )?;
        if updated {
            renderer.mark_uploaded(hash);
        }
        Ok(set)
    }

    fn bind_lights(
        &self,
        renderer: &mut Renderer<D>,
        scene: &Scene<D>,
        queue: &RenderQueue,
        image: u32,
        uploads: &mut Vec<PendingUpload>,
        held: &mut Vec<HeldResource>,
    ) -> Result<vk::DescriptorSet> {
        let lights = queue
            .lights()
            .iter()
            .filter_map(|instance| scene.light(instance.light).map(|light| (instance, light)))
            .take(renderer.max_lights())
            .collect::<Vec<_>>();
        let keys = lights.iter().map(|(instance, _)| instance.light).collect::<Vec<_>>();
        let hash = pool_hash(&(keys, image));
        let dirty = lights.iter().any(|(_, light)| light.is_dirty(image)) && !renderer.was_uploaded(hash);

        let (pools, pipelines) = renderer.split_mut();
        let (updated, sub_buffer) = upload_if_dirty(&mut pools.light_buffers, hash, dirty, uploads, || {
            let uniforms = lights
                .iter()
                .map(|(instance, light)| LightUniform::new(light, instance.transform))
                .collect::<Vec<_>>();
            light_buffer_data(&uniforms)
        })?;
        held.push(HeldResource::LightBuffer(sub_buffer.id()));
        let layout = pipelines.set_layout(SetLayoutKey::Lights)?;
        let set = allocate_set(
            &self.device,
            &mut pools.light_sets,
            layout,
            &[DescriptorWrite::uniform_buffer(0, sub_buffer.descriptor_info())],
            HeldResource::LightSet,
            held,
        )?;
        if updated {
            renderer.mark_uploaded(hash);
        }
        Ok(set)
    }

    /// Returns `None` if a texture of the material is missing, its primitive sets are then skipped.
    fn bind_material(
        &self,
        renderer: &mut Renderer<D>,
        scene: &Scene<D>,
        key: MaterialKey,
        image: u32,
        uploads: &mut Vec<PendingUpload>,
        held: &mut Vec<HeldResource>,
    ) -> Result<Option<vk::DescriptorSet>> {
        let material = scene.material(key).ok_or(Error::NoSuchObject("material"))?;
        let mut textures = Vec::new();
        for (slot, binding) in material.textures() {
            let Some(texture) = scene.texture(binding.texture) else {
                warn!(
                    "Material {} references a missing {:?} texture, skipping its primitive sets",
                    material.name(),
                    slot
                );
                return Ok(None);
            };
            textures.push(DescriptorWrite::sampled_image(slot.binding(), texture.view(), texture.sampler()));
        }

        let hash = pool_hash(&(key, image));
        let dirty = material.is_dirty(image) && !renderer.was_uploaded(hash);
        let (pools, pipelines) = renderer.split_mut();
        let (updated, sub_buffer) = upload_if_dirty(&mut pools.material_buffers, hash, dirty, uploads, || {
            bytemuck::bytes_of(&MaterialUniform::from(material)).to_vec()
        })?;
        held.push(HeldResource::MaterialBuffer(sub_buffer.id()));

        let layout = pipelines.set_layout(SetLayoutKey::Material {
            textures: material.material_part().bound_mask(),
        })?;
        let writes = std::iter::once(DescriptorWrite::uniform_buffer(0, sub_buffer.descriptor_info()))
            .chain(textures)
            .collect::<Vec<_>>();
        let set = allocate_set(
            &self.device,
            &mut pools.material_sets,
            layout,
            &writes,
            HeldResource::MaterialSet,
            held,
        )?;
        if updated {
            renderer.mark_uploaded(hash);
        }
        Ok(Some(set))
    }

    fn bind_ibl(
        &self,
        renderer: &mut Renderer<D>,
        scene: &Scene<D>,
        queue: &RenderQueue,
        held: &mut Vec<HeldResource>,
    ) -> Result<Option<vk::DescriptorSet>> {
        let extra = queue.extra();
        if !extra.has_ibl() {
            return Ok(None);
        }
        let skybox = queue
            .skybox()
            .and_then(|key| scene.skybox(key))
            .ok_or(Error::NoSuchObject("skybox"))?;
        let mut writes = Vec::new();
        for (binding, texture) in [
            (IRRADIANCE_BINDING, skybox.irradiance.filter(|_| extra.has_irradiance_map())),
            (PREFILTERED_BINDING, skybox.prefiltered.filter(|_| extra.has_prefiltered_map())),
        ] {
            if let Some(texture) = texture {
                let texture = scene.texture(texture).ok_or(Error::NoSuchObject("image based lighting map"))?;
                writes.push(DescriptorWrite::sampled_image(binding, texture.view(), texture.sampler()));
            }
        }
        let (pools, pipelines) = renderer.split_mut();
        let layout = pipelines.set_layout(SetLayoutKey::Ibl {
            irradiance: extra.has_irradiance_map(),
            prefiltered: extra.has_prefiltered_map(),
        })?;
        let set = allocate_set(&self.device, &mut pools.ibl_sets, layout, &writes, HeldResource::IblSet, held)?;
        Ok(Some(set))
    }

    fn bind_skybox(
        &self,
        renderer: &mut Renderer<D>,
        scene: &Scene<D>,
        queue: &RenderQueue,
        held: &mut Vec<HeldResource>,
    ) -> Result<Option<vk::DescriptorSet>> {
        let Some(skybox) = queue.skybox().and_then(|key| scene.skybox(key)) else {
            return Ok(None);
        };
        let environment = scene
            .texture(skybox.environment)
            .ok_or(Error::NoSuchObject("skybox environment map"))?;
        let (pools, pipelines) = renderer.split_mut();
        let layout = pipelines.set_layout(SetLayoutKey::SkyboxCube)?;
        let set = allocate_set(
            &self.device,
            &mut pools.skybox_sets,
            layout,
            &[DescriptorWrite::sampled_image(0, environment.view(), environment.sampler())],
            HeldResource::SkyboxSet,
            held,
        )?;
        Ok(Some(set))
    }

    fn record(
        &self,
        renderer: &Renderer<D>,
        scene: &Scene<D>,
        frame: &FrameContext,
        prepared: &PreparedFrame,
    ) -> Result<()> {
        let device = &self.device;
        let data = self
            .frames
            .get(frame.image_index as usize)
            .ok_or(Error::InvalidImageIndex(frame.image_index))?;
        let targets = self.targets.as_ref().ok_or(Error::InvalidState {
            expected: "initialized",
            found: "uninitialized",
        })?;
        let swapchain_image = targets.images[frame.image_index as usize];
        let swapchain_view = targets.views[frame.image_index as usize];
        let cmd = data.cmd;

        device.begin_command_buffer(cmd, true)?;

        if !prepared.uploads.is_empty() {
            // Earlier submissions may still read the uniform ranges being overwritten.
            device.cmd_memory_barrier(
                cmd,
                &MemoryBarrier {
                    src_stage: vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER,
                    src_access: vk::AccessFlags2::UNIFORM_READ,
                    dst_stage: vk::PipelineStageFlags2::ALL_TRANSFER,
                    dst_access: vk::AccessFlags2::TRANSFER_WRITE,
                },
            );
            for upload in &prepared.uploads {
                device.cmd_update_buffer(cmd, upload.buffer, upload.offset, &upload.data);
            }
            device.cmd_memory_barrier(
                cmd,
                &MemoryBarrier {
                    src_stage: vk::PipelineStageFlags2::ALL_TRANSFER,
                    src_access: vk::AccessFlags2::TRANSFER_WRITE,
                    dst_stage: vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER,
                    dst_access: vk::AccessFlags2::UNIFORM_READ,
                },
            );
        }

        let color_stage = vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT;
        let color_access = vk::AccessFlags2::COLOR_ATTACHMENT_READ | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE;
        device.cmd_image_barrier(
            cmd,
            &ImageBarrier {
                image: swapchain_image,
                aspect: vk::ImageAspectFlags::COLOR,
                layers: 1,
                old_layout: if frame.first_view {
                    vk::ImageLayout::UNDEFINED
                } else {
                    vk::ImageLayout::PRESENT_SRC_KHR
                },
                new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                src_stage: color_stage,
                src_access: vk::AccessFlags2::NONE,
                dst_stage: color_stage,
                dst_access: color_access,
            },
        );
        if let Some(msaa) = &data.msaa {
            device.cmd_image_barrier(
                cmd,
                &ImageBarrier {
                    image: msaa.image(),
                    aspect: vk::ImageAspectFlags::COLOR,
                    layers: 1,
                    old_layout: vk::ImageLayout::UNDEFINED,
                    new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                    src_stage: color_stage,
                    src_access: vk::AccessFlags2::NONE,
                    dst_stage: color_stage,
                    dst_access: color_access,
                },
            );
        }
        let depth_stage = vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS;
        let depth_access =
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE;
        device.cmd_image_barrier(
            cmd,
            &ImageBarrier {
                image: data.depth.image(),
                aspect: data.depth.aspect(),
                layers: 1,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                src_stage: depth_stage,
                src_access: vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
                dst_stage: depth_stage,
                dst_access: depth_access,
            },
        );

        let clear = AttachmentLoad::Clear(renderer.settings().clear_color);
        let color = match &data.msaa {
            Some(msaa) => RenderingAttachment {
                view: msaa.view(),
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                load: clear,
                store: false,
                resolve: Some((swapchain_view, vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)),
            },
            None => RenderingAttachment {
                view: swapchain_view,
                layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                load: clear,
                store: true,
                resolve: None,
            },
        };
        device.cmd_begin_rendering(
            cmd,
            &RenderingInfo {
                area: frame.area,
                color,
                depth: Some(RenderingAttachment {
                    view: data.depth.view(),
                    layout: vk::ImageLayout::DEPTH_ATTACHMENT_OPTIMAL,
                    load: AttachmentLoad::ClearDepth(1.0),
                    store: false,
                    resolve: None,
                }),
            },
        );
        device.cmd_set_viewport(
            cmd,
            vk::Viewport {
                x: frame.area.offset.x as f32,
                y: frame.area.offset.y as f32,
                width: frame.area.extent.width as f32,
                height: frame.area.extent.height as f32,
                min_depth: 0.0,
                max_depth: 1.0,
            },
        );
        device.cmd_set_scissor(cmd, frame.area);

        for (pipeline, instances) in &prepared.draws {
            self.record_bucket(cmd, scene, prepared, pipeline, instances);
        }

        if let Some((pipeline, set)) = prepared.skybox {
            device.cmd_bind_pipeline(cmd, pipeline.handle);
            device.cmd_bind_descriptor_sets(cmd, pipeline.layout, CAMERA_SET, &[prepared.camera_set]);
            device.cmd_bind_descriptor_sets(cmd, pipeline.layout, SKYBOX_SET, &[set]);
            device.cmd_push_constants(
                cmd,
                pipeline.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&Mat4::IDENTITY),
            );
            device.cmd_draw(cmd, SKYBOX_VERTEX_COUNT, 1, 0, 0);
        }

        device.cmd_end_rendering(cmd);
        device.cmd_image_barrier(
            cmd,
            &ImageBarrier {
                image: swapchain_image,
                aspect: vk::ImageAspectFlags::COLOR,
                layers: 1,
                old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                src_stage: color_stage,
                src_access: vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
                dst_stage: vk::PipelineStageFlags2::BOTTOM_OF_PIPE,
                dst_access: vk::AccessFlags2::NONE,
            },
        );
        device.end_command_buffer(cmd)
    }

    fn record_bucket(
        &self,
        cmd: vk::CommandBuffer,
        scene: &Scene<D>,
        prepared: &PreparedFrame,
        pipeline: &Pipeline,
        instances: &[PrimitiveSetInstance],
    ) {
        let device = &self.device;
        device.cmd_bind_pipeline(cmd, pipeline.handle);
        device.cmd_bind_descriptor_sets(cmd, pipeline.layout, CAMERA_SET, &[prepared.camera_set]);
        device.cmd_bind_descriptor_sets(cmd, pipeline.layout, LIGHT_SET, &[prepared.light_set]);
        if let Some(ibl) = prepared.ibl_set.filter(|_| pipeline.id.extra().has_ibl()) {
            device.cmd_bind_descriptor_sets(cmd, pipeline.layout, IBL_SET, &[ibl]);
        }

        for instance in instances {
            let Some(material_set) = prepared.material_sets.get(&instance.material) else {
                continue;
            };
            let Some(primitive_set) = scene
                .mesh(instance.mesh)
                .and_then(|mesh| mesh.primitive_sets().get(instance.primitive_set))
            else {
                warn!("Queued primitive set {} no longer exists, skipping it", instance.primitive_set);
                continue;
            };

            device.cmd_bind_descriptor_sets(cmd, pipeline.layout, MATERIAL_SET, &[*material_set]);
            device.cmd_push_constants(
                cmd,
                pipeline.layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&instance.transform),
            );
            let buffers = primitive_set.vertex_buffers();
            let offsets = vec![0; buffers.len()];
            device.cmd_bind_vertex_buffers(cmd, 0, &buffers, &offsets);
            match primitive_set.draw_range() {
                DrawRange::Vertices { count } => device.cmd_draw(cmd, count, 1, 0, 0),
                DrawRange::Indexed { count, index_type } => {
                    if let Some(indices) = primitive_set.index_buffer() {
                        device.cmd_bind_index_buffer(cmd, indices, 0, index_type);
                        device.cmd_draw_indexed(cmd, count, 1, 0, 0, 0);
                    }
                }
            }
        }
    }

    fn submit(&mut self, frame: &FrameContext) -> Result<vk::Semaphore> {
        let data = self
            .frames
            .get_mut(frame.image_index as usize)
            .ok_or(Error::InvalidImageIndex(frame.image_index))?;
        data.fence.reset()?;
        let signal = data.draw_complete.handle();
        let result = self.device.submit(&SubmitInfo {
            command_buffers: std::slice::from_ref(&data.cmd),
            wait: &[WaitSemaphore {
                semaphore: frame.wait,
                stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            }],
            signal: std::slice::from_ref(&signal),
            fence: Some(data.fence.handle()),
        });
        if let Err(e) = result {
            // The fence was reset but nothing will signal it.
            data.fence = Fence::new(self.device.clone(), true)?;
            return Err(e);
        }
        Ok(signal)
    }
}

impl<D: GraphicsDevice> Technique<D> for Forward<D> {
    fn name(&self) -> &str {
        "forward"
    }

    fn init(&mut self, renderer: &mut Renderer<D>, targets: &RenderTargets) -> Result<()> {
        if !self.frames.is_empty() {
            self.destroy(renderer);
        }
        let antialiasing = renderer.antialiasing();
        self.frames = (0..targets.image_count())
            .map(|index| FrameData::new(self.device.clone(), index, targets, antialiasing))
            .collect::<Result<Vec<_>>>()?;
        self.targets = Some(targets.clone());
        self.antialiasing = antialiasing;
        debug!(
            "Initialized forward technique for {} images ({}x{})",
            targets.image_count(),
            targets.extent.width,
            targets.extent.height
        );
        Ok(())
    }

    fn render(&mut self, renderer: &mut Renderer<D>, scene: &Scene<D>, queue: &RenderQueue, frame: &FrameContext) -> Result<vk::Semaphore> {
        let index = frame.image_index as usize;
        if index >= self.frames.len() {
            return Err(Error::InvalidImageIndex(frame.image_index).into());
        }
        if renderer.antialiasing() != self.antialiasing {
            self.recreate_attachments(renderer.antialiasing())?;
        }
        self.frames[index].fence.wait()?;

        let mut held = Vec::new();
        let recorded = self
            .prepare(renderer, scene, queue, frame, &mut held)
            .and_then(|prepared| self.record(renderer, scene, frame, &prepared));
        let signal = match recorded.and_then(|_| self.submit(frame)) {
            Ok(signal) => signal,
            Err(e) => {
                renderer.pools_mut().release_all(held);
                return Err(e);
            }
        };

        let previous = std::mem::replace(&mut self.frames[index].held, held);
        renderer.pools_mut().release_all(previous);
        Ok(signal)
    }

    fn destroy(&mut self, renderer: &mut Renderer<D>) {
        if let Err(e) = self.wait_all() {
            error!("Failed to wait for forward technique frames: {}", e);
        }
        for frame in self.frames.iter_mut() {
            renderer.pools_mut().release_all(std::mem::take(&mut frame.held));
        }
        self.frames.clear();
        self.targets = None;
    }
}

impl<D: GraphicsDevice> Drop for Forward<D> {
    fn drop(&mut self) {
        if let Err(e) = self.wait_all() {
            error!("Failed to wait for forward technique frames: {}", e);
        }
    }
}

/// Take a reference to the descriptor set holding `writes`, writing the set if it is new.
fn allocate_set<D: GraphicsDevice>(
    device: &D,
    pool: &mut DescriptorSetPool<D>,
    layout: vk::DescriptorSetLayout,
    writes: &[DescriptorWrite],
    hold: fn(DescriptorSetId) -> HeldResource,
    held: &mut Vec<HeldResource>,
) -> Result<vk::DescriptorSet> {
    let hash = pool_hash(&(layout, writes));
    let (updated, set) = pool.allocate(hash, layout)?;
    let (id, handle) = (set.id(), set.handle());
    held.push(hold(id));
    if updated {
        device.update_descriptor_set(handle, writes);
    }
    Ok(handle)
}
