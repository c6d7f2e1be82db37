#![allow(dead_code)]

//! A recording [`GraphicsDevice`] for automated tests.
//!
//! [`MockDevice`] hands out unique fake handles, keeps track of every live object so leaks can be asserted,
//! records every command buffer and submission, and checks semaphore usage the way the validation layers
//! would: a wait must consume a pending signal, and a semaphore must not be signaled twice.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet, VecDeque};
use std::rc::Rc;

use anyhow::{anyhow, Result};
use ash::vk;
use ash::vk::Handle;
use glam::{Mat4, Vec3};

use lugdunum::core::commands::{ImageBarrier, MemoryBarrier, RenderingInfo, SubmitInfo};
use lugdunum::core::resources::{
    BufferCreateInfo, DescriptorBinding, ImageCreateInfo, ImageViewCreateInfo, SamplerCreateInfo,
};
use lugdunum::descriptor::descriptor_set::DescriptorResource;
use lugdunum::pipeline::create_info::GraphicsPipelineCreateInfo;
use lugdunum::prelude::*;

pub const SPIRV_MAGIC: u32 = 0x0723_0203;

/// Kinds of objects the mock device tracks for leak checks.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Buffer,
    Image,
    ImageView,
    Sampler,
    Memory,
    SetLayout,
    DescriptorPool,
    PipelineLayout,
    ShaderModule,
    Pipeline,
    CommandBuffer,
    Fence,
    Semaphore,
    Swapchain,
}

/// Device calls that can be made to fail once.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Failure {
    CreateBuffer,
    AllocateMemory,
    CreatePipeline,
    AllocateDescriptorSet,
    Submit,
    Acquire,
}

#[derive(Debug, Clone)]
pub enum Command {
    UpdateBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        data: Vec<u8>,
    },
    MemoryBarrier(MemoryBarrier),
    ImageBarrier(ImageBarrier),
    CopyBufferToImage {
        buffer: vk::Buffer,
        image: vk::Image,
        regions: usize,
    },
    BeginRendering(RenderingInfo),
    EndRendering,
    SetViewport {
        width: f32,
        height: f32,
    },
    SetScissor(vk::Rect2D),
    BindPipeline(vk::Pipeline),
    BindDescriptorSets {
        layout: vk::PipelineLayout,
        first_set: u32,
        sets: Vec<vk::DescriptorSet>,
    },
    PushConstants {
        layout: vk::PipelineLayout,
        data: Vec<u8>,
    },
    BindVertexBuffers {
        buffers: Vec<vk::Buffer>,
    },
    BindIndexBuffer {
        buffer: vk::Buffer,
        index_type: vk::IndexType,
    },
    Draw {
        vertex_count: u32,
    },
    DrawIndexed {
        index_count: u32,
    },
}

/// A queue submission as seen by the device, with the commands of its command buffers at submit time.
#[derive(Debug, Clone)]
pub struct Submission {
    pub command_buffers: Vec<vk::CommandBuffer>,
    pub commands: Vec<Command>,
    pub wait: Vec<vk::Semaphore>,
    pub signal: Vec<vk::Semaphore>,
    pub fence: Option<vk::Fence>,
}

impl Submission {
    pub fn draws(&self) -> usize {
        self.commands
            .iter()
            .filter(|cmd| matches!(cmd, Command::Draw { .. } | Command::DrawIndexed { .. }))
            .count()
    }

    pub fn updates(&self) -> Vec<(vk::Buffer, vk::DeviceSize, Vec<u8>)> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::UpdateBuffer {
                    buffer,
                    offset,
                    data,
                } => Some((*buffer, *offset, data.clone())),
                _ => None,
            })
            .collect()
    }

    pub fn bound_pipelines(&self) -> Vec<vk::Pipeline> {
        self.commands
            .iter()
            .filter_map(|cmd| match cmd {
                Command::BindPipeline(pipeline) => Some(*pipeline),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Present {
    pub index: u32,
    pub wait: vk::Semaphore,
}

#[derive(Debug)]
struct Allocation {
    location: MemoryType,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct MockState {
    next_handle: u64,
    live: HashMap<ObjectKind, HashSet<u64>>,
    buffer_sizes: HashMap<u64, vk::DeviceSize>,
    image_sizes: HashMap<u64, vk::DeviceSize>,
    memory: HashMap<u64, Allocation>,
    fences: HashMap<u64, bool>,
    descriptor_pools: HashMap<u64, (u32, u32)>,
    descriptor_writes: HashMap<u64, Vec<DescriptorWrite>>,
    recording: HashMap<u64, Vec<Command>>,
    submissions: Vec<Submission>,
    pipelines: Vec<PipelineId>,
    swapchain_images: Option<u32>,
    swapchains_created: usize,
    current_images: u32,
    next_image: u32,
    acquire_results: VecDeque<AcquiredImage>,
    present_results: VecDeque<PresentResult>,
    presents: Vec<Present>,
    signaled: HashSet<u64>,
    sync_errors: Vec<String>,
    failures: HashSet<Failure>,
    wait_idle_calls: usize,
}

impl MockState {
    fn create(&mut self, kind: ObjectKind) -> u64 {
        self.next_handle += 1;
        let raw = self.next_handle;
        self.live.entry(kind).or_default().insert(raw);
        raw
    }

    fn destroy(&mut self, kind: ObjectKind, raw: u64) {
        if raw == 0 {
            return;
        }
        let removed = self.live.get_mut(&kind).map(|set| set.remove(&raw)).unwrap_or(false);
        assert!(removed, "Destroyed {kind:?} {raw:#x} that is not alive.");
    }

    fn fail(&mut self, failure: Failure) -> Result<()> {
        if self.failures.remove(&failure) {
            Err(lugdunum::Error::VkError(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY).into())
        } else {
            Ok(())
        }
    }

    fn record(&mut self, cmd: vk::CommandBuffer, command: Command) {
        self.recording.entry(cmd.as_raw()).or_default().push(command);
    }

    fn wait_semaphore(&mut self, semaphore: vk::Semaphore, what: &str) {
        if !self.signaled.remove(&semaphore.as_raw()) {
            self.sync_errors
                .push(format!("{what} waits on semaphore {:#x} that has no pending signal", semaphore.as_raw()));
        }
    }

    fn signal_semaphore(&mut self, semaphore: vk::Semaphore, what: &str) {
        if !self.signaled.insert(semaphore.as_raw()) {
            self.sync_errors
                .push(format!("{what} signals semaphore {:#x} that is already signaled", semaphore.as_raw()));
        }
    }
}

/// Fake graphics device. Clones share all state.
#[derive(Clone)]
pub struct MockDevice {
    state: Rc<RefCell<MockState>>,
    limits: DeviceLimits,
}

impl std::fmt::Debug for MockDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockDevice").finish_non_exhaustive()
    }
}

impl MockDevice {
    pub fn new() -> Self {
        Self::with_limits(DeviceLimits {
            min_uniform_buffer_offset_alignment: 256,
            framebuffer_sample_counts: vk::SampleCountFlags::TYPE_1
                | vk::SampleCountFlags::TYPE_2
                | vk::SampleCountFlags::TYPE_4
                | vk::SampleCountFlags::TYPE_8,
            depth_format: vk::Format::D32_SFLOAT,
            max_push_constants_size: 128,
            max_uniform_buffer_range: 16384,
        })
    }

    pub fn with_limits(limits: DeviceLimits) -> Self {
        Self {
            state: Rc::new(RefCell::new(MockState::default())),
            limits,
        }
    }

    /// Make the next call of this kind fail with an out of memory error.
    pub fn fail_next(&self, failure: Failure) {
        self.state.borrow_mut().failures.insert(failure);
    }

    /// Number of images every swapchain gets, instead of the requested count.
    pub fn set_swapchain_images(&self, count: u32) {
        self.state.borrow_mut().swapchain_images = Some(count);
    }

    /// Queue the result of a future acquire. Without queued results, images are handed out round robin.
    pub fn queue_acquire(&self, result: AcquiredImage) {
        self.state.borrow_mut().acquire_results.push_back(result);
    }

    /// Queue the result of a future present. Without queued results, presentation succeeds.
    pub fn queue_present(&self, result: PresentResult) {
        self.state.borrow_mut().present_results.push_back(result);
    }

    pub fn live_count(&self, kind: ObjectKind) -> usize {
        self.state.borrow().live.get(&kind).map(HashSet::len).unwrap_or(0)
    }

    /// Every object that was created and not destroyed yet.
    pub fn live_objects(&self) -> Vec<(ObjectKind, u64)> {
        let state = self.state.borrow();
        let mut objects = state
            .live
            .iter()
            .flat_map(|(kind, handles)| handles.iter().map(|raw| (*kind, *raw)))
            .collect::<Vec<_>>();
        objects.sort_by_key(|(_, raw)| *raw);
        objects
    }

    pub fn submissions(&self) -> Vec<Submission> {
        self.state.borrow().submissions.clone()
    }

    pub fn last_submission(&self) -> Option<Submission> {
        self.state.borrow().submissions.last().cloned()
    }

    pub fn submission_count(&self) -> usize {
        self.state.borrow().submissions.len()
    }

    pub fn presents(&self) -> Vec<Present> {
        self.state.borrow().presents.clone()
    }

    /// Pipeline ids in the order pipelines were created.
    pub fn created_pipelines(&self) -> Vec<PipelineId> {
        self.state.borrow().pipelines.clone()
    }

    pub fn swapchains_created(&self) -> usize {
        self.state.borrow().swapchains_created
    }

    pub fn descriptor_writes(&self, set: vk::DescriptorSet) -> Vec<DescriptorWrite> {
        self.state
            .borrow()
            .descriptor_writes
            .get(&set.as_raw())
            .cloned()
            .unwrap_or_default()
    }

    pub fn memory_contents(&self, memory: DeviceMemory) -> Option<Vec<u8>> {
        self.state.borrow().memory.get(&memory.0).map(|allocation| allocation.bytes.clone())
    }

    /// Semaphore misuse seen so far.
    pub fn sync_errors(&self) -> Vec<String> {
        self.state.borrow().sync_errors.clone()
    }

    pub fn wait_idle_calls(&self) -> usize {
        self.state.borrow().wait_idle_calls
    }
}

impl GraphicsDevice for MockDevice {
    fn limits(&self) -> DeviceLimits {
        self.limits
    }

    fn allocate_memory(&self, _name: &str, requirements: vk::MemoryRequirements, location: MemoryType) -> Result<DeviceMemory> {
        let mut state = self.state.borrow_mut();
        state.fail(Failure::AllocateMemory)?;
        let raw = state.create(ObjectKind::Memory);
        state.memory.insert(
            raw,
            Allocation {
                location,
                bytes: vec![0; requirements.size as usize],
            },
        );
        Ok(DeviceMemory(raw))
    }

    fn free_memory(&self, memory: DeviceMemory) {
        let mut state = self.state.borrow_mut();
        state.destroy(ObjectKind::Memory, memory.0);
        state.memory.remove(&memory.0);
    }

    fn write_memory(&self, memory: DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let allocation = state
            .memory
            .get_mut(&memory.0)
            .ok_or(lugdunum::Error::UnknownMemory(memory.0))?;
        if !allocation.location.is_host_visible() {
            return Err(lugdunum::Error::UnmappableMemory(memory.0).into());
        }
        let start = offset as usize;
        let end = start + data.len();
        if end > allocation.bytes.len() {
            return Err(lugdunum::Error::WriteOutOfRange {
                offset,
                size: data.len() as u64,
            }
            .into());
        }
        allocation.bytes[start..end].copy_from_slice(data);
        Ok(())
    }

    fn create_buffer(&self, info: &BufferCreateInfo) -> Result<vk::Buffer> {
        let mut state = self.state.borrow_mut();
        state.fail(Failure::CreateBuffer)?;
        let raw = state.create(ObjectKind::Buffer);
        state.buffer_sizes.insert(raw, info.size);
        Ok(vk::Buffer::from_raw(raw))
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        self.state.borrow_mut().destroy(ObjectKind::Buffer, buffer.as_raw());
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        let size = self.state.borrow().buffer_sizes.get(&buffer.as_raw()).copied().unwrap_or(0);
        vk::MemoryRequirements {
            size,
            alignment: 256,
            memory_type_bits: 1,
        }
    }

    fn bind_buffer_memory(&self, _buffer: vk::Buffer, _memory: DeviceMemory) -> Result<()> {
        Ok(())
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<vk::Image> {
        let mut state = self.state.borrow_mut();
        let raw = state.create(ObjectKind::Image);
        let size = info.extent.width as vk::DeviceSize * info.extent.height as vk::DeviceSize * 4 * info.layers as vk::DeviceSize;
        state.image_sizes.insert(raw, size);
        Ok(vk::Image::from_raw(raw))
    }

    fn destroy_image(&self, image: vk::Image) {
        self.state.borrow_mut().destroy(ObjectKind::Image, image.as_raw());
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        let size = self.state.borrow().image_sizes.get(&image.as_raw()).copied().unwrap_or(0);
        vk::MemoryRequirements {
            size,
            alignment: 256,
            memory_type_bits: 1,
        }
    }

    fn bind_image_memory(&self, _image: vk::Image, _memory: DeviceMemory) -> Result<()> {
        Ok(())
    }

    fn create_image_view(&self, _info: &ImageViewCreateInfo) -> Result<vk::ImageView> {
        Ok(vk::ImageView::from_raw(self.state.borrow_mut().create(ObjectKind::ImageView)))
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        self.state.borrow_mut().destroy(ObjectKind::ImageView, view.as_raw());
    }

    fn create_sampler(&self, _info: &SamplerCreateInfo) -> Result<vk::Sampler> {
        Ok(vk::Sampler::from_raw(self.state.borrow_mut().create(ObjectKind::Sampler)))
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        self.state.borrow_mut().destroy(ObjectKind::Sampler, sampler.as_raw());
    }

    fn create_descriptor_set_layout(&self, _bindings: &[DescriptorBinding]) -> Result<vk::DescriptorSetLayout> {
        Ok(vk::DescriptorSetLayout::from_raw(self.state.borrow_mut().create(ObjectKind::SetLayout)))
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        self.state.borrow_mut().destroy(ObjectKind::SetLayout, layout.as_raw());
    }

    fn create_descriptor_pool(&self, max_sets: u32, _pool_sizes: &[vk::DescriptorPoolSize]) -> Result<vk::DescriptorPool> {
        let mut state = self.state.borrow_mut();
        let raw = state.create(ObjectKind::DescriptorPool);
        state.descriptor_pools.insert(raw, (max_sets, 0));
        Ok(vk::DescriptorPool::from_raw(raw))
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        let mut state = self.state.borrow_mut();
        state.destroy(ObjectKind::DescriptorPool, pool.as_raw());
        state.descriptor_pools.remove(&pool.as_raw());
    }

    fn allocate_descriptor_set(&self, pool: vk::DescriptorPool, _layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        state.fail(Failure::AllocateDescriptorSet)?;
        let (max_sets, allocated) = state
            .descriptor_pools
            .get_mut(&pool.as_raw())
            .ok_or_else(|| anyhow!("Descriptor set allocated from a destroyed pool"))?;
        if *allocated >= *max_sets {
            return Err(lugdunum::Error::VkError(vk::Result::ERROR_OUT_OF_POOL_MEMORY).into());
        }
        *allocated += 1;
        state.next_handle += 1;
        Ok(vk::DescriptorSet::from_raw(state.next_handle))
    }

    fn free_descriptor_set(&self, pool: vk::DescriptorPool, _set: vk::DescriptorSet) -> Result<()> {
        let mut state = self.state.borrow_mut();
        if let Some((_, allocated)) = state.descriptor_pools.get_mut(&pool.as_raw()) {
            *allocated = allocated.saturating_sub(1);
        }
        Ok(())
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        for write in writes {
            if let DescriptorResource::UniformBuffer { range, .. } = write.resource {
                assert!(
                    range <= self.limits.max_uniform_buffer_range as vk::DeviceSize,
                    "Uniform buffer range {range} exceeds maxUniformBufferRange."
                );
            }
        }
        self.state
            .borrow_mut()
            .descriptor_writes
            .insert(set.as_raw(), writes.to_vec());
    }

    fn create_pipeline_layout(&self, _set_layouts: &[vk::DescriptorSetLayout], _push_constants: &[vk::PushConstantRange]) -> Result<vk::PipelineLayout> {
        Ok(vk::PipelineLayout::from_raw(self.state.borrow_mut().create(ObjectKind::PipelineLayout)))
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        self.state.borrow_mut().destroy(ObjectKind::PipelineLayout, layout.as_raw());
    }

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule> {
        if code.first() != Some(&SPIRV_MAGIC) {
            return Err(anyhow!("Shader module created from code without SPIR-V magic"));
        }
        Ok(vk::ShaderModule::from_raw(self.state.borrow_mut().create(ObjectKind::ShaderModule)))
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        self.state.borrow_mut().destroy(ObjectKind::ShaderModule, module.as_raw());
    }

    fn create_graphics_pipeline(&self, info: &GraphicsPipelineCreateInfo) -> Result<vk::Pipeline> {
        let mut state = self.state.borrow_mut();
        state.fail(Failure::CreatePipeline)?;
        state.pipelines.push(info.id);
        Ok(vk::Pipeline::from_raw(state.create(ObjectKind::Pipeline)))
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        self.state.borrow_mut().destroy(ObjectKind::Pipeline, pipeline.as_raw());
    }

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer> {
        Ok(vk::CommandBuffer::from_raw(self.state.borrow_mut().create(ObjectKind::CommandBuffer)))
    }

    fn free_command_buffer(&self, cmd: vk::CommandBuffer) {
        let mut state = self.state.borrow_mut();
        state.destroy(ObjectKind::CommandBuffer, cmd.as_raw());
        state.recording.remove(&cmd.as_raw());
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, _one_time: bool) -> Result<()> {
        self.state.borrow_mut().recording.insert(cmd.as_raw(), Vec::new());
        Ok(())
    }

    fn end_command_buffer(&self, _cmd: vk::CommandBuffer) -> Result<()> {
        Ok(())
    }

    fn cmd_update_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) {
        assert_eq!(data.len() % 4, 0, "Inline buffer updates must be a multiple of 4 bytes.");
        assert!(data.len() <= 65536, "Inline buffer updates must be at most 65536 bytes.");
        self.state.borrow_mut().record(
            cmd,
            Command::UpdateBuffer {
                buffer,
                offset,
                data: data.to_vec(),
            },
        );
    }

    fn cmd_memory_barrier(&self, cmd: vk::CommandBuffer, barrier: &MemoryBarrier) {
        self.state.borrow_mut().record(cmd, Command::MemoryBarrier(*barrier));
    }

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        self.state.borrow_mut().record(cmd, Command::ImageBarrier(*barrier));
    }

    fn cmd_copy_buffer_to_image(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, image: vk::Image, regions: &[vk::BufferImageCopy]) {
        self.state.borrow_mut().record(
            cmd,
            Command::CopyBufferToImage {
                buffer,
                image,
                regions: regions.len(),
            },
        );
    }

    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, info: &RenderingInfo) {
        self.state.borrow_mut().record(cmd, Command::BeginRendering(info.clone()));
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        self.state.borrow_mut().record(cmd, Command::EndRendering);
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        self.state.borrow_mut().record(
            cmd,
            Command::SetViewport {
                width: viewport.width,
                height: viewport.height,
            },
        );
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        self.state.borrow_mut().record(cmd, Command::SetScissor(scissor));
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        self.state.borrow_mut().record(cmd, Command::BindPipeline(pipeline));
    }

    fn cmd_bind_descriptor_sets(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, first_set: u32, sets: &[vk::DescriptorSet]) {
        self.state.borrow_mut().record(
            cmd,
            Command::BindDescriptorSets {
                layout,
                first_set,
                sets: sets.to_vec(),
            },
        );
    }

    fn cmd_push_constants(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, _stages: vk::ShaderStageFlags, _offset: u32, data: &[u8]) {
        self.state.borrow_mut().record(
            cmd,
            Command::PushConstants {
                layout,
                data: data.to_vec(),
            },
        );
    }

    fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, _first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        assert_eq!(buffers.len(), offsets.len(), "Every vertex buffer needs an offset.");
        self.state.borrow_mut().record(
            cmd,
            Command::BindVertexBuffers {
                buffers: buffers.to_vec(),
            },
        );
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, _offset: vk::DeviceSize, index_type: vk::IndexType) {
        self.state.borrow_mut().record(
            cmd,
            Command::BindIndexBuffer {
                buffer,
                index_type,
            },
        );
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, _instance_count: u32, _first_vertex: u32, _first_instance: u32) {
        self.state.borrow_mut().record(
            cmd,
            Command::Draw {
                vertex_count,
            },
        );
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32, _instance_count: u32, _first_index: u32, _vertex_offset: i32, _first_instance: u32) {
        self.state.borrow_mut().record(
            cmd,
            Command::DrawIndexed {
                index_count,
            },
        );
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let mut state = self.state.borrow_mut();
        let raw = state.create(ObjectKind::Fence);
        state.fences.insert(raw, signaled);
        Ok(vk::Fence::from_raw(raw))
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        let mut state = self.state.borrow_mut();
        state.destroy(ObjectKind::Fence, fence.as_raw());
        state.fences.remove(&fence.as_raw());
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()> {
        match self.state.borrow().fences.get(&fence.as_raw()) {
            Some(true) => Ok(()),
            // Work completes at submission, so an unsignaled fence would block forever.
            Some(false) => Err(anyhow!("Waiting on fence {:#x} that will never be signaled", fence.as_raw())),
            None => Err(anyhow!("Waiting on destroyed fence {:#x}", fence.as_raw())),
        }
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        let mut state = self.state.borrow_mut();
        let signaled = state
            .fences
            .get_mut(&fence.as_raw())
            .ok_or_else(|| anyhow!("Resetting destroyed fence"))?;
        *signaled = false;
        Ok(())
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        Ok(vk::Semaphore::from_raw(self.state.borrow_mut().create(ObjectKind::Semaphore)))
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        let mut state = self.state.borrow_mut();
        state.destroy(ObjectKind::Semaphore, semaphore.as_raw());
        state.signaled.remove(&semaphore.as_raw());
    }

    fn submit(&self, info: &SubmitInfo) -> Result<()> {
        let mut guard = self.state.borrow_mut();
        let state = &mut *guard;
        state.fail(Failure::Submit)?;
        for wait in info.wait {
            state.wait_semaphore(wait.semaphore, "Submission");
        }
        for signal in info.signal {
            state.signal_semaphore(*signal, "Submission");
        }
        if let Some(fence) = info.fence {
            match state.fences.get_mut(&fence.as_raw()) {
                Some(signaled) if *signaled => state
                    .sync_errors
                    .push(format!("Submission uses fence {:#x} that is still signaled", fence.as_raw())),
                Some(signaled) => *signaled = true,
                None => state.sync_errors.push("Submission uses a destroyed fence".to_owned()),
            }
        }
        let commands = info
            .command_buffers
            .iter()
            .flat_map(|cmd| state.recording.get(&cmd.as_raw()).cloned().unwrap_or_default())
            .collect();
        state.submissions.push(Submission {
            command_buffers: info.command_buffers.to_vec(),
            commands,
            wait: info.wait.iter().map(|wait| wait.semaphore).collect(),
            signal: info.signal.to_vec(),
            fence: info.fence,
        });
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        self.state.borrow_mut().wait_idle_calls += 1;
        Ok(())
    }

    fn create_swapchain(&self, info: &SwapchainCreateInfo) -> Result<SwapchainImages> {
        let mut state = self.state.borrow_mut();
        let count = state.swapchain_images.unwrap_or(info.image_count);
        let handle = vk::SwapchainKHR::from_raw(state.create(ObjectKind::Swapchain));
        // Swapchain images belong to the swapchain and are not tracked as live objects.
        let images = (0..count)
            .map(|_| {
                state.next_handle += 1;
                vk::Image::from_raw(state.next_handle)
            })
            .collect();
        state.swapchains_created += 1;
        state.current_images = count;
        state.next_image = 0;
        Ok(SwapchainImages {
            handle,
            format: vk::SurfaceFormatKHR {
                format: vk::Format::B8G8R8A8_SRGB,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            },
            extent: info.extent,
            images,
        })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        self.state.borrow_mut().destroy(ObjectKind::Swapchain, swapchain.as_raw());
    }

    fn acquire_next_image(&self, _swapchain: vk::SwapchainKHR, semaphore: vk::Semaphore) -> Result<AcquiredImage> {
        let mut state = self.state.borrow_mut();
        state.fail(Failure::Acquire)?;
        let result = match state.acquire_results.pop_front() {
            Some(result) => result,
            None => {
                let index = state.next_image;
                state.next_image = (index + 1) % state.current_images.max(1);
                AcquiredImage::Index(index)
            }
        };
        if let AcquiredImage::Index(_) = result {
            state.signal_semaphore(semaphore, "Acquire");
        }
        Ok(result)
    }

    fn present(&self, _swapchain: vk::SwapchainKHR, index: u32, wait: vk::Semaphore) -> Result<PresentResult> {
        let mut state = self.state.borrow_mut();
        state.wait_semaphore(wait, "Present");
        state.presents.push(Present {
            index,
            wait,
        });
        Ok(state.present_results.pop_front().unwrap_or(PresentResult::Presented))
    }
}

/// Shader loader returning a minimal module for every variant, remembering what was requested.
#[derive(Debug, Clone, Default)]
pub struct TestShaders {
    loads: Rc<RefCell<Vec<(String, PipelineId, ShaderStage)>>>,
    missing: Rc<RefCell<HashSet<PipelineId>>>,
}

impl TestShaders {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make loading fail for this variant.
    pub fn remove(&self, id: PipelineId) {
        self.missing.borrow_mut().insert(id);
    }

    pub fn loads(&self) -> Vec<(String, PipelineId, ShaderStage)> {
        self.loads.borrow().clone()
    }
}

impl ShaderLoader for TestShaders {
    fn load(&self, technique: &str, id: PipelineId, stage: ShaderStage) -> Result<Vec<u32>> {
        self.loads.borrow_mut().push((technique.to_owned(), id, stage));
        if self.missing.borrow().contains(&id) {
            return Err(lugdunum::Error::ShaderNotFound(format!("{technique}/{id}.{stage}.spv")).into());
        }
        Ok(vec![SPIRV_MAGIC, 0x0001_0600, 0, 1, 0])
    }
}

pub fn init_logger() {
    let _ = pretty_env_logger::try_init();
}

pub const EXTENT: vk::Extent2D = vk::Extent2D {
    width: 800,
    height: 600,
};

/// Renderer with default settings and a test shader loader.
pub fn make_renderer(device: &MockDevice) -> Result<Renderer<MockDevice>> {
    make_renderer_with(device, RenderSettings::default(), TestShaders::new())
}

pub fn make_renderer_with(device: &MockDevice, settings: RenderSettings, shaders: TestShaders) -> Result<Renderer<MockDevice>> {
    init_logger();
    Renderer::new(device.clone(), settings, Box::new(shaders))
}

/// Keys of the objects in [`make_scene()`].
#[derive(Debug, Copy, Clone)]
pub struct SceneKeys {
    pub camera: CameraKey,
    pub camera_node: NodeKey,
    pub material: MaterialKey,
    pub mesh: MeshKey,
    pub mesh_node: NodeKey,
    pub light: LightKey,
}

pub fn triangle(device: &MockDevice, name: &str, material: Option<MaterialKey>) -> Result<Mesh<MockDevice>> {
    MeshBuilder::new(device.clone(), name)
        .primitive_set(PrimitiveSetData {
            positions: vec![Vec3::ZERO, Vec3::X, Vec3::Y],
            normals: vec![Vec3::Z; 3],
            material,
            ..Default::default()
        })
        .build()
}

/// A camera looking at a single lit triangle.
pub fn make_scene(device: &MockDevice) -> Result<(Scene<MockDevice>, SceneKeys)> {
    let mut scene = Scene::new();
    let camera = scene.add_camera(Camera::perspective("main"));
    let camera_node = scene.add_node(
        None,
        Node::new("camera")
            .with_camera(camera)
            .with_transform(Mat4::from_translation(Vec3::new(0.0, 0.0, 5.0))),
    )?;
    let material = scene.add_material(MaterialBuilder::new("red").base_color(glam::Vec4::new(1.0, 0.0, 0.0, 1.0)).build());
    let mesh = scene.add_mesh(triangle(device, "triangle", Some(material))?);
    let mesh_node = scene.add_node(None, Node::new("triangle").with_mesh(mesh))?;
    let light = scene.add_light(Light::directional(Vec3::ONE, 1.0));
    scene.add_node(None, Node::new("sun").with_light(light))?;
    Ok((
        scene,
        SceneKeys {
            camera,
            camera_node,
            material,
            mesh,
            mesh_node,
            light,
        },
    ))
}

/// An initialized window with one forward view rendering `camera`.
pub fn make_window(device: &MockDevice, renderer: &mut Renderer<MockDevice>, camera: CameraKey) -> Result<RenderWindow<MockDevice>> {
    let mut window = RenderWindow::new(device.clone(), EXTENT, 3);
    let view = RenderView::new("main", Box::new(Forward::new(device.clone())), renderer.settings().max_lights).with_camera(camera);
    window.add_view(renderer, view)?;
    window.init(renderer)?;
    Ok(window)
}
