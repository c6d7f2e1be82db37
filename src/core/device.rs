//! The graphics device capability the renderer is written against.
//!
//! Everything above this trait (pools, pipeline cache, techniques, the frame loop) only ever talks to a
//! [`GraphicsDevice`]. The Vulkan implementation lives in [`backend::vulkan`](crate::backend::vulkan).

use anyhow::Result;
use ash::vk;

use crate::allocator::memory_type::MemoryType;
use crate::core::commands::{ImageBarrier, MemoryBarrier, RenderingInfo, SubmitInfo};
use crate::core::resources::{BufferCreateInfo, DescriptorBinding, ImageCreateInfo, ImageViewCreateInfo, SamplerCreateInfo};
use crate::descriptor::descriptor_set::DescriptorWrite;
use crate::pipeline::create_info::GraphicsPipelineCreateInfo;

/// Opaque id of a device memory allocation. The device may sub-allocate, so this does not map
/// one to one to a `VkDeviceMemory`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceMemory(pub u64);

/// Device properties the renderer depends on.
#[derive(Debug, Copy, Clone)]
pub struct DeviceLimits {
    pub min_uniform_buffer_offset_alignment: vk::DeviceSize,
    /// Sample counts supported for both color and depth attachments.
    pub framebuffer_sample_counts: vk::SampleCountFlags,
    /// Depth format used for depth attachments.
    pub depth_format: vk::Format,
    pub max_push_constants_size: u32,
    /// Largest range a uniform buffer descriptor may cover.
    pub max_uniform_buffer_range: u32,
}

#[derive(Debug, Copy, Clone)]
pub struct SwapchainCreateInfo {
    /// Desired extent. The device clamps this to the surface capabilities.
    pub extent: vk::Extent2D,
    pub image_count: u32,
    /// Swapchain being replaced, or null.
    pub old_swapchain: vk::SwapchainKHR,
}

/// A created swapchain and its images. Images are owned by the swapchain.
#[derive(Debug, Clone)]
pub struct SwapchainImages {
    pub handle: vk::SwapchainKHR,
    pub format: vk::SurfaceFormatKHR,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
}

/// Result of acquiring the next swapchain image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcquiredImage {
    /// The image at this index will be ready once the semaphore passed to acquire is signaled.
    Index(u32),
    /// The swapchain must be recreated. The semaphore is not signaled.
    OutOfDate,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum PresentResult {
    Presented,
    /// The image was queued, but the swapchain no longer matches the surface and must be recreated.
    OutOfDate,
}

/// Abstract graphics device: resource creation, descriptor management, pipeline creation,
/// command recording and queue submission.
///
/// Implementations are cheap to clone handles to one shared device. All methods take `&self`, any
/// mutable state (the memory allocator, the command pool) is synchronized internally. The renderer
/// only uses a single queue from a single thread.
pub trait GraphicsDevice: Clone + std::fmt::Debug {
    fn limits(&self) -> DeviceLimits;

    // Memory

    /// Allocate memory satisfying the requirements in the given memory type.
    /// # Errors
    /// Fails if the device is out of memory.
    fn allocate_memory(&self, name: &str, requirements: vk::MemoryRequirements, location: MemoryType) -> Result<DeviceMemory>;
    fn free_memory(&self, memory: DeviceMemory);
    /// Write bytes into host-visible memory.
    /// # Errors
    /// * Fails with [`Error::UnmappableMemory`](crate::Error::UnmappableMemory) if the memory is not host visible.
    /// * Fails with [`Error::WriteOutOfRange`](crate::Error::WriteOutOfRange) if the write exceeds the allocation.
    fn write_memory(&self, memory: DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> Result<()>;

    // Resources

    fn create_buffer(&self, info: &BufferCreateInfo) -> Result<vk::Buffer>;
    fn destroy_buffer(&self, buffer: vk::Buffer);
    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements;
    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: DeviceMemory) -> Result<()>;

    fn create_image(&self, info: &ImageCreateInfo) -> Result<vk::Image>;
    fn destroy_image(&self, image: vk::Image);
    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements;
    fn bind_image_memory(&self, image: vk::Image, memory: DeviceMemory) -> Result<()>;

    fn create_image_view(&self, info: &ImageViewCreateInfo) -> Result<vk::ImageView>;
    fn destroy_image_view(&self, view: vk::ImageView);

    fn create_sampler(&self, info: &SamplerCreateInfo) -> Result<vk::Sampler>;
    fn destroy_sampler(&self, sampler: vk::Sampler);

    // Descriptors

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> Result<vk::DescriptorSetLayout>;
    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout);
    /// Create a descriptor pool whose sets can be freed individually.
    fn create_descriptor_pool(&self, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> Result<vk::DescriptorPool>;
    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool);
    /// # Errors
    /// Fails if the native pool is exhausted or fragmented.
    fn allocate_descriptor_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet>;
    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> Result<()>;
    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]);

    // Pipelines

    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout], push_constants: &[vk::PushConstantRange]) -> Result<vk::PipelineLayout>;
    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout);
    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule>;
    fn destroy_shader_module(&self, module: vk::ShaderModule);
    /// Compile a graphics pipeline for dynamic rendering. This is the expensive call the pipeline cache exists for.
    fn create_graphics_pipeline(&self, info: &GraphicsPipelineCreateInfo) -> Result<vk::Pipeline>;
    fn destroy_pipeline(&self, pipeline: vk::Pipeline);

    // Command buffers

    /// Allocate a primary, individually resettable command buffer.
    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer>;
    fn free_command_buffer(&self, cmd: vk::CommandBuffer);
    /// Begin recording, implicitly resetting the command buffer.
    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, one_time: bool) -> Result<()>;
    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()>;

    /// Record an inline buffer update. `data` must be at most 65536 bytes and a multiple of 4.
    fn cmd_update_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]);
    fn cmd_memory_barrier(&self, cmd: vk::CommandBuffer, barrier: &MemoryBarrier);
    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier);
    fn cmd_copy_buffer_to_image(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, image: vk::Image, regions: &[vk::BufferImageCopy]);
    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, info: &RenderingInfo);
    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer);
    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport);
    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D);
    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline);
    fn cmd_bind_descriptor_sets(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, first_set: u32, sets: &[vk::DescriptorSet]);
    fn cmd_push_constants(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]);
    fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]);
    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType);
    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32);
    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32);

    // Synchronization and submission

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence>;
    fn destroy_fence(&self, fence: vk::Fence);
    /// Wait for the fence without timeout.
    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()>;
    fn reset_fence(&self, fence: vk::Fence) -> Result<()>;
    fn create_semaphore(&self) -> Result<vk::Semaphore>;
    fn destroy_semaphore(&self, semaphore: vk::Semaphore);
    /// Submit to the graphics queue.
    fn submit(&self, info: &SubmitInfo) -> Result<()>;
    fn wait_idle(&self) -> Result<()>;

    // Presentation

    /// # Errors
    /// Fails with [`Error::NoSurface`](crate::Error::NoSurface) on a headless device.
    fn create_swapchain(&self, info: &SwapchainCreateInfo) -> Result<SwapchainImages>;
    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR);
    /// Acquire the next image, signaling `semaphore` when it is ready. Blocks until an image is available.
    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, semaphore: vk::Semaphore) -> Result<AcquiredImage>;
    fn present(&self, swapchain: vk::SwapchainKHR, index: u32, wait: vk::Semaphore) -> Result<PresentResult>;
}
