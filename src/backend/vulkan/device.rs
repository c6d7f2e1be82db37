//! [`VulkanDevice`], the ash implementation of [`GraphicsDevice`].

use std::ffi::CStr;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use ash::vk;

use crate::allocator::memory_type::MemoryType;
use crate::backend::vulkan::instance::{DebugMessenger, Instance};
use crate::backend::vulkan::memory::MemoryAllocator;
use crate::backend::vulkan::physical_device::PhysicalDevice;
use crate::backend::vulkan::surface::{choose_extent, choose_image_count, choose_present_mode, choose_surface_format, Surface};
use crate::core::app_info::AppSettings;
use crate::core::commands::{AttachmentLoad, ImageBarrier, MemoryBarrier, RenderingAttachment, RenderingInfo, SubmitInfo};
use crate::core::device::{AcquiredImage, DeviceLimits, DeviceMemory, GraphicsDevice, PresentResult, SwapchainCreateInfo, SwapchainImages};
use crate::core::error::Error;
use crate::core::resources::{BufferCreateInfo, DescriptorBinding, ImageCreateInfo, ImageViewCreateInfo, SamplerCreateInfo};
use crate::descriptor::descriptor_set::{DescriptorResource, DescriptorWrite};
use crate::pipeline::create_info::GraphicsPipelineCreateInfo;
use crate::util::string::NameList;

const SHADER_ENTRY: &[u8] = b"main\0";

#[derive(Derivative)]
#[derivative(Debug)]
struct DeviceInner {
    #[derivative(Debug = "ignore")]
    handle: ash::Device,
    physical_device: PhysicalDevice,
    queue: vk::Queue,
    command_pool: Mutex<vk::CommandPool>,
    /// `None` once the device is being destroyed.
    memory: Mutex<Option<MemoryAllocator>>,
    #[derivative(Debug = "ignore")]
    swapchain_functions: Option<ash::extensions::khr::Swapchain>,
    preferred_format: Option<vk::SurfaceFormatKHR>,
    preferred_present_mode: Option<vk::PresentModeKHR>,
    limits: DeviceLimits,
    /// Maximum sampler anisotropy, if the feature was enabled.
    max_anisotropy: Option<f32>,
    // Destroyed after the device, in this order.
    surface: Option<Surface>,
    debug_messenger: Option<DebugMessenger>,
    instance: Instance,
}

/// A Vulkan 1.3 device using dynamic rendering and synchronization2, with a single graphics queue that
/// is also used for transfers and presentation.
///
/// Internal state is wrapped in an `Arc`, so this is cheap to clone. The instance, surface and
/// allocator are owned by the device and destroyed with the last clone.
///
/// # Example
/// ```no_run
/// # use lugdunum::*;
/// # use anyhow::Result;
/// fn headless() -> Result<VulkanDevice> {
///     let settings = AppBuilder::new()
///         .name("headless")
///         .validation(true)
///         .build();
///     VulkanDevice::new(&settings)
/// }
/// ```
#[derive(Debug, Clone)]
pub struct VulkanDevice {
    inner: Arc<DeviceInner>,
}

impl VulkanDevice {
    /// Create the instance, select a physical device and create the logical device, its command pool and
    /// memory allocator. A surface is created when `settings` contains a window.
    /// # Errors
    /// * Fails if Vulkan could not be loaded, or if validation was requested without the validation layers installed.
    /// * Fails with [`Error::NoGPU`] if no physical device satisfies the requirements.
    pub fn new(settings: &AppSettings) -> Result<Self> {
        let instance = Instance::new(settings)?;
        let debug_messenger = if settings.enable_validation {
            Some(DebugMessenger::new(&instance)?)
        } else {
            None
        };
        let surface = settings
            .surface_settings
            .as_ref()
            .map(|surface| Surface::new(&instance, surface.window))
            .transpose()?;
        let physical_device = PhysicalDevice::select(&instance, surface.as_ref(), &settings.gpu_requirements)?;

        let mut extension_names = NameList::from_strs(&settings.gpu_requirements.device_extensions)?;
        if surface.is_some() {
            extension_names.push_cstr(ash::extensions::khr::Swapchain::name());
        }
        info!("Enabled device extensions:");
        for ext in extension_names.names() {
            info!("{:?}", ext);
        }

        let priorities = [1.0];
        let queue_info = [vk::DeviceQueueCreateInfo::builder()
            .queue_family_index(physical_device.graphics_family())
            .queue_priorities(&priorities)
            .build()];
        let mut features_1_3 = vk::PhysicalDeviceVulkan13Features::builder()
            .synchronization2(true)
            .dynamic_rendering(true)
            .build();
        let info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_info)
            .enabled_extension_names(extension_names.as_ptrs())
            .enabled_features(&settings.gpu_requirements.features)
            .push_next(&mut features_1_3)
            .build();
        let handle = unsafe { instance.create_device(physical_device.handle(), &info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDevice {:p}", handle.handle());

        let queue = unsafe { handle.get_device_queue(physical_device.graphics_family(), 0) };
        let swapchain_functions = surface
            .as_ref()
            .map(|_| ash::extensions::khr::Swapchain::new(&instance, &handle));
        let properties = *physical_device.properties();
        let max_anisotropy =
            (settings.gpu_requirements.features.sampler_anisotropy == vk::TRUE).then_some(properties.limits.max_sampler_anisotropy);
        let limits = DeviceLimits {
            min_uniform_buffer_offset_alignment: properties.limits.min_uniform_buffer_offset_alignment,
            framebuffer_sample_counts: properties.limits.framebuffer_color_sample_counts
                & properties.limits.framebuffer_depth_sample_counts,
            // Filled in below, once the device exists and can clean up after itself.
            depth_format: vk::Format::UNDEFINED,
            max_push_constants_size: properties.limits.max_push_constants_size,
            max_uniform_buffer_range: properties.limits.max_uniform_buffer_range,
        };
        let (preferred_format, preferred_present_mode) = settings
            .surface_settings
            .as_ref()
            .map(|surface| (surface.surface_format, surface.present_mode))
            .unwrap_or_default();

        let mut inner = DeviceInner {
            handle,
            physical_device,
            queue,
            command_pool: Mutex::new(vk::CommandPool::null()),
            memory: Mutex::new(None),
            swapchain_functions,
            preferred_format,
            preferred_present_mode,
            limits,
            max_anisotropy,
            surface,
            debug_messenger,
            instance,
        };

        inner.limits.depth_format = inner.physical_device.depth_format(&inner.instance)?;
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(inner.physical_device.graphics_family())
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER)
            .build();
        let pool = unsafe { inner.handle.create_command_pool(&pool_info, None)? };
        *inner.command_pool.get_mut().map_err(|_| Error::PoisonError)? = pool;
        let memory = MemoryAllocator::new(&inner.instance, &inner.handle, inner.physical_device.handle())?;
        *inner.memory.get_mut().map_err(|_| Error::PoisonError)? = Some(memory);

        info!(
            "Created Vulkan device (graphics queue family {}, depth format {:?}, {}).",
            inner.physical_device.graphics_family(),
            inner.limits.depth_format,
            if inner.surface.is_some() { "windowed" } else { "headless" }
        );
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    /// Get unsafe access to the underlying `VkDevice`.
    /// # Safety
    /// Any vulkan calls that mutate the device state may put the renderer in an undefined state.
    pub unsafe fn handle(&self) -> ash::Device {
        self.inner.handle.clone()
    }

    /// Properties of the selected physical device.
    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        self.inner.physical_device.properties()
    }

    /// Whether the device was created without a window surface. Headless devices cannot create swapchains.
    pub fn is_headless(&self) -> bool {
        self.inner.surface.is_none()
    }

    fn with_memory<R>(&self, f: impl FnOnce(&mut MemoryAllocator) -> Result<R>) -> Result<R> {
        let mut memory = self.inner.memory.lock().map_err(|_| Error::PoisonError)?;
        let memory = memory
            .as_mut()
            .ok_or(Error::Uncategorized("Memory allocator was destroyed"))?;
        f(memory)
    }

    fn swapchain_functions(&self) -> Result<&ash::extensions::khr::Swapchain> {
        Ok(self
            .inner
            .swapchain_functions
            .as_ref()
            .ok_or(Error::NoSurface)?)
    }
}

impl Drop for DeviceInner {
    fn drop(&mut self) {
        unsafe {
            if let Err(e) = self.handle.device_wait_idle() {
                error!("Failed to wait for device idle: {e}");
            }
            if let Ok(memory) = self.memory.get_mut() {
                if let Some(mut memory) = memory.take() {
                    memory.free_all();
                }
            }
            if let Ok(pool) = self.command_pool.get_mut() {
                if *pool != vk::CommandPool::null() {
                    self.handle.destroy_command_pool(*pool, None);
                }
            }
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkDevice {:p}", self.handle.handle());
            self.handle.destroy_device(None);
        }
    }
}

fn rendering_attachment(attachment: &RenderingAttachment) -> vk::RenderingAttachmentInfo {
    let (load_op, clear_value) = match attachment.load {
        AttachmentLoad::Clear(color) => (
            vk::AttachmentLoadOp::CLEAR,
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: color,
                },
            },
        ),
        AttachmentLoad::ClearDepth(depth) => (
            vk::AttachmentLoadOp::CLEAR,
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue {
                    depth,
                    stencil: 0,
                },
            },
        ),
        AttachmentLoad::Load => (vk::AttachmentLoadOp::LOAD, vk::ClearValue::default()),
        AttachmentLoad::DontCare => (vk::AttachmentLoadOp::DONT_CARE, vk::ClearValue::default()),
    };
    let store_op = if attachment.store {
        vk::AttachmentStoreOp::STORE
    } else {
        vk::AttachmentStoreOp::DONT_CARE
    };
    let mut info = vk::RenderingAttachmentInfo::builder()
        .image_view(attachment.view)
        .image_layout(attachment.layout)
        .load_op(load_op)
        .store_op(store_op)
        .clear_value(clear_value);
    if let Some((view, layout)) = attachment.resolve {
        info = info
            .resolve_mode(vk::ResolveModeFlags::AVERAGE)
            .resolve_image_view(view)
            .resolve_image_layout(layout);
    }
    info.build()
}

impl GraphicsDevice for VulkanDevice {
    fn limits(&self) -> DeviceLimits {
        self.inner.limits
    }

    fn allocate_memory(&self, name: &str, requirements: vk::MemoryRequirements, location: MemoryType) -> Result<DeviceMemory> {
        self.with_memory(|memory| memory.allocate(name, requirements, location))
    }

    fn free_memory(&self, memory: DeviceMemory) {
        if let Err(e) = self.with_memory(|allocator| allocator.free(memory)) {
            error!("Failed to free device memory {}: {e}", memory.0);
        }
    }

    fn write_memory(&self, memory: DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        self.with_memory(|allocator| allocator.write(memory, offset, data))
    }

    fn create_buffer(&self, info: &BufferCreateInfo) -> Result<vk::Buffer> {
        let info = vk::BufferCreateInfo::builder()
            .size(info.size)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .build();
        let buffer = unsafe { self.inner.handle.create_buffer(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkBuffer {buffer:p} (size = {} bytes)", info.size);
        Ok(buffer)
    }

    fn destroy_buffer(&self, buffer: vk::Buffer) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkBuffer {buffer:p}");
        unsafe { self.inner.handle.destroy_buffer(buffer, None) }
    }

    fn buffer_memory_requirements(&self, buffer: vk::Buffer) -> vk::MemoryRequirements {
        unsafe { self.inner.handle.get_buffer_memory_requirements(buffer) }
    }

    fn bind_buffer_memory(&self, buffer: vk::Buffer, memory: DeviceMemory) -> Result<()> {
        let (block, offset) = self.with_memory(|allocator| allocator.binding(memory))?;
        unsafe { self.inner.handle.bind_buffer_memory(buffer, block, offset)? };
        Ok(())
    }

    fn create_image(&self, info: &ImageCreateInfo) -> Result<vk::Image> {
        let flags = if info.cube {
            vk::ImageCreateFlags::CUBE_COMPATIBLE
        } else {
            vk::ImageCreateFlags::empty()
        };
        let info = vk::ImageCreateInfo::builder()
            .flags(flags)
            .image_type(vk::ImageType::TYPE_2D)
            .format(info.format)
            .extent(vk::Extent3D {
                width: info.extent.width,
                height: info.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(info.layers)
            .samples(info.samples)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(info.usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .build();
        let image = unsafe { self.inner.handle.create_image(&info, None)? };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkImage {image:p}");
        Ok(image)
    }

    fn destroy_image(&self, image: vk::Image) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkImage {image:p}");
        unsafe { self.inner.handle.destroy_image(image, None) }
    }

    fn image_memory_requirements(&self, image: vk::Image) -> vk::MemoryRequirements {
        unsafe { self.inner.handle.get_image_memory_requirements(image) }
    }

    fn bind_image_memory(&self, image: vk::Image, memory: DeviceMemory) -> Result<()> {
        let (block, offset) = self.with_memory(|allocator| allocator.binding(memory))?;
        unsafe { self.inner.handle.bind_image_memory(image, block, offset)? };
        Ok(())
    }

    fn create_image_view(&self, info: &ImageViewCreateInfo) -> Result<vk::ImageView> {
        let info = vk::ImageViewCreateInfo::builder()
            .image(info.image)
            .view_type(info.view_type)
            .format(info.format)
            .components(vk::ComponentMapping::default())
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: info.aspect,
                base_mip_level: 0,
                level_count: 1,
                base_array_layer: 0,
                layer_count: info.layers,
            })
            .build();
        Ok(unsafe { self.inner.handle.create_image_view(&info, None)? })
    }

    fn destroy_image_view(&self, view: vk::ImageView) {
        unsafe { self.inner.handle.destroy_image_view(view, None) }
    }

    fn create_sampler(&self, info: &SamplerCreateInfo) -> Result<vk::Sampler> {
        let anisotropy = match (info.anisotropy, self.inner.max_anisotropy) {
            (Some(requested), Some(max)) => Some(requested.min(max)),
            _ => None,
        };
        let info = vk::SamplerCreateInfo::builder()
            .mag_filter(info.mag_filter)
            .min_filter(info.min_filter)
            .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
            .address_mode_u(info.address_mode)
            .address_mode_v(info.address_mode)
            .address_mode_w(info.address_mode)
            .anisotropy_enable(anisotropy.is_some())
            .max_anisotropy(anisotropy.unwrap_or(1.0))
            .min_lod(0.0)
            .max_lod(vk::LOD_CLAMP_NONE)
            .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
            .build();
        Ok(unsafe { self.inner.handle.create_sampler(&info, None)? })
    }

    fn destroy_sampler(&self, sampler: vk::Sampler) {
        unsafe { self.inner.handle.destroy_sampler(sampler, None) }
    }

    fn create_descriptor_set_layout(&self, bindings: &[DescriptorBinding]) -> Result<vk::DescriptorSetLayout> {
        let bindings = bindings
            .iter()
            .map(|binding| {
                vk::DescriptorSetLayoutBinding::builder()
                    .binding(binding.binding)
                    .descriptor_type(binding.ty)
                    .descriptor_count(binding.count)
                    .stage_flags(binding.stages)
                    .build()
            })
            .collect::<Vec<_>>();
        let info = vk::DescriptorSetLayoutCreateInfo::builder()
            .bindings(&bindings)
            .build();
        Ok(unsafe { self.inner.handle.create_descriptor_set_layout(&info, None)? })
    }

    fn destroy_descriptor_set_layout(&self, layout: vk::DescriptorSetLayout) {
        unsafe { self.inner.handle.destroy_descriptor_set_layout(layout, None) }
    }

    fn create_descriptor_pool(&self, max_sets: u32, pool_sizes: &[vk::DescriptorPoolSize]) -> Result<vk::DescriptorPool> {
        let info = vk::DescriptorPoolCreateInfo::builder()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .max_sets(max_sets)
            .pool_sizes(pool_sizes)
            .build();
        Ok(unsafe { self.inner.handle.create_descriptor_pool(&info, None)? })
    }

    fn destroy_descriptor_pool(&self, pool: vk::DescriptorPool) {
        unsafe { self.inner.handle.destroy_descriptor_pool(pool, None) }
    }

    fn allocate_descriptor_set(&self, pool: vk::DescriptorPool, layout: vk::DescriptorSetLayout) -> Result<vk::DescriptorSet> {
        let layouts = [layout];
        let info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts)
            .build();
        let sets = unsafe { self.inner.handle.allocate_descriptor_sets(&info)? };
        Ok(sets
            .into_iter()
            .next()
            .ok_or(Error::Uncategorized("Descriptor set allocation returned no sets"))?)
    }

    fn free_descriptor_set(&self, pool: vk::DescriptorPool, set: vk::DescriptorSet) -> Result<()> {
        unsafe { self.inner.handle.free_descriptor_sets(pool, &[set])? };
        Ok(())
    }

    fn update_descriptor_set(&self, set: vk::DescriptorSet, writes: &[DescriptorWrite]) {
        let buffer_infos = writes
            .iter()
            .filter_map(|write| match write.resource {
                DescriptorResource::UniformBuffer {
                    buffer,
                    offset,
                    range,
                } => Some(vk::DescriptorBufferInfo {
                    buffer,
                    offset,
                    range,
                }),
                _ => None,
            })
            .collect::<Vec<_>>();
        let image_infos = writes
            .iter()
            .filter_map(|write| match write.resource {
                DescriptorResource::CombinedImageSampler {
                    view,
                    sampler,
                    layout,
                } => Some(vk::DescriptorImageInfo {
                    sampler,
                    image_view: view,
                    image_layout: layout,
                }),
                _ => None,
            })
            .collect::<Vec<_>>();

        let mut next_buffer = 0;
        let mut next_image = 0;
        let vk_writes = writes
            .iter()
            .map(|write| {
                let info = vk::WriteDescriptorSet::builder()
                    .dst_set(set)
                    .dst_binding(write.binding)
                    .dst_array_element(0)
                    .descriptor_type(write.resource.descriptor_type());
                match write.resource {
                    DescriptorResource::UniformBuffer {
                        ..
                    } => {
                        next_buffer += 1;
                        info.buffer_info(&buffer_infos[next_buffer - 1..next_buffer]).build()
                    }
                    DescriptorResource::CombinedImageSampler {
                        ..
                    } => {
                        next_image += 1;
                        info.image_info(&image_infos[next_image - 1..next_image]).build()
                    }
                }
            })
            .collect::<Vec<_>>();
        unsafe { self.inner.handle.update_descriptor_sets(&vk_writes, &[]) }
    }

    fn create_pipeline_layout(&self, set_layouts: &[vk::DescriptorSetLayout], push_constants: &[vk::PushConstantRange]) -> Result<vk::PipelineLayout> {
        let info = vk::PipelineLayoutCreateInfo::builder()
            .set_layouts(set_layouts)
            .push_constant_ranges(push_constants)
            .build();
        Ok(unsafe { self.inner.handle.create_pipeline_layout(&info, None)? })
    }

    fn destroy_pipeline_layout(&self, layout: vk::PipelineLayout) {
        unsafe { self.inner.handle.destroy_pipeline_layout(layout, None) }
    }

    fn create_shader_module(&self, code: &[u32]) -> Result<vk::ShaderModule> {
        let info = vk::ShaderModuleCreateInfo::builder().code(code).build();
        Ok(unsafe { self.inner.handle.create_shader_module(&info, None)? })
    }

    fn destroy_shader_module(&self, module: vk::ShaderModule) {
        unsafe { self.inner.handle.destroy_shader_module(module, None) }
    }

    fn create_graphics_pipeline(&self, info: &GraphicsPipelineCreateInfo) -> Result<vk::Pipeline> {
        let entry = CStr::from_bytes_with_nul(SHADER_ENTRY)?;
        let stages = [
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::VERTEX)
                .module(info.vertex_shader)
                .name(entry)
                .build(),
            vk::PipelineShaderStageCreateInfo::builder()
                .stage(vk::ShaderStageFlags::FRAGMENT)
                .module(info.fragment_shader)
                .name(entry)
                .build(),
        ];
        let vertex_input = vk::PipelineVertexInputStateCreateInfo::builder()
            .vertex_binding_descriptions(&info.vertex_input.bindings)
            .vertex_attribute_descriptions(&info.vertex_input.attributes)
            .build();
        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(info.topology)
            .primitive_restart_enable(info.primitive_restart())
            .build();
        let viewport = vk::PipelineViewportStateCreateInfo::builder()
            .viewport_count(1)
            .scissor_count(1)
            .build();
        let rasterization = vk::PipelineRasterizationStateCreateInfo::builder()
            .polygon_mode(vk::PolygonMode::FILL)
            .cull_mode(info.cull_mode)
            .front_face(info.front_face)
            .line_width(1.0)
            .build();
        let multisample = vk::PipelineMultisampleStateCreateInfo::builder()
            .rasterization_samples(info.samples)
            .build();
        let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::builder()
            .depth_test_enable(info.depth.test)
            .depth_write_enable(info.depth.write)
            .depth_compare_op(info.depth.compare)
            .build();
        let blend_attachments = [vk::PipelineColorBlendAttachmentState::builder()
            .blend_enable(info.blend)
            .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
            .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
            .color_blend_op(vk::BlendOp::ADD)
            .src_alpha_blend_factor(vk::BlendFactor::ONE)
            .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
            .alpha_blend_op(vk::BlendOp::ADD)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .build()];
        let color_blend = vk::PipelineColorBlendStateCreateInfo::builder()
            .attachments(&blend_attachments)
            .build();
        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic = vk::PipelineDynamicStateCreateInfo::builder()
            .dynamic_states(&dynamic_states)
            .build();
        let color_formats = [info.color_format];
        let mut rendering = vk::PipelineRenderingCreateInfo::builder()
            .color_attachment_formats(&color_formats)
            .depth_attachment_format(info.depth_format)
            .build();

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(&stages)
            .vertex_input_state(&vertex_input)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport)
            .rasterization_state(&rasterization)
            .multisample_state(&multisample)
            .depth_stencil_state(&depth_stencil)
            .color_blend_state(&color_blend)
            .dynamic_state(&dynamic)
            .layout(info.layout)
            .push_next(&mut rendering)
            .build();
        let pipelines = unsafe {
            self.inner
                .handle
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
                .map_err(Error::from)?
        };
        Ok(pipelines
            .into_iter()
            .next()
            .ok_or(Error::Uncategorized("Pipeline creation returned no pipelines"))?)
    }

    fn destroy_pipeline(&self, pipeline: vk::Pipeline) {
        unsafe { self.inner.handle.destroy_pipeline(pipeline, None) }
    }

    fn allocate_command_buffer(&self) -> Result<vk::CommandBuffer> {
        let pool = self.inner.command_pool.lock().map_err(|_| Error::PoisonError)?;
        let info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(*pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1)
            .build();
        let buffers = unsafe { self.inner.handle.allocate_command_buffers(&info)? };
        Ok(buffers
            .into_iter()
            .next()
            .ok_or(Error::Uncategorized("Command buffer allocation returned no buffers"))?)
    }

    fn free_command_buffer(&self, cmd: vk::CommandBuffer) {
        match self.inner.command_pool.lock() {
            Ok(pool) => unsafe { self.inner.handle.free_command_buffers(*pool, &[cmd]) },
            Err(_) => error!("Command pool lock poisoned, leaking command buffer {cmd:p}"),
        }
    }

    fn begin_command_buffer(&self, cmd: vk::CommandBuffer, one_time: bool) -> Result<()> {
        let flags = if one_time {
            vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT
        } else {
            vk::CommandBufferUsageFlags::empty()
        };
        let info = vk::CommandBufferBeginInfo::builder().flags(flags).build();
        unsafe { self.inner.handle.begin_command_buffer(cmd, &info)? };
        Ok(())
    }

    fn end_command_buffer(&self, cmd: vk::CommandBuffer) -> Result<()> {
        unsafe { self.inner.handle.end_command_buffer(cmd)? };
        Ok(())
    }

    fn cmd_update_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, data: &[u8]) {
        unsafe { self.inner.handle.cmd_update_buffer(cmd, buffer, offset, data) }
    }

    fn cmd_memory_barrier(&self, cmd: vk::CommandBuffer, barrier: &MemoryBarrier) {
        let barriers = [vk::MemoryBarrier2::builder()
            .src_stage_mask(barrier.src_stage)
            .src_access_mask(barrier.src_access)
            .dst_stage_mask(barrier.dst_stage)
            .dst_access_mask(barrier.dst_access)
            .build()];
        let dependency = vk::DependencyInfo::builder()
            .memory_barriers(&barriers)
            .build();
        unsafe { self.inner.handle.cmd_pipeline_barrier2(cmd, &dependency) }
    }

    fn cmd_image_barrier(&self, cmd: vk::CommandBuffer, barrier: &ImageBarrier) {
        let barriers = [vk::ImageMemoryBarrier2::builder()
            .src_stage_mask(barrier.src_stage)
            .src_access_mask(barrier.src_access)
            .dst_stage_mask(barrier.dst_stage)
            .dst_access_mask(barrier.dst_access)
            .old_layout(barrier.old_layout)
            .new_layout(barrier.new_layout)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .image(barrier.image)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: barrier.aspect,
                base_mip_level: 0,
                level_count: vk::REMAINING_MIP_LEVELS,
                base_array_layer: 0,
                layer_count: barrier.layers,
            })
            .build()];
        let dependency = vk::DependencyInfo::builder()
            .image_memory_barriers(&barriers)
            .build();
        unsafe { self.inner.handle.cmd_pipeline_barrier2(cmd, &dependency) }
    }

    fn cmd_copy_buffer_to_image(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, image: vk::Image, regions: &[vk::BufferImageCopy]) {
        unsafe {
            self.inner
                .handle
                .cmd_copy_buffer_to_image(cmd, buffer, image, vk::ImageLayout::TRANSFER_DST_OPTIMAL, regions)
        }
    }

    fn cmd_begin_rendering(&self, cmd: vk::CommandBuffer, info: &RenderingInfo) {
        let color = [rendering_attachment(&info.color)];
        let depth = info.depth.as_ref().map(rendering_attachment);
        let mut rendering = vk::RenderingInfo::builder()
            .render_area(info.area)
            .layer_count(1)
            .color_attachments(&color);
        if let Some(depth) = &depth {
            rendering = rendering.depth_attachment(depth);
        }
        unsafe { self.inner.handle.cmd_begin_rendering(cmd, &rendering.build()) }
    }

    fn cmd_end_rendering(&self, cmd: vk::CommandBuffer) {
        unsafe { self.inner.handle.cmd_end_rendering(cmd) }
    }

    fn cmd_set_viewport(&self, cmd: vk::CommandBuffer, viewport: vk::Viewport) {
        unsafe { self.inner.handle.cmd_set_viewport(cmd, 0, &[viewport]) }
    }

    fn cmd_set_scissor(&self, cmd: vk::CommandBuffer, scissor: vk::Rect2D) {
        unsafe { self.inner.handle.cmd_set_scissor(cmd, 0, &[scissor]) }
    }

    fn cmd_bind_pipeline(&self, cmd: vk::CommandBuffer, pipeline: vk::Pipeline) {
        unsafe {
            self.inner
                .handle
                .cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, pipeline)
        }
    }

    fn cmd_bind_descriptor_sets(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, first_set: u32, sets: &[vk::DescriptorSet]) {
        unsafe {
            self.inner
                .handle
                .cmd_bind_descriptor_sets(cmd, vk::PipelineBindPoint::GRAPHICS, layout, first_set, sets, &[])
        }
    }

    fn cmd_push_constants(&self, cmd: vk::CommandBuffer, layout: vk::PipelineLayout, stages: vk::ShaderStageFlags, offset: u32, data: &[u8]) {
        unsafe { self.inner.handle.cmd_push_constants(cmd, layout, stages, offset, data) }
    }

    fn cmd_bind_vertex_buffers(&self, cmd: vk::CommandBuffer, first_binding: u32, buffers: &[vk::Buffer], offsets: &[vk::DeviceSize]) {
        unsafe {
            self.inner
                .handle
                .cmd_bind_vertex_buffers(cmd, first_binding, buffers, offsets)
        }
    }

    fn cmd_bind_index_buffer(&self, cmd: vk::CommandBuffer, buffer: vk::Buffer, offset: vk::DeviceSize, index_type: vk::IndexType) {
        unsafe { self.inner.handle.cmd_bind_index_buffer(cmd, buffer, offset, index_type) }
    }

    fn cmd_draw(&self, cmd: vk::CommandBuffer, vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32) {
        unsafe {
            self.inner
                .handle
                .cmd_draw(cmd, vertex_count, instance_count, first_vertex, first_instance)
        }
    }

    fn cmd_draw_indexed(&self, cmd: vk::CommandBuffer, index_count: u32, instance_count: u32, first_index: u32, vertex_offset: i32, first_instance: u32) {
        unsafe {
            self.inner
                .handle
                .cmd_draw_indexed(cmd, index_count, instance_count, first_index, vertex_offset, first_instance)
        }
    }

    fn create_fence(&self, signaled: bool) -> Result<vk::Fence> {
        let flags = if signaled {
            vk::FenceCreateFlags::SIGNALED
        } else {
            vk::FenceCreateFlags::empty()
        };
        let info = vk::FenceCreateInfo::builder().flags(flags).build();
        Ok(unsafe { self.inner.handle.create_fence(&info, None)? })
    }

    fn destroy_fence(&self, fence: vk::Fence) {
        unsafe { self.inner.handle.destroy_fence(fence, None) }
    }

    fn wait_for_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.inner.handle.wait_for_fences(&[fence], true, u64::MAX)? };
        Ok(())
    }

    fn reset_fence(&self, fence: vk::Fence) -> Result<()> {
        unsafe { self.inner.handle.reset_fences(&[fence])? };
        Ok(())
    }

    fn create_semaphore(&self) -> Result<vk::Semaphore> {
        let info = vk::SemaphoreCreateInfo::default();
        Ok(unsafe { self.inner.handle.create_semaphore(&info, None)? })
    }

    fn destroy_semaphore(&self, semaphore: vk::Semaphore) {
        unsafe { self.inner.handle.destroy_semaphore(semaphore, None) }
    }

    fn submit(&self, info: &SubmitInfo) -> Result<()> {
        let command_buffers = info
            .command_buffers
            .iter()
            .map(|&cmd| vk::CommandBufferSubmitInfo::builder().command_buffer(cmd).build())
            .collect::<Vec<_>>();
        let waits = info
            .wait
            .iter()
            .map(|wait| {
                vk::SemaphoreSubmitInfo::builder()
                    .semaphore(wait.semaphore)
                    .stage_mask(wait.stage)
                    .build()
            })
            .collect::<Vec<_>>();
        let signals = info
            .signal
            .iter()
            .map(|&semaphore| {
                vk::SemaphoreSubmitInfo::builder()
                    .semaphore(semaphore)
                    .stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
                    .build()
            })
            .collect::<Vec<_>>();
        let submit = vk::SubmitInfo2::builder()
            .command_buffer_infos(&command_buffers)
            .wait_semaphore_infos(&waits)
            .signal_semaphore_infos(&signals)
            .build();
        unsafe {
            self.inner
                .handle
                .queue_submit2(self.inner.queue, &[submit], info.fence.unwrap_or(vk::Fence::null()))?
        };
        Ok(())
    }

    fn wait_idle(&self) -> Result<()> {
        unsafe { self.inner.handle.device_wait_idle()? };
        Ok(())
    }

    fn create_swapchain(&self, info: &SwapchainCreateInfo) -> Result<SwapchainImages> {
        let surface = self.inner.surface.as_ref().ok_or(Error::NoSurface)?;
        let functions = self.swapchain_functions()?;
        let details = surface.query_details(self.inner.physical_device.handle())?;
        let format = choose_surface_format(self.inner.preferred_format, &details)?;
        let present_mode = choose_present_mode(self.inner.preferred_present_mode, &details);
        let extent = choose_extent(info.extent, &details.capabilities);
        let image_count = choose_image_count(info.image_count, &details.capabilities);

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(details.capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(info.old_swapchain)
            .build();
        let handle = unsafe { functions.create_swapchain(&create_info, None)? };
        let images = match unsafe { functions.get_swapchain_images(handle) } {
            Ok(images) => images,
            Err(e) => {
                unsafe { functions.destroy_swapchain(handle, None) };
                return Err(e.into());
            }
        };
        debug!(
            "Created VkSwapchainKHR {:p}: {}x{}, {} images, {:?}, {:?}",
            handle,
            extent.width,
            extent.height,
            images.len(),
            format.format,
            present_mode
        );
        Ok(SwapchainImages {
            handle,
            format,
            extent,
            images,
        })
    }

    fn destroy_swapchain(&self, swapchain: vk::SwapchainKHR) {
        if let Some(functions) = &self.inner.swapchain_functions {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkSwapchainKHR {swapchain:p}");
            unsafe { functions.destroy_swapchain(swapchain, None) }
        }
    }

    fn acquire_next_image(&self, swapchain: vk::SwapchainKHR, semaphore: vk::Semaphore) -> Result<AcquiredImage> {
        let functions = self.swapchain_functions()?;
        // A suboptimal swapchain can still be rendered to, the present reports it.
        match unsafe { functions.acquire_next_image(swapchain, u64::MAX, semaphore, vk::Fence::null()) } {
            Ok((index, _suboptimal)) => Ok(AcquiredImage::Index(index)),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(AcquiredImage::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn present(&self, swapchain: vk::SwapchainKHR, index: u32, wait: vk::Semaphore) -> Result<PresentResult> {
        let functions = self.swapchain_functions()?;
        let waits = [wait];
        let swapchains = [swapchain];
        let indices = [index];
        let info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&waits)
            .swapchains(&swapchains)
            .image_indices(&indices)
            .build();
        match unsafe { functions.queue_present(self.inner.queue, &info) } {
            Ok(false) => Ok(PresentResult::Presented),
            Ok(true) | Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentResult::OutOfDate),
            Err(e) => Err(e.into()),
        }
    }
}
