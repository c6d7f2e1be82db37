//! Sampled textures and cube maps, uploaded through a staging buffer.

use anyhow::Result;
use ash::vk;

use crate::allocator::memory_type::MemoryType;
use crate::core::commands::{ImageBarrier, SubmitInfo};
use crate::core::device::{DeviceMemory, GraphicsDevice};
use crate::core::error::Error;
use crate::core::resources::{ImageCreateInfo, ImageViewCreateInfo, SamplerCreateInfo};
use crate::scene::buffer::GpuBuffer;
use crate::sync::fence::Fence;

/// An immutable sampled image with its view and sampler.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Texture<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    name: String,
    image: vk::Image,
    memory: DeviceMemory,
    view: vk::ImageView,
    sampler: vk::Sampler,
    extent: vk::Extent2D,
    format: vk::Format,
    cube: bool,
}

impl<D: GraphicsDevice> Texture<D> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn sampler(&self) -> vk::Sampler {
        self.sampler
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn is_cube(&self) -> bool {
        self.cube
    }
}

impl<D: GraphicsDevice> Drop for Texture<D> {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying texture {} (VkImage {:p})", self.name, self.image);
        if self.sampler != vk::Sampler::null() {
            self.device.destroy_sampler(self.sampler);
        }
        if self.view != vk::ImageView::null() {
            self.device.destroy_image_view(self.view);
        }
        self.device.destroy_image(self.image);
        self.device.free_memory(self.memory);
    }
}

/// Size of one texel in bytes, for the formats textures can be uploaded in.
pub fn texel_size(format: vk::Format) -> Option<usize> {
    match format {
        vk::Format::R8G8B8A8_UNORM | vk::Format::R8G8B8A8_SRGB | vk::Format::B8G8R8A8_UNORM | vk::Format::B8G8R8A8_SRGB => Some(4),
        vk::Format::R16G16B16A16_SFLOAT => Some(8),
        vk::Format::R32G32B32A32_SFLOAT => Some(16),
        _ => None,
    }
}

/// Builds a [`Texture`]. Texel data is copied to a staging buffer and uploaded with a one-time submission,
/// [`TextureBuilder::build()`] blocks until the upload completed.
///
/// # Example
/// ```
/// # use lugdunum::*;
/// # use anyhow::Result;
/// # fn example<D: GraphicsDevice>(device: D) -> Result<()> {
/// let texels = [255u8; 4 * 2 * 2];
/// let texture = TextureBuilder::new(device, "white")
///     .extent(2, 2)
///     .data(&texels)
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct TextureBuilder<'a, D: GraphicsDevice> {
    device: D,
    name: String,
    extent: vk::Extent2D,
    format: vk::Format,
    layers: Vec<&'a [u8]>,
    cube: bool,
    sampler: SamplerCreateInfo,
}

impl<'a, D: GraphicsDevice> TextureBuilder<'a, D> {
    pub fn new(device: D, name: impl Into<String>) -> Self {
        Self {
            device,
            name: name.into(),
            extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            format: vk::Format::R8G8B8A8_SRGB,
            layers: Vec::new(),
            cube: false,
            sampler: SamplerCreateInfo::default(),
        }
    }

    pub fn extent(mut self, width: u32, height: u32) -> Self {
        self.extent = vk::Extent2D {
            width,
            height,
        };
        self
    }

    /// Texel format. Defaults to `R8G8B8A8_SRGB`.
    pub fn format(mut self, format: vk::Format) -> Self {
        self.format = format;
        self
    }

    /// Texel data of a 2D texture, tightly packed rows.
    pub fn data(mut self, texels: &'a [u8]) -> Self {
        self.layers = vec![texels];
        self.cube = false;
        self
    }

    /// Texel data of a cube map, in +X, -X, +Y, -Y, +Z, -Z order.
    pub fn cube_faces(mut self, faces: [&'a [u8]; 6]) -> Self {
        self.layers = faces.to_vec();
        self.cube = true;
        self
    }

    pub fn sampler(mut self, sampler: SamplerCreateInfo) -> Self {
        self.sampler = sampler;
        self
    }

    /// Create the texture and upload its texels.
    /// # Errors
    /// * Fails with [`Error::TextureSizeMismatch`] if a layer does not hold exactly `width * height` texels.
    /// * Fails if the format cannot be uploaded, or any device call fails.
    pub fn build(self) -> Result<Texture<D>> {
        let texel = texel_size(self.format).ok_or(Error::Uncategorized("Texture format cannot be uploaded"))?;
        let layer_size = self.extent.width as usize * self.extent.height as usize * texel;
        if self.layers.is_empty() {
            return Err(Error::TextureSizeMismatch {
                expected: layer_size,
                actual: 0,
            }
            .into());
        }
        if let Some(layer) = self.layers.iter().find(|layer| layer.len() != layer_size) {
            return Err(Error::TextureSizeMismatch {
                expected: layer_size,
                actual: layer.len(),
            }
            .into());
        }
        let layer_count = self.layers.len() as u32;

        let device = self.device.clone();
        let image = device.create_image(&ImageCreateInfo {
            extent: self.extent,
            format: self.format,
            usage: vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            samples: vk::SampleCountFlags::TYPE_1,
            layers: layer_count,
            cube: self.cube,
        })?;
        let memory = match device.allocate_memory(&self.name, device.image_memory_requirements(image), MemoryType::GpuOnly) {
            Ok(memory) => memory,
            Err(e) => {
                device.destroy_image(image);
                return Err(e);
            }
        };
        let mut texture = Texture {
            device: device.clone(),
            name: self.name.clone(),
            image,
            memory,
            view: vk::ImageView::null(),
            sampler: vk::Sampler::null(),
            extent: self.extent,
            format: self.format,
            cube: self.cube,
        };
        device.bind_image_memory(image, memory)?;
        texture.view = device.create_image_view(&ImageViewCreateInfo {
            image,
            format: self.format,
            view_type: if self.cube {
                vk::ImageViewType::CUBE
            } else {
                vk::ImageViewType::TYPE_2D
            },
            aspect: vk::ImageAspectFlags::COLOR,
            layers: layer_count,
        })?;
        texture.sampler = device.create_sampler(&self.sampler)?;

        self.upload(&texture, layer_size)?;
        info!(
            "Uploaded texture {} ({}x{}, {} layers)",
            self.name, self.extent.width, self.extent.height, layer_count
        );
        Ok(texture)
    }

    fn upload(&self, texture: &Texture<D>, layer_size: usize) -> Result<()> {
        let data = self.layers.concat();
        let staging = GpuBuffer::with_data(
            self.device.clone(),
            &format!("{} staging", self.name),
            vk::BufferUsageFlags::TRANSFER_SRC,
            &data,
        )?;
        let layer_count = self.layers.len() as u32;
        let regions = (0..layer_count)
            .map(|layer| vk::BufferImageCopy {
                buffer_offset: layer as vk::DeviceSize * layer_size as vk::DeviceSize,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    mip_level: 0,
                    base_array_layer: layer,
                    layer_count: 1,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width: self.extent.width,
                    height: self.extent.height,
                    depth: 1,
                },
            })
            .collect::<Vec<_>>();

        let cmd = self.device.allocate_command_buffer()?;
        let result = self.record_and_submit(cmd, texture.image, staging.handle(), layer_count, &regions);
        self.device.free_command_buffer(cmd);
        result
    }

    fn record_and_submit(
        &self,
        cmd: vk::CommandBuffer,
        image: vk::Image,
        staging: vk::Buffer,
        layers: u32,
        regions: &[vk::BufferImageCopy],
    ) -> Result<()> {
        let device = &self.device;
        device.begin_command_buffer(cmd, true)?;
        device.cmd_image_barrier(
            cmd,
            &ImageBarrier {
                image,
                aspect: vk::ImageAspectFlags::COLOR,
                layers,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                src_stage: vk::PipelineStageFlags2::NONE,
                src_access: vk::AccessFlags2::NONE,
                dst_stage: vk::PipelineStageFlags2::TRANSFER,
                dst_access: vk::AccessFlags2::TRANSFER_WRITE,
            },
        );
        device.cmd_copy_buffer_to_image(cmd, staging, image, regions);
        device.cmd_image_barrier(
            cmd,
            &ImageBarrier {
                image,
                aspect: vk::ImageAspectFlags::COLOR,
                layers,
                old_layout: vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                src_stage: vk::PipelineStageFlags2::TRANSFER,
                src_access: vk::AccessFlags2::TRANSFER_WRITE,
                dst_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
                dst_access: vk::AccessFlags2::SHADER_READ,
            },
        );
        device.end_command_buffer(cmd)?;

        let fence = Fence::new(device.clone(), false)?;
        device.submit(&SubmitInfo {
            command_buffers: std::slice::from_ref(&cmd),
            fence: Some(fence.handle()),
            ..Default::default()
        })?;
        fence.wait()
    }
}
