//! Plain create-info structs for the resources a [`GraphicsDevice`](crate::core::device::GraphicsDevice) creates.

use ash::vk;

/// Parameters for a new buffer. Memory is allocated and bound separately.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BufferCreateInfo {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

/// Parameters for a new 2D image or cube map.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageCreateInfo {
    pub extent: vk::Extent2D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub samples: vk::SampleCountFlags,
    /// Number of array layers. Cube maps have 6.
    pub layers: u32,
    pub cube: bool,
}

impl ImageCreateInfo {
    /// Single-sampled, single-layer 2D image.
    pub fn texture_2d(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags) -> Self {
        Self {
            extent,
            format,
            usage,
            samples: vk::SampleCountFlags::TYPE_1,
            layers: 1,
            cube: false,
        }
    }

    /// Render target attachment with the given sample count.
    pub fn attachment(extent: vk::Extent2D, format: vk::Format, usage: vk::ImageUsageFlags, samples: vk::SampleCountFlags) -> Self {
        Self {
            extent,
            format,
            usage,
            samples,
            layers: 1,
            cube: false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageViewCreateInfo {
    pub image: vk::Image,
    pub format: vk::Format,
    pub view_type: vk::ImageViewType,
    pub aspect: vk::ImageAspectFlags,
    pub layers: u32,
}

impl ImageViewCreateInfo {
    /// View over the full single-layer image.
    pub fn new_2d(image: vk::Image, format: vk::Format, aspect: vk::ImageAspectFlags) -> Self {
        Self {
            image,
            format,
            view_type: vk::ImageViewType::TYPE_2D,
            aspect,
            layers: 1,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct SamplerCreateInfo {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub address_mode: vk::SamplerAddressMode,
    /// Maximum anisotropy, or None to disable anisotropic filtering.
    pub anisotropy: Option<f32>,
}

impl Default for SamplerCreateInfo {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            address_mode: vk::SamplerAddressMode::REPEAT,
            anisotropy: None,
        }
    }
}

/// One binding of a descriptor set layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorBinding {
    pub binding: u32,
    pub ty: vk::DescriptorType,
    pub count: u32,
    pub stages: vk::ShaderStageFlags,
}

impl DescriptorBinding {
    pub fn uniform_buffer(binding: u32, stages: vk::ShaderStageFlags) -> Self {
        Self {
            binding,
            ty: vk::DescriptorType::UNIFORM_BUFFER,
            count: 1,
            stages,
        }
    }

    pub fn sampler(binding: u32, stages: vk::ShaderStageFlags) -> Self {
        Self {
            binding,
            ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            count: 1,
            stages,
        }
    }
}
