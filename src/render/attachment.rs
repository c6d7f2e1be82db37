use anyhow::Result;
use ash::vk;

use crate::allocator::memory_type::MemoryType;
use crate::core::device::{DeviceMemory, GraphicsDevice};
use crate::core::resources::{ImageCreateInfo, ImageViewCreateInfo};

/// A render target image owned by a technique, such as a depth buffer or a multisampled color buffer.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Attachment<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    image: vk::Image,
    memory: DeviceMemory,
    view: vk::ImageView,
    format: vk::Format,
    samples: vk::SampleCountFlags,
}

impl<D: GraphicsDevice> Attachment<D> {
    pub fn new(
        device: D,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        samples: vk::SampleCountFlags,
    ) -> Result<Self> {
        let image = device.create_image(&ImageCreateInfo::attachment(extent, format, usage, samples))?;
        let memory = match device.allocate_memory(name, device.image_memory_requirements(image), MemoryType::GpuOnly) {
            Ok(memory) => memory,
            Err(e) => {
                device.destroy_image(image);
                return Err(e);
            }
        };
        let mut attachment = Self {
            device,
            image,
            memory,
            view: vk::ImageView::null(),
            format,
            samples,
        };
        attachment.device.bind_image_memory(image, memory)?;
        attachment.view = attachment
            .device
            .create_image_view(&ImageViewCreateInfo::new_2d(image, format, aspect_of(format)))?;
        #[cfg(feature = "log-objects")]
        trace!("Created attachment {} (VkImage {:p})", name, image);
        Ok(attachment)
    }

    /// Depth attachment in the device's depth format.
    pub fn depth(device: D, name: &str, extent: vk::Extent2D, samples: vk::SampleCountFlags) -> Result<Self> {
        let format = device.limits().depth_format;
        Self::new(device, name, extent, format, vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT, samples)
    }

    /// Transient multisampled color attachment, resolved into the swapchain image.
    pub fn multisampled_color(device: D, name: &str, extent: vk::Extent2D, format: vk::Format, samples: vk::SampleCountFlags) -> Result<Self> {
        Self::new(
            device,
            name,
            extent,
            format,
            vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
            samples,
        )
    }

    pub fn image(&self) -> vk::Image {
        self.image
    }

    pub fn view(&self) -> vk::ImageView {
        self.view
    }

    pub fn format(&self) -> vk::Format {
        self.format
    }

    pub fn samples(&self) -> vk::SampleCountFlags {
        self.samples
    }

    pub fn aspect(&self) -> vk::ImageAspectFlags {
        aspect_of(self.format)
    }
}

impl<D: GraphicsDevice> Drop for Attachment<D> {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying attachment VkImage {:p}", self.image);
        if self.view != vk::ImageView::null() {
            self.device.destroy_image_view(self.view);
        }
        self.device.destroy_image(self.image);
        self.device.free_memory(self.memory);
    }
}

fn aspect_of(format: vk::Format) -> vk::ImageAspectFlags {
    match format {
        vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => vk::ImageAspectFlags::DEPTH,
        vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
            vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
        }
        _ => vk::ImageAspectFlags::COLOR,
    }
}
