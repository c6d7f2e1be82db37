//! Wrapper around a `VkSurfaceKHR` and the swapchain parameter choices made from it.

use anyhow::Result;
use ash::vk;

use crate::backend::vulkan::instance::Instance;
use crate::core::error::Error;
use crate::core::window::Window;

/// Surface capabilities queried for one physical device. Queried again before each swapchain creation,
/// since the current extent follows the window.
#[derive(Debug, Clone, Default)]
pub(crate) struct SurfaceDetails {
    pub capabilities: vk::SurfaceCapabilitiesKHR,
    pub formats: Vec<vk::SurfaceFormatKHR>,
    pub present_modes: Vec<vk::PresentModeKHR>,
}

#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct Surface {
    handle: vk::SurfaceKHR,
    #[derivative(Debug = "ignore")]
    functions: ash::extensions::khr::Surface,
}

impl Surface {
    pub fn new(instance: &Instance, window: &dyn Window) -> Result<Self> {
        let functions = ash::extensions::khr::Surface::new(instance.loader(), instance);
        let handle = unsafe {
            ash_window::create_surface(instance.loader(), instance, window.raw_display_handle(), window.raw_window_handle(), None)?
        };
        #[cfg(feature = "log-objects")]
        trace!("Created new VkSurfaceKHR {handle:p}");
        Ok(Surface {
            handle,
            functions,
        })
    }

    pub fn handle(&self) -> vk::SurfaceKHR {
        self.handle
    }

    /// Whether queue family `family` of `physical_device` can present to this surface.
    pub fn supports_queue(&self, physical_device: vk::PhysicalDevice, family: u32) -> bool {
        unsafe {
            self.functions
                .get_physical_device_surface_support(physical_device, family, self.handle)
                .unwrap_or(false)
        }
    }

    pub fn query_details(&self, physical_device: vk::PhysicalDevice) -> Result<SurfaceDetails> {
        unsafe {
            Ok(SurfaceDetails {
                capabilities: self
                    .functions
                    .get_physical_device_surface_capabilities(physical_device, self.handle)?,
                formats: self
                    .functions
                    .get_physical_device_surface_formats(physical_device, self.handle)?,
                present_modes: self
                    .functions
                    .get_physical_device_surface_present_modes(physical_device, self.handle)?,
            })
        }
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkSurfaceKHR {:p}", self.handle);
        unsafe {
            self.functions.destroy_surface(self.handle, None);
        }
    }
}

pub(crate) fn choose_surface_format(preferred: Option<vk::SurfaceFormatKHR>, details: &SurfaceDetails) -> Result<vk::SurfaceFormatKHR> {
    // Used when the preferred format is not available. If this one is not either, the first reported format is used.
    const FALLBACK_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
        format: vk::Format::B8G8R8A8_SRGB,
        color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
    };

    if let Some(preferred) = preferred {
        if details.formats.contains(&preferred) {
            return Ok(preferred);
        }
    }
    if details.formats.contains(&FALLBACK_FORMAT) {
        return Ok(FALLBACK_FORMAT);
    }
    details
        .formats
        .first()
        .copied()
        .ok_or_else(|| anyhow::Error::from(Error::NoSurfaceFormat))
}

pub(crate) fn choose_present_mode(preferred: Option<vk::PresentModeKHR>, details: &SurfaceDetails) -> vk::PresentModeKHR {
    match preferred {
        Some(mode) if details.present_modes.contains(&mode) => mode,
        // VSync, always supported
        _ => vk::PresentModeKHR::FIFO,
    }
}

pub(crate) fn choose_extent(requested: vk::Extent2D, capabilities: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }
    vk::Extent2D {
        width: requested
            .width
            .clamp(capabilities.min_image_extent.width, capabilities.max_image_extent.width),
        height: requested
            .height
            .clamp(capabilities.min_image_extent.height, capabilities.max_image_extent.height),
    }
}

pub(crate) fn choose_image_count(requested: u32, capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let count = requested.max(capabilities.min_image_count);
    if capabilities.max_image_count != 0 {
        count.min(capabilities.max_image_count)
    } else {
        count
    }
}
