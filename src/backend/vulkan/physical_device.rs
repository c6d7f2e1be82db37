//! Physical device selection.

use std::ffi::CStr;

use anyhow::Result;
use ash::vk;

use crate::backend::vulkan::instance::Instance;
use crate::backend::vulkan::surface::Surface;
use crate::core::app_info::GPURequirements;
use crate::core::error::Error;
use crate::util::string::name_from_array;

/// A physical device abstracts away an actual device, like a graphics card or integrated graphics card.
#[derive(Debug, Clone)]
pub(crate) struct PhysicalDevice {
    handle: vk::PhysicalDevice,
    properties: vk::PhysicalDeviceProperties,
    /// The single queue family used for graphics, transfers and presentation.
    graphics_family: u32,
}

impl PhysicalDevice {
    /// Selects the first physical device that satisfies the requirements and has a graphics queue family
    /// that can present to `surface`, if one is given.
    pub fn select(instance: &Instance, surface: Option<&Surface>, requirements: &GPURequirements) -> Result<Self> {
        let devices = unsafe { instance.enumerate_physical_devices()? };
        if devices.is_empty() {
            return Err(anyhow::Error::from(Error::NoGPU));
        }

        devices
            .iter()
            .find_map(|&handle| {
                let properties = unsafe { instance.get_physical_device_properties(handle) };
                let memory_properties = unsafe { instance.get_physical_device_memory_properties(handle) };
                let extensions = unsafe { instance.enumerate_device_extension_properties(handle) }
                    .ok()?
                    .iter()
                    .map(|ext| name_from_array(&ext.extension_name))
                    .collect::<Vec<_>>();
                let queue_families = unsafe { instance.get_physical_device_queue_family_properties(handle) };
                let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) };

                if properties.api_version < vk::API_VERSION_1_3 {
                    debug!("Rejecting {name:?}: Vulkan 1.3 is not supported");
                    return None;
                }
                if requirements.dedicated && properties.device_type != vk::PhysicalDeviceType::DISCRETE_GPU {
                    debug!("Rejecting {name:?}: not a dedicated GPU");
                    return None;
                }
                if requirements.min_video_memory > total_video_memory(&memory_properties) {
                    debug!("Rejecting {name:?}: not enough video memory");
                    return None;
                }
                if let Some(missing) = requirements
                    .device_extensions
                    .iter()
                    .find(|requested| !extensions.contains(requested))
                {
                    debug!("Rejecting {name:?}: extension {missing} is not available");
                    return None;
                }

                let graphics_family = queue_families
                    .iter()
                    .enumerate()
                    .filter(|(_, family)| family.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                    .map(|(index, _)| index as u32)
                    .find(|&index| match surface {
                        Some(surface) => surface.supports_queue(handle, index),
                        None => true,
                    });
                let Some(graphics_family) = graphics_family else {
                    debug!("Rejecting {name:?}: no graphics queue that can present");
                    return None;
                };

                info!("Picked physical device {:?}, driver version {:?}.", name, properties.driver_version);
                info!(
                    "Device has {} bytes of available video memory, of which {} are device local.",
                    total_video_memory(&memory_properties),
                    total_device_memory(&memory_properties)
                );
                Some(PhysicalDevice {
                    handle,
                    properties,
                    graphics_family,
                })
            })
            .ok_or_else(|| anyhow::Error::from(Error::NoGPU))
    }

    pub fn handle(&self) -> vk::PhysicalDevice {
        self.handle
    }

    pub fn properties(&self) -> &vk::PhysicalDeviceProperties {
        &self.properties
    }

    pub fn graphics_family(&self) -> u32 {
        self.graphics_family
    }

    /// Best supported depth attachment format, preferring 32 bit float depth.
    pub fn depth_format(&self, instance: &Instance) -> Result<vk::Format> {
        const CANDIDATES: [vk::Format; 3] = [
            vk::Format::D32_SFLOAT,
            vk::Format::D32_SFLOAT_S8_UINT,
            vk::Format::D24_UNORM_S8_UINT,
        ];
        CANDIDATES
            .into_iter()
            .find(|&format| {
                let properties = unsafe { instance.get_physical_device_format_properties(self.handle, format) };
                properties
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .ok_or_else(|| anyhow::Error::from(Error::Uncategorized("No supported depth format")))
    }
}

fn total_video_memory(memory: &vk::PhysicalDeviceMemoryProperties) -> usize {
    memory.memory_heaps[..memory.memory_heap_count as usize]
        .iter()
        .map(|heap| heap.size as usize)
        .sum()
}

fn total_device_memory(memory: &vk::PhysicalDeviceMemoryProperties) -> usize {
    memory.memory_heaps[..memory.memory_heap_count as usize]
        .iter()
        .filter(|heap| heap.flags.contains(vk::MemoryHeapFlags::DEVICE_LOCAL))
        .map(|heap| heap.size as usize)
        .sum()
}
