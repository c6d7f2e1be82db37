//! The Vulkan implementation of [`GraphicsDevice`](crate::core::device::GraphicsDevice), built on ash and
//! gpu-allocator.

pub use device::VulkanDevice;

mod device;
mod instance;
mod memory;
mod physical_device;
mod surface;
