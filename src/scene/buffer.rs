//! Host-visible buffers for vertex, index and staging data.

use anyhow::Result;
use ash::vk;

use crate::allocator::memory_type::MemoryType;
use crate::core::device::{DeviceMemory, GraphicsDevice};
use crate::core::resources::BufferCreateInfo;

/// A buffer with its own memory allocation, filled from the host at creation.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct GpuBuffer<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    handle: vk::Buffer,
    memory: DeviceMemory,
    size: vk::DeviceSize,
}

impl<D: GraphicsDevice> GpuBuffer<D> {
    /// Create a host-visible buffer of `data.len()` bytes and copy `data` into it.
    /// # Errors
    /// Fails if the buffer or its memory cannot be created, or the memory cannot be written.
    pub fn with_data(device: D, name: &str, usage: vk::BufferUsageFlags, data: &[u8]) -> Result<Self> {
        let size = data.len().max(4) as vk::DeviceSize;
        let handle = device.create_buffer(&BufferCreateInfo {
            size,
            usage,
        })?;
        let requirements = device.buffer_memory_requirements(handle);
        let memory = match device.allocate_memory(name, requirements, MemoryType::CpuToGpu) {
            Ok(memory) => memory,
            Err(e) => {
                device.destroy_buffer(handle);
                return Err(e);
            }
        };
        // Constructed before binding so every later failure cleans up through Drop.
        let buffer = Self {
            device,
            handle,
            memory,
            size,
        };
        buffer.device.bind_buffer_memory(handle, memory)?;
        buffer.device.write_memory(memory, 0, data)?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkBuffer {:p} ({})", handle, name);
        Ok(buffer)
    }

    /// Create a buffer from a slice of plain data.
    pub fn from_slice<T: bytemuck::Pod>(device: D, name: &str, usage: vk::BufferUsageFlags, data: &[T]) -> Result<Self> {
        Self::with_data(device, name, usage, bytemuck::cast_slice(data))
    }

    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }
}

impl<D: GraphicsDevice> Drop for GpuBuffer<D> {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkBuffer {:p}", self.handle);
        self.device.destroy_buffer(self.handle);
        self.device.free_memory(self.memory);
    }
}
