//! Exposes different memory types that determine where memory allocations should live.

/// The memory type of an allocation indicates where it should live.
///
/// See also: [`GraphicsDevice::allocate_memory()`](crate::core::device::GraphicsDevice::allocate_memory)
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum MemoryType {
    /// GPU only memory. Pool sub-buffers live here and are written with inline command buffer updates.
    GpuOnly,
    /// Host visible memory, used for staging uploads and small vertex streams.
    CpuToGpu,
    /// Memory useful for CPU readback of data.
    GpuToCpu,
}

impl MemoryType {
    /// Whether allocations of this type can be written through [`GraphicsDevice::write_memory()`](crate::core::device::GraphicsDevice::write_memory).
    pub fn is_host_visible(&self) -> bool {
        !matches!(self, MemoryType::GpuOnly)
    }
}

impl From<MemoryType> for gpu_allocator::MemoryLocation {
    fn from(value: MemoryType) -> Self {
        match value {
            MemoryType::GpuOnly => gpu_allocator::MemoryLocation::GpuOnly,
            MemoryType::CpuToGpu => gpu_allocator::MemoryLocation::CpuToGpu,
            MemoryType::GpuToCpu => gpu_allocator::MemoryLocation::GpuToCpu,
        }
    }
}
