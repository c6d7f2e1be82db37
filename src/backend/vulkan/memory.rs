//! Device memory through the [`gpu_allocator`] crate, handed out as opaque [`DeviceMemory`] ids.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;
use gpu_allocator::vulkan as vk_alloc;
use gpu_allocator::vulkan::AllocationScheme;

use crate::allocator::memory_type::MemoryType;
use crate::core::device::DeviceMemory;
use crate::core::error::Error;

/// Owns the allocator and every live allocation. Must be dropped before the `VkDevice` it was created for.
#[derive(Derivative)]
#[derivative(Debug)]
pub(crate) struct MemoryAllocator {
    #[derivative(Debug = "ignore")]
    alloc: vk_alloc::Allocator,
    #[derivative(Debug = "ignore")]
    allocations: HashMap<u64, vk_alloc::Allocation>,
    next_id: u64,
}

impl MemoryAllocator {
    pub fn new(instance: &ash::Instance, device: &ash::Device, physical_device: vk::PhysicalDevice) -> Result<Self> {
        let alloc = vk_alloc::Allocator::new(&vk_alloc::AllocatorCreateDesc {
            instance: instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: Default::default(),
            buffer_device_address: false,
        })?;
        Ok(Self {
            alloc,
            allocations: HashMap::new(),
            next_id: 1,
        })
    }

    pub fn allocate(&mut self, name: &str, requirements: vk::MemoryRequirements, location: MemoryType) -> Result<DeviceMemory> {
        let allocation = self.alloc.allocate(&vk_alloc::AllocationCreateDesc {
            name,
            requirements,
            location: location.into(),
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        })?;
        let id = self.next_id;
        self.next_id += 1;
        self.allocations.insert(id, allocation);
        #[cfg(feature = "log-objects")]
        trace!("Allocated memory {id} ({name}, {} bytes)", requirements.size);
        Ok(DeviceMemory(id))
    }

    pub fn free(&mut self, memory: DeviceMemory) -> Result<()> {
        let allocation = self
            .allocations
            .remove(&memory.0)
            .ok_or(Error::UnknownMemory(memory.0))?;
        #[cfg(feature = "log-objects")]
        trace!("Freeing memory {}", memory.0);
        self.alloc.free(allocation)?;
        Ok(())
    }

    /// The `VkDeviceMemory` block and offset of an allocation, for binding it to a resource.
    pub fn binding(&self, memory: DeviceMemory) -> Result<(vk::DeviceMemory, vk::DeviceSize)> {
        let allocation = self
            .allocations
            .get(&memory.0)
            .ok_or(Error::UnknownMemory(memory.0))?;
        Ok((unsafe { allocation.memory() }, allocation.offset()))
    }

    pub fn write(&mut self, memory: DeviceMemory, offset: vk::DeviceSize, data: &[u8]) -> Result<()> {
        let allocation = self
            .allocations
            .get_mut(&memory.0)
            .ok_or(Error::UnknownMemory(memory.0))?;
        let mapped = allocation
            .mapped_slice_mut()
            .ok_or(Error::UnmappableMemory(memory.0))?;
        let start = offset as usize;
        let end = start
            .checked_add(data.len())
            .filter(|&end| end <= mapped.len())
            .ok_or(Error::WriteOutOfRange {
                offset,
                size: data.len() as u64,
            })?;
        mapped[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Free every allocation that is still alive. Called once the device is idle, before destroying it.
    pub fn free_all(&mut self) {
        for (id, allocation) in self.allocations.drain() {
            warn!("Memory {id} was never freed");
            if let Err(e) = self.alloc.free(allocation) {
                error!("Failed to free memory {id}: {e}");
            }
        }
    }
}
