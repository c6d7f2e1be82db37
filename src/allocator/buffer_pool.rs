//! Chunked sub-allocation of small GPU buffers.
//!
//! A [`BufferPool`] hands out fixed-size [`SubBuffer`] ranges for CPU-side objects that mirror their
//! data on the GPU, such as camera matrices, material constants or light arrays. Each range is keyed by
//! a hash identifying the object it backs, so an object keeps the same range from frame to frame and its
//! data only needs to be uploaded again when it changes.
//!
//! Storage is organized in [`Chunk`]s, each owning one buffer split into equal slots. A new chunk is
//! only created when every slot of every existing chunk is in use. Chunks are never released while the
//! pool is alive, freed slots are simply reused for other hashes.
//!
//! # Example
//! ```
//! # use lugdunum::*;
//! # use anyhow::Result;
//! # fn example<D: GraphicsDevice>(device: D) -> Result<()> {
//! let mut pool = BufferPool::new(device, BufferPoolInfo::uniform("camera", 8, 128))?;
//! let (updated, sub_buffer) = pool.allocate(42, false)?;
//! // First use of a hash always needs an upload.
//! assert!(updated);
//! let id = sub_buffer.id();
//! let (updated, _) = pool.allocate(42, false)?;
//! assert!(!updated);
//! pool.free(id)?;
//! pool.free(id)?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;

use crate::allocator::memory_type::MemoryType;
use crate::core::device::{DeviceMemory, GraphicsDevice};
use crate::core::error::Error;
use crate::core::resources::BufferCreateInfo;
use crate::util::align::align_up;

/// Configuration of a [`BufferPool`].
#[derive(Debug, Clone)]
pub struct BufferPoolInfo {
    /// Used in logs and error messages.
    pub name: String,
    pub sub_buffers_per_chunk: u32,
    /// Requested size of one sub-buffer, in bytes. Uniform pools round this up to the device's
    /// uniform offset alignment.
    pub sub_buffer_size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
    pub location: MemoryType,
}

impl BufferPoolInfo {
    /// Pool of uniform buffer ranges in device local memory, updated with inline buffer updates.
    pub fn uniform(name: impl Into<String>, sub_buffers_per_chunk: u32, sub_buffer_size: vk::DeviceSize) -> Self {
        Self {
            name: name.into(),
            sub_buffers_per_chunk,
            sub_buffer_size,
            usage: vk::BufferUsageFlags::UNIFORM_BUFFER | vk::BufferUsageFlags::TRANSFER_DST,
            location: MemoryType::GpuOnly,
        }
    }
}

/// Identifies a slot within a [`BufferPool`]. Stable for the lifetime of the pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct SubBufferId {
    chunk: u32,
    slot: u32,
}

impl SubBufferId {
    /// Index of the chunk this slot lives in.
    pub fn chunk(&self) -> u32 {
        self.chunk
    }

    pub fn slot(&self) -> u32 {
        self.slot
    }
}

/// A byte range `[offset, offset + size)` of a chunk's buffer.
///
/// A sub-buffer is either free (`hash == 0`, `reference_count == 0`) or in use by exactly one hash.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct SubBuffer {
    id: SubBufferId,
    buffer: vk::Buffer,
    offset: vk::DeviceSize,
    size: vk::DeviceSize,
    hash: u64,
    reference_count: u32,
}

impl SubBuffer {
    pub fn id(&self) -> SubBufferId {
        self.id
    }

    /// The chunk's buffer. Owned by the chunk, not by the sub-buffer.
    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn offset(&self) -> vk::DeviceSize {
        self.offset
    }

    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// Hash of the object this sub-buffer currently backs, or 0 if free.
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn reference_count(&self) -> u32 {
        self.reference_count
    }

    pub fn is_free(&self) -> bool {
        self.reference_count == 0
    }

    /// Descriptor info covering exactly this range.
    pub fn descriptor_info(&self) -> vk::DescriptorBufferInfo {
        vk::DescriptorBufferInfo {
            buffer: self.buffer,
            offset: self.offset,
            range: self.size,
        }
    }
}

/// One buffer and its memory, split into equal sub-buffers.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Chunk<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    buffer: vk::Buffer,
    memory: DeviceMemory,
    sub_buffers: Vec<SubBuffer>,
    /// Stack of free slot indices.
    free: Vec<u32>,
}

impl<D: GraphicsDevice> Chunk<D> {
    fn new(device: D, info: &BufferPoolInfo, index: u32, stride: vk::DeviceSize) -> Result<Self> {
        let count = info.sub_buffers_per_chunk;
        let buffer = device.create_buffer(&BufferCreateInfo {
            size: stride * count as vk::DeviceSize,
            usage: info.usage,
        })?;
        let requirements = device.buffer_memory_requirements(buffer);
        let memory = match device.allocate_memory(&format!("{} chunk {}", info.name, index), requirements, info.location) {
            Ok(memory) => memory,
            Err(e) => {
                device.destroy_buffer(buffer);
                return Err(e);
            }
        };
        if let Err(e) = device.bind_buffer_memory(buffer, memory) {
            device.destroy_buffer(buffer);
            device.free_memory(memory);
            return Err(e);
        }

        let sub_buffers = (0..count)
            .map(|slot| SubBuffer {
                id: SubBufferId {
                    chunk: index,
                    slot,
                },
                buffer,
                offset: slot as vk::DeviceSize * stride,
                size: info.sub_buffer_size,
                hash: 0,
                reference_count: 0,
            })
            .collect();
        // Reversed so slots are handed out in ascending order.
        let free = (0..count).rev().collect();

        #[cfg(feature = "log-objects")]
        trace!("Created new VkBuffer {:p} for pool chunk {}", buffer, index);

        Ok(Self {
            device,
            buffer,
            memory,
            sub_buffers,
            free,
        })
    }

    pub fn buffer(&self) -> vk::Buffer {
        self.buffer
    }

    pub fn sub_buffers(&self) -> &[SubBuffer] {
        &self.sub_buffers
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    fn take_free(&mut self) -> Option<&mut SubBuffer> {
        let slot = self.free.pop()?;
        self.sub_buffers.get_mut(slot as usize)
    }
}

impl<D: GraphicsDevice> Drop for Chunk<D> {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkBuffer {:p} of pool chunk", self.buffer);
        self.device.destroy_buffer(self.buffer);
        self.device.free_memory(self.memory);
    }
}

/// Growable pool of fixed-size sub-buffers, keyed by the hash of the object they back.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct BufferPool<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    info: BufferPoolInfo,
    stride: vk::DeviceSize,
    chunks: Vec<Chunk<D>>,
    in_use: HashMap<u64, SubBufferId>,
}

impl<D: GraphicsDevice> BufferPool<D> {
    /// Create an empty pool. The first chunk is created on the first allocation.
    /// # Errors
    /// * Fails with [`Error::EmptyBufferPool`] if the pool would have no usable slots.
    pub fn new(device: D, mut info: BufferPoolInfo) -> Result<Self> {
        if info.sub_buffers_per_chunk == 0 || info.sub_buffer_size == 0 {
            return Err(Error::EmptyBufferPool(info.name).into());
        }
        let stride = if info.usage.contains(vk::BufferUsageFlags::UNIFORM_BUFFER) {
            align_up(info.sub_buffer_size, device.limits().min_uniform_buffer_offset_alignment)
        } else {
            info.sub_buffer_size
        };
        // Inline updates need a multiple of 4 bytes.
        info.sub_buffer_size = align_up(info.sub_buffer_size, 4);
        Ok(Self {
            device,
            stride: stride.max(info.sub_buffer_size),
            info,
            chunks: Vec::new(),
            in_use: HashMap::new(),
        })
    }

    /// Get the sub-buffer for `hash`, taking a new reference to it.
    ///
    /// If `hash` is already backed by a sub-buffer, that sub-buffer is returned and `updated` equals `dirty`.
    /// Otherwise a free sub-buffer is claimed, growing the pool by one chunk if needed, and `updated` is
    /// always true: the caller must upload the object's data before it is read.
    ///
    /// Every call must be balanced by a call to [`BufferPool::free()`].
    /// # Errors
    /// * Fails if `hash` is zero, which is reserved for free slots.
    /// * Fails if a new chunk is needed and the device cannot create it.
    pub fn allocate(&mut self, hash: u64, dirty: bool) -> Result<(bool, &SubBuffer)> {
        if hash == 0 {
            return Err(Error::Uncategorized("Sub-buffer hash must be non-zero").into());
        }

        if let Some(id) = self.in_use.get(&hash).copied() {
            let sub_buffer = self.slot_mut(id)?;
            sub_buffer.reference_count += 1;
            return Ok((dirty, &*sub_buffer));
        }

        let chunk_index = match self.chunks.iter().position(|chunk| chunk.free_count() > 0) {
            Some(index) => index,
            None => self.grow()?,
        };
        let chunk = self
            .chunks
            .get_mut(chunk_index)
            .ok_or_else(|| Error::InvalidSubBuffer(self.info.name.clone()))?;
        let sub_buffer = chunk
            .take_free()
            .ok_or_else(|| Error::InvalidSubBuffer(self.info.name.clone()))?;
        sub_buffer.hash = hash;
        sub_buffer.reference_count = 1;
        self.in_use.insert(hash, sub_buffer.id);
        Ok((true, &*sub_buffer))
    }

    /// Drop one reference to a sub-buffer. When no references are left, the sub-buffer is returned to its
    /// chunk and can be claimed by any other hash.
    /// # Errors
    /// * Fails with [`Error::InvalidSubBuffer`] if the id is not a slot of this pool or the slot is already free.
    pub fn free(&mut self, id: SubBufferId) -> Result<()> {
        let name = self.info.name.clone();
        let chunk = self
            .chunks
            .get_mut(id.chunk as usize)
            .ok_or_else(|| Error::InvalidSubBuffer(name.clone()))?;
        let sub_buffer = chunk
            .sub_buffers
            .get_mut(id.slot as usize)
            .ok_or_else(|| Error::InvalidSubBuffer(name.clone()))?;
        if sub_buffer.reference_count == 0 {
            return Err(Error::InvalidSubBuffer(name).into());
        }

        sub_buffer.reference_count -= 1;
        if sub_buffer.reference_count == 0 {
            self.in_use.remove(&sub_buffer.hash);
            sub_buffer.hash = 0;
            chunk.free.push(id.slot);
        }
        Ok(())
    }

    /// Look up the sub-buffer currently backing `hash`, without taking a reference.
    pub fn find(&self, hash: u64) -> Option<&SubBuffer> {
        self.in_use.get(&hash).and_then(|id| self.get(*id))
    }

    pub fn get(&self, id: SubBufferId) -> Option<&SubBuffer> {
        self.chunks
            .get(id.chunk as usize)
            .and_then(|chunk| chunk.sub_buffers.get(id.slot as usize))
    }

    pub fn chunks(&self) -> &[Chunk<D>] {
        &self.chunks
    }

    pub fn chunk_count(&self) -> usize {
        self.chunks.len()
    }

    /// Number of sub-buffers currently in use.
    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    pub fn free_count(&self) -> usize {
        self.chunks.iter().map(Chunk::free_count).sum()
    }

    /// Total number of sub-buffers over all chunks.
    pub fn capacity(&self) -> usize {
        self.chunks.len() * self.info.sub_buffers_per_chunk as usize
    }

    /// Size of one sub-buffer, in bytes.
    pub fn sub_buffer_size(&self) -> vk::DeviceSize {
        self.info.sub_buffer_size
    }

    /// Distance between consecutive sub-buffers of a chunk.
    pub fn stride(&self) -> vk::DeviceSize {
        self.stride
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    fn slot_mut(&mut self, id: SubBufferId) -> Result<&mut SubBuffer> {
        let name = &self.info.name;
        self.chunks
            .get_mut(id.chunk as usize)
            .and_then(|chunk| chunk.sub_buffers.get_mut(id.slot as usize))
            .ok_or_else(|| Error::InvalidSubBuffer(name.clone()).into())
    }

    fn grow(&mut self) -> Result<usize> {
        let index = self.chunks.len();
        let chunk = Chunk::new(self.device.clone(), &self.info, index as u32, self.stride).map_err(|e| {
            error!("Buffer pool {}: failed to allocate chunk {}: {}", self.info.name, index, e);
            e
        })?;
        debug!(
            "Buffer pool {}: allocated chunk {} ({} x {} bytes)",
            self.info.name, index, self.info.sub_buffers_per_chunk, self.stride
        );
        self.chunks.push(chunk);
        Ok(index)
    }
}
