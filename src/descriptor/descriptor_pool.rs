//! Fixed-capacity descriptor set pool.
//!
//! A [`DescriptorSetPool`] works like a [`BufferPool`](crate::allocator::buffer_pool::BufferPool), but
//! backs each hash with a descriptor set instead of a buffer range. The native descriptor pool cannot
//! grow after creation, so the number of sets is a hard limit. Running out is a configuration error and is
//! reported as [`Error::DescriptorPoolExhausted`], see [`PoolSettings`](crate::PoolSettings).

use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use anyhow::Result;
use ash::vk;

use crate::core::device::GraphicsDevice;
use crate::core::error::Error;
use crate::descriptor::descriptor_set::{DescriptorSet, DescriptorSetId};

/// Defines how many descriptors of each type a single set from the pool can hold.
#[derive(Debug, Clone, Default)]
pub struct DescriptorPoolSize(pub HashMap<vk::DescriptorType, u32>);

impl DescriptorPoolSize {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, ty: vk::DescriptorType, count: u32) -> Self {
        *self.0.entry(ty).or_insert(0) += count;
        self
    }

    /// Native pool sizes for `max_sets` sets.
    fn scaled(&self, max_sets: u32) -> Vec<vk::DescriptorPoolSize> {
        self.0
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(ty, count)| vk::DescriptorPoolSize {
                ty: *ty,
                descriptor_count: *count * max_sets,
            })
            .collect()
    }
}

impl Display for DescriptorPoolSize {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mut result = writeln!(f, "DescriptorPoolSize (");
        for (ty, size) in &self.0 {
            result = result.and_then(|_| writeln!(f, "{ty:?} => {size}"))
        }
        result.and_then(|_| write!(f, ")"))
    }
}

/// Pool of at most `max_sets` descriptor sets, keyed by the hash of the resources they bind.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct DescriptorSetPool<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    name: String,
    handle: vk::DescriptorPool,
    sets: Vec<DescriptorSet>,
    /// Stack of free slot indices.
    free: Vec<u32>,
    in_use: HashMap<u64, DescriptorSetId>,
}

impl<D: GraphicsDevice> DescriptorSetPool<D> {
    /// Create the native pool, sized for `max_sets` sets of `size` each.
    pub fn new(device: D, name: impl Into<String>, max_sets: u32, size: &DescriptorPoolSize) -> Result<Self> {
        let name = name.into();
        let handle = device.create_descriptor_pool(max_sets, &size.scaled(max_sets))?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDescriptorPool {handle:p}");
        debug!("Descriptor set pool {}: {} sets, {}", name, max_sets, size);

        let sets = (0..max_sets)
            .map(|index| DescriptorSet {
                id: DescriptorSetId(index),
                handle: vk::DescriptorSet::null(),
                layout: vk::DescriptorSetLayout::null(),
                hash: 0,
                reference_count: 0,
            })
            .collect();
        Ok(Self {
            device,
            name,
            handle,
            sets,
            free: (0..max_sets).rev().collect(),
            in_use: HashMap::new(),
        })
    }

    /// Get the descriptor set for `hash`, taking a new reference to it.
    ///
    /// If `hash` is already backed by a set, it is returned with `updated == false`. Otherwise a free slot is
    /// claimed and `updated` is true: the caller must write the set's descriptors before binding it.
    /// A free slot that still holds a native set with the same layout is preferred, other slots get a new native
    /// set allocated with `layout`.
    ///
    /// Every call must be balanced by a call to [`DescriptorSetPool::free()`].
    /// # Errors
    /// * Fails with [`Error::DescriptorPoolExhausted`] if all `max_sets` slots are in use.
    /// * Fails if the device cannot allocate the native set.
    pub fn allocate(&mut self, hash: u64, layout: vk::DescriptorSetLayout) -> Result<(bool, &DescriptorSet)> {
        if hash == 0 {
            return Err(Error::Uncategorized("Descriptor set hash must be non-zero").into());
        }

        if let Some(id) = self.in_use.get(&hash).copied() {
            let name = &self.name;
            let set = self
                .sets
                .get_mut(id.0 as usize)
                .ok_or_else(|| Error::InvalidDescriptorSet(name.clone()))?;
            set.reference_count += 1;
            return Ok((false, &*set));
        }

        let position = self
            .free
            .iter()
            .rposition(|slot| self.sets.get(*slot as usize).map(|set| set.layout) == Some(layout))
            .or_else(|| self.free.len().checked_sub(1))
            .ok_or_else(|| {
                error!("Descriptor set pool {} exhausted", self.name);
                Error::DescriptorPoolExhausted {
                    pool: self.name.clone(),
                    max_sets: self.sets.len() as u32,
                }
            })?;
        let slot = self.free[position];
        let set = self
            .sets
            .get_mut(slot as usize)
            .ok_or_else(|| Error::InvalidDescriptorSet(self.name.clone()))?;

        if set.handle == vk::DescriptorSet::null() || set.layout != layout {
            if set.handle != vk::DescriptorSet::null() {
                self.device.free_descriptor_set(self.handle, set.handle)?;
                set.handle = vk::DescriptorSet::null();
                set.layout = vk::DescriptorSetLayout::null();
            }
            set.handle = self.device.allocate_descriptor_set(self.handle, layout)?;
            set.layout = layout;
        }

        self.free.remove(position);
        set.hash = hash;
        set.reference_count = 1;
        self.in_use.insert(hash, set.id);
        Ok((true, &*set))
    }

    /// Drop one reference to a set. When no references are left, the slot becomes free. The native set is kept
    /// for reuse by a later allocation with the same layout.
    /// # Errors
    /// * Fails with [`Error::InvalidDescriptorSet`] if the id is out of range or the slot is already free.
    pub fn free(&mut self, id: DescriptorSetId) -> Result<()> {
        let set = self
            .sets
            .get_mut(id.0 as usize)
            .filter(|set| set.reference_count > 0)
            .ok_or_else(|| Error::InvalidDescriptorSet(self.name.clone()))?;
        set.reference_count -= 1;
        if set.reference_count == 0 {
            self.in_use.remove(&set.hash);
            set.hash = 0;
            self.free.push(id.0);
        }
        Ok(())
    }

    pub fn find(&self, hash: u64) -> Option<&DescriptorSet> {
        self.in_use.get(&hash).and_then(|id| self.get(*id))
    }

    pub fn get(&self, id: DescriptorSetId) -> Option<&DescriptorSet> {
        self.sets.get(id.0 as usize)
    }

    pub fn max_sets(&self) -> u32 {
        self.sets.len() as u32
    }

    pub fn in_use_count(&self) -> usize {
        self.in_use.len()
    }

    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the raw Vulkan handle of the native pool.
    pub fn handle(&self) -> vk::DescriptorPool {
        self.handle
    }
}

impl<D: GraphicsDevice> Drop for DescriptorSetPool<D> {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkDescriptorPool {:p}", self.handle);
        // Destroying the pool frees every set allocated from it.
        self.device.destroy_descriptor_pool(self.handle);
    }
}
