use ash::vk;

/// Contents written to one descriptor binding.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DescriptorResource {
    UniformBuffer {
        buffer: vk::Buffer,
        offset: vk::DeviceSize,
        range: vk::DeviceSize,
    },
    CombinedImageSampler {
        view: vk::ImageView,
        sampler: vk::Sampler,
        layout: vk::ImageLayout,
    },
}

impl DescriptorResource {
    pub fn descriptor_type(&self) -> vk::DescriptorType {
        match self {
            DescriptorResource::UniformBuffer { .. } => vk::DescriptorType::UNIFORM_BUFFER,
            DescriptorResource::CombinedImageSampler { .. } => vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        }
    }
}

/// A write of one resource into binding `binding` of a descriptor set.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorWrite {
    pub binding: u32,
    pub resource: DescriptorResource,
}

impl DescriptorWrite {
    pub fn uniform_buffer(binding: u32, info: vk::DescriptorBufferInfo) -> Self {
        Self {
            binding,
            resource: DescriptorResource::UniformBuffer {
                buffer: info.buffer,
                offset: info.offset,
                range: info.range,
            },
        }
    }

    pub fn sampled_image(binding: u32, view: vk::ImageView, sampler: vk::Sampler) -> Self {
        Self {
            binding,
            resource: DescriptorResource::CombinedImageSampler {
                view,
                sampler,
                layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            },
        }
    }
}

/// Index of a slot in a [`DescriptorSetPool`](crate::descriptor::descriptor_pool::DescriptorSetPool).
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DescriptorSetId(pub(crate) u32);

impl DescriptorSetId {
    pub fn index(&self) -> u32 {
        self.0
    }
}

/// A pooled descriptor set. Free slots have `hash == 0` and `reference_count == 0`, and may still hold
/// a native set from an earlier use so it can be reused without reallocation.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DescriptorSet {
    pub(crate) id: DescriptorSetId,
    pub(crate) handle: vk::DescriptorSet,
    pub(crate) layout: vk::DescriptorSetLayout,
    pub(crate) hash: u64,
    pub(crate) reference_count: u32,
}

impl DescriptorSet {
    pub fn id(&self) -> DescriptorSetId {
        self.id
    }

    pub fn handle(&self) -> vk::DescriptorSet {
        self.handle
    }

    /// Layout the native set was allocated with.
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub fn reference_count(&self) -> u32 {
        self.reference_count
    }

    pub fn is_free(&self) -> bool {
        self.reference_count == 0
    }
}
