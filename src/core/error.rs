//! Exposes the lugdunum error type

use std::ffi::NulError;

use ash;
use gpu_allocator::AllocationError;
use thiserror::Error;

/// Error type that lugdunum can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Failed to load the Vulkan library.
    #[error("Failed to load Vulkan.")]
    LoadFailed(ash::LoadingError),
    /// Could not convert rust string to C-String because it has null bytes
    #[error("Invalid C string")]
    InvalidString(NulError),
    /// Generic Vulkan error type.
    #[error("Vulkan error: `{0}`")]
    VkError(ash::vk::Result),
    /// No suitable GPU found.
    #[error("No physical device found matching requirements.")]
    NoGPU,
    /// No supported surface formats found.
    #[error("No supported surface formats found.")]
    NoSurfaceFormat,
    /// No queue was found that supports presentation.
    #[error("No queue found that supports presentation.")]
    NoPresentQueue,
    /// A swapchain operation was requested on a device created without a window.
    #[error("Device was created without a window surface.")]
    NoSurface,
    /// Vulkan allocation error.
    #[error("Vulkan allocation error: `{0}`")]
    AllocationError(AllocationError),
    /// Memory id was not handed out by this device, or was already freed.
    #[error("Unknown device memory `{0}`")]
    UnknownMemory(u64),
    /// Requested a host write into memory that is not mapped.
    #[error("Requested mappable memory, but memory `{0}` does not have a memory map")]
    UnmappableMemory(u64),
    /// Host write goes past the end of the allocation.
    #[error("Write of {size} bytes at offset {offset} is out of range of the allocation")]
    WriteOutOfRange { offset: u64, size: u64 },
    /// A descriptor set pool has no free slot left. Pools do not grow.
    #[error("Descriptor set pool `{pool}` exhausted ({max_sets} sets)")]
    DescriptorPoolExhausted { pool: String, max_sets: u32 },
    /// Sub-buffer id does not refer to a live slot of this pool.
    #[error("Invalid sub-buffer id for pool `{0}`")]
    InvalidSubBuffer(String),
    /// Descriptor set id does not refer to a live slot of this pool.
    #[error("Invalid descriptor set id for pool `{0}`")]
    InvalidDescriptorSet(String),
    /// A sub-buffer pool was configured with zero slots or zero bytes per slot.
    #[error("Buffer pool `{0}` must have at least one sub-buffer of non-zero size per chunk")]
    EmptyBufferPool(String),
    /// A key does not (or no longer) refer to an object in the scene.
    #[error("No {0} with this key in the scene")]
    NoSuchObject(&'static str),
    /// The view has no camera attached, so there is nothing to render.
    #[error("View has no camera")]
    NoCamera,
    /// The swapchain image index is out of range for the current swapchain.
    #[error("Swapchain image index {0} out of range")]
    InvalidImageIndex(u32),
    /// Operation is not allowed in the current window state.
    #[error("Invalid render window state: expected {expected}, found {found}")]
    InvalidState { expected: &'static str, found: &'static str },
    /// The swapchain no longer matches the surface and must be recreated.
    #[error("Swapchain is out of date")]
    SwapchainOutOfDate,
    /// More swapchain images than the per-image dirty mask can track.
    #[error("Swapchain has {0} images, at most 32 are supported")]
    TooManySwapchainImages(usize),
    /// Shader code for a pipeline variant was not found.
    #[error("Shader `{0}` not found")]
    ShaderNotFound(String),
    /// SPIR-V code is malformed.
    #[error("Invalid SPIR-V in `{0}`")]
    InvalidSpirv(String),
    /// A primitive set was built without positions.
    #[error("Primitive set has no position stream")]
    NoPositions,
    /// Texel data does not match the requested image size.
    #[error("Texture expects {expected} bytes of texel data, got {actual}")]
    TextureSizeMismatch { expected: usize, actual: usize },
    /// A mutex guarding device state was poisoned by a panicking thread.
    #[error("Lock poisoned")]
    PoisonError,
    /// Descriptor set pools must grow for more swapchain images, but sets are still in use.
    #[error("Cannot size descriptor set pools for {0} swapchain images while sets are in use")]
    PoolsInUse(u32),
    /// Uncategorized error.
    #[error("Uncategorized error: `{0}`")]
    Uncategorized(&'static str),
}

impl From<ash::LoadingError> for Error {
    fn from(value: ash::LoadingError) -> Self {
        Error::LoadFailed(value)
    }
}

impl From<NulError> for Error {
    fn from(value: NulError) -> Self {
        Error::InvalidString(value)
    }
}

impl From<ash::vk::Result> for Error {
    fn from(value: ash::vk::Result) -> Self {
        Error::VkError(value)
    }
}

impl From<AllocationError> for Error {
    fn from(value: AllocationError) -> Self {
        Error::AllocationError(value)
    }
}

impl From<(Vec<ash::vk::Pipeline>, ash::vk::Result)> for Error {
    fn from((_, result): (Vec<ash::vk::Pipeline>, ash::vk::Result)) -> Self {
        Error::VkError(result)
    }
}
