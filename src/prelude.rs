//! Re-exports of the types most applications need.

pub use ash::vk;

pub use crate::core::app_info::*;
pub use crate::core::device::{AcquiredImage, DeviceLimits, DeviceMemory, GraphicsDevice, PresentResult, SwapchainCreateInfo, SwapchainImages};
pub use crate::core::error::Error;
pub use crate::core::window::{Window, WindowSize};

pub use crate::backend::vulkan::VulkanDevice;

pub use crate::allocator::buffer_pool::{BufferPool, BufferPoolInfo, SubBuffer, SubBufferId};
pub use crate::allocator::memory_type::MemoryType;

pub use crate::descriptor::descriptor_pool::{DescriptorPoolSize, DescriptorSetPool};
pub use crate::descriptor::descriptor_set::{DescriptorSet, DescriptorSetId, DescriptorWrite};

pub use crate::pipeline::cache::{Pipeline, PipelineCache, RenderTargetFormat};
pub use crate::pipeline::id::{ExtraPart, MaterialPart, PipelineId, PrimitivePart, TextureSlot, Topology};
pub use crate::pipeline::shader::{ShaderLoader, ShaderStage, SpirvDirectory};

pub use crate::scene::buffer::GpuBuffer;
pub use crate::scene::camera::{Camera, Projection};
pub use crate::scene::light::{Light, LightKind};
pub use crate::scene::material::{Material, MaterialBuilder};
pub use crate::scene::mesh::{Mesh, MeshBuilder, PrimitiveSet, PrimitiveSetData};
pub use crate::scene::node::{Node, Skybox};
pub use crate::scene::texture::{Texture, TextureBuilder};
pub use crate::scene::{CameraKey, LightKey, MaterialKey, MeshKey, NodeKey, Scene, SkyboxKey, TextureKey};

pub use crate::render::queue::RenderQueue;
pub use crate::render::renderer::Renderer;
pub use crate::render::technique::forward::Forward;
pub use crate::render::technique::Technique;
pub use crate::render::view::{RenderView, Viewport};
pub use crate::render::window::{FrameOutcome, RenderWindow, WindowState};

pub use crate::sync::fence::Fence;
pub use crate::sync::semaphore::Semaphore;
