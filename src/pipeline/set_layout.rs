//! Descriptor set and pipeline layout families.
//!
//! Forward pipelines use four sets:
//!
//! | set | contents                                                                    |
//! |-----|-----------------------------------------------------------------------------|
//! | 0   | camera uniform buffer                                                       |
//! | 1   | light uniform buffer                                                        |
//! | 2   | material uniform buffer (binding 0), one sampler per bound texture slot     |
//! | 3   | irradiance (binding 0) and prefiltered (binding 1) maps, only if either is present |
//!
//! The skybox pipeline uses set 0 for the camera and set 1 for its cube map. All pipelines take the node's model
//! matrix as a 64 byte vertex stage push constant.

use ash::vk;

use crate::core::resources::DescriptorBinding;
use crate::descriptor::descriptor_pool::DescriptorPoolSize;
use crate::pipeline::id::{PipelineId, TextureSlot};

pub const CAMERA_SET: u32 = 0;
pub const LIGHT_SET: u32 = 1;
pub const MATERIAL_SET: u32 = 2;
pub const IBL_SET: u32 = 3;
pub const SKYBOX_SET: u32 = 1;

pub const IRRADIANCE_BINDING: u32 = 0;
pub const PREFILTERED_BINDING: u32 = 1;

/// Size of the model matrix push constant.
pub const PUSH_CONSTANT_SIZE: u32 = 64;

/// Identifies a descriptor set layout. Layouts with equal keys are shared between pipelines.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SetLayoutKey {
    Camera,
    Lights,
    /// `textures` has one bit per bound [`TextureSlot`].
    Material { textures: u32 },
    Ibl { irradiance: bool, prefiltered: bool },
    SkyboxCube,
}

impl SetLayoutKey {
    pub fn bindings(&self) -> Vec<DescriptorBinding> {
        let fragment = vk::ShaderStageFlags::FRAGMENT;
        match *self {
            SetLayoutKey::Camera => vec![DescriptorBinding::uniform_buffer(0, vk::ShaderStageFlags::VERTEX | fragment)],
            SetLayoutKey::Lights => vec![DescriptorBinding::uniform_buffer(0, fragment)],
            SetLayoutKey::Material { textures } => std::iter::once(DescriptorBinding::uniform_buffer(0, fragment))
                .chain(
                    TextureSlot::ALL
                        .iter()
                        .filter(|slot| textures & (1 << **slot as u32) != 0)
                        .map(|slot| DescriptorBinding::sampler(slot.binding(), fragment)),
                )
                .collect(),
            SetLayoutKey::Ibl { irradiance, prefiltered } => {
                let mut bindings = Vec::new();
                if irradiance {
                    bindings.push(DescriptorBinding::sampler(IRRADIANCE_BINDING, fragment));
                }
                if prefiltered {
                    bindings.push(DescriptorBinding::sampler(PREFILTERED_BINDING, fragment));
                }
                bindings
            }
            SetLayoutKey::SkyboxCube => vec![DescriptorBinding::sampler(0, fragment)],
        }
    }

    /// Largest per-set descriptor usage of any layout of this family. Used to size descriptor set pools.
    pub fn family_pool_size(&self) -> DescriptorPoolSize {
        match self {
            SetLayoutKey::Camera | SetLayoutKey::Lights => DescriptorPoolSize::new().with(vk::DescriptorType::UNIFORM_BUFFER, 1),
            SetLayoutKey::Material { .. } => DescriptorPoolSize::new()
                .with(vk::DescriptorType::UNIFORM_BUFFER, 1)
                .with(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, TextureSlot::COUNT as u32),
            SetLayoutKey::Ibl { .. } => DescriptorPoolSize::new().with(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 2),
            SetLayoutKey::SkyboxCube => DescriptorPoolSize::new().with(vk::DescriptorType::COMBINED_IMAGE_SAMPLER, 1),
        }
    }
}

/// Identifies a pipeline layout.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PipelineLayoutKey {
    Forward { textures: u32, irradiance: bool, prefiltered: bool },
    Skybox,
}

impl PipelineLayoutKey {
    pub fn for_id(id: PipelineId) -> Self {
        if id.is_skybox() {
            return PipelineLayoutKey::Skybox;
        }
        let extra = id.extra();
        PipelineLayoutKey::Forward {
            textures: id.material().bound_mask(),
            irradiance: extra.has_irradiance_map(),
            prefiltered: extra.has_prefiltered_map(),
        }
    }

    /// Set layouts in set order.
    pub fn set_layouts(&self) -> Vec<SetLayoutKey> {
        match *self {
            PipelineLayoutKey::Forward {
                textures,
                irradiance,
                prefiltered,
            } => {
                let mut sets = vec![SetLayoutKey::Camera, SetLayoutKey::Lights, SetLayoutKey::Material { textures }];
                if irradiance || prefiltered {
                    sets.push(SetLayoutKey::Ibl { irradiance, prefiltered });
                }
                sets
            }
            PipelineLayoutKey::Skybox => vec![SetLayoutKey::Camera, SetLayoutKey::SkyboxCube],
        }
    }

    pub fn push_constants(&self) -> vk::PushConstantRange {
        vk::PushConstantRange {
            stage_flags: vk::ShaderStageFlags::VERTEX,
            offset: 0,
            size: PUSH_CONSTANT_SIZE,
        }
    }
}
