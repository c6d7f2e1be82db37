//! The renderer owns every shared GPU resource pool and the pipeline cache.
//!
//! There is one renderer per device. Techniques borrow it mutably while they record a frame, so no pool is ever
//! accessed from two places at once.

use std::collections::HashSet;

use anyhow::Result;
use ash::vk;

use crate::allocator::buffer_pool::{BufferPool, BufferPoolInfo, SubBufferId};
use crate::core::app_info::{Antialiasing, DisplayMode, RenderSettings};
use crate::core::device::GraphicsDevice;
use crate::core::error::Error;
use crate::descriptor::descriptor_pool::DescriptorSetPool;
use crate::descriptor::descriptor_set::DescriptorSetId;
use crate::pipeline::cache::{PipelineCache, RenderTargetFormat};
use crate::pipeline::id::ExtraPart;
use crate::pipeline::set_layout::SetLayoutKey;
use crate::pipeline::shader::ShaderLoader;
use crate::render::technique::uniforms::{light_buffer_size, light_capacity, CameraUniform, MaterialUniform};

/// Name of the technique shaders are loaded for.
pub const FORWARD_TECHNIQUE: &str = "forward";

/// A reference a technique holds on a pooled resource until the frame that used it completed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum HeldResource {
    CameraBuffer(SubBufferId),
    LightBuffer(SubBufferId),
    MaterialBuffer(SubBufferId),
    CameraSet(DescriptorSetId),
    LightSet(DescriptorSetId),
    MaterialSet(DescriptorSetId),
    IblSet(DescriptorSetId),
    SkyboxSet(DescriptorSetId),
}

/// All pools shared by the techniques of a renderer.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RenderPools<D: GraphicsDevice> {
    pub camera_buffers: BufferPool<D>,
    pub light_buffers: BufferPool<D>,
    pub material_buffers: BufferPool<D>,
    pub camera_sets: DescriptorSetPool<D>,
    pub light_sets: DescriptorSetPool<D>,
    pub material_sets: DescriptorSetPool<D>,
    pub ibl_sets: DescriptorSetPool<D>,
    pub skybox_sets: DescriptorSetPool<D>,
    /// Swapchain images the descriptor set pools are sized for.
    images: u32,
}

struct SetPools<D: GraphicsDevice> {
    camera: DescriptorSetPool<D>,
    lights: DescriptorSetPool<D>,
    material: DescriptorSetPool<D>,
    ibl: DescriptorSetPool<D>,
    skybox: DescriptorSetPool<D>,
}

impl<D: GraphicsDevice> SetPools<D> {
    /// Every object holds one set per swapchain image, so each pool gets `max_sets * images` sets.
    fn new(device: &D, settings: &RenderSettings, images: u32) -> Result<Self> {
        let pools = &settings.pools;
        let set_pool = |name: &str, max_sets: u32, family: SetLayoutKey| {
            DescriptorSetPool::new(device.clone(), name, max_sets.saturating_mul(images), &family.family_pool_size())
        };
        Ok(Self {
            camera: set_pool("camera", pools.camera_max_sets, SetLayoutKey::Camera)?,
            lights: set_pool("lights", pools.light_max_sets, SetLayoutKey::Lights)?,
            material: set_pool("material", pools.material_max_sets, SetLayoutKey::Material { textures: 0 })?,
            ibl: set_pool(
                "ibl",
                pools.ibl_max_sets,
                SetLayoutKey::Ibl {
                    irradiance: true,
                    prefiltered: true,
                },
            )?,
            skybox: set_pool("skybox", pools.skybox_max_sets, SetLayoutKey::SkyboxCube)?,
        })
    }
}

impl<D: GraphicsDevice> RenderPools<D> {
    fn new(device: &D, settings: &RenderSettings) -> Result<Self> {
        let pools = &settings.pools;
        let images = settings.image_count.max(1);
        let buffer_pool = |name: &str, per_chunk: u32, size: usize| {
            BufferPool::new(device.clone(), BufferPoolInfo::uniform(name, per_chunk, size as vk::DeviceSize))
        };
        let sets = SetPools::new(device, settings, images)?;
        Ok(Self {
            camera_buffers: buffer_pool("camera", pools.camera_sub_buffers_per_chunk, std::mem::size_of::<CameraUniform>())?,
            light_buffers: buffer_pool(
                "lights",
                pools.light_sub_buffers_per_chunk,
                light_buffer_size(settings.max_lights) as usize,
            )?,
            material_buffers: buffer_pool(
                "material",
                pools.material_sub_buffers_per_chunk,
                std::mem::size_of::<MaterialUniform>(),
            )?,
            camera_sets: sets.camera,
            light_sets: sets.lights,
            material_sets: sets.material,
            ibl_sets: sets.ibl,
            skybox_sets: sets.skybox,
            images,
        })
    }

    /// Swapchain images the descriptor set pools are sized for.
    pub fn image_capacity(&self) -> u32 {
        self.images
    }

    fn sets_in_use(&self) -> usize {
        [&self.camera_sets, &self.light_sets, &self.material_sets, &self.ibl_sets, &self.skybox_sets]
            .iter()
            .map(|pool| pool.in_use_count())
            .sum()
    }

    /// Recreate the descriptor set pools for `images` swapchain images. Only possible while no set is in use.
    fn grow_sets(&mut self, device: &D, settings: &RenderSettings, images: u32) -> Result<()> {
        if self.sets_in_use() > 0 {
            return Err(Error::PoolsInUse(images).into());
        }
        let sets = SetPools::new(device, settings, images)?;
        self.camera_sets = sets.camera;
        self.light_sets = sets.lights;
        self.material_sets = sets.material;
        self.ibl_sets = sets.ibl;
        self.skybox_sets = sets.skybox;
        self.images = images;
        Ok(())
    }

    /// Drop the reference a technique held on a pooled resource.
    pub fn release(&mut self, held: HeldResource) -> Result<()> {
        match held {
            HeldResource::CameraBuffer(id) => self.camera_buffers.free(id),
            HeldResource::LightBuffer(id) => self.light_buffers.free(id),
            HeldResource::MaterialBuffer(id) => self.material_buffers.free(id),
            HeldResource::CameraSet(id) => self.camera_sets.free(id),
            HeldResource::LightSet(id) => self.light_sets.free(id),
            HeldResource::MaterialSet(id) => self.material_sets.free(id),
            HeldResource::IblSet(id) => self.ibl_sets.free(id),
            HeldResource::SkyboxSet(id) => self.skybox_sets.free(id),
        }
    }

    /// Release every resource in `held`. Failures are logged, the remaining resources are still released.
    pub fn release_all(&mut self, held: impl IntoIterator<Item = HeldResource>) {
        for resource in held {
            if let Err(e) = self.release(resource) {
                error!("Failed to release {:?}: {}", resource, e);
            }
        }
    }
}

/// Owner of the resource pools and the pipeline cache, plus the global render settings that select pipeline
/// variants.
///
/// # Example
/// ```
/// # use lugdunum::*;
/// # use anyhow::Result;
/// # fn example<D: GraphicsDevice>(device: D) -> Result<()> {
/// let settings = RenderSettings::default();
/// let mut renderer = Renderer::new(device, settings, Box::new(SpirvDirectory::new("shaders")))?;
/// renderer.set_display_mode(DisplayMode::Normal);
/// assert_eq!(renderer.extra_part().display_mode(), DisplayMode::Normal);
/// # Ok(())
/// # }
/// ```
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Renderer<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    settings: RenderSettings,
    pools: RenderPools<D>,
    pipelines: PipelineCache<D>,
    /// Pool hashes written during the current frame. Views sharing an object upload it once.
    uploaded: HashSet<u64>,
}

impl<D: GraphicsDevice> Renderer<D> {
    /// Create the pools and an empty pipeline cache.
    /// # Errors
    /// Fails if any pool cannot be created, for example if a pool setting is zero.
    pub fn new(device: D, mut settings: RenderSettings, loader: Box<dyn ShaderLoader>) -> Result<Self> {
        settings.antialiasing = supported_antialiasing(settings.antialiasing, device.limits().framebuffer_sample_counts);
        let capacity = light_capacity(&device.limits());
        if settings.max_lights > capacity {
            warn!(
                "{} lights do not fit in one light buffer on this device, limiting to {}",
                settings.max_lights, capacity
            );
            settings.max_lights = capacity;
        }
        let pools = RenderPools::new(&device, &settings)?;
        let target = RenderTargetFormat {
            color: vk::Format::UNDEFINED,
            depth: device.limits().depth_format,
        };
        let pipelines = PipelineCache::new(device.clone(), FORWARD_TECHNIQUE, loader, target);
        info!(
            "Created renderer (display mode {:?}, antialiasing {:?}, {} lights)",
            settings.display_mode, settings.antialiasing, settings.max_lights
        );
        Ok(Self {
            device,
            settings,
            pools,
            pipelines,
            uploaded: HashSet::new(),
        })
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    pub fn pools(&self) -> &RenderPools<D> {
        &self.pools
    }

    pub fn pools_mut(&mut self) -> &mut RenderPools<D> {
        &mut self.pools
    }

    pub fn pipelines(&self) -> &PipelineCache<D> {
        &self.pipelines
    }

    pub fn pipelines_mut(&mut self) -> &mut PipelineCache<D> {
        &mut self.pipelines
    }

    /// Borrow the pools and the pipeline cache at the same time.
    pub fn split_mut(&mut self) -> (&mut RenderPools<D>, &mut PipelineCache<D>) {
        (&mut self.pools, &mut self.pipelines)
    }

    pub fn display_mode(&self) -> DisplayMode {
        self.settings.display_mode
    }

    /// Switch the display mode. Pipelines for the new mode are compiled on first use.
    pub fn set_display_mode(&mut self, mode: DisplayMode) {
        if self.settings.display_mode != mode {
            info!("Display mode changed to {:?}", mode);
            self.settings.display_mode = mode;
        }
    }

    pub fn antialiasing(&self) -> Antialiasing {
        self.settings.antialiasing
    }

    /// Switch the antialiasing mode. Modes the device cannot render fall back to the next lower supported one.
    /// Returns the mode actually selected.
    pub fn set_antialiasing(&mut self, antialiasing: Antialiasing) -> Antialiasing {
        let selected = supported_antialiasing(antialiasing, self.device.limits().framebuffer_sample_counts);
        if selected != antialiasing {
            warn!("Antialiasing {:?} is not supported, using {:?}", antialiasing, selected);
        }
        if self.settings.antialiasing != selected {
            info!("Antialiasing changed to {:?}", selected);
            self.settings.antialiasing = selected;
        }
        selected
    }

    /// Most lights a light buffer holds. Lights past this are not uploaded.
    pub fn max_lights(&self) -> usize {
        self.settings.max_lights
    }

    /// Make sure the descriptor set pools have room for a swapchain of `images` images.
    ///
    /// Pools are only ever grown. Growing recreates them, which fails with [`Error::PoolsInUse`] while any
    /// technique still holds a set.
    pub fn reserve_images(&mut self, images: u32) -> Result<()> {
        if images <= self.pools.image_capacity() {
            return Ok(());
        }
        info!(
            "Growing descriptor set pools from {} to {} swapchain images",
            self.pools.image_capacity(),
            images
        );
        self.pools.grow_sets(&self.device, &self.settings, images)
    }

    /// The render settings part of pipeline ids. Image based lighting bits are added per queue.
    pub fn extra_part(&self) -> ExtraPart {
        ExtraPart::new(self.settings.display_mode, self.settings.antialiasing)
    }

    /// Start a new frame.
    pub fn begin_frame(&mut self) {
        self.uploaded.clear();
    }

    /// Whether the object with this pool hash was already written this frame.
    pub fn was_uploaded(&self, hash: u64) -> bool {
        self.uploaded.contains(&hash)
    }

    /// Record that the object with this pool hash was written this frame.
    pub fn mark_uploaded(&mut self, hash: u64) {
        self.uploaded.insert(hash);
    }
}

/// Highest antialiasing mode not above `requested` whose sample count is in `supported`.
pub fn supported_antialiasing(requested: Antialiasing, supported: vk::SampleCountFlags) -> Antialiasing {
    Antialiasing::ALL
        .iter()
        .rev()
        .filter(|mode| **mode as u32 <= requested as u32)
        .find(|mode| supported.contains(mode.sample_count()))
        .copied()
        .unwrap_or(Antialiasing::None)
}
