//! Lazily compiled pipeline variants, keyed by [`PipelineId`].
//!
//! The cache also owns every descriptor set layout and pipeline layout, so pipelines with compatible layouts share
//! them and descriptor sets allocated for one variant can be bound with any other variant of the same family.
//! Entries are never evicted while the cache lives.

use std::collections::HashMap;

use anyhow::Result;
use ash::vk;

use crate::core::device::GraphicsDevice;
use crate::pipeline::create_info::{DepthState, GraphicsPipelineCreateInfo};
use crate::pipeline::id::PipelineId;
use crate::pipeline::set_layout::{PipelineLayoutKey, SetLayoutKey};
use crate::pipeline::shader::{ShaderLoader, ShaderStage};
use crate::pipeline::vertex::VertexInput;

/// A compiled pipeline variant and the layout it was created with. Both handles are owned by the cache.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Pipeline {
    pub id: PipelineId,
    pub handle: vk::Pipeline,
    pub layout: vk::PipelineLayout,
}

/// Attachment formats pipelines are compiled for. The sample count comes from each pipeline id.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct RenderTargetFormat {
    pub color: vk::Format,
    pub depth: vk::Format,
}

/// The main pipeline cache struct.
/// # Example usage
/// ```
/// # use lugdunum::*;
/// # use anyhow::Result;
/// # fn example<D: GraphicsDevice>(device: D, id: PipelineId) -> Result<()> {
/// let target = RenderTargetFormat {
///     color: vk::Format::B8G8R8A8_SRGB,
///     depth: vk::Format::D32_SFLOAT,
/// };
/// let mut cache = PipelineCache::new(device, "forward", Box::new(SpirvDirectory::new("shaders")), target);
/// let pipeline = cache.get_or_create(id)?;
/// // The second lookup is a plain map access.
/// assert_eq!(cache.get_or_create(id)?, pipeline);
/// # Ok(())
/// # }
/// ```
#[derive(Derivative)]
#[derivative(Debug)]
pub struct PipelineCache<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    technique: String,
    #[derivative(Debug = "ignore")]
    loader: Box<dyn ShaderLoader>,
    target: RenderTargetFormat,
    set_layouts: HashMap<SetLayoutKey, vk::DescriptorSetLayout>,
    pipeline_layouts: HashMap<PipelineLayoutKey, vk::PipelineLayout>,
    pipelines: HashMap<PipelineId, Pipeline>,
    compilations: usize,
}

impl<D: GraphicsDevice> PipelineCache<D> {
    /// Create a new empty pipeline cache. Shaders are looked up under `technique` in the loader.
    pub fn new(device: D, technique: impl Into<String>, loader: Box<dyn ShaderLoader>, target: RenderTargetFormat) -> Self {
        Self {
            device,
            technique: technique.into(),
            loader,
            target,
            set_layouts: HashMap::new(),
            pipeline_layouts: HashMap::new(),
            pipelines: HashMap::new(),
            compilations: 0,
        }
    }

    /// Obtain the pipeline for `id`, compiling it on first use.
    ///
    /// Compilation is synchronous and may take several milliseconds, so the first frame that uses a new
    /// combination of vertex layout, material textures and render settings can stall.
    /// # Errors
    /// - Fails if the shaders for the variant cannot be loaded.
    /// - Fails if the device cannot create the shader modules, layouts or the pipeline.
    pub fn get_or_create(&mut self, id: PipelineId) -> Result<Pipeline> {
        if let Some(pipeline) = self.pipelines.get(&id) {
            return Ok(*pipeline);
        }
        let pipeline = self.compile(id).map_err(|e| {
            error!("Failed to compile pipeline {} ({}): {}", id, self.technique, e);
            e
        })?;
        self.pipelines.insert(id, pipeline);
        Ok(pipeline)
    }

    /// Look up an already compiled pipeline.
    pub fn get(&self, id: PipelineId) -> Option<Pipeline> {
        self.pipelines.get(&id).copied()
    }

    /// Get or create the descriptor set layout for `key`.
    pub fn set_layout(&mut self, key: SetLayoutKey) -> Result<vk::DescriptorSetLayout> {
        if let Some(layout) = self.set_layouts.get(&key) {
            return Ok(*layout);
        }
        let layout = self.device.create_descriptor_set_layout(&key.bindings())?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkDescriptorSetLayout {layout:p} for {key:?}");
        self.set_layouts.insert(key, layout);
        Ok(layout)
    }

    /// Get or create the pipeline layout for `key`, creating its set layouts as needed.
    pub fn pipeline_layout(&mut self, key: PipelineLayoutKey) -> Result<vk::PipelineLayout> {
        if let Some(layout) = self.pipeline_layouts.get(&key) {
            return Ok(*layout);
        }
        let set_layouts = key
            .set_layouts()
            .into_iter()
            .map(|set| self.set_layout(set))
            .collect::<Result<Vec<_>>>()?;
        let layout = self
            .device
            .create_pipeline_layout(&set_layouts, std::slice::from_ref(&key.push_constants()))?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkPipelineLayout {layout:p} for {key:?}");
        self.pipeline_layouts.insert(key, layout);
        Ok(layout)
    }

    /// Change the attachment formats. Pipelines compiled for other formats are destroyed and recompiled on next use.
    /// The caller must make sure none of them is still in use by the device.
    pub fn set_target(&mut self, target: RenderTargetFormat) {
        if target == self.target {
            return;
        }
        debug!("Render target format changed to {:?}, dropping {} pipelines", target, self.pipelines.len());
        self.destroy_pipelines();
        self.target = target;
    }

    pub fn target(&self) -> RenderTargetFormat {
        self.target
    }

    /// Number of pipelines currently cached.
    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }

    /// Total number of pipeline compilations so far.
    pub fn compilations(&self) -> usize {
        self.compilations
    }

    pub fn technique(&self) -> &str {
        &self.technique
    }

    fn compile(&mut self, id: PipelineId) -> Result<Pipeline> {
        let layout = self.pipeline_layout(PipelineLayoutKey::for_id(id))?;
        let vertex_code = self.loader.load(&self.technique, id, ShaderStage::Vertex)?;
        let fragment_code = self.loader.load(&self.technique, id, ShaderStage::Fragment)?;
        let vertex_shader = self.device.create_shader_module(&vertex_code)?;
        let fragment_shader = match self.device.create_shader_module(&fragment_code) {
            Ok(module) => module,
            Err(e) => {
                self.device.destroy_shader_module(vertex_shader);
                return Err(e);
            }
        };

        let extra = id.extra();
        let info = if id.is_skybox() {
            GraphicsPipelineCreateInfo {
                id,
                layout,
                vertex_shader,
                fragment_shader,
                vertex_input: VertexInput::default(),
                topology: vk::PrimitiveTopology::TRIANGLE_LIST,
                cull_mode: vk::CullModeFlags::NONE,
                front_face: vk::FrontFace::COUNTER_CLOCKWISE,
                depth: DepthState {
                    test: true,
                    write: false,
                    compare: vk::CompareOp::LESS_OR_EQUAL,
                },
                samples: extra.antialiasing().sample_count(),
                blend: false,
                color_format: self.target.color,
                depth_format: self.target.depth,
            }
        } else {
            let primitive = id.primitive();
            GraphicsPipelineCreateInfo {
                id,
                layout,
                vertex_shader,
                fragment_shader,
                vertex_input: VertexInput::from_part(primitive),
                topology: primitive.topology().to_vk(),
                cull_mode: vk::CullModeFlags::BACK,
                front_face: vk::FrontFace::COUNTER_CLOCKWISE,
                depth: DepthState::default(),
                samples: extra.antialiasing().sample_count(),
                blend: false,
                color_format: self.target.color,
                depth_format: self.target.depth,
            }
        };

        let handle = self.device.create_graphics_pipeline(&info);
        // Modules are only needed during pipeline creation.
        self.device.destroy_shader_module(vertex_shader);
        self.device.destroy_shader_module(fragment_shader);
        let handle = handle?;

        self.compilations += 1;
        debug!("Compiled pipeline {} for technique {}", id, self.technique);
        #[cfg(feature = "log-objects")]
        trace!("Created new VkPipeline {handle:p}");
        Ok(Pipeline {
            id,
            handle,
            layout,
        })
    }

    fn destroy_pipelines(&mut self) {
        for (_, pipeline) in self.pipelines.drain() {
            #[cfg(feature = "log-objects")]
            trace!("Destroying VkPipeline {:p}", pipeline.handle);
            self.device.destroy_pipeline(pipeline.handle);
        }
    }
}

impl<D: GraphicsDevice> Drop for PipelineCache<D> {
    fn drop(&mut self) {
        self.destroy_pipelines();
        for (_, layout) in self.pipeline_layouts.drain() {
            self.device.destroy_pipeline_layout(layout);
        }
        for (_, layout) in self.set_layouts.drain() {
            self.device.destroy_descriptor_set_layout(layout);
        }
    }
}
