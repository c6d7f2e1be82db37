use ash::vk;

use crate::pipeline::id::PipelineId;
use crate::pipeline::vertex::VertexInput;

/// Depth state of a graphics pipeline.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DepthState {
    pub test: bool,
    pub write: bool,
    pub compare: vk::CompareOp,
}

impl Default for DepthState {
    fn default() -> Self {
        Self {
            test: true,
            write: true,
            compare: vk::CompareOp::LESS,
        }
    }
}

/// Everything needed to compile one pipeline variant for dynamic rendering.
/// Viewport and scissor are always dynamic state.
#[derive(Debug, Clone)]
pub struct GraphicsPipelineCreateInfo {
    pub id: PipelineId,
    pub layout: vk::PipelineLayout,
    pub vertex_shader: vk::ShaderModule,
    pub fragment_shader: vk::ShaderModule,
    pub vertex_input: VertexInput,
    pub topology: vk::PrimitiveTopology,
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub depth: DepthState,
    pub samples: vk::SampleCountFlags,
    pub blend: bool,
    pub color_format: vk::Format,
    pub depth_format: vk::Format,
}

impl GraphicsPipelineCreateInfo {
    /// Whether primitive restart is enabled. Only strip and fan topologies support it.
    pub fn primitive_restart(&self) -> bool {
        matches!(
            self.topology,
            vk::PrimitiveTopology::LINE_STRIP | vk::PrimitiveTopology::TRIANGLE_STRIP | vk::PrimitiveTopology::TRIANGLE_FAN
        )
    }
}
