//! Command recording and submission parameters.

use ash::vk;

/// Global memory dependency, recorded with synchronization2 semantics.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MemoryBarrier {
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

/// Image layout transition over all mips and the given number of layers.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ImageBarrier {
    pub image: vk::Image,
    pub aspect: vk::ImageAspectFlags,
    pub layers: u32,
    pub old_layout: vk::ImageLayout,
    pub new_layout: vk::ImageLayout,
    pub src_stage: vk::PipelineStageFlags2,
    pub src_access: vk::AccessFlags2,
    pub dst_stage: vk::PipelineStageFlags2,
    pub dst_access: vk::AccessFlags2,
}

/// How an attachment is initialized when rendering begins.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum AttachmentLoad {
    Clear([f32; 4]),
    ClearDepth(f32),
    Load,
    DontCare,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RenderingAttachment {
    pub view: vk::ImageView,
    pub layout: vk::ImageLayout,
    pub load: AttachmentLoad,
    pub store: bool,
    /// Multisampled attachments are resolved into this view at the end of rendering.
    pub resolve: Option<(vk::ImageView, vk::ImageLayout)>,
}

/// Parameters for a dynamic rendering scope.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderingInfo {
    pub area: vk::Rect2D,
    pub color: RenderingAttachment,
    pub depth: Option<RenderingAttachment>,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct WaitSemaphore {
    pub semaphore: vk::Semaphore,
    pub stage: vk::PipelineStageFlags2,
}

/// A single queue submission. An empty `command_buffers` slice is allowed and only moves
/// the semaphores and fence along.
#[derive(Debug, Default, Copy, Clone)]
pub struct SubmitInfo<'a> {
    pub command_buffers: &'a [vk::CommandBuffer],
    pub wait: &'a [WaitSemaphore],
    pub signal: &'a [vk::Semaphore],
    pub fence: Option<vk::Fence>,
}
