//! Render techniques turn a filled [`RenderQueue`] into a recorded and submitted command buffer.

use anyhow::Result;
use ash::vk;

use crate::core::device::GraphicsDevice;
use crate::render::queue::RenderQueue;
use crate::render::renderer::Renderer;
use crate::scene::Scene;

pub mod forward;
pub mod uniforms;

/// The swapchain images a technique renders into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderTargets {
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    pub images: Vec<vk::Image>,
    pub views: Vec<vk::ImageView>,
}

impl RenderTargets {
    pub fn image_count(&self) -> usize {
        self.images.len()
    }
}

/// Per view parameters of one frame.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FrameContext {
    pub image_index: u32,
    /// Signaled when the swapchain image may be written. The submission waits on it.
    pub wait: vk::Semaphore,
    /// The first view of a frame discards the previous image contents, later views draw on top of it.
    pub first_view: bool,
    /// Part of the swapchain image this view renders to.
    pub area: vk::Rect2D,
}

/// A way of rendering a queue. One instance is owned by each [`RenderView`](crate::render::view::RenderView).
pub trait Technique<D: GraphicsDevice> {
    fn name(&self) -> &str;

    /// Create per swapchain image state. Called again, after [`Technique::destroy()`], whenever the swapchain
    /// is recreated.
    fn init(&mut self, renderer: &mut Renderer<D>, targets: &RenderTargets) -> Result<()>;

    /// Record and submit the commands for one frame.
    ///
    /// On success, returns the semaphore the submission signals. On failure nothing was submitted, the wait
    /// semaphore in `frame` was not consumed, and every pool reference taken for this frame was dropped.
    fn render(&mut self, renderer: &mut Renderer<D>, scene: &Scene<D>, queue: &RenderQueue, frame: &FrameContext) -> Result<vk::Semaphore>;

    /// Wait for all submitted work, release all pool references and destroy per image state.
    fn destroy(&mut self, renderer: &mut Renderer<D>);
}
