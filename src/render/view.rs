//! A camera rendered into a rectangle of a window.

use anyhow::Result;
use ash::vk;

use crate::core::device::GraphicsDevice;
use crate::render::queue::RenderQueue;
use crate::render::renderer::Renderer;
use crate::render::technique::{FrameContext, RenderTargets, Technique};
use crate::scene::{CameraKey, Scene};

/// Part of the window a view covers, in normalized coordinates (0 to 1, origin top left).
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self::FULL
    }
}

impl Viewport {
    pub const FULL: Viewport = Viewport {
        x: 0.0,
        y: 0.0,
        width: 1.0,
        height: 1.0,
    };

    /// Pixel rectangle of this viewport in a target of size `extent`, clamped to the target.
    pub fn area(&self, extent: vk::Extent2D) -> vk::Rect2D {
        let x = (self.x.clamp(0.0, 1.0) * extent.width as f32) as u32;
        let y = (self.y.clamp(0.0, 1.0) * extent.height as f32) as u32;
        let width = (self.width.max(0.0) * extent.width as f32) as u32;
        let height = (self.height.max(0.0) * extent.height as f32) as u32;
        vk::Rect2D {
            offset: vk::Offset2D {
                x: x as i32,
                y: y as i32,
            },
            extent: vk::Extent2D {
                width: width.min(extent.width - x.min(extent.width)),
                height: height.min(extent.height - y.min(extent.height)),
            },
        }
    }
}

/// Renders the scene as seen by one camera, with its own technique and render queue.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RenderView<D: GraphicsDevice> {
    name: String,
    camera: Option<CameraKey>,
    viewport: Viewport,
    #[derivative(Debug = "ignore")]
    technique: Box<dyn Technique<D>>,
    queue: RenderQueue,
    /// Whether the view submitted work in the current frame.
    rendered: bool,
}

impl<D: GraphicsDevice> RenderView<D> {
    /// Create a view covering the whole window. `max_lights` is the light capacity of its queue.
    pub fn new(name: impl Into<String>, technique: Box<dyn Technique<D>>, max_lights: usize) -> Self {
        Self {
            name: name.into(),
            camera: None,
            viewport: Viewport::FULL,
            technique,
            queue: RenderQueue::new(max_lights),
            rendered: false,
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn with_camera(mut self, camera: CameraKey) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn camera(&self) -> Option<CameraKey> {
        self.camera
    }

    /// Set the camera to render with. A view without a camera renders nothing.
    pub fn set_camera(&mut self, camera: Option<CameraKey>) {
        self.camera = camera;
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
    }

    pub fn queue(&self) -> &RenderQueue {
        &self.queue
    }

    pub fn technique(&self) -> &dyn Technique<D> {
        self.technique.as_ref()
    }

    pub fn init(&mut self, renderer: &mut Renderer<D>, targets: &RenderTargets) -> Result<()> {
        self.technique.init(renderer, targets)
    }

    /// Fill the queue from the scene and render it into swapchain image `image_index`, waiting on `wait`.
    ///
    /// Returns the semaphore the submission signals, or `None` if the view has no camera or an empty area and
    /// nothing was submitted.
    pub fn render(
        &mut self,
        renderer: &mut Renderer<D>,
        scene: &Scene<D>,
        image_index: u32,
        wait: vk::Semaphore,
        first_view: bool,
        extent: vk::Extent2D,
    ) -> Result<Option<vk::Semaphore>> {
        self.rendered = false;
        let Some(camera) = self.camera else {
            return Ok(None);
        };
        let area = self.viewport.area(extent);
        if area.extent.width == 0 || area.extent.height == 0 {
            return Ok(None);
        }
        scene.update_queue(camera, &mut self.queue, renderer.extra_part())?;
        let frame = FrameContext {
            image_index,
            wait,
            first_view,
            area,
        };
        let signal = self.technique.render(renderer, scene, &self.queue, &frame)?;
        self.rendered = true;
        Ok(Some(signal))
    }

    /// Mark everything this view uploaded for `image_index` as clean.
    pub fn end_frame(&mut self, scene: &mut Scene<D>, image_index: u32) {
        if self.rendered {
            self.queue.clear_dirty(scene, image_index);
            self.rendered = false;
        }
    }

    pub fn destroy(&mut self, renderer: &mut Renderer<D>) {
        self.technique.destroy(renderer);
        self.queue.clear();
        self.rendered = false;
    }
}
