//! Swapchain ownership and the per frame acquire, render and present loop.
//!
//! A [`RenderWindow`] moves through these states:
//!
//! ```text
//! Uninitialized --init--> Initialized --begin_frame--> Rendering --end_frame--> Idle
//!                                                          ^                     |
//!                                                          +-----begin_frame-----+
//! any state --destroy--> Destroyed
//! ```
//!
//! A frame whose rendering fails goes straight from `Rendering` to `Idle` without presenting.
//!
//! Views are rendered in the order they were added. The first view waits on the semaphore signaled by image
//! acquisition, every later view waits on the semaphore of the view before it, and presentation waits on the
//! last one. Image acquisition always uses a spare semaphore, which is then swapped with the semaphore slot of
//! the acquired image.

use anyhow::Result;
use ash::vk;

use crate::core::commands::{SubmitInfo, WaitSemaphore};
use crate::core::device::{AcquiredImage, GraphicsDevice, PresentResult, SwapchainCreateInfo, SwapchainImages};
use crate::core::error::Error;
use crate::core::resources::ImageViewCreateInfo;
use crate::pipeline::cache::RenderTargetFormat;
use crate::render::renderer::Renderer;
use crate::render::technique::RenderTargets;
use crate::render::view::RenderView;
use crate::scene::dirty::DirtyObject;
use crate::scene::Scene;
use crate::sync::semaphore::Semaphore;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum WindowState {
    Uninitialized,
    Initialized,
    Rendering,
    Idle,
    Destroyed,
}

impl WindowState {
    fn name(&self) -> &'static str {
        match self {
            WindowState::Uninitialized => "uninitialized",
            WindowState::Initialized => "initialized",
            WindowState::Rendering => "rendering",
            WindowState::Idle => "idle",
            WindowState::Destroyed => "destroyed",
        }
    }
}

/// What happened to a frame started with [`RenderWindow::frame()`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame was rendered and queued for presentation.
    Presented,
    /// Nothing was presented. Either there was nothing to render, the window is minimized, or rendering failed.
    Skipped,
    /// The swapchain was out of date and has been recreated. Nothing was presented.
    SwapchainRecreated,
}

/// The image acquired for the frame in progress.
#[derive(Debug, Copy, Clone)]
struct AcquiredFrame {
    index: u32,
    /// Semaphore the next submission, or the presentation, has to wait on.
    wait: vk::Semaphore,
}

/// A presentable surface with its swapchain and the views rendered into it.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct RenderWindow<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    state: WindowState,
    extent: vk::Extent2D,
    requested_images: u32,
    swapchain: Option<SwapchainImages>,
    image_views: Vec<vk::ImageView>,
    image_ready: Vec<Semaphore<D>>,
    spare: Option<Semaphore<D>>,
    views: Vec<RenderView<D>>,
    needs_recreate: bool,
    current: Option<AcquiredFrame>,
}

impl<D: GraphicsDevice> RenderWindow<D> {
    /// Create a window in the `Uninitialized` state. Nothing is created on the device until [`RenderWindow::init()`].
    pub fn new(device: D, extent: vk::Extent2D, image_count: u32) -> Self {
        Self {
            device,
            state: WindowState::Uninitialized,
            extent,
            requested_images: image_count,
            swapchain: None,
            image_views: Vec::new(),
            image_ready: Vec::new(),
            spare: None,
            views: Vec::new(),
            needs_recreate: false,
            current: None,
        }
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of images of the current swapchain.
    pub fn image_count(&self) -> usize {
        self.swapchain.as_ref().map(|swapchain| swapchain.images.len()).unwrap_or(0)
    }

    pub fn swapchain(&self) -> Option<&SwapchainImages> {
        self.swapchain.as_ref()
    }

    /// Whether the swapchain will be recreated at the start of the next frame.
    pub fn needs_recreate(&self) -> bool {
        self.needs_recreate
    }

    pub fn views(&self) -> &[RenderView<D>] {
        &self.views
    }

    pub fn view_mut(&mut self, index: usize) -> Option<&mut RenderView<D>> {
        self.views.get_mut(index)
    }

    /// Semaphores acquisition signals, indexed by swapchain image.
    pub fn image_ready_semaphores(&self) -> Vec<vk::Semaphore> {
        self.image_ready.iter().map(Semaphore::handle).collect()
    }

    pub fn spare_semaphore(&self) -> Option<vk::Semaphore> {
        self.spare.as_ref().map(Semaphore::handle)
    }

    /// Add a view. If the window is already initialized, the view's technique is initialized immediately.
    pub fn add_view(&mut self, renderer: &mut Renderer<D>, mut view: RenderView<D>) -> Result<usize> {
        if let Some(targets) = self.targets() {
            view.init(renderer, &targets)?;
        }
        self.views.push(view);
        Ok(self.views.len() - 1)
    }

    /// Create the swapchain and initialize all views.
    /// # Errors
    /// * Fails with [`Error::InvalidState`] unless the window is uninitialized.
    /// * Fails if the swapchain or any view cannot be created.
    pub fn init(&mut self, renderer: &mut Renderer<D>) -> Result<()> {
        self.expect_state(&[WindowState::Uninitialized], "uninitialized")?;
        self.create_swapchain(renderer, vk::SwapchainKHR::null())?;
        self.state = WindowState::Initialized;
        Ok(())
    }

    /// Request a new swapchain extent. The swapchain is recreated at the start of the next frame.
    pub fn resize(&mut self, extent: vk::Extent2D) {
        if extent != self.extent {
            self.extent = extent;
            self.needs_recreate = true;
        }
    }

    /// Acquire the next swapchain image.
    ///
    /// Returns the image index, or `None` if no image could be acquired this frame: the window is minimized, or
    /// the swapchain is out of date, in which case it is recreated at the start of the next frame.
    /// # Errors
    /// * Fails with [`Error::InvalidState`] unless the window is initialized or idle.
    /// * Fails if swapchain recreation or acquisition fails at the device level.
    pub fn begin_frame(&mut self, renderer: &mut Renderer<D>) -> Result<Option<u32>> {
        self.expect_state(&[WindowState::Initialized, WindowState::Idle], "initialized or idle")?;
        if self.extent.width == 0 || self.extent.height == 0 {
            return Ok(None);
        }
        if self.needs_recreate {
            self.recreate(renderer)?;
        }
        renderer.begin_frame();

        let swapchain = self
            .swapchain
            .as_ref()
            .map(|swapchain| swapchain.handle)
            .ok_or(Error::Uncategorized("Window has no swapchain"))?;
        let spare = self.spare.take().ok_or(Error::Uncategorized("Window has no spare semaphore"))?;
        let index = match self.device.acquire_next_image(swapchain, spare.handle()) {
            Ok(AcquiredImage::Index(index)) => index,
            Ok(AcquiredImage::OutOfDate) => {
                debug!("Swapchain out of date while acquiring, recreating it before the next frame");
                self.spare = Some(spare);
                self.needs_recreate = true;
                return Ok(None);
            }
            Err(e) => {
                self.spare = Some(spare);
                return Err(e);
            }
        };
        let Some(slot) = self.image_ready.get_mut(index as usize) else {
            self.spare = Some(spare);
            return Err(Error::InvalidImageIndex(index).into());
        };
        let previous = std::mem::replace(slot, spare);
        self.spare = Some(previous);
        self.current = Some(AcquiredFrame {
            index,
            wait: slot.handle(),
        });
        self.state = WindowState::Rendering;
        Ok(Some(index))
    }

    /// Render every view into the acquired image.
    ///
    /// If any view fails, the error is logged, the pending semaphore is consumed by an empty submission, the
    /// swapchain is scheduled for recreation so the acquired image is released, and the window becomes idle.
    /// The error is then returned. Views that submitted before the failure are not undone.
    pub fn render(&mut self, renderer: &mut Renderer<D>, scene: &Scene<D>) -> Result<()> {
        self.expect_state(&[WindowState::Rendering], "rendering")?;
        let mut frame = self.current.ok_or(Error::Uncategorized("No acquired image"))?;
        let extent = self.swapchain.as_ref().map(|swapchain| swapchain.extent).unwrap_or(self.extent);

        let mut first_view = true;
        let mut failure = None;
        for view in self.views.iter_mut() {
            match view.render(renderer, scene, frame.index, frame.wait, first_view, extent) {
                Ok(Some(signal)) => {
                    frame.wait = signal;
                    first_view = false;
                }
                Ok(None) => {}
                Err(e) => {
                    error!("View {} failed to render image {}: {}", view.name(), frame.index, e);
                    failure = Some(e);
                    break;
                }
            }
        }
        if let Some(e) = failure {
            self.abandon_frame(frame.wait);
            return Err(e);
        }
        if first_view {
            warn!("No view rendered image {}, skipping the frame", frame.index);
            self.abandon_frame(frame.wait);
            return Err(Error::NoCamera.into());
        }
        self.current = Some(frame);
        Ok(())
    }

    /// Present the rendered image and mark everything rendered this frame as clean for the image.
    pub fn end_frame(&mut self, scene: &mut Scene<D>) -> Result<PresentResult> {
        self.expect_state(&[WindowState::Rendering], "rendering")?;
        let frame = self.current.take().ok_or(Error::Uncategorized("No acquired image"))?;
        let swapchain = self.swapchain.as_ref().ok_or(Error::Uncategorized("Window has no swapchain"))?;
        self.state = WindowState::Idle;
        let result = self.device.present(swapchain.handle, frame.index, frame.wait)?;
        if result == PresentResult::OutOfDate {
            debug!("Swapchain out of date while presenting, recreating it before the next frame");
            self.needs_recreate = true;
        }
        for view in self.views.iter_mut() {
            view.end_frame(scene, frame.index);
        }
        Ok(result)
    }

    /// Run one complete frame: acquire, render all views, present.
    ///
    /// Device failures while rendering are logged and reported as [`FrameOutcome::Skipped`]. Only failures
    /// outside of rendering, such as swapchain creation or presentation failing, are returned as errors.
    pub fn frame(&mut self, renderer: &mut Renderer<D>, scene: &mut Scene<D>) -> Result<FrameOutcome> {
        if !self.views.iter().any(|view| view.camera().is_some()) {
            return Ok(FrameOutcome::Skipped);
        }
        if self.begin_frame(renderer)?.is_none() {
            if self.needs_recreate && self.extent.width != 0 && self.extent.height != 0 {
                self.recreate(renderer)?;
                return Ok(FrameOutcome::SwapchainRecreated);
            }
            return Ok(FrameOutcome::Skipped);
        }
        if self.render(renderer, scene).is_err() {
            return Ok(FrameOutcome::Skipped);
        }
        self.end_frame(scene)?;
        Ok(FrameOutcome::Presented)
    }

    /// Wait for the device, destroy all views and the swapchain.
    pub fn destroy(&mut self, renderer: &mut Renderer<D>) {
        if self.state == WindowState::Destroyed {
            return;
        }
        if let Err(e) = self.device.wait_idle() {
            error!("Failed to wait for the device before destroying the window: {}", e);
        }
        for view in self.views.iter_mut() {
            view.destroy(renderer);
        }
        self.destroy_swapchain();
        self.current = None;
        self.state = WindowState::Destroyed;
        info!("Destroyed render window");
    }

    fn expect_state(&self, allowed: &[WindowState], expected: &'static str) -> Result<()> {
        if allowed.contains(&self.state) {
            Ok(())
        } else {
            Err(Error::InvalidState {
                expected,
                found: self.state.name(),
            }
            .into())
        }
    }

    fn targets(&self) -> Option<RenderTargets> {
        self.swapchain.as_ref().map(|swapchain| RenderTargets {
            format: swapchain.format.format,
            extent: swapchain.extent,
            images: swapchain.images.clone(),
            views: self.image_views.clone(),
        })
    }

    /// Consume the pending wait semaphore without rendering, and release the acquired image through recreation.
    fn abandon_frame(&mut self, wait: vk::Semaphore) {
        let drain = self.device.submit(&SubmitInfo {
            wait: &[WaitSemaphore {
                semaphore: wait,
                stage: vk::PipelineStageFlags2::ALL_COMMANDS,
            }],
            ..Default::default()
        });
        if let Err(e) = drain {
            error!("Failed to drain the semaphore of an abandoned frame: {}", e);
        }
        self.current = None;
        self.needs_recreate = true;
        self.state = WindowState::Idle;
    }

    fn create_swapchain(&mut self, renderer: &mut Renderer<D>, old_swapchain: vk::SwapchainKHR) -> Result<()> {
        let swapchain = self.device.create_swapchain(&SwapchainCreateInfo {
            extent: self.extent,
            image_count: self.requested_images,
            old_swapchain,
        })?;
        if swapchain.images.len() > DirtyObject::MAX_IMAGES as usize {
            let count = swapchain.images.len();
            self.device.destroy_swapchain(swapchain.handle);
            return Err(Error::TooManySwapchainImages(count).into());
        }
        if let Err(e) = renderer.reserve_images(swapchain.images.len() as u32) {
            self.device.destroy_swapchain(swapchain.handle);
            return Err(e);
        }
        let mut image_views = Vec::with_capacity(swapchain.images.len());
        for image in &swapchain.images {
            let view = self
                .device
                .create_image_view(&ImageViewCreateInfo::new_2d(*image, swapchain.format.format, vk::ImageAspectFlags::COLOR));
            match view {
                Ok(view) => image_views.push(view),
                Err(e) => {
                    image_views.into_iter().for_each(|view| self.device.destroy_image_view(view));
                    self.device.destroy_swapchain(swapchain.handle);
                    return Err(e);
                }
            }
        }
        info!(
            "Created swapchain with {} images ({}x{}, {:?})",
            swapchain.images.len(),
            swapchain.extent.width,
            swapchain.extent.height,
            swapchain.format.format
        );
        self.extent = swapchain.extent;
        self.swapchain = Some(swapchain);
        self.image_views = image_views;

        self.image_ready = (0..self.image_views.len())
            .map(|_| Semaphore::new(self.device.clone()))
            .collect::<Result<Vec<_>>>()?;
        self.spare = Some(Semaphore::new(self.device.clone())?);

        let targets = self.targets().ok_or(Error::Uncategorized("Window has no swapchain"))?;
        renderer.pipelines_mut().set_target(RenderTargetFormat {
            color: targets.format,
            depth: self.device.limits().depth_format,
        });
        for view in self.views.iter_mut() {
            view.init(renderer, &targets)?;
        }
        Ok(())
    }

    fn recreate(&mut self, renderer: &mut Renderer<D>) -> Result<()> {
        self.device.wait_idle()?;
        for view in self.views.iter_mut() {
            view.destroy(renderer);
        }
        let old = self.swapchain.take();
        for view in self.image_views.drain(..) {
            self.device.destroy_image_view(view);
        }
        let old_handle = old.as_ref().map(|swapchain| swapchain.handle).unwrap_or_default();
        let result = self.create_swapchain(renderer, old_handle);
        if let Some(old) = old {
            self.device.destroy_swapchain(old.handle);
        }
        result?;
        self.needs_recreate = false;
        Ok(())
    }

    fn destroy_swapchain(&mut self) {
        for view in self.image_views.drain(..) {
            self.device.destroy_image_view(view);
        }
        if let Some(swapchain) = self.swapchain.take() {
            self.device.destroy_swapchain(swapchain.handle);
        }
        self.image_ready.clear();
        self.spare = None;
    }
}

impl<D: GraphicsDevice> Drop for RenderWindow<D> {
    fn drop(&mut self) {
        if self.swapchain.is_some() {
            if let Err(e) = self.device.wait_idle() {
                error!("Failed to wait for the device before dropping the window: {}", e);
            }
            self.destroy_swapchain();
        }
    }
}
