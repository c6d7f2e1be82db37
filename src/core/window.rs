//! Window abstraction the Vulkan surface is created from.
//!
//! Any type that provides raw window handles and reports its client size can be rendered to.
//! With the `winit` feature enabled, `winit::window::Window` works out of the box.

use ash::vk;
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
#[cfg(feature = "winit")]
use winit;

/// Client area size of a window, in physical pixels.
pub trait WindowSize {
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// The size as a Vulkan extent. Swapchains are created with this extent, clamped to the
    /// surface limits.
    fn extent(&self) -> vk::Extent2D {
        vk::Extent2D {
            width: self.width(),
            height: self.height(),
        }
    }

    /// A minimized window has a zero-sized client area and cannot be presented to.
    fn is_minimized(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }
}

#[cfg(feature = "winit")]
impl WindowSize for winit::window::Window {
    fn width(&self) -> u32 {
        self.inner_size().width
    }

    fn height(&self) -> u32 {
        self.inner_size().height
    }
}

/// Anything a surface can be created for.
pub trait Window: WindowSize + HasRawDisplayHandle + HasRawWindowHandle {}
impl<T: WindowSize + HasRawDisplayHandle + HasRawWindowHandle> Window for T {}
