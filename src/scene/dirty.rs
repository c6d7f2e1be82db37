//! Per swapchain image dirty tracking for objects mirrored in GPU memory.

/// Dirty state of a CPU-side object with a GPU copy per swapchain image.
///
/// Each swapchain image has its own copy of the object's uniform data, so the object keeps one dirty bit per
/// image. Mutating the object sets every bit. Once a frame for image `i` has uploaded the data and presented,
/// bit `i` is cleared. New objects start dirty for every image.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DirtyObject {
    mask: u32,
}

impl Default for DirtyObject {
    fn default() -> Self {
        Self {
            mask: u32::MAX,
        }
    }
}

impl DirtyObject {
    /// Maximum number of swapchain images that can be tracked.
    pub const MAX_IMAGES: u32 = u32::BITS;

    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the object as modified for all images.
    pub fn set_dirty(&mut self) {
        self.mask = u32::MAX;
    }

    /// Whether the copy for `image` is out of date.
    pub fn is_dirty(&self, image: u32) -> bool {
        image >= Self::MAX_IMAGES || self.mask & (1 << image) != 0
    }

    /// Whether any image's copy is out of date.
    pub fn is_dirty_any(&self) -> bool {
        self.mask != 0
    }

    /// Mark the copy for `image` as up to date.
    pub fn clear_dirty(&mut self, image: u32) {
        if image < Self::MAX_IMAGES {
            self.mask &= !(1 << image);
        }
    }
}

/// An object whose data is mirrored in GPU memory and re-uploaded only when it changed.
pub trait GpuBacked {
    fn dirty(&self) -> &DirtyObject;
    fn dirty_mut(&mut self) -> &mut DirtyObject;

    fn mark_dirty(&mut self) {
        self.dirty_mut().set_dirty();
    }

    fn is_dirty(&self, image: u32) -> bool {
        self.dirty().is_dirty(image)
    }

    fn clear_dirty(&mut self, image: u32) {
        self.dirty_mut().clear_dirty(image);
    }
}
