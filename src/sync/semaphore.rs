use anyhow::Result;
use ash::vk;

use crate::core::device::GraphicsDevice;

/// Owned [`VkSemaphore`](vk::Semaphore). Semaphores are used for GPU-GPU sync.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Semaphore<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    handle: vk::Semaphore,
}

impl<D: GraphicsDevice> Semaphore<D> {
    pub fn new(device: D) -> Result<Self> {
        let handle = device.create_semaphore()?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkSemaphore {handle:p}");
        Ok(Semaphore { device, handle })
    }

    pub fn handle(&self) -> vk::Semaphore {
        self.handle
    }
}

impl<D: GraphicsDevice> Drop for Semaphore<D> {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkSemaphore {:p}", self.handle);
        self.device.destroy_semaphore(self.handle);
    }
}
