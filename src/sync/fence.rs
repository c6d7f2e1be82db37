use anyhow::Result;
use ash::vk;

use crate::core::device::GraphicsDevice;

/// Owned [`VkFence`](vk::Fence). Fences are used for CPU-GPU sync.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Fence<D: GraphicsDevice> {
    #[derivative(Debug = "ignore")]
    device: D,
    handle: vk::Fence,
}

impl<D: GraphicsDevice> Fence<D> {
    /// Create a new fence, possibly in the signaled status.
    pub fn new(device: D, signaled: bool) -> Result<Self> {
        let handle = device.create_fence(signaled)?;
        #[cfg(feature = "log-objects")]
        trace!("Created new VkFence {handle:p}");
        Ok(Fence { device, handle })
    }

    /// Waits for the fence to be signaled with no timeout. This is a blocking call.
    pub fn wait(&self) -> Result<()> {
        self.device.wait_for_fence(self.handle)
    }

    /// Resets the fence to the unsignaled status.
    pub fn reset(&self) -> Result<()> {
        self.device.reset_fence(self.handle)
    }

    pub fn handle(&self) -> vk::Fence {
        self.handle
    }
}

impl<D: GraphicsDevice> Drop for Fence<D> {
    fn drop(&mut self) {
        #[cfg(feature = "log-objects")]
        trace!("Destroying VkFence {:p}", self.handle);
        self.device.destroy_fence(self.handle);
    }
}
