//! Owned synchronization primitives.
//!
//! - [`fence`] wraps `VkFence` objects, used for CPU-GPU sync.
//! - [`semaphore`] wraps `VkSemaphore` objects, used for GPU-GPU sync.

pub mod fence;
pub mod semaphore;
