//! Implementations of [`GraphicsDevice`](crate::core::device::GraphicsDevice).

pub mod vulkan;
