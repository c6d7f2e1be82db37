//! Turning a scene into frames: render queues, techniques, views and the window frame loop.

pub mod attachment;
pub mod queue;
pub mod renderer;
pub mod technique;
pub mod view;
pub mod window;
