//! Forward rendering on Vulkan 1.3, built around pooled GPU resources.
//!
//! Lugdunum turns a scene graph into frames. Uniform buffer ranges and descriptor sets are pooled and
//! keyed by the object they mirror, so an unchanged camera, light list or material is written to the
//! GPU once per swapchain image and then reused. Pipelines are compiled lazily, one per
//! [`PipelineId`](crate::pipeline::id::PipelineId) variant.
//!
//! Everything above [`GraphicsDevice`](crate::core::device::GraphicsDevice) is device agnostic. The Vulkan
//! implementation is [`VulkanDevice`](crate::backend::vulkan::VulkanDevice).
//!
//! # Example
//!
//! For illustrative purposes, we will use winit here. Any window that provides raw window handles and
//! implements [`WindowSize`](crate::core::window::WindowSize) can be rendered to.
//! ```no_run
//! use lugdunum::prelude::*;
//! use winit::event_loop::EventLoopBuilder;
//! use winit::window::WindowBuilder;
//!
//! # fn main() -> anyhow::Result<()> {
//! let event_loop = EventLoopBuilder::new().build();
//! let window = WindowBuilder::new()
//!     .with_title("Lugdunum demo")
//!     .build(&event_loop)?;
//!
//! let settings = AppBuilder::new()
//!     .name("Lugdunum demo")
//!     .validation(true)
//!     .window(&window)
//!     .present_mode(vk::PresentModeKHR::MAILBOX)
//!     .antialiasing(Antialiasing::Msaa4x)
//!     .build();
//!
//! let device = VulkanDevice::new(&settings)?;
//! let mut renderer = Renderer::new(device.clone(), settings.render.clone(), Box::new(SpirvDirectory::new("shaders")))?;
//!
//! let mut scene = Scene::new();
//! let camera = scene.add_camera(Camera::perspective("main"));
//! scene.add_node(None, Node::new("camera").with_camera(camera))?;
//!
//! let mut window_target = RenderWindow::new(device.clone(), window.extent(), settings.render.image_count);
//! window_target.init(&mut renderer)?;
//! let view = RenderView::new("main", Box::new(Forward::new(device.clone())), settings.render.max_lights).with_camera(camera);
//! window_target.add_view(&mut renderer, view)?;
//!
//! // Once per frame
//! window_target.frame(&mut renderer, &mut scene)?;
//!
//! window_target.destroy(&mut renderer);
//! # Ok(())
//! # }
//! ```

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub use crate::prelude::*;

pub mod allocator;
pub mod backend;
pub mod core;
pub mod descriptor;
pub mod pipeline;
pub mod prelude;
pub mod render;
pub mod scene;
pub mod sync;
pub mod util;
