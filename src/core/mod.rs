//! The core module holds the device abstraction, its parameter types and the crate-wide settings and errors.

pub mod app_info;
pub mod commands;
pub mod device;
pub mod error;
pub mod resources;
pub mod window;
