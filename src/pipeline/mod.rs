//! Pipeline variants.
//!
//! - [`id`] packs vertex layout, material textures and render settings into a [`PipelineId`](id::PipelineId).
//! - [`cache`] compiles one pipeline per id on first use and owns all layouts.
//! - [`set_layout`] describes the descriptor set and pipeline layout families.
//! - [`vertex`] derives vertex input state from a primitive part.
//! - [`shader`] loads SPIR-V for a variant.

pub mod cache;
pub mod create_info;
pub mod id;
pub mod set_layout;
pub mod shader;
pub mod vertex;
