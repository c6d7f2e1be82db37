//! Descriptor set management.
//!
//! Descriptor sets are pooled the same way uniform buffer ranges are: a set is keyed by a hash of the resources
//! it binds, so an unchanged camera, light list or material keeps the same set across frames and its descriptors
//! are only written once.

pub mod descriptor_pool;
pub mod descriptor_set;
