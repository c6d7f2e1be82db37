//! GPU memory management.
//!
//! - [`memory_type`] describes where an allocation should live.
//! - [`buffer_pool`] sub-allocates fixed-size ranges of pooled buffers, keyed by the object they mirror.

pub mod buffer_pool;
pub mod memory_type;
