//! Various utilities

pub mod align;
pub(crate) mod hash;
pub(crate) mod string;
