//! Cross-cutting request stages.

pub mod cors;
pub mod ssl;
