//! CPU-side synchronization primitives over backend fences.

pub mod fence;

pub use fence::Fence;
