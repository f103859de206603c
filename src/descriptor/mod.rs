//! Descriptor heaps, free-range allocation and the per-context descriptor manager.

pub mod heap;
pub mod manager;
pub mod range_set;
