//! Context plumbing shared by every component.

pub mod context;

pub use context::{Context, ContextSettings};
