//! Command recording and execution.

pub mod list;
pub mod queue;

pub use list::{CommandList, CommandListState, RenderPassDesc};
pub use queue::{CommandQueue, CompletionCallback};
