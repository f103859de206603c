//! The native backend seam.
//!
//! All backend-specific behavior of this core goes through two small capability interfaces:
//! [`NativeDevice`] for device-level operations (descriptor table creation, descriptor copies,
//! command submission, fences) and [`NativeBindingSink`] for per-command-list operations (bind
//! writes and barrier emission). A target backend (DX12, Vulkan, Metal) implements each exactly
//! once; everything above these traits is backend-agnostic.

pub mod headless;

use std::fmt::Debug;
use std::time::Duration;

use anyhow::Result;

use crate::descriptor::heap::HeapKind;
use crate::resource::state::StateTransition;
use crate::resource::ResourceView;

/// Completion fence primitive provided by the backend. CPU-side wait with an optional
/// millisecond-granularity timeout.
pub trait NativeFence: Send + Sync + Debug {
    /// Block until the fence signals. With a timeout, returns `Ok(false)` when the wait timed
    /// out and the fence has still not signaled.
    fn wait(&self, timeout: Option<Duration>) -> Result<bool>;

    /// Non-blocking signal check.
    fn is_signaled(&self) -> Result<bool>;

    /// Return the fence to the unsignaled state.
    fn reset(&self) -> Result<()>;
}

/// Per-command-list sink for the low-level operations a
/// [`ProgramBindingSet`](crate::program::bindings::ProgramBindingSet) emits when applied.
pub trait NativeBindingSink: Send + Debug {
    /// Bind a shader-visible descriptor table at `base_slot` to the given root parameter.
    fn bind_descriptor_table(&mut self, root_index: u32, base_slot: u32);

    /// Bind a resource directly by GPU address to the given root parameter.
    fn bind_buffer_address(&mut self, root_index: u32, address: u64);

    /// Write an inline root-constant value to the given root parameter.
    fn set_root_constant(&mut self, root_index: u32, data: &[u8]);

    /// Emit a batch of state-transition barriers as one native barrier-list call.
    fn emit_barriers(&mut self, barriers: &[StateTransition]);
}

/// Device-level backend operations consumed by the heaps, binding sets and queues of this core.
pub trait NativeDevice: Send + Sync + Debug {
    /// Create (or recreate at the same capacity) the native descriptor table backing a heap.
    fn allocate_descriptor_heap(&self, kind: HeapKind, capacity: u32) -> Result<()>;

    /// Copy the native descriptors of `views` into consecutive slots of a shader-visible heap,
    /// starting at `first_slot`.
    fn copy_descriptors(&self, kind: HeapKind, first_slot: u32, views: &[ResourceView]) -> Result<()>;

    /// Create an unsignaled fence.
    fn create_fence(&self) -> Result<Box<dyn NativeFence>>;

    /// Submit `list_count` finished command lists as one batch and return the fence that signals
    /// when the batch completes on the GPU.
    fn submit(&self, list_count: usize) -> Result<Box<dyn NativeFence>>;

    /// Index of the frame buffer currently being recorded.
    fn current_frame_index(&self) -> u32;

    /// Number of frames that may be in flight simultaneously.
    fn frames_in_flight(&self) -> u32;
}
