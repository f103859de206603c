//! Re-exports the whole public surface of the crate.

pub use crate::backend::headless::{
    CallLog, DescriptorWrite, HeadlessDevice, HeadlessFence, RecordingSink, SinkCall,
};
pub use crate::backend::{NativeBindingSink, NativeDevice, NativeFence};
pub use crate::command::list::{CommandList, CommandListState, RenderPassDesc};
pub use crate::command::queue::{CommandQueue, CompletionCallback};
pub use crate::core::context::{Context, ContextSettings};
pub use crate::descriptor::heap::{DescriptorHeap, HeapKind, HeapReservation, HeapSettings};
pub use crate::descriptor::manager::{DescriptorManager, DescriptorManagerSettings};
pub use crate::descriptor::range_set::{HeapRange, RangeSet};
pub use crate::error::Error;
pub use crate::program::argument::{
    AccessPolicy, ArgumentAccessor, ProgramArgument, ShaderStages, ValueKind,
};
pub use crate::program::binding::{ArgumentBinding, DescriptorSlot};
pub use crate::program::bindings::{
    ApplyBehavior, BindOperation, BindOperationKind, ProgramBindingSet,
};
pub use crate::program::{Program, ProgramBuilder};
pub use crate::resource::pool::{Pool, Poolable, Pooled};
pub use crate::resource::state::{BarrierBatch, ResourceState, StateTransition};
pub use crate::resource::{Resource, ResourceKind, ResourceUsage, ResourceView};
pub use crate::sync::fence::Fence;
