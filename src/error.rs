//! Exposes the deimos error type

use std::sync::PoisonError;

use thiserror::Error;

use crate::descriptor::heap::HeapKind;
use crate::descriptor::range_set::HeapRange;
use crate::resource::ResourceKind;

/// Error type that deimos can return.
#[derive(Error, Debug)]
pub enum Error {
    /// Descriptor heap has no free interval of the requested length, even after compaction.
    #[error("Descriptor heap {kind:?} is out of capacity: requested {requested} slots of {capacity}")]
    OutOfCapacity {
        /// Heap that failed the reservation.
        kind: HeapKind,
        /// Requested contiguous slot count.
        requested: u32,
        /// Fixed heap capacity.
        capacity: u32,
    },
    /// Tried to reserve a descriptor range of zero length.
    #[error("Can not reserve an empty descriptor range")]
    EmptyDescriptorRange,
    /// Released a descriptor range that overlaps the free set, usually a double release.
    #[error("Released descriptor range [{}, {}) overlaps the free set", .0.start(), .0.end())]
    InvalidRangeRelease(HeapRange),
    /// Program does not declare the named argument.
    #[error("Program has no argument named `{0}`")]
    NoSuchArgument(String),
    /// Same-named arguments from different shader stages differ in more than their stage.
    #[error("Program arguments named `{0}` have mismatched settings and can not be merged")]
    ArgumentMergeConflict(String),
    /// Binding-set initialization found declared arguments with no resource bound.
    #[error("Unbound program arguments: {}", .0.join(", "))]
    UnboundArguments(Vec<String>),
    /// A Constant-policy argument was rebound after its first binding.
    #[error("Constant argument `{0}` is already bound and can not be modified")]
    ConstantModification(String),
    /// Tried to bind an empty resource view list.
    #[error("Can not bind an empty resource view list to argument `{0}`")]
    EmptyBinding(String),
    /// Bound resource kind does not match the argument's declared kind.
    #[error("Incompatible resource kind {actual:?} bound to argument `{argument}` of kind {expected:?}")]
    IncompatibleResourceKind {
        /// Argument name.
        argument: String,
        /// Kind declared by the argument.
        expected: ResourceKind,
        /// Kind of the offending resource.
        actual: ResourceKind,
    },
    /// Resource bound to an addressable argument is missing the `ADDRESSABLE` usage flag.
    #[error("Resource bound to addressable argument `{0}` does not have the ADDRESSABLE usage flag")]
    NotAddressable(String),
    /// Non-addressable arguments only accept views with a zero offset.
    #[error("Can not bind a view with non-zero offset to non-addressable argument `{0}`")]
    UnexpectedViewOffset(String),
    /// More views bound than the argument declares descriptor slots for.
    #[error("Argument `{argument}` declares {declared} resource view(s), attempted to bind {bound}")]
    ResourceCountExceeded {
        /// Argument name.
        argument: String,
        /// Declared view capacity.
        declared: u32,
        /// Number of views in the rejected bind call.
        bound: u32,
    },
    /// Resource views were bound to a root-constant argument.
    #[error("Argument `{0}` is a root constant and does not accept resource views")]
    RootConstantArgument(String),
    /// A root-constant value was set on an argument that is not a root constant.
    #[error("Argument `{0}` is not a root constant")]
    NotRootConstant(String),
    /// Root-constant data size does not match the size declared by the argument.
    #[error("Root constant for argument `{argument}` must be {expected} bytes, got {actual}")]
    RootConstantSizeMismatch {
        /// Argument name.
        argument: String,
        /// Declared constant size in bytes.
        expected: u32,
        /// Size of the rejected value.
        actual: u32,
    },
    /// A binding set was applied before its initialization completed. With deferred heap
    /// allocation, complete the context's deferred actions first.
    #[error("Program binding set was applied before its initialization completed")]
    BindingsNotInitialized,
    /// A descriptor heap was destroyed while reservations into it were still alive.
    #[error("Descriptor heap was destroyed before its reservation was released")]
    HeapDestroyed,
    /// `end_render_pass` without a matching `begin_render_pass`.
    #[error("No render pass is active on this command list")]
    NoActiveRenderPass,
    /// Command list was recorded to after `finish()`.
    #[error("Command list is not in the recording state")]
    NotRecording,
    /// The background execution-waiting thread of a command queue terminated with a failure.
    /// Rethrown on the owning thread at the next queue interaction.
    #[error("Command queue execution waiting thread failed: {0}")]
    ExecutionThread(String),
    /// Fence wait exceeded its timeout.
    #[error("Fence wait timed out")]
    FenceWaitTimeout,
    /// Poisoned mutex
    #[error("Poisoned mutex")]
    PoisonError,
}

impl<T> From<PoisonError<T>> for Error {
    fn from(_: PoisonError<T>) -> Self {
        Error::PoisonError
    }
}
