//! GPU resources, resource views and state tracking.
//!
//! A [`Resource`] is a handle to a native buffer, texture or sampler created by an external
//! collaborator. This core never creates native objects itself; it tracks each resource's
//! GPU-visible [`ResourceState`](crate::resource::state::ResourceState) and shares resources
//! between argument bindings through reference counting. The last holder releases the native
//! object.

pub mod pool;
pub mod state;

use std::sync::{Arc, Mutex};

use bitflags::bitflags;

use crate::resource::state::{BarrierBatch, ResourceState};

/// Category of a GPU resource, matched against the declared kind of a program argument at bind
/// time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    /// Linear memory buffer.
    Buffer,
    /// Texture of any dimensionality.
    Texture,
    /// Sampler state object. Samplers have no memory backing and never need state transitions.
    Sampler,
}

bitflags! {
    /// Usage flags a resource was created with.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ResourceUsage: u32 {
        /// Readable from shaders.
        const SHADER_READ = 1 << 0;
        /// Writable from shaders.
        const SHADER_WRITE = 1 << 1;
        /// Usable as a color attachment.
        const RENDER_TARGET = 1 << 2;
        /// Usable as a depth-stencil attachment.
        const DEPTH_STENCIL = 1 << 3;
        /// Source of copy operations.
        const COPY_SOURCE = 1 << 4;
        /// Destination of copy operations.
        const COPY_DESTINATION = 1 << 5;
        /// Bindable by raw GPU address. Required for views with a non-zero offset.
        const ADDRESSABLE = 1 << 6;
    }
}

/// Shared handle to a native GPU resource plus its tracked state.
///
/// Identity is the `Arc` pointer: two `Resource` values are the same resource only if they are
/// the same allocation.
#[derive(Debug)]
pub struct Resource {
    name: String,
    kind: ResourceKind,
    usage: ResourceUsage,
    address: u64,
    state: Mutex<ResourceState>,
}

impl Resource {
    /// Create a resource handle with no GPU address. The initial state is
    /// [`ResourceState::Undefined`].
    pub fn new(name: impl Into<String>, kind: ResourceKind, usage: ResourceUsage) -> Arc<Self> {
        Self::with_address(name, kind, usage, 0)
    }

    /// Create a resource handle with a base GPU address, for resources that can be bound
    /// directly by address.
    pub fn with_address(
        name: impl Into<String>,
        kind: ResourceKind,
        usage: ResourceUsage,
        address: u64,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            kind,
            usage,
            address,
            state: Mutex::new(ResourceState::Undefined),
        })
    }

    /// Debug name of the resource.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource category.
    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Usage flags the resource was created with.
    pub fn usage(&self) -> ResourceUsage {
        self.usage
    }

    /// Base GPU address, zero when the resource is not addressable.
    pub fn address(&self) -> u64 {
        self.address
    }

    /// Current tracked state.
    pub fn state(&self) -> ResourceState {
        *self.state.lock().unwrap()
    }

    /// Require the resource to be in `new_state`. If the current state differs, a transition is
    /// appended to `batch` and the tracked state is updated immediately. The update is
    /// optimistic: callers must flush the batch to a command list before the resource is used,
    /// which the binding-set apply path guarantees by emitting barriers before any bind write.
    ///
    /// Returns whether a transition was scheduled.
    pub fn set_state(self: &Arc<Self>, new_state: ResourceState, batch: &mut BarrierBatch) -> bool {
        let mut state = self.state.lock().unwrap();
        let old_state = *state;
        if old_state == new_state {
            return false;
        }
        *state = new_state;
        drop(state);
        trace!(
            "Resource '{}' state transition {:?} -> {:?}",
            self.name,
            old_state,
            new_state
        );
        batch.add(self.clone(), old_state, new_state);
        true
    }

    /// Set the tracked state without scheduling a barrier. Used for attachment initialization at
    /// render pass entry, where the state is known out of band.
    pub fn force_state(&self, new_state: ResourceState) {
        *self.state.lock().unwrap() = new_state;
    }
}

/// A view over a sub-range of a resource, the unit bound to program arguments.
#[derive(Debug, Clone)]
pub struct ResourceView {
    resource: Arc<Resource>,
    offset: u64,
    size: u64,
}

impl ResourceView {
    /// View over `size` bytes of `resource` starting at `offset`. Non-zero offsets require the
    /// resource to be addressable, which is validated at bind time.
    pub fn new(resource: Arc<Resource>, offset: u64, size: u64) -> Self {
        Self {
            resource,
            offset,
            size,
        }
    }

    /// View over the whole resource.
    pub fn of(resource: &Arc<Resource>) -> Self {
        Self::new(resource.clone(), 0, 0)
    }

    /// The viewed resource.
    pub fn resource(&self) -> &Arc<Resource> {
        &self.resource
    }

    /// Byte offset of the view inside the resource.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Byte size of the view, zero meaning "to the end of the resource".
    pub fn size(&self) -> u64 {
        self.size
    }

    /// GPU address of the view for addressable bindings.
    pub fn address(&self) -> u64 {
        self.resource.address() + self.offset
    }
}

impl PartialEq for ResourceView {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.resource, &other.resource)
            && self.offset == other.offset
            && self.size == other.size
    }
}

impl Eq for ResourceView {}
