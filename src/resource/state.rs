//! GPU resource states and transition barrier batching.

use std::sync::Arc;

use crate::resource::Resource;

/// GPU-visible state of a resource. A resource must be transitioned into the state matching the
/// next access kind before the GPU touches it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// State of a freshly created resource, before any transition.
    Undefined,
    /// Neutral state a resource can be left in between unrelated accesses.
    Common,
    /// Read as a vertex or constant buffer.
    VertexAndConstantBuffer,
    /// Read from any shader stage.
    ShaderRead,
    /// Written as a color attachment.
    RenderTarget,
    /// Written as a depth attachment.
    DepthWrite,
    /// Source of a copy operation.
    CopySource,
    /// Destination of a copy operation.
    CopyDestination,
    /// Presentable by the swapchain.
    Present,
}

/// A single declared state transition, emitted to the native backend as part of a barrier list.
#[derive(Debug, Clone)]
pub struct StateTransition {
    /// Resource being transitioned.
    pub resource: Arc<Resource>,
    /// State the resource is in when the barrier executes.
    pub before: ResourceState,
    /// State the resource will be in afterwards.
    pub after: ResourceState,
}

/// Accumulates state transitions so they can be flushed to a command list in a single native
/// barrier call. Transitions for the same resource are merged: scheduling `A -> B` and then
/// `B -> C` before a flush leaves one `A -> C` entry.
#[derive(Debug, Default)]
pub struct BarrierBatch {
    transitions: Vec<StateTransition>,
}

impl BarrierBatch {
    /// Create an empty batch.
    pub fn new() -> Self {
        Self::default()
    }

    /// True if no transitions are pending.
    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Number of pending transitions.
    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    /// Schedule a transition. An existing pending transition for the same resource is updated
    /// in place, keeping its original `before` state; an update that brings the resource back
    /// to that `before` state cancels the entry instead, since a barrier is only ever emitted
    /// for two distinct states.
    pub fn add(&mut self, resource: Arc<Resource>, before: ResourceState, after: ResourceState) {
        if let Some(position) = self
            .transitions
            .iter()
            .position(|t| Arc::ptr_eq(&t.resource, &resource))
        {
            if self.transitions[position].before == after {
                self.transitions.remove(position);
            } else {
                self.transitions[position].after = after;
            }
            return;
        }
        if before == after {
            return;
        }
        self.transitions.push(StateTransition {
            resource,
            before,
            after,
        });
    }

    /// Drop any pending transition for the given resource. Used when a rebind makes a previously
    /// queued transition unnecessary because the resource is no longer referenced.
    pub fn remove_transitions_for(&mut self, resource: &Arc<Resource>) {
        self.transitions.retain(|t| !Arc::ptr_eq(&t.resource, resource));
    }

    /// Drain the batch for a single native barrier-list call.
    pub fn take(&mut self) -> Vec<StateTransition> {
        std::mem::take(&mut self.transitions)
    }

    /// Pending transitions, oldest first.
    pub fn transitions(&self) -> &[StateTransition] {
        &self.transitions
    }
}
