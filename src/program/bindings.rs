//! Program binding sets: the bridge between bound argument values, descriptor heap ranges and
//! the bind operations emitted to a command list.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use bitflags::bitflags;

use crate::backend::NativeDevice;
use crate::command::list::CommandList;
use crate::core::context::Context;
use crate::descriptor::heap::{HeapKind, HeapReservation};
use crate::descriptor::manager::DescriptorManager;
use crate::error::Error;
use crate::program::argument::{AccessPolicy, ArgumentAccessor, ProgramArgument};
use crate::program::binding::{ArgumentBinding, DescriptorSlot};
use crate::program::Program;
use crate::resource::state::{BarrierBatch, ResourceState};
use crate::resource::{Resource, ResourceKind, ResourceView};

bitflags! {
    /// Controls how much work [`ProgramBindingSet::apply`] may skip.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ApplyBehavior: u32 {
        /// Skip Constant and FrameConstant arguments when a binding set of the same program was
        /// already applied to the command list.
        const CONSTANT_ONCE = 1 << 0;
        /// Skip every argument whose bound value equals the one the command list's currently
        /// applied set binds at the same root parameter.
        const CHANGES_ONLY = 1 << 1;
        /// Schedule and flush resource state-transition barriers before the bind writes.
        const STATE_BARRIERS = 1 << 2;
        /// The usual incremental mode: all three optimizations at once.
        const ALL_INCREMENTAL = Self::CONSTANT_ONCE.bits()
            | Self::CHANGES_ONLY.bits()
            | Self::STATE_BARRIERS.bits();
    }
}

/// How one argument reaches the native command list.
#[derive(Debug, Clone)]
pub enum BindOperationKind {
    /// Bind the argument's descriptor table sub-range.
    Table {
        /// First descriptor slot of the argument.
        slot: DescriptorSlot,
    },
    /// Bind the argument directly by GPU address.
    Address {
        /// Cached GPU address of the bound view, refreshed on rebind.
        address: u64,
    },
    /// Write the argument's root-constant bytes inline.
    RootConstant,
}

/// One cached bind write, rebuilt whenever initialization completes or a bound value changes.
#[derive(Debug, Clone)]
pub struct BindOperation {
    /// Root parameter index of the argument.
    pub root_index: u32,
    /// Argument identity, for logs and diagnostics.
    pub argument: ProgramArgument,
    /// Mutability class, used for the `CONSTANT_ONCE` filter.
    pub access: AccessPolicy,
    /// The write to perform.
    pub kind: BindOperationKind,
}

#[derive(Debug, Default)]
struct SetInner {
    initialized: bool,
    reservations: Vec<HeapReservation>,
    slots: Vec<Option<DescriptorSlot>>,
    bind_ops: Vec<BindOperation>,
    barriers: BarrierBatch,
}

/// A complete set of argument values for one program, with its descriptor ranges and the cached
/// bind operations applied to command lists.
///
/// Copies made through [`create_copy`](ProgramBindingSet::create_copy) share the
/// `Arc<Mutex<ArgumentBinding>>` of every argument they do not override, so a rebind through
/// either set is observed by both; descriptor ranges, slots and cached operations are always
/// per set.
#[derive(Debug)]
pub struct ProgramBindingSet {
    program: Arc<Program>,
    device: Arc<dyn NativeDevice>,
    manager: Arc<DescriptorManager>,
    frame_index: u32,
    bindings: Vec<Arc<Mutex<ArgumentBinding>>>,
    inner: Mutex<SetInner>,
}

/// Heap a slotted argument's descriptors live in.
fn heap_kind_for(accessor: &ArgumentAccessor) -> HeapKind {
    match accessor.resource_kind() {
        ResourceKind::Sampler => HeapKind::Samplers,
        _ => HeapKind::ShaderResources,
    }
}

/// State a bound resource must be in before the argument is used. Samplers carry no state.
fn required_state(accessor: &ArgumentAccessor) -> Option<ResourceState> {
    match accessor.resource_kind() {
        ResourceKind::Sampler => None,
        ResourceKind::Buffer if accessor.access() == AccessPolicy::Constant => {
            Some(ResourceState::VertexAndConstantBuffer)
        }
        _ => Some(ResourceState::ShaderRead),
    }
}

impl ProgramBindingSet {
    /// Create a binding set for `program` with initial views assigned per argument name.
    ///
    /// The set registers itself with the context's descriptor manager. Unless the manager
    /// defers heap allocation, initialization completes before this returns; otherwise it
    /// completes at the next [`Context::complete_deferred_actions`] tick.
    pub fn new<'a>(
        context: &Context,
        program: Arc<Program>,
        initial_views: impl IntoIterator<Item = (&'a str, Vec<ResourceView>)>,
        frame_index: u32,
    ) -> Result<Arc<Self>> {
        let bindings = program
            .accessors()
            .iter()
            .map(|accessor| Arc::new(Mutex::new(ArgumentBinding::new(accessor.clone()))))
            .collect::<Vec<_>>();
        let set = Arc::new(Self {
            device: context.device().clone(),
            manager: context.descriptors().clone(),
            frame_index,
            inner: Mutex::new(SetInner {
                slots: vec![None; bindings.len()],
                ..SetInner::default()
            }),
            bindings,
            program,
        });
        for (name, views) in initial_views {
            set.set_resource_views(name, views)?;
        }
        set.manager.register_binding_set(&set);
        if !set.manager.is_deferred_heap_allocation() {
            set.complete_initialization()?;
        }
        Ok(set)
    }

    /// Clone this set for another frame or draw, overriding the named arguments with new views.
    ///
    /// Arguments not named in `overrides` keep sharing this set's binding objects
    /// (copy-on-write at the granularity of whole arguments); overridden arguments get fresh
    /// bindings, so a Constant argument can be given a different value in the copy.
    pub fn create_copy<'a>(
        &self,
        context: &Context,
        overrides: impl IntoIterator<Item = (&'a str, Vec<ResourceView>)>,
        frame_index: u32,
    ) -> Result<Arc<Self>> {
        let mut bindings = self.bindings.clone();
        for (name, views) in overrides {
            let index = self
                .program
                .root_index(name)
                .ok_or_else(|| Error::NoSuchArgument(name.to_owned()))?
                as usize;
            let mut fresh = ArgumentBinding::new(self.program.accessors()[index].clone());
            fresh.set_resource_views(views)?;
            bindings[index] = Arc::new(Mutex::new(fresh));
        }
        let set = Arc::new(Self {
            program: self.program.clone(),
            device: context.device().clone(),
            manager: context.descriptors().clone(),
            frame_index,
            inner: Mutex::new(SetInner {
                slots: vec![None; bindings.len()],
                ..SetInner::default()
            }),
            bindings,
        });
        set.manager.register_binding_set(&set);
        if !set.manager.is_deferred_heap_allocation() {
            set.complete_initialization()?;
        }
        Ok(set)
    }

    /// The program this set binds arguments for.
    pub fn program(&self) -> &Arc<Program> {
        &self.program
    }

    /// Frame buffer index the set was created for.
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Whether initialization has completed and the set can be applied.
    pub fn is_initialized(&self) -> bool {
        self.inner.lock().map(|inner| inner.initialized).unwrap_or(false)
    }

    /// Reserve descriptor ranges, assign argument slots, copy descriptors into the reserved
    /// sub-ranges and cache the bind operations.
    ///
    /// Fails with [`Error::UnboundArguments`] when any declared argument still has no value.
    /// Idempotent: a second call keeps the existing ranges and slots and only refreshes the
    /// descriptor copies and the operation cache.
    pub fn complete_initialization(&self) -> Result<()> {
        let mut inner = self.inner.lock().map_err(Error::from)?;

        let mut unbound = Vec::new();
        for binding in &self.bindings {
            let binding = binding.lock().map_err(Error::from)?;
            if !binding.is_bound() {
                unbound.push(binding.accessor().name().to_owned());
            }
        }
        if !unbound.is_empty() {
            return Err(Error::UnboundArguments(unbound).into());
        }

        if !inner.initialized {
            self.reserve_ranges(&mut inner)?;
            inner.initialized = true;
        }

        for (index, binding) in self.bindings.iter().enumerate() {
            let Some(slot) = inner.slots[index] else {
                continue;
            };
            let binding = binding.lock().map_err(Error::from)?;
            if !binding.views().is_empty() {
                self.device
                    .copy_descriptors(slot.heap_kind, slot.index, binding.views())?;
            }
        }
        inner.bind_ops = self.build_bind_operations(&inner.slots)?;
        trace!(
            "Completed initialization of a binding set for program '{}'",
            self.program.name()
        );
        Ok(())
    }

    /// Reserve one descriptor sub-range per (heap kind, access policy) group and hand each
    /// slotted argument its consecutive slots within its group's range, in declaration order.
    fn reserve_ranges(&self, inner: &mut SetInner) -> Result<()> {
        let mut lengths: HashMap<(HeapKind, AccessPolicy), u32> = HashMap::new();
        for accessor in self.program.accessors() {
            let count = accessor.descriptor_count();
            if count == 0 {
                continue;
            }
            *lengths
                .entry((heap_kind_for(accessor), accessor.access()))
                .or_insert(0) += count;
        }

        let mut reservations: Vec<HeapReservation> = Vec::new();
        let mut cursors: HashMap<(HeapKind, AccessPolicy), u32> = HashMap::new();
        for (&(heap_kind, access), &length) in &lengths {
            let heap = self.manager.heap(heap_kind);
            let (range, owned) =
                self.program
                    .reserve_descriptor_range(heap, access, length, self.frame_index)?;
            let position = match reservations.iter().position(|r| r.kind() == heap_kind) {
                Some(position) => position,
                None => {
                    reservations.push(HeapReservation::new(heap));
                    reservations.len() - 1
                }
            };
            reservations[position].set_range(access, range, owned);
            cursors.insert((heap_kind, access), range.start());
        }

        let mut slots = vec![None; self.bindings.len()];
        for (index, accessor) in self.program.accessors().iter().enumerate() {
            let count = accessor.descriptor_count();
            if count == 0 {
                continue;
            }
            let key = (heap_kind_for(accessor), accessor.access());
            let cursor = cursors.get_mut(&key).unwrap();
            slots[index] = Some(DescriptorSlot {
                heap_kind: key.0,
                index: *cursor,
            });
            *cursor += count;
        }
        inner.reservations = reservations;
        inner.slots = slots;
        Ok(())
    }

    fn build_bind_operations(&self, slots: &[Option<DescriptorSlot>]) -> Result<Vec<BindOperation>> {
        let accessors = self.program.accessors();
        let mut ops = Vec::with_capacity(accessors.len());
        for (index, accessor) in accessors.iter().enumerate() {
            let kind = if accessor.is_root_constant() {
                BindOperationKind::RootConstant
            } else if accessor.is_addressable() {
                let binding = self.bindings[index].lock().map_err(Error::from)?;
                let address = binding.views().first().map(ResourceView::address).unwrap_or(0);
                BindOperationKind::Address {
                    address,
                }
            } else {
                let slot = slots[index].ok_or(Error::BindingsNotInitialized)?;
                BindOperationKind::Table {
                    slot,
                }
            };
            ops.push(BindOperation {
                root_index: index as u32,
                argument: accessor.argument().clone(),
                access: accessor.access(),
                kind,
            });
        }
        Ok(ops)
    }

    /// Emit this set's bind operations to a command list.
    ///
    /// Pending state-transition barriers are always flushed to the command list before the
    /// first bind write, so optimistically updated resource states are realized before any
    /// operation recorded afterwards can observe them.
    pub fn apply(self: &Arc<Self>, cmd: &mut CommandList, behavior: ApplyBehavior) -> Result<()> {
        if !cmd.is_recording() {
            return Err(Error::NotRecording.into());
        }
        let mut inner = self.inner.lock().map_err(Error::from)?;
        if !inner.initialized {
            return Err(Error::BindingsNotInitialized.into());
        }

        let applied = cmd.applied_bindings();
        let same_program_applied = applied
            .as_ref()
            .map_or(false, |set| Arc::ptr_eq(&set.program, &self.program));
        let apply_constants =
            !behavior.contains(ApplyBehavior::CONSTANT_ONCE) || !same_program_applied;
        let in_access_mask = |accessor: &ArgumentAccessor| {
            apply_constants || accessor.access() == AccessPolicy::Mutable
        };

        if behavior.contains(ApplyBehavior::STATE_BARRIERS) {
            for (index, accessor) in self.program.accessors().iter().enumerate() {
                if !in_access_mask(accessor) {
                    continue;
                }
                let Some(state) = required_state(accessor) else {
                    continue;
                };
                let views = {
                    let binding = self.bindings[index].lock().map_err(Error::from)?;
                    binding.views().to_vec()
                };
                for view in views {
                    view.resource().set_state(state, &mut inner.barriers);
                }
            }
        }
        if !inner.barriers.is_empty() {
            let transitions = inner.barriers.take();
            cmd.emit_barriers(&transitions);
        }

        let ops = inner.bind_ops.clone();
        drop(inner);
        for op in &ops {
            let index = op.root_index as usize;
            let accessor = &self.program.accessors()[index];
            if !in_access_mask(accessor) {
                continue;
            }
            if behavior.contains(ApplyBehavior::CHANGES_ONLY) {
                if let Some(applied_set) = &applied {
                    if self.is_already_applied(index, applied_set)? {
                        continue;
                    }
                }
            }
            match &op.kind {
                BindOperationKind::Table {
                    slot,
                } => cmd.bind_descriptor_table(op.root_index, slot.index),
                BindOperationKind::Address {
                    address,
                } => cmd.bind_buffer_address(op.root_index, *address),
                BindOperationKind::RootConstant => {
                    let bytes = {
                        let binding = self.bindings[index].lock().map_err(Error::from)?;
                        binding.root_constant().to_vec()
                    };
                    cmd.set_root_constant(op.root_index, &bytes);
                }
            }
        }
        cmd.set_applied_bindings(self.clone());
        Ok(())
    }

    /// Whether the command list's applied set already binds the same value at root parameter
    /// `index`. Shared binding objects short-circuit by identity.
    fn is_already_applied(&self, index: usize, applied: &Arc<ProgramBindingSet>) -> Result<bool> {
        if !Arc::ptr_eq(&self.program, &applied.program) {
            return Ok(false);
        }
        let ours = &self.bindings[index];
        let theirs = &applied.bindings[index];
        if Arc::ptr_eq(ours, theirs) {
            return Ok(true);
        }
        // Locked one at a time so concurrent comparisons in opposite directions can not
        // deadlock.
        let (our_views, our_constant) = {
            let binding = ours.lock().map_err(Error::from)?;
            (binding.views().to_vec(), binding.root_constant().to_vec())
        };
        let theirs = theirs.lock().map_err(Error::from)?;
        Ok(theirs.views() == our_views.as_slice()
            && theirs.root_constant() == our_constant.as_slice())
    }

    /// Bind new resource views to the named argument.
    ///
    /// Returns `Ok(false)` when the views equal the currently bound ones. On a change, queued
    /// barriers for resources this set no longer references are dropped, the descriptors are
    /// re-copied into the argument's reserved sub-range, and the cached bind operations are
    /// refreshed.
    pub fn set_resource_views(&self, argument: &str, views: Vec<ResourceView>) -> Result<bool> {
        let index = self
            .program
            .root_index(argument)
            .ok_or_else(|| Error::NoSuchArgument(argument.to_owned()))? as usize;
        let (old_views, new_views) = {
            let mut binding = self.bindings[index].lock().map_err(Error::from)?;
            match binding.set_resource_views(views)? {
                None => return Ok(false),
                Some(old) => (old, binding.views().to_vec()),
            }
        };

        let mut dropped: Vec<Arc<Resource>> = Vec::new();
        for view in &old_views {
            let resource = view.resource();
            if !new_views.iter().any(|v| Arc::ptr_eq(v.resource(), resource))
                && !self.references_resource(resource)?
                && !dropped.iter().any(|r| Arc::ptr_eq(r, resource))
            {
                dropped.push(resource.clone());
            }
        }

        let mut inner = self.inner.lock().map_err(Error::from)?;
        for resource in &dropped {
            inner.barriers.remove_transitions_for(resource);
        }
        if inner.initialized {
            if let Some(slot) = inner.slots[index] {
                self.device
                    .copy_descriptors(slot.heap_kind, slot.index, &new_views)?;
            }
            inner.bind_ops = self.build_bind_operations(&inner.slots)?;
        }
        Ok(true)
    }

    /// Write a root-constant value for the named argument. Returns `Ok(false)` when the value
    /// is unchanged.
    pub fn set_root_constant(&self, argument: &str, bytes: &[u8]) -> Result<bool> {
        let index = self
            .program
            .root_index(argument)
            .ok_or_else(|| Error::NoSuchArgument(argument.to_owned()))? as usize;
        let mut binding = self.bindings[index].lock().map_err(Error::from)?;
        binding.set_root_constant(bytes)
    }

    /// The views currently bound to the named argument.
    pub fn bound_views(&self, argument: &str) -> Result<Vec<ResourceView>> {
        let index = self
            .program
            .root_index(argument)
            .ok_or_else(|| Error::NoSuchArgument(argument.to_owned()))? as usize;
        let binding = self.bindings[index].lock().map_err(Error::from)?;
        Ok(binding.views().to_vec())
    }

    /// True when any argument of this set still references the resource.
    fn references_resource(&self, resource: &Arc<Resource>) -> Result<bool> {
        for binding in &self.bindings {
            let binding = binding.lock().map_err(Error::from)?;
            if binding
                .views()
                .iter()
                .any(|view| Arc::ptr_eq(view.resource(), resource))
            {
                return Ok(true);
            }
        }
        Ok(false)
    }
}
