//! The per-context descriptor manager: default heaps and deferred initialization of program
//! binding sets.

use std::sync::{Arc, Mutex, Weak};

use anyhow::Result;

use crate::backend::NativeDevice;
use crate::descriptor::heap::{DescriptorHeap, HeapKind, HeapSettings};
use crate::error::Error;
use crate::program::bindings::ProgramBindingSet;

/// Capacities of the four default heaps plus the deferred-allocation switch.
#[derive(Debug, Clone, Copy)]
pub struct DescriptorManagerSettings {
    /// Capacity of the shader-visible resource view heap.
    pub shader_resource_capacity: u32,
    /// Capacity of the shader-visible sampler heap.
    pub sampler_capacity: u32,
    /// Capacity of the CPU-only render-target view heap.
    pub render_target_capacity: u32,
    /// Capacity of the CPU-only depth-stencil view heap.
    pub depth_stencil_capacity: u32,
    /// Postpone native heap allocation and binding-set initialization until
    /// [`DescriptorManager::complete_deferred_initialization`], so many binding sets created
    /// during setup share one native allocation per heap.
    pub deferred_heap_allocation: bool,
}

impl Default for DescriptorManagerSettings {
    fn default() -> Self {
        Self {
            shader_resource_capacity: 1024,
            sampler_capacity: 256,
            render_target_capacity: 64,
            depth_stencil_capacity: 16,
            deferred_heap_allocation: false,
        }
    }
}

/// Owns the default descriptor heap of each [`HeapKind`] and tracks the program binding sets
/// whose initialization is deferred together with heap allocation.
///
/// Binding sets are held weakly; a set dropped before the deferred tick is simply swept from
/// the registry.
#[derive(Debug)]
pub struct DescriptorManager {
    heaps: [Arc<DescriptorHeap>; HeapKind::ALL.len()],
    deferred_heap_allocation: Mutex<bool>,
    binding_sets: Mutex<Vec<Weak<ProgramBindingSet>>>,
}

impl DescriptorManager {
    /// Create the manager and its four default heaps. Unless deferred allocation is requested,
    /// every native heap is allocated here.
    pub fn new(device: Arc<dyn NativeDevice>, settings: DescriptorManagerSettings) -> Result<Self> {
        let capacity_of = |kind: HeapKind| match kind {
            HeapKind::ShaderResources => settings.shader_resource_capacity,
            HeapKind::Samplers => settings.sampler_capacity,
            HeapKind::RenderTargets => settings.render_target_capacity,
            HeapKind::DepthStencil => settings.depth_stencil_capacity,
        };
        let mut heaps = Vec::with_capacity(HeapKind::ALL.len());
        for kind in HeapKind::ALL {
            heaps.push(DescriptorHeap::new(
                device.clone(),
                HeapSettings {
                    kind,
                    capacity: capacity_of(kind),
                    shader_visible: kind.is_shader_visible(),
                    deferred_allocation: settings.deferred_heap_allocation,
                },
            )?);
        }
        // HeapKind::ALL has a fixed length, so this can not fail.
        let heaps = heaps.try_into().unwrap();
        Ok(Self {
            heaps,
            deferred_heap_allocation: Mutex::new(settings.deferred_heap_allocation),
            binding_sets: Mutex::new(Vec::new()),
        })
    }

    /// The default heap of the given kind.
    pub fn heap(&self, kind: HeapKind) -> &Arc<DescriptorHeap> {
        &self.heaps[HeapKind::ALL.iter().position(|&k| k == kind).unwrap()]
    }

    /// Whether heap allocation and binding-set initialization are currently deferred.
    pub fn is_deferred_heap_allocation(&self) -> bool {
        *self.deferred_heap_allocation.lock().unwrap()
    }

    /// Toggle deferred allocation for the default heaps and for binding sets created from now
    /// on.
    pub fn set_deferred_heap_allocation(&self, deferred: bool) {
        *self.deferred_heap_allocation.lock().unwrap() = deferred;
        for heap in &self.heaps {
            heap.set_deferred_allocation(deferred);
        }
    }

    /// Track a binding set so a later deferred tick can complete its initialization.
    pub fn register_binding_set(&self, set: &Arc<ProgramBindingSet>) {
        self.binding_sets.lock().unwrap().push(Arc::downgrade(set));
    }

    /// The deferred tick: allocate every not-yet-allocated native heap, then complete the
    /// initialization of every live registered binding set, in registration order. Dead weak
    /// registrations are swept. Safe to call when nothing was deferred.
    pub fn complete_deferred_initialization(&self) -> Result<()> {
        for heap in &self.heaps {
            heap.allocate()?;
        }
        let sets: Vec<Arc<ProgramBindingSet>> = {
            let mut registry = self.binding_sets.lock().map_err(Error::from)?;
            registry.retain(|weak| weak.strong_count() > 0);
            registry.iter().filter_map(Weak::upgrade).collect()
        };
        trace!(
            "Completing deferred initialization of {} program binding set(s)",
            sets.len()
        );
        for set in sets {
            set.complete_initialization()?;
        }
        Ok(())
    }
}
