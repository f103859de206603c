//! Fixed-capacity descriptor heaps with deferred native allocation.

use std::sync::{Arc, Mutex, Weak};

use anyhow::Result;

use crate::backend::NativeDevice;
use crate::descriptor::range_set::{HeapRange, RangeSet};
use crate::error::Error;
use crate::program::argument::AccessPolicy;

/// Category of binding slots a heap holds. Resource and sampler heaps are GPU-shader-visible;
/// render-target and depth-stencil heaps are CPU-only and never participate in shader-visible
/// reservation logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HeapKind {
    /// Shader-visible resource views (textures, buffers).
    ShaderResources,
    /// Shader-visible samplers.
    Samplers,
    /// CPU-only render-target views.
    RenderTargets,
    /// CPU-only depth-stencil views.
    DepthStencil,
}

impl HeapKind {
    /// Every heap kind, in manager allocation order.
    pub const ALL: [HeapKind; 4] = [
        HeapKind::ShaderResources,
        HeapKind::Samplers,
        HeapKind::RenderTargets,
        HeapKind::DepthStencil,
    ];

    /// Whether heaps of this kind can be made visible to shaders.
    pub fn is_shader_visible(self) -> bool {
        matches!(self, HeapKind::ShaderResources | HeapKind::Samplers)
    }
}

/// Immutable heap configuration. Capacity is fixed at creation; a heap is never resized, only
/// reallocated wholesale after a capacity-exceeded error.
#[derive(Debug, Clone, Copy)]
pub struct HeapSettings {
    /// Slot category.
    pub kind: HeapKind,
    /// Total number of slots.
    pub capacity: u32,
    /// Request shader visibility. Only effective for kinds where
    /// [`HeapKind::is_shader_visible`] holds.
    pub shader_visible: bool,
    /// Suspend native table creation until [`DescriptorHeap::allocate`] is called, letting many
    /// reservations batch into one native allocation.
    pub deferred_allocation: bool,
}

#[derive(Debug)]
struct HeapInner {
    free: RangeSet,
    deferred_allocation: bool,
    allocated_size: u32,
}

/// A fixed-capacity table of descriptor slots of one [`HeapKind`], with a first-fit free-range
/// allocator over slot indices.
///
/// Reserved descriptors are addressed by absolute slot index, so no resource relocation is ever
/// attempted: the compaction pass before an
/// [`OutOfCapacity`](crate::error::Error::OutOfCapacity) error only merges adjacent free holes.
#[derive(Debug)]
pub struct DescriptorHeap {
    device: Arc<dyn NativeDevice>,
    settings: HeapSettings,
    inner: Mutex<HeapInner>,
}

impl DescriptorHeap {
    /// Create a heap. Unless `settings.deferred_allocation` is set, the native descriptor table
    /// is created immediately.
    pub fn new(device: Arc<dyn NativeDevice>, settings: HeapSettings) -> Result<Arc<Self>> {
        let heap = Arc::new(Self {
            device,
            inner: Mutex::new(HeapInner {
                free: RangeSet::new(settings.capacity),
                deferred_allocation: settings.deferred_allocation,
                allocated_size: 0,
            }),
            settings,
        });
        if !settings.deferred_allocation && settings.capacity > 0 {
            heap.allocate()?;
        }
        Ok(heap)
    }

    /// Heap configuration.
    pub fn settings(&self) -> &HeapSettings {
        &self.settings
    }

    /// Slot category.
    pub fn kind(&self) -> HeapKind {
        self.settings.kind
    }

    /// Fixed slot capacity.
    pub fn capacity(&self) -> u32 {
        self.settings.capacity
    }

    /// True when the heap's slots are visible to shaders.
    pub fn is_shader_visible(&self) -> bool {
        self.settings.shader_visible && self.settings.kind.is_shader_visible()
    }

    /// Find the first free interval of at least `length` contiguous slots. On failure a
    /// compaction pass is attempted once before giving up with
    /// [`Error::OutOfCapacity`].
    pub fn reserve_range(&self, length: u32) -> Result<HeapRange> {
        if length == 0 {
            return Err(Error::EmptyDescriptorRange.into());
        }
        let mut inner = self.inner.lock().map_err(Error::from)?;
        let range = inner.free.reserve(length).or_else(|| {
            inner.free.coalesce();
            inner.free.reserve(length)
        });
        match range {
            Some(range) => {
                trace!(
                    "Reserved descriptor range [{}, {}) in {:?} heap",
                    range.start(),
                    range.end(),
                    self.settings.kind
                );
                Ok(range)
            }
            None => Err(Error::OutOfCapacity {
                kind: self.settings.kind,
                requested: length,
                capacity: self.settings.capacity,
            }
            .into()),
        }
    }

    /// Return a reserved interval to the free set, coalescing with adjacent free neighbors.
    pub fn release_range(&self, range: HeapRange) -> Result<()> {
        let mut inner = self.inner.lock().map_err(Error::from)?;
        if !inner.free.release(range) {
            return Err(Error::InvalidRangeRelease(range).into());
        }
        trace!(
            "Released descriptor range [{}, {}) in {:?} heap",
            range.start(),
            range.end(),
            self.settings.kind
        );
        Ok(())
    }

    /// Toggle deferred native allocation for subsequent [`allocate`](DescriptorHeap::allocate)
    /// calls.
    pub fn set_deferred_allocation(&self, deferred: bool) {
        self.inner.lock().unwrap().deferred_allocation = deferred;
    }

    /// Whether native allocation is currently deferred.
    pub fn is_deferred_allocation(&self) -> bool {
        self.inner.lock().unwrap().deferred_allocation
    }

    /// Create the native descriptor table. A no-op when the table already exists, since the
    /// capacity never changes after construction.
    pub fn allocate(&self) -> Result<()> {
        let mut inner = self.inner.lock().map_err(Error::from)?;
        if inner.allocated_size == self.settings.capacity || self.settings.capacity == 0 {
            return Ok(());
        }
        self.device
            .allocate_descriptor_heap(self.settings.kind, self.settings.capacity)?;
        inner.allocated_size = self.settings.capacity;
        trace!(
            "Allocated native {:?} descriptor heap with {} slots",
            self.settings.kind,
            self.settings.capacity
        );
        Ok(())
    }

    /// Number of natively allocated slots: zero before [`allocate`](DescriptorHeap::allocate),
    /// the full capacity afterwards.
    pub fn allocated_size(&self) -> u32 {
        self.inner.lock().unwrap().allocated_size
    }

    /// Number of currently free slots.
    pub fn free_size(&self) -> u32 {
        self.inner.lock().unwrap().free.free_total()
    }

    /// Number of currently reserved slots.
    pub fn used_size(&self) -> u32 {
        self.settings.capacity - self.free_size()
    }
}

/// Descriptor sub-ranges reserved inside one heap by a program binding set, one independent
/// range per access policy so Constant/FrameConstant ranges can be shared across binding sets of
/// the same program.
///
/// Holds a weak back-reference to the owning heap, never owning it: shared ranges outlive the
/// reservation (they belong to the program), while exclusively owned ranges are released back to
/// the heap when the reservation drops.
#[derive(Debug)]
pub struct HeapReservation {
    heap: Weak<DescriptorHeap>,
    kind: HeapKind,
    ranges: [Option<HeapRange>; AccessPolicy::COUNT],
    owned: [bool; AccessPolicy::COUNT],
}

impl HeapReservation {
    pub(crate) fn new(heap: &Arc<DescriptorHeap>) -> Self {
        Self {
            heap: Arc::downgrade(heap),
            kind: heap.kind(),
            ranges: [None; AccessPolicy::COUNT],
            owned: [false; AccessPolicy::COUNT],
        }
    }

    pub(crate) fn set_range(&mut self, access: AccessPolicy, range: HeapRange, owned: bool) {
        self.ranges[access.index()] = Some(range);
        self.owned[access.index()] = owned;
    }

    /// Heap kind this reservation lives in.
    pub fn kind(&self) -> HeapKind {
        self.kind
    }

    /// Reserved sub-range for the given access policy, if any.
    pub fn range(&self, access: AccessPolicy) -> Option<HeapRange> {
        self.ranges[access.index()]
    }

    /// Upgrade the weak heap back-reference.
    pub fn heap(&self) -> Option<Arc<DescriptorHeap>> {
        self.heap.upgrade()
    }
}

impl Drop for HeapReservation {
    fn drop(&mut self) {
        let Some(heap) = self.heap.upgrade() else {
            return;
        };
        for (index, range) in self.ranges.iter().enumerate() {
            if !self.owned[index] {
                continue;
            }
            if let Some(range) = range {
                if let Err(err) = heap.release_range(*range) {
                    warn!(
                        "Failed to release descriptor range of dropped reservation: {}",
                        err
                    );
                }
            }
        }
    }
}
