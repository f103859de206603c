//! An in-process backend with no GPU behind it.
//!
//! Fences are condition-variable backed and signal on submission unless submissions are held;
//! every sink and device call is recorded so tests (and dry runs) can inspect exactly what a
//! real backend would have been asked to do.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::Duration;

use anyhow::Result;

use crate::backend::{NativeBindingSink, NativeDevice, NativeFence};
use crate::descriptor::heap::HeapKind;
use crate::error::Error;
use crate::resource::state::{ResourceState, StateTransition};
use crate::resource::ResourceView;

/// Condition-variable fence. Signaled manually or by the device on submission.
#[derive(Debug, Default)]
pub struct HeadlessFence {
    signaled: Mutex<bool>,
    condvar: Condvar,
}

impl HeadlessFence {
    /// An unsignaled fence.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Signal the fence, waking every waiter.
    pub fn signal(&self) {
        *self.signaled.lock().unwrap() = true;
        self.condvar.notify_all();
    }
}

impl NativeFence for Arc<HeadlessFence> {
    fn wait(&self, timeout: Option<Duration>) -> Result<bool> {
        let mut signaled = self.signaled.lock().map_err(Error::from)?;
        match timeout {
            None => {
                while !*signaled {
                    signaled = self.condvar.wait(signaled).map_err(Error::from)?;
                }
                Ok(true)
            }
            Some(timeout) => {
                let (signaled, _) = self
                    .condvar
                    .wait_timeout_while(signaled, timeout, |signaled| !*signaled)
                    .map_err(Error::from)?;
                Ok(*signaled)
            }
        }
    }

    fn is_signaled(&self) -> Result<bool> {
        Ok(*self.signaled.lock().map_err(Error::from)?)
    }

    fn reset(&self) -> Result<()> {
        *self.signaled.lock().map_err(Error::from)? = false;
        Ok(())
    }
}

/// One recorded sink call, with barrier transitions flattened to resource names for easy
/// assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkCall {
    /// A descriptor table bind.
    BindDescriptorTable {
        /// Root parameter index.
        root_index: u32,
        /// Absolute first heap slot of the bound table.
        base_slot: u32,
    },
    /// A direct buffer-address bind.
    BindBufferAddress {
        /// Root parameter index.
        root_index: u32,
        /// Bound GPU address.
        address: u64,
    },
    /// An inline root-constant write.
    SetRootConstant {
        /// Root parameter index.
        root_index: u32,
        /// Written bytes.
        data: Vec<u8>,
    },
    /// One native barrier-list call.
    EmitBarriers {
        /// `(resource name, before, after)` per transition.
        transitions: Vec<(String, ResourceState, ResourceState)>,
    },
}

/// Shared log of sink calls, usually one per test context so calls from every command list land
/// in a single inspectable sequence.
#[derive(Debug, Default)]
pub struct CallLog {
    calls: Mutex<Vec<SinkCall>>,
}

impl CallLog {
    /// An empty log.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Append a call.
    pub fn record(&self, call: SinkCall) {
        self.calls.lock().unwrap().push(call);
    }

    /// Snapshot of all recorded calls.
    pub fn calls(&self) -> Vec<SinkCall> {
        self.calls.lock().unwrap().clone()
    }

    /// Drain the log, returning everything recorded so far.
    pub fn take(&self) -> Vec<SinkCall> {
        std::mem::take(&mut *self.calls.lock().unwrap())
    }

    /// Number of recorded calls.
    pub fn len(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// True when nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A binding sink that records every call into a shared [`CallLog`].
#[derive(Debug)]
pub struct RecordingSink {
    log: Arc<CallLog>,
}

impl RecordingSink {
    /// A sink appending to `log`.
    pub fn new(log: Arc<CallLog>) -> Self {
        Self {
            log,
        }
    }
}

impl NativeBindingSink for RecordingSink {
    fn bind_descriptor_table(&mut self, root_index: u32, base_slot: u32) {
        self.log.record(SinkCall::BindDescriptorTable {
            root_index,
            base_slot,
        });
    }

    fn bind_buffer_address(&mut self, root_index: u32, address: u64) {
        self.log.record(SinkCall::BindBufferAddress {
            root_index,
            address,
        });
    }

    fn set_root_constant(&mut self, root_index: u32, data: &[u8]) {
        self.log.record(SinkCall::SetRootConstant {
            root_index,
            data: data.to_vec(),
        });
    }

    fn emit_barriers(&mut self, barriers: &[StateTransition]) {
        self.log.record(SinkCall::EmitBarriers {
            transitions: barriers
                .iter()
                .map(|t| (t.resource.name().to_owned(), t.before, t.after))
                .collect(),
        });
    }
}

/// One recorded descriptor copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorWrite {
    /// Target heap.
    pub kind: HeapKind,
    /// First written slot.
    pub first_slot: u32,
    /// Number of consecutive slots written.
    pub count: u32,
}

#[derive(Debug, Default)]
struct DeviceInner {
    heap_capacities: HashMap<HeapKind, u32>,
    descriptor_writes: Vec<DescriptorWrite>,
    frame_index: u32,
    hold_submissions: bool,
    held: Vec<Arc<HeadlessFence>>,
    submission_count: u32,
}

/// The headless device. Submission fences signal immediately unless
/// [`hold_submissions`](HeadlessDevice::hold_submissions) is active, in which case they stay
/// pending until signaled through [`signal_all`](HeadlessDevice::signal_all) or individually
/// via [`held_fences`](HeadlessDevice::held_fences).
#[derive(Debug)]
pub struct HeadlessDevice {
    frames_in_flight: u32,
    inner: Mutex<DeviceInner>,
}

impl HeadlessDevice {
    /// A device with the given number of frame buffers.
    pub fn new(frames_in_flight: u32) -> Arc<Self> {
        Arc::new(Self {
            frames_in_flight,
            inner: Mutex::new(DeviceInner::default()),
        })
    }

    /// Move recording to another frame buffer.
    pub fn set_frame_index(&self, frame_index: u32) {
        self.inner.lock().unwrap().frame_index = frame_index;
    }

    /// Keep submission fences unsignaled until released, emulating in-flight GPU work.
    pub fn hold_submissions(&self, hold: bool) {
        self.inner.lock().unwrap().hold_submissions = hold;
    }

    /// Signal every held submission fence, in submission order.
    pub fn signal_all(&self) {
        let held = std::mem::take(&mut self.inner.lock().unwrap().held);
        for fence in held {
            fence.signal();
        }
    }

    /// The still-held submission fences, oldest first.
    pub fn held_fences(&self) -> Vec<Arc<HeadlessFence>> {
        self.inner.lock().unwrap().held.clone()
    }

    /// Native capacity of a heap, if it was allocated.
    pub fn allocated_heap_capacity(&self, kind: HeapKind) -> Option<u32> {
        self.inner.lock().unwrap().heap_capacities.get(&kind).copied()
    }

    /// All descriptor copies performed so far.
    pub fn descriptor_writes(&self) -> Vec<DescriptorWrite> {
        self.inner.lock().unwrap().descriptor_writes.clone()
    }

    /// Number of batches submitted so far.
    pub fn submission_count(&self) -> u32 {
        self.inner.lock().unwrap().submission_count
    }
}

impl NativeDevice for HeadlessDevice {
    fn allocate_descriptor_heap(&self, kind: HeapKind, capacity: u32) -> Result<()> {
        self.inner
            .lock()
            .map_err(Error::from)?
            .heap_capacities
            .insert(kind, capacity);
        Ok(())
    }

    fn copy_descriptors(&self, kind: HeapKind, first_slot: u32, views: &[ResourceView]) -> Result<()> {
        self.inner
            .lock()
            .map_err(Error::from)?
            .descriptor_writes
            .push(DescriptorWrite {
                kind,
                first_slot,
                count: views.len() as u32,
            });
        Ok(())
    }

    fn create_fence(&self) -> Result<Box<dyn NativeFence>> {
        Ok(Box::new(HeadlessFence::new()))
    }

    fn submit(&self, _list_count: usize) -> Result<Box<dyn NativeFence>> {
        let fence = HeadlessFence::new();
        let mut inner = self.inner.lock().map_err(Error::from)?;
        inner.submission_count += 1;
        if inner.hold_submissions {
            inner.held.push(fence.clone());
        } else {
            fence.signal();
        }
        Ok(Box::new(fence))
    }

    fn current_frame_index(&self) -> u32 {
        self.inner.lock().unwrap().frame_index
    }

    fn frames_in_flight(&self) -> u32 {
        self.frames_in_flight
    }
}
