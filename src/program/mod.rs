//! Shader programs: merged argument declarations and shared descriptor ranges.

pub mod argument;
pub mod binding;
pub mod bindings;

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use anyhow::Result;

use crate::descriptor::heap::{DescriptorHeap, HeapKind};
use crate::descriptor::range_set::HeapRange;
use crate::error::Error;
use crate::program::argument::{AccessPolicy, ArgumentAccessor};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct SharedRangeKey {
    heap_kind: HeapKind,
    access: AccessPolicy,
    // Only set for FrameConstant ranges, which are shared per frame buffer.
    frame_index: Option<u32>,
}

#[derive(Debug)]
struct SharedRange {
    heap: Weak<DescriptorHeap>,
    range: HeapRange,
}

/// A linked shader program: the merged set of argument declarations across all of its stages,
/// plus the descriptor ranges shared between its binding sets.
///
/// The program never owns descriptor heaps. Shared Constant and FrameConstant ranges hold weak
/// heap back-references and are released when the program drops; Mutable ranges are owned by the
/// individual binding sets instead.
#[derive(Debug)]
pub struct Program {
    name: String,
    accessors: Vec<ArgumentAccessor>,
    shared_ranges: Mutex<HashMap<SharedRangeKey, SharedRange>>,
}

impl Program {
    /// Start building a program.
    pub fn builder(name: impl Into<String>) -> ProgramBuilder {
        ProgramBuilder {
            name: name.into(),
            accessors: Vec::new(),
            error: None,
        }
    }

    /// Program name, used in logs and errors.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// All argument declarations, in root-parameter order.
    pub fn accessors(&self) -> &[ArgumentAccessor] {
        &self.accessors
    }

    /// Declaration of the named argument.
    pub fn accessor(&self, name: &str) -> Option<&ArgumentAccessor> {
        self.accessors.iter().find(|a| a.name() == name)
    }

    /// Root parameter index of the named argument: its position in declaration order.
    pub fn root_index(&self, name: &str) -> Option<u32> {
        self.accessors
            .iter()
            .position(|a| a.name() == name)
            .map(|i| i as u32)
    }

    /// Reserve `length` descriptor slots in `heap` for arguments of the given access policy.
    ///
    /// Constant ranges are reserved once per heap kind and FrameConstant ranges once per
    /// (heap kind, frame index); later calls return the cached range so every binding set of the
    /// program writes into the same slots. Mutable ranges are reserved fresh on every call.
    ///
    /// Returns the range and whether the caller owns it. Only owned ranges may be released by
    /// the caller; shared ranges are released by the program itself on drop.
    pub fn reserve_descriptor_range(
        &self,
        heap: &Arc<DescriptorHeap>,
        access: AccessPolicy,
        length: u32,
        frame_index: u32,
    ) -> Result<(HeapRange, bool)> {
        if access == AccessPolicy::Mutable {
            return Ok((heap.reserve_range(length)?, true));
        }

        let key = SharedRangeKey {
            heap_kind: heap.kind(),
            access,
            frame_index: match access {
                AccessPolicy::FrameConstant => Some(frame_index),
                _ => None,
            },
        };
        let mut shared = self.shared_ranges.lock().map_err(Error::from)?;
        if let Some(entry) = shared.get(&key) {
            debug_assert!(entry.range.length() >= length);
            return Ok((entry.range, false));
        }
        let range = heap.reserve_range(length)?;
        shared.insert(
            key,
            SharedRange {
                heap: Arc::downgrade(heap),
                range,
            },
        );
        trace!(
            "Program '{}' reserved shared {:?} range [{}, {}) in {:?} heap",
            self.name,
            access,
            range.start(),
            range.end(),
            heap.kind()
        );
        Ok((range, false))
    }
}

impl Drop for Program {
    fn drop(&mut self) {
        let Ok(mut shared) = self.shared_ranges.lock() else {
            return;
        };
        for (_, entry) in shared.drain() {
            let Some(heap) = entry.heap.upgrade() else {
                continue;
            };
            if let Err(err) = heap.release_range(entry.range) {
                warn!(
                    "Program '{}' failed to release a shared descriptor range: {}",
                    self.name, err
                );
            }
        }
    }
}

/// Builds a [`Program`] from per-stage argument declarations, merging same-named arguments
/// declared by multiple stages into a single accessor.
pub struct ProgramBuilder {
    name: String,
    accessors: Vec<ArgumentAccessor>,
    error: Option<anyhow::Error>,
}

impl ProgramBuilder {
    /// Declare an argument. When an argument of the same name was already declared by another
    /// stage the declarations are merged; mismatched settings fail the final
    /// [`build`](ProgramBuilder::build).
    pub fn with_argument(mut self, accessor: ArgumentAccessor) -> Self {
        if self.error.is_some() {
            return self;
        }
        match self.accessors.iter_mut().find(|a| a.name() == accessor.name()) {
            Some(existing) => {
                if let Err(err) = existing.merge(&accessor) {
                    self.error = Some(err);
                }
            }
            None => self.accessors.push(accessor),
        }
        self
    }

    /// Finish the program.
    pub fn build(self) -> Result<Arc<Program>> {
        if let Some(err) = self.error {
            return Err(err);
        }
        Ok(Arc::new(Program {
            name: self.name,
            accessors: self.accessors,
            shared_ranges: Mutex::new(HashMap::new()),
        }))
    }
}
