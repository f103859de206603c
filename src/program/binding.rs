//! A single argument's bound value inside a program binding set.

use anyhow::Result;

use crate::descriptor::heap::HeapKind;
use crate::error::Error;
use crate::program::argument::{AccessPolicy, ArgumentAccessor};
use crate::resource::{ResourceUsage, ResourceView};

/// Resolved descriptor location of an argument: the heap kind plus the absolute index of its
/// first slot. Slots belong to the owning binding set, not to the (possibly shared) argument
/// binding, since two sets sharing a binding still own distinct Mutable descriptor ranges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorSlot {
    /// Heap the descriptors live in.
    pub heap_kind: HeapKind,
    /// Absolute index of the argument's first slot.
    pub index: u32,
}

/// The mutable bound value of one program argument: its resource views or root-constant bytes.
///
/// Validation happens here, at the moment of mutation; the owning
/// [`ProgramBindingSet`](crate::program::bindings::ProgramBindingSet) handles descriptor copies
/// and barrier bookkeeping.
#[derive(Debug, Clone)]
pub struct ArgumentBinding {
    accessor: ArgumentAccessor,
    views: Vec<ResourceView>,
    root_constant: Vec<u8>,
    constant_written: bool,
}

impl ArgumentBinding {
    /// An unbound binding for the given declaration. Root-constant arguments start with a zeroed
    /// value of the declared size.
    pub fn new(accessor: ArgumentAccessor) -> Self {
        let root_constant = if accessor.is_root_constant() {
            vec![0; accessor.constant_size() as usize]
        } else {
            Vec::new()
        };
        Self {
            accessor,
            views: Vec::new(),
            root_constant,
            constant_written: false,
        }
    }

    /// The argument declaration this binding is for.
    pub fn accessor(&self) -> &ArgumentAccessor {
        &self.accessor
    }

    /// Currently bound resource views.
    pub fn views(&self) -> &[ResourceView] {
        &self.views
    }

    /// Current root-constant bytes. Zeroed until the first
    /// [`set_root_constant`](ArgumentBinding::set_root_constant).
    pub fn root_constant(&self) -> &[u8] {
        &self.root_constant
    }

    /// True once the argument has a usable value. Root constants always have one, since they
    /// start with a zeroed value of the declared size.
    pub fn is_bound(&self) -> bool {
        self.accessor.is_root_constant() || !self.views.is_empty()
    }

    /// Whether a root-constant value was explicitly written.
    pub fn is_constant_written(&self) -> bool {
        self.constant_written
    }

    /// Bind resource views, replacing any previous value.
    ///
    /// Returns `Ok(None)` when the new views equal the current ones, making the call a no-op.
    /// On an actual change the previously bound views are returned so the owner can drop queued
    /// barriers for resources no longer referenced.
    ///
    /// A [`Constant`](AccessPolicy::Constant) argument rejects any second, different binding.
    pub fn set_resource_views(
        &mut self,
        views: Vec<ResourceView>,
    ) -> Result<Option<Vec<ResourceView>>> {
        let name = self.accessor.name();
        if self.accessor.is_root_constant() {
            return Err(Error::RootConstantArgument(name.to_owned()).into());
        }
        if views.is_empty() {
            return Err(Error::EmptyBinding(name.to_owned()).into());
        }
        if views.len() as u32 > self.accessor.resource_count() {
            return Err(Error::ResourceCountExceeded {
                argument: name.to_owned(),
                declared: self.accessor.resource_count(),
                bound: views.len() as u32,
            }
            .into());
        }
        for view in &views {
            let resource = view.resource();
            if resource.kind() != self.accessor.resource_kind() {
                return Err(Error::IncompatibleResourceKind {
                    argument: name.to_owned(),
                    expected: self.accessor.resource_kind(),
                    actual: resource.kind(),
                }
                .into());
            }
            if self.accessor.is_addressable() {
                if !resource.usage().contains(ResourceUsage::ADDRESSABLE) {
                    return Err(Error::NotAddressable(name.to_owned()).into());
                }
            } else if view.offset() != 0 {
                return Err(Error::UnexpectedViewOffset(name.to_owned()).into());
            }
        }
        if self.views == views {
            return Ok(None);
        }
        if self.accessor.access() == AccessPolicy::Constant && !self.views.is_empty() {
            return Err(Error::ConstantModification(name.to_owned()).into());
        }
        let old_views = std::mem::replace(&mut self.views, views);
        Ok(Some(old_views))
    }

    /// Write a root-constant value.
    ///
    /// Returns `Ok(false)` when the bytes equal the current value. A
    /// [`Constant`](AccessPolicy::Constant) argument rejects a second, different value.
    pub fn set_root_constant(&mut self, bytes: &[u8]) -> Result<bool> {
        let name = self.accessor.name();
        if !self.accessor.is_root_constant() {
            return Err(Error::NotRootConstant(name.to_owned()).into());
        }
        if bytes.len() as u32 != self.accessor.constant_size() {
            return Err(Error::RootConstantSizeMismatch {
                argument: name.to_owned(),
                expected: self.accessor.constant_size(),
                actual: bytes.len() as u32,
            }
            .into());
        }
        if self.constant_written && self.root_constant == bytes {
            return Ok(false);
        }
        if self.constant_written && self.accessor.access() == AccessPolicy::Constant {
            return Err(Error::ConstantModification(name.to_owned()).into());
        }
        self.root_constant.copy_from_slice(bytes);
        self.constant_written = true;
        Ok(true)
    }
}
