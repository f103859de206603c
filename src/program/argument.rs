//! The shader argument model: names, stages, access policies and accessor metadata.

use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use bitflags::bitflags;

use crate::error::Error;
use crate::resource::ResourceKind;

bitflags! {
    /// Shader stages an argument is visible to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ShaderStages: u32 {
        /// Vertex stage.
        const VERTEX = 1 << 0;
        /// Pixel (fragment) stage.
        const PIXEL = 1 << 1;
        /// Compute stage.
        const COMPUTE = 1 << 2;
    }
}

impl fmt::Display for ShaderStages {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, flag) in [
            ("VS", ShaderStages::VERTEX),
            ("PS", ShaderStages::PIXEL),
            ("CS", ShaderStages::COMPUTE),
        ] {
            if self.contains(flag) {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// How often the resources bound to an argument are expected to change. Drives both descriptor
/// range placement (one sub-range per policy) and the bind-once rule for
/// [`Constant`](AccessPolicy::Constant) arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessPolicy {
    /// Bound once for the program's lifetime and shared between all of its binding sets.
    Constant,
    /// Constant within a frame; ranges are shared per (program, frame index).
    FrameConstant,
    /// Rebindable at any time; every binding set owns its own range.
    Mutable,
}

impl AccessPolicy {
    /// Number of distinct policies, for per-policy arrays.
    pub const COUNT: usize = 3;

    /// Every policy, in range-layout order.
    pub const ALL: [AccessPolicy; Self::COUNT] = [
        AccessPolicy::Constant,
        AccessPolicy::FrameConstant,
        AccessPolicy::Mutable,
    ];

    /// Stable index of this policy into per-policy arrays.
    pub fn index(self) -> usize {
        match self {
            AccessPolicy::Constant => 0,
            AccessPolicy::FrameConstant => 1,
            AccessPolicy::Mutable => 2,
        }
    }
}

/// What kind of value an argument carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// A single resource view, bound through a descriptor table or directly by GPU address.
    ResourceView,
    /// An array of resource views occupying consecutive descriptor slots.
    ResourceViewArray,
    /// An inline constant value written directly into the root signature.
    RootConstant,
}

/// Identity of a shader argument: its name plus the union of stages that declare it.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProgramArgument {
    stages: ShaderStages,
    name: Arc<str>,
}

impl ProgramArgument {
    /// Argument `name` visible to `stages`.
    pub fn new(stages: ShaderStages, name: impl AsRef<str>) -> Self {
        Self {
            stages,
            name: Arc::from(name.as_ref()),
        }
    }

    /// Stages the argument is visible to.
    pub fn stages(&self) -> ShaderStages {
        self.stages
    }

    /// Argument name as declared in the shader.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ProgramArgument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.stages)
    }
}

/// Full declaration of one program argument: identity plus binding metadata. Immutable once the
/// owning program is built.
#[derive(Debug, Clone)]
pub struct ArgumentAccessor {
    argument: ProgramArgument,
    access: AccessPolicy,
    value_kind: ValueKind,
    resource_kind: ResourceKind,
    resource_count: u32,
    addressable: bool,
    constant_size: u32,
}

impl ArgumentAccessor {
    /// An argument bound through a single descriptor slot.
    pub fn resource_view(
        argument: ProgramArgument,
        access: AccessPolicy,
        resource_kind: ResourceKind,
    ) -> Self {
        Self {
            argument,
            access,
            value_kind: ValueKind::ResourceView,
            resource_kind,
            resource_count: 1,
            addressable: false,
            constant_size: 0,
        }
    }

    /// An argument bound through `resource_count` consecutive descriptor slots.
    pub fn resource_view_array(
        argument: ProgramArgument,
        access: AccessPolicy,
        resource_kind: ResourceKind,
        resource_count: u32,
    ) -> Self {
        Self {
            argument,
            access,
            value_kind: ValueKind::ResourceViewArray,
            resource_kind,
            resource_count,
            addressable: false,
            constant_size: 0,
        }
    }

    /// An inline root-constant argument of `constant_size` bytes.
    pub fn root_constant(argument: ProgramArgument, access: AccessPolicy, constant_size: u32) -> Self {
        Self {
            argument,
            access,
            value_kind: ValueKind::RootConstant,
            resource_kind: ResourceKind::Buffer,
            resource_count: 0,
            addressable: false,
            constant_size,
        }
    }

    /// Bind this argument directly by GPU address instead of through a descriptor table. Only
    /// meaningful for single-view buffer arguments.
    pub fn addressable(mut self) -> Self {
        self.addressable = true;
        self
    }

    /// Argument identity.
    pub fn argument(&self) -> &ProgramArgument {
        &self.argument
    }

    /// Argument name.
    pub fn name(&self) -> &str {
        self.argument.name()
    }

    /// Mutability class of the argument.
    pub fn access(&self) -> AccessPolicy {
        self.access
    }

    /// Kind of value the argument carries.
    pub fn value_kind(&self) -> ValueKind {
        self.value_kind
    }

    /// Resource category accepted by the argument.
    pub fn resource_kind(&self) -> ResourceKind {
        self.resource_kind
    }

    /// Number of descriptor slots the argument occupies. Zero for root constants and
    /// address-bound arguments, which consume no table slots.
    pub fn descriptor_count(&self) -> u32 {
        if self.value_kind == ValueKind::RootConstant || self.addressable {
            0
        } else {
            self.resource_count
        }
    }

    /// Declared view capacity of the argument.
    pub fn resource_count(&self) -> u32 {
        self.resource_count
    }

    /// Whether the argument is bound directly by GPU address.
    pub fn is_addressable(&self) -> bool {
        self.addressable
    }

    /// Whether the argument is an inline root constant.
    pub fn is_root_constant(&self) -> bool {
        self.value_kind == ValueKind::RootConstant
    }

    /// Declared root-constant size in bytes.
    pub fn constant_size(&self) -> u32 {
        self.constant_size
    }

    /// Merge the same argument declared by another shader stage into this accessor. The stage
    /// sets are united; every other field must match exactly.
    pub fn merge(&mut self, other: &ArgumentAccessor) -> Result<()> {
        if self.argument.name() != other.argument.name()
            || self.access != other.access
            || self.value_kind != other.value_kind
            || self.resource_kind != other.resource_kind
            || self.resource_count != other.resource_count
            || self.addressable != other.addressable
            || self.constant_size != other.constant_size
        {
            return Err(Error::ArgumentMergeConflict(self.argument.name().to_owned()).into());
        }
        self.argument = ProgramArgument {
            stages: self.argument.stages() | other.argument.stages(),
            name: self.argument.name.clone(),
        };
        Ok(())
    }
}
