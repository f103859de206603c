//! Backend-agnostic resource binding and descriptor allocation for GPU renderers
//!
//! Deimos models the part of a rendering abstraction that sits between shader programs and the
//! native GPU API: declaring program arguments, binding resources to them, placing their
//! descriptors in fixed-capacity heaps, tracking resource states, and executing command lists
//! on queues with asynchronous completion. Everything backend-specific goes through the two
//! small interfaces in [`backend`]; a headless implementation is included for tests and dry
//! runs.
//!
//! # Example
//!
//! ```
//! use deimos::prelude::*;
//!
//! fn run() -> anyhow::Result<()> {
//!     // A device and a call log to record what would reach the GPU.
//!     let device = HeadlessDevice::new(2);
//!     let log = CallLog::new();
//!     let sink_log = log.clone();
//!     let context = Context::new(
//!         device.clone(),
//!         move || Box::new(RecordingSink::new(sink_log.clone())) as Box<dyn NativeBindingSink>,
//!         ContextSettings::default(),
//!     )?;
//!
//!     // A program with a single mutable texture argument.
//!     let program = Program::builder("blit")
//!         .with_argument(ArgumentAccessor::resource_view(
//!             ProgramArgument::new(ShaderStages::PIXEL, "g_texture"),
//!             AccessPolicy::Mutable,
//!             ResourceKind::Texture,
//!         ))
//!         .build()?;
//!
//!     // Bind a texture and apply the set to a command list.
//!     let texture = Resource::new("color", ResourceKind::Texture, ResourceUsage::SHADER_READ);
//!     let bindings = ProgramBindingSet::new(
//!         &context,
//!         program,
//!         [("g_texture", vec![ResourceView::of(&texture)])],
//!         0,
//!     )?;
//!     let mut cmd = context.allocate_command_list()?;
//!     bindings.apply(&mut cmd, ApplyBehavior::ALL_INCREMENTAL)?;
//!     cmd.finish()?;
//!
//!     // Execute and wait for completion.
//!     let queue = CommandQueue::new(device, "main")?;
//!     queue.execute(vec![cmd], None)?;
//!     queue.complete_execution(None)?;
//!     Ok(())
//! }
//! # run().unwrap();
//! ```

#[macro_use]
extern crate derivative;
#[macro_use]
extern crate log;

pub mod prelude;
pub use crate::prelude::*;

pub mod backend;
pub mod command;
pub mod core;
pub mod descriptor;
pub mod error;
pub mod program;
pub mod resource;
pub mod sync;
