//! The context: the native device, the descriptor manager and the command list pool.

use std::sync::Arc;

use anyhow::Result;

use crate::backend::{NativeBindingSink, NativeDevice};
use crate::command::list::CommandList;
use crate::descriptor::manager::{DescriptorManager, DescriptorManagerSettings};
use crate::resource::pool::{Pool, Poolable, Pooled};

/// Context configuration.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContextSettings {
    /// Descriptor heap capacities and the deferred-allocation switch.
    pub descriptors: DescriptorManagerSettings,
}

/// Owns what every component needs a piece of: the native device, the descriptor manager and
/// the pool command lists are recycled through once their batch completes.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Context {
    device: Arc<dyn NativeDevice>,
    descriptors: Arc<DescriptorManager>,
    #[derivative(Debug = "ignore")]
    list_pool: Pool<CommandList>,
}

impl Context {
    /// Create a context over a native device. `sink_factory` produces the per-command-list
    /// binding sink whenever the pool needs a fresh list.
    pub fn new(
        device: Arc<dyn NativeDevice>,
        sink_factory: impl Fn() -> Box<dyn NativeBindingSink> + Send + 'static,
        settings: ContextSettings,
    ) -> Result<Self> {
        let descriptors = Arc::new(DescriptorManager::new(device.clone(), settings.descriptors)?);
        let list_pool = Pool::new(move || Ok(CommandList::new(sink_factory())), None)?;
        Ok(Self {
            device,
            descriptors,
            list_pool,
        })
    }

    /// The native device.
    pub fn device(&self) -> &Arc<dyn NativeDevice> {
        &self.device
    }

    /// The descriptor manager.
    pub fn descriptors(&self) -> &Arc<DescriptorManager> {
        &self.descriptors
    }

    /// Grab a command list from the pool, allocating a new one when the pool is empty. The
    /// list returns to the pool when its batch completes and the last holder drops it.
    pub fn allocate_command_list(&self) -> Result<Pooled<CommandList>> {
        CommandList::new_in_pool(&self.list_pool)
    }

    /// Run the deferred descriptor tick: allocate deferred heaps, then complete the
    /// initialization of every binding set waiting on them.
    pub fn complete_deferred_actions(&self) -> Result<()> {
        self.descriptors.complete_deferred_initialization()
    }

    /// Number of command lists currently idle in the pool.
    pub fn idle_command_lists(&self) -> usize {
        self.list_pool.idle_count()
    }
}
