//! Command lists: recording state, applied-bindings tracking and render-pass attachment
//! states.

use std::sync::Arc;

use anyhow::Result;

use crate::backend::NativeBindingSink;
use crate::error::Error;
use crate::program::bindings::ProgramBindingSet;
use crate::resource::pool::Poolable;
use crate::resource::state::{BarrierBatch, ResourceState, StateTransition};
use crate::resource::Resource;

/// Lifecycle of a command list between two trips through the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandListState {
    /// Open for recording.
    Recording,
    /// Closed by [`CommandList::finish`], ready to execute.
    Finished,
}

/// Attachments of one render pass.
#[derive(Debug, Clone, Default)]
pub struct RenderPassDesc {
    /// Color attachments, transitioned to `RenderTarget` at pass begin.
    pub color_attachments: Vec<Arc<Resource>>,
    /// Optional depth attachment, transitioned to `DepthWrite` at pass begin.
    pub depth_attachment: Option<Arc<Resource>>,
    /// The last pass of the frame: its color attachments are transitioned to `Present` at pass
    /// end.
    pub is_final_pass: bool,
}

/// A recordable command list over a [`NativeBindingSink`].
///
/// Tracks the binding set currently applied to it (for the incremental apply modes) and
/// retains every applied set until the list returns to its pool, keeping bound resources alive
/// for as long as the recorded commands may reference them.
#[derive(Debug)]
pub struct CommandList {
    sink: Box<dyn NativeBindingSink>,
    state: CommandListState,
    applied_bindings: Option<Arc<ProgramBindingSet>>,
    retained_bindings: Vec<Arc<ProgramBindingSet>>,
    render_pass: Option<RenderPassDesc>,
}

impl CommandList {
    /// A fresh command list in the recording state.
    pub fn new(sink: Box<dyn NativeBindingSink>) -> Self {
        Self {
            sink,
            state: CommandListState::Recording,
            applied_bindings: None,
            retained_bindings: Vec::new(),
            render_pass: None,
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> CommandListState {
        self.state
    }

    /// Whether the list is open for recording.
    pub fn is_recording(&self) -> bool {
        self.state == CommandListState::Recording
    }

    /// The binding set most recently applied to this list.
    pub fn applied_bindings(&self) -> Option<Arc<ProgramBindingSet>> {
        self.applied_bindings.clone()
    }

    pub(crate) fn set_applied_bindings(&mut self, bindings: Arc<ProgramBindingSet>) {
        self.retained_bindings.push(bindings.clone());
        self.applied_bindings = Some(bindings);
    }

    pub(crate) fn emit_barriers(&mut self, barriers: &[StateTransition]) {
        if barriers.is_empty() {
            return;
        }
        self.sink.emit_barriers(barriers);
    }

    pub(crate) fn bind_descriptor_table(&mut self, root_index: u32, base_slot: u32) {
        self.sink.bind_descriptor_table(root_index, base_slot);
    }

    pub(crate) fn bind_buffer_address(&mut self, root_index: u32, address: u64) {
        self.sink.bind_buffer_address(root_index, address);
    }

    pub(crate) fn set_root_constant(&mut self, root_index: u32, data: &[u8]) {
        self.sink.set_root_constant(root_index, data);
    }

    /// Begin a render pass, settling the attachment states. A still-active pass is ended first,
    /// running its own exit transitions.
    ///
    /// An attachment still in `Undefined` or `Common` is first force-set, without a barrier, to
    /// the state it is assumed to arrive in: `Present` for the color attachments of a final
    /// pass (they come from the swapchain), `RenderTarget` otherwise, and `DepthWrite` for the
    /// depth attachment. All attachments are then transitioned to their write state, so a
    /// final-pass color attachment gets its `Present -> RenderTarget` barrier even on first
    /// use.
    pub fn begin_render_pass(&mut self, desc: &RenderPassDesc) -> Result<()> {
        if !self.is_recording() {
            return Err(Error::NotRecording.into());
        }
        if self.render_pass.is_some() {
            self.end_render_pass()?;
        }
        let color_initial = if desc.is_final_pass {
            ResourceState::Present
        } else {
            ResourceState::RenderTarget
        };
        let mut barriers = BarrierBatch::new();
        for attachment in &desc.color_attachments {
            Self::init_attachment_state(attachment, color_initial);
            attachment.set_state(ResourceState::RenderTarget, &mut barriers);
        }
        if let Some(depth) = &desc.depth_attachment {
            Self::init_attachment_state(depth, ResourceState::DepthWrite);
            depth.set_state(ResourceState::DepthWrite, &mut barriers);
        }
        self.emit_barriers(&barriers.take());
        self.render_pass = Some(desc.clone());
        Ok(())
    }

    fn init_attachment_state(attachment: &Arc<Resource>, initial: ResourceState) {
        if matches!(
            attachment.state(),
            ResourceState::Undefined | ResourceState::Common
        ) {
            attachment.force_state(initial);
        }
    }

    /// End the current render pass. The color attachments of a final pass are transitioned to
    /// `Present`.
    pub fn end_render_pass(&mut self) -> Result<()> {
        if !self.is_recording() {
            return Err(Error::NotRecording.into());
        }
        let desc = self.render_pass.take().ok_or(Error::NoActiveRenderPass)?;
        if desc.is_final_pass {
            let mut barriers = BarrierBatch::new();
            for attachment in &desc.color_attachments {
                attachment.set_state(ResourceState::Present, &mut barriers);
            }
            self.emit_barriers(&barriers.take());
        }
        Ok(())
    }

    /// Close the list for execution. Recording into a finished list is an error until it
    /// returns to its pool.
    pub fn finish(&mut self) -> Result<()> {
        if !self.is_recording() {
            return Err(Error::NotRecording.into());
        }
        if self.render_pass.is_some() {
            self.end_render_pass()?;
        }
        self.state = CommandListState::Finished;
        Ok(())
    }
}

impl Poolable for CommandList {
    fn on_release(&mut self) {
        self.state = CommandListState::Recording;
        self.applied_bindings = None;
        self.retained_bindings.clear();
        self.render_pass = None;
    }
}
