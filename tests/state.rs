use std::sync::Arc;

use anyhow::Result;

use deimos::prelude::*;

mod framework;

#[test]
pub fn transitions_are_flushed_per_apply() -> Result<()> {
    let ctx = framework::make_context()?;
    let program = framework::texture_program(AccessPolicy::Mutable)?;
    let texture = framework::texture("streamed texture");

    // An upload elsewhere moves the texture to CopyDestination first.
    let mut upload_barriers = BarrierBatch::new();
    assert!(texture.set_state(ResourceState::CopyDestination, &mut upload_barriers));
    let upload = upload_barriers.take();
    assert_eq!(upload.len(), 1);
    assert_eq!(upload[0].before, ResourceState::Undefined);
    assert_eq!(upload[0].after, ResourceState::CopyDestination);

    // Applying a binding set that samples the texture schedules and flushes the second hop.
    let bindings = ProgramBindingSet::new(
        &ctx.context,
        program,
        [("g_texture", vec![ResourceView::of(&texture)])],
        0,
    )?;
    let mut cmd = ctx.context.allocate_command_list()?;
    bindings.apply(&mut cmd, ApplyBehavior::ALL_INCREMENTAL)?;
    let calls = ctx.log.take();
    let barrier_position = calls
        .iter()
        .position(|call| matches!(call, SinkCall::EmitBarriers { .. }))
        .expect("apply must emit a barrier list");
    let bind_position = calls
        .iter()
        .position(|call| matches!(call, SinkCall::BindDescriptorTable { .. }))
        .expect("apply must bind the descriptor table");
    assert!(
        barrier_position < bind_position,
        "barriers must reach the command list before any bind write"
    );
    match &calls[barrier_position] {
        SinkCall::EmitBarriers {
            transitions,
        } => {
            assert_eq!(
                transitions,
                &vec![(
                    "streamed texture".to_owned(),
                    ResourceState::CopyDestination,
                    ResourceState::ShaderRead
                )]
            );
        }
        _ => unreachable!(),
    }
    assert_eq!(texture.state(), ResourceState::ShaderRead);

    // A second apply finds the state settled and emits no further barriers.
    bindings.apply(&mut cmd, ApplyBehavior::STATE_BARRIERS)?;
    assert!(
        !ctx.log
            .take()
            .iter()
            .any(|call| matches!(call, SinkCall::EmitBarriers { .. })),
        "an already-transitioned resource needs no second barrier"
    );
    Ok(())
}

#[test]
pub fn batch_merges_transitions_of_the_same_resource() -> Result<()> {
    let texture = framework::texture("merged");
    let mut batch = BarrierBatch::new();
    assert!(texture.set_state(ResourceState::CopyDestination, &mut batch));
    assert!(texture.set_state(ResourceState::ShaderRead, &mut batch));
    let transitions = batch.take();
    assert_eq!(transitions.len(), 1, "same-resource transitions merge before the flush");
    assert_eq!(transitions[0].before, ResourceState::Undefined);
    assert_eq!(transitions[0].after, ResourceState::ShaderRead);
    Ok(())
}

#[test]
pub fn round_trip_transitions_cancel_before_the_flush() -> Result<()> {
    let texture = framework::texture("bounced");
    let mut batch = BarrierBatch::new();
    assert!(texture.set_state(ResourceState::CopyDestination, &mut batch));
    assert!(texture.set_state(ResourceState::Undefined, &mut batch));
    assert!(
        batch.is_empty(),
        "a transition undone before the flush must not leave a degenerate barrier"
    );
    assert_eq!(texture.state(), ResourceState::Undefined);
    Ok(())
}

#[test]
pub fn batch_drops_removed_resources() -> Result<()> {
    let kept = framework::texture("kept");
    let dropped = framework::texture("dropped");
    let mut batch = BarrierBatch::new();
    kept.set_state(ResourceState::ShaderRead, &mut batch);
    dropped.set_state(ResourceState::ShaderRead, &mut batch);
    batch.remove_transitions_for(&dropped);
    let transitions = batch.take();
    assert_eq!(transitions.len(), 1);
    assert!(Arc::ptr_eq(&transitions[0].resource, &kept));
    Ok(())
}

#[test]
pub fn fresh_attachments_promote_without_barriers() -> Result<()> {
    let ctx = framework::make_context()?;
    let color = Resource::new(
        "backbuffer",
        ResourceKind::Texture,
        ResourceUsage::RENDER_TARGET,
    );
    let mut cmd = ctx.context.allocate_command_list()?;
    cmd.begin_render_pass(&RenderPassDesc {
        color_attachments: vec![color.clone()],
        depth_attachment: None,
        is_final_pass: false,
    })?;
    assert!(
        ctx.log.take().is_empty(),
        "an Undefined attachment is promoted without a barrier"
    );
    assert_eq!(color.state(), ResourceState::RenderTarget);
    cmd.end_render_pass()?;
    Ok(())
}

#[test]
pub fn used_attachments_transition_with_barriers() -> Result<()> {
    let ctx = framework::make_context()?;
    let color = Resource::new(
        "backbuffer",
        ResourceKind::Texture,
        ResourceUsage::RENDER_TARGET | ResourceUsage::SHADER_READ,
    );
    color.force_state(ResourceState::ShaderRead);
    let depth = Resource::new(
        "depth",
        ResourceKind::Texture,
        ResourceUsage::DEPTH_STENCIL,
    );
    let mut cmd = ctx.context.allocate_command_list()?;
    cmd.begin_render_pass(&RenderPassDesc {
        color_attachments: vec![color.clone()],
        depth_attachment: Some(depth.clone()),
        is_final_pass: true,
    })?;
    let calls = ctx.log.take();
    assert!(
        calls.iter().any(|call| matches!(
            call,
            SinkCall::EmitBarriers { transitions }
                if transitions.contains(&(
                    "backbuffer".to_owned(),
                    ResourceState::ShaderRead,
                    ResourceState::RenderTarget
                ))
        )),
        "a previously sampled attachment needs a transition barrier"
    );
    assert_eq!(depth.state(), ResourceState::DepthWrite);

    // Ending the final pass hands the color attachment to the swapchain.
    cmd.end_render_pass()?;
    assert_eq!(color.state(), ResourceState::Present);
    assert!(ctx.log.calls().iter().any(|call| matches!(
        call,
        SinkCall::EmitBarriers { transitions }
            if transitions.contains(&(
                "backbuffer".to_owned(),
                ResourceState::RenderTarget,
                ResourceState::Present
            ))
    )));
    Ok(())
}

#[test]
pub fn fresh_final_pass_attachments_arrive_presentable() -> Result<()> {
    let ctx = framework::make_context()?;
    let color = Resource::new(
        "swapchain image",
        ResourceKind::Texture,
        ResourceUsage::RENDER_TARGET,
    );
    let mut cmd = ctx.context.allocate_command_list()?;
    cmd.begin_render_pass(&RenderPassDesc {
        color_attachments: vec![color.clone()],
        depth_attachment: None,
        is_final_pass: true,
    })?;
    // A swapchain attachment first seen by the final pass comes out of presentation, so pass
    // entry must still emit the barrier into the writable state.
    assert!(
        ctx.log.calls().iter().any(|call| matches!(
            call,
            SinkCall::EmitBarriers { transitions }
                if transitions.contains(&(
                    "swapchain image".to_owned(),
                    ResourceState::Present,
                    ResourceState::RenderTarget
                ))
        )),
        "a fresh final-pass attachment needs a Present -> RenderTarget barrier at pass begin"
    );
    assert_eq!(color.state(), ResourceState::RenderTarget);
    cmd.end_render_pass()?;
    assert_eq!(color.state(), ResourceState::Present);
    Ok(())
}

#[test]
pub fn beginning_a_pass_ends_the_active_one() -> Result<()> {
    let ctx = framework::make_context()?;
    let first = Resource::new(
        "final target",
        ResourceKind::Texture,
        ResourceUsage::RENDER_TARGET,
    );
    let second = Resource::new(
        "offscreen target",
        ResourceKind::Texture,
        ResourceUsage::RENDER_TARGET,
    );
    let mut cmd = ctx.context.allocate_command_list()?;
    cmd.begin_render_pass(&RenderPassDesc {
        color_attachments: vec![first.clone()],
        depth_attachment: None,
        is_final_pass: true,
    })?;
    cmd.begin_render_pass(&RenderPassDesc {
        color_attachments: vec![second.clone()],
        depth_attachment: None,
        is_final_pass: false,
    })?;
    assert_eq!(
        first.state(),
        ResourceState::Present,
        "the implicitly ended final pass must still hand its attachment to the swapchain"
    );
    assert_eq!(second.state(), ResourceState::RenderTarget);
    cmd.end_render_pass()?;
    Ok(())
}

#[test]
pub fn ending_without_a_pass_fails() -> Result<()> {
    let ctx = framework::make_context()?;
    let mut cmd = ctx.context.allocate_command_list()?;
    let err = cmd
        .end_render_pass()
        .expect_err("end_render_pass requires an active pass");
    assert!(matches!(
        err.downcast_ref::<Error>(),
        Some(Error::NoActiveRenderPass)
    ));
    Ok(())
}

#[test]
pub fn finished_lists_reject_recording() -> Result<()> {
    let ctx = framework::make_context()?;
    let program = framework::texture_program(AccessPolicy::Mutable)?;
    let texture = framework::texture("color");
    let bindings = ProgramBindingSet::new(
        &ctx.context,
        program,
        [("g_texture", vec![ResourceView::of(&texture)])],
        0,
    )?;
    let mut cmd = ctx.context.allocate_command_list()?;
    cmd.finish()?;
    let err = bindings
        .apply(&mut cmd, ApplyBehavior::ALL_INCREMENTAL)
        .expect_err("a finished list can not record binds");
    assert!(matches!(err.downcast_ref::<Error>(), Some(Error::NotRecording)));
    Ok(())
}
