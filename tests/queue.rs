use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};

use deimos::prelude::*;

mod framework;

fn finished_list(ctx: &framework::TestContext) -> Result<Pooled<CommandList>> {
    let mut cmd = ctx.context.allocate_command_list()?;
    cmd.finish()?;
    Ok(cmd)
}

#[test]
pub fn batches_complete_in_submission_order() -> Result<()> {
    let ctx = framework::make_context()?;
    ctx.device.hold_submissions(true);
    let queue = CommandQueue::new(ctx.device.clone(), "ordered")?;
    let order = Arc::new(Mutex::new(Vec::new()));
    for id in 0..3u32 {
        let order = order.clone();
        queue.execute(
            vec![finished_list(&ctx)?],
            Some(Box::new(move || order.lock().unwrap().push(id))),
        )?;
    }
    assert_eq!(queue.pending_batch_count(), 3);

    // Signal the fences newest-first; completion must still follow submission order.
    let fences = ctx.device.held_fences();
    assert_eq!(fences.len(), 3);
    for fence in fences.iter().rev() {
        fence.signal();
    }
    assert!(
        framework::wait_until(|| queue.pending_batch_count() == 0),
        "all batches should complete once every fence is signaled"
    );
    assert_eq!(
        *order.lock().unwrap(),
        vec![0, 1, 2],
        "completion callbacks must run in submission order"
    );
    Ok(())
}

#[test]
pub fn complete_execution_drains_synchronously() -> Result<()> {
    let ctx = framework::make_context()?;
    ctx.device.hold_submissions(true);
    let queue = CommandQueue::new(ctx.device.clone(), "drained")?;
    let completed = Arc::new(AtomicU32::new(0));
    for _ in 0..2 {
        let completed = completed.clone();
        queue.execute(
            vec![finished_list(&ctx)?],
            Some(Box::new(move || {
                completed.fetch_add(1, Ordering::SeqCst);
            })),
        )?;
    }
    ctx.device.signal_all();
    queue.complete_execution(None)?;
    assert_eq!(queue.pending_batch_count(), 0);
    assert_eq!(completed.load(Ordering::SeqCst), 2);
    // Draining an already-empty queue is fine, and callbacks never run twice.
    queue.complete_execution(None)?;
    assert_eq!(completed.load(Ordering::SeqCst), 2);
    Ok(())
}

#[test]
pub fn per_frame_drain_leaves_other_frames_pending() -> Result<()> {
    let ctx = framework::make_context()?;
    ctx.device.hold_submissions(true);
    let queue = CommandQueue::new(ctx.device.clone(), "framed")?;
    let completed = Arc::new(Mutex::new(Vec::new()));
    for frame in 0..2u32 {
        ctx.device.set_frame_index(frame);
        let completed = completed.clone();
        queue.execute(
            vec![finished_list(&ctx)?],
            Some(Box::new(move || completed.lock().unwrap().push(frame))),
        )?;
    }

    // Only frame 0's fence signals; draining frame 0 must not touch frame 1.
    ctx.device.held_fences()[0].signal();
    queue.complete_execution(Some(0))?;
    assert_eq!(*completed.lock().unwrap(), vec![0]);
    assert_eq!(
        queue.pending_batch_count(),
        1,
        "the frame-1 batch stays pending after a frame-0 drain"
    );

    ctx.device.signal_all();
    queue.complete_execution(None)?;
    assert_eq!(*completed.lock().unwrap(), vec![0, 1]);
    Ok(())
}

#[test]
pub fn frame_drain_stops_at_an_older_pending_batch() -> Result<()> {
    let ctx = framework::make_context()?;
    ctx.device.hold_submissions(true);
    let queue = CommandQueue::new(ctx.device.clone(), "front only")?;
    let completed = Arc::new(Mutex::new(Vec::new()));
    for frame in [1u32, 0] {
        ctx.device.set_frame_index(frame);
        let completed = completed.clone();
        queue.execute(
            vec![finished_list(&ctx)?],
            Some(Box::new(move || completed.lock().unwrap().push(frame))),
        )?;
    }

    // The frame-0 batch is ready, but it sits behind the still-pending frame-1 batch, so a
    // frame-0 drain may not complete anything.
    ctx.device.held_fences()[1].signal();
    queue.complete_execution(Some(0))?;
    assert!(
        completed.lock().unwrap().is_empty(),
        "a drain must never complete a batch past a pending older one"
    );
    assert_eq!(queue.pending_batch_count(), 2);

    ctx.device.signal_all();
    assert!(
        framework::wait_until(|| queue.pending_batch_count() == 0),
        "both batches complete once every fence is signaled"
    );
    assert_eq!(
        *completed.lock().unwrap(),
        vec![1, 0],
        "once everything signals, completion follows submission order"
    );
    Ok(())
}

#[test]
pub fn completed_lists_return_to_the_pool() -> Result<()> {
    let ctx = framework::make_context()?;
    let queue = CommandQueue::new(ctx.device.clone(), "pooled")?;
    assert_eq!(ctx.context.idle_command_lists(), 0);
    queue.execute(vec![finished_list(&ctx)?], None)?;
    queue.complete_execution(None)?;
    assert!(
        framework::wait_until(|| ctx.context.idle_command_lists() == 1),
        "the completed batch must hand its list back to the pool"
    );
    // The recycled list comes back in the recording state.
    let cmd = ctx.context.allocate_command_list()?;
    assert!(cmd.is_recording());
    Ok(())
}

#[test]
pub fn teardown_drains_pending_batches() -> Result<()> {
    let ctx = framework::make_context()?;
    ctx.device.hold_submissions(true);
    let queue = CommandQueue::new(ctx.device.clone(), "torn down")?;
    let completed = Arc::new(AtomicU32::new(0));
    {
        let completed = completed.clone();
        queue.execute(
            vec![finished_list(&ctx)?],
            Some(Box::new(move || {
                completed.fetch_add(1, Ordering::SeqCst);
            })),
        )?;
    }
    ctx.device.signal_all();
    drop(queue);
    assert_eq!(
        completed.load(Ordering::SeqCst),
        1,
        "dropping the queue must complete what was submitted"
    );
    Ok(())
}

/// A device whose fences always fail to wait, to exercise the background-thread failure path.
#[derive(Debug)]
struct FailingDevice;

#[derive(Debug)]
struct FailingFence;

impl NativeFence for FailingFence {
    fn wait(&self, _timeout: Option<Duration>) -> Result<bool> {
        bail!("device lost")
    }

    fn is_signaled(&self) -> Result<bool> {
        Ok(false)
    }

    fn reset(&self) -> Result<()> {
        Ok(())
    }
}

impl NativeDevice for FailingDevice {
    fn allocate_descriptor_heap(&self, _kind: HeapKind, _capacity: u32) -> Result<()> {
        Ok(())
    }

    fn copy_descriptors(
        &self,
        _kind: HeapKind,
        _first_slot: u32,
        _views: &[ResourceView],
    ) -> Result<()> {
        Ok(())
    }

    fn create_fence(&self) -> Result<Box<dyn NativeFence>> {
        Ok(Box::new(FailingFence))
    }

    fn submit(&self, _list_count: usize) -> Result<Box<dyn NativeFence>> {
        Ok(Box::new(FailingFence))
    }

    fn current_frame_index(&self) -> u32 {
        0
    }

    fn frames_in_flight(&self) -> u32 {
        2
    }
}

#[test]
pub fn background_failure_is_rethrown_on_the_next_interaction() -> Result<()> {
    let queue = CommandQueue::new(Arc::new(FailingDevice), "failing")?;
    queue.execute(vec![], None)?;
    // The completion thread picks the batch up, fails the fence wait and stores the failure.
    std::thread::sleep(Duration::from_millis(200));
    let err = queue
        .execute(vec![], None)
        .expect_err("the captured background failure must be rethrown");
    assert!(
        matches!(err.downcast_ref::<Error>(), Some(Error::ExecutionThread(_))),
        "expected ExecutionThread, got {err}"
    );
    Ok(())
}
