//! Command queues: batch submission and FIFO completion tracking on a background thread.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::JoinHandle;

use anyhow::Result;

use crate::backend::NativeDevice;
use crate::command::list::CommandList;
use crate::error::Error;
use crate::resource::pool::Pooled;
use crate::sync::Fence;

/// Callback invoked exactly once when a batch finishes execution. May run on the queue's
/// background thread or on the thread draining the queue synchronously.
pub type CompletionCallback = Box<dyn FnOnce() + Send>;

struct BatchPayload {
    lists: Vec<Pooled<CommandList>>,
    callback: Option<CompletionCallback>,
}

/// One submitted group of command lists, its completion fence and its frame tag.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct Batch {
    fence: Fence,
    frame_index: u32,
    completed: AtomicBool,
    #[derivative(Debug = "ignore")]
    payload: Mutex<Option<BatchPayload>>,
}

impl Batch {
    /// Frame buffer index the batch was submitted under.
    pub fn frame_index(&self) -> u32 {
        self.frame_index
    }

    /// Whether the batch has already completed.
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::SeqCst)
    }

    /// Release the batch's command lists back to their pool and run the completion callback.
    /// Idempotent: the queue's background thread and a synchronous drain may race to complete
    /// the same batch, only the first caller does the work.
    fn complete(&self) -> Result<()> {
        if self.completed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let payload = self.payload.lock().map_err(Error::from)?.take();
        if let Some(payload) = payload {
            drop(payload.lists);
            if let Some(callback) = payload.callback {
                callback();
            }
        }
        Ok(())
    }
}

#[derive(Derivative)]
#[derivative(Debug)]
struct QueueState {
    #[derivative(Debug = "ignore")]
    pending: VecDeque<Arc<Batch>>,
    stop: bool,
    failure: Option<String>,
}

#[derive(Debug)]
struct QueueShared {
    state: Mutex<QueueState>,
    condvar: Condvar,
}

/// A submission queue with exactly one background thread waiting on batch completion.
///
/// Submitted batches complete strictly in submission order on the background thread; a batch's
/// completion callback runs exactly once. A failure on the background thread stops it and is
/// rethrown as [`Error::ExecutionThread`] at the next interaction with the queue.
#[derive(Debug)]
pub struct CommandQueue {
    name: String,
    device: Arc<dyn NativeDevice>,
    shared: Arc<QueueShared>,
    worker: Option<JoinHandle<()>>,
}

impl CommandQueue {
    /// Create a queue and spawn its completion-waiting thread.
    pub fn new(device: Arc<dyn NativeDevice>, name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        let shared = Arc::new(QueueShared {
            state: Mutex::new(QueueState {
                pending: VecDeque::new(),
                stop: false,
                failure: None,
            }),
            condvar: Condvar::new(),
        });
        let worker = std::thread::Builder::new()
            .name(format!("{} completion", name))
            .spawn({
                let shared = shared.clone();
                let name = name.clone();
                move || Self::wait_for_execution(&shared, &name)
            })?;
        info!("Created command queue '{}'", name);
        Ok(Self {
            name,
            device,
            shared,
            worker: Some(worker),
        })
    }

    /// Queue name, used in logs and the completion thread's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Submit finished command lists as one batch. The batch is tagged with the device's
    /// current frame index; `callback` runs when the batch completes.
    pub fn execute(
        &self,
        lists: Vec<Pooled<CommandList>>,
        callback: Option<CompletionCallback>,
    ) -> Result<()> {
        self.rethrow_failure()?;
        debug_assert!(lists.iter().all(|list| !list.is_recording()));
        let fence = Fence::from_native(self.device.submit(lists.len())?);
        let frame_index = self.device.current_frame_index();
        let batch = Arc::new(Batch {
            fence,
            frame_index,
            completed: AtomicBool::new(false),
            payload: Mutex::new(Some(BatchPayload {
                lists,
                callback,
            })),
        });
        self.shared
            .state
            .lock()
            .map_err(Error::from)?
            .pending
            .push_back(batch);
        self.shared.condvar.notify_all();
        trace!("Queue '{}' submitted a batch for frame {}", self.name, frame_index);
        Ok(())
    }

    /// Synchronously wait out and complete pending batches on the calling thread: all of them,
    /// or the front batches tagged with `frame_index`. The drain never reaches past a pending
    /// batch of another frame, so completion stays in submission order.
    pub fn complete_execution(&self, frame_index: Option<u32>) -> Result<()> {
        self.rethrow_failure()?;
        self.drain(frame_index)
    }

    /// Number of batches submitted but not yet completed.
    pub fn pending_batch_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .map(|state| {
                state
                    .pending
                    .iter()
                    .filter(|batch| !batch.is_completed())
                    .count()
            })
            .unwrap_or(0)
    }

    // Pops only from the front so a younger batch can never complete past a pending older one.
    fn drain(&self, frame_index: Option<u32>) -> Result<()> {
        loop {
            let batch = {
                let mut state = self.shared.state.lock().map_err(Error::from)?;
                match state.pending.front() {
                    Some(front) if frame_index.map_or(true, |f| front.frame_index == f) => {
                        state.pending.pop_front().unwrap()
                    }
                    _ => break,
                }
            };
            batch.fence.wait()?;
            batch.complete()?;
        }
        // Wake the worker so it re-evaluates the now-shortened queue.
        self.shared.condvar.notify_all();
        Ok(())
    }

    fn rethrow_failure(&self) -> Result<()> {
        let mut state = self.shared.state.lock().map_err(Error::from)?;
        match state.failure.take() {
            Some(message) => Err(Error::ExecutionThread(message).into()),
            None => Ok(()),
        }
    }

    fn wait_for_execution(shared: &QueueShared, name: &str) {
        if let Err(err) = Self::completion_loop(shared) {
            error!(
                "Command queue '{}' execution waiting thread failed: {:#}",
                name, err
            );
            if let Ok(mut state) = shared.state.lock() {
                state.failure = Some(format!("{:#}", err));
            }
        }
    }

    /// The background thread's loop: wait on the front batch's fence, complete it, pop it,
    /// repeat. Waiting on the front batch only is what keeps completion in FIFO order.
    fn completion_loop(shared: &QueueShared) -> Result<()> {
        loop {
            let batch = {
                let mut state = shared.state.lock().map_err(Error::from)?;
                loop {
                    while state.pending.front().map_or(false, |batch| batch.is_completed()) {
                        state.pending.pop_front();
                    }
                    if let Some(batch) = state.pending.front() {
                        break batch.clone();
                    }
                    if state.stop {
                        return Ok(());
                    }
                    state = shared.condvar.wait(state).map_err(Error::from)?;
                }
            };
            batch.fence.wait()?;
            batch.complete()?;
            let mut state = shared.state.lock().map_err(Error::from)?;
            if state
                .pending
                .front()
                .map_or(false, |front| Arc::ptr_eq(front, &batch))
            {
                state.pending.pop_front();
            }
        }
    }
}

impl Drop for CommandQueue {
    fn drop(&mut self) {
        // Drain before stopping the worker; a failure can not be rethrown from here.
        if let Err(err) = self.drain(None) {
            error!("Queue '{}' failed to drain on teardown: {:#}", self.name, err);
        }
        if let Ok(mut state) = self.shared.state.lock() {
            state.stop = true;
            if let Some(message) = state.failure.take() {
                error!(
                    "Queue '{}' dropped with an unreported execution failure: {}",
                    self.name, message
                );
            }
        }
        self.shared.condvar.notify_all();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Queue '{}' completion thread panicked", self.name);
            }
        }
        trace!("Destroyed command queue '{}'", self.name);
    }
}
