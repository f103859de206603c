//! Wrapper around the backend fence primitive.

use std::time::Duration;

use anyhow::Result;

use crate::backend::{NativeDevice, NativeFence};
use crate::error::Error;

/// A CPU-waitable completion fence. Signaled by the backend when the GPU work it was submitted
/// with finishes.
#[derive(Debug)]
pub struct Fence {
    native: Box<dyn NativeFence>,
}

impl Fence {
    /// Create an unsignaled fence on a device.
    pub fn new(device: &dyn NativeDevice) -> Result<Self> {
        Ok(Self::from_native(device.create_fence()?))
    }

    /// Wrap a fence handed out by the backend, typically by a submission.
    pub fn from_native(native: Box<dyn NativeFence>) -> Self {
        Self {
            native,
        }
    }

    /// Block until the fence signals.
    pub fn wait(&self) -> Result<()> {
        if self.native.wait(None)? {
            Ok(())
        } else {
            Err(Error::FenceWaitTimeout.into())
        }
    }

    /// Block until the fence signals or the timeout elapses. Returns whether the fence
    /// signaled.
    pub fn wait_timeout(&self, timeout: Duration) -> Result<bool> {
        self.native.wait(Some(timeout))
    }

    /// Non-blocking signal check.
    pub fn is_signaled(&self) -> Result<bool> {
        self.native.is_signaled()
    }

    /// Return the fence to the unsignaled state.
    pub fn reset(&self) -> Result<()> {
        self.native.reset()
    }
}
