#![allow(dead_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;

use deimos::prelude::*;

pub struct TestContext {
    pub device: Arc<HeadlessDevice>,
    pub log: Arc<CallLog>,
    pub context: Context,
}

/// Creates a headless deimos context ready for automated tests
pub fn make_context() -> Result<TestContext> {
    make_context_with(ContextSettings::default())
}

/// Create a headless context with custom settings
pub fn make_context_with(settings: ContextSettings) -> Result<TestContext> {
    let _ = pretty_env_logger::try_init();
    let device = HeadlessDevice::new(2);
    let log = CallLog::new();
    let sink_log = log.clone();
    let context = Context::new(
        device.clone(),
        move || Box::new(RecordingSink::new(sink_log.clone())) as Box<dyn NativeBindingSink>,
        settings,
    )?;
    Ok(TestContext {
        device,
        log,
        context,
    })
}

/// A program with a single texture argument, used by most binding tests
pub fn texture_program(access: AccessPolicy) -> Result<Arc<Program>> {
    Program::builder("test program")
        .with_argument(ArgumentAccessor::resource_view(
            ProgramArgument::new(ShaderStages::PIXEL, "g_texture"),
            access,
            ResourceKind::Texture,
        ))
        .build()
}

pub fn texture(name: &str) -> Arc<Resource> {
    Resource::new(name, ResourceKind::Texture, ResourceUsage::SHADER_READ)
}

pub fn sampler(name: &str) -> Arc<Resource> {
    Resource::new(name, ResourceKind::Sampler, ResourceUsage::empty())
}

/// Poll `cond` until it holds or a generous deadline expires. Returns whether it held.
pub fn wait_until(mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + Duration::from_secs(5);
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(5));
    }
    false
}
