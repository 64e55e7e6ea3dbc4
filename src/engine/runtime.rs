//! OpenVINO runtime handles
//!
//! Thin wrappers over the engine's `Core` and `CompiledModel` so models can be
//! moved between threads, plus the runtime version check done on
//! every model load.

use std::ops::{Deref, DerefMut};

use openvino::{CompiledModel, Core, InferRequest};
use tracing::{debug, warn};

/// OpenVINO release this crate is tested against
pub const SUPPORTED_VERSION: (u32, u32) = (2024, 4);

/// Wrapper for OpenVINO Core that implements Send + Sync
pub struct SafeCore(Core);
unsafe impl Send for SafeCore {}
unsafe impl Sync for SafeCore {}

impl SafeCore {
    pub fn new() -> anyhow::Result<Self> {
        Ok(Self(Core::new()?))
    }
}

impl Deref for SafeCore {
    type Target = Core;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SafeCore {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

/// Wrapper for OpenVINO CompiledModel that implements Send + Sync
pub struct SafeCompiledModel(CompiledModel);
unsafe impl Send for SafeCompiledModel {}
unsafe impl Sync for SafeCompiledModel {}

impl SafeCompiledModel {
    pub fn new(compiled: CompiledModel) -> Self {
        Self(compiled)
    }

    /// Create an inference request
    pub fn create_infer_request(&mut self) -> anyhow::Result<InferRequest> {
        self.0.create_infer_request().map_err(|e| e.into())
    }
}

impl Deref for SafeCompiledModel {
    type Target = CompiledModel;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Build number reported by the linked runtime, e.g. `2024.4.0-16579-c3152d32c9c-releases/2024/4`
pub fn runtime_version() -> String {
    openvino::version().build_number
}

/// Extract `(major, minor)` from a runtime build string
pub fn parse_version(build: &str) -> Option<(u32, u32)> {
    let release = build.split(['-', ' ']).next()?;
    let mut parts = release.split('.');
    let major = parts.next()?.trim().parse().ok()?;
    let minor = parts.next()?.trim().parse().ok()?;
    Some((major, minor))
}

/// Warn when the linked runtime is not the supported release.
///
/// Never fails: an unknown version is only worth a log line.
pub fn check_version() -> Option<(u32, u32)> {
    let build = runtime_version();
    let version = parse_version(&build);
    match version {
        Some(v) if v == SUPPORTED_VERSION => {
            debug!("OpenVINO runtime {}", build);
        }
        Some(v) => {
            warn!(
                "OpenVINO version: {:?} not compatible with this library, expected version: {}.{}.xxx",
                v, SUPPORTED_VERSION.0, SUPPORTED_VERSION.1
            );
        }
        None => {
            warn!("Could not parse OpenVINO version from {:?}", build);
        }
    }
    version
}
