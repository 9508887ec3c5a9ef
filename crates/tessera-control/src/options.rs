// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Runtime configuration.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tessera_core::{Error, ErrorSink, PluginBundle, Result};
use tessera_data::EntityLib;

use crate::context::Context;
use crate::directory::EntityDirectory;
use crate::plugin::RuntimePlugin;

/// Replaces the built-in reclamation pass on every reclamation tick.
pub type CustomGc = Arc<dyn Fn(&Context) + Send + Sync>;

/// Frame pacing of a runtime.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameOptions {
    /// Frames per second.
    pub target_fps: f32,
    /// Frames to run before the runtime terminates itself, `0` for unbounded.
    pub total_frames: u64,
}

impl Default for FrameOptions {
    fn default() -> Self {
        Self {
            target_fps: 30.0,
            total_frames: 0,
        }
    }
}

/// Everything a runtime is spawned with.
#[derive(Clone)]
pub struct RuntimeOptions {
    /// Name used for the thread and in logs.
    pub name: String,
    /// Capacity of the task queue.
    pub queue_capacity: usize,
    /// How long a submission may wait for room in a full queue. Zero fails fast.
    pub queue_insert_timeout: Duration,
    /// How long a synchronous call waits for its result. Zero waits forever,
    /// so two runtimes sync-calling each other deadlock.
    pub sync_call_timeout: Duration,
    /// Frame pacing; `None` runs tasks only.
    pub frame: Option<FrameOptions>,
    /// Period of the reclamation tick.
    pub gc_interval: Duration,
    /// Replaces the built-in reclamation pass.
    pub custom_gc: Option<CustomGc>,
    /// Absorb panics of user callbacks into the error sink instead of
    /// unwinding the runtime thread.
    pub auto_recover: bool,
    /// Destination of absorbed errors.
    pub error_sink: ErrorSink,
    /// Plugins initialized when the runtime starts.
    pub plugins: PluginBundle<dyn RuntimePlugin>,
    /// Directory global entities are registered in.
    pub directory: Option<Arc<EntityDirectory>>,
    /// Prototype library entities are created from.
    pub entity_lib: Option<Arc<EntityLib>>,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            name: "runtime".to_string(),
            queue_capacity: 128,
            queue_insert_timeout: Duration::ZERO,
            sync_call_timeout: Duration::from_secs(3),
            frame: None,
            gc_interval: Duration::from_secs(10),
            custom_gc: None,
            auto_recover: true,
            error_sink: ErrorSink::log_only(),
            plugins: PluginBundle::new(),
            directory: None,
            entity_lib: None,
        }
    }
}

impl RuntimeOptions {
    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Sets the queue capacity.
    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the queue insert timeout.
    pub fn with_queue_insert_timeout(mut self, timeout: Duration) -> Self {
        self.queue_insert_timeout = timeout;
        self
    }

    /// Sets the sync call timeout.
    pub fn with_sync_call_timeout(mut self, timeout: Duration) -> Self {
        self.sync_call_timeout = timeout;
        self
    }

    /// Enables frame pacing.
    pub fn with_frame(mut self, target_fps: f32, total_frames: u64) -> Self {
        self.frame = Some(FrameOptions {
            target_fps,
            total_frames,
        });
        self
    }

    /// Sets the reclamation interval.
    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }

    /// Replaces the built-in reclamation pass.
    pub fn with_custom_gc(mut self, gc: impl Fn(&Context) + Send + Sync + 'static) -> Self {
        self.custom_gc = Some(Arc::new(gc));
        self
    }

    /// Enables or disables panic absorption.
    pub fn with_auto_recover(mut self, auto_recover: bool) -> Self {
        self.auto_recover = auto_recover;
        self
    }

    /// Sets the error sink.
    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = sink;
        self
    }

    /// Installs a runtime plugin.
    pub fn with_plugin(mut self, name: impl Into<String>, plugin: Arc<dyn RuntimePlugin>) -> Result<Self> {
        self.plugins.install(name, plugin)?;
        Ok(self)
    }

    /// Links the runtime to a directory of global entities.
    pub fn with_directory(mut self, directory: Arc<EntityDirectory>) -> Self {
        self.directory = Some(directory);
        self
    }

    /// Links the runtime to a prototype library.
    pub fn with_entity_lib(mut self, lib: Arc<EntityLib>) -> Self {
        self.entity_lib = Some(lib);
        self
    }

    /// Checks the options a runtime cannot start with.
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::invalid_argument("queue capacity must be positive"));
        }
        if self.gc_interval.is_zero() {
            return Err(Error::invalid_argument("reclamation interval must be positive"));
        }
        if let Some(frame) = &self.frame {
            if !(frame.target_fps.is_finite() && frame.target_fps > 0.0) {
                return Err(Error::invalid_argument(format!(
                    "target fps {} must be positive",
                    frame.target_fps
                )));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for RuntimeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeOptions")
            .field("name", &self.name)
            .field("queue_capacity", &self.queue_capacity)
            .field("queue_insert_timeout", &self.queue_insert_timeout)
            .field("sync_call_timeout", &self.sync_call_timeout)
            .field("frame", &self.frame)
            .field("gc_interval", &self.gc_interval)
            .field("custom_gc", &self.custom_gc.is_some())
            .field("auto_recover", &self.auto_recover)
            .field("plugins", &self.plugins)
            .finish()
    }
}

/// Serializable subset of [`RuntimeOptions`], with durations in milliseconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// See [`RuntimeOptions::name`].
    pub name: String,
    /// See [`RuntimeOptions::queue_capacity`].
    pub queue_capacity: usize,
    /// See [`RuntimeOptions::queue_insert_timeout`].
    pub queue_insert_timeout_ms: u64,
    /// See [`RuntimeOptions::sync_call_timeout`].
    pub sync_call_timeout_ms: u64,
    /// See [`RuntimeOptions::frame`].
    pub frame: Option<FrameOptions>,
    /// See [`RuntimeOptions::gc_interval`].
    pub gc_interval_ms: u64,
    /// See [`RuntimeOptions::auto_recover`].
    pub auto_recover: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeOptions::default().into()
    }
}

impl RuntimeConfig {
    /// Parses a JSON document. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::invalid_argument(format!("runtime config: {e}")))
    }

    /// Reads and parses a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::invalid_argument(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }

    /// Builds options from the config; the remaining fields take defaults.
    pub fn into_options(self) -> RuntimeOptions {
        RuntimeOptions {
            name: self.name,
            queue_capacity: self.queue_capacity,
            queue_insert_timeout: Duration::from_millis(self.queue_insert_timeout_ms),
            sync_call_timeout: Duration::from_millis(self.sync_call_timeout_ms),
            frame: self.frame,
            gc_interval: Duration::from_millis(self.gc_interval_ms),
            auto_recover: self.auto_recover,
            ..RuntimeOptions::default()
        }
    }
}

impl From<RuntimeOptions> for RuntimeConfig {
    fn from(options: RuntimeOptions) -> Self {
        let millis = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        Self {
            name: options.name,
            queue_capacity: options.queue_capacity,
            queue_insert_timeout_ms: millis(options.queue_insert_timeout),
            sync_call_timeout_ms: millis(options.sync_call_timeout),
            frame: options.frame,
            gc_interval_ms: millis(options.gc_interval),
            auto_recover: options.auto_recover,
        }
    }
}
