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

//! The service: a process-level owner of runtimes.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crossbeam_channel::{Receiver, Sender};
use serde::{Deserialize, Serialize};
use tessera_control::{Caller, EntityDirectory, Runtime, RuntimeConfig, RuntimeHandle, RuntimeOptions};
use tessera_core::any::AsAny;
use tessera_core::guard::call_outer;
use tessera_core::{Error, ErrorSink, PluginBundle, Result};
use tessera_data::EntityLib;

/// A process-wide extension of a [`Service`].
pub trait ServicePlugin: AsAny + Send + Sync {
    /// Called by [`Service::start`], in install order.
    fn init(&self, _cx: &ServiceContext) {}

    /// Called by [`Service::stop`], in reverse install order.
    fn shut(&self, _cx: &ServiceContext) {}
}

/// Construction options of a [`Service`].
#[derive(Clone)]
pub struct ServiceOptions {
    /// Service name.
    pub name: String,
    /// Plugins, in install order.
    pub plugins: PluginBundle<dyn ServicePlugin>,
    /// Prototype library shared by every runtime.
    pub entity_lib: Arc<EntityLib>,
    /// Default error sink of runtimes that do not bring their own.
    pub error_sink: ErrorSink,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            name: "service".to_owned(),
            plugins: PluginBundle::new(),
            entity_lib: Arc::new(EntityLib::new()),
            error_sink: ErrorSink::log_only(),
        }
    }
}

impl ServiceOptions {
    /// Sets the service name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Installs a plugin.
    pub fn with_plugin(mut self, name: impl Into<String>, plugin: Arc<dyn ServicePlugin>) -> Result<Self> {
        self.plugins.install(name, plugin)?;
        Ok(self)
    }

    /// Uses an existing prototype library.
    pub fn with_entity_lib(mut self, lib: Arc<EntityLib>) -> Self {
        self.entity_lib = lib;
        self
    }

    /// Sets the default error sink.
    pub fn with_error_sink(mut self, sink: ErrorSink) -> Self {
        self.error_sink = sink;
        self
    }
}

/// Serializable description of a service and its runtimes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Service name; empty keeps the default.
    pub name: String,
    /// Runtimes spawned by [`Service::from_config`], in order.
    pub runtimes: Vec<RuntimeConfig>,
}

impl ServiceConfig {
    /// Parses a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| Error::invalid_argument(format!("service config: {e}")))
    }

    /// Reads and parses a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| Error::invalid_argument(format!("{}: {e}", path.display())))?;
        Self::from_json(&json)
    }
}

struct Shared {
    name: String,
    directory: Arc<EntityDirectory>,
    entity_lib: Arc<EntityLib>,
    sink: ErrorSink,
    runtimes: Mutex<Vec<RuntimeHandle>>,
    stop_tx: Mutex<Option<Sender<()>>>,
    stop_rx: Receiver<()>,
}

/// The shared, thread-safe face of a service, handed to plugins and usable
/// from any thread.
#[derive(Clone)]
pub struct ServiceContext {
    shared: Arc<Shared>,
}

impl ServiceContext {
    /// Service name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Directory of global entities.
    pub fn directory(&self) -> &Arc<EntityDirectory> {
        &self.shared.directory
    }

    /// Prototype library.
    pub fn entity_lib(&self) -> &Arc<EntityLib> {
        &self.shared.entity_lib
    }

    /// A caller routing through the service directory.
    pub fn caller(&self) -> Caller {
        Caller::new(Arc::clone(&self.shared.directory), self.shared.sink.clone())
    }

    /// The runtime named `name`.
    pub fn runtime(&self, name: &str) -> Option<RuntimeHandle> {
        self.lock_runtimes().iter().find(|h| h.name() == name).cloned()
    }

    /// Handles of every runtime, in spawn order.
    pub fn runtimes(&self) -> Vec<RuntimeHandle> {
        self.lock_runtimes().clone()
    }

    /// Requests the service to stop; [`Service::wait`] returns. Idempotent.
    pub fn shutdown(&self) {
        let stop = self.shared.stop_tx.lock().unwrap_or_else(|e| e.into_inner()).take();
        if stop.is_some() {
            log::info!("Service '{}': shutdown requested", self.name());
        }
    }

    /// Returns `true` once shutdown was requested.
    pub fn is_shutdown(&self) -> bool {
        self.shared.stop_tx.lock().unwrap_or_else(|e| e.into_inner()).is_none()
    }

    fn lock_runtimes(&self) -> std::sync::MutexGuard<'_, Vec<RuntimeHandle>> {
        self.shared.runtimes.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl fmt::Debug for ServiceContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceContext")
            .field("name", &self.shared.name)
            .field("runtimes", &self.lock_runtimes().len())
            .field("global_entities", &self.shared.directory.len())
            .finish()
    }
}

/// Owns runtimes, service plugins, the entity directory and the prototype
/// library.
///
/// ```ignore
/// let mut service = Service::new(ServiceOptions::default());
/// service.start();
/// let game = service.spawn_runtime(RuntimeOptions::default().with_name("game"))?;
/// game.sync_call_no_ret(|cx| { /* add entities */ })?;
/// service.context().shutdown();
/// service.wait();
/// ```
pub struct Service {
    cx: ServiceContext,
    plugins: PluginBundle<dyn ServicePlugin>,
    runtimes: Vec<Runtime>,
    started: bool,
}

impl Service {
    /// Creates a stopped service.
    pub fn new(options: ServiceOptions) -> Self {
        let (stop_tx, stop_rx) = crossbeam_channel::bounded(0);
        Self {
            cx: ServiceContext {
                shared: Arc::new(Shared {
                    name: options.name,
                    directory: Arc::new(EntityDirectory::new()),
                    entity_lib: options.entity_lib,
                    sink: options.error_sink,
                    runtimes: Mutex::new(Vec::new()),
                    stop_tx: Mutex::new(Some(stop_tx)),
                    stop_rx,
                }),
            },
            plugins: options.plugins,
            runtimes: Vec::new(),
            started: false,
        }
    }

    /// Creates and starts a service, then spawns the configured runtimes.
    pub fn from_config(config: ServiceConfig, mut options: ServiceOptions) -> Result<Self> {
        if !config.name.is_empty() {
            options.name = config.name;
        }
        let mut service = Self::new(options);
        service.start();
        for runtime in config.runtimes {
            service.spawn_runtime(runtime.into_options())?;
        }
        Ok(service)
    }

    /// The shared context.
    pub fn context(&self) -> &ServiceContext {
        &self.cx
    }

    /// A caller routing through the service directory.
    pub fn caller(&self) -> Caller {
        self.cx.caller()
    }

    /// Initializes service plugins, in install order. Idempotent.
    pub fn start(&mut self) {
        if self.started {
            return;
        }
        self.started = true;
        for (name, plugin) in self.plugins.iter() {
            log::debug!("Service '{}': init plugin '{name}'", self.cx.name());
            call_outer(true, &self.cx.shared.sink, || plugin.init(&self.cx));
        }
        log::info!("Service '{}' started", self.cx.name());
    }

    /// Spawns a runtime linked to the service directory and prototype
    /// library.
    ///
    /// ## Errors
    /// An argument error if a runtime with the same name exists or the
    /// options are invalid.
    pub fn spawn_runtime(&mut self, mut options: RuntimeOptions) -> Result<RuntimeHandle> {
        if self.cx.runtime(&options.name).is_some() {
            return Err(Error::invalid_argument(format!(
                "runtime '{}' already exists in service '{}'",
                options.name,
                self.cx.name()
            )));
        }
        options.directory = Some(Arc::clone(&self.cx.shared.directory));
        if options.entity_lib.is_none() {
            options.entity_lib = Some(Arc::clone(&self.cx.shared.entity_lib));
        }
        if options.error_sink.is_log_only() {
            options.error_sink = self.cx.shared.sink.clone();
        }

        let runtime = Runtime::spawn(options)?;
        let handle = runtime.handle().clone();
        self.cx.lock_runtimes().push(handle.clone());
        self.runtimes.push(runtime);
        Ok(handle)
    }

    /// Blocks until [`ServiceContext::shutdown`] is called, then stops.
    pub fn wait(mut self) {
        // Disconnection is the only message.
        let _ = self.cx.shared.stop_rx.recv();
        self.stop_inner();
    }

    /// Stops every runtime, newest first, then shuts plugins down in reverse
    /// order.
    pub fn stop(mut self) {
        self.cx.shutdown();
        self.stop_inner();
    }

    fn stop_inner(&mut self) {
        if !self.started && self.runtimes.is_empty() {
            return;
        }
        for runtime in &self.runtimes {
            runtime.terminate();
        }
        while let Some(runtime) = self.runtimes.pop() {
            let name = runtime.handle().name().to_owned();
            runtime.wait();
            log::debug!("Service '{}': runtime '{name}' stopped", self.cx.name());
        }
        self.cx.lock_runtimes().clear();

        if self.started {
            self.started = false;
            for (name, plugin) in self.plugins.iter().rev() {
                log::debug!("Service '{}': shut plugin '{name}'", self.cx.name());
                call_outer(true, &self.cx.shared.sink, || plugin.shut(&self.cx));
            }
        }
        log::info!("Service '{}' stopped", self.cx.name());
    }
}

impl Drop for Service {
    fn drop(&mut self) {
        self.cx.shutdown();
        self.stop_inner();
    }
}

impl fmt::Debug for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Service")
            .field("context", &self.cx)
            .field("plugins", &self.plugins)
            .field("started", &self.started)
            .finish()
    }
}
