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

//! Runtime threads: the task consumer and the frame producer.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::Duration;

use crossbeam_channel::{select, Receiver, SendTimeoutError, Sender, TrySendError};
use tessera_core::guard::catch_panic;
use tessera_core::{Error, ErrorSink, Result};
use tessera_telemetry::{RuntimeMetrics, ScopedTaskTimer};

use crate::context::Context;
use crate::options::{FrameOptions, RuntimeOptions};
use crate::ret::AsyncRet;

/// A unit of work executed on the consumer thread.
pub(crate) enum Task {
    /// A closure run against the runtime context.
    Call(Box<dyn FnOnce(&Context) + Send>),
    /// One frame pass.
    Frame,
}

struct Shared {
    name: String,
    task_tx: Sender<Task>,
    accepting: AtomicBool,
    cancel_tx: Mutex<Option<Sender<()>>>,
    insert_timeout: Duration,
    sync_call_timeout: Duration,
    consumer_thread: OnceLock<ThreadId>,
    metrics: RuntimeMetrics,
    sink: ErrorSink,
}

/// A thread-safe handle to a runtime.
///
/// Handles submit tasks, make runtime-level calls and request termination.
/// They stay valid after the runtime stopped; submissions then fail with
/// [`Error::Terminated`].
#[derive(Clone)]
pub struct RuntimeHandle {
    shared: Arc<Shared>,
}

impl RuntimeHandle {
    /// Runtime name.
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Live counters of the runtime.
    pub fn metrics(&self) -> &RuntimeMetrics {
        &self.shared.metrics
    }

    /// The error sink shared with the runtime.
    pub fn error_sink(&self) -> &ErrorSink {
        &self.shared.sink
    }

    /// Requests termination.
    ///
    /// New tasks are refused immediately. Tasks already queued still run,
    /// then every entity is destroyed. Idempotent.
    pub fn terminate(&self) {
        if self.shared.accepting.swap(false, Ordering::AcqRel) {
            log::debug!("Runtime '{}': termination requested", self.name());
        }
        let cancel = self
            .shared
            .cancel_tx
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        drop(cancel);
    }

    /// Returns `true` once termination was requested.
    pub fn is_terminated(&self) -> bool {
        !self.shared.accepting.load(Ordering::Acquire)
    }

    /// Returns `true` if the caller runs on this runtime's consumer thread.
    pub fn is_current_thread(&self) -> bool {
        self.shared.consumer_thread.get() == Some(&thread::current().id())
    }

    pub(crate) fn submit(&self, task: Task) -> Result<()> {
        if self.is_terminated() {
            return Err(Error::Terminated);
        }
        let result = if self.shared.insert_timeout.is_zero() {
            self.shared.task_tx.try_send(task).map_err(|err| match err {
                TrySendError::Full(_) => Error::QueueFull,
                TrySendError::Disconnected(_) => Error::Terminated,
            })
        } else {
            self.shared
                .task_tx
                .send_timeout(task, self.shared.insert_timeout)
                .map_err(|err| match err {
                    SendTimeoutError::Timeout(_) => Error::QueueFull,
                    SendTimeoutError::Disconnected(_) => Error::Terminated,
                })
        };
        if let Err(err) = &result {
            self.shared.metrics.record_rejected();
            log::warn!("Runtime '{}': task rejected: {err}", self.name());
        }
        result
    }

    /// Runs `f` on the runtime thread and waits for its result.
    ///
    /// Called from the runtime's own thread, `f` runs inline. Otherwise the
    /// wait is bounded by the configured sync-call timeout.
    pub fn sync_call<R, F>(&self, f: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Context) -> R + Send + 'static,
    {
        if self.is_current_thread() {
            return Context::with_current(|cx| catch_panic(|| f(cx))).unwrap_or(Err(Error::Terminated));
        }
        self.async_call(f).wait_timeout(self.shared.sync_call_timeout)
    }

    /// Runs `f` on the runtime thread without waiting.
    pub fn async_call<R, F>(&self, f: F) -> AsyncRet<R>
    where
        R: Send + 'static,
        F: FnOnce(&Context) -> R + Send + 'static,
    {
        if self.is_current_thread() {
            return AsyncRet::ready(self.sync_call(f));
        }
        let (tx, rx) = flume::bounded(1);
        let task = Task::Call(Box::new(move |cx: &Context| {
            let result = catch_panic(|| f(cx));
            // The caller may have stopped waiting.
            let _ = tx.send(result);
        }));
        match self.submit(task) {
            Ok(()) => AsyncRet::pending(rx, Error::Terminated),
            Err(err) => AsyncRet::ready(Err(err)),
        }
    }

    /// Runs `f` on the runtime thread and waits for it to finish.
    ///
    /// A panic in `f` goes to the error sink and is not returned.
    pub fn sync_call_no_ret<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Context) + Send + 'static,
    {
        match self.sync_call(f) {
            Err(err @ Error::Panicked(_)) => {
                self.shared.metrics.record_error();
                self.shared.sink.report(err);
                Ok(())
            }
            other => other,
        }
    }

    /// Queues `f` on the runtime thread. A panic in `f` goes to the error sink.
    pub fn async_call_no_ret<F>(&self, f: F) -> Result<()>
    where
        F: FnOnce(&Context) + Send + 'static,
    {
        if self.is_current_thread() {
            return Context::with_current(|cx| cx.call_user(|| f(cx))).ok_or(Error::Terminated);
        }
        self.submit(Task::Call(Box::new(move |cx: &Context| cx.call_user(|| f(cx)))))
    }
}

impl fmt::Debug for RuntimeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeHandle")
            .field("name", &self.shared.name)
            .field("terminated", &self.is_terminated())
            .finish()
    }
}

/// A running runtime: one consumer thread executing tasks in submission
/// order, plus a frame producer thread when frames are enabled.
///
/// Dropping the runtime terminates it and joins its threads.
pub struct Runtime {
    handle: RuntimeHandle,
    consumer: Option<JoinHandle<()>>,
    producer: Option<JoinHandle<()>>,
}

impl Runtime {
    /// Validates `options` and starts the runtime threads.
    pub fn spawn(options: RuntimeOptions) -> Result<Self> {
        options.validate()?;

        let (task_tx, task_rx) = crossbeam_channel::bounded(options.queue_capacity);
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded::<()>(0);
        let handle = RuntimeHandle {
            shared: Arc::new(Shared {
                name: options.name.clone(),
                task_tx: task_tx.clone(),
                accepting: AtomicBool::new(true),
                cancel_tx: Mutex::new(Some(cancel_tx)),
                insert_timeout: options.queue_insert_timeout,
                sync_call_timeout: options.sync_call_timeout,
                consumer_thread: OnceLock::new(),
                metrics: RuntimeMetrics::new(),
                sink: options.error_sink.clone(),
            }),
        };
        let name = options.name.clone();
        let frame = options.frame;

        let consumer = thread::Builder::new()
            .name(format!("{name}-consumer"))
            .spawn({
                let handle = handle.clone();
                let cancel_rx = cancel_rx.clone();
                move || consume(handle, options, task_rx, cancel_rx)
            })
            .map_err(|e| Error::invalid_state(format!("failed to spawn consumer of runtime '{name}': {e}")))?;

        let mut runtime = Self {
            handle: handle.clone(),
            consumer: Some(consumer),
            producer: None,
        };

        if let Some(frame) = frame {
            let producer = thread::Builder::new()
                .name(format!("{name}-frames"))
                .spawn(move || produce(handle, frame, task_tx, cancel_rx))
                .map_err(|e| Error::invalid_state(format!("failed to spawn frame producer of runtime '{name}': {e}")))?;
            runtime.producer = Some(producer);
        }

        log::info!("Runtime '{name}' spawned");
        Ok(runtime)
    }

    /// Handle to this runtime.
    pub fn handle(&self) -> &RuntimeHandle {
        &self.handle
    }

    /// Requests termination; see [`RuntimeHandle::terminate`].
    pub fn terminate(&self) {
        self.handle.terminate();
    }

    /// Blocks until the runtime stopped on its own, after a frame budget ran
    /// out or someone called [`RuntimeHandle::terminate`].
    pub fn wait(mut self) {
        self.join();
    }

    fn join(&mut self) {
        if self.handle.is_current_thread() {
            log::warn!("Runtime '{}' cannot be joined from its own thread", self.handle.name());
            return;
        }
        for (role, thread) in [("frame producer", self.producer.take()), ("consumer", self.consumer.take())] {
            let Some(thread) = thread else {
                continue;
            };
            if thread.join().is_err() {
                log::error!("Runtime '{}': {role} thread panicked", self.handle.name());
            }
        }
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.handle.terminate();
        self.join();
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime").field("handle", &self.handle).finish()
    }
}

fn consume(handle: RuntimeHandle, options: RuntimeOptions, task_rx: Receiver<Task>, cancel_rx: Receiver<()>) {
    let _ = handle.shared.consumer_thread.set(thread::current().id());
    let name = handle.name().to_owned();
    let outcome = catch_panic({
        let handle = handle.clone();
        move || run_consumer(handle, options, task_rx, cancel_rx)
    });
    Context::set_current(None);
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(err)) => log::error!("Runtime '{name}' failed to start: {err}"),
        Err(err) => log::error!("Runtime '{name}' consumer stopped: {err}"),
    }
    handle.terminate();
}

fn run_consumer(
    handle: RuntimeHandle,
    options: RuntimeOptions,
    task_rx: Receiver<Task>,
    cancel_rx: Receiver<()>,
) -> Result<()> {
    let gc_tick = crossbeam_channel::tick(options.gc_interval);
    let cx = Context::new(options, handle.clone())?;
    Context::set_current(Some(cx.clone()));
    log::info!("Runtime '{}' started", cx.name());
    cx.init_plugins();

    loop {
        select! {
            recv(task_rx) -> task => match task {
                Ok(task) => run_task(&cx, task),
                Err(_) => break,
            },
            recv(gc_tick) -> _ => cx.run_gc(),
            recv(cancel_rx) -> _ => break,
        }
    }

    handle.terminate();
    let mut drained = 0usize;
    while let Ok(task) = task_rx.try_recv() {
        run_task(&cx, task);
        drained += 1;
    }
    if drained > 0 {
        log::debug!("Runtime '{}': drained {drained} tasks", cx.name());
    }

    cx.shutdown();
    Context::set_current(None);
    log::info!("Runtime '{}' stopped: {}", cx.name(), handle.metrics().snapshot().to_json());
    Ok(())
}

fn run_task(cx: &Context, task: Task) {
    let metrics = cx.handle().metrics();
    let _timer = ScopedTaskTimer::new(metrics);
    match task {
        Task::Call(call) => {
            call(cx);
            metrics.record_task();
        }
        Task::Frame => cx.run_frame(),
    }
}

fn produce(handle: RuntimeHandle, frame: FrameOptions, task_tx: Sender<Task>, cancel_rx: Receiver<()>) {
    let period = Duration::from_secs_f64(1.0 / f64::from(frame.target_fps));
    let ticker = crossbeam_channel::tick(period);
    let mut scheduled = 0u64;
    loop {
        if frame.total_frames > 0 && scheduled >= frame.total_frames {
            log::info!("Runtime '{}': all {} frames scheduled", handle.name(), frame.total_frames);
            handle.terminate();
            return;
        }
        select! {
            recv(ticker) -> _ => {}
            recv(cancel_rx) -> _ => return,
        }
        select! {
            send(task_tx, Task::Frame) -> sent => if sent.is_err() { return },
            recv(cancel_rx) -> _ => return,
        }
        scheduled += 1;
    }
}
