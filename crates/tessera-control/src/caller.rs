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

//! Cross-runtime calls addressed to global entities.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tessera_core::guard::catch_panic;
use tessera_core::{EntityId, Error, ErrorKind, ErrorSink, Result, SerialNo};
use tessera_data::Entity;

use crate::context::Context;
use crate::directory::{DirectoryEntry, EntityDirectory};
use crate::lifecycle::CallbackScope;
use crate::ret::AsyncRet;
use crate::runtime::Task;

const DEFAULT_SYNC_CALL_TIMEOUT: Duration = Duration::from_secs(3);

/// Routes code segments to the runtime hosting a global entity.
///
/// A segment runs on the target runtime's thread with the entity and the
/// runtime [`Context`]. Calls made on the target's own thread run inline.
#[derive(Clone)]
pub struct Caller {
    directory: Arc<EntityDirectory>,
    sink: ErrorSink,
    sync_call_timeout: Duration,
}

impl Caller {
    /// Creates a caller over `directory`. Panics of no-return segments are
    /// reported to `sink`.
    pub fn new(directory: Arc<EntityDirectory>, sink: ErrorSink) -> Self {
        Self {
            directory,
            sink,
            sync_call_timeout: DEFAULT_SYNC_CALL_TIMEOUT,
        }
    }

    /// Bounds the wait of synchronous calls. Zero waits forever.
    pub fn with_sync_call_timeout(mut self, timeout: Duration) -> Self {
        self.sync_call_timeout = timeout;
        self
    }

    /// The directory this caller routes through.
    pub fn directory(&self) -> &Arc<EntityDirectory> {
        &self.directory
    }

    fn route(&self, id: EntityId, serial_no: Option<SerialNo>) -> Result<DirectoryEntry> {
        if id.is_nil() {
            return Err(Error::NilEntityId);
        }
        if let Some(serial_no) = serial_no {
            if serial_no <= 0 {
                return Err(Error::InvalidSerialNo(serial_no));
            }
        }
        let entry = self.directory.get(id).ok_or(Error::EntityNotFound(id))?;
        match serial_no {
            Some(serial_no) if serial_no != entry.serial_no => Err(Error::EntityNotFound(id)),
            _ => Ok(entry),
        }
    }

    fn call_inner<R, F>(&self, id: EntityId, serial_no: Option<SerialNo>, segment: F) -> AsyncRet<R>
    where
        R: Send + 'static,
        F: FnOnce(&Entity, &Context) -> R + Send + 'static,
    {
        let entry = match self.route(id, serial_no) {
            Ok(entry) => entry,
            Err(err) => return AsyncRet::ready(Err(err)),
        };
        let run = move |cx: &Context| run_segment(cx, id, serial_no, segment);

        if entry.runtime.is_current_thread() {
            return AsyncRet::ready(Context::with_current(run).unwrap_or(Err(Error::Terminated)));
        }
        let (tx, rx) = flume::bounded(1);
        let task = Task::Call(Box::new(move |cx: &Context| {
            // The caller may have stopped waiting.
            let _ = tx.send(run(cx));
        }));
        match entry.runtime.submit(task) {
            Ok(()) => AsyncRet::pending(rx, Error::EntityNotInContext),
            Err(err) => AsyncRet::ready(Err(err)),
        }
    }

    fn call_no_ret_inner<F>(&self, id: EntityId, serial_no: Option<SerialNo>, segment: F)
    where
        F: FnOnce(&Entity, &Context) + Send + 'static,
    {
        let entry = match self.route(id, serial_no) {
            Ok(entry) => entry,
            Err(err) if err.kind() == ErrorKind::Argument => {
                log::warn!("Call to entity {id} dropped: {err}");
                return;
            }
            Err(err) => {
                log::debug!("Call to entity {id} dropped: {err}");
                return;
            }
        };
        let sink = self.sink.clone();
        let run = move |cx: &Context| {
            if let Err(err) = run_segment(cx, id, serial_no, segment) {
                match err {
                    Error::Panicked(_) => sink.report(err),
                    _ => log::debug!("Call to entity {id} dropped: {err}"),
                }
            }
        };

        if entry.runtime.is_current_thread() {
            Context::with_current(run);
            return;
        }
        if let Err(err) = entry.runtime.submit(Task::Call(Box::new(run))) {
            log::debug!("Call to entity {id} not queued: {err}");
        }
    }

    /// Runs `segment` against entity `id` and waits for its result.
    ///
    /// ## Errors
    /// * [`Error::NilEntityId`] for a nil id.
    /// * [`Error::EntityNotFound`] when no runtime hosts the entity.
    /// * [`Error::EntityNotInContext`] when the entity left its runtime
    ///   before the segment ran.
    /// * [`Error::QueueFull`] or [`Error::Terminated`] when the target runtime
    ///   refuses the task.
    /// * [`Error::Timeout`] when no result arrived in time.
    /// * [`Error::Panicked`] when the segment panicked.
    pub fn sync_call<R, F>(&self, id: EntityId, segment: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Entity, &Context) -> R + Send + 'static,
    {
        self.call_inner(id, None, segment).wait_timeout(self.sync_call_timeout)
    }

    /// Like [`Caller::sync_call`], addressed to one instantiation of the entity.
    pub fn sync_call_with_serial_no<R, F>(&self, id: EntityId, serial_no: SerialNo, segment: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&Entity, &Context) -> R + Send + 'static,
    {
        self.call_inner(id, Some(serial_no), segment)
            .wait_timeout(self.sync_call_timeout)
    }

    /// Runs `segment` against entity `id` without waiting.
    pub fn async_call<R, F>(&self, id: EntityId, segment: F) -> AsyncRet<R>
    where
        R: Send + 'static,
        F: FnOnce(&Entity, &Context) -> R + Send + 'static,
    {
        self.call_inner(id, None, segment)
    }

    /// Like [`Caller::async_call`], addressed to one instantiation of the entity.
    pub fn async_call_with_serial_no<R, F>(&self, id: EntityId, serial_no: SerialNo, segment: F) -> AsyncRet<R>
    where
        R: Send + 'static,
        F: FnOnce(&Entity, &Context) -> R + Send + 'static,
    {
        self.call_inner(id, Some(serial_no), segment)
    }

    /// Runs `segment` against entity `id` and waits for it to finish.
    ///
    /// A panic of the segment goes to the error sink and is not returned;
    /// routing, queue and timeout failures are.
    pub fn sync_call_no_ret<F>(&self, id: EntityId, segment: F) -> Result<()>
    where
        F: FnOnce(&Entity, &Context) + Send + 'static,
    {
        self.discard_panic(self.sync_call(id, segment))
    }

    /// Like [`Caller::sync_call_no_ret`], addressed to one instantiation.
    pub fn sync_call_no_ret_with_serial_no<F>(&self, id: EntityId, serial_no: SerialNo, segment: F) -> Result<()>
    where
        F: FnOnce(&Entity, &Context) + Send + 'static,
    {
        self.discard_panic(self.sync_call_with_serial_no(id, serial_no, segment))
    }

    fn discard_panic(&self, result: Result<()>) -> Result<()> {
        match result {
            Err(err @ Error::Panicked(_)) => {
                self.sink.report(err);
                Ok(())
            }
            other => other,
        }
    }

    /// Fire and forget. Routing failures are dropped; a panic of the segment
    /// goes to the error sink.
    pub fn async_call_no_ret<F>(&self, id: EntityId, segment: F)
    where
        F: FnOnce(&Entity, &Context) + Send + 'static,
    {
        self.call_no_ret_inner(id, None, segment);
    }

    /// Like [`Caller::async_call_no_ret`], addressed to one instantiation.
    pub fn async_call_no_ret_with_serial_no<F>(&self, id: EntityId, serial_no: SerialNo, segment: F)
    where
        F: FnOnce(&Entity, &Context) + Send + 'static,
    {
        self.call_no_ret_inner(id, Some(serial_no), segment);
    }
}

/// Runs a segment on the hosting runtime's thread.
///
/// The entity is resolved again here: it may have been destroyed or replaced
/// between routing and execution.
fn run_segment<R>(
    cx: &Context,
    id: EntityId,
    serial_no: Option<SerialNo>,
    segment: impl FnOnce(&Entity, &Context) -> R,
) -> Result<R> {
    let entity = cx.resolve(id, serial_no).ok_or(Error::EntityNotInContext)?;
    let result = {
        let _scope = CallbackScope::new(&entity, None);
        catch_panic(|| segment(&entity, cx))
    };
    cx.settle(&entity, None);
    result
}

impl fmt::Debug for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Caller")
            .field("directory", &self.directory)
            .field("sync_call_timeout", &self.sync_call_timeout)
            .finish()
    }
}
