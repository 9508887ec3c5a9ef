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

//! Error types shared by every Tessera crate, and the error sink that
//! absorbed failures are forwarded to.

use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::id::EntityId;

/// A specialized `Result` type for Tessera operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Broad categories an [`Error`] belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Rejected before submission: nil identifiers, bad serial numbers, bad options.
    Argument,
    /// The addressed entity, event or prototype does not exist (or is stale).
    NotFound,
    /// A user callback or call segment panicked.
    Panicked,
    /// The task queue was full past its insert timeout, or a call timed out.
    Contention,
    /// The operation is not valid in the current state of its target.
    State,
}

/// The error type for every fallible operation in the runtime.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// An entity identifier was nil.
    #[error("entity id is nil")]
    NilEntityId,
    /// A serial number was zero or negative.
    #[error("serial no {0} is invalid, it must be positive")]
    InvalidSerialNo(i64),
    /// Any other rejected argument or option.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The entity is not registered in the directory that was searched.
    #[error("entity {0} not found")]
    EntityNotFound(EntityId),
    /// The entity vanished from its runtime before the call could run.
    #[error("entity not exist in runtime context")]
    EntityNotInContext,
    /// No component matched the lookup.
    #[error("component not found")]
    ComponentNotFound,
    /// An event id did not resolve inside its event table.
    #[error("event {0:#018x} not found")]
    EventNotFound(u64),
    /// The prototype library has no blueprint under that name.
    #[error("prototype '{0}' not declared")]
    PrototypeNotFound(String),

    /// A callback or segment panicked; carries the panic message.
    #[error("panicked: {0}")]
    Panicked(String),

    /// The target queue was full and the insert timeout elapsed.
    #[error("task queue is full")]
    QueueFull,
    /// A synchronous call did not complete within its timeout.
    #[error("call timed out after {0:?}")]
    Timeout(Duration),

    /// A nested emission hit an event whose recursion policy is `Disallow`.
    #[error("recursive emission is not allowed")]
    RecursionNotAllowed,
    /// The event is closed and refuses new bindings.
    #[error("event is closed")]
    EventClosed,
    /// The runtime has stopped accepting tasks.
    #[error("runtime terminated")]
    Terminated,
    /// The target is in a lifecycle state that does not allow the operation.
    #[error("invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Returns the category this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NilEntityId | Error::InvalidSerialNo(_) | Error::InvalidArgument(_) => {
                ErrorKind::Argument
            }
            Error::EntityNotFound(_)
            | Error::EntityNotInContext
            | Error::ComponentNotFound
            | Error::EventNotFound(_)
            | Error::PrototypeNotFound(_) => ErrorKind::NotFound,
            Error::Panicked(_) => ErrorKind::Panicked,
            Error::QueueFull | Error::Timeout(_) => ErrorKind::Contention,
            Error::RecursionNotAllowed
            | Error::EventClosed
            | Error::Terminated
            | Error::InvalidState(_) => ErrorKind::State,
        }
    }

    /// Shorthand for [`Error::InvalidArgument`].
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    /// Shorthand for [`Error::InvalidState`].
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Error::InvalidState(msg.into())
    }
}

/// Destination for errors that cannot be returned to a caller: panics absorbed
/// from lifecycle callbacks and subscribers, or failures of fire-and-forget calls.
///
/// Every reported error is logged. When the sink was built with
/// [`ErrorSink::channel`], it is also forwarded to the paired receiver without
/// ever blocking the reporting thread.
#[derive(Debug, Clone, Default)]
pub struct ErrorSink {
    tx: Option<Sender<Error>>,
}

impl ErrorSink {
    /// Creates a sink that only logs.
    pub fn log_only() -> Self {
        Self { tx: None }
    }

    /// Creates a sink forwarding to a bounded channel of `capacity` errors.
    ///
    /// ## Returns
    /// The sink and the receiving end errors can be drained from.
    pub fn channel(capacity: usize) -> (Self, Receiver<Error>) {
        let (tx, rx) = crossbeam_channel::bounded(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// Returns `true` if the sink has no receiver.
    pub fn is_log_only(&self) -> bool {
        self.tx.is_none()
    }

    /// Reports an error.
    pub fn report(&self, error: Error) {
        log::error!("{error}");
        if let Some(tx) = &self.tx {
            match tx.try_send(error) {
                Ok(()) | Err(TrySendError::Disconnected(_)) => {}
                Err(TrySendError::Full(dropped)) => {
                    log::warn!("Error sink is full, dropping: {dropped}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds_follow_taxonomy() {
        assert_eq!(Error::NilEntityId.kind(), ErrorKind::Argument);
        assert_eq!(Error::InvalidSerialNo(0).kind(), ErrorKind::Argument);
        assert_eq!(Error::EntityNotInContext.kind(), ErrorKind::NotFound);
        assert_eq!(Error::Panicked("boom".into()).kind(), ErrorKind::Panicked);
        assert_eq!(Error::QueueFull.kind(), ErrorKind::Contention);
        assert_eq!(
            Error::Timeout(Duration::from_millis(5)).kind(),
            ErrorKind::Contention
        );
        assert_eq!(Error::RecursionNotAllowed.kind(), ErrorKind::State);
    }

    #[test]
    fn test_sink_forwards_to_channel() {
        let (sink, rx) = ErrorSink::channel(4);
        sink.report(Error::QueueFull);
        assert_eq!(rx.try_recv(), Ok(Error::QueueFull));
    }

    #[test]
    fn test_full_sink_drops_without_blocking() {
        let (sink, rx) = ErrorSink::channel(1);
        sink.report(Error::QueueFull);
        sink.report(Error::Terminated);
        assert_eq!(rx.len(), 1);
        assert_eq!(rx.try_recv(), Ok(Error::QueueFull));
    }
}
