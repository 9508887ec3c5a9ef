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

//! Single-value results of asynchronous calls.

use std::fmt;
use std::time::Duration;

use flume::{Receiver, RecvTimeoutError, TryRecvError};
use tessera_core::{Error, Result};

enum Slot<R> {
    Ready(Option<Result<R>>),
    Pending(Receiver<Result<R>>),
}

/// The future result of an asynchronous call, satisfied exactly once.
///
/// If the runtime drops the call without running it (because it terminated),
/// waiting yields the error the call was created with, usually
/// [`Error::EntityNotInContext`].
pub struct AsyncRet<R> {
    slot: Slot<R>,
    lost: Error,
}

impl<R> AsyncRet<R> {
    /// A result that is already available.
    pub fn ready(result: Result<R>) -> Self {
        Self {
            slot: Slot::Ready(Some(result)),
            lost: Error::Terminated,
        }
    }

    pub(crate) fn pending(rx: Receiver<Result<R>>, lost: Error) -> Self {
        Self {
            slot: Slot::Pending(rx),
            lost,
        }
    }

    /// Blocks until the result is available.
    pub fn wait(self) -> Result<R> {
        match self.slot {
            Slot::Ready(result) => result.unwrap_or(Err(self.lost)),
            Slot::Pending(rx) => rx.recv().unwrap_or(Err(self.lost)),
        }
    }

    /// Blocks for at most `timeout`; zero waits forever.
    pub fn wait_timeout(self, timeout: Duration) -> Result<R> {
        if timeout.is_zero() {
            return self.wait();
        }
        match self.slot {
            Slot::Ready(result) => result.unwrap_or(Err(self.lost)),
            Slot::Pending(rx) => match rx.recv_timeout(timeout) {
                Ok(result) => result,
                Err(RecvTimeoutError::Timeout) => Err(Error::Timeout(timeout)),
                Err(RecvTimeoutError::Disconnected) => Err(self.lost),
            },
        }
    }

    /// Takes the result if it is available, without blocking.
    pub fn try_take(&mut self) -> Option<Result<R>> {
        match &mut self.slot {
            Slot::Ready(result) => result.take(),
            Slot::Pending(rx) => match rx.try_recv() {
                Ok(result) => {
                    self.slot = Slot::Ready(None);
                    Some(result)
                }
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    self.slot = Slot::Ready(None);
                    Some(Err(self.lost.clone()))
                }
            },
        }
    }

    /// Awaits the result.
    pub async fn wait_async(self) -> Result<R> {
        match self.slot {
            Slot::Ready(result) => result.unwrap_or(Err(self.lost)),
            Slot::Pending(rx) => rx.recv_async().await.unwrap_or(Err(self.lost)),
        }
    }
}

impl<R> fmt::Debug for AsyncRet<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &self.slot {
            Slot::Ready(Some(_)) => "ready",
            Slot::Ready(None) => "taken",
            Slot::Pending(_) => "pending",
        };
        f.debug_tuple("AsyncRet").field(&state).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_result() {
        let mut ret = AsyncRet::ready(Ok(5));
        assert_eq!(ret.try_take(), Some(Ok(5)));
        assert_eq!(ret.try_take(), None);
        assert_eq!(AsyncRet::<u8>::ready(Err(Error::QueueFull)).wait(), Err(Error::QueueFull));
    }

    #[test]
    fn test_pending_result_is_delivered_once() {
        let (tx, rx) = flume::bounded(1);
        let mut ret = AsyncRet::pending(rx, Error::EntityNotInContext);
        assert_eq!(ret.try_take(), None);
        tx.send(Ok("done")).unwrap();
        assert_eq!(ret.try_take(), Some(Ok("done")));
        assert_eq!(ret.try_take(), None);
    }

    #[test]
    fn test_dropped_sender_yields_lost_error() {
        let (tx, rx) = flume::bounded::<Result<u8>>(1);
        drop(tx);
        let ret = AsyncRet::pending(rx, Error::EntityNotInContext);
        assert_eq!(ret.wait(), Err(Error::EntityNotInContext));
    }

    #[test]
    fn test_wait_timeout_expires() {
        let (_tx, rx) = flume::bounded::<Result<u8>>(1);
        let ret = AsyncRet::pending(rx, Error::EntityNotInContext);
        let timeout = Duration::from_millis(10);
        assert_eq!(ret.wait_timeout(timeout), Err(Error::Timeout(timeout)));
    }

    #[tokio::test]
    async fn test_wait_async() {
        let (tx, rx) = flume::bounded(1);
        let ret = AsyncRet::pending(rx, Error::EntityNotInContext);
        std::thread::spawn(move || tx.send(Ok(42u32)));
        assert_eq!(ret.wait_async().await, Ok(42));
    }
}
