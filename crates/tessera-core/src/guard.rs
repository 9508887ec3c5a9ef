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

//! Panic containment at callback boundaries.
//!
//! User code (lifecycle callbacks, event subscribers, call segments) runs
//! through these helpers so that a panic turns into an [`Error::Panicked`]
//! instead of unwinding through the runtime.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use crate::error::{Error, ErrorSink, Result};

/// Extracts a readable message from a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs `f`, converting a panic into [`Error::Panicked`].
pub fn catch_panic<R>(f: impl FnOnce() -> R) -> Result<R> {
    panic::catch_unwind(AssertUnwindSafe(f))
        .map_err(|payload| Error::Panicked(panic_message(&*payload)))
}

/// Runs a user callback the way the runtime does.
///
/// With `auto_recover` the panic is absorbed, reported to `sink` and `None` is
/// returned. Without it the panic keeps unwinding.
pub fn call_outer<R>(auto_recover: bool, sink: &ErrorSink, f: impl FnOnce() -> R) -> Option<R> {
    if !auto_recover {
        return Some(f());
    }
    match catch_panic(f) {
        Ok(value) => Some(value),
        Err(err) => {
            sink.report(err);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catch_panic_returns_value() {
        assert_eq!(catch_panic(|| 7), Ok(7));
    }

    #[test]
    fn test_catch_panic_converts_str_and_string_payloads() {
        assert_eq!(
            catch_panic(|| -> i32 { panic!("static message") }),
            Err(Error::Panicked("static message".into()))
        );
        let n = 3;
        assert_eq!(
            catch_panic(|| -> i32 { panic!("formatted {n}") }),
            Err(Error::Panicked("formatted 3".into()))
        );
    }

    #[test]
    fn test_call_outer_reports_to_sink() {
        let (sink, rx) = ErrorSink::channel(4);
        let out = call_outer(true, &sink, || -> u8 { panic!("boom") });
        assert!(out.is_none());
        assert_eq!(rx.try_recv(), Ok(Error::Panicked("boom".into())));
    }

    #[test]
    fn test_call_outer_without_recover_propagates() {
        let sink = ErrorSink::log_only();
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            call_outer(false, &sink, || -> u8 { panic!("up") })
        }));
        assert!(result.is_err());
    }
}
