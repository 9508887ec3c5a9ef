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

use std::cell::Cell;
use std::fmt;
use std::rc::{Rc, Weak};

/// Removes a subscriber entry from the slot that owns it.
pub(crate) trait Detach {
    fn detach(&self, priority: i32, seq: u64);
}

pub(crate) struct HookLink {
    pub(crate) seq: u64,
    pub(crate) priority: i32,
    pub(crate) bound: Cell<bool>,
    pub(crate) slot: Weak<dyn Detach>,
}

/// A binding between one event and one subscriber.
///
/// Dropping a `Hook` does not unbind it; the subscription lives until
/// [`Hook::unbind`] is called on any clone of it, or the event is cleaned.
#[derive(Clone, Default)]
pub struct Hook {
    link: Option<Rc<HookLink>>,
}

impl Hook {
    pub(crate) fn from_link(link: Rc<HookLink>) -> Self {
        Self { link: Some(link) }
    }

    /// Removes the subscriber from its event. Calling it more than once has no
    /// further effect.
    pub fn unbind(&self) {
        let Some(link) = &self.link else {
            return;
        };
        if link.bound.replace(false) {
            if let Some(slot) = link.slot.upgrade() {
                slot.detach(link.priority, link.seq);
            }
        }
    }

    /// Returns `true` while the subscriber is still attached to a live event.
    pub fn is_bound(&self) -> bool {
        self.link
            .as_ref()
            .is_some_and(|link| link.bound.get() && link.slot.strong_count() > 0)
    }

    /// The priority the hook was bound with, if it was ever bound.
    pub fn priority(&self) -> Option<i32> {
        self.link.as_ref().map(|link| link.priority)
    }
}

impl fmt::Debug for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.link {
            Some(link) => f
                .debug_struct("Hook")
                .field("seq", &link.seq)
                .field("priority", &link.priority)
                .field("bound", &self.is_bound())
                .finish(),
            None => f.write_str("Hook(unbound)"),
        }
    }
}
