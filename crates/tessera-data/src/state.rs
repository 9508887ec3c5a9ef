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

//! Lifecycle states and accessibility scope.

use serde::{Deserialize, Serialize};

/// Lifecycle state of an [`crate::Entity`]. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityState {
    /// Constructed, not yet added to a runtime.
    Entry,
    /// Connected to a runtime; `init` and the component walk are running.
    Init,
    /// Every component has started; `inited` is running.
    Inited,
    /// Fully initialized and receiving frame updates.
    Living,
    /// Disconnected; shutdown callbacks are running.
    Shut,
    /// Shut down. The entity will never run a callback again.
    Death,
}

impl EntityState {
    /// Returns `true` for `Init`, `Inited` and `Living`, the states in which
    /// newly attached components are started inline.
    pub fn is_running(self) -> bool {
        matches!(self, Self::Init | Self::Inited | Self::Living)
    }

    /// Returns `true` once teardown has begun.
    pub fn is_tearing_down(self) -> bool {
        self >= Self::Shut
    }
}

/// Lifecycle state of a [`crate::Component`]. States only ever move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ComponentState {
    /// Attached to an entity, not yet connected.
    Attach,
    /// Connected; `awake` is pending or running.
    Awake,
    /// Awoken; `start` is pending or running.
    Start,
    /// Started and receiving frame updates.
    Living,
    /// Disconnected; `shut` is pending or running.
    Shut,
    /// Shut down and detached.
    Death,
}

impl ComponentState {
    /// Returns `true` once teardown has begun.
    pub fn is_tearing_down(self) -> bool {
        self >= Self::Shut
    }
}

/// Who can address an entity through the caller API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Scope {
    /// Only code running inside the owning runtime.
    #[default]
    Local,
    /// Any thread holding the service context.
    Global,
}
