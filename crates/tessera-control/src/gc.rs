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

//! Explicit, application-level reclamation.
//!
//! Objects that hold resources past their logical death are collected into
//! the runtime's reclamation list and released on the next reclamation tick,
//! on the runtime thread, between two tasks.

use tessera_data::{Component, Entity};

/// Something the runtime can release later.
pub trait Reclaim {
    /// Returns `false` if there is nothing to release; such objects are not
    /// kept in the list.
    fn needs_reclaim(&self) -> bool {
        true
    }

    /// Releases the resources.
    fn reclaim(&mut self);
}

/// A destroyed entity waiting for its behaviors to be released.
pub(crate) struct DeadEntity(pub(crate) Entity);

impl Reclaim for DeadEntity {
    fn needs_reclaim(&self) -> bool {
        self.0.has_behavior() || self.0.component_count() > 0
    }

    fn reclaim(&mut self) {
        self.0.dispose();
    }
}

/// A detached component waiting for its behavior to be released.
pub(crate) struct DeadComponent(pub(crate) Component);

impl Reclaim for DeadComponent {
    fn needs_reclaim(&self) -> bool {
        !self.0.is_disposed()
    }

    fn reclaim(&mut self) {
        self.0.dispose();
    }
}

/// The pending list.
#[derive(Default)]
pub(crate) struct ReclaimList {
    pending: Vec<Box<dyn Reclaim>>,
}

impl ReclaimList {
    pub(crate) fn collect(&mut self, item: Box<dyn Reclaim>) {
        if item.needs_reclaim() {
            self.pending.push(item);
        }
    }

    pub(crate) fn take(&mut self) -> Vec<Box<dyn Reclaim>> {
        std::mem::take(&mut self.pending)
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }
}
