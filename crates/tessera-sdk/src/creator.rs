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

//! Creating entities from prototypes.

use tessera_control::Context;
use tessera_core::{EntityId, Error, Result};
use tessera_data::{ConstructOptions, Entity, Scope};

/// Builds an entity from a prototype of the runtime's library and adds it to
/// the runtime.
///
/// Creators only exist on runtime threads, as they borrow the [`Context`].
#[must_use = "an entity creator does nothing until `spawn` is called"]
pub struct EntityCreator<'a> {
    cx: &'a Context,
    prototype: String,
    options: ConstructOptions,
}

impl<'a> EntityCreator<'a> {
    /// Starts a creator for `prototype`.
    pub fn new(cx: &'a Context, prototype: impl Into<String>) -> Self {
        Self {
            cx,
            prototype: prototype.into(),
            options: ConstructOptions::default(),
        }
    }

    /// Reuses a known identifier.
    pub fn with_persist_id(mut self, id: EntityId) -> Self {
        self.options.persist_id = Some(id);
        self
    }

    /// Overrides the prototype's scope.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.options.scope = Some(scope);
        self
    }

    /// Constructs the entity and adds it to the runtime.
    ///
    /// ## Errors
    /// * [`Error::PrototypeNotFound`] if the library has no such prototype.
    /// * Any error of [`Context::add_entity`].
    pub fn spawn(self) -> Result<Entity> {
        let lib = self
            .cx
            .entity_lib()
            .ok_or_else(|| Error::invalid_state(format!("runtime '{}' has no prototype library", self.cx.name())))?;
        let blueprint = lib
            .get(&self.prototype)
            .ok_or_else(|| Error::PrototypeNotFound(self.prototype.clone()))?;
        let entity = blueprint.construct(self.options)?;
        self.cx.add_entity(entity.clone())?;
        log::debug!(
            "Runtime '{}': created entity {} from prototype '{}'",
            self.cx.name(),
            entity.id(),
            self.prototype
        );
        Ok(entity)
    }
}
