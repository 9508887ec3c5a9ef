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

//! Cached typed views over an entity's components.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

use tessera_core::{Error, Result};

use crate::behavior::ComponentBehavior;
use crate::component::Component;
use crate::entity::Entity;

/// A view of the `T` component of an entity.
///
/// The lookup is cached and only redone when the entity's version changes,
/// that is after a component was added or removed.
pub struct Composite<T> {
    entity: Entity,
    version: Cell<Option<u64>>,
    cached: RefCell<Option<Component>>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ComponentBehavior> Composite<T> {
    /// Creates a view over `entity`.
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            version: Cell::new(None),
            cached: RefCell::new(None),
            _marker: PhantomData,
        }
    }

    /// The viewed entity.
    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    /// Returns `true` if the next access will redo the lookup.
    pub fn is_stale(&self) -> bool {
        self.version.get() != Some(self.entity.version())
    }

    /// The component, if the entity currently has one.
    pub fn component(&self) -> Option<Component> {
        if self.is_stale() {
            *self.cached.borrow_mut() = self.entity.find_component::<T>();
            self.version.set(Some(self.entity.version()));
        }
        self.cached.borrow().clone()
    }

    /// Runs `f` on the component behavior.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        self.component()
            .ok_or(Error::ComponentNotFound)?
            .with_behavior(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityOptions;

    struct Speed(f32);
    impl ComponentBehavior for Speed {}

    struct Tag;
    impl ComponentBehavior for Tag {}

    #[test]
    fn test_view_refreshes_only_on_version_change() {
        // --- 1. SETUP ---
        let entity = Entity::new(EntityOptions::default());
        let view: Composite<Speed> = Composite::new(entity.clone());
        assert!(view.component().is_none());
        assert!(!view.is_stale());

        // --- 2. ACTION ---
        let speed = entity.add_component("speed", Speed(2.0)).unwrap();

        // --- 3. ASSERTIONS ---
        assert!(view.is_stale());
        assert!(view.component().unwrap().ptr_eq(&speed));
        assert_eq!(view.with(|s| s.0).unwrap(), 2.0);

        entity.add_component("tag", Tag).unwrap();
        assert!(view.is_stale());
        assert!(view.component().unwrap().ptr_eq(&speed));

        entity.remove_component(&speed).unwrap();
        assert!(view.component().is_none());
        assert_eq!(view.with(|s| s.0).unwrap_err(), Error::ComponentNotFound);
    }
}
