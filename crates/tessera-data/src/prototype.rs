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

//! Prototype library: named blueprints entities are constructed from.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use tessera_core::{EntityId, Error, Result};

use crate::behavior::{ComponentBehavior, EntityBehavior};
use crate::entity::{Entity, EntityOptions};
use crate::state::Scope;

/// Builds a fresh component behavior.
pub type ComponentFactory = Arc<dyn Fn() -> Box<dyn ComponentBehavior> + Send + Sync>;
/// Builds a fresh entity behavior.
pub type EntityFactory = Arc<dyn Fn() -> Box<dyn EntityBehavior> + Send + Sync>;

/// Per-construction overrides.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConstructOptions {
    /// Identifier to reuse.
    pub persist_id: Option<EntityId>,
    /// Scope overriding the blueprint's.
    pub scope: Option<Scope>,
}

/// Declaration of an entity: an optional entity behavior and an ordered list
/// of named components.
///
/// Blueprints are shared between threads; the behaviors they build are not,
/// so construction happens on the runtime thread that will host the entity.
#[derive(Clone)]
pub struct Blueprint {
    name: String,
    scope: Scope,
    instance: Option<EntityFactory>,
    components: Vec<(String, ComponentFactory)>,
}

impl Blueprint {
    /// Starts a blueprint.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            scope: Scope::Local,
            instance: None,
            components: Vec::new(),
        }
    }

    /// Default scope of constructed entities.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Entity behavior built for every instance.
    pub fn with_instance<B, F>(mut self, factory: F) -> Self
    where
        B: EntityBehavior,
        F: Fn() -> B + Send + Sync + 'static,
    {
        self.instance = Some(Arc::new(move || Box::new(factory()) as Box<dyn EntityBehavior>));
        self
    }

    /// Appends a component.
    pub fn with_component<C, F>(mut self, name: impl Into<String>, factory: F) -> Self
    where
        C: ComponentBehavior,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.components.push((
            name.into(),
            Arc::new(move || Box::new(factory()) as Box<dyn ComponentBehavior>),
        ));
        self
    }

    /// Prototype name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Default scope.
    pub fn scope(&self) -> Scope {
        self.scope
    }

    /// Component names in declaration order.
    pub fn component_names(&self) -> impl Iterator<Item = &str> {
        self.components.iter().map(|(name, _)| name.as_str())
    }

    /// Builds an entity in the `Entry` state with its components attached.
    pub fn construct(&self, options: ConstructOptions) -> Result<Entity> {
        let mut entity_options = EntityOptions::default()
            .with_prototype(self.name.clone())
            .with_scope(options.scope.unwrap_or(self.scope));
        entity_options.persist_id = options.persist_id;
        entity_options.behavior = self.instance.as_ref().map(|factory| factory());

        let entity = Entity::new(entity_options);
        if !self.components.is_empty() {
            let batch = self
                .components
                .iter()
                .map(|(name, factory)| (name.clone(), factory()))
                .collect();
            entity.add_components(batch)?;
        }
        Ok(entity)
    }
}

impl fmt::Debug for Blueprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Blueprint")
            .field("name", &self.name)
            .field("scope", &self.scope)
            .field("instance", &self.instance.is_some())
            .field("components", &self.component_names().collect::<Vec<_>>())
            .finish()
    }
}

/// Thread-safe registry of blueprints.
#[derive(Default)]
pub struct EntityLib {
    blueprints: RwLock<HashMap<String, Arc<Blueprint>>>,
}

impl EntityLib {
    /// Creates an empty library.
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a blueprint.
    ///
    /// ## Returns
    /// An argument error if the name is empty or already declared.
    pub fn declare(&self, blueprint: Blueprint) -> Result<()> {
        if blueprint.name.is_empty() {
            return Err(Error::invalid_argument("prototype name is empty"));
        }
        let mut blueprints = self.blueprints.write().unwrap_or_else(|e| e.into_inner());
        if blueprints.contains_key(&blueprint.name) {
            return Err(Error::invalid_argument(format!(
                "prototype '{}' is already declared",
                blueprint.name
            )));
        }
        log::debug!("Declared prototype '{}'", blueprint.name);
        blueprints.insert(blueprint.name.clone(), Arc::new(blueprint));
        Ok(())
    }

    /// Removes a blueprint.
    pub fn undeclare(&self, name: &str) -> Option<Arc<Blueprint>> {
        self.blueprints
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(name)
    }

    /// Looks a blueprint up.
    pub fn get(&self, name: &str) -> Option<Arc<Blueprint>> {
        self.blueprints
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
    }

    /// Declared names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .blueprints
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

impl fmt::Debug for EntityLib {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityLib").field("prototypes", &self.names()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{ComponentState, EntityState};

    struct Position;
    impl ComponentBehavior for Position {}

    struct Body;
    impl ComponentBehavior for Body {}

    struct Ship;
    impl EntityBehavior for Ship {}

    fn ship() -> Blueprint {
        Blueprint::new("Ship")
            .with_scope(Scope::Global)
            .with_instance(|| Ship)
            .with_component("position", || Position)
            .with_component("body", || Body)
    }

    #[test]
    fn test_construct_builds_components_in_order() {
        let entity = ship().construct(ConstructOptions::default()).unwrap();
        assert_eq!(entity.state(), EntityState::Entry);
        assert_eq!(entity.prototype(), "Ship");
        assert_eq!(entity.scope(), Scope::Global);
        assert!(entity.has_behavior());

        let names: Vec<String> = entity.components().iter().map(|c| c.name().to_string()).collect();
        assert_eq!(names, vec!["position", "body"]);
        assert!(entity
            .components()
            .iter()
            .all(|c| c.state() == ComponentState::Attach));
    }

    #[test]
    fn test_construct_options_override() {
        let id = EntityId::new();
        let entity = ship()
            .construct(ConstructOptions {
                persist_id: Some(id),
                scope: Some(Scope::Local),
            })
            .unwrap();
        assert_eq!(entity.id(), id);
        assert_eq!(entity.scope(), Scope::Local);
    }

    #[test]
    fn test_library_declare_get_undeclare() {
        let lib = EntityLib::new();
        lib.declare(ship()).unwrap();
        assert!(lib.declare(ship()).is_err());
        assert!(lib.declare(Blueprint::new("")).is_err());
        assert_eq!(lib.get("Ship").unwrap().component_names().count(), 2);
        assert_eq!(lib.names(), vec!["Ship".to_string()]);
        assert!(lib.undeclare("Ship").is_some());
        assert!(lib.get("Ship").is_none());
    }
}
