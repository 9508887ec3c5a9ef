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

//! The lifecycle manager.
//!
//! Drives entities and components through their state machines in response to
//! entity-manager events. Every user callback goes through
//! [`Context::invoke_entity`] or [`Context::invoke_component`], which track
//! busy callbacks so that destroy and remove requests made from inside a
//! callback are applied once it returns.

use std::rc::Rc;

use tessera_core::Result;
use tessera_data::{
    Component, ComponentBehavior, ComponentCx, ComponentState, Entity, EntityBehavior, EntityCx,
    EntityState, FrameHooks,
};

use crate::context::Context;
use crate::frame::FrameTarget;
use crate::gc::DeadComponent;

/// Marks a callback of an entity (and optionally one of its components) as
/// running for as long as it lives.
pub(crate) struct CallbackScope<'a> {
    entity: &'a Entity,
    component: Option<&'a Component>,
}

impl<'a> CallbackScope<'a> {
    pub(crate) fn new(entity: &'a Entity, component: Option<&'a Component>) -> Self {
        entity.enter_callback();
        if let Some(component) = component {
            component.enter_callback();
        }
        Self { entity, component }
    }
}

impl Drop for CallbackScope<'_> {
    fn drop(&mut self) {
        if let Some(component) = self.component {
            component.exit_callback();
        }
        self.entity.exit_callback();
    }
}

impl Context {
    // ─────────────────────────────────────────────────────────────────────
    // Entity-manager subscribers
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn on_add_entity(&self, entity: &Entity) {
        if let Err(err) = self.connect_entity(entity) {
            self.report_error(err);
            return;
        }
        self.init_entity(entity);
    }

    pub(crate) fn on_remove_entity(&self, entity: &Entity) {
        let connected = entity.state() != EntityState::Entry;
        let components = self.disconnect_entity(entity);
        self.shut_entity(entity, connected, components);
    }

    pub(crate) fn on_entity_add_components(&self, entity: &Entity, added: &[Component]) {
        if !entity.state().is_running() {
            return;
        }
        for component in added {
            if let Err(err) = self.connect_component(component) {
                self.report_error(err);
            }
        }
        self.start_components(entity, added);
    }

    pub(crate) fn on_entity_remove_component(&self, entity: &Entity, component: &Component) {
        if component.state().is_tearing_down() {
            return;
        }
        let awoken = self.disconnect_component(component);
        if awoken {
            self.invoke_component(entity, component, |behavior, cx| behavior.shut(cx));
        }
        component.set_state(ComponentState::Death);
        self.collect(DeadComponent(component.clone()));
    }

    // ─────────────────────────────────────────────────────────────────────
    // Connect and disconnect
    // ─────────────────────────────────────────────────────────────────────

    fn connect_entity(&self, entity: &Entity) -> Result<()> {
        if entity.state() != EntityState::Entry {
            return Ok(());
        }
        let wanted = entity.frame_hooks();
        {
            let mut hooks = entity.lifecycle_hooks();
            if wanted.contains(FrameHooks::UPDATE) {
                hooks.update = self.0.update.bind(FrameTarget::Entity(entity.clone()), 0)?;
            }
            if wanted.contains(FrameHooks::LATE_UPDATE) {
                hooks.late_update = self.0.late_update.bind(FrameTarget::Entity(entity.clone()), 0)?;
            }
            let weak = self.downgrade();
            hooks.destroy_self = entity.destroy_self_event().bind(
                Rc::new(move |entity: &Entity| {
                    if let Some(cx) = Context::upgrade(&weak) {
                        cx.destroy_entity(entity);
                    }
                }),
                0,
            )?;
        }
        entity.set_state(EntityState::Init);

        for component in entity.components() {
            self.connect_component(&component)?;
        }
        Ok(())
    }

    fn connect_component(&self, component: &Component) -> Result<()> {
        if component.state() != ComponentState::Attach {
            return Ok(());
        }
        component.configure_events(self.auto_recover(), self.error_sink());
        let wanted = component.frame_hooks();
        {
            let mut hooks = component.lifecycle_hooks();
            if wanted.contains(FrameHooks::UPDATE) {
                hooks.update = self.0.update.bind(FrameTarget::Component(component.clone()), 0)?;
            }
            if wanted.contains(FrameHooks::LATE_UPDATE) {
                hooks.late_update = self
                    .0
                    .late_update
                    .bind(FrameTarget::Component(component.clone()), 0)?;
            }
            let weak = self.downgrade();
            hooks.destroy_self = component.destroy_self_event().bind(
                Rc::new(move |component: &Component| {
                    let (Some(cx), Some(entity)) = (Context::upgrade(&weak), component.entity()) else {
                        return;
                    };
                    if let Err(err) = entity.remove_component(component) {
                        cx.report_error(err);
                    }
                }),
                0,
            )?;
        }
        component.set_state(ComponentState::Awake);
        Ok(())
    }

    /// Unbinds the entity and its components from the runtime.
    ///
    /// ## Returns
    /// The components with, for each, whether its shut callback is due.
    fn disconnect_entity(&self, entity: &Entity) -> Vec<(Component, bool)> {
        entity.lifecycle_hooks().unbind_all();
        let components: Vec<(Component, bool)> = entity
            .components()
            .into_iter()
            .map(|component| {
                let awoken = self.disconnect_component(&component);
                (component, awoken)
            })
            .collect();
        entity.set_state(EntityState::Shut);
        components
    }

    /// Unbinds a component and moves it to `Shut`.
    ///
    /// ## Returns
    /// `true` if the component got past `Awake` and was not already tearing
    /// down, i.e. its shut callback is due.
    fn disconnect_component(&self, component: &Component) -> bool {
        component.lifecycle_hooks().unbind_all();
        let state = component.state();
        if state.is_tearing_down() {
            return false;
        }
        component.set_state(ComponentState::Shut);
        state > ComponentState::Awake
    }

    // ─────────────────────────────────────────────────────────────────────
    // Init and shut
    // ─────────────────────────────────────────────────────────────────────

    fn init_entity(&self, entity: &Entity) {
        if entity.state() != EntityState::Init {
            return;
        }
        self.invoke_entity(entity, |behavior, cx| behavior.init(cx));
        if entity.state() != EntityState::Init {
            return;
        }

        let components = entity.components();
        self.start_components(entity, &components);
        if entity.state() != EntityState::Init {
            return;
        }

        entity.set_state(EntityState::Inited);
        self.invoke_entity(entity, |behavior, cx| behavior.inited(cx));
        if entity.state() == EntityState::Inited {
            entity.set_state(EntityState::Living);
        }
    }

    /// Awakes then starts `components`, stopping as soon as the entity starts
    /// tearing down.
    fn start_components(&self, entity: &Entity, components: &[Component]) {
        for component in components {
            if entity.state().is_tearing_down() {
                return;
            }
            if component.state() != ComponentState::Awake {
                continue;
            }
            self.invoke_component(entity, component, |behavior, cx| behavior.awake(cx));
            if component.state() == ComponentState::Awake {
                component.set_state(ComponentState::Start);
            }
        }

        for component in components {
            if entity.state().is_tearing_down() {
                return;
            }
            if component.state() != ComponentState::Start {
                continue;
            }
            self.invoke_component(entity, component, |behavior, cx| behavior.start(cx));
            if component.state() == ComponentState::Start {
                component.set_state(ComponentState::Living);
            }
        }
    }

    fn shut_entity(&self, entity: &Entity, connected: bool, components: Vec<(Component, bool)>) {
        for (component, awoken) in components.iter().rev() {
            if *awoken {
                self.invoke_component(entity, component, |behavior, cx| behavior.shut(cx));
            }
            component.set_state(ComponentState::Death);
        }
        if connected {
            self.invoke_entity(entity, |behavior, cx| behavior.shut(cx));
        }
        entity.set_state(EntityState::Death);
        if connected {
            self.invoke_entity(entity, |behavior, cx| behavior.destroy(cx));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Callback dispatch
    // ─────────────────────────────────────────────────────────────────────

    /// Calls into the entity behavior, if any, then applies deferred
    /// destroy requests.
    pub(crate) fn invoke_entity(&self, entity: &Entity, f: impl FnOnce(&mut dyn EntityBehavior, &EntityCx<'_>)) {
        {
            let _scope = CallbackScope::new(entity, None);
            let Ok(mut slot) = entity.behavior_cell().try_borrow_mut() else {
                log::warn!("Entity {} re-entered its own behavior, callback skipped", entity.id());
                return;
            };
            if let Some(behavior) = slot.as_mut() {
                let cx = EntityCx::new(self, entity);
                self.call_user(|| f(&mut **behavior, &cx));
            }
        }
        self.settle(entity, None);
    }

    /// Calls into a component behavior, then applies deferred remove and
    /// destroy requests.
    pub(crate) fn invoke_component(
        &self,
        entity: &Entity,
        component: &Component,
        f: impl FnOnce(&mut dyn ComponentBehavior, &ComponentCx<'_>),
    ) {
        {
            let _scope = CallbackScope::new(entity, Some(component));
            let Ok(mut slot) = component.behavior_cell().try_borrow_mut() else {
                log::warn!(
                    "Component '{}' of entity {} re-entered its own behavior, callback skipped",
                    component.name(),
                    entity.id()
                );
                return;
            };
            if let Some(behavior) = slot.as_mut() {
                let cx = ComponentCx::new(self, entity, component);
                self.call_user(|| f(&mut **behavior, &cx));
            }
        }
        self.settle(entity, Some(component));
    }

    /// Applies remove and destroy requests that were deferred while a
    /// callback was running.
    pub(crate) fn settle(&self, entity: &Entity, component: Option<&Component>) {
        if let Some(component) = component {
            if component.busy() == 0 && component.take_remove_pending() && !component.state().is_tearing_down() {
                if let Err(err) = entity.remove_component(component) {
                    self.report_error(err);
                }
            }
        }
        if entity.busy() == 0 && entity.take_destroy_pending() {
            self.destroy_entity(entity);
        }
    }
}
