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

//! Entities: identities owning an ordered list of components.

use std::cell::{Cell, Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use tessera_core::{
    EntityId, Error, ErrorSink, Event, EventRecursion, EventTable, Hook, Result, SerialNo,
};

use crate::behavior::{ComponentBehavior, EntityBehavior, FrameHooks};
use crate::component::{Component, ComponentId};
use crate::state::{ComponentState, EntityState, Scope};

/// Subscriber of an entity's destroy-self event.
pub type DestroyEntityHandler = Rc<dyn Fn(&Entity)>;
/// Subscriber notified when components are attached to an entity.
pub type AddComponentsHandler = Rc<dyn Fn(&Entity, &[Component])>;
/// Subscriber notified when a component is detached from an entity.
pub type RemoveComponentHandler = Rc<dyn Fn(&Entity, &Component)>;

/// Declares the per-entity component-manager event table.
pub struct ComponentMgrEvents;

impl ComponentMgrEvents {
    /// Index of the [`AddComponentsHandler`] event.
    pub const ADD_COMPONENTS: usize = 0;
    /// Index of the [`RemoveComponentHandler`] event.
    pub const REMOVE_COMPONENT: usize = 1;

    fn table() -> EventTable {
        let table = EventTable::builder::<ComponentMgrEvents>()
            .event::<AddComponentsHandler>()
            .event::<RemoveComponentHandler>()
            .build();
        table.init(true, &ErrorSink::log_only(), EventRecursion::Allow);
        table
    }
}

/// The hooks a runtime binds when it connects an entity or a component.
/// Frame hooks stay unbound unless the behavior declared them.
#[derive(Debug, Default)]
pub struct LifecycleHooks {
    /// Subscription to the runtime's update event.
    pub update: Hook,
    /// Subscription to the runtime's late-update event.
    pub late_update: Hook,
    /// Subscription of the runtime to the owner's destroy-self event.
    pub destroy_self: Hook,
}

impl LifecycleHooks {
    /// Unbinds all three hooks.
    pub fn unbind_all(&mut self) {
        self.update.unbind();
        self.late_update.unbind();
        self.destroy_self.unbind();
        *self = Self::default();
    }
}

/// Construction options of an [`Entity`].
#[derive(Default)]
pub struct EntityOptions {
    /// Identifier to reuse; a fresh one is generated when absent.
    pub persist_id: Option<EntityId>,
    /// Name of the prototype the entity was built from.
    pub prototype: String,
    /// Accessibility through the caller API.
    pub scope: Scope,
    /// Entity-level behavior.
    pub behavior: Option<Box<dyn EntityBehavior>>,
}

impl EntityOptions {
    /// Reuses `id` instead of generating one.
    pub fn with_persist_id(mut self, id: EntityId) -> Self {
        self.persist_id = Some(id);
        self
    }

    /// Records the prototype name.
    pub fn with_prototype(mut self, prototype: impl Into<String>) -> Self {
        self.prototype = prototype.into();
        self
    }

    /// Sets the accessibility scope.
    pub fn with_scope(mut self, scope: Scope) -> Self {
        self.scope = scope;
        self
    }

    /// Sets the entity-level behavior.
    pub fn with_behavior<B: EntityBehavior>(mut self, behavior: B) -> Self {
        self.behavior = Some(Box::new(behavior));
        self
    }
}

pub(crate) struct EntityInner {
    id: EntityId,
    serial_no: Cell<SerialNo>,
    prototype: String,
    scope: Scope,
    frame_hooks: FrameHooks,
    state: Cell<EntityState>,
    version: Cell<u64>,
    components: RefCell<Vec<Component>>,
    next_component_id: Cell<u32>,
    behavior: RefCell<Option<Box<dyn EntityBehavior>>>,
    hooks: RefCell<LifecycleHooks>,
    managed_hooks: RefCell<Vec<Hook>>,
    destroy_self: Event<DestroyEntityHandler>,
    component_events: EventTable,
    busy: Cell<u32>,
    destroy_pending: Cell<bool>,
}

/// A shared handle to an entity. Clones refer to the same entity.
///
/// The runtime that hosts the entity owns it; other holders only keep it
/// reachable.
#[derive(Clone)]
pub struct Entity(Rc<EntityInner>);

impl Entity {
    /// Creates an entity in the `Entry` state.
    pub fn new(options: EntityOptions) -> Self {
        let frame_hooks = options
            .behavior
            .as_deref()
            .map_or(FrameHooks::EMPTY, |behavior| behavior.frame_hooks());
        Self(Rc::new(EntityInner {
            id: options.persist_id.unwrap_or_else(EntityId::new),
            serial_no: Cell::new(0),
            prototype: options.prototype,
            scope: options.scope,
            frame_hooks,
            state: Cell::new(EntityState::Entry),
            version: Cell::new(0),
            components: RefCell::new(Vec::new()),
            next_component_id: Cell::new(0),
            behavior: RefCell::new(options.behavior),
            hooks: RefCell::new(LifecycleHooks::default()),
            managed_hooks: RefCell::new(Vec::new()),
            destroy_self: Event::with_config(true, ErrorSink::log_only(), EventRecursion::Discard),
            component_events: ComponentMgrEvents::table(),
            busy: Cell::new(0),
            destroy_pending: Cell::new(false),
        }))
    }

    pub(crate) fn from_inner(inner: Rc<EntityInner>) -> Self {
        Self(inner)
    }

    /// Persistent identifier.
    pub fn id(&self) -> EntityId {
        self.0.id
    }

    /// Serial number assigned when the entity joined a runtime, `0` before.
    pub fn serial_no(&self) -> SerialNo {
        self.0.serial_no.get()
    }

    /// Prototype the entity was built from. Empty if built by hand.
    pub fn prototype(&self) -> &str {
        &self.0.prototype
    }

    /// Accessibility scope.
    pub fn scope(&self) -> Scope {
        self.0.scope
    }

    /// Current lifecycle state.
    pub fn state(&self) -> EntityState {
        self.0.state.get()
    }

    /// Version counter, bumped on every component addition or removal.
    pub fn version(&self) -> u64 {
        self.0.version.get()
    }

    /// Frame events the entity behavior declared.
    pub fn frame_hooks(&self) -> FrameHooks {
        self.0.frame_hooks
    }

    /// Returns `true` if both handles refer to the same entity.
    pub fn ptr_eq(&self, other: &Entity) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    /// Snapshot of the attached components, in attachment order.
    pub fn components(&self) -> Vec<Component> {
        self.0.components.borrow().clone()
    }

    /// Number of attached components.
    pub fn component_count(&self) -> usize {
        self.0.components.borrow().len()
    }

    /// First component attached under `name`.
    pub fn get_component(&self, name: &str) -> Option<Component> {
        self.0
            .components
            .borrow()
            .iter()
            .find(|c| c.name() == name)
            .cloned()
    }

    /// Component with the given id.
    pub fn get_component_by_id(&self, id: ComponentId) -> Option<Component> {
        self.0
            .components
            .borrow()
            .iter()
            .find(|c| c.id() == id)
            .cloned()
    }

    /// First component whose behavior is a `T`.
    pub fn find_component<T: ComponentBehavior>(&self) -> Option<Component> {
        self.0
            .components
            .borrow()
            .iter()
            .find(|c| c.is::<T>())
            .cloned()
    }

    /// Runs `f` on the first component whose behavior is a `T`.
    pub fn with_component<T: ComponentBehavior, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        self.find_component::<T>()
            .ok_or(Error::ComponentNotFound)?
            .with_behavior(f)
    }

    /// Runs `f` on the entity behavior.
    pub fn with_behavior<T: EntityBehavior, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut slot = self
            .0
            .behavior
            .try_borrow_mut()
            .map_err(|_| Error::invalid_state(format!("entity {} is in use", self.id())))?;
        let behavior = slot.as_mut().ok_or(Error::ComponentNotFound)?;
        let behavior: &mut dyn EntityBehavior = &mut **behavior;
        let typed = behavior
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(Error::ComponentNotFound)?;
        Ok(f(typed))
    }

    /// Attaches a component.
    ///
    /// On an entity hosted by a runtime the component is connected, awoken and
    /// started before this returns.
    pub fn add_component<C: ComponentBehavior>(&self, name: impl Into<String>, behavior: C) -> Result<Component> {
        self.add_boxed_component(name, Box::new(behavior))
    }

    /// Attaches an already boxed component.
    pub fn add_boxed_component(
        &self,
        name: impl Into<String>,
        behavior: Box<dyn ComponentBehavior>,
    ) -> Result<Component> {
        let component = self.make_component(name.into(), behavior);
        self.attach(std::slice::from_ref(&component))?;
        Ok(component)
    }

    /// Attaches several components as one batch: all of them are awoken before
    /// any of them is started.
    pub fn add_components(&self, batch: Vec<(String, Box<dyn ComponentBehavior>)>) -> Result<Vec<Component>> {
        if batch.is_empty() {
            return Err(Error::invalid_argument("no component to add"));
        }
        let added: Vec<Component> = batch
            .into_iter()
            .map(|(name, behavior)| self.make_component(name, behavior))
            .collect();
        self.attach(&added)?;
        Ok(added)
    }

    fn make_component(&self, name: String, behavior: Box<dyn ComponentBehavior>) -> Component {
        let id = ComponentId(self.0.next_component_id.get());
        self.0.next_component_id.set(id.0 + 1);
        Component::new(id, name, Rc::downgrade(&self.0), behavior)
    }

    fn attach(&self, added: &[Component]) -> Result<()> {
        if self.state().is_tearing_down() {
            return Err(Error::invalid_state(format!(
                "entity {} is {:?}, components can no longer be added",
                self.id(),
                self.state()
            )));
        }
        self.0.components.borrow_mut().extend(added.iter().cloned());
        self.bump_version();
        if let Some(event) = self
            .0
            .component_events
            .get::<AddComponentsHandler>(ComponentMgrEvents::ADD_COMPONENTS)
        {
            event.emit(|handler| {
                handler(self, added);
                true
            })?;
        }
        Ok(())
    }

    /// Detaches a component.
    ///
    /// Inside a runtime the component is disconnected and shut down before
    /// this returns, unless one of its own callbacks is running, in which case
    /// the removal happens as soon as that callback returns.
    pub fn remove_component(&self, component: &Component) -> Result<()> {
        if !component.belongs_to(&self.0) {
            return Err(Error::ComponentNotFound);
        }
        if component.busy() > 0 {
            component.set_remove_pending(true);
            return Ok(());
        }
        let removed = {
            let mut list = self.0.components.borrow_mut();
            list.iter()
                .position(|c| c.ptr_eq(component))
                .map(|at| list.remove(at))
        };
        let Some(removed) = removed else {
            return Err(Error::ComponentNotFound);
        };
        self.bump_version();

        match self
            .0
            .component_events
            .get::<RemoveComponentHandler>(ComponentMgrEvents::REMOVE_COMPONENT)
        {
            Some(event) if !event.is_empty() => {
                event.emit(|handler| {
                    handler(self, &removed);
                    true
                })?;
            }
            _ => {
                removed.lifecycle_hooks().unbind_all();
                removed.set_state(ComponentState::Death);
            }
        }
        Ok(())
    }

    /// Detaches the first component attached under `name`.
    pub fn remove_component_by_name(&self, name: &str) -> Result<()> {
        let component = self.get_component(name).ok_or(Error::ComponentNotFound)?;
        self.remove_component(&component)
    }

    /// Requests destruction of the entity from its runtime. Does nothing for
    /// an entity that is not hosted.
    pub fn destroy_self(&self) {
        if self.0.destroy_self.is_empty() {
            log::debug!("Entity {} is not hosted, destroy-self ignored", self.id());
            return;
        }
        if let Err(err) = self.0.destroy_self.emit(|handler| {
            handler(self);
            true
        }) {
            log::warn!("Destroy-self of entity {} failed: {err}", self.id());
        }
    }

    /// Hands hooks over to the entity; they are unbound when it is destroyed.
    pub fn manage_hooks(&self, hooks: impl IntoIterator<Item = Hook>) {
        let mut managed = self.0.managed_hooks.borrow_mut();
        managed.retain(Hook::is_bound);
        managed.extend(hooks);
    }

    /// Unbinds every managed hook.
    pub fn clean_managed_hooks(&self) {
        let hooks = std::mem::take(&mut *self.0.managed_hooks.borrow_mut());
        hooks.iter().for_each(Hook::unbind);
    }

    fn bump_version(&self) {
        self.0.version.set(self.0.version.get() + 1);
    }

    // ─────────────────────────────────────────────────────────────────────
    // Runtime plumbing, driven by the lifecycle manager.
    // ─────────────────────────────────────────────────────────────────────

    /// Assigns the serial number of this instantiation.
    pub fn set_serial_no(&self, serial_no: SerialNo) {
        self.0.serial_no.set(serial_no);
    }

    /// Moves the entity to `state`.
    pub fn set_state(&self, state: EntityState) {
        debug_assert!(state >= self.state(), "entity state moved backwards");
        self.0.state.set(state);
    }

    /// Lifecycle hooks bound while connected.
    pub fn lifecycle_hooks(&self) -> RefMut<'_, LifecycleHooks> {
        self.0.hooks.borrow_mut()
    }

    /// The destroy-self event the runtime subscribes to.
    pub fn destroy_self_event(&self) -> &Event<DestroyEntityHandler> {
        &self.0.destroy_self
    }

    /// The component-manager event table; see [`ComponentMgrEvents`].
    pub fn component_events(&self) -> &EventTable {
        &self.0.component_events
    }

    /// Applies the hosting runtime's panic policy to the events the entity
    /// owns. Entities start out absorbing panics into a log-only sink.
    pub fn configure_events(&self, auto_recover: bool, sink: &ErrorSink) {
        self.0
            .destroy_self
            .init(auto_recover, sink.clone(), EventRecursion::Discard);
        self.0
            .component_events
            .init(auto_recover, sink, EventRecursion::Allow);
    }

    /// The behavior slot. `None` if the entity has no behavior or was disposed.
    pub fn behavior_cell(&self) -> &RefCell<Option<Box<dyn EntityBehavior>>> {
        &self.0.behavior
    }

    /// Returns `true` if the entity has a behavior.
    pub fn has_behavior(&self) -> bool {
        self.0.behavior.try_borrow().map_or(true, |b| b.is_some())
    }

    /// Marks a callback of the entity or one of its components as running.
    pub fn enter_callback(&self) {
        self.0.busy.set(self.0.busy.get() + 1);
    }

    /// Marks a callback of the entity or one of its components as finished.
    pub fn exit_callback(&self) {
        self.0.busy.set(self.0.busy.get().saturating_sub(1));
    }

    /// Number of callbacks of the entity and its components on the stack.
    pub fn busy(&self) -> u32 {
        self.0.busy.get()
    }

    /// Records a destruction requested while a callback was running.
    pub fn set_destroy_pending(&self) {
        self.0.destroy_pending.set(true);
    }

    /// Consumes a recorded destruction request.
    pub fn take_destroy_pending(&self) -> bool {
        self.0.destroy_pending.replace(false)
    }

    /// Read access to the component list.
    pub fn components_ref(&self) -> Ref<'_, Vec<Component>> {
        self.0.components.borrow()
    }

    /// Releases the behavior and every component. Called once the entity is
    /// dead and reclaimed.
    pub fn dispose(&self) {
        let components = std::mem::take(&mut *self.0.components.borrow_mut());
        components.iter().for_each(Component::dispose);
        let behavior = self.0.behavior.try_borrow_mut().ok().and_then(|mut b| b.take());
        drop(behavior);
        self.0.component_events.clean();
        self.0.destroy_self.clean();
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.0.id)
            .field("serial_no", &self.serial_no())
            .field("prototype", &self.0.prototype)
            .field("state", &self.state())
            .field("version", &self.version())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct Health(u32);
    impl ComponentBehavior for Health {}

    struct Tracked(Rc<Cell<u32>>);
    impl ComponentBehavior for Tracked {}
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.0.set(self.0.get() + 1);
        }
    }

    #[test]
    fn test_new_entity_starts_in_entry() {
        let id = EntityId::new();
        let entity = Entity::new(
            EntityOptions::default()
                .with_persist_id(id)
                .with_prototype("Player")
                .with_scope(Scope::Global),
        );
        assert_eq!(entity.id(), id);
        assert_eq!(entity.prototype(), "Player");
        assert_eq!(entity.scope(), Scope::Global);
        assert_eq!(entity.state(), EntityState::Entry);
        assert_eq!(entity.version(), 0);
        assert_eq!(entity.serial_no(), 0);
    }

    #[test]
    fn test_versions_are_monotonic_across_add_and_remove() {
        // --- 1. SETUP ---
        let entity = Entity::new(EntityOptions::default());

        // --- 2. ACTION ---
        let health = entity.add_component("health", Health(10)).unwrap();
        let v1 = entity.version();
        entity.remove_component(&health).unwrap();
        let v2 = entity.version();
        entity.add_component("health", Health(5)).unwrap();
        let v3 = entity.version();

        // --- 3. ASSERTIONS ---
        assert!(v1 < v2 && v2 < v3);
        assert_eq!(health.state(), ComponentState::Death);
        assert_eq!(entity.component_count(), 1);
        assert_ne!(entity.get_component("health").unwrap().id(), health.id());
    }

    #[test]
    fn test_typed_component_access() {
        let entity = Entity::new(EntityOptions::default());
        entity.add_component("health", Health(10)).unwrap();

        entity.with_component::<Health, _>(|h| h.0 -= 3).unwrap();
        assert_eq!(entity.with_component::<Health, _>(|h| h.0).unwrap(), 7);

        struct Missing;
        impl ComponentBehavior for Missing {}
        assert_eq!(
            entity.with_component::<Missing, _>(|_| ()).unwrap_err(),
            Error::ComponentNotFound
        );
    }

    #[test]
    fn test_removing_a_foreign_component_fails() {
        let a = Entity::new(EntityOptions::default());
        let b = Entity::new(EntityOptions::default());
        let c = a.add_component("", Health::default()).unwrap();
        assert_eq!(b.remove_component(&c).unwrap_err(), Error::ComponentNotFound);
        a.remove_component(&c).unwrap();
        assert_eq!(a.remove_component(&c).unwrap_err(), Error::ComponentNotFound);
    }

    #[test]
    fn test_add_components_notifies_subscribers_once_per_batch() {
        let entity = Entity::new(EntityOptions::default());
        let seen = Rc::new(Cell::new(0usize));
        let counter = Rc::clone(&seen);
        let handler: AddComponentsHandler =
            Rc::new(move |_: &Entity, added: &[Component]| counter.set(counter.get() + added.len()));
        entity
            .component_events()
            .get::<AddComponentsHandler>(ComponentMgrEvents::ADD_COMPONENTS)
            .unwrap()
            .bind(handler, 0)
            .unwrap();

        entity
            .add_components(vec![
                ("a".into(), Box::new(Health(1)) as Box<dyn ComponentBehavior>),
                ("b".into(), Box::new(Health(2))),
            ])
            .unwrap();
        assert_eq!(seen.get(), 2);
        assert!(entity.add_components(Vec::new()).is_err());
    }

    #[test]
    fn test_tearing_down_entity_refuses_components() {
        let entity = Entity::new(EntityOptions::default());
        entity.set_state(EntityState::Shut);
        assert!(matches!(
            entity.add_component("late", Health(1)),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_destroy_self_reaches_subscriber() {
        let entity = Entity::new(EntityOptions::default());
        entity.destroy_self();

        let fired = Rc::new(Cell::new(false));
        let flag = Rc::clone(&fired);
        let handler: DestroyEntityHandler = Rc::new(move |_: &Entity| flag.set(true));
        entity.destroy_self_event().bind(handler, 0).unwrap();
        entity.destroy_self();
        assert!(fired.get());
    }

    #[test]
    fn test_configured_events_follow_the_host_panic_policy() {
        // --- 1. SETUP ---
        let entity = Entity::new(EntityOptions::default());
        let handler: AddComponentsHandler = Rc::new(|_: &Entity, _: &[Component]| panic!("observer failed"));
        entity
            .component_events()
            .get::<AddComponentsHandler>(ComponentMgrEvents::ADD_COMPONENTS)
            .unwrap()
            .bind(handler, 0)
            .unwrap();
        let (sink, rx) = ErrorSink::channel(4);

        // --- 2. ACTION ---
        entity.configure_events(true, &sink);
        let absorbed = entity.add_component("a", Health(1));
        entity.configure_events(false, &sink);
        let unwound = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = entity.add_component("b", Health(2));
        }));

        // --- 3. ASSERTIONS ---
        assert!(absorbed.is_ok());
        assert_eq!(rx.try_recv(), Ok(Error::Panicked("observer failed".into())));
        assert!(unwound.is_err());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_managed_hooks_are_unbound_on_clean() {
        let entity = Entity::new(EntityOptions::default());
        let event: Event<u8> = Event::with_config(false, ErrorSink::log_only(), EventRecursion::Allow);
        let hook = event.bind(1, 0).unwrap();
        entity.manage_hooks([hook.clone()]);
        entity.clean_managed_hooks();
        assert!(!hook.is_bound());
        assert!(event.is_empty());
    }

    #[test]
    fn test_dispose_releases_behaviors() {
        let drops = Rc::new(Cell::new(0));
        let entity = Entity::new(EntityOptions::default());
        let c = entity.add_component("t", Tracked(Rc::clone(&drops))).unwrap();
        entity.dispose();
        assert_eq!(drops.get(), 1);
        assert!(c.is_disposed());
        assert_eq!(entity.component_count(), 0);
    }
}
