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

//! The runtime context: everything a runtime thread owns.

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use tessera_core::{
    guard::catch_panic, EntityId, Error, ErrorSink, Event, EventRecursion, EventTable, PluginBundle,
    Result, SerialNo,
};
use tessera_data::entity::{AddComponentsHandler, RemoveComponentHandler};
use tessera_data::{Component, ComponentMgrEvents, Entity, EntityLib, EntityState, FrameInfo, RuntimeAccess, Scope};

use crate::caller::Caller;
use crate::directory::{DirectoryEntry, EntityDirectory};
use crate::frame::{FrameState, FrameTarget};
use crate::gc::{DeadEntity, Reclaim, ReclaimList};
use crate::options::{CustomGc, RuntimeOptions};
use crate::plugin::RuntimePlugin;
use crate::runtime::RuntimeHandle;

/// Subscriber notified when an entity joins the runtime.
pub type AddEntityHandler = Rc<dyn Fn(&Context, &Entity)>;
/// Subscriber notified when an entity leaves the runtime.
pub type RemoveEntityHandler = Rc<dyn Fn(&Context, &Entity)>;
/// Subscriber notified when components are attached to a hosted entity.
pub type EntityAddComponentsHandler = Rc<dyn Fn(&Context, &Entity, &[Component])>;
/// Subscriber notified when a component is detached from a hosted entity.
pub type EntityRemoveComponentHandler = Rc<dyn Fn(&Context, &Entity, &Component)>;

/// Declares the entity-manager event table of a runtime.
///
/// The lifecycle manager subscribes to every slot at priority `0`. Observers
/// bound with a negative priority run before it (for `ADD_ENTITY`, before the
/// entity is initialized); observers bound with a positive priority run after.
pub struct EntityMgrEvents;

impl EntityMgrEvents {
    /// Index of the [`AddEntityHandler`] event.
    pub const ADD_ENTITY: usize = 0;
    /// Index of the [`RemoveEntityHandler`] event.
    pub const REMOVE_ENTITY: usize = 1;
    /// Index of the [`EntityAddComponentsHandler`] event.
    pub const ENTITY_ADD_COMPONENTS: usize = 2;
    /// Index of the [`EntityRemoveComponentHandler`] event.
    pub const ENTITY_REMOVE_COMPONENT: usize = 3;

    fn table() -> EventTable {
        EventTable::builder::<EntityMgrEvents>()
            .event::<AddEntityHandler>()
            .event::<RemoveEntityHandler>()
            .event::<EntityAddComponentsHandler>()
            .event::<EntityRemoveComponentHandler>()
            .build()
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Context>> = const { RefCell::new(None) };
}

#[derive(Default)]
struct EntityMap {
    by_id: HashMap<EntityId, Entity>,
    by_serial: BTreeMap<SerialNo, EntityId>,
}

pub(crate) struct ContextInner {
    name: String,
    handle: RuntimeHandle,
    auto_recover: bool,
    sink: ErrorSink,
    entities: RefCell<EntityMap>,
    entity_events: EventTable,
    pub(crate) update: Event<FrameTarget>,
    pub(crate) late_update: Event<FrameTarget>,
    pub(crate) frame: Option<FrameState>,
    reclaim: RefCell<ReclaimList>,
    custom_gc: Option<CustomGc>,
    plugins: PluginBundle<dyn RuntimePlugin>,
    directory: Option<Arc<EntityDirectory>>,
    entity_lib: Option<Arc<EntityLib>>,
    sync_call_timeout: std::time::Duration,
}

/// The state of one runtime, reachable only from its consumer thread.
///
/// Every lifecycle transition, event emission and user callback of the
/// runtime's entities happens through a `Context`. Clones are handles to the
/// same context.
#[derive(Clone)]
pub struct Context(pub(crate) Rc<ContextInner>);

impl Context {
    pub(crate) fn new(options: RuntimeOptions, handle: RuntimeHandle) -> Result<Self> {
        let sink = options.error_sink.clone();
        let entity_events = EntityMgrEvents::table();
        entity_events.init(options.auto_recover, &sink, EventRecursion::Allow);

        let update = Event::with_config(options.auto_recover, sink.clone(), EventRecursion::Disallow);
        let late_update = Event::with_config(options.auto_recover, sink.clone(), EventRecursion::Disallow);

        let cx = Self(Rc::new(ContextInner {
            name: options.name,
            handle,
            auto_recover: options.auto_recover,
            sink,
            entities: RefCell::new(EntityMap::default()),
            entity_events,
            update,
            late_update,
            frame: options.frame.map(FrameState::new),
            reclaim: RefCell::new(ReclaimList::default()),
            custom_gc: options.custom_gc,
            plugins: options.plugins,
            directory: options.directory,
            entity_lib: options.entity_lib,
            sync_call_timeout: options.sync_call_timeout,
        }));
        cx.bind_lifecycle_manager()?;
        Ok(cx)
    }

    fn bind_lifecycle_manager(&self) -> Result<()> {
        let events = &self.0.entity_events;
        if let Some(event) = events.get::<AddEntityHandler>(EntityMgrEvents::ADD_ENTITY) {
            event.bind(Rc::new(|cx: &Context, entity: &Entity| cx.on_add_entity(entity)), 0)?;
        }
        if let Some(event) = events.get::<RemoveEntityHandler>(EntityMgrEvents::REMOVE_ENTITY) {
            event.bind(Rc::new(|cx: &Context, entity: &Entity| cx.on_remove_entity(entity)), 0)?;
        }
        if let Some(event) =
            events.get::<EntityAddComponentsHandler>(EntityMgrEvents::ENTITY_ADD_COMPONENTS)
        {
            event.bind(
                Rc::new(|cx: &Context, entity: &Entity, added: &[Component]| {
                    cx.on_entity_add_components(entity, added)
                }),
                0,
            )?;
        }
        if let Some(event) =
            events.get::<EntityRemoveComponentHandler>(EntityMgrEvents::ENTITY_REMOVE_COMPONENT)
        {
            event.bind(
                Rc::new(|cx: &Context, entity: &Entity, component: &Component| {
                    cx.on_entity_remove_component(entity, component)
                }),
                0,
            )?;
        }
        Ok(())
    }

    pub(crate) fn downgrade(&self) -> Weak<ContextInner> {
        Rc::downgrade(&self.0)
    }

    pub(crate) fn upgrade(weak: &Weak<ContextInner>) -> Option<Self> {
        weak.upgrade().map(Self)
    }

    /// Runs `f` with the context of the runtime owning the current thread.
    ///
    /// ## Returns
    /// `None` when called from a thread that is not a runtime thread.
    pub fn with_current<R>(f: impl FnOnce(&Context) -> R) -> Option<R> {
        let current = CURRENT.with(|slot| slot.borrow().clone());
        current.map(|cx| f(&cx))
    }

    pub(crate) fn set_current(cx: Option<Context>) {
        CURRENT.with(|slot| *slot.borrow_mut() = cx);
    }

    /// Runtime name.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Handle to the hosting runtime, usable from any thread.
    pub fn handle(&self) -> &RuntimeHandle {
        &self.0.handle
    }

    /// Frame information, `None` if the runtime is not frame-paced.
    pub fn frame(&self) -> Option<FrameInfo> {
        self.0.frame.as_ref().map(FrameState::info)
    }

    /// Whether user panics are absorbed.
    pub fn auto_recover(&self) -> bool {
        self.0.auto_recover
    }

    /// The prototype library, if the runtime is linked to one.
    pub fn entity_lib(&self) -> Option<&Arc<EntityLib>> {
        self.0.entity_lib.as_ref()
    }

    /// A caller for global entities, if the runtime is linked to a directory.
    pub fn caller(&self) -> Option<Caller> {
        self.0.directory.as_ref().map(|directory| {
            Caller::new(Arc::clone(directory), self.0.sink.clone())
                .with_sync_call_timeout(self.0.sync_call_timeout)
        })
    }

    /// The entity-manager event table; see [`EntityMgrEvents`].
    pub fn entity_mgr_events(&self) -> &EventTable {
        &self.0.entity_events
    }

    /// Installed plugin named `name`.
    pub fn plugin(&self, name: &str) -> Option<&Arc<dyn RuntimePlugin>> {
        self.0.plugins.get(name)
    }

    /// Installed plugin named `name`, as its concrete type.
    pub fn plugin_as<T: RuntimePlugin>(&self, name: &str) -> Option<&T> {
        let plugin: &dyn RuntimePlugin = self.0.plugins.get(name)?.as_ref();
        plugin.as_any().downcast_ref::<T>()
    }

    /// Forwards an error to the error sink.
    pub fn report_error(&self, error: Error) {
        self.0.handle.metrics().record_error();
        self.0.sink.report(error);
    }

    /// The error sink of the runtime.
    pub(crate) fn error_sink(&self) -> &ErrorSink {
        &self.0.sink
    }

    /// Runs a user callback, absorbing its panic when auto-recover is on.
    ///
    /// With auto-recover off the panic is reported, the runtime is terminated
    /// and the panic keeps unwinding.
    pub(crate) fn call_user(&self, f: impl FnOnce()) {
        let Err(err) = catch_panic(f) else {
            return;
        };
        self.report_error(err.clone());
        if !self.0.auto_recover {
            log::error!("Runtime '{}': callback panicked without auto-recover, terminating", self.name());
            self.0.handle.terminate();
            let message = match err {
                Error::Panicked(message) => message,
                other => other.to_string(),
            };
            std::panic::resume_unwind(Box::new(message));
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Entity manager
    // ─────────────────────────────────────────────────────────────────────

    /// Adds an entity, then connects and initializes it.
    ///
    /// The entity must be in the `Entry` state. Global entities are also
    /// registered in the directory. When this returns the entity is usually
    /// `Living`, unless a callback destroyed it during initialization.
    pub fn add_entity(&self, entity: Entity) -> Result<()> {
        let id = entity.id();
        if id.is_nil() {
            return Err(Error::NilEntityId);
        }
        if entity.state() != EntityState::Entry {
            return Err(Error::invalid_state(format!(
                "entity {id} is {:?}, only new entities can be added",
                entity.state()
            )));
        }
        if self.0.entities.borrow().by_id.contains_key(&id) {
            return Err(Error::invalid_argument(format!("entity {id} already exists")));
        }

        let serial_no = tessera_core::id::next_serial_no();
        entity.set_serial_no(serial_no);
        if entity.scope() == Scope::Global {
            if let Some(directory) = &self.0.directory {
                directory.register(
                    id,
                    DirectoryEntry {
                        serial_no,
                        runtime: self.0.handle.clone(),
                    },
                )?;
            }
        }
        {
            let mut entities = self.0.entities.borrow_mut();
            entities.by_id.insert(id, entity.clone());
            entities.by_serial.insert(serial_no, id);
        }
        self.0.handle.metrics().add_entities(1);
        entity.configure_events(self.0.auto_recover, &self.0.sink);
        self.forward_component_events(&entity)?;
        log::trace!("Runtime '{}': entity {id} added", self.name());

        self.emit_entity_event::<AddEntityHandler>(EntityMgrEvents::ADD_ENTITY, |handler| {
            handler(self, &entity)
        });
        Ok(())
    }

    fn forward_component_events(&self, entity: &Entity) -> Result<()> {
        let events = entity.component_events();
        let mut hooks = Vec::with_capacity(2);

        if let Some(event) = events.get::<AddComponentsHandler>(ComponentMgrEvents::ADD_COMPONENTS) {
            let weak = self.downgrade();
            hooks.push(event.bind(
                Rc::new(move |entity: &Entity, added: &[Component]| {
                    if let Some(cx) = Context::upgrade(&weak) {
                        cx.emit_entity_event::<EntityAddComponentsHandler>(
                            EntityMgrEvents::ENTITY_ADD_COMPONENTS,
                            |handler| handler(&cx, entity, added),
                        );
                    }
                }),
                0,
            )?);
        }
        if let Some(event) = events.get::<RemoveComponentHandler>(ComponentMgrEvents::REMOVE_COMPONENT) {
            let weak = self.downgrade();
            hooks.push(event.bind(
                Rc::new(move |entity: &Entity, component: &Component| {
                    if let Some(cx) = Context::upgrade(&weak) {
                        cx.emit_entity_event::<EntityRemoveComponentHandler>(
                            EntityMgrEvents::ENTITY_REMOVE_COMPONENT,
                            |handler| handler(&cx, entity, component),
                        );
                    }
                }),
                0,
            )?);
        }
        entity.manage_hooks(hooks);
        Ok(())
    }

    fn emit_entity_event<T: Clone + 'static>(&self, index: usize, mut call: impl FnMut(&T)) {
        let Some(event) = self.0.entity_events.get::<T>(index) else {
            return;
        };
        if let Err(err) = event.emit(|handler| {
            call(handler);
            true
        }) {
            self.report_error(err);
        }
    }

    /// Destroys the entity with the given id.
    pub fn remove_entity(&self, id: EntityId) -> Result<()> {
        let entity = self.get_entity(id).ok_or(Error::EntityNotFound(id))?;
        self.destroy_entity(&entity);
        Ok(())
    }

    /// Destroys an entity through the disconnect and shutdown path.
    ///
    /// If one of the entity's callbacks is running, destruction happens as
    /// soon as that callback returns.
    pub fn destroy_entity(&self, entity: &Entity) {
        if entity.state().is_tearing_down() {
            return;
        }
        if entity.busy() > 0 {
            entity.set_destroy_pending();
            return;
        }
        self.teardown(entity);
    }

    fn teardown(&self, entity: &Entity) {
        let id = entity.id();
        let removed = {
            let mut entities = self.0.entities.borrow_mut();
            match entities.by_id.get(&id) {
                Some(hosted) if hosted.ptr_eq(entity) => {
                    entities.by_id.remove(&id);
                    entities.by_serial.remove(&entity.serial_no());
                    true
                }
                _ => false,
            }
        };
        if !removed {
            log::debug!("Runtime '{}': entity {id} is not hosted here", self.name());
            return;
        }
        if entity.scope() == Scope::Global {
            if let Some(directory) = &self.0.directory {
                directory.unregister(id, entity.serial_no());
            }
        }
        self.0.handle.metrics().add_entities(-1);

        self.emit_entity_event::<RemoveEntityHandler>(EntityMgrEvents::REMOVE_ENTITY, |handler| {
            handler(self, entity)
        });
        entity.clean_managed_hooks();
        self.collect(DeadEntity(entity.clone()));
        log::trace!("Runtime '{}': entity {id} destroyed", self.name());
    }

    /// The entity with the given id.
    pub fn get_entity(&self, id: EntityId) -> Option<Entity> {
        self.0.entities.borrow().by_id.get(&id).cloned()
    }

    /// The entity with the given id, if it is the instantiation `serial_no`.
    pub fn get_entity_with_serial_no(&self, id: EntityId, serial_no: SerialNo) -> Option<Entity> {
        self.get_entity(id).filter(|e| e.serial_no() == serial_no)
    }

    /// Resolves a call target: hosted, matching the serial number if one is
    /// given, and not being torn down.
    pub(crate) fn resolve(&self, id: EntityId, serial_no: Option<SerialNo>) -> Option<Entity> {
        let entity = match serial_no {
            Some(serial_no) => self.get_entity_with_serial_no(id, serial_no)?,
            None => self.get_entity(id)?,
        };
        (!entity.state().is_tearing_down()).then_some(entity)
    }

    /// Number of hosted entities.
    pub fn entity_count(&self) -> usize {
        self.0.entities.borrow().by_id.len()
    }

    /// Hosted entities, oldest first.
    pub fn entities(&self) -> Vec<Entity> {
        let entities = self.0.entities.borrow();
        entities
            .by_serial
            .values()
            .filter_map(|id| entities.by_id.get(id).cloned())
            .collect()
    }

    // ─────────────────────────────────────────────────────────────────────
    // Reclamation
    // ─────────────────────────────────────────────────────────────────────

    /// Adds an object to the reclamation list.
    pub fn collect(&self, item: impl Reclaim + 'static) {
        self.0.reclaim.borrow_mut().collect(Box::new(item));
    }

    /// Number of objects waiting for reclamation.
    pub fn pending_reclaim(&self) -> usize {
        self.0.reclaim.borrow().len()
    }

    /// Runs the built-in reclamation pass now.
    ///
    /// ## Returns
    /// The number of objects released.
    pub fn reclaim(&self) -> usize {
        let items = self.0.reclaim.borrow_mut().take();
        let count = items.len();
        for mut item in items {
            self.call_user(|| item.reclaim());
        }
        self.0.handle.metrics().record_gc();
        if count > 0 {
            log::debug!("Runtime '{}': reclaimed {count} objects", self.name());
        }
        count
    }

    /// Reclamation tick: the custom override if one is configured, the
    /// built-in pass otherwise.
    pub(crate) fn run_gc(&self) {
        match self.0.custom_gc.clone() {
            Some(custom) => self.call_user(|| custom(self)),
            None => {
                self.reclaim();
            }
        }
    }

    // ─────────────────────────────────────────────────────────────────────
    // Start and stop
    // ─────────────────────────────────────────────────────────────────────

    pub(crate) fn init_plugins(&self) {
        for (name, plugin) in self.0.plugins.iter() {
            log::debug!("Runtime '{}': init plugin '{name}'", self.name());
            self.call_user(|| plugin.init(self));
        }
    }

    /// Destroys every entity, newest first, shuts plugins down in reverse
    /// order and releases everything still pending.
    pub(crate) fn shutdown(&self) {
        for entity in self.entities().into_iter().rev() {
            self.destroy_entity(&entity);
        }
        for (name, plugin) in self.0.plugins.iter().rev() {
            log::debug!("Runtime '{}': shut plugin '{name}'", self.name());
            self.call_user(|| plugin.shut(self));
        }
        self.reclaim();
        self.0.update.clean();
        self.0.late_update.clean();
        self.0.entity_events.close();
        self.0.entity_events.clean();
    }
}

impl RuntimeAccess for Context {
    fn runtime_name(&self) -> &str {
        &self.0.name
    }

    fn frame(&self) -> Option<FrameInfo> {
        Context::frame(self)
    }

    fn report_error(&self, error: Error) {
        Context::report_error(self, error);
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("name", &self.0.name)
            .field("entities", &self.entity_count())
            .field("frame", &self.0.frame.as_ref().map(FrameState::info))
            .finish()
    }
}
