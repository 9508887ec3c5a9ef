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

//! Components: units of behavior attached to exactly one entity.

use std::any::TypeId;
use std::cell::{Cell, RefCell, RefMut};
use std::fmt;
use std::rc::{Rc, Weak};

use tessera_core::{Error, ErrorSink, Event, EventRecursion, Result};

use crate::behavior::{ComponentBehavior, FrameHooks};
use crate::entity::{Entity, EntityInner, LifecycleHooks};
use crate::state::ComponentState;

/// Subscriber of a component's destroy-self event.
pub type DestroyComponentHandler = Rc<dyn Fn(&Component)>;

/// Index of a component inside its entity, unique for the entity's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentId(pub u32);

pub(crate) struct ComponentInner {
    id: ComponentId,
    name: String,
    type_id: TypeId,
    frame_hooks: FrameHooks,
    state: Cell<ComponentState>,
    entity: Weak<EntityInner>,
    behavior: RefCell<Option<Box<dyn ComponentBehavior>>>,
    hooks: RefCell<LifecycleHooks>,
    destroy_self: Event<DestroyComponentHandler>,
    busy: Cell<u32>,
    remove_pending: Cell<bool>,
}

/// A shared handle to a component. Clones refer to the same component.
#[derive(Clone)]
pub struct Component(Rc<ComponentInner>);

impl Component {
    pub(crate) fn new(
        id: ComponentId,
        name: String,
        entity: Weak<EntityInner>,
        behavior: Box<dyn ComponentBehavior>,
    ) -> Self {
        let behavior_ref: &dyn ComponentBehavior = &*behavior;
        let type_id = behavior_ref.as_any().type_id();
        let frame_hooks = behavior_ref.frame_hooks();
        Self(Rc::new(ComponentInner {
            id,
            name,
            type_id,
            frame_hooks,
            state: Cell::new(ComponentState::Attach),
            entity,
            behavior: RefCell::new(Some(behavior)),
            hooks: RefCell::new(LifecycleHooks::default()),
            destroy_self: Event::with_config(true, ErrorSink::log_only(), EventRecursion::Discard),
            busy: Cell::new(0),
            remove_pending: Cell::new(false),
        }))
    }

    /// Index of the component inside its entity.
    pub fn id(&self) -> ComponentId {
        self.0.id
    }

    /// Name given at attachment. May be empty.
    pub fn name(&self) -> &str {
        &self.0.name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ComponentState {
        self.0.state.get()
    }

    /// The owning entity, unless it has been dropped.
    pub fn entity(&self) -> Option<Entity> {
        self.0.entity.upgrade().map(Entity::from_inner)
    }

    /// Returns `true` if the behavior is a `T`.
    pub fn is<T: ComponentBehavior>(&self) -> bool {
        self.0.type_id == TypeId::of::<T>()
    }

    /// Frame events the behavior declared when it was attached.
    pub fn frame_hooks(&self) -> FrameHooks {
        self.0.frame_hooks
    }

    /// Runs `f` with exclusive access to the behavior.
    ///
    /// ## Returns
    /// [`Error::ComponentNotFound`] if the behavior is not a `T` or was
    /// disposed, [`Error::InvalidState`] if it is already borrowed, which is the
    /// case from inside its own callbacks.
    pub fn with_behavior<T: ComponentBehavior, R>(&self, f: impl FnOnce(&mut T) -> R) -> Result<R> {
        let mut slot = self
            .0
            .behavior
            .try_borrow_mut()
            .map_err(|_| Error::invalid_state(format!("component '{}' is in use", self.name())))?;
        let behavior = slot.as_mut().ok_or(Error::ComponentNotFound)?;
        let behavior: &mut dyn ComponentBehavior = &mut **behavior;
        let typed = behavior
            .as_any_mut()
            .downcast_mut::<T>()
            .ok_or(Error::ComponentNotFound)?;
        Ok(f(typed))
    }

    /// Requests removal of this component from its entity.
    ///
    /// Inside a runtime the removal goes through the regular shutdown path.
    pub fn destroy_self(&self) {
        if self.0.destroy_self.is_empty() {
            if let Some(entity) = self.entity() {
                if let Err(err) = entity.remove_component(self) {
                    log::debug!("Component '{}' not removed: {err}", self.name());
                }
            }
            return;
        }
        if let Err(err) = self.0.destroy_self.emit(|handler| {
            handler(self);
            true
        }) {
            log::warn!("Destroy-self of component '{}' failed: {err}", self.name());
        }
    }

    /// Returns `true` if both handles refer to the same component.
    pub fn ptr_eq(&self, other: &Component) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn belongs_to(&self, entity: &Rc<EntityInner>) -> bool {
        std::ptr::eq(self.0.entity.as_ptr(), Rc::as_ptr(entity))
    }

    // ─────────────────────────────────────────────────────────────────────
    // Runtime plumbing, driven by the lifecycle manager.
    // ─────────────────────────────────────────────────────────────────────

    /// Moves the component to `state`.
    pub fn set_state(&self, state: ComponentState) {
        debug_assert!(state >= self.state(), "component state moved backwards");
        self.0.state.set(state);
    }

    /// Lifecycle hooks bound while connected.
    pub fn lifecycle_hooks(&self) -> RefMut<'_, LifecycleHooks> {
        self.0.hooks.borrow_mut()
    }

    /// The destroy-self event the runtime subscribes to.
    pub fn destroy_self_event(&self) -> &Event<DestroyComponentHandler> {
        &self.0.destroy_self
    }

    /// Applies the hosting runtime's panic policy to the destroy-self event.
    pub fn configure_events(&self, auto_recover: bool, sink: &ErrorSink) {
        self.0
            .destroy_self
            .init(auto_recover, sink.clone(), EventRecursion::Discard);
    }

    /// The behavior slot. `None` once disposed.
    pub fn behavior_cell(&self) -> &RefCell<Option<Box<dyn ComponentBehavior>>> {
        &self.0.behavior
    }

    /// Marks a callback of this component as running.
    pub fn enter_callback(&self) {
        self.0.busy.set(self.0.busy.get() + 1);
    }

    /// Marks a callback of this component as finished.
    pub fn exit_callback(&self) {
        self.0.busy.set(self.0.busy.get().saturating_sub(1));
    }

    /// Number of callbacks of this component currently on the stack.
    pub fn busy(&self) -> u32 {
        self.0.busy.get()
    }

    pub(crate) fn set_remove_pending(&self, pending: bool) {
        self.0.remove_pending.set(pending);
    }

    /// Consumes a removal that was requested while a callback was running.
    pub fn take_remove_pending(&self) -> bool {
        self.0.remove_pending.replace(false)
    }

    /// Releases the behavior. Called once the component is dead and reclaimed.
    pub fn dispose(&self) {
        let behavior = self.0.behavior.try_borrow_mut().ok().and_then(|mut slot| slot.take());
        drop(behavior);
    }

    /// Returns `true` once the behavior has been released.
    pub fn is_disposed(&self) -> bool {
        self.0.behavior.try_borrow().is_ok_and(|slot| slot.is_none())
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.0.id)
            .field("name", &self.0.name)
            .field("state", &self.state())
            .finish()
    }
}
