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

//! Optional lifecycle capabilities and the contexts they are invoked with.
//!
//! Every callback has an empty default, so a behavior only implements the
//! steps it cares about. Frame callbacks are opt-in through
//! [`FrameHooks`]: the set is read once when the behavior is attached and the
//! runtime only subscribes the hooks that were declared.

use std::time::Duration;

use tessera_core::{tessera_bitflags, AsAny, Error};

use crate::component::Component;
use crate::entity::Entity;

tessera_bitflags! {
    /// Frame events a behavior wants to receive.
    pub struct FrameHooks: u8 {
        /// Receive `update` once per frame.
        const UPDATE = 1 << 0;
        /// Receive `late_update` once per frame, after every `update`.
        const LATE_UPDATE = 1 << 1;
    }
}

/// Snapshot of the frame loop of the runtime a callback runs in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    /// Target frames per second.
    pub target_fps: f32,
    /// Frame budget, `0` for unbounded.
    pub total_frames: u64,
    /// Frames completed so far.
    pub cur_frames: u64,
    /// Time between the start of the previous frame and the current one.
    pub delta: Duration,
    /// Time since the frame loop started.
    pub elapsed: Duration,
}

/// The view of the hosting runtime handed to callbacks.
///
/// Implemented by the runtime context; callbacks that need more than this can
/// downcast with [`EntityCx::runtime_as`].
pub trait RuntimeAccess: AsAny {
    /// Name of the runtime.
    fn runtime_name(&self) -> &str;

    /// Frame information, `None` if the runtime is not frame-paced.
    fn frame(&self) -> Option<FrameInfo>;

    /// Forwards an error to the runtime's error sink.
    fn report_error(&self, error: Error);
}

fn downcast_runtime<'a, C: 'static>(runtime: &'a dyn RuntimeAccess) -> Option<&'a C> {
    runtime.as_any().downcast_ref::<C>()
}

/// Context of an entity-level callback.
pub struct EntityCx<'a> {
    runtime: &'a dyn RuntimeAccess,
    entity: &'a Entity,
}

impl<'a> EntityCx<'a> {
    /// Creates a context.
    pub fn new(runtime: &'a dyn RuntimeAccess, entity: &'a Entity) -> Self {
        Self { runtime, entity }
    }

    /// The entity the callback belongs to.
    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    /// The hosting runtime.
    pub fn runtime(&self) -> &'a dyn RuntimeAccess {
        self.runtime
    }

    /// The hosting runtime as its concrete type.
    pub fn runtime_as<C: 'static>(&self) -> Option<&'a C> {
        downcast_runtime(self.runtime)
    }

    /// Frame information of the hosting runtime.
    pub fn frame(&self) -> Option<FrameInfo> {
        self.runtime.frame()
    }

    /// Requests destruction of the entity.
    pub fn destroy_entity(&self) {
        self.entity.destroy_self();
    }
}

/// Context of a component-level callback.
pub struct ComponentCx<'a> {
    runtime: &'a dyn RuntimeAccess,
    entity: &'a Entity,
    component: &'a Component,
}

impl<'a> ComponentCx<'a> {
    /// Creates a context.
    pub fn new(runtime: &'a dyn RuntimeAccess, entity: &'a Entity, component: &'a Component) -> Self {
        Self {
            runtime,
            entity,
            component,
        }
    }

    /// The owning entity.
    pub fn entity(&self) -> &'a Entity {
        self.entity
    }

    /// The component the callback belongs to.
    pub fn component(&self) -> &'a Component {
        self.component
    }

    /// The hosting runtime.
    pub fn runtime(&self) -> &'a dyn RuntimeAccess {
        self.runtime
    }

    /// The hosting runtime as its concrete type.
    pub fn runtime_as<C: 'static>(&self) -> Option<&'a C> {
        downcast_runtime(self.runtime)
    }

    /// Frame information of the hosting runtime.
    pub fn frame(&self) -> Option<FrameInfo> {
        self.runtime.frame()
    }

    /// Looks up a sibling component by behavior type.
    pub fn sibling<T: ComponentBehavior>(&self) -> Option<Component> {
        self.entity.find_component::<T>()
    }

    /// Requests destruction of the owning entity.
    pub fn destroy_entity(&self) {
        self.entity.destroy_self();
    }

    /// Requests removal of this component from its entity.
    pub fn destroy_component(&self) {
        self.component.destroy_self();
    }
}

/// Optional entity-level lifecycle capabilities.
///
/// Order: `init`, then every component's `awake` and `start`, then `inited`,
/// then `update`/`late_update` every frame while living, then `shut` after
/// every component has shut, then `destroy`.
pub trait EntityBehavior: AsAny {
    /// Frame events to subscribe to.
    fn frame_hooks(&self) -> FrameHooks {
        FrameHooks::EMPTY
    }

    /// The entity was connected to its runtime.
    fn init(&mut self, _cx: &EntityCx<'_>) {}

    /// Every component has started.
    fn inited(&mut self, _cx: &EntityCx<'_>) {}

    /// Called once per frame.
    fn update(&mut self, _cx: &EntityCx<'_>) {}

    /// Called once per frame after every `update`.
    fn late_update(&mut self, _cx: &EntityCx<'_>) {}

    /// The entity is shutting down; its components already have.
    fn shut(&mut self, _cx: &EntityCx<'_>) {}

    /// The entity reached `Death`.
    fn destroy(&mut self, _cx: &EntityCx<'_>) {}
}

/// Optional component-level lifecycle capabilities.
pub trait ComponentBehavior: AsAny {
    /// Frame events to subscribe to.
    fn frame_hooks(&self) -> FrameHooks {
        FrameHooks::EMPTY
    }

    /// The component was connected to the runtime.
    fn awake(&mut self, _cx: &ComponentCx<'_>) {}

    /// Every component attached in the same batch is awake.
    fn start(&mut self, _cx: &ComponentCx<'_>) {}

    /// Called once per frame.
    fn update(&mut self, _cx: &ComponentCx<'_>) {}

    /// Called once per frame after every `update`.
    fn late_update(&mut self, _cx: &ComponentCx<'_>) {}

    /// The component is shutting down.
    fn shut(&mut self, _cx: &ComponentCx<'_>) {}
}
