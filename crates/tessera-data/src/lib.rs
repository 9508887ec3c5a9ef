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

//! # Tessera Data
//!
//! The entity model: entities owning ordered components, their lifecycle
//! states, the optional lifecycle capabilities behaviors implement, cached
//! composite views, and the prototype library entities are constructed from.
//!
//! Everything here is single-threaded and owned by the runtime thread that
//! hosts the entity.

#![warn(missing_docs)]

pub mod behavior;
pub mod component;
pub mod composite;
pub mod entity;
pub mod prototype;
pub mod state;

pub use behavior::{
    ComponentBehavior, ComponentCx, EntityBehavior, EntityCx, FrameHooks, FrameInfo, RuntimeAccess,
};
pub use component::{Component, ComponentId};
pub use composite::Composite;
pub use entity::{ComponentMgrEvents, Entity, EntityOptions, LifecycleHooks};
pub use prototype::{Blueprint, ConstructOptions, EntityLib};
pub use state::{ComponentState, EntityState, Scope};
