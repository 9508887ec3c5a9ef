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

//! The public-facing SDK of tessera.
//!
//! A [`Service`] owns a set of runtimes, the directory of global entities and
//! the prototype library. Entities live on exactly one runtime thread; code
//! reaches them through runtime-level calls or, by entity id, through the
//! [`Caller`].

pub mod creator;
pub mod service;

pub use creator::EntityCreator;
pub use service::{Service, ServiceConfig, ServiceContext, ServiceOptions, ServicePlugin};

pub use tessera_control::{
    AsyncRet, Caller, Context, EntityDirectory, EntityMgrEvents, FrameOptions, Reclaim, Runtime, RuntimeConfig,
    RuntimeHandle, RuntimeOptions, RuntimePlugin,
};
pub use tessera_core::{EntityId, Error, ErrorKind, ErrorSink, EventRecursion, Hook, Result, SerialNo};
pub use tessera_data::{
    Blueprint, Component, ComponentBehavior, ComponentCx, ComponentState, Composite, ConstructOptions, Entity,
    EntityBehavior, EntityCx, EntityLib, EntityOptions, EntityState, FrameHooks, FrameInfo, Scope,
};
pub use tessera_telemetry::{init_logging, init_logging_with, MetricsSnapshot};

/// Everything needed to write behaviors and drive a service.
pub mod prelude {
    pub use crate::{
        Blueprint, Caller, ComponentBehavior, ComponentCx, Context, Entity, EntityBehavior, EntityCreator,
        EntityCx, EntityId, EntityOptions, Error, FrameHooks, Result, RuntimeOptions, Scope, Service,
        ServiceContext, ServiceOptions,
    };
}
