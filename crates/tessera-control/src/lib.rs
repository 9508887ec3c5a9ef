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

//! Runtime control for tessera.
//!
//! A [`Runtime`] owns a set of entities on a single consumer thread. Work
//! reaches it as queued tasks, either through its [`RuntimeHandle`] or, for
//! global entities, through a [`Caller`] that routes by entity id. The
//! [`Context`] drives the lifecycle of every hosted entity and, when frames
//! are enabled, runs `Update` then `LateUpdate` once per frame.

#![warn(missing_docs)]

pub mod caller;
pub mod context;
pub mod directory;
pub mod frame;
pub mod gc;
mod lifecycle;
pub mod options;
pub mod plugin;
pub mod ret;
pub mod runtime;

pub use caller::Caller;
pub use context::{
    AddEntityHandler, Context, EntityAddComponentsHandler, EntityMgrEvents, EntityRemoveComponentHandler,
    RemoveEntityHandler,
};
pub use directory::{DirectoryEntry, EntityDirectory};
pub use frame::FrameTarget;
pub use gc::Reclaim;
pub use options::{CustomGc, FrameOptions, RuntimeConfig, RuntimeOptions};
pub use plugin::RuntimePlugin;
pub use ret::AsyncRet;
pub use runtime::{Runtime, RuntimeHandle};
