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

//! # Tessera Core
//!
//! Foundational crate containing the error taxonomy, identifiers, the panic
//! guard, the hook/event publish-subscribe primitive and event tables that the
//! runtime and lifecycle crates are built on.

#![warn(missing_docs)]

pub mod any;
pub mod error;
pub mod event;
pub mod guard;
pub mod id;
pub mod plugin;
pub mod utils;

pub use any::AsAny;
pub use error::{Error, ErrorKind, ErrorSink, Result};
pub use event::{Event, EventRecursion, EventTable, EventTableId, Hook};
pub use id::{EntityId, SerialNo};
pub use plugin::PluginBundle;
