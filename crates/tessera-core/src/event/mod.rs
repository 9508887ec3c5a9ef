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

//! Single-writer publish/subscribe primitive.
//!
//! An [`Event`] fans out to ordered [`Hook`]s. Delivery order is ascending
//! priority, ties broken by bind order. The [`EventRecursion`] policy decides
//! what a nested emission of the same event does. Events and hooks are owned
//! by one runtime thread and are deliberately `!Send`.

mod emitter;
mod hook;
mod recursion;
mod table;

pub use emitter::{Event, EventCtrl};
pub use hook::Hook;
pub use recursion::EventRecursion;
pub use table::{EventTable, EventTableBuilder, EventTableId};
