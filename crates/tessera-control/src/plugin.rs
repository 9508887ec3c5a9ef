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

//! Plugins hosted by a runtime.

use tessera_core::AsAny;

use crate::context::Context;

/// A plugin installed in a runtime.
///
/// `init` runs on the runtime thread before the first task, in install order;
/// `shut` runs after the final drain, in reverse install order. Both are
/// optional and guarded like lifecycle callbacks.
pub trait RuntimePlugin: AsAny + Send + Sync {
    /// The runtime started.
    fn init(&self, _cx: &Context) {}

    /// The runtime is stopping. Entities are already destroyed.
    fn shut(&self, _cx: &Context) {}
}
