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

use serde::{Deserialize, Serialize};

/// Rule applied when an event is emitted again from inside one of its own
/// subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EventRecursion {
    /// The nested emission walks every subscriber again, independently.
    #[default]
    Allow,
    /// The nested emission fails with [`crate::Error::RecursionNotAllowed`].
    Disallow,
    /// The nested emission returns immediately and visits nobody.
    Discard,
    /// Subscribers already reached in the current round are skipped, by the
    /// nested emission and by the outer one once it resumes.
    Truncate,
    /// The nested emission runs to completion and the outer one stops after it.
    Deepest,
}
