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

//! Entity identifiers and instantiation serial numbers.

use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Persistent identifier of an entity.
///
/// The identifier may be reused when an entity is destroyed and created again,
/// so calls that must not reach the new incarnation also pass a [`SerialNo`].
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct EntityId(Uuid);

impl EntityId {
    /// The nil identifier. Never addresses an entity.
    pub const NIL: Self = Self(Uuid::nil());

    /// Generates a new random identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Derives a stable identifier from a name, so the same name always maps to
    /// the same id.
    pub fn from_name(name: &str) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, name.as_bytes()))
    }

    /// Wraps an existing UUID.
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the underlying UUID.
    pub const fn uuid(&self) -> Uuid {
        self.0
    }

    /// Returns `true` for [`EntityId::NIL`].
    pub fn is_nil(&self) -> bool {
        self.0.is_nil()
    }
}

impl fmt::Debug for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EntityId({})", self.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Per-instantiation serial number. Valid serial numbers are positive.
pub type SerialNo = i64;

static NEXT_SERIAL_NO: AtomicI64 = AtomicI64::new(1);

/// Allocates a process-wide unique serial number.
pub fn next_serial_no() -> SerialNo {
    NEXT_SERIAL_NO.fetch_add(1, Ordering::Relaxed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_nil_and_generated_ids() {
        assert!(EntityId::NIL.is_nil());
        assert!(EntityId::default().is_nil());
        let id = EntityId::new();
        assert!(!id.is_nil());
        assert_ne!(id, EntityId::new());
    }

    #[test]
    fn test_named_ids_are_stable() {
        assert_eq!(EntityId::from_name("player"), EntityId::from_name("player"));
        assert_ne!(EntityId::from_name("player"), EntityId::from_name("npc"));
    }

    #[test]
    fn test_serial_numbers_are_positive_and_increasing() {
        let a = next_serial_no();
        let b = next_serial_no();
        assert!(a > 0);
        assert!(b > a);
    }
}
