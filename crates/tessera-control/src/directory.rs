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

//! Process-wide directory of globally addressable entities.

use std::collections::HashMap;
use std::fmt;
use std::sync::RwLock;

use tessera_core::{EntityId, Error, Result, SerialNo};

use crate::runtime::RuntimeHandle;

/// Where a global entity lives.
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Serial number of the registered instantiation.
    pub serial_no: SerialNo,
    /// The runtime hosting it.
    pub runtime: RuntimeHandle,
}

/// Maps entity ids to their hosting runtime, for callers on any thread.
///
/// Runtimes register global-scope entities when they are added and remove
/// them when they are destroyed.
#[derive(Default)]
pub struct EntityDirectory {
    entries: RwLock<HashMap<EntityId, DirectoryEntry>>,
}

impl EntityDirectory {
    /// Creates an empty directory.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity.
    ///
    /// ## Returns
    /// An argument error if the id is nil or already registered.
    pub fn register(&self, id: EntityId, entry: DirectoryEntry) -> Result<()> {
        if id.is_nil() {
            return Err(Error::NilEntityId);
        }
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        if entries.contains_key(&id) {
            return Err(Error::invalid_argument(format!(
                "entity {id} is already registered"
            )));
        }
        entries.insert(id, entry);
        Ok(())
    }

    /// Removes the entity if the registered instantiation is `serial_no`.
    pub fn unregister(&self, id: EntityId, serial_no: SerialNo) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.get(&id) {
            Some(entry) if entry.serial_no == serial_no => {
                entries.remove(&id);
                true
            }
            _ => false,
        }
    }

    /// Looks an entity up.
    pub fn get(&self, id: EntityId) -> Option<DirectoryEntry> {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&id)
            .cloned()
    }

    /// Returns `true` if the entity is registered.
    pub fn contains(&self, id: EntityId) -> bool {
        self.entries
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(&id)
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// Returns `true` if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Debug for EntityDirectory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityDirectory")
            .field("entities", &self.len())
            .finish()
    }
}
