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

use std::fmt;

use crate::error::{Error, ErrorSink, Result};

use super::emitter::{Event, EventCtrl};
use super::recursion::EventRecursion;

/// Hash of the type that declares an [`EventTable`].
///
/// An event id is `hash << 32 | position`, so ids stay stable for as long as
/// the declaring type keeps its qualified name and slot order.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventTableId(u32);

impl EventTableId {
    /// Derives the table id from the qualified name of `Owner`.
    pub fn of<Owner: ?Sized + 'static>() -> Self {
        Self::from_name(std::any::type_name::<Owner>())
    }

    /// Derives the table id from a qualified name.
    pub fn from_name(qualified_name: &str) -> Self {
        let digest = blake3::hash(qualified_name.as_bytes());
        let bytes = digest.as_bytes();
        Self(u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
    }

    /// The 32-bit hash.
    pub const fn hash(&self) -> u32 {
        self.0
    }

    /// Builds the id of the event at `position`.
    pub const fn event_id(&self, position: u32) -> u64 {
        ((self.0 as u64) << 32) | position as u64
    }

    /// Splits an event id into its table hash and position.
    pub const fn split(event_id: u64) -> (u32, u32) {
        ((event_id >> 32) as u32, event_id as u32)
    }
}

impl fmt::Debug for EventTableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EventTableId({:#010x})", self.0)
    }
}

struct TableSlot {
    event: Box<dyn EventCtrl>,
    /// Overrides the table-wide policy passed to [`EventTable::init`].
    recursion: Option<EventRecursion>,
}

/// Declares the slots of an [`EventTable`] in order.
pub struct EventTableBuilder {
    id: EventTableId,
    name: String,
    slots: Vec<TableSlot>,
}

impl EventTableBuilder {
    /// Appends an event carrying subscribers of type `T`.
    pub fn event<T: Clone + 'static>(mut self) -> Self {
        self.slots.push(TableSlot {
            event: Box::new(Event::<T>::new()),
            recursion: None,
        });
        self
    }

    /// Appends an event that keeps its own recursion policy regardless of the
    /// table default.
    pub fn event_with_recursion<T: Clone + 'static>(mut self, recursion: EventRecursion) -> Self {
        self.slots.push(TableSlot {
            event: Box::new(Event::<T>::new()),
            recursion: Some(recursion),
        });
        self
    }

    /// Finishes the declaration. The events stay closed until
    /// [`EventTable::init`].
    pub fn build(self) -> EventTable {
        EventTable {
            id: self.id,
            name: self.name,
            slots: self.slots,
        }
    }
}

/// A fixed-length, ordered collection of events, reachable by declared
/// index or by 64-bit id.
pub struct EventTable {
    id: EventTableId,
    name: String,
    slots: Vec<TableSlot>,
}

impl EventTable {
    /// Starts declaring a table owned by `Owner`.
    pub fn builder<Owner: ?Sized + 'static>() -> EventTableBuilder {
        let name = std::any::type_name::<Owner>();
        EventTableBuilder {
            id: EventTableId::from_name(name),
            name: name.to_string(),
            slots: Vec::new(),
        }
    }

    /// The table id.
    pub fn id(&self) -> EventTableId {
        self.id
    }

    /// Qualified name of the declaring type.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of declared events.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Returns `true` if no event is declared.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The id of the event at `index`.
    pub fn event_id(&self, index: usize) -> Option<u64> {
        (index < self.slots.len()).then(|| self.id.event_id(index as u32))
    }

    /// Initializes every event. Slots declared with their own policy keep it.
    pub fn init(&self, auto_recover: bool, sink: &ErrorSink, recursion: EventRecursion) {
        for slot in &self.slots {
            slot.event
                .init(auto_recover, sink.clone(), slot.recursion.unwrap_or(recursion));
        }
    }

    /// Opens every event.
    pub fn open(&self) {
        self.slots.iter().for_each(|slot| slot.event.open());
    }

    /// Closes every event.
    pub fn close(&self) {
        self.slots.iter().for_each(|slot| slot.event.close());
    }

    /// Unbinds every hook of every event.
    pub fn clean(&self) {
        self.slots.iter().for_each(|slot| slot.event.clean());
    }

    /// The typed event at `index`, or `None` if out of range or of another type.
    pub fn get<T: Clone + 'static>(&self, index: usize) -> Option<&Event<T>> {
        self.slots.get(index)?.event.downcast_ref::<T>()
    }

    /// Resolves an event by id.
    ///
    /// ## Returns
    /// [`Error::EventNotFound`] if the table hash differs or the position is
    /// out of range.
    pub fn event(&self, id: u64) -> Result<&dyn EventCtrl> {
        let (hash, position) = EventTableId::split(id);
        if hash != self.id.hash() {
            return Err(Error::EventNotFound(id));
        }
        self.slots
            .get(position as usize)
            .map(|slot| slot.event.as_ref())
            .ok_or(Error::EventNotFound(id))
    }

    /// Resolves an event by id and downcasts it.
    pub fn event_as<T: Clone + 'static>(&self, id: u64) -> Result<&Event<T>> {
        self.event(id)?
            .downcast_ref::<T>()
            .ok_or(Error::EventNotFound(id))
    }
}

impl fmt::Debug for EventTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTable")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("len", &self.slots.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Movement;
    struct Inventory;

    fn movement_table() -> EventTable {
        EventTable::builder::<Movement>()
            .event::<u32>()
            .event_with_recursion::<String>(EventRecursion::Discard)
            .event::<u32>()
            .build()
    }

    #[test]
    fn test_ids_combine_owner_hash_and_position() {
        let table = movement_table();
        let id = table.event_id(2).unwrap();
        assert_eq!(EventTableId::split(id), (EventTableId::of::<Movement>().hash(), 2));
        assert_eq!(table.event_id(3), None);
        assert_ne!(EventTableId::of::<Movement>(), EventTableId::of::<Inventory>());
    }

    #[test]
    fn test_event_lookup_rejects_foreign_hash_and_bad_position() {
        let table = movement_table();
        let foreign = EventTableId::of::<Inventory>().event_id(0);
        assert_eq!(table.event(foreign).map(|_| ()).unwrap_err(), Error::EventNotFound(foreign));

        let out_of_range = table.id().event_id(3);
        assert_eq!(table.event(out_of_range).map(|_| ()).unwrap_err(), Error::EventNotFound(out_of_range));

        let id = table.event_id(1).unwrap();
        assert!(table.event_as::<String>(id).is_ok());
        assert!(table.event_as::<u32>(id).is_err());
    }

    #[test]
    fn test_init_applies_to_every_slot_with_overrides() {
        // --- 1. SETUP ---
        let table = movement_table();
        assert!(!table.event(table.event_id(0).unwrap()).unwrap().is_open());

        // --- 2. ACTION ---
        table.init(false, &ErrorSink::log_only(), EventRecursion::Truncate);

        // --- 3. ASSERTIONS ---
        let policies: Vec<EventRecursion> = (0..table.len())
            .map(|i| table.event(table.event_id(i).unwrap()).unwrap().recursion())
            .collect();
        assert_eq!(
            policies,
            vec![
                EventRecursion::Truncate,
                EventRecursion::Discard,
                EventRecursion::Truncate
            ]
        );
        assert!(table.get::<u32>(0).unwrap().is_open());
    }

    #[test]
    fn test_open_close_clean_apply_uniformly() {
        let table = movement_table();
        table.init(false, &ErrorSink::log_only(), EventRecursion::Allow);
        let hook = table.get::<u32>(0).unwrap().bind(1, 0).unwrap();
        table.get::<String>(1).unwrap().bind("a".into(), 0).unwrap();

        table.close();
        assert!((0..3).all(|i| !table.event(table.event_id(i).unwrap()).unwrap().is_open()));
        table.open();
        assert!((0..3).all(|i| table.event(table.event_id(i).unwrap()).unwrap().is_open()));

        table.clean();
        assert!(!hook.is_bound());
        assert!(table.get::<String>(1).unwrap().is_empty());
    }
}
