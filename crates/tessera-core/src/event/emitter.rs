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

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::any::AsAny;
use crate::error::{Error, ErrorSink, Result};
use crate::guard::catch_panic;

use super::hook::{Detach, Hook, HookLink};
use super::recursion::EventRecursion;

struct Entry<T> {
    priority: i32,
    seq: u64,
    subscriber: T,
    link: Rc<HookLink>,
    /// Emission round that last reached this entry.
    visited: Cell<u64>,
}

impl<T> Entry<T> {
    fn key(&self) -> (i32, u64) {
        (self.priority, self.seq)
    }
}

struct Slot<T> {
    /// Sorted by `(priority, seq)`.
    entries: Vec<Entry<T>>,
    next_seq: u64,
    opened: bool,
    auto_recover: bool,
    sink: ErrorSink,
    recursion: EventRecursion,
    depth: u32,
    round: u64,
    deepest: u32,
}

impl<T> Slot<T> {
    fn take(&mut self, priority: i32, seq: u64) -> Option<Entry<T>> {
        let at = self
            .entries
            .binary_search_by(|e| e.key().cmp(&(priority, seq)))
            .ok()?;
        Some(self.entries.remove(at))
    }
}

impl<T: 'static> Detach for RefCell<Slot<T>> {
    fn detach(&self, priority: i32, seq: u64) {
        // The removed subscriber is dropped after the borrow is released.
        let removed = match self.try_borrow_mut() {
            Ok(mut slot) => slot.take(priority, seq),
            Err(_) => {
                log::error!("Event slot is busy, hook {seq} could not be detached");
                None
            }
        };
        drop(removed);
    }
}

/// Restores the emission depth when an emission ends, including by unwinding.
struct DepthGuard<'a, T>(&'a RefCell<Slot<T>>);

impl<T> Drop for DepthGuard<'_, T> {
    fn drop(&mut self) {
        if let Ok(mut slot) = self.0.try_borrow_mut() {
            slot.depth = slot.depth.saturating_sub(1);
            if slot.depth == 0 {
                slot.deepest = 0;
            }
        }
    }
}

/// A publish point fanning out to ordered subscribers of type `T`.
///
/// `T` is cloned out of the event before each visit, so subscribers are
/// usually cheap handles such as `Rc<dyn Fn(..)>`. Cloning an `Event` yields
/// another handle to the same slot.
///
/// A freshly created event is closed: it must be [`init`](Event::init)ialized
/// (or built with [`Event::with_config`]) before it accepts bindings.
pub struct Event<T> {
    slot: Rc<RefCell<Slot<T>>>,
}

impl<T> Clone for Event<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Rc::clone(&self.slot),
        }
    }
}

impl<T: Clone + 'static> Default for Event<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone + 'static> Event<T> {
    /// Creates a closed, uninitialized event.
    pub fn new() -> Self {
        Self {
            slot: Rc::new(RefCell::new(Slot {
                entries: Vec::new(),
                next_seq: 0,
                opened: false,
                auto_recover: false,
                sink: ErrorSink::log_only(),
                recursion: EventRecursion::default(),
                depth: 0,
                round: 0,
                deepest: 0,
            })),
        }
    }

    /// Creates an event that is initialized and open.
    pub fn with_config(auto_recover: bool, sink: ErrorSink, recursion: EventRecursion) -> Self {
        let event = Self::new();
        event.init(auto_recover, sink, recursion);
        event
    }

    /// Configures panic handling and the recursion policy, then opens the event.
    ///
    /// ## Arguments
    /// * `auto_recover` - absorb subscriber panics into `sink` instead of unwinding.
    /// * `sink` - destination of absorbed panics.
    /// * `recursion` - policy applied to nested emissions.
    pub fn init(&self, auto_recover: bool, sink: ErrorSink, recursion: EventRecursion) {
        let mut slot = self.slot.borrow_mut();
        slot.auto_recover = auto_recover;
        slot.sink = sink;
        slot.recursion = recursion;
        slot.opened = true;
    }

    /// Opens the event for binding and emission.
    pub fn open(&self) {
        self.slot.borrow_mut().opened = true;
    }

    /// Closes the event. Bound hooks are kept and fire again once reopened.
    pub fn close(&self) {
        self.slot.borrow_mut().opened = false;
    }

    /// Unbinds every hook.
    pub fn clean(&self) {
        let removed = std::mem::take(&mut self.slot.borrow_mut().entries);
        for entry in &removed {
            entry.link.bound.set(false);
        }
    }

    /// Returns `true` if the event is open.
    pub fn is_open(&self) -> bool {
        self.slot.borrow().opened
    }

    /// The recursion policy in effect.
    pub fn recursion(&self) -> EventRecursion {
        self.slot.borrow().recursion
    }

    /// Number of bound subscribers.
    pub fn len(&self) -> usize {
        self.slot.borrow().entries.len()
    }

    /// Returns `true` if nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Binds a subscriber.
    ///
    /// Lower priorities are delivered first; equal priorities are delivered in
    /// bind order. A subscriber bound while an emission is in progress is not
    /// reached by that emission.
    ///
    /// ## Returns
    /// The [`Hook`] that unbinds the subscriber, or [`Error::EventClosed`].
    pub fn bind(&self, subscriber: T, priority: i32) -> Result<Hook> {
        let mut slot = self.slot.borrow_mut();
        if !slot.opened {
            return Err(Error::EventClosed);
        }
        let seq = slot.next_seq;
        slot.next_seq += 1;

        let weak = Rc::downgrade(&self.slot);
        let detach: Weak<dyn Detach> = weak;
        let link = Rc::new(HookLink {
            seq,
            priority,
            bound: Cell::new(true),
            slot: detach,
        });
        let at = slot.entries.partition_point(|e| e.priority <= priority);
        slot.entries.insert(
            at,
            Entry {
                priority,
                seq,
                subscriber,
                link: Rc::clone(&link),
                visited: Cell::new(0),
            },
        );
        Ok(Hook::from_link(link))
    }

    /// Delivers to every bound subscriber in order.
    ///
    /// `visit` returns `false` to interrupt the emission. The emission also
    /// stops if the event is closed by a subscriber. Unbinding a subscriber
    /// during the emission never causes any subscriber to be visited twice.
    ///
    /// ## Returns
    /// [`Error::RecursionNotAllowed`] for a nested emission under
    /// [`EventRecursion::Disallow`], `Ok(())` otherwise.
    pub fn emit(&self, mut visit: impl FnMut(&T) -> bool) -> Result<()> {
        let slot = Rc::clone(&self.slot);
        let (depth, round, horizon, policy, auto_recover, sink) = {
            let mut s = slot.borrow_mut();
            if !s.opened {
                return Ok(());
            }
            if s.depth > 0 {
                match s.recursion {
                    EventRecursion::Disallow => return Err(Error::RecursionNotAllowed),
                    EventRecursion::Discard => return Ok(()),
                    _ => {}
                }
            } else {
                s.round += 1;
            }
            s.depth += 1;
            s.deepest = s.depth;
            (
                s.depth,
                s.round,
                s.next_seq,
                s.recursion,
                s.auto_recover,
                s.sink.clone(),
            )
        };
        let _depth = DepthGuard(&slot);
        let truncate = policy == EventRecursion::Truncate;

        let mut cursor: Option<(i32, u64)> = None;
        loop {
            let next = {
                let s = slot.borrow();
                if !s.opened || (policy == EventRecursion::Deepest && s.deepest > depth) {
                    break;
                }
                let start = cursor.map_or(0, |key| s.entries.partition_point(|e| e.key() <= key));
                s.entries[start..]
                    .iter()
                    .find(|e| e.seq < horizon && !(truncate && e.visited.get() == round))
                    .map(|e| {
                        e.visited.set(round);
                        (e.key(), e.subscriber.clone())
                    })
            };
            let Some((key, subscriber)) = next else {
                break;
            };
            cursor = Some(key);

            let proceed = if auto_recover {
                match catch_panic(|| visit(&subscriber)) {
                    Ok(proceed) => proceed,
                    Err(err) => {
                        sink.report(err);
                        true
                    }
                }
            } else {
                visit(&subscriber)
            };
            if !proceed {
                break;
            }
        }
        Ok(())
    }
}

impl<T> fmt::Debug for Event<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot.try_borrow() {
            Ok(slot) => f
                .debug_struct("Event")
                .field("opened", &slot.opened)
                .field("recursion", &slot.recursion)
                .field("subscribers", &slot.entries.len())
                .finish(),
            Err(_) => f.write_str("Event(<emitting>)"),
        }
    }
}

/// Type-erased control surface of an [`Event`], used by [`super::EventTable`].
pub trait EventCtrl: AsAny {
    /// See [`Event::init`].
    fn init(&self, auto_recover: bool, sink: ErrorSink, recursion: EventRecursion);
    /// See [`Event::open`].
    fn open(&self);
    /// See [`Event::close`].
    fn close(&self);
    /// See [`Event::clean`].
    fn clean(&self);
    /// See [`Event::is_open`].
    fn is_open(&self) -> bool;
    /// See [`Event::recursion`].
    fn recursion(&self) -> EventRecursion;
    /// See [`Event::len`].
    fn subscriber_count(&self) -> usize;
}

impl<T: Clone + 'static> EventCtrl for Event<T> {
    fn init(&self, auto_recover: bool, sink: ErrorSink, recursion: EventRecursion) {
        Event::init(self, auto_recover, sink, recursion);
    }

    fn open(&self) {
        Event::open(self);
    }

    fn close(&self) {
        Event::close(self);
    }

    fn clean(&self) {
        Event::clean(self);
    }

    fn is_open(&self) -> bool {
        Event::is_open(self)
    }

    fn recursion(&self) -> EventRecursion {
        Event::recursion(self)
    }

    fn subscriber_count(&self) -> usize {
        self.len()
    }
}

impl dyn EventCtrl {
    /// Downcasts to the concrete event type.
    pub fn downcast_ref<T: Clone + 'static>(&self) -> Option<&Event<T>> {
        let any: &dyn Any = self.as_any();
        any.downcast_ref::<Event<T>>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_event(recursion: EventRecursion) -> Event<u32> {
        Event::with_config(false, ErrorSink::log_only(), recursion)
    }

    fn collect(event: &Event<u32>) -> Vec<u32> {
        let mut seen = Vec::new();
        event
            .emit(|&id| {
                seen.push(id);
                true
            })
            .unwrap();
        seen
    }

    #[test]
    fn test_delivery_follows_priority_then_bind_order() {
        let event = open_event(EventRecursion::Allow);
        event.bind(1, 5).unwrap();
        event.bind(2, -1).unwrap();
        event.bind(3, 5).unwrap();
        event.bind(4, 0).unwrap();
        assert_eq!(collect(&event), vec![2, 4, 1, 3]);
    }

    #[test]
    fn test_unbind_is_idempotent() {
        let event = open_event(EventRecursion::Allow);
        let hook = event.bind(1, 0).unwrap();
        event.bind(2, 0).unwrap();

        hook.unbind();
        assert!(!hook.is_bound());
        assert_eq!(event.len(), 1);

        hook.unbind();
        assert_eq!(event.len(), 1);
        assert_eq!(collect(&event), vec![2]);
        Hook::default().unbind();
    }

    #[test]
    fn test_unbind_during_emission_never_repeats_a_visit() {
        // --- 1. SETUP ---
        let event = open_event(EventRecursion::Allow);
        let hooks: Vec<Hook> = (0..4).map(|i| event.bind(i, 0).unwrap()).collect();

        // --- 2. ACTION ---
        // Subscriber 1 removes itself and the already visited 0; subscriber 2
        // removes the not yet visited 3.
        let mut seen = Vec::new();
        event
            .emit(|&id| {
                seen.push(id);
                match id {
                    1 => {
                        hooks[1].unbind();
                        hooks[0].unbind();
                    }
                    2 => hooks[3].unbind(),
                    _ => {}
                }
                true
            })
            .unwrap();

        // --- 3. ASSERTIONS ---
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(collect(&event), vec![2]);
    }

    #[test]
    fn test_subscriber_bound_during_emission_waits_for_next_one() {
        let event = open_event(EventRecursion::Allow);
        event.bind(1, 0).unwrap();
        let mut seen = Vec::new();
        event
            .emit(|&id| {
                seen.push(id);
                event.bind(9, -10).unwrap();
                true
            })
            .unwrap();
        assert_eq!(seen, vec![1]);
        assert_eq!(collect(&event), vec![9, 1]);
    }

    #[test]
    fn test_false_interrupts_emission() {
        let event = open_event(EventRecursion::Allow);
        for i in 0..3 {
            event.bind(i, 0).unwrap();
        }
        let mut seen = Vec::new();
        event
            .emit(|&id| {
                seen.push(id);
                id != 1
            })
            .unwrap();
        assert_eq!(seen, vec![0, 1]);
    }

    #[test]
    fn test_close_gates_binding_and_emission_but_keeps_hooks() {
        let event = open_event(EventRecursion::Allow);
        for i in 0..3 {
            event.bind(i, 0).unwrap();
        }

        let mut seen = Vec::new();
        event
            .emit(|&id| {
                seen.push(id);
                if id == 0 {
                    event.close();
                }
                true
            })
            .unwrap();
        assert_eq!(seen, vec![0]);

        assert_eq!(event.bind(7, 0).unwrap_err(), Error::EventClosed);
        assert!(collect(&event).is_empty());

        event.open();
        assert_eq!(collect(&event), vec![0, 1, 2]);
    }

    #[test]
    fn test_new_event_is_closed() {
        let event: Event<u32> = Event::new();
        assert!(!event.is_open());
        assert!(event.bind(1, 0).is_err());
    }

    #[test]
    fn test_clean_unbinds_everything() {
        let event = open_event(EventRecursion::Allow);
        let a = event.bind(1, 0).unwrap();
        let b = event.bind(2, 0).unwrap();
        event.clean();
        assert!(event.is_empty());
        assert!(!a.is_bound() && !b.is_bound());
    }

    #[test]
    fn test_hook_outliving_its_event_is_unbound() {
        // --- 1. SETUP ---
        let event = open_event(EventRecursion::Allow);
        let hook = event.bind(1, 0).unwrap();
        assert!(hook.is_bound());

        // --- 2. ACTION ---
        drop(event);

        // --- 3. ASSERTIONS ---
        assert!(!hook.is_bound());
        hook.unbind();
    }

    #[test]
    fn test_init_again_keeps_hooks_and_swaps_recover_policy() {
        // --- 1. SETUP ---
        let event: Event<u32> = Event::with_config(true, ErrorSink::log_only(), EventRecursion::Allow);
        let hook = event.bind(1, 0).unwrap();
        let (sink, rx) = ErrorSink::channel(4);

        // --- 2. ACTION ---
        event.init(false, sink, EventRecursion::Allow);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _ = event.emit(|_| panic!("late"));
        }));

        // --- 3. ASSERTIONS ---
        assert!(hook.is_bound());
        assert!(outcome.is_err());
        assert!(rx.try_recv().is_err());
    }

    /// Emits `event`; subscriber 0 triggers one nested emission whose visits
    /// are recorded as `id + 10`.
    fn nested_run(event: &Event<u32>) -> (Vec<u32>, Option<Result<()>>) {
        let seen = RefCell::new(Vec::new());
        let nested = RefCell::new(None);
        event
            .emit(|&id| {
                seen.borrow_mut().push(id);
                if id == 0 && nested.borrow().is_none() {
                    let result = event.emit(|&inner| {
                        seen.borrow_mut().push(inner + 10);
                        true
                    });
                    *nested.borrow_mut() = Some(result);
                }
                true
            })
            .unwrap();
        (seen.into_inner(), nested.into_inner())
    }

    fn three(recursion: EventRecursion) -> Event<u32> {
        let event = open_event(recursion);
        for i in 0..3 {
            event.bind(i, 0).unwrap();
        }
        event
    }

    #[test]
    fn test_recursion_allow_walks_everyone_again() {
        let (seen, nested) = nested_run(&three(EventRecursion::Allow));
        assert_eq!(seen, vec![0, 10, 11, 12, 1, 2]);
        assert_eq!(nested, Some(Ok(())));
    }

    #[test]
    fn test_recursion_disallow_signals_error() {
        let (seen, nested) = nested_run(&three(EventRecursion::Disallow));
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(nested, Some(Err(Error::RecursionNotAllowed)));
    }

    #[test]
    fn test_recursion_discard_visits_nobody() {
        let (seen, nested) = nested_run(&three(EventRecursion::Discard));
        assert_eq!(seen, vec![0, 1, 2]);
        assert_eq!(nested, Some(Ok(())));
    }

    #[test]
    fn test_recursion_truncate_reaches_each_subscriber_once() {
        let (seen, _) = nested_run(&three(EventRecursion::Truncate));
        assert_eq!(seen, vec![0, 11, 12]);
    }

    #[test]
    fn test_recursion_deepest_abandons_outer_emission() {
        let (seen, _) = nested_run(&three(EventRecursion::Deepest));
        assert_eq!(seen, vec![0, 10, 11, 12]);

        // The next top-level emission is unaffected.
        let event = three(EventRecursion::Deepest);
        let _ = nested_run(&event);
        assert_eq!(collect(&event), vec![0, 1, 2]);
    }

    #[test]
    fn test_auto_recover_absorbs_panics_and_continues() {
        let (sink, rx) = ErrorSink::channel(4);
        let event: Event<u32> = Event::with_config(true, sink, EventRecursion::Allow);
        for i in 0..3 {
            event.bind(i, 0).unwrap();
        }
        let mut seen = Vec::new();
        event
            .emit(|&id| {
                if id == 1 {
                    panic!("subscriber {id} failed");
                }
                seen.push(id);
                true
            })
            .unwrap();
        assert_eq!(seen, vec![0, 2]);
        assert_eq!(rx.try_recv(), Ok(Error::Panicked("subscriber 1 failed".into())));
    }

    #[test]
    fn test_panic_without_recover_unwinds_and_restores_depth() {
        let event = three(EventRecursion::Disallow);
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            event.emit(|_| panic!("boom")).unwrap();
        }));
        assert!(outcome.is_err());
        // Depth went back to zero, so this is not treated as a nested emission.
        assert_eq!(collect(&event), vec![0, 1, 2]);
    }
}
