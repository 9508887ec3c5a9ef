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

//! Routing calls to global entities across runtimes.

use std::sync::Arc;

use tessera_control::{Caller, Context, EntityDirectory, Runtime, RuntimeOptions};
use tessera_core::{EntityId, Error, ErrorSink, SerialNo};
use tessera_data::{Entity, EntityBehavior, EntityOptions, Scope};

#[derive(Default)]
struct Counter {
    hits: u32,
}

impl EntityBehavior for Counter {}

fn spawn_with(directory: &Arc<EntityDirectory>, name: &str) -> Runtime {
    Runtime::spawn(
        RuntimeOptions::default()
            .with_name(name)
            .with_directory(Arc::clone(directory)),
    )
    .expect("spawn")
}

fn host_global(runtime: &Runtime, name: &'static str) -> (EntityId, SerialNo) {
    runtime
        .handle()
        .sync_call(move |cx: &Context| {
            let entity = Entity::new(
                EntityOptions::default()
                    .with_persist_id(EntityId::from_name(name))
                    .with_scope(Scope::Global)
                    .with_behavior(Counter::default()),
            );
            cx.add_entity(entity.clone()).expect("add");
            (entity.id(), entity.serial_no())
        })
        .expect("call")
}

#[test]
fn test_call_reaches_the_hosting_runtime() {
    // --- 1. SETUP ---
    let directory = Arc::new(EntityDirectory::new());
    let runtime = spawn_with(&directory, "host");
    let (id, serial_no) = host_global(&runtime, "player");
    let caller = Caller::new(Arc::clone(&directory), ErrorSink::log_only());

    // --- 2. ACTION ---
    let hits = caller.sync_call(id, |entity: &Entity, cx: &Context| {
        assert_eq!(cx.name(), "host");
        entity
            .with_behavior::<Counter, _>(|counter| {
                counter.hits += 1;
                counter.hits
            })
            .expect("counter")
    });
    let again = caller.sync_call_with_serial_no(id, serial_no, |e: &Entity, _: &Context| e.serial_no());

    // --- 3. ASSERTIONS ---
    assert_eq!(hits, Ok(1));
    assert_eq!(again, Ok(serial_no));
    assert!(serial_no > 0);
}

#[test]
fn test_bad_addresses_are_rejected() {
    // --- 1. SETUP ---
    let directory = Arc::new(EntityDirectory::new());
    let runtime = spawn_with(&directory, "host");
    let (id, serial_no) = host_global(&runtime, "npc");
    let caller = Caller::new(Arc::clone(&directory), ErrorSink::log_only());
    let unknown = EntityId::from_name("nobody");

    // --- 2. ACTION ---
    let nil = caller.sync_call(EntityId::NIL, |_: &Entity, _: &Context| ());
    let missing = caller.sync_call(unknown, |_: &Entity, _: &Context| ());
    let stale = caller.sync_call_with_serial_no(id, serial_no + 1_000_000, |_: &Entity, _: &Context| ());
    let invalid = caller.sync_call_with_serial_no(id, 0, |_: &Entity, _: &Context| ());

    // --- 3. ASSERTIONS ---
    assert_eq!(nil, Err(Error::NilEntityId));
    assert_eq!(missing, Err(Error::EntityNotFound(unknown)));
    assert_eq!(stale, Err(Error::EntityNotFound(id)));
    assert_eq!(invalid, Err(Error::InvalidSerialNo(0)));
}

#[test]
fn test_destroyed_entity_is_not_found() {
    // --- 1. SETUP ---
    let directory = Arc::new(EntityDirectory::new());
    let runtime = spawn_with(&directory, "host");
    let (id, _) = host_global(&runtime, "ghost");
    let caller = Caller::new(Arc::clone(&directory), ErrorSink::log_only());

    // --- 2. ACTION ---
    runtime
        .handle()
        .sync_call(move |cx: &Context| cx.remove_entity(id))
        .expect("call")
        .expect("remove");
    let result = caller.sync_call(id, |_: &Entity, _: &Context| ());

    // --- 3. ASSERTIONS ---
    assert_eq!(result, Err(Error::EntityNotFound(id)));
    assert!(!directory.contains(id));
}

#[test]
fn test_entity_removed_before_the_segment_runs() {
    // --- 1. SETUP ---
    let directory = Arc::new(EntityDirectory::new());
    let runtime = spawn_with(&directory, "host");
    let (id, _) = host_global(&runtime, "leaving");
    let caller = Caller::new(Arc::clone(&directory), ErrorSink::log_only());
    let (gate_tx, gate_rx) = crossbeam_channel::bounded::<()>(1);

    // The removal is queued first, so it runs before the routed call.
    runtime
        .handle()
        .async_call_no_ret(move |cx: &Context| {
            let _ = gate_rx.recv();
            let _ = cx.remove_entity(id);
        })
        .expect("queue removal");

    // --- 2. ACTION ---
    let pending = caller.async_call(id, |_: &Entity, _: &Context| ());
    gate_tx.send(()).expect("release");

    // --- 3. ASSERTIONS ---
    assert_eq!(pending.wait(), Err(Error::EntityNotInContext));
}

#[test]
fn test_runtimes_call_each_other() {
    // --- 1. SETUP ---
    let directory = Arc::new(EntityDirectory::new());
    let left = spawn_with(&directory, "left");
    let right = spawn_with(&directory, "right");
    let (target, _) = host_global(&right, "target");

    // --- 2. ACTION ---
    let answer = left
        .handle()
        .sync_call(move |cx: &Context| {
            let caller = cx.caller().expect("linked to a directory");
            caller.sync_call(target, |_: &Entity, cx: &Context| cx.name().to_owned())
        })
        .expect("call");

    // --- 3. ASSERTIONS ---
    assert_eq!(answer, Ok("right".to_owned()));
}

#[test]
fn test_fire_and_forget_panic_goes_to_the_sink() {
    // --- 1. SETUP ---
    let directory = Arc::new(EntityDirectory::new());
    let runtime = spawn_with(&directory, "host");
    let (id, _) = host_global(&runtime, "fragile");
    let (sink, errors) = ErrorSink::channel(4);
    let caller = Caller::new(Arc::clone(&directory), sink);

    // --- 2. ACTION ---
    caller.async_call_no_ret(id, |_: &Entity, _: &Context| panic!("segment failed"));
    // Queued after the segment, so it completes after it.
    runtime.handle().sync_call(|_: &Context| ()).expect("flush");

    // --- 3. ASSERTIONS ---
    match errors.try_recv() {
        Ok(Error::Panicked(msg)) => assert!(msg.contains("segment failed")),
        other => panic!("expected a panic report, got {other:?}"),
    }
}

#[test]
fn test_sync_no_ret_reports_panic_to_the_sink() {
    // --- 1. SETUP ---
    let directory = Arc::new(EntityDirectory::new());
    let runtime = spawn_with(&directory, "host");
    let (id, serial_no) = host_global(&runtime, "brittle");
    let (sink, errors) = ErrorSink::channel(4);
    let caller = Caller::new(Arc::clone(&directory), sink);

    // --- 2. ACTION ---
    let plain = caller.sync_call_no_ret(id, |_: &Entity, _: &Context| panic!("plain failed"));
    let addressed = caller.sync_call_no_ret_with_serial_no(id, serial_no, |_: &Entity, _: &Context| {
        panic!("addressed failed")
    });
    let misaddressed = caller.sync_call_no_ret(EntityId::NIL, |_: &Entity, _: &Context| {});

    // --- 3. ASSERTIONS ---
    assert_eq!(plain, Ok(()));
    assert_eq!(addressed, Ok(()));
    assert_eq!(misaddressed, Err(Error::NilEntityId));
    assert_eq!(errors.try_recv(), Ok(Error::Panicked("plain failed".into())));
    assert_eq!(errors.try_recv(), Ok(Error::Panicked("addressed failed".into())));
    assert!(errors.try_recv().is_err());
}

#[test]
fn test_misaddressed_fire_and_forget_is_dropped() {
    // --- 1. SETUP ---
    let directory = Arc::new(EntityDirectory::new());
    let runtime = spawn_with(&directory, "host");
    let (sink, errors) = ErrorSink::channel(4);
    let caller = Caller::new(Arc::clone(&directory), sink);

    // --- 2. ACTION ---
    caller.async_call_no_ret(EntityId::NIL, |_: &Entity, _: &Context| panic!("never runs"));
    caller.async_call_no_ret_with_serial_no(EntityId::from_name("ghost"), 0, |_: &Entity, _: &Context| {
        panic!("never runs")
    });
    runtime.handle().sync_call(|_: &Context| ()).expect("flush");

    // --- 3. ASSERTIONS ---
    assert!(errors.try_recv().is_err());
}
