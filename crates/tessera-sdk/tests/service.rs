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

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tessera_sdk::prelude::*;
use tessera_sdk::{EntityLib, ServiceConfig, ServicePlugin};

type Journal = Arc<Mutex<Vec<String>>>;

struct Recorder {
    tag: &'static str,
    journal: Journal,
}

impl ServicePlugin for Recorder {
    fn init(&self, cx: &ServiceContext) {
        self.journal.lock().unwrap().push(format!("{}.init@{}", self.tag, cx.name()));
    }

    fn shut(&self, _cx: &ServiceContext) {
        self.journal.lock().unwrap().push(format!("{}.shut", self.tag));
    }
}

struct Health {
    hp: u32,
}

impl ComponentBehavior for Health {}

#[test]
fn test_service_plugins_bracket_the_service() {
    // --- 1. SETUP ---
    let journal: Journal = Arc::default();
    let options = ServiceOptions::default()
        .with_name("svc")
        .with_plugin(
            "a",
            Arc::new(Recorder {
                tag: "a",
                journal: journal.clone(),
            }),
        )
        .and_then(|o| {
            o.with_plugin(
                "b",
                Arc::new(Recorder {
                    tag: "b",
                    journal: journal.clone(),
                }),
            )
        })
        .expect("plugins");

    // --- 2. ACTION ---
    let mut service = Service::new(options);
    service.start();
    service.start();
    service.stop();

    // --- 3. ASSERTIONS ---
    assert_eq!(
        *journal.lock().unwrap(),
        vec!["a.init@svc", "b.init@svc", "b.shut", "a.shut"]
    );
}

#[test]
fn test_runtime_names_are_unique() {
    let mut service = Service::new(ServiceOptions::default());
    service
        .spawn_runtime(RuntimeOptions::default().with_name("game"))
        .expect("first");
    let duplicate = service.spawn_runtime(RuntimeOptions::default().with_name("game"));
    assert!(matches!(duplicate, Err(Error::InvalidArgument(_))));
    assert_eq!(service.context().runtimes().len(), 1);
}

#[test]
fn test_prototype_entities_are_reachable_by_id() {
    // --- 1. SETUP ---
    let lib = Arc::new(EntityLib::new());
    lib.declare(
        Blueprint::new("player")
            .with_scope(Scope::Global)
            .with_component("health", || Health { hp: 100 }),
    )
    .expect("declare");
    let mut service = Service::new(ServiceOptions::default().with_entity_lib(lib));
    service.start();
    let game = service
        .spawn_runtime(RuntimeOptions::default().with_name("game"))
        .expect("spawn");
    let id = EntityId::from_name("player-1");

    // --- 2. ACTION ---
    let created = game
        .sync_call(move |cx: &Context| {
            let entity = EntityCreator::new(cx, "player").with_persist_id(id).spawn()?;
            let missing = EntityCreator::new(cx, "dragon").spawn().map(|e| e.id());
            Ok::<_, Error>((entity.prototype().to_owned(), entity.component_count(), missing))
        })
        .expect("call")
        .expect("create");
    let hp = service.caller().sync_call(id, |entity: &Entity, _: &Context| {
        entity.with_component::<Health, _>(|health| {
            health.hp -= 10;
            health.hp
        })
    });

    // --- 3. ASSERTIONS ---
    let (prototype, components, missing) = created;
    assert_eq!(prototype, "player");
    assert_eq!(components, 1);
    assert_eq!(missing, Err(Error::PrototypeNotFound("dragon".into())));
    assert_eq!(hp, Ok(Ok(90)));
    assert!(service.context().directory().contains(id));
}

#[test]
fn test_wait_returns_after_shutdown_from_another_thread() {
    // --- 1. SETUP ---
    let mut service = Service::new(ServiceOptions::default());
    service.start();
    let game = service
        .spawn_runtime(RuntimeOptions::default().with_name("game"))
        .expect("spawn");
    let cx = service.context().clone();

    // --- 2. ACTION ---
    let stopper = std::thread::spawn(move || {
        std::thread::sleep(Duration::from_millis(20));
        cx.shutdown();
    });
    service.wait();
    stopper.join().expect("stopper");

    // --- 3. ASSERTIONS ---
    assert!(game.is_terminated());
}

#[test]
fn test_service_from_json_config() {
    // --- 1. SETUP ---
    let config = ServiceConfig::from_json(
        r#"{
            "name": "world",
            "runtimes": [
                { "name": "physics", "queue_capacity": 16 },
                { "name": "render", "frame": { "target_fps": 60.0 } }
            ]
        }"#,
    )
    .expect("config");

    // --- 2. ACTION ---
    let service = Service::from_config(config, ServiceOptions::default()).expect("service");

    // --- 3. ASSERTIONS ---
    let cx = service.context();
    assert_eq!(cx.name(), "world");
    let names: Vec<String> = cx.runtimes().iter().map(|h| h.name().to_owned()).collect();
    assert_eq!(names, vec!["physics", "render"]);
    let frame = cx
        .runtime("render")
        .expect("render")
        .sync_call(|cx: &Context| cx.frame().map(|f| f.target_fps))
        .expect("call");
    assert_eq!(frame, Some(60.0));
}

#[tokio::test]
async fn test_async_caller_result() {
    let mut service = Service::new(ServiceOptions::default());
    let game = service
        .spawn_runtime(RuntimeOptions::default().with_name("game"))
        .expect("spawn");
    let id = game
        .sync_call(|cx: &Context| {
            let entity = Entity::new(EntityOptions::default().with_scope(Scope::Global));
            cx.add_entity(entity.clone()).map(|()| entity.id())
        })
        .expect("call")
        .expect("add");

    let serial = service
        .caller()
        .async_call(id, |entity: &Entity, _: &Context| entity.serial_no())
        .wait_async()
        .await;

    assert!(matches!(serial, Ok(n) if n > 0));
}
