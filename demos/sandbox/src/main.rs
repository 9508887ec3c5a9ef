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

// Tessera Sandbox
// Two runtimes: a frame-paced "world" hosting a global hero, and an "arena"
// that strikes the hero through the caller.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tessera_sdk::prelude::*;
use tessera_sdk::EntityLib;

const HERO: &str = "hero";

struct Health {
    hp: i32,
    regen: i32,
}

impl ComponentBehavior for Health {
    fn frame_hooks(&self) -> FrameHooks {
        FrameHooks::UPDATE
    }

    fn start(&mut self, cx: &ComponentCx<'_>) {
        log::info!("'{}' starts with {} hp", cx.component().name(), self.hp);
    }

    fn update(&mut self, _cx: &ComponentCx<'_>) {
        self.hp = (self.hp + self.regen).min(100);
    }
}

struct Hero;

impl EntityBehavior for Hero {
    fn inited(&mut self, cx: &EntityCx<'_>) {
        log::info!(
            "Hero {} is alive on runtime '{}'",
            cx.entity().id(),
            cx.runtime().runtime_name()
        );
    }

    fn shut(&mut self, cx: &EntityCx<'_>) {
        let frames = cx.frame().map_or(0, |f| f.cur_frames);
        log::info!("Hero {} leaves after {frames} frames", cx.entity().id());
    }
}

fn main() -> Result<()> {
    use env_logger::{Builder, Env};

    Builder::from_env(Env::default().default_filter_or("info")).init();

    let lib = Arc::new(EntityLib::new());
    lib.declare(
        Blueprint::new(HERO)
            .with_scope(Scope::Global)
            .with_instance(|| Hero)
            .with_component("health", || Health { hp: 100, regen: 1 }),
    )?;

    let mut service = Service::new(ServiceOptions::default().with_name("sandbox").with_entity_lib(lib));
    service.start();
    let world = service.spawn_runtime(RuntimeOptions::default().with_name("world").with_frame(30.0, 90))?;
    let arena = service.spawn_runtime(RuntimeOptions::default().with_name("arena"))?;

    let hero_id = EntityId::from_name(HERO);
    world.sync_call(move |cx: &Context| EntityCreator::new(cx, HERO).with_persist_id(hero_id).spawn().map(|_| ()))??;

    for round in 1..=5 {
        let hp = arena.sync_call(move |cx: &Context| -> tessera_sdk::Result<i32> {
            let caller = cx.caller().ok_or(Error::EntityNotFound(hero_id))?;
            caller.sync_call(hero_id, |hero: &Entity, _: &Context| {
                hero.with_component::<Health, _>(|health| {
                    health.hp -= 30;
                    health.hp
                })
            })?
        })??;
        log::info!("Round {round}: the arena strikes, hero has {hp} hp");

        if hp <= 0 {
            world.sync_call(move |cx: &Context| cx.remove_entity(hero_id))??;
            log::info!("Hero fell in round {round}");
            break;
        }
        std::thread::sleep(Duration::from_millis(200));
    }

    for handle in service.context().runtimes() {
        log::info!("Runtime '{}': {}", handle.name(), handle.metrics().snapshot().to_json());
    }
    service.context().shutdown();
    service.wait();
    Ok(())
}
