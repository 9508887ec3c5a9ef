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

//! Frame pacing state and the per-frame update pass.

use std::cell::Cell;
use std::time::{Duration, Instant};

use tessera_data::{Component, ComponentState, Entity, EntityState, FrameInfo};
use tessera_core::Event;

use crate::context::Context;
use crate::options::FrameOptions;

/// Receiver of a frame callback.
#[derive(Clone)]
pub enum FrameTarget {
    /// An entity behavior.
    Entity(Entity),
    /// A component behavior.
    Component(Component),
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Pass {
    Update,
    LateUpdate,
}

pub(crate) struct FrameState {
    options: FrameOptions,
    cur_frames: Cell<u64>,
    started: Cell<Option<Instant>>,
    last: Cell<Option<Instant>>,
    delta: Cell<Duration>,
}

impl FrameState {
    pub(crate) fn new(options: FrameOptions) -> Self {
        Self {
            options,
            cur_frames: Cell::new(0),
            started: Cell::new(None),
            last: Cell::new(None),
            delta: Cell::new(Duration::ZERO),
        }
    }

    fn begin(&self) {
        let now = Instant::now();
        if self.started.get().is_none() {
            self.started.set(Some(now));
        }
        let delta = self.last.get().map_or(Duration::ZERO, |last| now - last);
        self.delta.set(delta);
        self.last.set(Some(now));
        self.cur_frames.set(self.cur_frames.get() + 1);
    }

    pub(crate) fn info(&self) -> FrameInfo {
        FrameInfo {
            target_fps: self.options.target_fps,
            total_frames: self.options.total_frames,
            cur_frames: self.cur_frames.get(),
            delta: self.delta.get(),
            elapsed: self.started.get().map_or(Duration::ZERO, |s| s.elapsed()),
        }
    }
}

impl Context {
    /// Runs one frame: every `Update` subscriber, then every `LateUpdate`
    /// subscriber. Only `Living` targets are visited.
    pub(crate) fn run_frame(&self) {
        let Some(frame) = &self.0.frame else {
            return;
        };
        frame.begin();
        self.run_pass(&self.0.update, Pass::Update);
        self.run_pass(&self.0.late_update, Pass::LateUpdate);
        self.handle().metrics().record_frame();
    }

    fn run_pass(&self, event: &Event<FrameTarget>, pass: Pass) {
        let result = event.emit(|target| {
            match target {
                FrameTarget::Entity(entity) if entity.state() == EntityState::Living => {
                    self.invoke_entity(entity, |behavior, cx| match pass {
                        Pass::Update => behavior.update(cx),
                        Pass::LateUpdate => behavior.late_update(cx),
                    });
                }
                FrameTarget::Component(component) if component.state() == ComponentState::Living => {
                    let Some(entity) = component.entity() else {
                        return true;
                    };
                    if entity.state() == EntityState::Living {
                        self.invoke_component(&entity, component, |behavior, cx| match pass {
                            Pass::Update => behavior.update(cx),
                            Pass::LateUpdate => behavior.late_update(cx),
                        });
                    }
                }
                _ => {}
            }
            true
        });
        if let Err(err) = result {
            self.report_error(err);
        }
    }
}
