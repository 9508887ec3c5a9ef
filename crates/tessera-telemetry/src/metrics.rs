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

//! Runtime counters.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Instant;

use serde::{Deserialize, Serialize};

/// Counters shared between a runtime's consumer thread and its handles.
///
/// Every counter is a relaxed atomic: readers get a recent value, not a
/// consistent cut across counters.
#[derive(Debug, Default)]
pub struct RuntimeMetrics {
    tasks_executed: AtomicU64,
    tasks_rejected: AtomicU64,
    frames: AtomicU64,
    gc_runs: AtomicU64,
    errors_reported: AtomicU64,
    entities_live: AtomicI64,
    busy_nanos: AtomicU64,
}

/// Point-in-time copy of [`RuntimeMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Tasks taken from the queue and run.
    pub tasks_executed: u64,
    /// Submissions refused because the queue was full or closed.
    pub tasks_rejected: u64,
    /// Frames completed.
    pub frames: u64,
    /// Reclamation passes.
    pub gc_runs: u64,
    /// Errors forwarded to the error sink.
    pub errors_reported: u64,
    /// Entities currently hosted.
    pub entities_live: i64,
    /// Time spent running tasks, in nanoseconds.
    pub busy_nanos: u64,
}

impl RuntimeMetrics {
    /// Creates zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// A task ran.
    pub fn record_task(&self) {
        self.tasks_executed.fetch_add(1, Ordering::Relaxed);
    }

    /// A submission was refused.
    pub fn record_rejected(&self) {
        self.tasks_rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// A frame completed.
    pub fn record_frame(&self) {
        self.frames.fetch_add(1, Ordering::Relaxed);
    }

    /// A reclamation pass ran.
    pub fn record_gc(&self) {
        self.gc_runs.fetch_add(1, Ordering::Relaxed);
    }

    /// An error reached the sink.
    pub fn record_error(&self) {
        self.errors_reported.fetch_add(1, Ordering::Relaxed);
    }

    /// Adjusts the live entity gauge.
    pub fn add_entities(&self, delta: i64) {
        self.entities_live.fetch_add(delta, Ordering::Relaxed);
    }

    /// Reads every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            tasks_executed: self.tasks_executed.load(Ordering::Relaxed),
            tasks_rejected: self.tasks_rejected.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
            gc_runs: self.gc_runs.load(Ordering::Relaxed),
            errors_reported: self.errors_reported.load(Ordering::Relaxed),
            entities_live: self.entities_live.load(Ordering::Relaxed),
            busy_nanos: self.busy_nanos.load(Ordering::Relaxed),
        }
    }
}

impl MetricsSnapshot {
    /// Renders the snapshot as a JSON object for log lines.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}

/// Adds the time between its creation and its drop to the busy counter.
pub struct ScopedTaskTimer<'a> {
    started: Instant,
    metrics: &'a RuntimeMetrics,
}

impl<'a> ScopedTaskTimer<'a> {
    /// Starts timing.
    pub fn new(metrics: &'a RuntimeMetrics) -> Self {
        Self {
            started: Instant::now(),
            metrics,
        }
    }
}

impl Drop for ScopedTaskTimer<'_> {
    fn drop(&mut self) {
        let nanos = u64::try_from(self.started.elapsed().as_nanos()).unwrap_or(u64::MAX);
        self.metrics.busy_nanos.fetch_add(nanos, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = RuntimeMetrics::new();
        metrics.record_task();
        metrics.record_task();
        metrics.record_rejected();
        metrics.record_frame();
        metrics.record_gc();
        metrics.record_error();
        metrics.add_entities(3);
        metrics.add_entities(-1);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.tasks_executed, 2);
        assert_eq!(snapshot.tasks_rejected, 1);
        assert_eq!(snapshot.frames, 1);
        assert_eq!(snapshot.gc_runs, 1);
        assert_eq!(snapshot.errors_reported, 1);
        assert_eq!(snapshot.entities_live, 2);
    }

    #[test]
    fn test_scoped_timer_records_on_drop() {
        let metrics = RuntimeMetrics::new();
        {
            let _timer = ScopedTaskTimer::new(&metrics);
            std::thread::sleep(std::time::Duration::from_millis(2));
        }
        assert!(metrics.snapshot().busy_nanos >= 2_000_000);
    }

    #[test]
    fn test_snapshot_json() {
        let json = MetricsSnapshot::default().to_json();
        let back: MetricsSnapshot = serde_json::from_str(&json).unwrap();
        assert_eq!(back, MetricsSnapshot::default());
    }
}
