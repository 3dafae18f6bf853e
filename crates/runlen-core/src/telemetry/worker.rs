use std::time::Duration;

use crate::telemetry;
use crate::telemetry::profile;
use crate::telemetry::tags;

const PROFILE_TAG_STACK_WORKER: [&str; 2] = [tags::TAG_SYSTEM, tags::TAG_WORKER];

/// Hooks invoked by pool workers around every encoded chunk.
///
/// Implementations must be cheap; they run on the worker threads between
/// chunks.
pub trait WorkerTelemetry: Send + Sync {
    fn on_task_started(&self, worker_id: usize, task_id: usize, input_len: usize);
    fn on_task_finished(&self, worker_id: usize, task_id: usize, elapsed: Duration);
    fn on_task_failed(&self, worker_id: usize, task_id: usize, elapsed: Duration);
}

/// Default hooks: feed the process metrics registry and profiling events.
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultWorkerTelemetry;

impl WorkerTelemetry for DefaultWorkerTelemetry {
    fn on_task_started(&self, _worker_id: usize, _task_id: usize, _input_len: usize) {
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_START_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_start")],
        );
        telemetry::add_gauge(
            tags::METRIC_WORKER_ACTIVE_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_start")],
        );
    }

    fn on_task_finished(&self, worker_id: usize, task_id: usize, elapsed: Duration) {
        self.record_end(worker_id, task_id, elapsed, "ok");
    }

    fn on_task_failed(&self, worker_id: usize, task_id: usize, elapsed: Duration) {
        self.record_end(worker_id, task_id, elapsed, "error");
    }
}

impl DefaultWorkerTelemetry {
    fn record_end(&self, _worker_id: usize, _task_id: usize, elapsed: Duration, result: &'static str) {
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        let outcome_metric = if result == "ok" {
            tags::METRIC_WORKER_TASK_FINISH_COUNT
        } else {
            tags::METRIC_WORKER_TASK_FAIL_COUNT
        };

        telemetry::increment_counter(
            outcome_metric,
            1,
            &[("subsystem", "worker"), ("op", "task_finish"), ("result", result)],
        );
        telemetry::increment_counter(
            tags::METRIC_WORKER_TASK_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task"), ("result", result)],
        );
        telemetry::record_histogram(
            tags::METRIC_WORKER_TASK_LATENCY_US,
            elapsed_us,
            &[("subsystem", "worker"), ("op", "task"), ("result", result)],
        );
        telemetry::sub_gauge_saturating(
            tags::METRIC_WORKER_ACTIVE_COUNT,
            1,
            &[("subsystem", "worker"), ("op", "task_finish")],
        );

        profile::event(
            tags::PROFILE_WORKER,
            &PROFILE_TAG_STACK_WORKER,
            "task_finish",
            result,
            elapsed_us,
            "worker task finished",
        );

        #[cfg(feature = "profiling")]
        if profile::is_tag_stack_enabled(&PROFILE_TAG_STACK_WORKER) {
            tracing::debug!(
                target: tags::PROFILE_WORKER,
                op = "task_finish",
                result,
                worker_id = _worker_id,
                task_id = _task_id,
                elapsed_us,
                "worker task context"
            );
        }
    }
}
