use std::any::Any;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::RunlenError;
use crate::buffer::{BufferPool, PooledBuffer};
use crate::core::task_board::TaskBoard;
use crate::telemetry::worker::{DefaultWorkerTelemetry, WorkerTelemetry};
use crate::types::{Fragment, Result, Task};

/// Fixed-size pool of encoding threads pulling from a [`TaskBoard`].
pub struct WorkerPool {
    num_workers: usize,
    buffer_pool: Arc<BufferPool>,
    telemetry: Arc<dyn WorkerTelemetry>,
}

impl WorkerPool {
    /// Creates a worker pool using the default worker telemetry implementation.
    pub fn new(num_workers: usize, buffer_pool: Arc<BufferPool>) -> Self {
        Self::with_telemetry(num_workers, buffer_pool, Arc::new(DefaultWorkerTelemetry))
    }

    /// Creates a worker pool with a custom telemetry backend.
    pub fn with_telemetry(
        num_workers: usize,
        buffer_pool: Arc<BufferPool>,
        telemetry: Arc<dyn WorkerTelemetry>,
    ) -> Self {
        Self {
            num_workers: num_workers.max(1),
            buffer_pool,
            telemetry,
        }
    }

    /// Number of workers configured in this pool.
    pub fn num_workers(&self) -> usize {
        self.num_workers
    }

    /// Spawns the worker threads over `board`.
    ///
    /// No more threads than tasks are started. Each worker takes tasks in
    /// ascending id order, runs `processor` outside the board lock and
    /// publishes the fragment (or the failure) back to the board. A panic in
    /// `processor` is published as [`RunlenError::WorkerPanicked`].
    ///
    /// # Errors
    /// Returns an error if a thread cannot be spawned; the board is aborted
    /// and already started workers are joined first.
    pub fn spawn<F>(&self, board: Arc<TaskBoard>, processor: F) -> Result<WorkerPoolHandle>
    where
        F: Fn(usize, &Task, &BufferPool) -> Result<PooledBuffer> + Send + Sync + 'static,
    {
        let thread_count = self.num_workers.min(board.len().max(1));
        let state = Arc::new(WorkerPoolState::new(
            board,
            Arc::clone(&self.buffer_pool),
            Arc::clone(&self.telemetry),
            thread_count,
        ));
        let processor = Arc::new(processor);

        let mut handle = WorkerPoolHandle {
            state: Arc::clone(&state),
            worker_handles: Vec::with_capacity(thread_count),
        };

        for worker_id in 0..thread_count {
            let worker_state = Arc::clone(&state);
            let worker_processor = Arc::clone(&processor);
            let spawned = thread::Builder::new()
                .name(format!("runlen-worker-{worker_id}"))
                .spawn(move || run_worker_loop(worker_id, worker_state, worker_processor));

            match spawned {
                Ok(join_handle) => handle.worker_handles.push(join_handle),
                Err(error) => {
                    state.board.abort();
                    let _ = handle.join();
                    return Err(RunlenError::Io(error).with_context("failed to spawn worker"));
                }
            }
        }

        tracing::debug!(
            target: crate::telemetry::tags::PROFILE_WORKER,
            workers = thread_count,
            tasks = state.board.len(),
            "worker pool started"
        );
        Ok(handle)
    }
}

struct WorkerPoolState {
    board: Arc<TaskBoard>,
    buffer_pool: Arc<BufferPool>,
    telemetry: Arc<dyn WorkerTelemetry>,
    started_at: Instant,
    completed: AtomicUsize,
    task_counts: Vec<AtomicUsize>,
    worker_started_offsets_us: Vec<AtomicU64>,
    worker_stopped_offsets_us: Vec<AtomicU64>,
    worker_busy_us: Vec<AtomicU64>,
}

impl WorkerPoolState {
    fn new(
        board: Arc<TaskBoard>,
        buffer_pool: Arc<BufferPool>,
        telemetry: Arc<dyn WorkerTelemetry>,
        num_workers: usize,
    ) -> Self {
        Self {
            board,
            buffer_pool,
            telemetry,
            started_at: Instant::now(),
            completed: AtomicUsize::new(0),
            task_counts: (0..num_workers).map(|_| AtomicUsize::new(0)).collect(),
            worker_started_offsets_us: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
            worker_stopped_offsets_us: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
            worker_busy_us: (0..num_workers).map(|_| AtomicU64::new(0)).collect(),
        }
    }

    /// Microseconds since the pool started, offset by one so zero means "unset".
    fn offset_marker(&self) -> u64 {
        let elapsed_us = self.started_at.elapsed().as_micros().min(u64::MAX as u128) as u64;
        elapsed_us.saturating_add(1)
    }
}

/// Per-worker runtime metrics captured by the worker pool.
#[derive(Debug, Clone)]
pub struct WorkerRuntimeSnapshot {
    pub worker_id: usize,
    pub tasks_completed: usize,
    pub uptime: Duration,
    pub busy: Duration,
    pub idle: Duration,
    pub utilization: f64,
}

/// Runtime metrics snapshot for the worker pool.
#[derive(Debug, Clone)]
pub struct PoolRuntimeSnapshot {
    pub elapsed: Duration,
    pub tasks_total: usize,
    pub completed: usize,
    pub pending: usize,
    pub workers: Vec<WorkerRuntimeSnapshot>,
}

/// Handle to the running workers of a [`WorkerPool`].
pub struct WorkerPoolHandle {
    state: Arc<WorkerPoolState>,
    worker_handles: Vec<JoinHandle<()>>,
}

impl WorkerPoolHandle {
    /// Number of worker threads actually started.
    pub fn worker_count(&self) -> usize {
        self.state.task_counts.len()
    }

    /// Tasks processed so far, successful or not.
    pub fn completed_count(&self) -> usize {
        self.state.completed.load(Ordering::Acquire)
    }

    /// Per-worker processed task counts.
    pub fn worker_task_counts(&self) -> Vec<usize> {
        self.state
            .task_counts
            .iter()
            .map(|counter| counter.load(Ordering::Acquire))
            .collect()
    }

    /// Returns runtime metrics for the pool and each worker.
    pub fn runtime_snapshot(&self) -> PoolRuntimeSnapshot {
        let elapsed = self.state.started_at.elapsed();
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        let tasks_total = self.state.board.len();
        let completed = self.completed_count();

        let workers = (0..self.worker_count())
            .map(|worker_id| {
                let started_raw =
                    self.state.worker_started_offsets_us[worker_id].load(Ordering::Acquire);
                let stopped_raw =
                    self.state.worker_stopped_offsets_us[worker_id].load(Ordering::Acquire);
                let stop_us = match stopped_raw {
                    0 => elapsed_us,
                    raw => raw - 1,
                };
                let uptime_us = match started_raw {
                    0 => 0,
                    raw => stop_us.saturating_sub(raw - 1),
                };
                let busy_us = self.state.worker_busy_us[worker_id]
                    .load(Ordering::Acquire)
                    .min(uptime_us);
                let utilization = if uptime_us == 0 {
                    0.0
                } else {
                    busy_us as f64 / uptime_us as f64
                };

                WorkerRuntimeSnapshot {
                    worker_id,
                    tasks_completed: self.state.task_counts[worker_id].load(Ordering::Acquire),
                    uptime: Duration::from_micros(uptime_us),
                    busy: Duration::from_micros(busy_us),
                    idle: Duration::from_micros(uptime_us - busy_us),
                    utilization,
                }
            })
            .collect();

        PoolRuntimeSnapshot {
            elapsed,
            tasks_total,
            completed,
            pending: tasks_total.saturating_sub(completed),
            workers,
        }
    }

    /// Waits for every worker to exit.
    ///
    /// Workers exit on their own once the board runs out of tasks or is
    /// aborted; call [`TaskBoard::abort`] first to stop them early.
    ///
    /// # Errors
    /// Returns [`RunlenError::WorkerPanicked`] if a worker thread panicked
    /// outside a task.
    pub fn join(mut self) -> Result<()> {
        let mut first_error = None;
        for handle in self.worker_handles.drain(..) {
            if let Err(payload) = handle.join() {
                first_error.get_or_insert_with(|| {
                    RunlenError::WorkerPanicked(format!(
                        "worker thread panicked: {}",
                        panic_message(payload.as_ref())
                    ))
                });
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Runs one task step, turning a panic into [`RunlenError::WorkerPanicked`]
/// so the task's slot is always completed.
fn run_guarded<T>(task_id: usize, step: impl FnOnce() -> Result<T>) -> Result<T> {
    match catch_unwind(AssertUnwindSafe(step)) {
        Ok(result) => result,
        Err(payload) => Err(RunlenError::WorkerPanicked(format!(
            "task {task_id} panicked: {}",
            panic_message(payload.as_ref())
        ))),
    }
}

fn run_worker_loop<F>(worker_id: usize, state: Arc<WorkerPoolState>, processor: Arc<F>)
where
    F: Fn(usize, &Task, &BufferPool) -> Result<PooledBuffer> + Send + Sync,
{
    state.worker_started_offsets_us[worker_id].store(state.offset_marker(), Ordering::Release);

    loop {
        let task = match state.board.try_take_next() {
            Ok(Some(task)) => task,
            Ok(None) => break,
            Err(error) => {
                tracing::warn!(
                    target: crate::telemetry::tags::PROFILE_WORKER,
                    worker_id,
                    %error,
                    "worker stopping"
                );
                break;
            }
        };

        let started_at = Instant::now();
        let result = run_guarded(task.id, || {
            state
                .telemetry
                .on_task_started(worker_id, task.id, task.len());
            processor(worker_id, &task, &state.buffer_pool)
        });

        let elapsed = started_at.elapsed();
        let elapsed_us = elapsed.as_micros().min(u64::MAX as u128) as u64;
        state.worker_busy_us[worker_id].fetch_add(elapsed_us, Ordering::AcqRel);
        let hook = run_guarded(task.id, || {
            match &result {
                Ok(_) => state
                    .telemetry
                    .on_task_finished(worker_id, task.id, elapsed),
                Err(_) => state.telemetry.on_task_failed(worker_id, task.id, elapsed),
            }
            Ok(())
        });
        let result = hook.and(result);

        let outcome = result.map(|bytes| Fragment {
            task_id: task.id,
            input_index: task.input_index,
            input_len: task.len(),
            bytes,
        });

        state.completed.fetch_add(1, Ordering::AcqRel);
        state.task_counts[worker_id].fetch_add(1, Ordering::AcqRel);

        if state.board.complete(task.id, outcome).is_err() {
            break;
        }
    }

    state.worker_stopped_offsets_us[worker_id].store(state.offset_marker(), Ordering::Release);
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;
    use std::sync::Mutex;

    use super::*;
    use crate::codec;
    use crate::types::ChunkData;

    fn board(chunks: &[&'static str]) -> Arc<TaskBoard> {
        let tasks = chunks
            .iter()
            .enumerate()
            .map(|(id, chunk)| Task::new(id, 0, ChunkData::from(chunk.as_bytes())))
            .collect();
        Arc::new(TaskBoard::new(tasks).expect("board"))
    }

    fn encode_task(_worker_id: usize, task: &Task, pool: &BufferPool) -> Result<PooledBuffer> {
        let mut out = pool.acquire_with_capacity(codec::max_encoded_len(task.len()));
        codec::encode_into(task.data(), &mut out);
        Ok(out)
    }

    fn drain(board: &TaskBoard) -> Result<Vec<(usize, Vec<u8>)>> {
        let mut out = Vec::new();
        while let Some(ready) = board.wait_ready()? {
            for fragment in ready {
                board.mark_flushed(fragment.task_id)?;
                out.push((fragment.task_id, fragment.as_slice().to_vec()));
            }
        }
        Ok(out)
    }

    #[test]
    fn every_task_is_encoded_exactly_once() {
        let board = board(&["aa", "bbb", "c", "dddd", "e"]);
        let pool = WorkerPool::new(3, Arc::new(BufferPool::new(64, 8)));
        let handle = pool
            .spawn(Arc::clone(&board), encode_task)
            .expect("spawn");

        let fragments = drain(&board).expect("drain");
        assert_eq!(
            fragments.iter().map(|(id, _)| *id).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4]
        );
        assert_eq!(fragments[3].1, vec![b'd', 4]);

        let counts = handle.worker_task_counts();
        assert_eq!(counts.iter().sum::<usize>(), 5);
        let snapshot = handle.runtime_snapshot();
        assert_eq!(snapshot.tasks_total, 5);
        assert_eq!(snapshot.completed, 5);
        assert_eq!(snapshot.pending, 0);
        handle.join().expect("join");
    }

    #[test]
    fn never_spawns_more_threads_than_tasks() {
        let board = board(&["x", "y"]);
        let pool = WorkerPool::new(16, Arc::new(BufferPool::new(64, 8)));
        let handle = pool
            .spawn(Arc::clone(&board), encode_task)
            .expect("spawn");
        assert_eq!(handle.worker_count(), 2);
        drain(&board).expect("drain");
        handle.join().expect("join");
    }

    #[test]
    fn panicking_task_is_published_as_failure() {
        let board = board(&["ok", "boom", "ok"]);
        let pool = WorkerPool::new(2, Arc::new(BufferPool::new(64, 8)));
        let handle = pool
            .spawn(Arc::clone(&board), |worker_id, task: &Task, pool: &BufferPool| {
                if task.data() == b"boom" {
                    panic!("injected failure");
                }
                encode_task(worker_id, task, pool)
            })
            .expect("spawn");

        let first = board.wait_ready().expect("first fragment").expect("ready");
        assert_eq!(first[0].task_id, 0);
        board.mark_flushed(0).expect("flush");

        match board.wait_ready() {
            Err(RunlenError::WorkerPanicked(message)) => {
                assert!(message.contains("injected failure"));
            }
            other => panic!("unexpected result: {other:?}"),
        }
        board.abort();
        handle.join().expect("join");
    }

    #[derive(Default)]
    struct RecordingTelemetry {
        started: Mutex<BTreeSet<usize>>,
        finished: AtomicUsize,
    }

    impl WorkerTelemetry for RecordingTelemetry {
        fn on_task_started(&self, _worker_id: usize, task_id: usize, _input_len: usize) {
            if let Ok(mut started) = self.started.lock() {
                started.insert(task_id);
            }
        }

        fn on_task_finished(&self, _worker_id: usize, _task_id: usize, _elapsed: Duration) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }

        fn on_task_failed(&self, _worker_id: usize, _task_id: usize, _elapsed: Duration) {}
    }

    #[test]
    fn telemetry_hooks_see_every_task() {
        let telemetry = Arc::new(RecordingTelemetry::default());
        let board = board(&["a", "b", "c"]);
        let pool = WorkerPool::with_telemetry(
            2,
            Arc::new(BufferPool::new(64, 8)),
            Arc::clone(&telemetry) as Arc<dyn WorkerTelemetry>,
        );
        let handle = pool
            .spawn(Arc::clone(&board), encode_task)
            .expect("spawn");
        drain(&board).expect("drain");
        handle.join().expect("join");

        assert_eq!(telemetry.finished.load(Ordering::SeqCst), 3);
        let started = telemetry.started.lock().expect("started lock");
        assert_eq!(started.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
