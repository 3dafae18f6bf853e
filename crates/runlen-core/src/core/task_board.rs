use std::sync::{Condvar, Mutex, MutexGuard};

use crate::RunlenError;
use crate::types::{Fragment, Result, Task};

#[derive(Debug)]
enum Slot {
    Pending,
    Running,
    Done(Fragment),
    Failed(RunlenError),
    Taken,
}

#[derive(Debug)]
struct BoardState {
    queue: std::vec::IntoIter<Task>,
    slots: Vec<Slot>,
    /// First task not yet handed to the emitter.
    ready_cursor: usize,
    /// Number of tasks whose fragment has been written.
    watermark: usize,
    completed: usize,
    aborted: bool,
}

/// Shared state between the workers and the ordered emitter.
///
/// One mutex guards the dequeue cursor, the per-task slots and the
/// watermark; one condvar wakes the emitter whenever a task completes or
/// the board is aborted. Tasks are handed out strictly by ascending id and
/// each at most once.
#[derive(Debug)]
pub struct TaskBoard {
    state: Mutex<BoardState>,
    changed: Condvar,
    len: usize,
}

impl TaskBoard {
    /// Creates a board over `tasks`, whose ids must be `0..tasks.len()` in order.
    ///
    /// # Errors
    /// Returns [`RunlenError::InvalidTaskId`] for the first out-of-place id.
    pub fn new(tasks: Vec<Task>) -> Result<Self> {
        if let Some((expected, task)) = tasks
            .iter()
            .enumerate()
            .find(|(index, task)| task.id != *index)
        {
            return Err(RunlenError::InvalidTaskId {
                expected,
                actual: task.id,
            });
        }

        let len = tasks.len();
        let slots = (0..len).map(|_| Slot::Pending).collect();
        Ok(Self {
            state: Mutex::new(BoardState {
                queue: tasks.into_iter(),
                slots,
                ready_cursor: 0,
                watermark: 0,
                completed: 0,
                aborted: false,
            }),
            changed: Condvar::new(),
            len,
        })
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Hands out the next pending task, or `None` once the queue is
    /// exhausted or the board has been aborted.
    pub fn try_take_next(&self) -> Result<Option<Task>> {
        let mut state = self.lock()?;
        if state.aborted {
            return Ok(None);
        }

        let Some(task) = state.queue.next() else {
            return Ok(None);
        };
        state.slots[task.id] = Slot::Running;
        Ok(Some(task))
    }

    /// Publishes the outcome of a running task and wakes the emitter.
    ///
    /// # Errors
    /// Returns [`RunlenError::InvalidTaskId`] if `task_id` is unknown or was
    /// not handed out as running.
    pub fn complete(&self, task_id: usize, outcome: Result<Fragment>) -> Result<()> {
        let mut state = self.lock()?;
        let expected = state.ready_cursor;
        let Some(slot @ Slot::Running) = state.slots.get_mut(task_id) else {
            return Err(RunlenError::InvalidTaskId {
                expected,
                actual: task_id,
            });
        };
        *slot = match outcome {
            Ok(fragment) => Slot::Done(fragment),
            Err(error) => Slot::Failed(error),
        };
        state.completed += 1;
        drop(state);

        self.changed.notify_all();
        Ok(())
    }

    /// Blocks until the next fragment in order is available.
    ///
    /// Returns every fragment that became contiguous with the ones already
    /// handed out, or `None` once all tasks have been handed out. Every
    /// wake-up rescans forward from the cursor, so completions may arrive
    /// in any order.
    ///
    /// # Errors
    /// Returns the error of a failed task as soon as it is next in order, or
    /// [`RunlenError::Aborted`] if the board was aborted.
    pub fn wait_ready(&self) -> Result<Option<Vec<Fragment>>> {
        let mut state = self.lock()?;
        loop {
            if state.ready_cursor == self.len {
                return Ok(None);
            }

            let mut ready = Vec::new();
            while state.ready_cursor < self.len {
                let cursor = state.ready_cursor;
                match std::mem::replace(&mut state.slots[cursor], Slot::Taken) {
                    Slot::Done(fragment) => {
                        ready.push(fragment);
                        state.ready_cursor += 1;
                    }
                    Slot::Failed(error) if ready.is_empty() => {
                        state.ready_cursor += 1;
                        return Err(error);
                    }
                    other => {
                        state.slots[cursor] = other;
                        break;
                    }
                }
            }

            if !ready.is_empty() {
                return Ok(Some(ready));
            }
            if state.aborted {
                return Err(RunlenError::Aborted);
            }

            state = self
                .changed
                .wait(state)
                .map_err(|_| RunlenError::LockPoisoned("task board"))?;
        }
    }

    /// Records that the fragment of `task_id` has been written.
    ///
    /// # Errors
    /// Returns [`RunlenError::InvalidTaskId`] unless `task_id` is the next
    /// ordinal after the current watermark.
    pub fn mark_flushed(&self, task_id: usize) -> Result<()> {
        let mut state = self.lock()?;
        if task_id != state.watermark || task_id >= state.ready_cursor {
            return Err(RunlenError::InvalidTaskId {
                expected: state.watermark,
                actual: task_id,
            });
        }
        state.watermark += 1;
        Ok(())
    }

    /// Stops handing out tasks and wakes any waiter.
    ///
    /// Tasks already running still publish their outcome.
    pub fn abort(&self) {
        if let Ok(mut state) = self.state.lock() {
            state.aborted = true;
        }
        self.changed.notify_all();
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().map(|state| state.aborted).unwrap_or(true)
    }

    /// Number of tasks whose fragment has been written.
    pub fn watermark(&self) -> usize {
        self.lock().map(|state| state.watermark).unwrap_or(0)
    }

    /// Number of tasks that have published an outcome.
    pub fn completed_count(&self) -> usize {
        self.lock().map(|state| state.completed).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, BoardState>> {
        self.state
            .lock()
            .map_err(|_| RunlenError::LockPoisoned("task board"))
    }
}
