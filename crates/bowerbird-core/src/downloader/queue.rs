//! Bounded task queue shared by the worker pool.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::task::Task;

/// FIFO of tasks waiting for a worker. `push` blocks while full; `pop`
/// blocks while empty unless the caller's session has been stopped.
pub(crate) struct TaskQueue {
    items: Mutex<VecDeque<Arc<Task>>>,
    capacity: usize,
    not_empty: Condvar,
    not_full: Condvar,
}

impl TaskQueue {
    pub(crate) fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Arc<Task>>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enqueue without blocking; hands the task back if the queue is full.
    pub(crate) fn try_push(&self, task: Arc<Task>) -> Result<(), Arc<Task>> {
        let mut q = self.lock();
        if q.len() >= self.capacity {
            return Err(task);
        }
        q.push_back(task);
        self.not_empty.notify_one();
        Ok(())
    }

    /// Enqueue, waiting for room.
    pub(crate) fn push(&self, task: Arc<Task>) {
        let mut q = self.lock();
        while q.len() >= self.capacity {
            q = self
                .not_full
                .wait(q)
                .unwrap_or_else(PoisonError::into_inner);
        }
        q.push_back(task);
        self.not_empty.notify_one();
    }

    /// Dequeue the next task, or `None` once `stop` is set.
    pub(crate) fn pop(&self, stop: &AtomicBool) -> Option<Arc<Task>> {
        let mut q = self.lock();
        loop {
            if stop.load(Ordering::Acquire) {
                return None;
            }
            if let Some(task) = q.pop_front() {
                self.not_full.notify_one();
                return Some(task);
            }
            q = self
                .not_empty
                .wait(q)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Wake every blocked `pop` so stopped workers can exit. Taking the lock
    /// first means a worker between its stop check and its wait cannot miss it.
    pub(crate) fn wake_all(&self) {
        let _q = self.lock();
        self.not_empty.notify_all();
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }
}
