//! A single download job: request, destination, completion state and hook.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::retry::TaskError;
use crate::transport::Request;

/// Lifecycle of a task. Only moves forward; terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    Running,
    /// Downloaded and renamed into place.
    Finished,
    /// Destination already existed and `overwrite` was off.
    Skipped,
    /// The request's cancel token fired.
    Canceled,
    Failed,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Finished | TaskStatus::Skipped | TaskStatus::Canceled | TaskStatus::Failed
        )
    }
}

/// Completion hook; receives the task once its file is in place.
pub type OnFinished = Box<dyn FnOnce(&Task) + Send>;

#[derive(Debug)]
struct TaskState {
    status: TaskStatus,
    last_error: Option<Arc<TaskError>>,
}

pub struct Task {
    request: Request,
    local_path: PathBuf,
    overwrite: bool,
    state: Mutex<TaskState>,
    bytes_last_second: AtomicU64,
    bytes_written: AtomicU64,
    attempts: AtomicU32,
    on_finished: Mutex<Option<OnFinished>>,
}

impl Task {
    /// New pending task that saves `request`'s response body at `local_path`.
    pub fn new(request: Request, local_path: impl Into<PathBuf>) -> Self {
        Self {
            request,
            local_path: local_path.into(),
            overwrite: false,
            state: Mutex::new(TaskState {
                status: TaskStatus::Pending,
                last_error: None,
            }),
            bytes_last_second: AtomicU64::new(0),
            bytes_written: AtomicU64::new(0),
            attempts: AtomicU32::new(0),
            on_finished: Mutex::new(None),
        }
    }

    /// Re-download even if `local_path` already exists.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Hook run at most once, when the task ends `Finished` or `Skipped`.
    pub fn on_finished<F>(self, hook: F) -> Self
    where
        F: FnOnce(&Task) + Send + 'static,
    {
        *self
            .on_finished
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Box::new(hook));
        self
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    pub fn local_path(&self) -> &Path {
        &self.local_path
    }

    pub fn is_overwrite(&self) -> bool {
        self.overwrite
    }

    pub fn status(&self) -> TaskStatus {
        self.lock_state().status
    }

    /// Error behind a `Failed` status. `None` for every other status.
    pub fn last_error(&self) -> Option<Arc<TaskError>> {
        self.lock_state().last_error.clone()
    }

    /// Bytes this task wrote during the last full second; 0 once it ends.
    pub fn bytes_last_second(&self) -> u64 {
        self.bytes_last_second.load(Ordering::Relaxed)
    }

    /// Bytes received into the `.part` file by this run. Bytes resumed from an
    /// earlier run are not counted; bytes later discarded by a restart from
    /// zero are. Use the file's size for what actually landed on disk.
    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    /// HTTP attempts made so far.
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, TaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pending → Running. Returns false if the task already ended.
    pub(crate) fn begin(&self) -> bool {
        let mut st = self.lock_state();
        if st.status.is_terminal() {
            return false;
        }
        st.status = TaskStatus::Running;
        true
    }

    /// Move to a terminal status. Ignored if the task already ended. The
    /// completion hook runs after the state lock is released.
    pub(crate) fn complete(&self, status: TaskStatus, error: Option<TaskError>) -> bool {
        debug_assert!(status.is_terminal());
        {
            let mut st = self.lock_state();
            if st.status.is_terminal() {
                return false;
            }
            st.status = status;
            st.last_error = error.map(Arc::new);
        }
        self.bytes_last_second.store(0, Ordering::Relaxed);
        if matches!(status, TaskStatus::Finished | TaskStatus::Skipped) {
            let hook = self
                .on_finished
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            if let Some(hook) = hook {
                hook(self);
            }
        }
        true
    }

    pub(crate) fn set_bytes_last_second(&self, n: u64) {
        self.bytes_last_second.store(n, Ordering::Relaxed);
    }

    pub(crate) fn add_bytes_written(&self, n: u64) {
        self.bytes_written.fetch_add(n, Ordering::Relaxed);
    }

    /// Count an attempt; returns its 1-based number.
    pub(crate) fn record_attempt(&self) -> u32 {
        self.attempts.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("url", &self.request.url())
            .field("local_path", &self.local_path)
            .field("overwrite", &self.overwrite)
            .field("status", &self.status())
            .field("attempts", &self.attempts())
            .finish()
    }
}
