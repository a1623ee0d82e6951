//! Download engine façade: bounded queue, worker pool, global meter.
//!
//! A `Downloader` owns a fixed-size pool of OS threads. Each worker pulls a
//! task off the bounded queue, runs the resumable transfer to a terminal
//! status, and marks it done on the shared wait-group. `start` and `stop`
//! bracket a "session"; every session has its own stop flag and meter, so a
//! stopped downloader can be started again.

mod queue;
mod transfer;
mod wait_group;

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::config::BowerbirdConfig;
use crate::meter::{spawn_global_meter, ByteRate, METER_TICK};
use crate::retry::{RetryPolicy, TaskError};
use crate::task::{Task, TaskStatus};
use crate::transport::{HttpClient, Transport};

use queue::TaskQueue;
use transfer::{run_task, TransferContext};
use wait_group::{DoneGuard, WaitGroup};

/// Workers started by `start` unless configured otherwise.
pub const DEFAULT_MAX_WORKERS: usize = 4;
/// Tasks that may sit in the queue before `add` hands off to the feeder thread.
pub const DEFAULT_QUEUE_CAPACITY: usize = 16;

/// Tunables for a `Downloader`. Fixed once `build` is called.
pub struct DownloaderBuilder {
    transport: Option<Arc<dyn Transport>>,
    retry: RetryPolicy,
    max_workers: usize,
    queue_capacity: usize,
}

impl Default for DownloaderBuilder {
    fn default() -> Self {
        Self {
            transport: None,
            retry: RetryPolicy::default(),
            max_workers: DEFAULT_MAX_WORKERS,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

impl DownloaderBuilder {
    /// HTTP client shared by every worker. Defaults to a plain `HttpClient`.
    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Number of worker threads; clamped to at least one.
    pub fn max_workers(mut self, n: usize) -> Self {
        self.max_workers = n.max(1);
        self
    }

    pub fn queue_capacity(mut self, n: usize) -> Self {
        self.queue_capacity = n.max(1);
        self
    }

    pub fn build(self) -> Downloader {
        let transport: Arc<dyn Transport> = match self.transport {
            Some(t) => t,
            None => Arc::new(HttpClient::default()),
        };
        Downloader {
            shared: Arc::new(Shared {
                transport,
                retry: self.retry,
                max_workers: self.max_workers,
                queue: Arc::new(TaskQueue::new(self.queue_capacity)),
                feeder: Mutex::new(None),
                pending: WaitGroup::default(),
                session: Mutex::new(None),
            }),
        }
    }
}

struct Shared {
    transport: Arc<dyn Transport>,
    retry: RetryPolicy,
    max_workers: usize,
    queue: Arc<TaskQueue>,
    /// Overflow channel into the queue; its thread is spawned on first use.
    feeder: Mutex<Option<Sender<Arc<Task>>>>,
    /// Tasks added and not yet terminal.
    pending: WaitGroup,
    session: Mutex<Option<Session>>,
}

/// State of one `start`..`stop` run of the pool.
struct Session {
    stop: Arc<AtomicBool>,
    gauge: ByteRate,
}

/// Concurrent, resumable file downloader.
///
/// ```no_run
/// use std::sync::Arc;
/// use bowerbird_core::{Downloader, HttpClient, Request, Task};
///
/// let dl = Downloader::new(Arc::new(HttpClient::default()));
/// dl.start();
/// dl.add(Arc::new(Task::new(Request::get("https://example.com/a.jpg"), "/tmp/a.jpg")));
/// dl.wait();
/// dl.stop();
/// ```
#[derive(Clone)]
pub struct Downloader {
    shared: Arc<Shared>,
}

impl Downloader {
    /// Downloader with default tunables over `transport`.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::builder().transport(transport).build()
    }

    pub fn builder() -> DownloaderBuilder {
        DownloaderBuilder::default()
    }

    /// Downloader using the `[download]` and `[network]` settings of `cfg`.
    pub fn from_config(cfg: &BowerbirdConfig) -> Self {
        Self::builder()
            .transport(Arc::new(cfg.network.http_client()))
            .retry(cfg.network.retry_policy())
            .max_workers(cfg.download.max_workers)
            .build()
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.shared.retry
    }

    pub fn max_workers(&self) -> usize {
        self.shared.max_workers
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.shared
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Launch the worker pool and the metering thread. No effect while a
    /// session is already running.
    pub fn start(&self) {
        let mut session = self.lock_session();
        if session.is_some() {
            return;
        }
        let stop = Arc::new(AtomicBool::new(false));
        let gauge = ByteRate::default();
        let (bytes_tx, _meter) = spawn_global_meter(gauge.clone(), Arc::clone(&stop), METER_TICK);
        for id in 0..self.shared.max_workers {
            let shared = Arc::clone(&self.shared);
            let stop = Arc::clone(&stop);
            let bytes_tx = bytes_tx.clone();
            std::thread::spawn(move || worker_loop(id, &shared, &stop, &bytes_tx));
        }
        tracing::info!(
            workers = self.shared.max_workers,
            tries_max = self.shared.retry.tries_max,
            "downloader started"
        );
        *session = Some(Session { stop, gauge });
    }

    /// Stop dispatching new tasks and shut down the meter. In-flight
    /// transfers are not interrupted; their workers exit once they finish.
    /// Queued tasks stay queued for the next `start`.
    pub fn stop(&self) {
        let Some(session) = self.lock_session().take() else {
            return;
        };
        session.stop.store(true, Ordering::Release);
        self.shared.queue.wake_all();
        tracing::info!(
            outstanding = self.outstanding(),
            queued = self.shared.queue.len(),
            "downloader stopped"
        );
    }

    pub fn is_running(&self) -> bool {
        self.lock_session().is_some()
    }

    /// Register `task` and enqueue it. Returns without waiting for queue room:
    /// overflow goes through a channel to a single feeder thread that blocks
    /// on the queue instead.
    pub fn add(&self, task: Arc<Task>) {
        self.shared.pending.add();
        tracing::debug!(url = task.request().url(), path = %task.local_path().display(), "task added");
        let mut feeder = self
            .shared
            .feeder
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // Once overflow started, keep FIFO by routing everything through it.
        let task = match feeder.as_ref() {
            Some(tx) => match tx.send(task) {
                Ok(()) => return,
                Err(mpsc::SendError(task)) => task,
            },
            None => match self.shared.queue.try_push(task) {
                Ok(()) => return,
                Err(task) => task,
            },
        };
        match spawn_feeder(Arc::clone(&self.shared.queue)) {
            Ok(tx) => {
                // A fresh receiver is alive, so this cannot fail.
                let _ = tx.send(task);
                *feeder = Some(tx);
            }
            Err(e) => {
                tracing::warn!("feeder thread unavailable, enqueueing inline: {}", e);
                *feeder = None;
                drop(feeder);
                self.shared.queue.push(task);
            }
        }
    }

    /// Block until every added task is terminal. Returns at once if none are
    /// outstanding.
    pub fn wait(&self) {
        self.shared.pending.wait();
    }

    /// `wait` with an upper bound; `true` if everything drained in time.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        self.shared.pending.wait_timeout(timeout)
    }

    /// Tasks added and not yet terminal.
    pub fn outstanding(&self) -> usize {
        self.shared.pending.count()
    }

    /// Bytes written by all workers during the last full second. 0 when the
    /// downloader is not running.
    pub fn bytes_last_sec(&self) -> u64 {
        self.lock_session()
            .as_ref()
            .map(|s| s.gauge.get())
            .unwrap_or(0)
    }

    /// Run `task` on the calling thread, bypassing the queue and the global
    /// meter. The outcome is recorded on the task.
    pub fn download(&self, task: &Task) {
        let ctx = TransferContext {
            transport: self.shared.transport.as_ref(),
            retry: &self.shared.retry,
            bytes_tx: None,
        };
        run_task(task, &ctx);
    }
}

/// Thread that moves overflow tasks into the bounded queue, blocking while it
/// is full. Exits once the owning `Downloader` is gone and the channel drained.
fn spawn_feeder(queue: Arc<TaskQueue>) -> std::io::Result<Sender<Arc<Task>>> {
    let (tx, rx) = mpsc::channel::<Arc<Task>>();
    std::thread::Builder::new()
        .name("bowerbird-feeder".to_string())
        .spawn(move || {
            for task in rx {
                queue.push(task);
            }
            tracing::debug!("feeder exiting");
        })?;
    Ok(tx)
}

fn worker_loop(id: usize, shared: &Shared, stop: &AtomicBool, bytes_tx: &Sender<u64>) {
    tracing::debug!(worker = id, "worker started");
    let ctx = TransferContext {
        transport: shared.transport.as_ref(),
        retry: &shared.retry,
        bytes_tx: Some(bytes_tx),
    };
    while let Some(task) = shared.queue.pop(stop) {
        let _done = DoneGuard(&shared.pending);
        if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| run_task(&task, &ctx))) {
            let message = panic_message(payload.as_ref());
            tracing::error!(worker = id, path = %task.local_path().display(), "task panicked: {}", message);
            task.complete(TaskStatus::Failed, Some(TaskError::Panicked(message)));
        }
    }
    tracing::debug!(worker = id, "worker exiting");
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::TransportError;
    use crate::transport::{BodySink, Request, ResponseHead};
    use std::sync::atomic::AtomicUsize;

    /// Serves `len` zero bytes for every request.
    struct Zeros {
        len: usize,
        calls: AtomicUsize,
    }

    impl Transport for Zeros {
        fn execute(&self, _req: &Request, sink: &mut dyn BodySink) -> Result<ResponseHead, TransportError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let head = ResponseHead::new(200, Some(self.len as u64));
            sink.start(&head).map_err(TransportError::Sink)?;
            sink.write(&vec![0u8; self.len]).map_err(TransportError::Sink)?;
            Ok(head)
        }
    }

    fn zeros(len: usize) -> Arc<Zeros> {
        Arc::new(Zeros {
            len,
            calls: AtomicUsize::new(0),
        })
    }

    #[test]
    fn builder_clamps_tunables() {
        let dl = Downloader::builder().max_workers(0).queue_capacity(0).build();
        assert_eq!(dl.max_workers(), 1);
        assert_eq!(dl.retry_policy().tries_max, 5);
    }

    #[test]
    fn start_is_idempotent_and_restartable() {
        let dl = Downloader::new(zeros(1));
        assert!(!dl.is_running());
        dl.start();
        dl.start();
        assert!(dl.is_running());
        dl.stop();
        assert!(!dl.is_running());
        assert_eq!(dl.bytes_last_sec(), 0);
        dl.stop();
        dl.start();
        assert!(dl.is_running());
        dl.stop();
    }

    #[test]
    fn wait_returns_immediately_without_tasks() {
        let dl = Downloader::new(zeros(1));
        dl.wait();
        assert!(dl.wait_timeout(Duration::ZERO));
    }

    #[test]
    fn add_beyond_queue_capacity_does_not_block() {
        let dir = tempfile::tempdir().unwrap();
        let transport = zeros(16);
        let dl = Downloader::builder()
            .transport(transport.clone())
            .queue_capacity(1)
            .max_workers(2)
            .build();
        // Not started: the queue fills and the rest go to feeder threads.
        let tasks: Vec<_> = (0..6)
            .map(|i| Arc::new(Task::new(Request::get("http://x/"), dir.path().join(format!("{i}.bin")))))
            .collect();
        for t in &tasks {
            dl.add(Arc::clone(t));
        }
        assert_eq!(dl.outstanding(), 6);
        dl.start();
        assert!(dl.wait_timeout(Duration::from_secs(10)));
        dl.stop();
        assert!(tasks.iter().all(|t| t.status() == TaskStatus::Finished));
        assert_eq!(transport.calls.load(Ordering::SeqCst), 6);
    }

    #[test]
    fn panicking_hook_does_not_kill_the_pool() {
        let dir = tempfile::tempdir().unwrap();
        let dl = Downloader::builder().transport(zeros(4)).max_workers(1).build();
        dl.start();
        let bad = Arc::new(
            Task::new(Request::get("http://x/"), dir.path().join("bad.bin"))
                .on_finished(|_| panic!("hook exploded")),
        );
        let good = Arc::new(Task::new(Request::get("http://x/"), dir.path().join("good.bin")));
        dl.add(Arc::clone(&bad));
        dl.add(Arc::clone(&good));
        assert!(dl.wait_timeout(Duration::from_secs(10)));
        dl.stop();
        assert_eq!(bad.status(), TaskStatus::Finished);
        assert_eq!(good.status(), TaskStatus::Finished);
    }

    #[test]
    fn direct_download_runs_on_caller_thread() {
        let dir = tempfile::tempdir().unwrap();
        let dl = Downloader::new(zeros(8));
        let task = Task::new(Request::get("http://x/"), dir.path().join("a.bin"));
        dl.download(&task);
        assert_eq!(task.status(), TaskStatus::Finished);
        assert_eq!(std::fs::read(task.local_path()).unwrap().len(), 8);
    }
}
