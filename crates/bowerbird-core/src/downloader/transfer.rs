//! Resumable, retried single-task transfer with atomic finalize.
//!
//! Bytes go to `<local_path>.part` (append mode). Each attempt clones the
//! task's request, adding `Range: bytes=<len>-` once the part file is
//! non-empty. Only a complete, synced file is renamed to `local_path`.

use std::io;
use std::sync::mpsc::Sender;
use std::time::Instant;

use crate::meter::RateWindow;
use crate::retry::{classify_http_status, classify_transport_error, RetryPolicy, TaskError};
use crate::storage::PartFile;
use crate::task::{Task, TaskStatus};
use crate::transport::{BodySink, ResponseHead, Transport};

/// How much of an error response body is kept for the task's error message.
const DIAGNOSTIC_LIMIT: usize = 512;

/// Everything a worker needs besides the task itself.
pub(crate) struct TransferContext<'a> {
    pub(crate) transport: &'a dyn Transport,
    pub(crate) retry: &'a RetryPolicy,
    /// Global byte-event channel; `None` when run outside a started session.
    pub(crate) bytes_tx: Option<&'a Sender<u64>>,
}

/// Run `task` to a terminal status. Never returns an error: the outcome is
/// recorded on the task.
pub(crate) fn run_task(task: &Task, ctx: &TransferContext<'_>) {
    if task.status().is_terminal() {
        return;
    }
    let path = task.local_path();
    if !task.is_overwrite() && path.exists() {
        tracing::debug!(path = %path.display(), "destination exists, skipping");
        task.complete(TaskStatus::Skipped, None);
        return;
    }
    if !task.begin() {
        return;
    }
    tracing::debug!(url = task.request().url(), path = %path.display(), "task started");

    match transfer(task, ctx) {
        Ok(()) => {
            tracing::info!(
                path = %path.display(),
                bytes = task.bytes_written(),
                attempts = task.attempts(),
                "task finished"
            );
            task.complete(TaskStatus::Finished, None);
        }
        Err(TaskError::Canceled) => {
            tracing::info!(path = %path.display(), attempts = task.attempts(), "task canceled");
            task.complete(TaskStatus::Canceled, None);
        }
        Err(e) => {
            tracing::warn!(
                url = task.request().url(),
                path = %path.display(),
                attempts = task.attempts(),
                "task failed: {}",
                e
            );
            task.complete(TaskStatus::Failed, Some(e));
        }
    }
}

fn transfer(task: &Task, ctx: &TransferContext<'_>) -> Result<(), TaskError> {
    let final_path = task.local_path();
    let cancel = task.request().cancel_token();
    if cancel.is_canceled() {
        return Err(TaskError::Canceled);
    }
    let mut part = PartFile::open_append(final_path)?;
    let mut window = RateWindow::new(Instant::now());
    if !part.is_empty() {
        tracing::debug!(offset = part.len(), path = %final_path.display(), "resuming from part file");
    }

    let mut attempt = 0u32;
    loop {
        attempt += 1;
        if attempt > 1 {
            let wait = ctx.retry.wait(attempt - 2);
            tracing::debug!(attempt, ?wait, url = task.request().url(), "backing off before retry");
            if cancel.wait_timeout(wait) {
                return Err(TaskError::Canceled);
            }
        }
        if cancel.is_canceled() {
            return Err(TaskError::Canceled);
        }
        task.record_attempt();

        let error = match attempt_once(task, ctx, &mut part, &mut window)? {
            AttemptOutcome::Complete => {
                part.finalize(final_path)?;
                return Ok(());
            }
            AttemptOutcome::Retry(e) => e,
        };
        if !ctx.retry.has_attempts_left(attempt) {
            return Err(error);
        }
        tracing::debug!(attempt, url = task.request().url(), "attempt failed, will retry: {}", error);
    }
}

enum AttemptOutcome {
    /// Body fully on disk and synced; ready to rename.
    Complete,
    /// Transient failure; the loop may try again.
    Retry(TaskError),
}

/// One HTTP attempt. `Err` is terminal for the task.
fn attempt_once(
    task: &Task,
    ctx: &TransferContext<'_>,
    part: &mut PartFile,
    window: &mut RateWindow,
) -> Result<AttemptOutcome, TaskError> {
    let offset = part.len();
    let request = if offset > 0 {
        task.request()
            .with_header("Range", &format!("bytes={}-", offset))
    } else {
        task.request().clone()
    };

    let mut sink = PartSink::new(part, task, ctx.bytes_tx, window, offset > 0);
    let result = ctx.transport.execute(&request, &mut sink);
    let PartSink {
        base,
        diagnostic,
        range_mismatch,
        ..
    } = sink;

    let head = match result {
        Ok(head) => head,
        Err(e) => {
            if !classify_transport_error(&e).is_transient() {
                return Err(e.into());
            }
            // Keep whatever arrived; the next attempt resumes after it.
            part.sync()?;
            return Ok(AttemptOutcome::Retry(e.into()));
        }
    };

    if head.status == 416 && offset > 0 {
        tracing::warn!(offset, path = %part.temp_path().display(), "range not satisfiable, discarding part file");
        part.truncate()?;
        return Ok(AttemptOutcome::Retry(http_error(head.status, &diagnostic)));
    }
    if !head.is_success() {
        let e = http_error(head.status, &diagnostic);
        if classify_http_status(head.status).is_transient() {
            return Ok(AttemptOutcome::Retry(e));
        }
        return Err(e);
    }

    if let Some(e) = range_mismatch {
        // Part file already discarded; the next attempt asks for the whole body.
        return Ok(AttemptOutcome::Retry(e));
    }
    part.sync()?;
    let received = part.len();
    // Unknown length: a clean end of stream is the end of the file.
    if let Some(len) = head.content_length {
        let expected = base.unwrap_or(offset) + len;
        if received != expected {
            return Ok(AttemptOutcome::Retry(TaskError::Incomplete { expected, received }));
        }
    }
    Ok(AttemptOutcome::Complete)
}

fn http_error(status: u32, body: &[u8]) -> TaskError {
    TaskError::Http {
        status,
        message: String::from_utf8_lossy(body).trim().to_string(),
    }
}

/// Routes a response body into the part file (2xx) or a bounded diagnostic
/// buffer (anything else), metering every written chunk.
struct PartSink<'a> {
    part: &'a mut PartFile,
    task: &'a Task,
    bytes_tx: Option<&'a Sender<u64>>,
    window: &'a mut RateWindow,
    ranged: bool,
    to_file: bool,
    /// Part file length when this response's body began.
    base: Option<u64>,
    diagnostic: Vec<u8>,
    range_mismatch: Option<TaskError>,
}

impl<'a> PartSink<'a> {
    fn new(
        part: &'a mut PartFile,
        task: &'a Task,
        bytes_tx: Option<&'a Sender<u64>>,
        window: &'a mut RateWindow,
        ranged: bool,
    ) -> Self {
        Self {
            part,
            task,
            bytes_tx,
            window,
            ranged,
            to_file: false,
            base: None,
            diagnostic: Vec::new(),
            range_mismatch: None,
        }
    }
}

impl BodySink for PartSink<'_> {
    fn start(&mut self, head: &ResponseHead) -> io::Result<()> {
        self.to_file = head.is_success();
        if self.to_file && self.ranged && head.status != 206 {
            tracing::debug!(status = head.status, "server ignored Range, restarting from zero");
            self.part.truncate()?;
        }
        let expected = self.part.len();
        match head.range_start {
            Some(got) if self.to_file && head.status == 206 && got != expected => {
                tracing::warn!(expected, got, "partial content at wrong offset, discarding part file");
                self.part.truncate()?;
                self.to_file = false;
                self.range_mismatch = Some(TaskError::RangeMismatch { expected, got });
            }
            _ => {}
        }
        self.base = Some(self.part.len());
        Ok(())
    }

    fn write(&mut self, chunk: &[u8]) -> io::Result<()> {
        if !self.to_file {
            let room = DIAGNOSTIC_LIMIT.saturating_sub(self.diagnostic.len());
            self.diagnostic
                .extend_from_slice(&chunk[..chunk.len().min(room)]);
            return Ok(());
        }
        self.part.write_chunk(chunk)?;
        let n = chunk.len() as u64;
        self.task.add_bytes_written(n);
        if let Some(last_second) = self.window.record(n, Instant::now()) {
            self.task.set_bytes_last_second(last_second);
        }
        if let Some(tx) = self.bytes_tx {
            let _ = tx.send(n);
        }
        Ok(())
    }
}
