//! Concurrent, resumable HTTP download engine for the bowerbird media archiver.
//!
//! Callers build fully-formed [`Request`]s, wrap each in a [`Task`] with its
//! destination path, and hand them to a [`Downloader`]. Workers stream bodies
//! into `<path>.part`, resume with `Range` after transient failures, and rename
//! into place only once the file is complete.

pub mod config;
pub mod downloader;
pub mod logging;
pub mod meter;
pub mod retry;
pub mod storage;
pub mod task;
pub mod transport;
pub mod url_model;

pub use config::BowerbirdConfig;
pub use downloader::{Downloader, DownloaderBuilder};
pub use meter::ByteRate;
pub use retry::{default_backoff, Backoff, RetryPolicy, TaskError, TransportError};
pub use task::{Task, TaskStatus};
pub use transport::{BodySink, CancelToken, HttpClient, Request, ResponseHead, Transport};
