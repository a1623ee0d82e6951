//! `bowerbird get` – download URLs through the worker pool.

use anyhow::{bail, Context, Result};
use bowerbird_core::config::BowerbirdConfig;
use bowerbird_core::url_model::derive_filename;
use bowerbird_core::{CancelToken, Downloader, Request, Task, TaskStatus};
use serde::Serialize;
use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// How often the rate line is redrawn.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Default)]
pub struct GetArgs {
    pub urls: Vec<String>,
    pub dir: Option<PathBuf>,
    pub workers: Option<usize>,
    pub overwrite: bool,
    pub headers: Vec<String>,
    pub manifest: Option<PathBuf>,
}

/// One line of the `--manifest` file.
#[derive(Debug, Serialize)]
struct ManifestEntry<'a> {
    url: &'a str,
    path: String,
    status: &'static str,
    bytes: u64,
}

/// Split `"Name: value"` into its parts.
pub(crate) fn parse_header(raw: &str) -> Result<(String, String)> {
    let Some((name, value)) = raw.split_once(':') else {
        bail!("invalid header {:?}: expected \"Name: value\"", raw);
    };
    let name = name.trim();
    if name.is_empty() {
        bail!("invalid header {:?}: empty name", raw);
    }
    Ok((name.to_string(), value.trim().to_string()))
}

/// Human-readable byte rate, e.g. `1.50 MiB/s`.
pub(crate) fn format_rate(bytes_per_sec: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes_per_sec as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} B/s", bytes_per_sec)
    } else {
        format!("{:.2} {}/s", value, UNITS[unit])
    }
}

/// Return `name`, or `stem-N.ext` with the smallest free N, and claim it.
/// Two URLs with the same last segment must not share one `.part` file.
pub(crate) fn unique_name(name: &str, taken: &mut HashSet<String>) -> String {
    if taken.insert(name.to_string()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(i) if i > 0 => name.split_at(i),
        _ => (name, ""),
    };
    let mut n = 1u32;
    loop {
        let candidate = format!("{}-{}{}", stem, n, ext);
        if taken.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn status_label(status: TaskStatus) -> &'static str {
    match status {
        TaskStatus::Pending => "pending",
        TaskStatus::Running => "running",
        TaskStatus::Finished => "finished",
        TaskStatus::Skipped => "skipped",
        TaskStatus::Canceled => "canceled",
        TaskStatus::Failed => "failed",
    }
}

fn open_manifest(path: &Path) -> Result<Arc<Mutex<File>>> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("opening manifest {}", path.display()))?;
    Ok(Arc::new(Mutex::new(file)))
}

fn append_manifest(manifest: &Mutex<File>, task: &Task) {
    let entry = ManifestEntry {
        url: task.request().url(),
        path: task.local_path().display().to_string(),
        status: status_label(task.status()),
        bytes: fs::metadata(task.local_path()).map(|m| m.len()).unwrap_or(0),
    };
    let line = match serde_json::to_string(&entry) {
        Ok(line) => line,
        Err(e) => {
            tracing::warn!("manifest entry not serialized: {}", e);
            return;
        }
    };
    let mut file = manifest.lock().unwrap_or_else(|e| e.into_inner());
    if let Err(e) = writeln!(file, "{}", line) {
        tracing::warn!("manifest write failed: {}", e);
    }
}

pub async fn run_get(cfg: &BowerbirdConfig, args: GetArgs) -> Result<()> {
    let headers = args
        .headers
        .iter()
        .map(|h| parse_header(h))
        .collect::<Result<Vec<_>>>()?;
    let dir = match args.dir {
        Some(dir) => dir,
        None => cfg.download.root_dir_or_default()?,
    };
    fs::create_dir_all(&dir).with_context(|| format!("creating {}", dir.display()))?;
    let manifest = args.manifest.as_deref().map(open_manifest).transpose()?;

    let mut cfg = cfg.clone();
    if let Some(workers) = args.workers {
        cfg.download.max_workers = workers;
    }
    let overwrite = args.overwrite || cfg.download.overwrite;
    let dl = Downloader::from_config(&cfg);

    let cancel = CancelToken::new();
    let mut taken = HashSet::new();
    let tasks: Vec<Arc<Task>> = args
        .urls
        .iter()
        .map(|url| {
            let name = unique_name(&derive_filename(url, cfg.download.windows_safe_names), &mut taken);
            let request = headers
                .iter()
                .fold(Request::get(url.as_str()), |req, (k, v)| req.header(k.as_str(), v.as_str()))
                .cancel_with(cancel.clone());
            let mut task = Task::new(request, dir.join(name)).overwrite(overwrite);
            if let Some(manifest) = &manifest {
                let manifest = Arc::clone(manifest);
                task = task.on_finished(move |t| append_manifest(&manifest, t));
            }
            Arc::new(task)
        })
        .collect();

    dl.start();
    for task in &tasks {
        dl.add(Arc::clone(task));
    }
    let total = tasks.len();

    let progress = {
        let dl = dl.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
            loop {
                ticker.tick().await;
                let done = total - dl.outstanding().min(total);
                eprint!("\r  {}/{} done  {:>12}  ", done, total, format_rate(dl.bytes_last_sec()));
            }
        })
    };

    let mut waiter = {
        let dl = dl.clone();
        tokio::task::spawn_blocking(move || dl.wait())
    };
    tokio::select! {
        res = &mut waiter => res?,
        _ = tokio::signal::ctrl_c() => {
            eprintln!("\ninterrupted, canceling downloads...");
            cancel.cancel();
            waiter.await?;
        }
    }
    progress.abort();
    eprintln!();
    dl.stop();

    let mut failed = 0usize;
    for task in &tasks {
        let status = task.status();
        match task.last_error() {
            Some(err) => {
                failed += 1;
                println!("{:<9} {}  ({})", status_label(status), task.local_path().display(), err);
            }
            None => println!("{:<9} {}", status_label(status), task.local_path().display()),
        }
    }
    if cancel.is_canceled() {
        bail!("canceled");
    }
    if failed > 0 {
        bail!("{} of {} downloads failed", failed, total);
    }
    Ok(())
}
