//! Background downloads: one task per request, each writing into its own
//! job directory before the result is moved into the flat download root.

use std::{
    io,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    extractor::{DownloadOptions, Extractor, ExtractorError},
    progress::{DownloadProgress, ProgressStore},
    security::sanitize_file_name,
};

/// Scratch space for in-flight downloads, relative to the download root.
pub const JOBS_DIR: &str = ".jobs";

/// Names that `DELETE /api/download/{name}` cannot reach because static
/// routes share the prefix.
const ROUTE_NAMES: &[&str] = &["status", "cleanup"];

const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Clone)]
pub struct DownloadManager {
    inner: Arc<DownloadManagerInner>,
}

struct DownloadManagerInner {
    store: ProgressStore,
    extractor: Extractor,
    download_dir: PathBuf,
    // Serializes the pick-a-free-name-then-rename step.
    finalize: AsyncMutex<()>,
}

impl DownloadManager {
    pub fn new(extractor: Extractor, download_dir: impl Into<PathBuf>) -> Self {
        Self {
            inner: Arc::new(DownloadManagerInner {
                store: ProgressStore::new(),
                extractor,
                download_dir: download_dir.into(),
                finalize: AsyncMutex::new(()),
            }),
        }
    }

    pub fn extractor(&self) -> &Extractor {
        &self.inner.extractor
    }

    /// Registers a new download and returns its id without waiting for the
    /// extractor. Callers validate the URL beforehand.
    pub fn start(&self, options: DownloadOptions) -> String {
        let id = Uuid::new_v4().to_string();
        let cancel = self.inner.store.insert(&id);
        info!(
            "download {id} started: {} ({}, {})",
            options.url,
            options.format.as_str(),
            options.quality
        );

        let inner = self.inner.clone();
        let task_id = id.clone();
        let task = tokio::spawn(async move {
            run_download(inner, task_id, options, cancel).await;
        });
        self.inner.store.attach_task(&id, task);
        id
    }

    pub fn status(&self, id: &str) -> Option<DownloadProgress> {
        self.inner.store.get(id)
    }

    /// Forgets a download, cancelling it when still running, and removes
    /// whatever is left of its job directory. Returns false for unknown ids.
    pub async fn cleanup(&self, id: &str) -> bool {
        if self.inner.store.remove(id).is_none() {
            return false;
        }
        let job_dir = self.inner.job_dir(id);
        match tokio::fs::remove_dir_all(&job_dir).await {
            Ok(()) => debug!("removed job directory {}", job_dir.display()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => debug!("could not remove {}: {err}", job_dir.display()),
        }
        info!("download {id} cleaned up");
        true
    }

    /// Cancels every running download and waits briefly for the tasks to
    /// record their final state.
    pub async fn shutdown(&self) {
        let tasks = self.inner.store.take_tasks();
        self.inner.store.cancel_all();
        if tasks.is_empty() {
            return;
        }
        info!("cancelling {} download task(s)", tasks.len());
        let drain = async {
            for task in tasks {
                if let Err(err) = task.await {
                    warn!("download task ended abnormally: {err}");
                }
            }
        };
        if tokio::time::timeout(SHUTDOWN_GRACE, drain).await.is_err() {
            warn!("download tasks did not finish within {SHUTDOWN_GRACE:?}");
        }
    }
}

impl DownloadManagerInner {
    fn job_dir(&self, id: &str) -> PathBuf {
        self.download_dir.join(JOBS_DIR).join(id)
    }
}

async fn run_download(
    inner: Arc<DownloadManagerInner>,
    id: String,
    options: DownloadOptions,
    cancel: CancellationToken,
) {
    let job_dir = inner.job_dir(&id);
    let outcome = perform_download(&inner, &id, &options, &job_dir, &cancel).await;

    match outcome {
        Ok(file_name) => {
            info!("download {id} completed: {file_name}");
            inner.store.update(&id, |progress| progress.complete(file_name));
        }
        Err(err) => {
            if matches!(err, ExtractorError::Cancelled) {
                info!("download {id} cancelled");
            } else {
                error!("download {id} failed: {err}");
            }
            let message = err.to_string();
            inner.store.update(&id, |progress| progress.fail(message));
        }
    }

    if let Err(err) = tokio::fs::remove_dir_all(&job_dir).await
        && err.kind() != io::ErrorKind::NotFound
    {
        warn!("could not remove job directory {}: {err}", job_dir.display());
    }
}

async fn perform_download(
    inner: &DownloadManagerInner,
    id: &str,
    options: &DownloadOptions,
    job_dir: &Path,
    cancel: &CancellationToken,
) -> Result<String, ExtractorError> {
    tokio::fs::create_dir_all(job_dir).await?;

    let produced = inner
        .extractor
        .download(options, job_dir, cancel, |update| {
            inner.store.update(id, |progress| progress.apply(update));
        })
        .await?;

    if cancel.is_cancelled() {
        return Err(ExtractorError::Cancelled);
    }

    let _guard = inner.finalize.lock().await;
    finalize_output(&produced, &inner.download_dir).await
}

/// Moves the produced file into the flat directory under a sanitized,
/// non-colliding name and returns that name.
async fn finalize_output(produced: &Path, download_dir: &Path) -> Result<String, ExtractorError> {
    let raw_name = produced
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or(ExtractorError::NoOutput)?;
    let mut file_name = sanitize_file_name(&raw_name);
    if ROUTE_NAMES.contains(&file_name.as_str()) {
        file_name.push('_');
    }
    let destination = unique_destination(download_dir, &file_name).await?;

    tokio::fs::rename(produced, &destination).await?;
    Ok(destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or(file_name))
}

/// `name`, or `stem (n).ext` for the first free n.
async fn unique_destination(dir: &Path, name: &str) -> io::Result<PathBuf> {
    let candidate = dir.join(name);
    if !tokio::fs::try_exists(&candidate).await? {
        return Ok(candidate);
    }

    let (stem, extension) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    };
    for counter in 1.. {
        let numbered = match extension {
            Some(ext) => format!("{stem} ({counter}).{ext}"),
            None => format!("{stem} ({counter})"),
        };
        let candidate = dir.join(numbered);
        if !tokio::fs::try_exists(&candidate).await? {
            return Ok(candidate);
        }
    }
    unreachable!("counter range is unbounded")
}
