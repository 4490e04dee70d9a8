//! In-memory progress records, keyed by download identifier.

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::extractor::ProgressUpdate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadState {
    Downloading,
    Completed,
    Error,
}

/// Snapshot returned by the status endpoint.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub state: DownloadState,
    pub progress: u8,
    pub file_path: Option<String>,
    pub error: Option<String>,
    pub speed: Option<String>,
    pub eta: Option<String>,
}

impl DownloadProgress {
    pub fn started() -> Self {
        Self {
            state: DownloadState::Downloading,
            progress: 0,
            file_path: None,
            error: None,
            speed: None,
            eta: None,
        }
    }

    /// Folds a parsed progress line in. Terminal records are left alone.
    pub fn apply(&mut self, update: ProgressUpdate) {
        if self.state != DownloadState::Downloading {
            return;
        }
        self.progress = update.percent.min(100);
        if update.speed.is_some() {
            self.speed = update.speed;
        }
        if update.eta.is_some() {
            self.eta = update.eta;
        }
    }

    pub fn complete(&mut self, file_name: impl Into<String>) {
        self.state = DownloadState::Completed;
        self.progress = 100;
        self.file_path = Some(file_name.into());
        self.error = None;
        self.eta = None;
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.state = DownloadState::Error;
        self.error = Some(if message.trim().is_empty() {
            "Download failed".to_string()
        } else {
            message
        });
        self.eta = None;
    }

    pub fn is_finished(&self) -> bool {
        self.state != DownloadState::Downloading
    }
}

struct Entry {
    progress: DownloadProgress,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

/// Concurrent map from download id to its record, cancellation token and
/// task handle. Written by one background task per id, read by any poller.
#[derive(Default)]
pub struct ProgressStore {
    entries: RwLock<HashMap<String, Entry>>,
}

impl ProgressStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a fresh `downloading` record and returns its token.
    pub fn insert(&self, id: &str) -> CancellationToken {
        let cancel = CancellationToken::new();
        self.entries.write().insert(
            id.to_string(),
            Entry {
                progress: DownloadProgress::started(),
                cancel: cancel.clone(),
                task: None,
            },
        );
        cancel
    }

    /// Keeps the handle of the task driving `id`. Returns false when the
    /// record was removed before the handle arrived.
    pub fn attach_task(&self, id: &str, task: JoinHandle<()>) -> bool {
        match self.entries.write().get_mut(id) {
            Some(entry) => {
                entry.task = Some(task);
                true
            }
            None => false,
        }
    }

    pub fn get(&self, id: &str) -> Option<DownloadProgress> {
        self.entries
            .read()
            .get(id)
            .map(|entry| entry.progress.clone())
    }

    /// Mutates the record in place; a no-op for unknown ids.
    pub fn update<F>(&self, id: &str, apply: F)
    where
        F: FnOnce(&mut DownloadProgress),
    {
        if let Some(entry) = self.entries.write().get_mut(id) {
            apply(&mut entry.progress);
        }
    }

    /// Drops the record and cancels its task when still running.
    pub fn remove(&self, id: &str) -> Option<DownloadProgress> {
        let entry = self.entries.write().remove(id)?;
        entry.cancel.cancel();
        Some(entry.progress)
    }

    pub fn cancel_all(&self) {
        for entry in self.entries.read().values() {
            entry.cancel.cancel();
        }
    }

    /// Hands out every task handle still held so the caller can await them.
    pub fn take_tasks(&self) -> Vec<JoinHandle<()>> {
        self.entries
            .write()
            .values_mut()
            .filter_map(|entry| entry.task.take())
            .collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.entries.read().len()
    }

    #[cfg(test)]
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
