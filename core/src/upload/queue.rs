// Upload queue: drives pending files through the upload transport
use super::task::{UploadFile, UploadStatus, UploadTask};
use crate::backend::{BackendClient, ProgressFn, UploadReply};
use crate::{DocviewError, Result};
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

pub const NETWORK_ERROR_MESSAGE: &str = "Network error during upload.";
pub const UPLOAD_FAILED_MESSAGE: &str = "Upload failed.";
pub const MISSING_DOCNUMBER_MESSAGE: &str = "Upload response did not include a document number.";
const ABORTED_MESSAGE: &str = "Upload aborted.";

/// Progress and completion notifications for the UI
#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Queued { id: String },
    Progress { id: String, progress: f64 },
    Finished { id: String, status: UploadStatus },
    Removed { id: String },
}

/// Task counts per status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub pending: usize,
    pub uploading: usize,
    pub processing: usize,
    pub success: usize,
    pub error: usize,
}

/// Shared queue of upload tasks
///
/// Cloning is cheap; clones share the same tasks.
#[derive(Clone)]
pub struct UploadQueue {
    tasks: Arc<Mutex<Vec<UploadTask>>>,
    next_id: Arc<AtomicU64>,
    backend: Arc<dyn BackendClient>,
    events: broadcast::Sender<UploadEvent>,
}

impl UploadQueue {
    pub fn new(backend: Arc<dyn BackendClient>) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            tasks: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(AtomicU64::new(0)),
            backend,
            events,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<UploadEvent> {
        self.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<UploadTask>> {
        // A panic while holding the lock cannot leave a task half-written
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: UploadEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    /// Append one pending task per file; returns the new task ids
    pub fn enqueue(&self, files: Vec<UploadFile>) -> Vec<String> {
        let mut ids = Vec::with_capacity(files.len());
        {
            let mut tasks = self.lock();
            for file in files {
                let id = format!("file-{}", self.next_id.fetch_add(1, Ordering::Relaxed));
                debug!(target: "upload", id = %id, file = %file.name, size = file.size(), "Queued file");
                tasks.push(UploadTask::new(id.clone(), file));
                ids.push(id);
            }
        }
        for id in &ids {
            self.emit(UploadEvent::Queued { id: id.clone() });
        }
        ids
    }

    /// Remove a pending or failed task. In-flight and finished tasks stay.
    pub fn remove_task(&self, id: &str) -> bool {
        let removed = {
            let mut tasks = self.lock();
            match tasks.iter().position(|t| t.id == id) {
                Some(idx) if tasks[idx].status.is_removable() => {
                    tasks.remove(idx);
                    true
                }
                Some(idx) => {
                    debug!(target: "upload", id = %id, status = %tasks[idx].status, "Refusing to remove task");
                    false
                }
                None => false,
            }
        };
        if removed {
            self.emit(UploadEvent::Removed { id: id.to_string() });
        }
        removed
    }

    pub fn get(&self, id: &str) -> Option<UploadTask> {
        self.lock().iter().find(|t| t.id == id).cloned()
    }

    pub fn snapshot(&self) -> Vec<UploadTask> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn counts(&self) -> QueueCounts {
        let mut counts = QueueCounts::default();
        for task in self.lock().iter() {
            match task.status {
                UploadStatus::Pending => counts.pending += 1,
                UploadStatus::Uploading => counts.uploading += 1,
                UploadStatus::Processing => counts.processing += 1,
                UploadStatus::Success => counts.success += 1,
                UploadStatus::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn is_uploading(&self) -> bool {
        self.lock()
            .iter()
            .any(|t| t.status == UploadStatus::Uploading)
    }

    /// Successful uploads that carry a document id
    pub fn successful(&self) -> Vec<UploadTask> {
        self.lock()
            .iter()
            .filter(|t| t.is_analyzable())
            .cloned()
            .collect()
    }

    /// Upload every pending task concurrently.
    ///
    /// Returns once each upload started by this call reached success or
    /// error. Tasks in any other state are left alone, so calling this again
    /// never re-issues an upload. Returns the number of uploads started.
    pub async fn start_upload(&self) -> usize {
        let started: Vec<(String, UploadFile)> = {
            let mut tasks = self.lock();
            tasks
                .iter_mut()
                .filter(|t| t.status == UploadStatus::Pending)
                .map(|t| {
                    t.status = UploadStatus::Uploading;
                    t.progress = 0.0;
                    t.error = None;
                    (t.id.clone(), t.file.clone())
                })
                .collect()
        };

        if started.is_empty() {
            return 0;
        }
        info!(target: "upload", count = started.len(), "Starting uploads");

        let mut uploads = JoinSet::new();
        for (id, file) in started.iter().cloned() {
            let queue = self.clone();
            uploads.spawn(async move {
                let progress_queue = queue.clone();
                let progress_id = id.clone();
                let progress: ProgressFn = Arc::new(move |percent| {
                    progress_queue.record_progress(&progress_id, percent);
                });

                let result = queue.backend.upload_document(file, progress).await;
                queue.finish(&id, result);
            });
        }

        while let Some(joined) = uploads.join_next().await {
            if let Err(e) = joined {
                warn!(target: "upload", error = %e, "Upload task ended abnormally");
            }
        }

        // A task that panicked mid-upload must not stay `Uploading` forever
        for (id, _) in &started {
            let still_uploading = self
                .get(id)
                .map(|t| t.status == UploadStatus::Uploading)
                .unwrap_or(false);
            if still_uploading {
                self.finish(id, Err(DocviewError::Transport(ABORTED_MESSAGE.to_string())));
            }
        }

        let counts = self.counts();
        info!(
            target: "upload",
            succeeded = counts.success,
            failed = counts.error,
            "Upload batch finished"
        );
        started.len()
    }

    /// Raise the progress of an uploading task; never moves backwards
    fn record_progress(&self, id: &str, percent: f64) {
        let updated = {
            let mut tasks = self.lock();
            match tasks
                .iter_mut()
                .find(|t| t.id == id && t.status == UploadStatus::Uploading)
            {
                Some(task) => {
                    let percent = if percent.is_finite() { percent.clamp(0.0, 100.0) } else { 0.0 };
                    if percent > task.progress {
                        task.progress = percent;
                        Some(percent)
                    } else {
                        None
                    }
                }
                None => None,
            }
        };
        if let Some(progress) = updated {
            self.emit(UploadEvent::Progress {
                id: id.to_string(),
                progress,
            });
        }
    }

    fn finish(&self, id: &str, result: Result<UploadReply>) {
        let status = {
            let mut tasks = self.lock();
            let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
                return;
            };
            apply_outcome(task, result);
            task.status
        };
        self.emit(UploadEvent::Finished {
            id: id.to_string(),
            status,
        });
    }

    /// Show analyzed uploads as processing
    pub fn mark_processing(&self, doc_ids: &[i64]) {
        let mut tasks = self.lock();
        for task in tasks.iter_mut() {
            if task.status == UploadStatus::Success
                && task.doc_id.map(|d| doc_ids.contains(&d)).unwrap_or(false)
            {
                task.status = UploadStatus::Processing;
            }
        }
    }

    /// Return processing tasks whose document left the processing set to success
    pub fn settle(&self, still_processing: &BTreeSet<i64>) {
        let mut tasks = self.lock();
        for task in tasks.iter_mut() {
            if task.status == UploadStatus::Processing
                && !task
                    .doc_id
                    .map(|d| still_processing.contains(&d))
                    .unwrap_or(false)
            {
                task.status = UploadStatus::Success;
            }
        }
    }
}

/// Terminal state of a task from the transport outcome
fn apply_outcome(task: &mut UploadTask, result: Result<UploadReply>) {
    match result {
        Ok(reply) if reply.success => match reply.docnumber {
            Some(doc_id) => {
                task.status = UploadStatus::Success;
                task.progress = 100.0;
                task.doc_id = Some(doc_id);
                task.error = None;
                info!(target: "upload", id = %task.id, doc_id, "Upload succeeded");
            }
            None => {
                task.status = UploadStatus::Error;
                task.error = Some(MISSING_DOCNUMBER_MESSAGE.to_string());
                warn!(target: "upload", id = %task.id, "Upload succeeded without a document number");
            }
        },
        Ok(reply) => {
            task.status = UploadStatus::Error;
            task.error = Some(reply.error.unwrap_or_else(|| UPLOAD_FAILED_MESSAGE.to_string()));
            warn!(target: "upload", id = %task.id, error = ?task.error, "Backend rejected upload");
        }
        Err(DocviewError::Backend { status, message }) => {
            task.status = UploadStatus::Error;
            task.error = Some(message.unwrap_or_else(|| format!("Server error: {}", status)));
            warn!(target: "upload", id = %task.id, status, "Upload returned server error");
        }
        Err(DocviewError::Transport(e)) => {
            task.status = UploadStatus::Error;
            task.error = Some(NETWORK_ERROR_MESSAGE.to_string());
            warn!(target: "upload", id = %task.id, error = %e, "Upload transport failed");
        }
        Err(e) => {
            task.status = UploadStatus::Error;
            task.error = Some(e.to_string());
            warn!(target: "upload", id = %task.id, error = %e, "Upload failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> UploadTask {
        let mut task = UploadTask::new("file-0".into(), UploadFile::new("a.jpg", vec![0; 10]));
        task.status = UploadStatus::Uploading;
        task.progress = 30.0;
        task
    }

    #[test]
    fn success_records_doc_id() {
        let mut t = task();
        apply_outcome(
            &mut t,
            Ok(UploadReply {
                success: true,
                docnumber: Some(42),
                error: None,
            }),
        );
        assert_eq!(t.status, UploadStatus::Success);
        assert_eq!(t.doc_id, Some(42));
        assert_eq!(t.progress, 100.0);
    }

    #[test]
    fn logical_failure_uses_backend_message_or_default() {
        let mut t = task();
        apply_outcome(
            &mut t,
            Ok(UploadReply {
                success: false,
                docnumber: None,
                error: Some("Duplicate file".into()),
            }),
        );
        assert_eq!(t.status, UploadStatus::Error);
        assert_eq!(t.error.as_deref(), Some("Duplicate file"));

        let mut t = task();
        apply_outcome(&mut t, Ok(UploadReply::default()));
        assert_eq!(t.error.as_deref(), Some(UPLOAD_FAILED_MESSAGE));
        assert_eq!(t.doc_id, None);
    }

    #[test]
    fn server_error_without_message_reports_status() {
        let mut t = task();
        apply_outcome(
            &mut t,
            Err(DocviewError::Backend {
                status: 413,
                message: None,
            }),
        );
        assert_eq!(t.error.as_deref(), Some("Server error: 413"));
    }

    #[test]
    fn transport_failure_is_generic_network_error() {
        let mut t = task();
        apply_outcome(&mut t, Err(DocviewError::Transport("connection reset".into())));
        assert_eq!(t.status, UploadStatus::Error);
        assert_eq!(t.error.as_deref(), Some(NETWORK_ERROR_MESSAGE));
    }

    #[test]
    fn success_without_docnumber_is_an_error() {
        let mut t = task();
        apply_outcome(
            &mut t,
            Ok(UploadReply {
                success: true,
                docnumber: None,
                error: None,
            }),
        );
        assert_eq!(t.status, UploadStatus::Error);
        assert_eq!(t.doc_id, None);
    }
}
