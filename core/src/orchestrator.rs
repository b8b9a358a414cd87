// Upload/analyze orchestrator
//
// Ties the upload queue to the processing tracker: uploaded documents are
// submitted for analysis, and tracker updates flow back into the queue so
// analyzed tasks read as processing until their document drains.

use crate::backend::{BackendClient, HttpBackend};
use crate::config::{BackendConfig, OrchestratorConfig};
use crate::processing::{
    AnalyzeOutcome, JsonFileStore, ProcessingEvent, ProcessingStore, ProcessingTracker,
};
use crate::upload::{UploadEvent, UploadFile, UploadQueue, UploadTask};
use crate::Result;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Everything the UI layer needs to redraw
#[derive(Debug, Clone, PartialEq)]
pub enum OrchestratorEvent {
    Upload(UploadEvent),
    Processing(ProcessingEvent),
}

/// Upload queue plus processing set, driven as one workflow
pub struct Orchestrator {
    queue: UploadQueue,
    tracker: ProcessingTracker,
    events: broadcast::Sender<OrchestratorEvent>,
    listener: Mutex<Option<JoinHandle<()>>>,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        store: Arc<dyn ProcessingStore>,
        config: &OrchestratorConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(512);
        Self {
            queue: UploadQueue::new(backend.clone()),
            tracker: ProcessingTracker::new(backend, store, config.poll_interval),
            events,
            listener: Mutex::new(None),
        }
    }

    /// HTTP backend plus a file store under `config.state_dir`
    pub fn from_config(backends: &BackendConfig, config: &OrchestratorConfig) -> Result<Self> {
        let backend = HttpBackend::new(backends)?.with_chunk_size(config.upload_chunk_size);
        let store = JsonFileStore::new(&config.state_dir);
        Ok(Self::new(Arc::new(backend), Arc::new(store), config))
    }

    pub fn queue(&self) -> &UploadQueue {
        &self.queue
    }

    pub fn tracker(&self) -> &ProcessingTracker {
        &self.tracker
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }

    /// Start relaying events and resume work persisted by a previous run.
    ///
    /// Returns how many documents were resumed. Calling it again only
    /// resumes.
    pub fn start(&self) -> usize {
        {
            let mut listener = self
                .listener
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if listener.is_none() {
                *listener = Some(self.spawn_listener());
            }
        }
        self.tracker.resume()
    }

    fn spawn_listener(&self) -> JoinHandle<()> {
        let mut processing = self.tracker.subscribe();
        let mut uploads = self.queue.subscribe();
        let queue = self.queue.clone();
        let tracker = self.tracker.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = processing.recv() => match received {
                        Ok(event) => {
                            reflect(&queue, &tracker);
                            let _ = events.send(OrchestratorEvent::Processing(event));
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(target: "orchestrator", skipped, "Processing events lagged");
                            reflect(&queue, &tracker);
                        }
                        Err(RecvError::Closed) => break,
                    },
                    received = uploads.recv() => match received {
                        Ok(event) => {
                            let _ = events.send(OrchestratorEvent::Upload(event));
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(target: "orchestrator", skipped, "Upload events lagged");
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
            debug!(target: "orchestrator", "Event listener stopped");
        })
    }

    pub fn enqueue(&self, files: Vec<UploadFile>) -> Vec<String> {
        self.queue.enqueue(files)
    }

    pub fn remove_task(&self, id: &str) -> bool {
        self.queue.remove_task(id)
    }

    pub async fn start_upload(&self) -> usize {
        self.queue.start_upload().await
    }

    pub fn tasks(&self) -> Vec<UploadTask> {
        self.queue.snapshot()
    }

    /// Submit the documents of the given successful tasks for analysis.
    ///
    /// Tasks without a document id are ignored; with none left this makes
    /// no request.
    pub async fn analyze(&self, tasks: &[UploadTask]) -> AnalyzeOutcome {
        let doc_ids: Vec<i64> = tasks
            .iter()
            .filter(|t| t.is_analyzable())
            .filter_map(|t| t.doc_id)
            .collect();
        if doc_ids.is_empty() {
            debug!(target: "orchestrator", "No uploaded documents to analyze");
            return AnalyzeOutcome::Skipped;
        }

        let outcome = self.tracker.analyze(&doc_ids).await;

        let tracked: Vec<i64> = doc_ids
            .into_iter()
            .filter(|id| self.tracker.contains(*id))
            .collect();
        self.queue.mark_processing(&tracked);
        // Polling may have drained the set before the tasks were marked
        reflect(&self.queue, &self.tracker);

        match &outcome {
            AnalyzeOutcome::Submitted => {
                info!(target: "orchestrator", count = tracked.len(), "Documents submitted for analysis")
            }
            AnalyzeOutcome::RolledBack(ids) => {
                warn!(target: "orchestrator", doc_ids = ?ids, "Analysis submission rolled back")
            }
            AnalyzeOutcome::Unacknowledged(error) => {
                warn!(target: "orchestrator", error = %error, "Analysis submission not acknowledged")
            }
            AnalyzeOutcome::Skipped => {}
        }
        outcome
    }

    /// Analyze every successful upload in the queue
    pub async fn analyze_uploaded(&self) -> AnalyzeOutcome {
        let tasks = self.queue.successful();
        self.analyze(&tasks).await
    }

    /// Resolve once the processing set is empty or polling has stopped
    pub async fn wait_until_idle(&self) {
        let mut events = self.tracker.subscribe();
        loop {
            if !self.tracker.is_processing() || !self.tracker.is_polling() {
                break;
            }
            match events.recv().await {
                Ok(ProcessingEvent::Refresh) | Ok(ProcessingEvent::PollFailed { .. }) => break,
                Ok(_) | Err(RecvError::Lagged(_)) => continue,
                Err(RecvError::Closed) => break,
            }
        }
        reflect(&self.queue, &self.tracker);
    }

    /// Stop polling and the event relay; the persisted set is kept
    pub fn shutdown(&self) {
        self.tracker.shutdown();
        if let Some(listener) = self
            .listener
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
        {
            listener.abort();
        }
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Bring task display state in line with the current processing set
fn reflect(queue: &UploadQueue, tracker: &ProcessingTracker) {
    let processing: BTreeSet<i64> = tracker.ids().into_iter().collect();
    queue.settle(&processing);
}
