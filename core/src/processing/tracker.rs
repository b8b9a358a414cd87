// Processing tracker: the set of documents under server-side analysis
//
// The set is polled on a fixed interval until it drains. Every change is
// written through to the store; the poll task exists exactly while the set
// is non-empty.

use super::store::ProcessingStore;
use crate::backend::BackendClient;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Notifications for the UI layer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProcessingEvent {
    /// The processing set changed
    Updated { processing: Vec<i64> },
    /// Documents are about to be submitted; listings should be fetched again
    Submitted { doc_ids: Vec<i64> },
    /// The set drained; listings should be fetched again
    Refresh,
    /// Polling stopped because the status request failed; the set was cleared.
    /// A backend error answer is followed by `Refresh`, a transport failure is not.
    PollFailed { error: String },
    /// The submission never reached the backend; these ids were dropped again
    SubmissionRolledBack { doc_ids: Vec<i64> },
}

/// What happened to an `analyze` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeOutcome {
    /// Nothing to analyze; no request was made
    Skipped,
    /// The backend accepted the submission
    Submitted,
    /// Transport failure; the newly added ids were removed again
    RolledBack(Vec<i64>),
    /// The backend answered with an error. The ids stay tracked and polling
    /// decides their fate.
    Unacknowledged(String),
}

#[derive(Default)]
struct TrackerState {
    ids: BTreeSet<i64>,
    poller: Option<JoinHandle<()>>,
}

struct Inner {
    state: Mutex<TrackerState>,
    backend: Arc<dyn BackendClient>,
    store: Arc<dyn ProcessingStore>,
    poll_interval: Duration,
    events: broadcast::Sender<ProcessingEvent>,
}

/// Owner of the processing set and its polling loop
#[derive(Clone)]
pub struct ProcessingTracker {
    inner: Arc<Inner>,
}

impl ProcessingTracker {
    pub fn new(
        backend: Arc<dyn BackendClient>,
        store: Arc<dyn ProcessingStore>,
        poll_interval: Duration,
    ) -> Self {
        let (events, _) = broadcast::channel(256);
        Self {
            inner: Arc::new(Inner {
                state: Mutex::new(TrackerState::default()),
                backend,
                store,
                poll_interval,
                events,
            }),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProcessingEvent> {
        self.inner.events.subscribe()
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn emit(&self, event: ProcessingEvent) {
        let _ = self.inner.events.send(event);
    }

    /// Write-through: save a non-empty set, clear the stored copy otherwise
    fn persist(&self, ids: &BTreeSet<i64>) {
        let result = if ids.is_empty() {
            self.inner.store.clear()
        } else {
            self.inner.store.save(ids)
        };
        if let Err(e) = result {
            warn!(target: "processing", error = %e, "Failed to persist processing set");
        }
    }

    /// Ids currently being processed, ascending
    pub fn ids(&self) -> Vec<i64> {
        self.lock().ids.iter().copied().collect()
    }

    pub fn is_processing(&self) -> bool {
        !self.lock().ids.is_empty()
    }

    pub fn contains(&self, doc_id: i64) -> bool {
        self.lock().ids.contains(&doc_id)
    }

    pub fn is_polling(&self) -> bool {
        self.lock()
            .poller
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false)
    }

    /// Pick up a set persisted by a previous run and resume polling it.
    ///
    /// Returns how many documents were resumed. A corrupt stored copy is
    /// discarded.
    pub fn resume(&self) -> usize {
        let stored = match self.inner.store.load() {
            Ok(Some(ids)) => ids,
            Ok(None) => return 0,
            Err(e) => {
                warn!(target: "processing", error = %e, "Discarding unreadable processing state");
                if let Err(e) = self.inner.store.clear() {
                    warn!(target: "processing", error = %e, "Failed to clear processing state");
                }
                return 0;
            }
        };

        let (count, snapshot) = {
            let mut state = self.lock();
            state.ids.extend(stored.iter().copied());
            self.persist(&state.ids);
            (stored.len(), state.ids.iter().copied().collect::<Vec<_>>())
        };

        info!(target: "processing", count, "Resuming processing set from previous session");
        self.emit(ProcessingEvent::Updated {
            processing: snapshot,
        });
        self.ensure_polling();
        count
    }

    /// Track `doc_ids` and ask the backend to start processing them.
    ///
    /// An empty list is a no-op. Only a transport failure of the submission
    /// rolls the newly added ids back; a backend-reported failure leaves them
    /// tracked until polling resolves them.
    pub async fn analyze(&self, doc_ids: &[i64]) -> AnalyzeOutcome {
        let mut requested: Vec<i64> = Vec::with_capacity(doc_ids.len());
        for id in doc_ids {
            if !requested.contains(id) {
                requested.push(*id);
            }
        }
        if requested.is_empty() {
            return AnalyzeOutcome::Skipped;
        }

        let (newly_added, snapshot) = {
            let mut state = self.lock();
            let newly_added: Vec<i64> = requested
                .iter()
                .copied()
                .filter(|id| !state.ids.contains(id))
                .collect();
            state.ids.extend(requested.iter().copied());
            self.persist(&state.ids);
            (newly_added, state.ids.iter().copied().collect::<Vec<_>>())
        };

        info!(target: "processing", doc_ids = ?requested, "Submitting documents for processing");
        self.emit(ProcessingEvent::Updated {
            processing: snapshot,
        });
        self.emit(ProcessingEvent::Submitted {
            doc_ids: requested.clone(),
        });
        self.ensure_polling();

        match self.inner.backend.start_processing(&requested).await {
            Ok(()) => AnalyzeOutcome::Submitted,
            Err(e) if e.is_transport() => {
                warn!(target: "processing", error = %e, "Processing submission failed; rolling back");
                self.roll_back(&newly_added);
                AnalyzeOutcome::RolledBack(newly_added)
            }
            Err(e) => {
                warn!(
                    target: "processing",
                    error = %e,
                    "Backend rejected processing submission; documents stay tracked"
                );
                AnalyzeOutcome::Unacknowledged(e.to_string())
            }
        }
    }

    fn roll_back(&self, doc_ids: &[i64]) {
        let snapshot = {
            let mut state = self.lock();
            for id in doc_ids {
                state.ids.remove(id);
            }
            self.persist(&state.ids);
            if state.ids.is_empty() {
                if let Some(poller) = state.poller.take() {
                    poller.abort();
                }
            }
            state.ids.iter().copied().collect::<Vec<_>>()
        };

        self.emit(ProcessingEvent::SubmissionRolledBack {
            doc_ids: doc_ids.to_vec(),
        });
        self.emit(ProcessingEvent::Updated {
            processing: snapshot,
        });
    }

    /// Start the poll task unless one is already running
    fn ensure_polling(&self) {
        let mut state = self.lock();
        if state.ids.is_empty() {
            return;
        }
        let running = state
            .poller
            .as_ref()
            .map(|h| !h.is_finished())
            .unwrap_or(false);
        if running {
            return;
        }

        debug!(target: "processing", interval_ms = self.inner.poll_interval.as_millis() as u64, "Starting poll loop");
        let tracker = self.clone();
        state.poller = Some(tokio::spawn(async move { tracker.poll_loop().await }));
    }

    /// One status request per tick, each awaited before the next tick
    async fn poll_loop(self) {
        let period = self.inner.poll_interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;

            let polled: BTreeSet<i64> = {
                let mut state = self.lock();
                if state.ids.is_empty() {
                    state.poller = None;
                    return;
                }
                state.ids.clone()
            };
            let request: Vec<i64> = polled.iter().copied().collect();
            debug!(target: "processing", doc_ids = ?request, "Polling processing status");

            match self.inner.backend.processing_status(&request).await {
                Ok(still_processing) => {
                    let (snapshot, drained) = {
                        let mut state = self.lock();
                        let still: BTreeSet<i64> = still_processing
                            .into_iter()
                            .filter(|id| polled.contains(id))
                            .collect();
                        // Ids added while the request was in flight were not
                        // part of it and stay tracked
                        let added_meanwhile: Vec<i64> = state
                            .ids
                            .iter()
                            .copied()
                            .filter(|id| !polled.contains(id))
                            .collect();
                        state.ids = still;
                        state.ids.extend(added_meanwhile);
                        self.persist(&state.ids);

                        let drained = state.ids.is_empty();
                        if drained {
                            state.poller = None;
                        }
                        (state.ids.iter().copied().collect::<Vec<_>>(), drained)
                    };

                    self.emit(ProcessingEvent::Updated {
                        processing: snapshot,
                    });
                    if drained {
                        info!(target: "processing", "All documents processed");
                        self.emit(ProcessingEvent::Refresh);
                        return;
                    }
                }
                Err(e) => {
                    warn!(target: "processing", error = %e, "Error checking processing status; stopping poll");
                    {
                        let mut state = self.lock();
                        state.ids.clear();
                        self.persist(&state.ids);
                        state.poller = None;
                    }
                    self.emit(ProcessingEvent::Updated {
                        processing: Vec::new(),
                    });
                    let answered = !e.is_transport();
                    self.emit(ProcessingEvent::PollFailed {
                        error: e.to_string(),
                    });
                    if answered {
                        self.emit(ProcessingEvent::Refresh);
                    }
                    return;
                }
            }
        }
    }

    /// Stop polling without touching the persisted set, so the next
    /// `resume` continues where this one stopped
    pub fn shutdown(&self) {
        if let Some(poller) = self.lock().poller.take() {
            poller.abort();
            debug!(target: "processing", "Poll loop stopped");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{ProgressFn, UploadReply};
    use crate::documents::{DocumentPage, DocumentQuery};
    use crate::faces::FaceAnalysis;
    use crate::processing::store::MockProcessingStore;
    use crate::upload::UploadFile;
    use crate::{DocviewError, Result};
    use async_trait::async_trait;
    use bytes::Bytes;

    /// Backend that accepts submissions and reports nothing as processing
    struct IdleBackend;

    #[async_trait]
    impl BackendClient for IdleBackend {
        async fn upload_document(
            &self,
            _file: UploadFile,
            _progress: ProgressFn,
        ) -> Result<UploadReply> {
            Err(DocviewError::Transport("not used".into()))
        }
        async fn start_processing(&self, _doc_numbers: &[i64]) -> Result<()> {
            Ok(())
        }
        async fn processing_status(&self, _doc_numbers: &[i64]) -> Result<Vec<i64>> {
            Ok(Vec::new())
        }
        async fn list_documents(&self, _query: &DocumentQuery) -> Result<DocumentPage> {
            Ok(DocumentPage::default())
        }
        async fn list_tags(&self) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn document_tags(&self, _doc_id: i64) -> Result<Vec<String>> {
            Ok(Vec::new())
        }
        async fn add_tag(&self, _doc_id: i64, _tag: &str) -> Result<()> {
            Ok(())
        }
        async fn remove_tag(&self, _doc_id: i64, _tag: &str) -> Result<()> {
            Ok(())
        }
        async fn clear_cache(&self) -> Result<()> {
            Ok(())
        }
        async fn document_image(&self, _doc_id: i64) -> Result<Bytes> {
            Ok(Bytes::new())
        }
        async fn analyze_image(&self, _file_name: &str, _image: Bytes) -> Result<FaceAnalysis> {
            Ok(FaceAnalysis::default())
        }
        async fn add_face(
            &self,
            _name: &str,
            _location: &serde_json::Value,
            _original_image_b64: &str,
        ) -> Result<()> {
            Ok(())
        }
        async fn add_person(&self, _name: &str) -> Result<()> {
            Ok(())
        }
        async fn update_abstract(&self, _doc_id: i64, _names: &[String]) -> Result<()> {
            Ok(())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn drain_saves_then_clears_the_store() {
        let mut store = MockProcessingStore::new();
        store
            .expect_save()
            .withf(|ids| ids.iter().copied().collect::<Vec<_>>() == vec![7])
            .times(1)
            .returning(|_| Ok(()));
        store.expect_clear().times(1).returning(|| Ok(()));

        let tracker = ProcessingTracker::new(
            Arc::new(IdleBackend),
            Arc::new(store),
            Duration::from_secs(5),
        );
        let mut events = tracker.subscribe();

        assert_eq!(tracker.analyze(&[7]).await, AnalyzeOutcome::Submitted);
        loop {
            if events.recv().await.unwrap() == ProcessingEvent::Refresh {
                break;
            }
        }
        assert!(!tracker.is_processing());
    }

    #[tokio::test]
    async fn unreadable_store_is_cleared_on_resume() {
        let mut store = MockProcessingStore::new();
        store
            .expect_load()
            .returning(|| Err(DocviewError::Storage("corrupt".into())));
        store.expect_clear().times(1).returning(|| Ok(()));

        let tracker = ProcessingTracker::new(
            Arc::new(IdleBackend),
            Arc::new(store),
            Duration::from_secs(5),
        );
        assert_eq!(tracker.resume(), 0);
        assert!(!tracker.is_polling());
    }
}
