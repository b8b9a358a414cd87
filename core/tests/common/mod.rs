//! Shared test backend
//!
//! `ScriptedBackend` implements `BackendClient` with per-call scripts so the
//! upload queue, processing tracker and orchestrator can be driven without a
//! network.

#![allow(dead_code)]

use async_trait::async_trait;
use docview_core::backend::{ProgressFn, UploadReply};
use bytes::Bytes;
use docview_core::documents::{DocumentPage, DocumentQuery};
use docview_core::{BackendClient, DocviewError, FaceAnalysis, Result, UploadFile};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};
use tokio::time::Instant;

// =============================================================================
// Scripts
// =============================================================================

/// How an upload of a given file name ends
#[derive(Debug, Clone)]
pub enum UploadScript {
    Accept(i64),
    AcceptWithoutDocnumber,
    Reject(Option<String>),
    ServerError(u16, Option<String>),
    NetworkFailure,
}

/// How a processing submission ends
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SubmitScript {
    Accept,
    ServerError(u16),
    NetworkFailure,
}

/// One answer to a status poll
#[derive(Debug, Clone)]
pub enum StatusScript {
    Processing(Vec<i64>),
    ServerError(u16),
    NetworkFailure,
}

// =============================================================================
// Scripted backend
// =============================================================================

#[derive(Default)]
struct Calls {
    uploads: Vec<String>,
    submissions: Vec<Vec<i64>>,
    polls: Vec<(Instant, Vec<i64>)>,
}

pub struct ScriptedBackend {
    uploads: Mutex<HashMap<String, UploadScript>>,
    submit: Mutex<SubmitScript>,
    statuses: Mutex<VecDeque<StatusScript>>,
    calls: Mutex<Calls>,
    /// When set, each upload reports 50% and then waits for a permit
    upload_gate: Option<Arc<Semaphore>>,
    /// When set, each status poll signals `poll_started` and waits here
    status_gate: Option<Arc<Notify>>,
    pub poll_started: Arc<Notify>,
}

impl Default for ScriptedBackend {
    fn default() -> Self {
        Self {
            uploads: Mutex::new(HashMap::new()),
            submit: Mutex::new(SubmitScript::Accept),
            statuses: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Calls::default()),
            upload_gate: None,
            status_gate: None,
            poll_started: Arc::new(Notify::new()),
        }
    }
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_upload(self, file_name: &str, script: UploadScript) -> Self {
        self.uploads
            .lock()
            .unwrap()
            .insert(file_name.to_string(), script);
        self
    }

    pub fn with_upload_gate(mut self, gate: Arc<Semaphore>) -> Self {
        self.upload_gate = Some(gate);
        self
    }

    pub fn with_status_gate(mut self, gate: Arc<Notify>) -> Self {
        self.status_gate = Some(gate);
        self
    }

    pub fn with_submit(self, script: SubmitScript) -> Self {
        *self.submit.lock().unwrap() = script;
        self
    }

    /// Queue status answers; once exhausted every poll reports nothing processing
    pub fn with_statuses(self, statuses: Vec<StatusScript>) -> Self {
        self.statuses.lock().unwrap().extend(statuses);
        self
    }

    pub fn set_submit(&self, script: SubmitScript) {
        *self.submit.lock().unwrap() = script;
    }

    pub fn upload_calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().uploads.clone()
    }

    pub fn submissions(&self) -> Vec<Vec<i64>> {
        self.calls.lock().unwrap().submissions.clone()
    }

    pub fn polls(&self) -> Vec<(Instant, Vec<i64>)> {
        self.calls.lock().unwrap().polls.clone()
    }

    pub fn poll_count(&self) -> usize {
        self.calls.lock().unwrap().polls.len()
    }
}

#[async_trait]
impl BackendClient for ScriptedBackend {
    async fn upload_document(&self, file: UploadFile, progress: ProgressFn) -> Result<UploadReply> {
        self.calls.lock().unwrap().uploads.push(file.name.clone());
        let script = self
            .uploads
            .lock()
            .unwrap()
            .get(&file.name)
            .cloned()
            .unwrap_or(UploadScript::Accept(1));

        if matches!(script, UploadScript::NetworkFailure) {
            return Err(DocviewError::Transport("connection refused".to_string()));
        }

        (*progress)(50.0);
        if let Some(gate) = &self.upload_gate {
            gate.acquire().await.unwrap().forget();
        }
        (*progress)(100.0);

        match script {
            UploadScript::Accept(docnumber) => Ok(UploadReply {
                success: true,
                docnumber: Some(docnumber),
                error: None,
            }),
            UploadScript::AcceptWithoutDocnumber => Ok(UploadReply {
                success: true,
                docnumber: None,
                error: None,
            }),
            UploadScript::Reject(error) => Ok(UploadReply {
                success: false,
                docnumber: None,
                error,
            }),
            UploadScript::ServerError(status, message) => {
                Err(DocviewError::Backend { status, message })
            }
            UploadScript::NetworkFailure => unreachable!(),
        }
    }

    async fn start_processing(&self, doc_numbers: &[i64]) -> Result<()> {
        self.calls
            .lock()
            .unwrap()
            .submissions
            .push(doc_numbers.to_vec());
        let script = *self.submit.lock().unwrap();
        match script {
            SubmitScript::Accept => Ok(()),
            SubmitScript::ServerError(status) => Err(DocviewError::Backend {
                status,
                message: Some("Processing failed".to_string()),
            }),
            SubmitScript::NetworkFailure => {
                Err(DocviewError::Transport("connection reset".to_string()))
            }
        }
    }

    async fn processing_status(&self, doc_numbers: &[i64]) -> Result<Vec<i64>> {
        self.calls
            .lock()
            .unwrap()
            .polls
            .push((Instant::now(), doc_numbers.to_vec()));

        if let Some(gate) = &self.status_gate {
            self.poll_started.notify_one();
            gate.notified().await;
        }

        let next = self.statuses.lock().unwrap().pop_front();
        match next {
            Some(StatusScript::Processing(ids)) => Ok(ids),
            Some(StatusScript::ServerError(status)) => Err(DocviewError::Backend {
                status,
                message: None,
            }),
            Some(StatusScript::NetworkFailure) => {
                Err(DocviewError::Transport("connection refused".to_string()))
            }
            None => Ok(Vec::new()),
        }
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
