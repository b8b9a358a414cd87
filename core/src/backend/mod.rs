//! Client side of the document backend contract.
//!
//! The orchestrator only talks to the backend through [`BackendClient`], so
//! tests can drive it with scripted fakes while [`HttpBackend`] speaks the
//! real HTTP contract.

mod http;

pub use http::HttpBackend;

use crate::documents::{DocumentPage, DocumentQuery};
use crate::faces::FaceAnalysis;
use crate::upload::UploadFile;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Upload progress callback, called with a percentage in `[0, 100]`
pub type ProgressFn = Arc<dyn Fn(f64) + Send + Sync>;

/// Body of a 2xx answer from `POST /upload_document`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub docnumber: Option<i64>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Request body shared by the processing endpoints
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocNumbers {
    pub docnumbers: Vec<i64>,
}

/// Answer of `POST /api/processing_status`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingStatusReply {
    #[serde(default)]
    pub processing: Vec<i64>,
}

/// Operations the document backend offers this client
#[async_trait]
pub trait BackendClient: Send + Sync {
    /// Upload one file; `progress` receives non-decreasing percentages
    async fn upload_document(&self, file: UploadFile, progress: ProgressFn) -> Result<UploadReply>;

    /// Ask the backend to start analyzing the given documents
    async fn start_processing(&self, doc_numbers: &[i64]) -> Result<()>;

    /// Subset of `doc_numbers` still being processed
    async fn processing_status(&self, doc_numbers: &[i64]) -> Result<Vec<i64>>;

    async fn list_documents(&self, query: &DocumentQuery) -> Result<DocumentPage>;

    async fn list_tags(&self) -> Result<Vec<String>>;

    async fn document_tags(&self, doc_id: i64) -> Result<Vec<String>>;

    async fn add_tag(&self, doc_id: i64, tag: &str) -> Result<()>;

    async fn remove_tag(&self, doc_id: i64, tag: &str) -> Result<()>;

    /// Drop the backend's thumbnail cache
    async fn clear_cache(&self) -> Result<()>;

    /// Full-size image of a document
    async fn document_image(&self, doc_id: i64) -> Result<Bytes>;

    /// Detect and recognize faces; `file_name` is sent as the part's file name
    async fn analyze_image(&self, file_name: &str, image: Bytes) -> Result<FaceAnalysis>;

    /// Teach the face backend a named face
    async fn add_face(
        &self,
        name: &str,
        location: &serde_json::Value,
        original_image_b64: &str,
    ) -> Result<()>;

    /// Record a person on the primary backend
    async fn add_person(&self, name: &str) -> Result<()>;

    /// Rewrite a document's abstract around the confirmed names
    async fn update_abstract(&self, doc_id: i64, names: &[String]) -> Result<()>;
}
