//! HTTP implementation of the document backend contract
//!
//! Talks to the primary backend directly with a shared `reqwest::Client`;
//! face analysis and face registration go to the face-recognition backend.
//! Send failures become `Transport` errors, non-2xx answers become `Backend`
//! errors carrying the backend's `{"error": ...}` message when present.

use super::{BackendClient, DocNumbers, ProcessingStatusReply, ProgressFn, UploadReply};
use crate::config::BackendConfig;
use crate::documents::{DocumentPage, DocumentQuery};
use crate::faces::FaceAnalysis;
use crate::upload::UploadFile;
use crate::{DocviewError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{multipart, Client, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Deserialize)]
struct DocumentTagsReply {
    #[serde(default)]
    tags: Vec<String>,
}

/// Backend client over HTTP
#[derive(Clone)]
pub struct HttpBackend {
    http: Client,
    primary_url: String,
    face_recog_url: Option<String>,
    chunk_size: usize,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let primary_url = config.primary_url.clone().ok_or_else(|| {
            DocviewError::Config("Primary backend URL is not configured".to_string())
        })?;

        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| DocviewError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            primary_url,
            face_recog_url: config.face_recog_url.clone(),
            chunk_size: DEFAULT_CHUNK_SIZE,
        })
    }

    /// Size of the streamed upload chunks (one progress report per chunk)
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn primary_url(&self) -> &str {
        &self.primary_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.primary_url, path)
    }

    fn face_url(&self, path: &str) -> Result<String> {
        self.face_recog_url
            .as_ref()
            .map(|base| format!("{}{}", base, path))
            .ok_or_else(|| {
                DocviewError::Config("Face recognition URL is not configured".to_string())
            })
    }

    async fn send(&self, request: RequestBuilder, what: &str) -> Result<Response> {
        let response = request.send().await.map_err(|e| {
            warn!(target: "backend", request = %what, error = %e, "Backend request failed");
            DocviewError::Transport(format!("{} request failed: {}", what, e))
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(target: "backend", request = %what, status = %status, "Backend request succeeded");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body);
        warn!(target: "backend", request = %what, status = %status, message = ?message, "Backend returned error");
        Err(DocviewError::Backend {
            status: status.as_u16(),
            message,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T> {
        let response = self.send(request, what).await?;
        response.json::<T>().await.map_err(|e| {
            warn!(target: "backend", request = %what, error = %e, "Failed to parse backend response");
            DocviewError::Decode(format!("Failed to parse {} response: {}", what, e))
        })
    }
}

/// `{"error": "..."}` payloads, as the backend reports failures
pub(crate) fn error_message(body: &str) -> Option<String> {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
        .filter(|m| !m.is_empty())
}

pub(crate) fn percent(sent: u64, total: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    ((sent as f64 / total as f64) * 100.0).clamp(0.0, 100.0)
}

#[async_trait]
impl BackendClient for HttpBackend {
    async fn upload_document(&self, file: UploadFile, progress: ProgressFn) -> Result<UploadReply> {
        let total = file.size() as u64;
        let name = file.name.clone();
        debug!(target: "backend", file = %name, size = total, "Uploading document");

        let bytes = file.bytes.clone();
        let chunk_size = self.chunk_size;
        let body = tokio_stream::iter((0..bytes.len()).step_by(chunk_size).map(move |start| {
            let end = (start + chunk_size).min(bytes.len());
            (*progress)(percent(end as u64, total));
            Ok::<_, std::io::Error>(bytes.slice(start..end))
        }));

        let part = multipart::Part::stream_with_length(reqwest::Body::wrap_stream(body), total)
            .file_name(name.clone());
        let form = multipart::Form::new()
            .part("file", part)
            .text("docname", name)
            .text("abstract", "");

        let request = self.http.post(self.url("/upload_document")).multipart(form);
        let response = request.send().await.map_err(|e| {
            warn!(target: "backend", error = %e, "Upload request failed");
            DocviewError::Transport(format!("upload request failed: {}", e))
        })?;

        let status = response.status();
        let body = response.text().await.map_err(|e| {
            DocviewError::Transport(format!("failed to read upload response: {}", e))
        })?;

        if !status.is_success() {
            return Err(DocviewError::Backend {
                status: status.as_u16(),
                message: error_message(&body),
            });
        }

        serde_json::from_str::<UploadReply>(&body).map_err(|e| {
            warn!(target: "backend", error = %e, "Failed to parse upload response");
            DocviewError::Decode(format!("Failed to parse upload response: {}", e))
        })
    }

    async fn start_processing(&self, doc_numbers: &[i64]) -> Result<()> {
        let body = DocNumbers {
            docnumbers: doc_numbers.to_vec(),
        };
        self.send(
            self.http
                .post(self.url("/api/process_uploaded_documents"))
                .json(&body),
            "process_uploaded_documents",
        )
        .await?;
        Ok(())
    }

    async fn processing_status(&self, doc_numbers: &[i64]) -> Result<Vec<i64>> {
        let body = DocNumbers {
            docnumbers: doc_numbers.to_vec(),
        };
        let reply: ProcessingStatusReply = self
            .send_json(
                self.http.post(self.url("/api/processing_status")).json(&body),
                "processing_status",
            )
            .await?;
        Ok(reply.processing)
    }

    async fn list_documents(&self, query: &DocumentQuery) -> Result<DocumentPage> {
        self.send_json(
            self.http
                .get(self.url("/api/documents"))
                .query(&query.to_pairs()),
            "documents",
        )
        .await
    }

    async fn list_tags(&self) -> Result<Vec<String>> {
        self.send_json(self.http.get(self.url("/api/tags")), "tags").await
    }

    async fn document_tags(&self, doc_id: i64) -> Result<Vec<String>> {
        let reply: DocumentTagsReply = self
            .send_json(
                self.http.get(self.url(&format!("/api/tags/{}", doc_id))),
                "document tags",
            )
            .await?;
        Ok(reply.tags)
    }

    async fn add_tag(&self, doc_id: i64, tag: &str) -> Result<()> {
        let tag = tag.trim();
        if tag.is_empty() {
            return Err(DocviewError::InvalidRequest("Tag cannot be empty".to_string()));
        }
        self.send(
            self.http
                .post(self.url(&format!("/api/tags/{}", doc_id)))
                .json(&json!({ "tag": tag })),
            "add tag",
        )
        .await?;
        Ok(())
    }

    async fn remove_tag(&self, doc_id: i64, tag: &str) -> Result<()> {
        let mut url = Url::parse(&self.url(&format!("/api/tags/{}", doc_id)))
            .map_err(|e| DocviewError::Config(format!("Invalid backend URL: {}", e)))?;
        url.path_segments_mut()
            .map_err(|_| DocviewError::Config("Backend URL cannot be a base".to_string()))?
            .push(tag);

        self.send(self.http.delete(url), "remove tag").await?;
        Ok(())
    }

    async fn clear_cache(&self) -> Result<()> {
        self.send(self.http.post(self.url("/api/clear_cache")), "clear cache")
            .await?;
        Ok(())
    }

    async fn document_image(&self, doc_id: i64) -> Result<Bytes> {
        let response = self
            .send(self.http.get(self.url(&format!("/image/{}", doc_id))), "image")
            .await?;
        response
            .bytes()
            .await
            .map_err(|e| DocviewError::Transport(format!("failed to read image: {}", e)))
    }

    async fn analyze_image(&self, file_name: &str, image: Bytes) -> Result<FaceAnalysis> {
        let url = self.face_url("/analyze_image")?;
        let size = image.len() as u64;
        let part =
            multipart::Part::stream_with_length(image, size).file_name(file_name.to_string());
        let form = multipart::Form::new().part("image_file", part);

        let analysis: FaceAnalysis = self
            .send_json(self.http.post(url).multipart(form), "analyze image")
            .await?;
        debug!(target: "backend", faces = analysis.faces.len(), "Image analyzed");
        Ok(analysis)
    }

    async fn add_face(
        &self,
        name: &str,
        location: &serde_json::Value,
        original_image_b64: &str,
    ) -> Result<()> {
        let url = self.face_url("/add_face")?;
        let body = json!({
            "name": name,
            "location": location,
            "original_image_b64": original_image_b64,
        });
        self.send(self.http.post(url).json(&body), "add face").await?;
        Ok(())
    }

    async fn add_person(&self, name: &str) -> Result<()> {
        self.send(
            self.http
                .post(self.url("/add_person"))
                .json(&json!({ "name": name })),
            "add person",
        )
        .await?;
        Ok(())
    }

    async fn update_abstract(&self, doc_id: i64, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Err(DocviewError::InvalidRequest(
                "No names to write into the abstract".to_string(),
            ));
        }
        self.send(
            self.http
                .post(self.url("/update_abstract"))
                .json(&json!({ "doc_id": doc_id, "names": names })),
            "update abstract",
        )
        .await?;
        Ok(())
    }
}
