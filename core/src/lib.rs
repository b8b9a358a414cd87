// Docview Core Library
// Edge routing and upload/analysis orchestration for the document viewer

pub mod backend;
pub mod config;
pub mod documents;
pub mod edge;
pub mod faces;
pub mod orchestrator;
pub mod processing;
pub mod telemetry;
pub mod upload;

// Export core types
pub use backend::{BackendClient, HttpBackend, ProgressFn, UploadReply};
pub use config::{BackendConfig, GatewayConfig, OrchestratorConfig};
pub use documents::{Document, DocumentPage, DocumentQuery, MediaKind, PersonCondition};
pub use edge::{EdgeRouter, RouteTable, Target};
pub use faces::{DetectedFace, FaceAnalysis};
pub use orchestrator::{Orchestrator, OrchestratorEvent};
pub use processing::{
    AnalyzeOutcome, JsonFileStore, MemoryStore, ProcessingEvent, ProcessingStore, ProcessingTracker,
};
pub use upload::{UploadEvent, UploadFile, UploadQueue, UploadStatus, UploadTask};

// Error types
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DocviewError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Backend returned status {status}: {}", message.as_deref().unwrap_or("no error message"))]
    Backend { status: u16, message: Option<String> },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DocviewError {
    /// True when the request never produced an HTTP response
    pub fn is_transport(&self) -> bool {
        matches!(self, DocviewError::Transport(_))
    }
}

pub type Result<T> = std::result::Result<T, DocviewError>;
