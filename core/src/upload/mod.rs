//! Upload tasks and the queue that drives them through the upload transport.

mod queue;
mod task;

pub use queue::{
    QueueCounts, UploadEvent, UploadQueue, MISSING_DOCNUMBER_MESSAGE, NETWORK_ERROR_MESSAGE,
    UPLOAD_FAILED_MESSAGE,
};
pub use task::{UploadFile, UploadStatus, UploadTask};
