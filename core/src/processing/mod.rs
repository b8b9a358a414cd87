//! Documents under server-side analysis.
//!
//! [`ProcessingTracker`] owns the set and its polling loop; a
//! [`ProcessingStore`] keeps a durable copy across restarts.

mod store;
mod tracker;

pub use store::{JsonFileStore, MemoryStore, ProcessingStore, PROCESSING_DOCS_FILE};
pub use tracker::{AnalyzeOutcome, ProcessingEvent, ProcessingTracker};
