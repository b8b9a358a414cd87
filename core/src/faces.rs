//! Face analysis results and the naming workflow built on them.
//!
//! The face-recognition backend detects faces in a document image and
//! suggests names. Confirmed names are registered back with both backends
//! and can be written into the document abstract.

use crate::backend::BackendClient;
use crate::{DocviewError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::info;

/// Name the face backend reports for faces it does not recognize
pub const UNKNOWN_FACE: &str = "Unknown";

/// One face found by `analyze_image`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFace {
    pub index: u32,
    #[serde(default)]
    pub name: Option<String>,
    /// Bounding box as reported by the face backend; sent back untouched
    #[serde(default)]
    pub location: serde_json::Value,
    /// Match distance, lower is better
    #[serde(default)]
    pub distance: Option<f64>,
}

impl DetectedFace {
    /// Recognized name in display form (`jane_doe` → `Jane Doe`)
    pub fn suggested_name(&self) -> Option<String> {
        self.name
            .as_deref()
            .filter(|n| !n.is_empty() && *n != UNKNOWN_FACE)
            .map(display_name)
    }
}

/// Answer of `POST {face}/analyze_image`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FaceAnalysis {
    #[serde(default)]
    pub faces: Vec<DetectedFace>,
    /// Annotated image, base64 JPEG
    #[serde(default)]
    pub processed_image: Option<String>,
    /// Image the faces were found in; `add_face` needs it back
    #[serde(default)]
    pub original_image_b64: String,
}

impl FaceAnalysis {
    pub fn face(&self, index: u32) -> Option<&DetectedFace> {
        self.faces.iter().find(|f| f.index == index)
    }

    /// Suggested names keyed by face index; unrecognized faces are left out
    pub fn suggested_names(&self) -> BTreeMap<u32, String> {
        self.faces
            .iter()
            .filter_map(|f| f.suggested_name().map(|name| (f.index, name)))
            .collect()
    }
}

/// Underscores become spaces and every word starts upper-case
pub fn display_name(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut in_word = false;
    for c in raw.replace('_', " ").chars() {
        if c.is_alphanumeric() {
            if in_word {
                out.push(c);
            } else {
                out.extend(c.to_uppercase());
            }
            in_word = true;
        } else {
            out.push(c);
            in_word = false;
        }
    }
    out
}

/// Non-blank names in face order, trimmed
pub fn confirmed_names(names: &BTreeMap<u32, String>) -> Vec<String> {
    names
        .values()
        .map(|n| n.trim())
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

/// Register `face` under `name` with the face backend, then record the
/// person on the primary backend.
pub async fn save_face(
    backend: &dyn BackendClient,
    analysis: &FaceAnalysis,
    face: &DetectedFace,
    name: &str,
) -> Result<()> {
    let name = name.trim();
    if name.is_empty() {
        return Err(DocviewError::InvalidRequest(
            "Please enter a name for this face first.".to_string(),
        ));
    }

    backend
        .add_face(name, &face.location, &analysis.original_image_b64)
        .await?;
    backend.add_person(name).await?;
    info!(target: "faces", face = face.index, name = %name, "Saved face");
    Ok(())
}
