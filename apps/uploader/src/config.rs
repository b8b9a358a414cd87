use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use docview_core::config::normalize_base_url;
use docview_core::{BackendConfig, OrchestratorConfig};

/// Uploader settings: backend endpoints plus orchestration knobs
#[derive(Clone, Debug)]
pub struct UploaderConfig {
    pub backend: BackendConfig,
    pub orchestrator: OrchestratorConfig,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        // Both already consider env vars
        Self {
            backend: BackendConfig::from_env(),
            orchestrator: OrchestratorConfig::default(),
        }
    }
}

impl UploaderConfig {
    /// Load configuration from a TOML file (path via DOCVIEW_CONFIG or ./docview.toml),
    /// overlaying values onto env-driven defaults.
    pub fn load() -> Self {
        let path = std::env::var("DOCVIEW_CONFIG").unwrap_or_else(|_| "docview.toml".into());
        Self::load_from(Path::new(&path))
    }

    pub fn load_from(path: &Path) -> Self {
        let default = Self::default();
        if !path.exists() {
            tracing::debug!(target: "uploader", path = %path.display(), "No TOML config found; using defaults/env");
            return default;
        }
        match fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<UploaderToml>(&s) {
                Ok(t) => t.overlay(default),
                Err(e) => {
                    tracing::warn!(target: "uploader", error = %e, "Failed to parse TOML; using defaults");
                    default
                }
            },
            Err(e) => {
                tracing::warn!(target: "uploader", error = %e, "Failed to read TOML; using defaults");
                default
            }
        }
    }
}

// =========================
// TOML overlay definitions
// =========================

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct UploaderToml {
    pub backend: Option<BackendToml>,
    pub orchestrator: Option<OrchestratorToml>,
}

impl UploaderToml {
    fn overlay(self, mut base: UploaderConfig) -> UploaderConfig {
        if let Some(b) = self.backend {
            b.apply(&mut base.backend);
        }
        if let Some(o) = self.orchestrator {
            o.apply(&mut base.orchestrator);
        }
        base
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct BackendToml {
    pub primary_url: Option<String>,
    pub face_recog_url: Option<String>,
    pub request_timeout_ms: Option<u64>,
}

impl BackendToml {
    fn apply(self, cfg: &mut BackendConfig) {
        if let Some(url) = normalize_base_url(self.primary_url) {
            cfg.primary_url = Some(url);
        }
        if let Some(url) = normalize_base_url(self.face_recog_url) {
            cfg.face_recog_url = Some(url);
        }
        if let Some(v) = self.request_timeout_ms {
            cfg.request_timeout_ms = v;
        }
    }
}

#[derive(Debug, Clone, Default, serde::Deserialize)]
struct OrchestratorToml {
    pub poll_interval_ms: Option<u64>,
    pub state_dir: Option<PathBuf>,
    pub upload_chunk_size: Option<usize>,
}

impl OrchestratorToml {
    fn apply(self, cfg: &mut OrchestratorConfig) {
        if let Some(v) = self.poll_interval_ms {
            cfg.poll_interval = Duration::from_millis(v.max(1));
        }
        if let Some(v) = self.state_dir {
            cfg.state_dir = v;
        }
        if let Some(v) = self.upload_chunk_size {
            cfg.upload_chunk_size = v.max(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn toml_overlays_env_defaults() {
        std::env::set_var("DOCVIEW_PRIMARY_URL", "http://env-primary:5000");
        std::env::remove_var("DOCVIEW_FACE_RECOG_URL");
        std::env::remove_var("NEXT_PUBLIC_FACE_RECOG_URL");

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docview.toml");
        fs::write(
            &path,
            r#"
[backend]
face_recog_url = "http://faces:5002/"
request_timeout_ms = 1000

[orchestrator]
poll_interval_ms = 250
state_dir = "/tmp/docview-state"
"#,
        )
        .unwrap();

        let cfg = UploaderConfig::load_from(&path);
        assert_eq!(cfg.backend.primary_url.as_deref(), Some("http://env-primary:5000"));
        assert_eq!(cfg.backend.face_recog_url.as_deref(), Some("http://faces:5002"));
        assert_eq!(cfg.backend.request_timeout_ms, 1000);
        assert_eq!(cfg.orchestrator.poll_interval, Duration::from_millis(250));
        assert_eq!(cfg.orchestrator.state_dir, PathBuf::from("/tmp/docview-state"));

        std::env::remove_var("DOCVIEW_PRIMARY_URL");
    }

    #[test]
    #[serial]
    fn missing_or_broken_file_falls_back_to_defaults() {
        std::env::remove_var("DOCVIEW_PRIMARY_URL");
        std::env::remove_var("NEXT_PUBLIC_FLASK_API_URL");

        let dir = tempfile::tempdir().unwrap();
        let cfg = UploaderConfig::load_from(&dir.path().join("absent.toml"));
        assert_eq!(cfg.backend.primary_url, None);

        let broken = dir.path().join("broken.toml");
        fs::write(&broken, "[backend\nprimary_url = ").unwrap();
        let cfg = UploaderConfig::load_from(&broken);
        assert_eq!(cfg.backend.primary_url, None);
    }
}
