// Configuration values, read once at startup and injected
//
// Nothing below is consulted from request handlers; callers build these
// once and hand them to the router or orchestrator.

use std::path::PathBuf;
use std::time::Duration;

/// Default interval between processing status polls
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5_000;

/// Default timeout applied to every outbound backend request
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Base URLs of the two backends behind the edge router
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendConfig {
    /// Document-management backend (listing, tagging, upload)
    pub primary_url: Option<String>,
    /// Face-recognition backend (analysis, face registration)
    pub face_recog_url: Option<String>,
    pub request_timeout_ms: u64,
}

impl BackendConfig {
    pub fn new(primary_url: impl Into<String>, face_recog_url: impl Into<String>) -> Self {
        Self {
            primary_url: normalize_base_url(Some(primary_url.into())),
            face_recog_url: normalize_base_url(Some(face_recog_url.into())),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT_MS,
        }
    }

    pub fn from_env() -> Self {
        Self {
            primary_url: normalize_base_url(
                env_non_empty("DOCVIEW_PRIMARY_URL")
                    .or_else(|| env_non_empty("NEXT_PUBLIC_FLASK_API_URL")),
            ),
            face_recog_url: normalize_base_url(
                env_non_empty("DOCVIEW_FACE_RECOG_URL")
                    .or_else(|| env_non_empty("NEXT_PUBLIC_FACE_RECOG_URL")),
            ),
            request_timeout_ms: env_non_empty("REQUEST_TIMEOUT_MS")
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT_MS),
        }
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.request_timeout_ms = timeout_ms;
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

/// Edge router HTTP server configuration
#[derive(Clone, Debug)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    /// Path prefix the browser talks to, e.g. `/api`
    pub mount_prefix: String,
    pub backends: BackendConfig,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3000,
            mount_prefix: "/api".to_string(),
            backends: BackendConfig::default(),
        }
    }
}

impl GatewayConfig {
    pub fn from_env() -> Self {
        Self {
            host: std::env::var("DOCVIEW_GATEWAY_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            port: std::env::var("DOCVIEW_GATEWAY_PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            mount_prefix: "/api".to_string(),
            backends: BackendConfig::from_env(),
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upload/analyze orchestrator configuration
#[derive(Clone, Debug)]
pub struct OrchestratorConfig {
    pub poll_interval: Duration,
    /// Directory holding the persisted processing set
    pub state_dir: PathBuf,
    /// Size of the chunks streamed to the upload endpoint; one progress
    /// report is emitted per chunk
    pub upload_chunk_size: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(
                env_non_empty("DOCVIEW_POLL_INTERVAL_MS")
                    .and_then(|v| v.parse::<u64>().ok())
                    .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
            ),
            state_dir: env_non_empty("DOCVIEW_STATE_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(".docview")),
            upload_chunk_size: 64 * 1024,
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Trim whitespace and trailing slashes; blank values count as unset.
pub fn normalize_base_url(url: Option<String>) -> Option<String> {
    url.map(|u| u.trim().trim_end_matches('/').to_string())
        .filter(|u| !u.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    fn base_url_normalization() {
        assert_eq!(
            normalize_base_url(Some("http://127.0.0.1:5000/".into())),
            Some("http://127.0.0.1:5000".into())
        );
        assert_eq!(normalize_base_url(Some("   ".into())), None);
        assert_eq!(normalize_base_url(None), None);
    }

    #[test]
    #[serial]
    fn backend_config_reads_env_with_legacy_fallback() {
        std::env::remove_var("DOCVIEW_PRIMARY_URL");
        std::env::remove_var("DOCVIEW_FACE_RECOG_URL");
        std::env::set_var("NEXT_PUBLIC_FLASK_API_URL", "http://flask:5000/");
        std::env::set_var("DOCVIEW_FACE_RECOG_URL", "http://faces:5002");
        std::env::remove_var("REQUEST_TIMEOUT_MS");

        let cfg = BackendConfig::from_env();
        assert_eq!(cfg.primary_url.as_deref(), Some("http://flask:5000"));
        assert_eq!(cfg.face_recog_url.as_deref(), Some("http://faces:5002"));
        assert_eq!(cfg.request_timeout_ms, DEFAULT_REQUEST_TIMEOUT_MS);

        std::env::remove_var("NEXT_PUBLIC_FLASK_API_URL");
        std::env::remove_var("DOCVIEW_FACE_RECOG_URL");
    }

    #[test]
    #[serial]
    fn empty_env_values_are_unset() {
        std::env::set_var("DOCVIEW_PRIMARY_URL", "");
        std::env::remove_var("NEXT_PUBLIC_FLASK_API_URL");
        let cfg = BackendConfig::from_env();
        assert_eq!(cfg.primary_url, None);
        std::env::remove_var("DOCVIEW_PRIMARY_URL");
    }

    #[test]
    #[serial]
    fn poll_interval_defaults_to_five_seconds() {
        std::env::remove_var("DOCVIEW_POLL_INTERVAL_MS");
        let cfg = OrchestratorConfig::default();
        assert_eq!(cfg.poll_interval, Duration::from_secs(5));
    }
}
